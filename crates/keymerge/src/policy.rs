//! Aggregation policies: what to do when a source folds into a target.
//!
//! An [`OperationSpec`] is resolved once per merge call into a
//! [`ResolvedPolicy`]. Resolution validates every catalog token up front, so
//! an unknown operation fails before any record is touched.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{BoxError, MergeError, MergeResult};
use crate::operation::{BuiltinOperation, FieldSlot};
use crate::record::{type_name, Record};
use crate::state::FoldState;

/// Folds a whole source record into a whole target record.
///
/// Arguments are the accumulated target, the source, and the shared identity.
pub type RecordFold = dyn Fn(Record, Record, &str) -> Result<Record, BoxError> + Send + Sync;

/// What a custom field fold sees besides the two field values.
#[derive(Clone, Copy, Debug)]
pub struct FieldContext<'a> {
    /// Name of the field being folded.
    pub field: &'a str,
    /// Identity string shared by the target and source records.
    pub identity: &'a str,
    /// The accumulated target record as it was before this fold.
    pub target: &'a Record,
    /// The source record being folded.
    pub source: &'a Record,
}

/// Folds one field. Either side may be absent; returning `None` drops the field.
pub type FieldFold = dyn Fn(Option<Value>, Option<Value>, &FieldContext<'_>) -> Result<Option<Value>, BoxError>
    + Send
    + Sync;

/// Operation declared for one field of a per-field policy.
#[derive(Clone)]
pub enum FieldOperation {
    /// A catalog token such as `"sum"`, checked at resolve time.
    Named(String),
    /// A caller-supplied fold.
    Custom(Arc<FieldFold>),
}

impl FieldOperation {
    pub fn named(token: impl Into<String>) -> Self {
        Self::Named(token.into())
    }

    pub fn custom<F>(fold: F) -> Self
    where
        F: Fn(Option<Value>, Option<Value>, &FieldContext<'_>) -> Result<Option<Value>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self::Custom(Arc::new(fold))
    }
}

impl fmt::Debug for FieldOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(token) => f.debug_tuple("Named").field(token).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<BuiltinOperation> for FieldOperation {
    fn from(op: BuiltinOperation) -> Self {
        Self::Named(op.as_str().to_string())
    }
}

impl From<&str> for FieldOperation {
    fn from(token: &str) -> Self {
        Self::Named(token.to_string())
    }
}

impl From<String> for FieldOperation {
    fn from(token: String) -> Self {
        Self::Named(token)
    }
}

/// How sources are folded into targets.
#[derive(Clone, Default)]
pub enum OperationSpec {
    /// One fold over whole records.
    WholeRecord(Arc<RecordFold>),
    /// A fold per declared field; undeclared fields take the source value
    /// when present.
    PerField(BTreeMap<String, FieldOperation>),
    /// Shallow overwrite: every field present on the source replaces the
    /// target's field.
    #[default]
    DefaultOverwrite,
}

impl OperationSpec {
    pub fn whole_record<F>(fold: F) -> Self
    where
        F: Fn(Record, Record, &str) -> Result<Record, BoxError> + Send + Sync + 'static,
    {
        Self::WholeRecord(Arc::new(fold))
    }

    /// Build a per-field policy from `(field, operation)` pairs.
    pub fn per_field<I, K, O>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, O)>,
        K: Into<String>,
        O: Into<FieldOperation>,
    {
        Self::PerField(
            fields
                .into_iter()
                .map(|(field, op)| (field.into(), op.into()))
                .collect(),
        )
    }

    /// Declare an operation for `field`.
    ///
    /// A non per-field spec is replaced by a per-field spec holding only this
    /// declaration.
    pub fn with_field(self, field: impl Into<String>, op: impl Into<FieldOperation>) -> Self {
        let mut fields = match self {
            Self::PerField(fields) => fields,
            Self::WholeRecord(_) | Self::DefaultOverwrite => BTreeMap::new(),
        };
        fields.insert(field.into(), op.into());
        Self::PerField(fields)
    }

    /// Parse an untyped operation mapping.
    ///
    /// `null` means default overwrite; otherwise the value must be an object
    /// whose values are catalog tokens.
    pub fn from_json(value: &Value) -> MergeResult<Self> {
        match value {
            Value::Null => Ok(Self::DefaultOverwrite),
            Value::Object(map) => map
                .iter()
                .map(|(field, token)| match token {
                    Value::String(token) => Ok((field.clone(), FieldOperation::named(token.clone()))),
                    other => Err(MergeError::invalid_argument(format!(
                        "operation for field '{field}' must be a string, got {}",
                        type_name(other)
                    ))),
                })
                .collect::<MergeResult<BTreeMap<_, _>>>()
                .map(Self::PerField),
            other => Err(MergeError::invalid_argument(format!(
                "operations must be an object mapping field names to operations, got {}",
                type_name(other)
            ))),
        }
    }
}

impl fmt::Debug for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WholeRecord(_) => f.write_str("WholeRecord(..)"),
            Self::PerField(fields) => f.debug_tuple("PerField").field(fields).finish(),
            Self::DefaultOverwrite => f.write_str("DefaultOverwrite"),
        }
    }
}

#[derive(Clone)]
enum ResolvedField {
    Builtin(BuiltinOperation),
    Custom(Arc<FieldFold>),
}

#[derive(Clone)]
enum Resolved {
    WholeRecord(Arc<RecordFold>),
    PerField(HashMap<String, ResolvedField>),
    Overwrite,
}

/// A validated policy ready to fold records.
#[derive(Clone)]
pub struct ResolvedPolicy {
    inner: Resolved,
}

/// Resolve `spec` into a fold, failing on unknown catalog tokens.
pub fn resolve(spec: &OperationSpec) -> MergeResult<ResolvedPolicy> {
    let inner = match spec {
        OperationSpec::WholeRecord(fold) => Resolved::WholeRecord(Arc::clone(fold)),
        OperationSpec::DefaultOverwrite => Resolved::Overwrite,
        OperationSpec::PerField(fields) => {
            let mut resolved = HashMap::with_capacity(fields.len());
            for (field, op) in fields {
                let op = match op {
                    FieldOperation::Named(token) => ResolvedField::Builtin(
                        token
                            .parse::<BuiltinOperation>()
                            .map_err(|_| MergeError::unsupported(field, token))?,
                    ),
                    FieldOperation::Custom(fold) => ResolvedField::Custom(Arc::clone(fold)),
                };
                resolved.insert(field.clone(), op);
            }
            debug!(fields = resolved.len(), "resolved per-field policy");
            Resolved::PerField(resolved)
        }
    };

    Ok(ResolvedPolicy { inner })
}

impl ResolvedPolicy {
    /// Fold `source` into `target`; both records are consumed.
    pub fn fold(
        &self,
        target: Record,
        source: Record,
        identity: &str,
        state: &mut FoldState,
    ) -> MergeResult<Record> {
        match &self.inner {
            Resolved::WholeRecord(fold) => fold(target, source, identity).map_err(MergeError::Fold),
            Resolved::Overwrite => Ok(overwrite(target, source)),
            Resolved::PerField(fields) => fold_fields(fields, target, source, identity, state),
        }
    }

    /// Whether any declared operation keeps counters across folds.
    pub fn is_stateful(&self) -> bool {
        match &self.inner {
            Resolved::PerField(fields) => fields
                .values()
                .any(|op| matches!(op, ResolvedField::Builtin(b) if b.is_stateful())),
            Resolved::WholeRecord(_) | Resolved::Overwrite => false,
        }
    }
}

impl fmt::Debug for ResolvedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            Resolved::WholeRecord(_) => "WholeRecord",
            Resolved::PerField(_) => "PerField",
            Resolved::Overwrite => "Overwrite",
        };
        f.debug_struct("ResolvedPolicy").field("kind", &kind).finish()
    }
}

fn overwrite(mut target: Record, source: Record) -> Record {
    for (field, value) in source {
        target.insert(field, value);
    }
    target
}

fn fold_fields(
    fields: &HashMap<String, ResolvedField>,
    mut target: Record,
    mut source: Record,
    identity: &str,
    state: &mut FoldState,
) -> MergeResult<Record> {
    // Target fields keep their order; source-only fields follow in source order.
    let mut names: Vec<String> = target.keys().cloned().collect();
    names.extend(
        source
            .keys()
            .filter(|field| !target.contains_key(*field))
            .cloned(),
    );

    // Custom folds run against the untouched records so they can read
    // sibling fields; their inputs are cloned.
    let mut custom: HashMap<String, Option<Value>> = HashMap::new();
    for name in &names {
        if let Some(ResolvedField::Custom(fold)) = fields.get(name) {
            let ctx = FieldContext {
                field: name,
                identity,
                target: &target,
                source: &source,
            };
            let value = fold(target.get(name).cloned(), source.get(name).cloned(), &ctx)
                .map_err(MergeError::Fold)?;
            custom.insert(name.clone(), value);
        }
    }

    let mut merged = Record::new();
    for name in names {
        let target_value = target.remove(&name);
        let source_value = source.remove(&name);

        let value = match fields.get(&name) {
            Some(ResolvedField::Builtin(op)) => {
                let slot = FieldSlot {
                    field: &name,
                    identity,
                };
                op.apply(target_value, source_value, &slot, state)?
            }
            Some(ResolvedField::Custom(_)) => custom.remove(&name).flatten(),
            None => source_value.or(target_value),
        };

        if let Some(value) = value {
            merged.insert(name, value);
        }
    }

    Ok(merged)
}
