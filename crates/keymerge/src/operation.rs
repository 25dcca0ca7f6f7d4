//! The built-in operation catalog.
//!
//! Every operation folds one field: it receives the accumulated target value
//! and the incoming source value, either of which may be absent (`None`), and
//! returns the merged value. Returning `None` drops the field.
//!
//! `sum`, `max`, `min` and `preserve` are pure. `count`, `countNotNull` and
//! `countUniqueValue` keep counters in a [`FoldState`] bucketed by field and
//! record identity.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{MergeError, MergeResult};
use crate::key::encode_value;
use crate::state::{Counters, FoldState};

/// The field and identity a built-in operation is folding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSlot<'a> {
    /// Name of the field being folded.
    pub field: &'a str,
    /// Identity string shared by the target and source records.
    pub identity: &'a str,
}

/// A named operation from the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuiltinOperation {
    Sum,
    Max,
    Min,
    Preserve,
    Count,
    CountNotNull,
    CountUniqueValue,
}

impl BuiltinOperation {
    /// Every catalog entry, in documentation order.
    pub const ALL: [BuiltinOperation; 7] = [
        Self::Sum,
        Self::Max,
        Self::Min,
        Self::Preserve,
        Self::Count,
        Self::CountNotNull,
        Self::CountUniqueValue,
    ];

    /// The token used to name this operation in an operation mapping.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
            Self::Preserve => "preserve",
            Self::Count => "count",
            Self::CountNotNull => "countNotNull",
            Self::CountUniqueValue => "countUniqueValue",
        }
    }

    /// One-line description for listings.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Sum => "numeric addition, null or missing counts as 0",
            Self::Max => "larger of the two values, a missing or null side loses",
            Self::Min => "smaller of the two values, a missing or null side loses",
            Self::Preserve => "collect every value into one flat list",
            Self::Count => "number of sources folded for the key",
            Self::CountNotNull => "number of non-null values seen for the key",
            Self::CountUniqueValue => "number of distinct non-null values seen for the key",
        }
    }

    /// Whether this operation keeps counters across folds.
    pub fn is_stateful(&self) -> bool {
        matches!(
            self,
            Self::Count | Self::CountNotNull | Self::CountUniqueValue
        )
    }

    /// Fold `source` into `target` for the field described by `ctx`.
    pub fn apply(
        &self,
        target: Option<Value>,
        source: Option<Value>,
        ctx: &FieldSlot<'_>,
        state: &mut FoldState,
    ) -> MergeResult<Option<Value>> {
        match self {
            Self::Sum => sum(target, source, ctx).map(Some),
            Self::Max => Ok(pick(target, source, Ordering::Greater)),
            Self::Min => Ok(pick(target, source, Ordering::Less)),
            Self::Preserve => Ok(Some(preserve(target, source))),
            Self::Count => {
                let counters = state.counters_or_init(ctx.field, ctx.identity, Counters::default);
                counters.count += 1;
                Ok(Some(Value::from(counters.count)))
            }
            Self::CountNotNull => {
                let counters = state.counters_or_init(ctx.field, ctx.identity, || Counters {
                    count: u64::from(is_present(target.as_ref())),
                    ..Default::default()
                });
                if is_present(source.as_ref()) {
                    counters.count += 1;
                }
                Ok(Some(Value::from(counters.count)))
            }
            Self::CountUniqueValue => {
                if state.counters(ctx.field, ctx.identity).is_none() {
                    let mut seed = Counters::default();
                    if let Some(value) = target.as_ref().filter(|v| !v.is_null()) {
                        seed.seen.insert(encode_value(value)?);
                    }
                    state.counters_or_init(ctx.field, ctx.identity, || seed);
                }
                let counters = state.counters_or_init(ctx.field, ctx.identity, Counters::default);
                if let Some(value) = source.as_ref().filter(|v| !v.is_null()) {
                    counters.seen.insert(encode_value(value)?);
                }
                Ok(Some(Value::from(counters.seen.len() as u64)))
            }
        }
    }
}

impl fmt::Display for BuiltinOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltinOperation {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| MergeError::unsupported("", s))
    }
}

fn is_present(value: Option<&Value>) -> bool {
    matches!(value, Some(v) if !v.is_null())
}

fn sum(target: Option<Value>, source: Option<Value>, ctx: &FieldSlot<'_>) -> MergeResult<Value> {
    let left = numeric_operand(target, ctx)?;
    let right = numeric_operand(source, ctx)?;
    add_numbers(&left, &right).ok_or_else(|| MergeError::Overflow {
        operation: BuiltinOperation::Sum.to_string(),
        field: ctx.field.to_string(),
    })
}

fn numeric_operand(value: Option<Value>, ctx: &FieldSlot<'_>) -> MergeResult<Number> {
    match value {
        None | Some(Value::Null) => Ok(Number::from(0)),
        Some(Value::Number(n)) => Ok(n),
        Some(other) => Err(MergeError::InvalidOperand {
            operation: BuiltinOperation::Sum.to_string(),
            field: ctx.field.to_string(),
            value: other,
        }),
    }
}

/// Integer addition when it fits, float addition otherwise. `None` when the
/// float result is not finite.
fn add_numbers(left: &Number, right: &Number) -> Option<Value> {
    if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
        if let Some(total) = l.checked_add(r) {
            return Some(Value::from(total));
        }
    }

    if let (Some(l), Some(r)) = (left.as_u64(), right.as_u64()) {
        if let Some(total) = l.checked_add(r) {
            return Some(Value::from(total));
        }
    }

    let l = left.as_f64().unwrap_or_default();
    let r = right.as_f64().unwrap_or_default();
    Number::from_f64(l + r).map(Value::Number)
}

/// Keep the target when it compares as `keep`, otherwise take the source.
/// A missing or null side always loses to a concrete one.
fn pick(target: Option<Value>, source: Option<Value>, keep: Ordering) -> Option<Value> {
    let target_concrete = is_present(target.as_ref());
    let source_concrete = is_present(source.as_ref());

    match (target_concrete, source_concrete) {
        (true, true) => {
            let ordering = match (&target, &source) {
                (Some(t), Some(s)) => compare_values(t, s),
                _ => Ordering::Equal,
            };
            if ordering == keep { target } else { source }
        }
        (true, false) => target,
        (false, true) => source,
        (false, false) => target.or(source),
    }
}

/// Total order over non-null JSON values: booleans, then numbers, then
/// strings. Arrays and objects compare equal to each other.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    let ordering = value_rank(left).cmp(&value_rank(right));
    if ordering != Ordering::Equal {
        return ordering;
    }

    match (left, right) {
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::Number(l), Value::Number(r)) => compare_numbers(l, r),
        (Value::String(l), Value::String(r)) => l.cmp(r),
        _ => Ordering::Equal,
    }
}

fn compare_numbers(left: &Number, right: &Number) -> Ordering {
    if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
        return l.cmp(&r);
    }

    if let (Some(l), Some(r)) = (left.as_u64(), right.as_u64()) {
        return l.cmp(&r);
    }

    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

fn value_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) | Value::Object(_) => 4,
    }
}

fn preserve(target: Option<Value>, source: Option<Value>) -> Value {
    let mut values = Vec::new();
    for side in [target, source].into_iter().flatten() {
        match side {
            Value::Array(items) => values.extend(items),
            other => values.push(other),
        }
    }
    Value::Array(values)
}
