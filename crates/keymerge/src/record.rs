//! Records and key specifications.
//!
//! A [`Record`] is an insertion-ordered JSON object. Field enumeration order
//! matters: the key encoder walks a record's own fields in that order.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::{MergeError, MergeResult};

/// An open mapping from field name to JSON value, in insertion order.
pub type Record = Map<String, Value>;

/// Ordered, non-empty set of field names that defines composite identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySpec {
    fields: Vec<String>,
}

impl KeySpec {
    /// Build a key specification, rejecting empty lists, empty names and
    /// duplicate names.
    pub fn new<I, S>(fields: I) -> MergeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(MergeError::invalid_argument(
                "keys must be a non-empty list of field names",
            ));
        }

        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.is_empty() {
                return Err(MergeError::invalid_argument(
                    "key field names must not be empty",
                ));
            }
            if !seen.insert(field.as_str()) {
                return Err(MergeError::invalid_argument(format!(
                    "duplicate key field '{field}'"
                )));
            }
        }

        Ok(Self { fields })
    }

    /// Whether `field` is one of the key fields.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Key fields in declared order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Convert an untyped JSON collection into records.
///
/// `label` names the collection in error messages ("targets", "sources").
/// The collection must be a non-empty array whose elements are all objects.
pub fn records_from_value(value: Value, label: &str) -> MergeResult<Vec<Record>> {
    let Value::Array(items) = value else {
        return Err(MergeError::invalid_argument(format!(
            "{label} must be an array of objects"
        )));
    };
    records_from_values(items, label)
}

/// Convert a list of JSON values into records, checking each is an object.
fn records_from_values(items: Vec<Value>, label: &str) -> MergeResult<Vec<Record>> {
    if items.is_empty() {
        return Err(MergeError::invalid_argument(format!(
            "{label} must be a non-empty array of objects"
        )));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(MergeError::invalid_argument(format!(
                "{label}[{index}] must be an object, got {}",
                type_name(&other)
            ))),
        })
        .collect()
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
