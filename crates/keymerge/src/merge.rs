//! The merge driver.
//!
//! Sources are bucketed by identity, the policy is resolved once, and each
//! target folds its bucket in source order. The output always has one record
//! per target, in target order.
//!
//! Records are moved, not shared: a source value folded into a target ends up
//! owned by the output. Use [`Merger::merge_cloned`] to keep the inputs.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::MergeConfig;
use crate::error::{MergeError, MergeResult};
use crate::key::encode;
use crate::policy::{resolve, OperationSpec};
use crate::record::{records_from_value, KeySpec, Record};
use crate::state::FoldState;

/// Counters describing one merge call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Number of target records (and of output records).
    pub targets: usize,
    /// Number of source records supplied.
    pub sources: usize,
    /// Distinct source identities.
    pub buckets: usize,
    /// Targets that had at least one matching source.
    pub matched_targets: usize,
    /// Source folds applied across all targets.
    pub folds: usize,
    /// Sources whose identity matched no target.
    pub dropped_sources: usize,
}

/// Merges source records into target records sharing the same key.
#[derive(Clone, Debug)]
pub struct Merger {
    keys: KeySpec,
    operations: OperationSpec,
}

impl Merger {
    /// Create a merger over `keys` using default overwrite semantics.
    pub fn new<I, S>(keys: I) -> MergeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::with_key_spec(KeySpec::new(keys)?))
    }

    pub fn with_key_spec(keys: KeySpec) -> Self {
        Self {
            keys,
            operations: OperationSpec::DefaultOverwrite,
        }
    }

    /// Build a merger from a loaded configuration.
    pub fn from_config(config: &MergeConfig) -> MergeResult<Self> {
        Ok(Self::with_key_spec(config.key_spec()?).with_operations(config.operation_spec()))
    }

    pub fn with_operations(mut self, operations: OperationSpec) -> Self {
        self.operations = operations;
        self
    }

    pub fn keys(&self) -> &KeySpec {
        &self.keys
    }

    pub fn operations(&self) -> &OperationSpec {
        &self.operations
    }

    /// Merge `sources` into `targets`.
    pub fn merge(&self, targets: Vec<Record>, sources: Vec<Record>) -> MergeResult<Vec<Record>> {
        self.merge_with_report(targets, sources)
            .map(|(merged, _)| merged)
    }

    /// Merge copies of the inputs, leaving the caller's records untouched.
    pub fn merge_cloned(&self, targets: &[Record], sources: &[Record]) -> MergeResult<Vec<Record>> {
        self.merge(targets.to_vec(), sources.to_vec())
    }

    /// Merge and return counters describing what happened.
    pub fn merge_with_report(
        &self,
        targets: Vec<Record>,
        sources: Vec<Record>,
    ) -> MergeResult<(Vec<Record>, MergeReport)> {
        if targets.is_empty() {
            return Err(MergeError::invalid_argument(
                "targets must be a non-empty array of objects",
            ));
        }
        if sources.is_empty() {
            return Err(MergeError::invalid_argument(
                "sources must be a non-empty array of objects",
            ));
        }

        let policy = resolve(&self.operations)?;

        let mut report = MergeReport {
            targets: targets.len(),
            sources: sources.len(),
            ..Default::default()
        };

        let mut buckets: HashMap<String, Vec<Record>> = HashMap::new();
        for source in sources {
            let identity = encode(&source, &self.keys)?;
            buckets.entry(identity).or_default().push(source);
        }
        report.buckets = buckets.len();

        let identities = targets
            .iter()
            .map(|target| encode(target, &self.keys))
            .collect::<MergeResult<Vec<_>>>()?;

        // Targets are not deduplicated; a bucket shared by several targets is
        // cloned for all but the last of them.
        let mut remaining: HashMap<&str, usize> = HashMap::new();
        for identity in &identities {
            *remaining.entry(identity.as_str()).or_default() += 1;
        }

        debug!(
            targets = report.targets,
            sources = report.sources,
            buckets = report.buckets,
            stateful = policy.is_stateful(),
            "merging records"
        );

        let mut state = FoldState::new();
        let mut merged = Vec::with_capacity(targets.len());

        for (target, identity) in targets.into_iter().zip(&identities) {
            let last_use = match remaining.get_mut(identity.as_str()) {
                Some(count) => {
                    *count -= 1;
                    *count == 0
                }
                None => true,
            };
            let bucket = if last_use {
                buckets.remove(identity)
            } else {
                buckets.get(identity).cloned()
            };

            let Some(bucket) = bucket else {
                merged.push(target);
                continue;
            };

            report.matched_targets += 1;
            let mut accumulator = target;
            for source in bucket {
                accumulator = policy.fold(accumulator, source, identity, &mut state)?;
                report.folds += 1;
                trace!(identity = %identity, "folded source");
            }
            merged.push(accumulator);
        }

        if !state.is_empty() {
            debug!(counter_buckets = state.len(), "stateful operations kept counters");
        }

        report.dropped_sources = buckets.values().map(Vec::len).sum();
        if report.dropped_sources > 0 {
            debug!(
                dropped = report.dropped_sources,
                "sources matched no target"
            );
        }

        Ok((merged, report))
    }
}

/// Merge `sources` into `targets` by the composite key `keys`.
///
/// This is the library's one-call entry point; see [`Merger`] for reuse and
/// reporting.
pub fn merge_by_keys<I, S>(
    targets: Vec<Record>,
    sources: Vec<Record>,
    keys: I,
    operations: OperationSpec,
) -> MergeResult<Vec<Record>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Merger::new(keys)?
        .with_operations(operations)
        .merge(targets, sources)
}

/// Merge untyped JSON input after a shallow shape check.
///
/// `targets` and `sources` must be non-empty arrays of objects, `keys` a
/// non-empty array of strings, and `operations` either `null` or an object
/// mapping field names to catalog tokens. Returns a JSON array.
pub fn merge_values(
    targets: Value,
    sources: Value,
    keys: &Value,
    operations: &Value,
) -> MergeResult<Value> {
    let targets = records_from_value(targets, "targets")?;
    let sources = records_from_value(sources, "sources")?;
    let keys = key_spec_from_value(keys)?;
    let operations = OperationSpec::from_json(operations)?;

    let merged = Merger::with_key_spec(keys)
        .with_operations(operations)
        .merge(targets, sources)?;
    Ok(Value::Array(merged.into_iter().map(Value::Object).collect()))
}

fn key_spec_from_value(keys: &Value) -> MergeResult<KeySpec> {
    let Value::Array(items) = keys else {
        return Err(MergeError::invalid_argument(
            "keys must be an array of field names",
        ));
    };
    let names = items
        .iter()
        .map(|item| match item {
            Value::String(name) => Ok(name.clone()),
            _ => Err(MergeError::invalid_argument(
                "keys must be an array of field names",
            )),
        })
        .collect::<MergeResult<Vec<_>>>()?;
    KeySpec::new(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::BuiltinOperation;
    use serde_json::json;

    fn records(value: Value) -> Vec<Record> {
        records_from_value(value, "test").unwrap()
    }

    fn as_value(records: Vec<Record>) -> Value {
        Value::Array(records.into_iter().map(Value::Object).collect())
    }

    #[test]
    fn rejects_empty_inputs() {
        let merger = Merger::new(["key"]).unwrap();
        assert!(merger.merge(Vec::new(), records(json!([{"key": 1}]))).is_err());
        assert!(merger.merge(records(json!([{"key": 1}])), Vec::new()).is_err());
    }

    #[test]
    fn unknown_operation_fails_before_merging() {
        let merger = Merger::new(["key"])
            .unwrap()
            .with_operations(OperationSpec::per_field([("score", "bogus")]));
        let err = merger
            .merge(records(json!([{"key": 1}])), records(json!([{"key": 1}])))
            .unwrap_err();
        assert!(matches!(err, MergeError::UnsupportedOperation { .. }));
    }

    #[test]
    fn report_counts_matches_folds_and_drops() {
        let merger = Merger::new(["key"])
            .unwrap()
            .with_operations(OperationSpec::per_field([("score", BuiltinOperation::Sum)]));
        let (merged, report) = merger
            .merge_with_report(
                records(json!([{"key": 1, "score": 1}, {"key": 2, "score": 2}])),
                records(json!([
                    {"key": 2, "score": 5},
                    {"key": 2, "score": 6},
                    {"key": 9, "score": 1}
                ])),
            )
            .unwrap();

        assert_eq!(
            as_value(merged),
            json!([{"key": 1, "score": 1}, {"key": 2, "score": 13}])
        );
        assert_eq!(
            report,
            MergeReport {
                targets: 2,
                sources: 3,
                buckets: 2,
                matched_targets: 1,
                folds: 2,
                dropped_sources: 1,
            }
        );
    }

    #[test]
    fn float_overflow_in_sum_fails_instead_of_resetting() {
        let err = merge_by_keys(
            records(json!([{"key": 1, "score": 1e308}])),
            records(json!([{"key": 1, "score": 1e308}, {"key": 1, "score": 5}])),
            ["key"],
            OperationSpec::per_field([("score", "sum")]),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::Overflow { ref field, .. } if field == "score"));
    }

    #[test]
    fn duplicate_targets_each_receive_the_bucket() {
        let merged = merge_by_keys(
            records(json!([{"key": 1, "score": 1}, {"key": 1, "score": 10}])),
            records(json!([{"key": 1, "score": 5}])),
            ["key"],
            OperationSpec::per_field([("score", "sum")]),
        )
        .unwrap();
        assert_eq!(
            as_value(merged),
            json!([{"key": 1, "score": 6}, {"key": 1, "score": 15}])
        );
    }

    #[test]
    fn counters_persist_across_targets_sharing_an_identity() {
        let merged = merge_by_keys(
            records(json!([{"key": 1}, {"key": 1}])),
            records(json!([{"key": 1, "visits": 0}, {"key": 1, "visits": 0}])),
            ["key"],
            OperationSpec::per_field([("visits", "count")]),
        )
        .unwrap();
        assert_eq!(
            as_value(merged),
            json!([{"key": 1, "visits": 2}, {"key": 1, "visits": 4}])
        );
    }

    #[test]
    fn merge_cloned_leaves_inputs_untouched() {
        let targets = records(json!([{"key": 1, "tags": ["a"]}]));
        let sources = records(json!([{"key": 1, "tags": ["b"]}]));
        let merger = Merger::new(["key"])
            .unwrap()
            .with_operations(OperationSpec::per_field([("tags", "preserve")]));

        let merged = merger.merge_cloned(&targets, &sources).unwrap();
        assert_eq!(as_value(merged), json!([{"key": 1, "tags": ["a", "b"]}]));
        assert_eq!(as_value(targets), json!([{"key": 1, "tags": ["a"]}]));
        assert_eq!(as_value(sources), json!([{"key": 1, "tags": ["b"]}]));
    }

    #[test]
    fn from_config_uses_keys_and_operations() {
        let config = MergeConfig::from_toml_str("keys = [\"id\"]\n[operations]\nn = \"sum\"\n").unwrap();
        let merged = Merger::from_config(&config)
            .unwrap()
            .merge(records(json!([{"id": "a", "n": 1}])), records(json!([{"id": "a", "n": 2}])))
            .unwrap();
        assert_eq!(as_value(merged), json!([{"id": "a", "n": 3}]));
    }

    #[test]
    fn merge_values_checks_shapes() {
        let ok = merge_values(
            json!([{"key": 1, "a": 1}]),
            json!([{"key": 1, "a": 2}]),
            &json!(["key"]),
            &Value::Null,
        )
        .unwrap();
        assert_eq!(ok, json!([{"key": 1, "a": 2}]));

        let bad_targets = merge_values(json!({}), json!([{}]), &json!(["key"]), &Value::Null);
        assert!(matches!(bad_targets, Err(MergeError::InvalidArgument(_))));

        let bad_keys = merge_values(json!([{}]), json!([{}]), &json!([1]), &Value::Null);
        assert!(matches!(bad_keys, Err(MergeError::InvalidArgument(_))));

        let bad_ops = merge_values(json!([{}]), json!([{}]), &json!(["key"]), &json!("sum"));
        assert!(matches!(bad_ops, Err(MergeError::InvalidArgument(_))));
    }
}
