//! Per-invocation counter state for stateful operations.
//!
//! One [`FoldState`] is created for each merge call and dropped when it
//! returns. Counters are bucketed by field name and by record identity, so
//! folds of different identities never observe each other's counts while
//! repeated folds of one identity keep accumulating.

use std::collections::{HashMap, HashSet};

/// Counters tracked for one (field, identity) pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Running count maintained by `count` and `countNotNull`.
    pub count: u64,
    /// Canonical encodings of the distinct values seen by `countUniqueValue`.
    pub seen: HashSet<String>,
}

/// Explicit state store shared by every fold of one merge call.
#[derive(Debug, Default)]
pub struct FoldState {
    buckets: HashMap<(String, String), Counters>,
}

impl FoldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for `field` under `identity`, created with `init` on first use.
    pub fn counters_or_init(
        &mut self,
        field: &str,
        identity: &str,
        init: impl FnOnce() -> Counters,
    ) -> &mut Counters {
        self.buckets
            .entry((field.to_string(), identity.to_string()))
            .or_insert_with(init)
    }

    /// Read-only view of the counters for `field` under `identity`.
    pub fn counters(&self, field: &str, identity: &str) -> Option<&Counters> {
        self.buckets.get(&(field.to_string(), identity.to_string()))
    }

    /// Number of (field, identity) buckets in use.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_runs_only_once_per_bucket() {
        let mut state = FoldState::new();
        state
            .counters_or_init("visits", "1", || Counters {
                count: 10,
                ..Default::default()
            })
            .count += 1;
        let counters = state.counters_or_init("visits", "1", || panic!("already initialized"));
        assert_eq!(counters.count, 11);
    }

    #[test]
    fn identities_and_fields_are_isolated() {
        let mut state = FoldState::new();
        state.counters_or_init("visits", "1", Counters::default).count = 3;
        state.counters_or_init("visits", "2", Counters::default).count = 5;
        state.counters_or_init("orders", "1", Counters::default).count = 7;

        assert_eq!(state.len(), 3);
        assert_eq!(state.counters("visits", "1").map(|c| c.count), Some(3));
        assert_eq!(state.counters("visits", "2").map(|c| c.count), Some(5));
        assert_eq!(state.counters("orders", "1").map(|c| c.count), Some(7));
        assert!(state.counters("orders", "2").is_none());
    }
}
