//! Keyed record merging.
//!
//! Folds an ordered collection of source records into the target records
//! that share the same composite key. Sources sharing a key are folded one
//! after another, in source order, using either a whole-record fold, a
//! per-field policy built from the operation catalog, or a shallow
//! overwrite.
//!
//! # Key Types
//!
//! - [`Merger`] / [`merge_by_keys`] -- The merge driver
//! - [`OperationSpec`] / [`FieldOperation`] -- How sources fold into targets
//! - [`BuiltinOperation`] -- The operation catalog (`sum`, `max`, `count`, ...)
//! - [`KeySpec`] / [`Record`] -- Identity fields and the record type
//! - [`MergeConfig`] -- TOML-loadable keys and operations
//!
//! # Example
//!
//! ```
//! use keymerge::{merge_by_keys, OperationSpec, Record};
//! use serde_json::json;
//!
//! fn records(value: serde_json::Value) -> Vec<Record> {
//!     serde_json::from_value(value).unwrap()
//! }
//!
//! let merged = merge_by_keys(
//!     records(json!([{"key": 1, "score": 1}, {"key": 2, "score": 2}])),
//!     records(json!([{"key": 2, "score": 5}, {"key": 2, "score": 6}])),
//!     ["key"],
//!     OperationSpec::per_field([("score", "sum")]),
//! )
//! .unwrap();
//!
//! assert_eq!(merged[1]["score"], json!(13));
//! ```

pub mod config;
pub mod error;
pub mod key;
pub mod merge;
pub mod operation;
pub mod policy;
pub mod record;
pub mod state;

pub use config::MergeConfig;
pub use error::{BoxError, MergeError, MergeResult};
pub use merge::{merge_by_keys, merge_values, MergeReport, Merger};
pub use operation::{BuiltinOperation, FieldSlot};
pub use policy::{resolve, FieldContext, FieldOperation, OperationSpec, ResolvedPolicy};
pub use record::{KeySpec, Record};
pub use state::FoldState;
