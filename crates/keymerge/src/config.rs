use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MergeError, MergeResult};
use crate::operation::BuiltinOperation;
use crate::policy::{FieldOperation, OperationSpec};
use crate::record::KeySpec;

/// Declarative merge configuration, usually loaded from TOML.
///
/// ```toml
/// keys = ["key"]
///
/// [operations]
/// score = "sum"
/// timestamp = "max"
/// ```
///
/// Operation tokens are kept as strings so that an unknown token surfaces
/// as an unsupported operation when the policy is resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Key fields defining record identity.
    pub keys: Vec<String>,
    /// Field name to catalog token. Empty means default overwrite.
    pub operations: BTreeMap<String, String>,
}

impl MergeConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> MergeResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> MergeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MergeError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> MergeResult<String> {
        toml::to_string(self).map_err(|e| MergeError::Config(e.to_string()))
    }

    /// Check keys and operation tokens without merging anything.
    pub fn validate(&self) -> MergeResult<()> {
        self.key_spec()?;
        for (field, token) in &self.operations {
            token
                .parse::<BuiltinOperation>()
                .map_err(|_| MergeError::unsupported(field, token))?;
        }
        Ok(())
    }

    /// The configured key specification.
    pub fn key_spec(&self) -> MergeResult<KeySpec> {
        KeySpec::new(self.keys.iter().cloned())
    }

    /// The configured operation specification.
    pub fn operation_spec(&self) -> OperationSpec {
        if self.operations.is_empty() {
            return OperationSpec::DefaultOverwrite;
        }
        OperationSpec::PerField(
            self.operations
                .iter()
                .map(|(field, token)| (field.clone(), FieldOperation::named(token.clone())))
                .collect(),
        )
    }
}
