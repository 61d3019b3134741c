//! General application configuration.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Suffix appended to the input path to name the output file.
fn default_output_suffix() -> String {
    ".stix2".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Suffix of the sibling output file (`<input><suffix>`).
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    /// Write the output document on a single line instead of indented.
    #[serde(default)]
    pub compact_output: bool,
}

impl GeneralConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.output_suffix.is_empty() || self.output_suffix.contains(['/', '\\']) {
            return Err(ConfigError::InvalidValue {
                field: "general.output_suffix".into(),
                reason: "must be non-empty and contain no path separators".into(),
            });
        }
        Ok(())
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_suffix: default_output_suffix(),
            compact_output: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = GeneralConfig::default();
        assert_eq!(config.output_suffix, ".stix2");
        assert!(!config.compact_output);
    }

    #[test]
    fn suffix_with_separator_is_rejected() {
        let config = GeneralConfig {
            output_suffix: "/out.json".into(),
            ..GeneralConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
