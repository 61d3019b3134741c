//! Translation behaviour configuration.

use serde::{Deserialize, Serialize};
use stm_core::bundle::DEFAULT_ORIGIN_LABEL;

use crate::ConfigError;

fn default_custom_field_prefix() -> String {
    "x_misp_".to_string()
}

fn default_composite_separator() -> String {
    "|".to_string()
}

const fn default_pattern_to_ids() -> bool {
    true
}

fn default_origin_label() -> String {
    DEFAULT_ORIGIN_LABEL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TranslateConfig {
    /// Prefix that marks an observable field as carrying a custom attribute
    /// (`<prefix><type>_<relation>`).
    #[serde(default = "default_custom_field_prefix")]
    pub custom_field_prefix: String,

    /// Separator joining the parts of a composite attribute value.
    #[serde(default = "default_composite_separator")]
    pub composite_separator: String,

    /// Detection flag for attributes derived from indicator patterns.
    #[serde(default = "default_pattern_to_ids")]
    pub pattern_to_ids: bool,

    /// Detection flag for attributes derived from observed data.
    #[serde(default)]
    pub observable_to_ids: bool,

    /// Report label identifying bundles exported by a MISP instance.
    #[serde(default = "default_origin_label")]
    pub origin_label: String,
}

impl TranslateConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.custom_field_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "translate.custom_field_prefix".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.composite_separator.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "translate.composite_separator".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.origin_label.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "translate.origin_label".into(),
                reason: "must not be blank".into(),
            });
        }
        Ok(())
    }
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            custom_field_prefix: default_custom_field_prefix(),
            composite_separator: default_composite_separator(),
            pattern_to_ids: default_pattern_to_ids(),
            observable_to_ids: false,
            origin_label: default_origin_label(),
        }
    }
}
