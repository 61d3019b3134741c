//! # stm-config
//!
//! Layered configuration loading for stix2misp using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`STIX2MISP_*` prefix, `__` as separator)
//! 2. An explicit file passed by the caller (`--config`)
//! 3. Project-level `.stix2misp/config.toml`
//! 4. User-level `~/.config/stix2misp/config.toml`
//! 5. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `STIX2MISP_TRANSLATE__CUSTOM_FIELD_PREFIX` -> `translate.custom_field_prefix`,
//! `STIX2MISP_GENERAL__OUTPUT_SUFFIX` -> `general.output_suffix`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use stm_config::Stix2MispConfig;
//!
//! let config = Stix2MispConfig::load_with_dotenv().expect("config");
//! assert!(!config.translate.custom_field_prefix.is_empty());
//! ```

mod error;
mod general;
mod mappings;
mod translate;

pub use error::ConfigError;
pub use general::GeneralConfig;
pub use mappings::MappingOverrides;
pub use translate::TranslateConfig;

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "STIX2MISP_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Stix2MispConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub translate: TranslateConfig,
    #[serde(default)]
    pub mappings: MappingOverrides,
}

impl Stix2MispConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` loading.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when extraction fails or a value is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_file(None)
    }

    /// Load configuration, layering `explicit` above the discovered files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] when `explicit` does not exist, or
    /// any extraction/validation error.
    pub fn load_with_file(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Self::base_figment();
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path.to_path_buf()));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(&figment)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Build the full figment provider chain without an explicit file.
    ///
    /// Public so tests can inspect the figment directly or add providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        Self::base_figment().merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract and validate a config from any figment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when extraction fails or a value is invalid.
    pub fn extract(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.translate.validate()?;
        config.general.validate()?;
        Ok(config)
    }

    /// Defaults, then user-global, then project-local TOML.
    fn base_figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".stix2misp/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stix2misp").join("config.toml"))
    }
}
