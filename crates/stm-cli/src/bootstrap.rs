use std::path::Path;

use anyhow::Context;
use stm_config::Stix2MispConfig;

/// Load `.env` from the working directory (if any), then the layered
/// configuration with `explicit` on top of the discovered files.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<Stix2MispConfig> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded dotenv file"),
        Err(error) if error.not_found() => {}
        Err(error) => return Err(anyhow::anyhow!("failed to load dotenv file: {error}")),
    }

    Stix2MispConfig::load_with_file(explicit).with_context(|| match explicit {
        Some(path) => format!("failed to load configuration with {}", path.display()),
        None => "failed to load configuration".to_string(),
    })
}
