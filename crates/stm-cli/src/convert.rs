use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use stm_config::Stix2MispConfig;
use stm_core::output::EventDocument;
use stm_translate::{RunReport, TranslationRun};

/// Where the event went and what the run recorded.
#[derive(Debug)]
pub struct Conversion {
    pub output: PathBuf,
    pub report: RunReport,
}

/// `<input><suffix>`, next to the input.
#[must_use]
pub fn default_output_path(input: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Read `input`, translate it, and write the event (and optionally the run
/// report).
///
/// # Errors
///
/// Fails when a file cannot be read or written, and on fatal translation
/// errors (unreadable bundle, nothing translatable).
pub fn convert(
    config: &Stix2MispConfig,
    input: &Path,
    output: Option<&Path>,
    report_path: Option<&Path>,
) -> anyhow::Result<Conversion> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let outcome = TranslationRun::new(config).translate_str(&text)?;

    let output = output.map_or_else(
        || default_output_path(input, &config.general.output_suffix),
        Path::to_path_buf,
    );
    let document = if config.general.compact_output {
        serde_json::to_string(&EventDocument {
            event: &outcome.event,
        })?
    } else {
        outcome.event.to_document_string()?
    };
    fs::write(&output, document)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::debug!(path = %output.display(), "wrote event");

    if let Some(path) = report_path {
        let rendered = serde_json::to_string_pretty(&outcome.report)?;
        fs::write(path, rendered)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    Ok(Conversion {
        output,
        report: outcome.report,
    })
}
