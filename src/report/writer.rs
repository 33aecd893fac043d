//! Writing the final diagnosis to disk.
//!
//! Text output is the header line plus the diagnosis body, nothing else.
//! JSON output carries the whole run.

use crate::cli::OutputFormat;
use crate::models::{Document, PanelReport};
use crate::panel::PanelRun;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Render a run in the requested format.
pub fn render_output(
    format: OutputFormat,
    run: &PanelRun,
    document: &Document,
    provider: &str,
    model: &str,
) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(run.diagnosis.text()),
        OutputFormat::Json => generate_json_report(&run.to_report(document, provider, model)),
    }
}

/// Generate a JSON report.
pub fn generate_json_report(report: &PanelReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write `contents` as UTF-8 to `path`, creating parent directories.
///
/// Returns the absolute path of the written file.
pub fn write_output(path: &Path, contents: &str) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    fs::write(path, contents.as_bytes())
        .with_context(|| format!("Failed to write output to {}", path.display()))?;
    debug!("Wrote {} bytes to {}", contents.len(), path.display());

    Ok(fs::canonicalize(path).unwrap_or_else(|_| crate::intake::absolute(path)))
}
