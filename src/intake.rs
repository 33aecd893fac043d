//! Loading the medical report.
//!
//! A missing report is the one failure that stops a run before any
//! advisory call is made.

use crate::models::Document;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extensions listed as candidate reports.
pub const REPORT_EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(
        "Medical report not found: {}\nMake sure the file exists and the filename is correct.",
        .path.display()
    )]
    NotFound { path: PathBuf },

    #[error("Failed to read medical report {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolve `path` against the working directory without touching the disk.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Read the report at `path` as UTF-8.
pub fn load_document(path: &Path) -> Result<Document, IntakeError> {
    if !path.is_file() {
        return Err(IntakeError::NotFound {
            path: absolute(path),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| IntakeError::Read {
        path: absolute(path),
        source,
    })?;

    let document = Document::new(path, content);
    if document.is_blank() {
        warn!("Medical report {} is empty", path.display());
    } else {
        info!(
            "Loaded medical report {} ({} lines)",
            path.display(),
            document.line_count()
        );
    }

    Ok(document)
}

/// A candidate report found in the reports directory.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    /// Path relative to the reports directory.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
}

/// List report files under `dir`, sorted by path.
pub fn list_documents(dir: &Path, extensions: &[&str]) -> Result<Vec<DocumentEntry>> {
    if !dir.is_dir() {
        anyhow::bail!("Reports directory not found: {}", absolute(dir).display());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("Failed to read reports directory {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            debug!("Skipping {}", path.display());
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let rel_path = path.strip_prefix(dir).unwrap_or(path).to_path_buf();
        entries.push(DocumentEntry {
            path: rel_path,
            size,
        });
    }

    Ok(entries)
}
