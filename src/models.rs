//! Data models for the advisory panel.
//!
//! This module contains the core data structures that flow through a run:
//! the input document, per-role outcomes, the aggregate handed to the
//! team role, the final diagnosis and the serializable run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Header line written in front of every final diagnosis.
pub const DIAGNOSIS_HEADER: &str = "### Final Diagnosis:\n\n";

/// Body used when the aggregation call fails or returns nothing.
pub const FALLBACK_DIAGNOSIS: &str =
    "No diagnosis returned (LLM call failed or returned nothing).";

/// Placeholder substituted for a role that produced no usable report.
pub fn placeholder_for(role: &str) -> String {
    format!("(No report returned from {})", role)
}

/// A clinical narrative loaded from disk. The content is never interpreted.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path the document was read from.
    pub path: PathBuf,
    /// Raw text.
    pub content: String,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Number of lines in the document.
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// What a single advisory task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleOutcome {
    /// The role returned usable text.
    Report(String),
    /// The role failed; carries a human-readable cause.
    Failed(String),
}

/// A role that failed during dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFailure {
    pub role: String,
    pub cause: String,
}

/// One entry of the aggregate: a role and the text it contributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleReport {
    pub role: String,
    pub text: String,
    /// True when `text` is the placeholder rather than a real report.
    pub substituted: bool,
}

/// Role name to report text, with placeholders for failures.
///
/// Entries keep the order in which roles were submitted, never the order
/// in which they completed. Every submitted role is present exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateInput {
    entries: Vec<RoleReport>,
}

impl AggregateInput {
    /// Build the aggregate for `submitted` roles from whatever outcomes were
    /// collected. A role with no outcome at all is treated like a failure.
    pub fn from_outcomes(submitted: &[String], outcomes: &HashMap<String, RoleOutcome>) -> Self {
        let entries = submitted
            .iter()
            .map(|role| {
                let (text, substituted) = match outcomes.get(role) {
                    Some(RoleOutcome::Report(text)) if !text.trim().is_empty() => {
                        (text.clone(), false)
                    }
                    _ => (placeholder_for(role), true),
                };
                RoleReport {
                    role: role.clone(),
                    text,
                    substituted,
                }
            })
            .collect();

        Self { entries }
    }

    /// Look up the text for a role.
    pub fn get(&self, role: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.role == role)
            .map(|e| e.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleReport> {
        self.entries.iter()
    }

    /// Names in submission order.
    pub fn role_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.role.as_str()).collect()
    }

    /// Number of roles whose text is a placeholder.
    pub fn substituted_count(&self) -> usize {
        self.entries.iter().filter(|e| e.substituted).count()
    }

    /// Sorted map view for comparisons.
    #[cfg(test)]
    pub fn to_map(&self) -> std::collections::BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|e| (e.role.clone(), e.text.clone()))
            .collect()
    }

    pub fn into_entries(self) -> Vec<RoleReport> {
        self.entries
    }
}

/// The consolidated opinion produced by the aggregation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalDiagnosis {
    body: String,
    fallback: bool,
}

impl FinalDiagnosis {
    /// Wrap a response body. Blank bodies fall back to [`FALLBACK_DIAGNOSIS`].
    pub fn new(body: impl Into<String>) -> Self {
        let body = body.into();
        if body.trim().is_empty() {
            Self::fallback()
        } else {
            Self {
                body,
                fallback: false,
            }
        }
    }

    pub fn fallback() -> Self {
        Self {
            body: FALLBACK_DIAGNOSIS.to_string(),
            fallback: true,
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Header plus body, exactly as written to the text output.
    pub fn text(&self) -> String {
        format!("{}{}", DIAGNOSIS_HEADER, self.body)
    }
}

impl fmt::Display for FinalDiagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", DIAGNOSIS_HEADER, self.body)
    }
}

/// Metadata about a panel run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelMetadata {
    /// Path of the input document.
    pub input_path: String,
    /// Date and time of the run.
    pub analysis_date: DateTime<Utc>,
    /// Provider used (ollama, openai).
    pub provider: String,
    /// Name of the LLM model used.
    pub model_used: String,
    /// Number of roles dispatched.
    pub roles_dispatched: usize,
    /// Number of roles that failed.
    pub roles_failed: usize,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete run, as written by the JSON output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelReport {
    pub metadata: PanelMetadata,
    /// Per-role texts in submission order.
    pub reports: Vec<RoleReport>,
    /// Roles that failed and why.
    pub failures: Vec<RoleFailure>,
    /// Header-wrapped final diagnosis.
    pub final_diagnosis: String,
    /// Whether the final diagnosis is the fallback text.
    pub fallback_used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> Vec<String> {
        vec![
            "Cardiologist".to_string(),
            "Psychologist".to_string(),
            "Pulmonologist".to_string(),
        ]
    }

    #[test]
    fn test_placeholder_format() {
        assert_eq!(
            placeholder_for("Cardiologist"),
            "(No report returned from Cardiologist)"
        );
    }

    #[test]
    fn test_aggregate_fills_every_submitted_role() {
        let mut outcomes = HashMap::new();
        outcomes.insert(
            "Cardiologist".to_string(),
            RoleOutcome::Report("Sinus tachycardia".to_string()),
        );
        outcomes.insert(
            "Psychologist".to_string(),
            RoleOutcome::Failed("boom".to_string()),
        );
        // Pulmonologist deliberately missing

        let input = AggregateInput::from_outcomes(&roles(), &outcomes);

        assert_eq!(input.len(), 3);
        assert_eq!(input.get("Cardiologist"), Some("Sinus tachycardia"));
        assert_eq!(
            input.get("Psychologist"),
            Some("(No report returned from Psychologist)")
        );
        assert_eq!(
            input.get("Pulmonologist"),
            Some("(No report returned from Pulmonologist)")
        );
        assert_eq!(input.substituted_count(), 2);
    }

    #[test]
    fn test_aggregate_keeps_submission_order() {
        let outcomes: HashMap<String, RoleOutcome> = roles()
            .into_iter()
            .rev()
            .map(|r| {
                let text = format!("{} opinion", r);
                (r, RoleOutcome::Report(text))
            })
            .collect();

        let input = AggregateInput::from_outcomes(&roles(), &outcomes);
        assert_eq!(
            input.role_names(),
            vec!["Cardiologist", "Psychologist", "Pulmonologist"]
        );
    }

    #[test]
    fn test_blank_report_is_substituted() {
        let mut outcomes = HashMap::new();
        outcomes.insert(
            "Pulmonologist".to_string(),
            RoleOutcome::Report("   \n".to_string()),
        );
        let submitted = vec!["Pulmonologist".to_string()];

        let input = AggregateInput::from_outcomes(&submitted, &outcomes);
        assert_eq!(
            input.get("Pulmonologist"),
            Some("(No report returned from Pulmonologist)")
        );
    }

    #[test]
    fn test_final_diagnosis_text() {
        let diagnosis = FinalDiagnosis::new("Combined opinion");
        assert_eq!(diagnosis.text(), "### Final Diagnosis:\n\nCombined opinion");
        assert!(!diagnosis.is_fallback());
        assert_eq!(diagnosis.to_string(), diagnosis.text());
    }

    #[test]
    fn test_final_diagnosis_fallback_on_blank() {
        let diagnosis = FinalDiagnosis::new("");
        assert!(diagnosis.is_fallback());
        assert_eq!(
            diagnosis.text(),
            "### Final Diagnosis:\n\nNo diagnosis returned (LLM call failed or returned nothing)."
        );
    }

    #[test]
    fn test_document_helpers() {
        let doc = Document::new("report.txt", "line one\nline two\n");
        assert_eq!(doc.line_count(), 2);
        assert!(!doc.is_blank());
        assert!(Document::new("empty.txt", "  ").is_blank());
    }
}
