//! Role definitions for the advisory panel.
//!
//! A role is plain data: a name, a system prompt and a user-prompt
//! template. The dispatcher runs every role through the same code path.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Placeholder replaced with the medical report in specialist templates.
pub const DOCUMENT_PLACEHOLDER: &str = "{document}";

/// Placeholder replaced with the combined specialist reports in the team template.
pub const REPORTS_PLACEHOLDER: &str = "{reports}";

/// A named advisory perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Stable key for results (e.g. "Cardiologist").
    pub name: String,
    /// Sent as the system message.
    pub system_prompt: String,
    /// User message template.
    pub template: String,
}

impl RoleSpec {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            template: template.into(),
        }
    }

    /// Fill the template with the medical report.
    pub fn render_document(&self, document: &str) -> String {
        self.template.replace(DOCUMENT_PLACEHOLDER, document)
    }

    /// Fill the template with the combined specialist reports.
    pub fn render_reports(&self, reports: &str) -> String {
        self.template.replace(REPORTS_PLACEHOLDER, reports)
    }

    pub fn check_document_template(&self) -> Result<()> {
        if !self.template.contains(DOCUMENT_PLACEHOLDER) {
            bail!(
                "Template for role '{}' must contain {}",
                self.name,
                DOCUMENT_PLACEHOLDER
            );
        }
        Ok(())
    }

    pub fn check_reports_template(&self) -> Result<()> {
        if !self.template.contains(REPORTS_PLACEHOLDER) {
            bail!(
                "Template for role '{}' must contain {}",
                self.name,
                REPORTS_PLACEHOLDER
            );
        }
        Ok(())
    }
}

/// The built-in specialists.
pub fn default_roles() -> Vec<RoleSpec> {
    vec![
        RoleSpec::new("Cardiologist", CARDIOLOGIST_SYSTEM, CARDIOLOGIST_TEMPLATE),
        RoleSpec::new("Psychologist", PSYCHOLOGIST_SYSTEM, PSYCHOLOGIST_TEMPLATE),
        RoleSpec::new("Pulmonologist", PULMONOLOGIST_SYSTEM, PULMONOLOGIST_TEMPLATE),
    ]
}

/// The built-in aggregation role.
pub fn default_team() -> RoleSpec {
    RoleSpec::new("MultidisciplinaryTeam", TEAM_SYSTEM, TEAM_TEMPLATE)
}

const CARDIOLOGIST_SYSTEM: &str =
    "You are an experienced cardiologist reviewing a patient's medical report.";

const CARDIOLOGIST_TEMPLATE: &str = r#"Review the cardiac workup in the report below: ECG, blood tests, Holter monitoring and echocardiogram where available.

Focus: look for subtle signs of a cardiac cause for the patient's symptoms, such as arrhythmias or structural abnormalities that routine testing can miss.
Recommendation: suggest any further cardiac testing or monitoring, and management options if a cardiac issue is likely.

Only return the possible causes of the symptoms and the recommended next steps.

Medical Report:
{document}"#;

const PSYCHOLOGIST_SYSTEM: &str =
    "You are an experienced clinical psychologist reviewing a patient's medical report.";

const PSYCHOLOGIST_TEMPLATE: &str = r#"Review the report below and build a psychological assessment of the patient.

Focus: identify mental health conditions that could explain the symptoms, such as anxiety, panic disorder or depression.
Recommendation: propose interventions such as therapy, counselling or referral, and strategies the patient can use day to day.

Only return the possible mental health issues and the recommended next steps.

Medical Report:
{document}"#;

const PULMONOLOGIST_SYSTEM: &str =
    "You are an experienced pulmonologist reviewing a patient's medical report.";

const PULMONOLOGIST_TEMPLATE: &str = r#"Review the report below for respiratory causes of the patient's symptoms.

Focus: consider conditions such as asthma, COPD or lung infection that could present with shortness of breath, chest tightness or hyperventilation.
Recommendation: suggest pulmonary function tests, imaging or treatment where appropriate.

Only return the possible respiratory issues and the recommended next steps.

Medical Report:
{document}"#;

const TEAM_SYSTEM: &str = "You are a multidisciplinary team of healthcare professionals.";

const TEAM_TEMPLATE: &str = r#"You will receive reports from several specialists about the same patient.

Review the reports, weigh them against each other and produce a list of the 3 most likely health issues. Return them as bullet points, each with a short reason.

{reports}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roles_have_placeholders() {
        for role in default_roles() {
            assert!(role.check_document_template().is_ok(), "{}", role.name);
        }
        assert!(default_team().check_reports_template().is_ok());
    }

    #[test]
    fn test_render_document() {
        let role = RoleSpec::new("Cardiologist", "sys", "Report: {document}");
        assert_eq!(
            role.render_document("Patient reports palpitations."),
            "Report: Patient reports palpitations."
        );
    }

    #[test]
    fn test_render_reports_leaves_document_placeholder_alone() {
        let team = RoleSpec::new("Team", "sys", "{reports} / {document}");
        assert_eq!(team.render_reports("A"), "A / {document}");
    }

    #[test]
    fn test_missing_placeholder_is_reported() {
        let role = RoleSpec::new("Neurologist", "sys", "no placeholder");
        let err = role.check_document_template().unwrap_err();
        assert!(err.to_string().contains("Neurologist"));
    }
}
