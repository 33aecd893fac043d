//! Merging the specialist reports into one final diagnosis.

use crate::agent::{Advisor, RoleSpec};
use crate::models::{AggregateInput, FinalDiagnosis};
use crate::panel::guarded_generate;
use std::time::Duration;
use tracing::{error, info, warn};

/// Render the aggregate as labelled sections, in submission order.
pub fn compose_reports(input: &AggregateInput) -> String {
    input
        .iter()
        .map(|entry| format!("{} Report:\n{}", entry.role, entry.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Ask the team role for the consolidated opinion.
///
/// Never fails: an error or a blank answer yields the fallback diagnosis.
pub async fn aggregate(
    advisor: &dyn Advisor,
    team: &RoleSpec,
    input: &AggregateInput,
    timeout: Option<Duration>,
) -> FinalDiagnosis {
    let substituted = input.substituted_count();
    if substituted > 0 {
        warn!("{} of {} reports are placeholders", substituted, input.len());
    }

    let prompt = team.render_reports(&compose_reports(input));
    info!(
        "Running {} over reports from {}",
        team.name,
        input.role_names().join(", ")
    );

    match guarded_generate(advisor, &team.system_prompt, &prompt, timeout).await {
        Ok(text) if !text.trim().is_empty() => {
            let diagnosis = FinalDiagnosis::new(text);
            info!("{} answered ({} chars)", team.name, diagnosis.body().len());
            diagnosis
        }
        Ok(_) => {
            error!("{} returned nothing", team.name);
            FinalDiagnosis::fallback()
        }
        Err(e) => {
            error!("{} failed: {}", team.name, e);
            FinalDiagnosis::fallback()
        }
    }
}
