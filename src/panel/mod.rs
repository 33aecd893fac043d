//! The advisory panel: fan-out to the specialists, then merge.
//!
//! [`run_panel`] is the whole pipeline minus file I/O. The dispatcher is
//! the only concurrent part; aggregation starts after every role is done.

pub mod aggregator;
pub mod dispatcher;

pub use aggregator::aggregate;
pub use dispatcher::{dispatch, DispatchOptions, DispatchOutcome};

use crate::agent::{Advisor, AdvisorError, RoleSpec};
use crate::config::Config;
use crate::models::{Document, FinalDiagnosis, PanelMetadata, PanelReport};
use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Why a guarded advisory call produced no text.
#[derive(Debug, Error)]
pub enum GenerateFailure {
    #[error("{0}")]
    Advisor(#[from] AdvisorError),

    #[error("timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("panicked: {0}")]
    Panicked(String),
}

/// Call the advisor with an optional time limit, containing panics.
pub(crate) async fn guarded_generate(
    advisor: &dyn Advisor,
    system_prompt: &str,
    prompt: &str,
    limit: Option<Duration>,
) -> Result<String, GenerateFailure> {
    let call = AssertUnwindSafe(advisor.generate(system_prompt, prompt)).catch_unwind();

    let joined = match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| GenerateFailure::TimedOut(limit))?,
        None => call.await,
    };

    match joined {
        Ok(result) => result.map_err(GenerateFailure::from),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(GenerateFailure::Panicked(message))
        }
    }
}

/// Roles, team and limits for one run.
#[derive(Debug, Clone)]
pub struct PanelPlan {
    pub roles: Vec<RoleSpec>,
    pub team: RoleSpec,
    pub dispatch: DispatchOptions,
    /// Limit on the aggregation call.
    pub team_timeout: Option<Duration>,
}

impl PanelPlan {
    pub fn from_config(config: &Config, show_progress: bool) -> Self {
        let role_timeout = config.model.role_timeout_seconds.map(Duration::from_secs);
        Self {
            roles: config.panel.roles.clone(),
            team: config.panel.team.clone(),
            dispatch: DispatchOptions {
                concurrency: config.general.concurrency,
                role_timeout,
                show_progress,
            },
            team_timeout: role_timeout,
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct PanelRun {
    pub dispatch: DispatchOutcome,
    pub diagnosis: FinalDiagnosis,
    pub duration: Duration,
}

impl PanelRun {
    /// Serializable view of the run.
    pub fn to_report(&self, document: &Document, provider: &str, model: &str) -> PanelReport {
        PanelReport {
            metadata: PanelMetadata {
                input_path: document.path.display().to_string(),
                analysis_date: Utc::now(),
                provider: provider.to_string(),
                model_used: model.to_string(),
                roles_dispatched: self.dispatch.input.len(),
                roles_failed: self.dispatch.failures.len(),
                duration_seconds: self.duration.as_secs_f64(),
            },
            reports: self.dispatch.input.clone().into_entries(),
            failures: self.dispatch.failures.clone(),
            final_diagnosis: self.diagnosis.text(),
            fallback_used: self.diagnosis.is_fallback(),
        }
    }
}

/// Dispatch every role, then aggregate.
pub async fn run_panel(
    advisor: &dyn Advisor,
    plan: &PanelPlan,
    document: &Document,
) -> Result<PanelRun> {
    let start = Instant::now();

    let dispatch = dispatch(advisor, &plan.roles, document, &plan.dispatch).await?;
    if dispatch.all_failed() {
        warn!("Every role failed; the team only sees placeholders");
    }
    info!(
        "Dispatch complete: {} reports, {} failures",
        dispatch.input.len() - dispatch.failures.len(),
        dispatch.failures.len()
    );

    let diagnosis = aggregate(advisor, &plan.team, &dispatch.input, plan.team_timeout).await;

    Ok(PanelRun {
        dispatch,
        diagnosis,
        duration: start.elapsed(),
    })
}
