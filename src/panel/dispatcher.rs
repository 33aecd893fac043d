//! Concurrent fan-out of the specialist roles.
//!
//! Every role gets the same document, runs independently, and ends up in
//! the aggregate under its own name whether it succeeded or not.

use crate::agent::{Advisor, RoleSpec};
use crate::models::{AggregateInput, Document, RoleFailure, RoleOutcome};
use crate::panel::guarded_generate;
use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Options for a dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum advisory calls in flight.
    pub concurrency: usize,
    /// Per-role limit on top of the HTTP timeout.
    pub role_timeout: Option<Duration>,
    /// Whether to show a progress bar.
    pub show_progress: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            role_timeout: None,
            show_progress: false,
        }
    }
}

/// Everything the dispatcher learned.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// One entry per submitted role, placeholders for failures.
    pub input: AggregateInput,
    /// Failed roles, in submission order.
    pub failures: Vec<RoleFailure>,
}

impl DispatchOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn all_failed(&self) -> bool {
        self.failures.len() == self.input.len()
    }
}

/// Run every role against `document` and wait for all of them.
///
/// Only a malformed role set is an error; individual role failures are
/// recorded in the outcome.
pub async fn dispatch(
    advisor: &dyn Advisor,
    roles: &[RoleSpec],
    document: &Document,
    options: &DispatchOptions,
) -> Result<DispatchOutcome> {
    check_roles(roles)?;
    if options.concurrency == 0 {
        bail!("Concurrency must be at least 1");
    }

    info!(
        "Dispatching {} roles (concurrency {})",
        roles.len(),
        options.concurrency
    );

    let progress = options.show_progress.then(|| role_progress_bar(roles.len()));
    let progress = progress.as_ref();

    let completed: Vec<(String, RoleOutcome)> = stream::iter(roles)
        .map(|role| async move {
            let outcome = run_role(advisor, role, document, options.role_timeout).await;
            if let Some(pb) = progress {
                pb.set_message(role.name.clone());
                pb.inc(1);
            }
            (role.name.clone(), outcome)
        })
        .buffer_unordered(options.concurrency)
        .collect()
        .await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let outcomes: HashMap<String, RoleOutcome> = completed.into_iter().collect();
    let submitted: Vec<String> = roles.iter().map(|r| r.name.clone()).collect();

    let failures = submitted
        .iter()
        .filter_map(|name| match outcomes.get(name) {
            Some(RoleOutcome::Failed(cause)) => Some(RoleFailure {
                role: name.clone(),
                cause: cause.clone(),
            }),
            Some(RoleOutcome::Report(_)) => None,
            None => Some(RoleFailure {
                role: name.clone(),
                cause: format!("{} did not complete", name),
            }),
        })
        .collect();

    let input = AggregateInput::from_outcomes(&submitted, &outcomes);

    Ok(DispatchOutcome { input, failures })
}

/// Run one role and turn every kind of failure into a [`RoleOutcome::Failed`].
async fn run_role(
    advisor: &dyn Advisor,
    role: &RoleSpec,
    document: &Document,
    role_timeout: Option<Duration>,
) -> RoleOutcome {
    debug!("Running {}", role.name);
    let prompt = role.render_document(&document.content);

    match guarded_generate(advisor, &role.system_prompt, &prompt, role_timeout).await {
        Ok(text) if !text.trim().is_empty() => {
            info!("{} report received ({} chars)", role.name, text.len());
            RoleOutcome::Report(text)
        }
        Ok(_) => {
            let cause = format!("{} returned an empty report", role.name);
            warn!("{}", cause);
            RoleOutcome::Failed(cause)
        }
        Err(e) => {
            let cause = format!("Error running {}: {}", role.name, e);
            warn!("{}", cause);
            RoleOutcome::Failed(cause)
        }
    }
}

fn check_roles(roles: &[RoleSpec]) -> Result<()> {
    if roles.is_empty() {
        bail!("No roles to dispatch");
    }

    let mut seen = HashSet::new();
    for role in roles {
        if !seen.insert(role.name.as_str()) {
            bail!("Duplicate role name: {}", role.name);
        }
    }

    Ok(())
}

fn role_progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] {pos}/{len} roles {msg}")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{Reply, ScriptedAdvisor};
    use std::collections::BTreeMap;

    fn role(name: &str) -> RoleSpec {
        RoleSpec::new(name, name, "Report: {document}")
    }

    fn roles() -> Vec<RoleSpec> {
        vec![role("role1"), role("role2"), role("role3")]
    }

    fn document() -> Document {
        Document::new(
            "report.txt",
            "Patient reports shortness of breath and anxiety.",
        )
    }

    fn opinions() -> ScriptedAdvisor {
        ScriptedAdvisor::new()
            .reply("role1", Reply::Text("role1 opinion".to_string()))
            .reply("role2", Reply::Text("role2 opinion".to_string()))
            .reply("role3", Reply::Text("role3 opinion".to_string()))
    }

    #[tokio::test]
    async fn test_every_role_answers() {
        let advisor = opinions();
        let outcome = dispatch(&advisor, &roles(), &document(), &DispatchOptions::default())
            .await
            .unwrap();

        let expected: BTreeMap<String, String> = [
            ("role1", "role1 opinion"),
            ("role2", "role2 opinion"),
            ("role3", "role3 opinion"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(outcome.input.to_map(), expected);
        assert!(!outcome.has_failures());
    }

    #[tokio::test]
    async fn test_document_reaches_every_role() {
        let advisor = opinions();
        dispatch(&advisor, &roles(), &document(), &DispatchOptions::default())
            .await
            .unwrap();

        for name in ["role1", "role2", "role3"] {
            assert_eq!(
                advisor.prompt_for(name).as_deref(),
                Some("Report: Patient reports shortness of breath and anxiety.")
            );
        }
    }

    #[tokio::test]
    async fn test_failing_role_gets_placeholder() {
        let advisor = opinions().reply("role2", Reply::Fail("boom".to_string()));
        let outcome = dispatch(&advisor, &roles(), &document(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(
            outcome.input.get("role2"),
            Some("(No report returned from role2)")
        );
        assert_eq!(outcome.input.get("role1"), Some("role1 opinion"));
        assert_eq!(outcome.input.get("role3"), Some("role3 opinion"));

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].role, "role2");
        assert!(outcome.failures[0].cause.contains("Error running role2"));
        assert!(outcome.failures[0].cause.contains("boom"));
    }

    #[tokio::test]
    async fn test_empty_and_panicking_roles_are_contained() {
        let advisor = opinions()
            .reply("role1", Reply::Empty)
            .reply("role3", Reply::Panic);
        let outcome = dispatch(&advisor, &roles(), &document(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.input.len(), 3);
        assert_eq!(
            outcome.input.get("role1"),
            Some("(No report returned from role1)")
        );
        assert_eq!(outcome.input.get("role2"), Some("role2 opinion"));
        assert_eq!(
            outcome.input.get("role3"),
            Some("(No report returned from role3)")
        );

        let failed: Vec<&str> = outcome.failures.iter().map(|f| f.role.as_str()).collect();
        assert_eq!(failed, vec!["role1", "role3"]);
        assert!(outcome.failures[0].cause.contains("empty report"));
        assert!(outcome.failures[1].cause.contains("panicked"));
    }

    #[tokio::test]
    async fn test_all_roles_failing_still_yields_complete_input() {
        let advisor = ScriptedAdvisor::new();
        let outcome = dispatch(&advisor, &roles(), &document(), &DispatchOptions::default())
            .await
            .unwrap();

        assert!(outcome.all_failed());
        assert_eq!(outcome.input.role_names(), vec!["role1", "role2", "role3"]);
        assert!(outcome.input.iter().all(|e| !e.text.is_empty() && e.substituted));
    }

    #[tokio::test]
    async fn test_role_timeout() {
        let advisor = opinions().reply(
            "role1",
            Reply::Slow(Duration::from_secs(5), "too late".to_string()),
        );
        let options = DispatchOptions {
            role_timeout: Some(Duration::from_millis(50)),
            ..DispatchOptions::default()
        };

        let outcome = dispatch(&advisor, &roles(), &document(), &options)
            .await
            .unwrap();

        assert_eq!(
            outcome.input.get("role1"),
            Some("(No report returned from role1)")
        );
        assert!(outcome.failures[0].cause.contains("timed out"));
        assert_eq!(outcome.input.get("role2"), Some("role2 opinion"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let names: Vec<String> = (1..=6).map(|i| format!("role{}", i)).collect();
        let roles: Vec<RoleSpec> = names.iter().map(|n| role(n)).collect();
        let advisor = names.iter().fold(ScriptedAdvisor::new(), |advisor, name| {
            advisor.reply(
                name,
                Reply::Slow(Duration::from_millis(30), format!("{} opinion", name)),
            )
        });

        let options = DispatchOptions {
            concurrency: 2,
            ..DispatchOptions::default()
        };
        let outcome = dispatch(&advisor, &roles, &document(), &options)
            .await
            .unwrap();

        assert_eq!(outcome.input.len(), 6);
        assert_eq!(advisor.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_roles_run_concurrently() {
        let advisor = ScriptedAdvisor::new()
            .reply("role1", Reply::Slow(Duration::from_millis(50), "a".to_string()))
            .reply("role2", Reply::Slow(Duration::from_millis(50), "b".to_string()))
            .reply("role3", Reply::Slow(Duration::from_millis(50), "c".to_string()));

        dispatch(&advisor, &roles(), &document(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(advisor.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_or_empty_roles_rejected() {
        let advisor = opinions();
        let dup = vec![role("role1"), role("role1")];
        assert!(dispatch(&advisor, &dup, &document(), &DispatchOptions::default())
            .await
            .is_err());
        assert!(dispatch(&advisor, &[], &document(), &DispatchOptions::default())
            .await
            .is_err());
        assert!(advisor.calls().is_empty());
    }

    #[test]
    fn test_dispatch_with_block_on() {
        let advisor = opinions();
        let outcome = tokio_test::block_on(dispatch(
            &advisor,
            &roles()[..1],
            &document(),
            &DispatchOptions::default(),
        ))
        .unwrap();
        assert_eq!(outcome.input.get("role1"), Some("role1 opinion"));
    }
}
