//! MedPanel - multidisciplinary LLM panel for clinical narratives
//!
//! A CLI tool that sends one medical report to several specialist roles
//! concurrently and merges their opinions into a final diagnosis.
//!
//! Exit codes:
//!   0 - Success (role failures are tolerated unless --fail-on-missing is set)
//!   1 - Fatal error (missing report, bad config, output write failure)
//!   2 - At least one role failed and --fail-on-missing was set

mod agent;
mod cli;
mod config;
mod intake;
mod models;
mod panel;
mod report;

use anyhow::{Context, Result};
use cli::Args;
use config::Config;
use models::Document;
use panel::PanelPlan;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Keys must be in the environment before clap reads its env fallbacks
    config::load_env_file(Path::new(config::DEFAULT_ENV_FILE));

    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("MedPanel v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .medpanel.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the model, the roles and their prompts.");
    Ok(())
}

/// Initialize logging from the verbosity flags or `RUST_LOG`.
fn init_logging(args: &Args) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = args.log_filter(rust_log.as_deref());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the panel end to end. Returns the exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    if let Some(ref env_file) = args.env_file {
        if config::load_env_file(env_file) {
            info!("Loaded environment from {}", env_file.display());
        }
    }

    // Load configuration
    let mut config = load_config(&args, Path::new("."))?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    // Step 1: Read the report (the only fatal input failure)
    let input_path = config.general.input_path();
    let document = intake::load_document(&input_path)?;

    if args.dry_run {
        return handle_dry_run(&config, &document);
    }

    // Step 2: Set up the advisor
    let show = !args.quiet;
    if show {
        println!("🩺 Convening the panel...");
        println!("   Report: {}", input_path.display());
        println!(
            "   Provider: {} ({})",
            config.model.provider.as_str(),
            config.model.endpoint()
        );
        println!("   Model: {}", config.model.name);
        println!("   Roles: {}", config.panel.role_names().join(", "));
        println!("   Concurrency: {}", config.general.concurrency);
    }

    let advisor = agent::build_advisor(&config.model)?;
    let plan = PanelPlan::from_config(&config, show);

    // Step 3: Consult the specialists, then the team
    if show {
        println!("\n🔬 Consulting specialists...");
    }
    let run = panel::run_panel(advisor.as_ref(), &plan, &document).await?;

    if run.diagnosis.is_fallback() {
        warn!("{} produced no diagnosis; writing fallback text", plan.team.name);
    }

    // Step 4: Write the result
    let output = report::render_output(
        config.general.format,
        &run,
        &document,
        config.model.provider.as_str(),
        &config.model.name,
    )?;
    let written = report::write_output(&config.general.output_path(), &output)?;

    println!("\n✅ Final diagnosis has been saved to {}", written.display());
    if show {
        println!("   Duration: {:.1}s", run.duration.as_secs_f64());
    }

    print_failures(&run.dispatch.failures);

    if args.fail_on_missing && run.dispatch.has_failures() {
        eprintln!(
            "\n⛔ {} role(s) failed to report. Failing (exit code 2).",
            run.dispatch.failures.len()
        );
        return Ok(2);
    }

    Ok(0)
}

/// Summary of per-role failures, if any.
fn print_failures(failures: &[models::RoleFailure]) {
    if failures.is_empty() {
        return;
    }

    println!("\nAgent errors encountered:");
    for failure in failures {
        println!(" - {}: {}", failure.role, failure.cause);
    }
}

/// Handle --dry-run: show what would be sent, make no LLM calls.
fn handle_dry_run(config: &Config, document: &Document) -> Result<i32> {
    println!("\n🔍 Dry run (no LLM calls)...\n");
    println!(
        "   Report: {} ({} lines)",
        document.path.display(),
        document.line_count()
    );

    let reports_dir = Path::new(&config.general.reports_dir);
    match intake::list_documents(reports_dir, intake::REPORT_EXTENSIONS) {
        Ok(entries) if entries.is_empty() => {
            println!("   No reports found in {}", reports_dir.display());
        }
        Ok(entries) => {
            println!("\n   Reports in {}:", reports_dir.display());
            for entry in &entries {
                println!("     📄 {} ({} bytes)", entry.path.display(), entry.size);
            }
        }
        Err(e) => warn!("{}", e),
    }

    println!("\n   Roles dispatched concurrently:");
    for role in &config.panel.roles {
        println!("     🧑‍⚕️ {}", role.name);
    }
    println!("   Aggregated by: {}", config.panel.team.name);
    println!(
        "   Output: {} ({:?})",
        config.general.output_path().display(),
        config.general.format
    );

    println!("\n✅ Dry run complete. No LLM calls were made.");
    Ok(0)
}

/// Load configuration from `--config`, `.medpanel.toml` in `dir`, or defaults.
///
/// A config file that exists but does not parse is an error.
fn load_config(args: &Args, dir: &Path) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default(dir).context("Invalid .medpanel.toml")? {
        Some(config) => {
            info!("Loaded default config from {}", config::DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
