//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Options left unset fall through to the
//! configuration file and then the built-in defaults.

use crate::config::Provider;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// MedPanel - multidisciplinary LLM panel for clinical narratives
///
/// Sends one medical report to several specialist roles at once
/// (cardiology, psychology, pulmonology by default) and merges their
/// opinions into a single final diagnosis. Not a medical device.
///
/// Examples:
///   medpanel --input "Medical Reports/patient.txt"
///   medpanel --input report.txt --model qwen2.5:14b --concurrency 2
///   medpanel --provider openai --model gpt-4o-mini --format json
///   medpanel --dry-run
///   medpanel --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Medical report to analyze (UTF-8 text)
    #[arg(short, long, value_name = "FILE", env = "MEDPANEL_INPUT")]
    pub input: Option<PathBuf>,

    /// Directory listed by --dry-run
    #[arg(long, value_name = "DIR")]
    pub reports_dir: Option<PathBuf>,

    /// Output file for the final diagnosis
    ///
    /// Parent directories are created as needed.
    /// Default: results/final_diagnosis.txt (.json with --format json)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Provider to call (ollama, openai)
    #[arg(long, value_name = "PROVIDER", env = "MEDPANEL_PROVIDER")]
    pub provider: Option<Provider>,

    /// Model to use for every role
    #[arg(short, long, env = "MEDPANEL_MODEL")]
    pub model: Option<String>,

    /// Provider base URL
    ///
    /// Defaults to http://localhost:11434 for Ollama and
    /// https://api.openai.com/v1 for OpenAI-compatible providers.
    #[arg(long, value_name = "URL", env = "MEDPANEL_URL")]
    pub url: Option<String>,

    /// Temperature for LLM responses (0.0 - 2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// HTTP request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Upper bound on each role's call in seconds
    #[arg(long, value_name = "SECS")]
    pub role_timeout: Option<u64>,

    /// Maximum number of roles consulted at once
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .medpanel.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Environment file holding API keys
    ///
    /// apikey.env in the current directory is always tried first.
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Exit with code 2 if any role failed to report
    #[arg(long)]
    pub fail_on_missing: bool,

    /// Load the report and show the panel without calling the LLM
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .medpanel.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the final diagnosis.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Header line plus diagnosis (default)
    #[default]
    Text,
    /// Full run as JSON
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 2.0".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.role_timeout == Some(0) {
            return Err("Role timeout must be at least 1 second".to_string());
        }

        if let Some(ref path) = self.env_file {
            if !path.is_file() {
                return Err(format!("Environment file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Log filter directives: `--quiet` and `--verbose` win over `RUST_LOG`.
    pub fn log_filter(&self, rust_log: Option<&str>) -> String {
        match rust_log {
            _ if self.quiet => "error".to_string(),
            _ if self.verbose => "debug".to_string(),
            Some(directives) if !directives.trim().is_empty() => directives.to_string(),
            _ => "info".to_string(),
        }
    }
}
