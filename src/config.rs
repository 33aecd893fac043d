//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.medpanel.toml` files, the environment file holding API keys, and
//! command-line overrides.

use crate::agent::roles::{default_roles, default_team, RoleSpec};
use crate::cli::OutputFormat;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".medpanel.toml";

/// Output written when no path is configured, by format.
pub const DEFAULT_TEXT_OUTPUT: &str = "results/final_diagnosis.txt";
pub const DEFAULT_JSON_OUTPUT: &str = "results/final_diagnosis.json";

/// Default environment file holding provider API keys.
pub const DEFAULT_ENV_FILE: &str = "apikey.env";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Panel composition.
    #[serde(default)]
    pub panel: PanelConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Medical report to read.
    #[serde(default = "default_input")]
    pub input: String,

    /// Directory listed by `--dry-run`.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,

    /// Where the final diagnosis is written. Defaults by format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Maximum number of advisory calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            reports_dir: default_reports_dir(),
            output: None,
            format: OutputFormat::default(),
            concurrency: default_concurrency(),
        }
    }
}

impl GeneralConfig {
    pub fn input_path(&self) -> PathBuf {
        PathBuf::from(&self.input)
    }

    pub fn output_path(&self) -> PathBuf {
        match (&self.output, self.format) {
            (Some(output), _) => PathBuf::from(output),
            (None, OutputFormat::Text) => PathBuf::from(DEFAULT_TEXT_OUTPUT),
            (None, OutputFormat::Json) => PathBuf::from(DEFAULT_JSON_OUTPUT),
        }
    }
}

fn default_input() -> String {
    "Medical Reports/medical_report.txt".to_string()
}

fn default_reports_dir() -> String {
    "Medical Reports".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Which remote text-generation service to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Ollama `/api/chat` (default)
    #[default]
    Ollama,
    /// OpenAI-compatible `/chat/completions`
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
        }
    }
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider to call.
    #[serde(default)]
    pub provider: Provider,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// API base URL. Falls back to the provider's default.
    #[serde(default)]
    pub url: Option<String>,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in each response.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Optional upper bound on a single role's call, in seconds.
    #[serde(default)]
    pub role_timeout_seconds: Option<u64>,

    /// Environment variable holding the API key (OpenAI-compatible only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: default_model(),
            url: None,
            temperature: default_temperature(),
            max_tokens: None,
            timeout_seconds: default_timeout(),
            role_timeout_seconds: None,
            api_key_env: default_api_key_env(),
        }
    }
}

impl ModelConfig {
    /// Effective base URL.
    pub fn endpoint(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| self.provider.default_url().to_string())
    }

    /// API key read from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout() -> u64 {
    300
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Roles dispatched concurrently and the team role that merges them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default = "default_roles")]
    pub roles: Vec<RoleSpec>,

    #[serde(default = "default_team")]
    pub team: RoleSpec,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
            team: default_team(),
        }
    }
}

impl PanelConfig {
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }

    /// Roles must be non-empty, uniquely named, and templates must carry
    /// their placeholders.
    pub fn validate(&self) -> Result<()> {
        if self.roles.is_empty() {
            bail!("Panel must define at least one role");
        }

        let mut seen = HashSet::new();
        for role in &self.roles {
            if role.name.trim().is_empty() {
                bail!("Role names must not be empty");
            }
            if !seen.insert(role.name.as_str()) {
                bail!("Duplicate role name: {}", role.name);
            }
            role.check_document_template()?;
        }

        self.team.check_reports_template()?;
        Ok(())
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load `.medpanel.toml` from `dir`.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default(dir: &Path) -> Result<Option<Self>> {
        let default_path = dir.join(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(&default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref input) = args.input {
            self.general.input = input.display().to_string();
        }
        if let Some(ref dir) = args.reports_dir {
            self.general.reports_dir = dir.display().to_string();
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if let Some(provider) = args.provider {
            self.model.provider = provider;
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.url {
            self.model.url = Some(url.clone());
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(role_timeout) = args.role_timeout {
            self.model.role_timeout_seconds = Some(role_timeout);
        }
    }

    /// Check the merged configuration before anything is dispatched.
    pub fn validate(&self) -> Result<()> {
        if self.general.concurrency == 0 {
            bail!("Concurrency must be at least 1");
        }

        let endpoint = self.model.endpoint();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            bail!("Model URL must start with 'http://' or 'https://': {}", endpoint);
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            bail!("Temperature must be between 0.0 and 2.0");
        }

        if self.model.timeout_seconds == 0 {
            bail!("Timeout must be at least 1 second");
        }

        if self.model.role_timeout_seconds == Some(0) {
            bail!("Role timeout must be at least 1 second");
        }

        self.panel.validate()
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// Load a dotenv-style file into the process environment if it exists.
///
/// Variables already set are left alone. Returns whether a file was loaded.
pub fn load_env_file(path: &Path) -> bool {
    if !path.exists() {
        debug!("No environment file at {}", path.display());
        return false;
    }

    match dotenvy::from_path(path) {
        Ok(()) => true,
        Err(e) => {
            debug!("Failed to load {}: {}", path.display(), e);
            false
        }
    }
}
