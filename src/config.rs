use std::{
    fs,
    path::Path,
    str::FromStr,
    sync::OnceLock,
    time::Duration,
};

use anyhow::{Context, Result, anyhow, ensure};
use serde::Deserialize;

use crate::{
    adapters::llm::DEFAULT_ENDPOINT,
    application::{FanOut, ModelCatalog, OrchestratorOptions},
    paths::home_env_path,
};

pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";
pub const DATABASE_VAR: &str = "DB_CONNECTION_STRING";

/// Free models offered when the configuration does not list any.
pub const DEFAULT_MODELS: &[&str] = &[
    "mistralai/mistral-7b-instruct:free",
    "google/gemma-7b-it:free",
    "nousresearch/nous-hermes-2-mixtral-8x7b-dpo:free",
    "openchat/openchat-7b:free",
];

static HOME_ENV_ONCE: OnceLock<()> = OnceLock::new();

/// Non-secret settings, optionally read from a YAML file.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EvalbenchConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    #[serde(default)]
    pub fan_out: FanOut,
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
    #[serde(default = "default_memoize")]
    pub memoize: bool,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
}

fn default_memoize() -> bool {
    true
}

impl Default for EvalbenchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            models: default_models(),
            fan_out: FanOut::default(),
            query_timeout_secs: None,
            memoize: default_memoize(),
        }
    }
}

impl EvalbenchConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read config file at {}", path_ref.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Invalid configuration in {}", path_ref.display()))
    }

    /// Load the given file, or fall back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Unable to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://"),
            "endpoint '{}' must be an http(s) URL",
            self.endpoint
        );
        ensure!(
            self.query_timeout_secs != Some(0),
            "query_timeout_secs must be positive when set"
        );
        self.catalog()?;
        Ok(())
    }

    pub fn catalog(&self) -> Result<ModelCatalog> {
        ModelCatalog::new(self.models.iter().cloned()).map_err(|err| anyhow!("{err}"))
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            fan_out: self.fan_out,
            query_timeout: self.query_timeout_secs.map(Duration::from_secs),
            memoize: self.memoize,
        }
    }
}

impl FromStr for EvalbenchConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_yaml_str(s)
    }
}

/// The two secrets the process needs before it can serve anything.
#[derive(Clone)]
pub struct Secrets {
    pub api_key: String,
    pub database_url: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("api_key", &"<redacted>")
            .field("database_url", &self.database_url)
            .finish()
    }
}

impl Secrets {
    /// Resolve each secret from the CLI value, then the environment, then `~/.env`.
    pub fn resolve(cli_api_key: Option<String>, cli_database: Option<String>) -> Result<Self> {
        ensure_home_env_loaded();
        let api_key = resolve_secret(cli_api_key, API_KEY_VAR, "--api-key")?;
        let database_url = resolve_secret(cli_database, DATABASE_VAR, "--database")?;
        Ok(Self {
            api_key,
            database_url,
        })
    }
}

fn resolve_secret(cli_value: Option<String>, env_var: &str, flag: &str) -> Result<String> {
    let env_value = std::env::var(env_var).ok();
    pick_value(cli_value, env_value)
        .ok_or_else(|| anyhow!("Missing {env_var}: pass {flag} or set {env_var}"))
}

fn pick_value(cli_value: Option<String>, env_value: Option<String>) -> Option<String> {
    normalize_value(cli_value).or_else(|| normalize_value(env_value))
}

fn normalize_value(value: Option<String>) -> Option<String> {
    value.and_then(|candidate| {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn ensure_home_env_loaded() {
    HOME_ENV_ONCE.get_or_init(|| {
        if let Some(path) = home_env_path()
            && let Ok(contents) = fs::read_to_string(&path)
        {
            apply_env_contents(&contents);
        }
    });
}

fn apply_env_contents(contents: &str) {
    for line in contents.lines() {
        if let Some((key, value)) = parse_env_assignment(line)
            && std::env::var_os(&key).is_none()
        {
            // Only called from `Secrets::resolve`, which `main` runs before starting the runtime.
            unsafe {
                std::env::set_var(&key, &value);
            }
        }
    }
}

fn parse_env_assignment(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim();

    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    Some((key.to_string(), normalize_env_value(value.trim())))
}

fn normalize_env_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        return trimmed[1..trimmed.len() - 1].to_string();
    }
    trimmed.to_string()
}
