//! Configuration models for kyc-triage.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! Classifier endpoint, deployment and credential are required: the process
//! refuses to start when any of them cannot be resolved.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for kyc-triage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Classifier endpoint configuration
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Caller-side retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Batch mode settings
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Chat-completions API dialect spoken by the classifier endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    /// Azure OpenAI: deployment in the URL path, `api-key` header
    #[default]
    Azure,
    /// OpenAI-compatible: deployment sent as `model`, bearer token
    OpenAi,
}

/// Classifier configuration.
///
/// Endpoint, deployment and API key may each be given inline (with `${VAR}`
/// expansion) or through the named environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub flavor: ApiFlavor,

    /// Base URL (e.g. "https://my-resource.openai.azure.com")
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_endpoint_env")]
    pub endpoint_env: String,

    /// Deployment (Azure) or model id (OpenAI-compatible)
    #[serde(default)]
    pub deployment: Option<String>,

    #[serde(default = "default_deployment_env")]
    pub deployment_env: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Azure `api-version` query parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Classification task identifier
    #[serde(default = "default_task")]
    pub task: String,

    /// Prompt template file, or prompt directory containing `<task>/skprompt.txt`
    #[serde(default)]
    pub prompt: Option<PathBuf>,

    /// Bound on a single classifier call, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f64,
}

fn default_endpoint_env() -> String {
    "OPENAI_ENDPOINT".to_string()
}

fn default_deployment_env() -> String {
    "OPENAI_DEPLOYMENT".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_KEY".to_string()
}

fn default_api_version() -> String {
    "2024-06-01".to_string()
}

fn default_task() -> String {
    "ClassifyRisk".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    8
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            flavor: ApiFlavor::default(),
            endpoint: None,
            endpoint_env: default_endpoint_env(),
            deployment: None,
            deployment_env: default_deployment_env(),
            api_key: None,
            api_key_env: default_api_key_env(),
            api_version: default_api_version(),
            task: default_task(),
            prompt: None,
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry configuration for transient classifier failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per request (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    30
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

/// Batch mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum requests in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    8
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

/// Classifier settings with every required value present.
#[derive(Clone)]
pub struct ResolvedClassifier {
    pub flavor: ApiFlavor,
    pub endpoint: String,
    pub deployment: String,
    pub api_key: String,
    pub api_version: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl std::fmt::Debug for ResolvedClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedClassifier")
            .field("flavor", &self.flavor)
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve every required classifier value and validate the rest.
    ///
    /// B_i(endpoint, deployment, key available) → Result
    pub fn resolve_classifier(&self) -> Result<ResolvedClassifier, ConfigError> {
        let c = &self.classifier;

        let endpoint = resolve_value("endpoint", c.endpoint.as_deref(), &c.endpoint_env)?;
        let endpoint = endpoint.trim_end_matches('/').to_string();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "endpoint",
                reason: format!("'{endpoint}' is not an http(s) URL"),
            });
        }

        let deployment = resolve_value("deployment", c.deployment.as_deref(), &c.deployment_env)?;
        let api_key = resolve_value("api_key", c.api_key.as_deref(), &c.api_key_env)?;

        if c.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if c.flavor == ApiFlavor::Azure && c.api_version.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_version",
                reason: "required for the azure flavor".to_string(),
            });
        }
        if c.task.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "task",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(ResolvedClassifier {
            flavor: c.flavor,
            endpoint,
            deployment,
            api_key,
            api_version: c.api_version.clone(),
            timeout: c.timeout(),
            max_tokens: c.max_tokens,
            temperature: c.temperature,
        })
    }

    /// Validate settings outside the classifier section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.batch.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch.concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Inline value (env-expanded) first, then the environment variable.
/// Blank values count as missing.
fn resolve_value(
    field: &'static str,
    inline: Option<&str>,
    env_var: &str,
) -> Result<String, ConfigError> {
    let value = match inline {
        Some(v) => Some(expand_env_vars(v)),
        None => std::env::var(env_var).ok(),
    };

    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.contains("${"))
        .ok_or_else(|| ConfigError::MissingValue {
            field,
            env_var: env_var.to_string(),
        })
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return result;
    };

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
///
/// All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing required classifier {field}: set {env_var} env var or {field} in [classifier]")]
    MissingValue {
        field: &'static str,
        env_var: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to read prompt template {path}: {source}")]
    PromptRead {
        path: PathBuf,
        source: std::io::Error,
    },
}
