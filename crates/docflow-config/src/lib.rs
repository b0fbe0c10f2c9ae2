//! Configuration for the docflow service.
//!
//! TOML file + environment overrides + defaults, with precedence
//! env > file > defaults. Validation collects every problem instead of
//! stopping at the first, so a misconfigured deployment gets one complete
//! report.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Default config file consulted when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "docflow.toml";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("invalid config file {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("configuration validation failed: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub alerts: AlertsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address the HTTP trigger surface binds to.
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// Base URL of the sibling content-generation service.
    pub base_url: String,
    /// Per-stage generation deadline in seconds.
    pub stage_timeout_secs: u64,
    /// Connect timeout for the generation HTTP client in seconds.
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertsConfig {
    /// Webhook receiving stage-failure alerts. Alerts are disabled when
    /// unset.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory for session records and artifacts.
    pub data_dir: Utf8PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8088".to_string(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090".to_string(),
            stage_timeout_secs: 300,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { webhook_url: None }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: Utf8PathBuf::from(".docflow"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            generation: GenerationConfig::default(),
            alerts: AlertsConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with precedence env > file > defaults.
    ///
    /// With an explicit `path` the file must exist; without one,
    /// `docflow.toml` is used when present and defaults otherwise.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Utf8Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply `DOCFLOW_*` overrides through an injectable lookup, so tests
    /// never have to mutate process-global environment state.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("DOCFLOW_BIND") {
            self.server.bind = bind;
        }
        if let Some(base_url) = lookup("DOCFLOW_GENERATION_URL") {
            self.generation.base_url = base_url;
        }
        if let Some(secs) = lookup("DOCFLOW_STAGE_TIMEOUT_SECS")
            && let Ok(secs) = secs.parse()
        {
            self.generation.stage_timeout_secs = secs;
        }
        if let Some(secs) = lookup("DOCFLOW_CONNECT_TIMEOUT_SECS")
            && let Ok(secs) = secs.parse()
        {
            self.generation.connect_timeout_secs = secs;
        }
        if let Some(url) = lookup("DOCFLOW_ALERT_WEBHOOK") {
            self.alerts.webhook_url = Some(url);
        }
        if let Some(dir) = lookup("DOCFLOW_DATA_DIR") {
            self.storage.data_dir = Utf8PathBuf::from(dir);
        }
    }

    /// Validate the effective configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "server.bind '{}' is not a valid socket address",
                self.server.bind
            ));
        }

        if !has_http_scheme(&self.generation.base_url) {
            errors.push(format!(
                "generation.base_url '{}' must start with http:// or https://",
                self.generation.base_url
            ));
        }

        if self.generation.stage_timeout_secs == 0 {
            errors.push("generation.stage_timeout_secs must be greater than zero".to_string());
        }

        if self.generation.connect_timeout_secs == 0 {
            errors.push("generation.connect_timeout_secs must be greater than zero".to_string());
        }

        if let Some(url) = &self.alerts.webhook_url
            && !has_http_scheme(url)
        {
            errors.push(format!(
                "alerts.webhook_url '{url}' must start with http:// or https://"
            ));
        }

        if self.storage.data_dir.as_str().is_empty() {
            errors.push("storage.data_dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }
}

fn has_http_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
