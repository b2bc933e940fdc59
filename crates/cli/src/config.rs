//! Service configuration: TOML file, then `GHRELAY_*` environment overrides.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use messenger::GatewayConfig;
use relay::RelaySettings;
use serde::Deserialize;
use thiserror::Error;

const ENV_PREFIX: &str = "GHRELAY_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Missing required setting: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

// ---------------------------------------------------------------------------
// Environment access
// ---------------------------------------------------------------------------

/// Source of environment variables, so overrides can be tested without
/// touching the process environment.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl ReadEnv for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ReadEnv for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// `[gateway]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewaySection {
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_seconds: GatewayConfig::DEFAULT_TIMEOUT_SECS,
            max_retries: GatewayConfig::DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Public URL GitHub reaches this service on. Required for `serve`.
    pub base_url: Option<String>,
    pub bind: String,
    pub path_prefix: String,
    pub state_file: PathBuf,
    pub dedup_ttl_seconds: u64,
    pub history_ttl_days: u64,
    pub error_ratelimit_seconds: u64,
    pub max_history_records: usize,
    pub cleanup_interval_seconds: u64,
    /// Enables the admin API when set.
    pub admin_token: Option<String>,
    pub gateway: GatewaySection,
    pub log_format: LogFormat,
    pub otlp_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            bind: "0.0.0.0:8080".to_string(),
            path_prefix: RelaySettings::DEFAULT_PATH_PREFIX.to_string(),
            state_file: PathBuf::from("ghrelay-state.json"),
            dedup_ttl_seconds: RelaySettings::DEFAULT_DEDUP_TTL_SECS,
            history_ttl_days: RelaySettings::DEFAULT_HISTORY_TTL_DAYS,
            error_ratelimit_seconds: RelaySettings::DEFAULT_ERROR_RATELIMIT_SECS,
            max_history_records: RelaySettings::DEFAULT_MAX_HISTORY_RECORDS,
            cleanup_interval_seconds: 600,
            admin_token: None,
            gateway: GatewaySection::default(),
            log_format: LogFormat::Text,
            otlp_endpoint: None,
        }
    }
}

impl Config {
    /// Loads `path` (if given), applies environment overrides and validates.
    pub fn load(path: Option<&Path>, env: &impl ReadEnv) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `GHRELAY_*` (and `OTEL_EXPORTER_OTLP_ENDPOINT`) overrides.
    ///
    /// A value that does not parse leaves the current setting in place.
    fn apply_env(&mut self, env: &impl ReadEnv) {
        let var = |name: &str| {
            env.var(&format!("{ENV_PREFIX}{name}"))
                .filter(|v| !v.trim().is_empty())
        };
        fn parsed<T: FromStr>(raw: Option<String>, current: T) -> T {
            raw.and_then(|v| v.trim().parse().ok()).unwrap_or(current)
        }

        if let Some(v) = var("BASE_URL") {
            self.base_url = Some(v);
        }
        if let Some(v) = var("BIND") {
            self.bind = v;
        }
        if let Some(v) = var("PATH_PREFIX") {
            self.path_prefix = v;
        }
        if let Some(v) = var("STATE_FILE") {
            self.state_file = PathBuf::from(v);
        }
        self.dedup_ttl_seconds = parsed(var("DEDUP_TTL_SECONDS"), self.dedup_ttl_seconds);
        self.history_ttl_days = parsed(var("HISTORY_TTL_DAYS"), self.history_ttl_days);
        self.error_ratelimit_seconds =
            parsed(var("ERROR_RATELIMIT_SECONDS"), self.error_ratelimit_seconds);
        self.max_history_records = parsed(var("MAX_HISTORY_RECORDS"), self.max_history_records);
        self.cleanup_interval_seconds =
            parsed(var("CLEANUP_INTERVAL_SECONDS"), self.cleanup_interval_seconds);
        if let Some(v) = var("ADMIN_TOKEN") {
            self.admin_token = Some(v);
        }
        if let Some(v) = var("GATEWAY_URL") {
            self.gateway.url = Some(v);
        }
        if let Some(v) = var("GATEWAY_TOKEN") {
            self.gateway.token = Some(v);
        }
        self.log_format = parsed(var("LOG_FORMAT"), self.log_format);
        if let Some(v) = env
            .var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
        {
            self.otlp_endpoint = Some(v);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history_records == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_history_records",
                message: "must be at least 1".to_string(),
            });
        }
        if self.cleanup_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cleanup_interval_seconds",
                message: "must be at least 1".to_string(),
            });
        }
        if self.path_prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "path_prefix",
                message: "must not be empty".to_string(),
            });
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidValue {
                field: "bind",
                message: e.to_string(),
            }
        })
    }

    pub fn require_base_url(&self) -> Result<&str, ConfigError> {
        self.base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingField("base_url"))
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            path_prefix: self.path_prefix.trim_matches('/').to_string(),
            dedup_ttl: Duration::from_secs(self.dedup_ttl_seconds),
            history_ttl: Duration::from_secs(self.history_ttl_days.saturating_mul(24 * 60 * 60)),
            error_ratelimit: Duration::from_secs(self.error_ratelimit_seconds),
            max_history_records: self.max_history_records,
        }
    }

    /// Gateway settings, or `None` when messages should only be logged.
    pub fn gateway_config(&self) -> Option<GatewayConfig> {
        let url = self.gateway.url.as_deref().filter(|u| !u.is_empty())?;
        Some(GatewayConfig {
            token: self.gateway.token.clone(),
            timeout: Duration::from_secs(self.gateway.timeout_seconds),
            max_retries: self.gateway.max_retries,
            ..GatewayConfig::new(url)
        })
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}
