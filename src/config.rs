//! Client configuration: defaults, optional JSON file, then environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::system_paths;

pub const ENV_API_BASE_URL: &str = "HELPDESK_API_BASE_URL";
pub const ENV_TOKEN_FILE: &str = "HELPDESK_TOKEN_FILE";
pub const ENV_PRINCIPAL_FRESH_SECS: &str = "HELPDESK_PRINCIPAL_FRESH_SECS";
pub const ENV_QUERY_STALE_SECS: &str = "HELPDESK_QUERY_STALE_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "HELPDESK_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },
    #[error("invalid value for {key}: '{value}' is not a number of seconds")]
    InvalidNumber { key: &'static str, value: String },
    #[error("cannot read config file {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("cannot parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: serde_json::Error },
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Config { code: "config".into(), message: err.to_string() }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend origin; API paths such as `/api/v1/tickets` are joined onto it.
    pub api_base_url: String,
    /// Durable file backing the token store.
    pub token_file: PathBuf,
    /// How long a resolved principal is served without re-asking the backend.
    pub principal_fresh_secs: u64,
    /// Default staleness window for the query coordinator.
    pub query_stale_secs: u64,
    /// Transport timeout; none means the HTTP client's own default.
    pub request_timeout_secs: Option<u64>,
    pub login_route: String,
    pub landing_route: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            token_file: system_paths::default_token_file(),
            principal_fresh_secs: 5 * 60,
            query_stale_secs: 60,
            request_timeout_secs: None,
            login_route: "/login".to_string(),
            landing_route: "/user".to_string(),
        }
    }
}

fn write_defaults(path: &Path, cfg: &ClientConfig) -> std::io::Result<()> {
    if let Some(dir) = path.parent() { fs::create_dir_all(dir)?; }
    let bytes = serde_json::to_vec_pretty(cfg)?;
    fs::write(path, bytes)
}

impl ClientConfig {
    /// Load settings from a JSON file, writing the defaults there if it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<ClientConfig>(&bytes)
                .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = ClientConfig::default();
                // a read-only home still gets working defaults
                match write_defaults(path, &cfg) {
                    Ok(()) => debug!(target: "config", path = %path.display(), "wrote default client config"),
                    Err(e) => warn!(target: "config", path = %path.display(), error = %e, "could not write default client config"),
                }
                Ok(cfg)
            }
            Err(source) => Err(ConfigError::Io { path: path.to_path_buf(), source }),
        }
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        ClientConfig::default().with_env_overrides(|k| std::env::var(k).ok())
    }

    /// Apply overrides from a lookup function (the process environment in production).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_API_BASE_URL) { self.api_base_url = v; }
        if let Some(v) = lookup(ENV_TOKEN_FILE) { self.token_file = PathBuf::from(v); }
        if let Some(v) = lookup(ENV_PRINCIPAL_FRESH_SECS) { self.principal_fresh_secs = parse_secs(ENV_PRINCIPAL_FRESH_SECS, &v)?; }
        if let Some(v) = lookup(ENV_QUERY_STALE_SECS) { self.query_stale_secs = parse_secs(ENV_QUERY_STALE_SECS, &v)?; }
        if let Some(v) = lookup(ENV_REQUEST_TIMEOUT_SECS) { self.request_timeout_secs = Some(parse_secs(ENV_REQUEST_TIMEOUT_SECS, &v)?); }
        self.base_url()?;
        Ok(self)
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.api_base_url).map_err(|e| ConfigError::InvalidUrl { value: self.api_base_url.clone(), reason: e.to_string() })
    }

    pub fn principal_freshness(&self) -> Duration { Duration::from_secs(self.principal_fresh_secs) }
    pub fn query_staleness(&self) -> Duration { Duration::from_secs(self.query_stale_secs) }
    pub fn request_timeout(&self) -> Option<Duration> { self.request_timeout_secs.map(Duration::from_secs) }
}

fn parse_secs(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidNumber { key, value: value.to_string() })
}
