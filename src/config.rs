//! Client configuration loaded from the environment.

use std::path::Path;
use std::time::Duration;

use crate::transport::TransportKind;

pub const DEFAULT_EVENTS_PATH: &str = "/notifications";
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("failed to load env file: {0}")]
    EnvFile(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeConfig {
    /// REST and event-channel base URL, without trailing slash.
    pub base_url: String,
    /// Fixed subscription path appended to `base_url`.
    pub events_path: String,
    /// Consecutive failed attempts tolerated before giving up.
    pub reconnect_attempts: u32,
    /// Fixed delay between attempts.
    pub reconnect_delay: Duration,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Transports tried in order on each attempt.
    pub transports: Vec<TransportKind>,
}

impl RealtimeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            events_path: DEFAULT_EVENTS_PATH.to_string(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transports: vec![TransportKind::Stream, TransportKind::Polling],
        }
    }

    /// Load from the process environment, reading a `.env` file first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load a specific env file into the process environment, then read it.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::from_path(path).map_err(|e| ConfigError::EnvFile(e.to_string()))?;
        Self::from_env()
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = get("LEDGERLINE_API_URL").ok_or(ConfigError::Missing("LEDGERLINE_API_URL"))?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "LEDGERLINE_API_URL",
                message: format!("expected an http(s) URL, got '{base_url}'"),
            });
        }

        let mut config = Self::new(base_url);

        if let Some(path) = get("LEDGERLINE_EVENTS_PATH") {
            config.events_path = if path.starts_with('/') {
                path
            } else {
                format!("/{path}")
            };
        }
        if let Some(raw) = get("LEDGERLINE_RECONNECT_ATTEMPTS") {
            config.reconnect_attempts = raw.parse().map_err(|e| ConfigError::Invalid {
                key: "LEDGERLINE_RECONNECT_ATTEMPTS",
                message: format!("{e}"),
            })?;
        }
        if let Some(raw) = get("LEDGERLINE_RECONNECT_DELAY_MS") {
            config.reconnect_delay = parse_millis("LEDGERLINE_RECONNECT_DELAY_MS", &raw)?;
        }
        if let Some(raw) = get("LEDGERLINE_POLL_INTERVAL_MS") {
            config.poll_interval = parse_millis("LEDGERLINE_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = get("LEDGERLINE_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = parse_millis("LEDGERLINE_CONNECT_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = get("LEDGERLINE_REQUEST_TIMEOUT_MS") {
            config.request_timeout = parse_millis("LEDGERLINE_REQUEST_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = get("LEDGERLINE_TRANSPORTS") {
            let transports = raw
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<TransportKind>, String>>()
                .map_err(|message| ConfigError::Invalid {
                    key: "LEDGERLINE_TRANSPORTS",
                    message,
                })?;
            if transports.is_empty() {
                return Err(ConfigError::Invalid {
                    key: "LEDGERLINE_TRANSPORTS",
                    message: "at least one transport is required".to_string(),
                });
            }
            config.transports = transports;
        }

        Ok(config)
    }

    /// `{base_url}{events_path}`
    pub fn events_url(&self) -> String {
        format!("{}{}", self.base_url, self.events_path)
    }
}

fn parse_millis(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::Invalid {
            key,
            message: format!("{e}"),
        })
}
