//! Presence Keeper configuration.
//!
//! Configuration is loaded from environment variables. The startup cookie is
//! held as a `SecretString` and redacted in Debug output.
//!
//! Upstream endpoint paths and browser headers are externally dictated by the
//! chat platform; they live here as data so a change upstream is a
//! configuration change, not a code change.

use crate::services::bootstrap::{BootstrapPipeline, PipelineError};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default keep-alive interval in seconds (5 minutes).
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 300;

/// Smallest accepted keep-alive interval in seconds.
pub const MIN_HEARTBEAT_INTERVAL_SECONDS: u64 = 30;

/// Largest accepted keep-alive interval in seconds.
pub const MAX_HEARTBEAT_INTERVAL_SECONDS: u64 = 900;

/// Default number of failed ticks before a reconnect.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default timeout for each upstream request in seconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 10;

/// Largest accepted upstream timeout in seconds.
pub const MAX_UPSTREAM_TIMEOUT_SECONDS: u64 = 60;

/// Default identity lookup path, relative to the upstream base URL.
pub const DEFAULT_IDENTITY_PATH: &str = "/Chatroom/getuserinfo";

/// Default activity ping path, relative to the upstream base URL.
pub const DEFAULT_ACTIVITY_PATH: &str = "/Activitymanagement/activity";

/// Default presence report path, relative to the upstream base URL.
pub const DEFAULT_REPORT_PATH: &str = "/Chatroom/reportOnline";

/// Default browser user agent sent upstream.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0";

/// Default Accept-Language sent upstream.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8,en-GB;q=0.7,en-US;q=0.6";

/// Absolute URLs of the single-call upstream endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamEndpoints {
    /// Identity lookup (JSONP GET).
    pub identity_url: String,
    /// Activity ping (JSONP GET).
    pub activity_url: String,
    /// Presence report (form POST).
    pub report_url: String,
}

/// Browser-mimicking headers attached to every upstream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserHeaders {
    pub user_agent: String,
    pub referer: String,
    pub origin: String,
    pub accept_language: String,
}

/// Presence Keeper configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Base URL of the upstream chat platform. Relative endpoint paths are
    /// resolved against it.
    pub upstream_base_url: String,

    /// Credential to configure at startup.
    pub default_cookie: Option<SecretString>,

    /// Room to join at startup, and fallback for cookie-only updates.
    pub default_room_id: Option<String>,

    /// Keep-alive tick interval in seconds.
    pub heartbeat_interval_seconds: u64,

    /// Failed ticks tolerated before the bootstrap pipeline is re-run.
    pub max_retries: u32,

    /// Per-request upstream timeout in seconds.
    pub upstream_timeout_seconds: u64,

    /// Single-call upstream endpoints.
    pub endpoints: UpstreamEndpoints,

    /// Ordered join sequence.
    pub pipeline: BootstrapPipeline,

    /// Browser headers sent upstream.
    pub browser: BrowserHeaders,

    /// Seconds to wait after a shutdown signal before exiting.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts the startup cookie.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("upstream_base_url", &self.upstream_base_url)
            .field(
                "default_cookie",
                &self.default_cookie.as_ref().map(|_| "[REDACTED]"),
            )
            .field("default_room_id", &self.default_room_id)
            .field(
                "heartbeat_interval_seconds",
                &self.heartbeat_interval_seconds,
            )
            .field("max_retries", &self.max_retries)
            .field("upstream_timeout_seconds", &self.upstream_timeout_seconds)
            .field("endpoints", &self.endpoints)
            .field("pipeline_steps", &self.pipeline.step_names())
            .field("browser", &self.browser)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid port configuration: {0}")]
    InvalidPort(String),

    #[error("Invalid heartbeat interval configuration: {0}")]
    InvalidHeartbeatInterval(String),

    #[error("Invalid max retries configuration: {0}")]
    InvalidMaxRetries(String),

    #[error("Invalid upstream timeout configuration: {0}")]
    InvalidUpstreamTimeout(String),

    #[error("Invalid drain configuration: {0}")]
    InvalidDrainSeconds(String),

    #[error("Invalid bootstrap pipeline: {0}")]
    InvalidPipeline(#[from] PipelineError),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let upstream_base_url = vars
            .get("UPSTREAM_BASE_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("UPSTREAM_BASE_URL".to_string()))?;

        let bind_address = match vars.get("BIND_ADDRESS") {
            Some(addr) => addr.clone(),
            None => {
                let port = if let Some(value_str) = vars.get("PORT") {
                    value_str.parse::<u16>().map_err(|e| {
                        ConfigError::InvalidPort(format!(
                            "PORT must be a valid port number, got '{}': {}",
                            value_str, e
                        ))
                    })?
                } else {
                    DEFAULT_PORT
                };
                format!("0.0.0.0:{}", port)
            }
        };

        let default_cookie = non_empty(vars, "DEFAULT_COOKIE").map(SecretString::from);
        let default_room_id = non_empty(vars, "DEFAULT_ROOM_ID");

        let heartbeat_interval_seconds =
            if let Some(value_str) = vars.get("HEARTBEAT_INTERVAL_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidHeartbeatInterval(format!(
                        "HEARTBEAT_INTERVAL_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if !(MIN_HEARTBEAT_INTERVAL_SECONDS..=MAX_HEARTBEAT_INTERVAL_SECONDS)
                    .contains(&value)
                {
                    return Err(ConfigError::InvalidHeartbeatInterval(format!(
                        "HEARTBEAT_INTERVAL_SECONDS must be between {} and {}, got {}",
                        MIN_HEARTBEAT_INTERVAL_SECONDS, MAX_HEARTBEAT_INTERVAL_SECONDS, value
                    )));
                }

                value
            } else {
                DEFAULT_HEARTBEAT_INTERVAL_SECONDS
            };

        let max_retries = if let Some(value_str) = vars.get("MAX_RETRIES") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidMaxRetries(format!(
                    "MAX_RETRIES must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidMaxRetries(
                    "MAX_RETRIES must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_MAX_RETRIES
        };

        let upstream_timeout_seconds = if let Some(value_str) = vars.get("UPSTREAM_TIMEOUT_SECONDS")
        {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidUpstreamTimeout(format!(
                    "UPSTREAM_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 || value > MAX_UPSTREAM_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidUpstreamTimeout(format!(
                    "UPSTREAM_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                    MAX_UPSTREAM_TIMEOUT_SECONDS, value
                )));
            }

            value
        } else {
            DEFAULT_UPSTREAM_TIMEOUT_SECONDS
        };

        let endpoint = |key: &str, default_path: &str| {
            let value = vars.get(key).map(String::as_str).unwrap_or(default_path);
            resolve_url(&upstream_base_url, value)
        };

        let endpoints = UpstreamEndpoints {
            identity_url: endpoint("IDENTITY_URL", DEFAULT_IDENTITY_PATH),
            activity_url: endpoint("ACTIVITY_URL", DEFAULT_ACTIVITY_PATH),
            report_url: endpoint("REPORT_URL", DEFAULT_REPORT_PATH),
        };

        let pipeline = match vars.get("BOOTSTRAP_PIPELINE") {
            Some(json) => BootstrapPipeline::from_json(json, &upstream_base_url)?,
            None => BootstrapPipeline::default_for(&upstream_base_url),
        };

        let browser = BrowserHeaders {
            user_agent: vars
                .get("BROWSER_USER_AGENT")
                .cloned()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            referer: vars
                .get("BROWSER_REFERER")
                .cloned()
                .unwrap_or_else(|| format!("{}/", upstream_base_url)),
            origin: vars
                .get("BROWSER_ORIGIN")
                .cloned()
                .unwrap_or_else(|| upstream_base_url.clone()),
            accept_language: vars
                .get("BROWSER_ACCEPT_LANGUAGE")
                .cloned()
                .unwrap_or_else(|| DEFAULT_ACCEPT_LANGUAGE.to_string()),
        };

        let drain_seconds = if let Some(value_str) = vars.get("DRAIN_SECONDS") {
            value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainSeconds(format!(
                    "DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            0
        };

        Ok(Config {
            bind_address,
            upstream_base_url,
            default_cookie,
            default_room_id,
            heartbeat_interval_seconds,
            max_retries,
            upstream_timeout_seconds,
            endpoints,
            pipeline,
            browser,
            drain_seconds,
        })
    }

    /// Keep-alive tick interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Per-request upstream timeout.
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_seconds)
    }
}

/// Resolve an endpoint against the upstream base URL.
///
/// Absolute `http(s)://` values are returned unchanged.
pub fn resolve_url(base_url: &str, value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            value.trim_start_matches('/')
        )
    }
}

fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
