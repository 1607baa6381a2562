use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

// --- Environment variables ---

pub const GATEWAY_URL_VAR: &str = "SYNTHCHAT_GATEWAY_URL";
pub const USER_ID_VAR: &str = "SYNTHCHAT_USER_ID";
pub const RATE_LIMIT_VAR: &str = "SYNTHCHAT_RATE_LIMIT";
pub const RATE_WINDOW_VAR: &str = "SYNTHCHAT_RATE_WINDOW_MS";
pub const TIMEOUT_VAR: &str = "SYNTHCHAT_TIMEOUT_SECS";
pub const ERROR_TTL_VAR: &str = "SYNTHCHAT_ERROR_TTL_MS";
pub const SUCCESS_TTL_VAR: &str = "SYNTHCHAT_SUCCESS_TTL_MS";

const DEFAULT_GATEWAY_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub gateway_url: String,
    pub user_id: u64,
    pub rate_limit: usize,
    pub rate_window_ms: u64,
    // Fanning out to every model and synthesizing is slow; timeouts belong to the transport.
    pub request_timeout: Duration,
    pub error_ttl: Duration,
    pub success_ttl: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            user_id: 1,
            rate_limit: 5,
            rate_window_ms: 60_000,
            request_timeout: Duration::from_secs(120),
            error_ttl: Duration::from_millis(5000),
            success_ttl: Duration::from_millis(3000),
        }
    }
}

impl AppConfig {
    /// Reads the configuration from the process environment, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            gateway_url: read(GATEWAY_URL_VAR).unwrap_or(defaults.gateway_url),
            user_id: parse_var(USER_ID_VAR, read(USER_ID_VAR))?.unwrap_or(defaults.user_id),
            rate_limit: parse_var(RATE_LIMIT_VAR, read(RATE_LIMIT_VAR))?.unwrap_or(defaults.rate_limit),
            rate_window_ms: parse_var(RATE_WINDOW_VAR, read(RATE_WINDOW_VAR))?
                .unwrap_or(defaults.rate_window_ms),
            request_timeout: parse_var(TIMEOUT_VAR, read(TIMEOUT_VAR))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            error_ttl: parse_var(ERROR_TTL_VAR, read(ERROR_TTL_VAR))?
                .map(Duration::from_millis)
                .unwrap_or(defaults.error_ttl),
            success_ttl: parse_var(SUCCESS_TTL_VAR, read(SUCCESS_TTL_VAR))?
                .map(Duration::from_millis)
                .unwrap_or(defaults.success_ttl),
        };

        if config.rate_limit == 0 {
            anyhow::bail!("{} must be at least 1", RATE_LIMIT_VAR);
        }
        if config.rate_window_ms == 0 {
            anyhow::bail!("{} must be at least 1", RATE_WINDOW_VAR);
        }
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }
}

fn parse_var<T>(name: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|raw| {
            raw.parse::<T>()
                .context(format!("Invalid value '{}' for environment variable '{}'", raw, name))
        })
        .transpose()
}
