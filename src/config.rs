use std::{env, str::FromStr};

/// Reads `key` and parses it, keeping the value only when `accept` holds.
pub fn env_parse<T: FromStr>(key: &str, accept: impl Fn(&T) -> bool) -> Option<T> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .filter(|value| accept(value))
}

/// Non-empty, trimmed string value of `key`.
pub fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub body_limit: usize,
    pub history_limit: usize,
    /// Sessions untouched this long are dropped.
    pub session_idle_secs: u64,
    pub http_timeout_secs: u64,
    pub http_connect_timeout_secs: u64,
    pub metrics_key: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", |_: &u16| true).unwrap_or(8000),
            body_limit: env_parse("REQUEST_MAX_BYTES", |v: &usize| *v > 0)
                .unwrap_or(25 * 1024 * 1024),
            history_limit: env_parse("SESSION_HISTORY_LIMIT", |v: &usize| *v >= 2)
                .unwrap_or(50),
            session_idle_secs: env_parse("SESSION_IDLE_SECS", |v: &u64| *v > 0).unwrap_or(3600),
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS", |v: &u64| *v > 0).unwrap_or(60),
            http_connect_timeout_secs: env_parse("HTTP_CONNECT_TIMEOUT_SECS", |v: &u64| *v > 0)
                .unwrap_or(5),
            metrics_key: env_string("METRICS_KEY"),
        }
    }
}
