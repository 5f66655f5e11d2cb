//! Gateway and dispatch queue configuration.
//!
//! Configuration can be built in code, parsed from JSON, or read from
//! `GATEWAY_*` environment variables. Every field has a default, so a
//! partial document or an empty environment is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::headers::APPLICATION_JSON;

pub const ENV_TOKEN: &str = "GATEWAY_TOKEN";
pub const ENV_CONTENT_TYPE: &str = "GATEWAY_CONTENT_TYPE";
pub const ENV_ACCEPT: &str = "GATEWAY_ACCEPT";
pub const ENV_MAX_WORKERS: &str = "GATEWAY_MAX_WORKERS";
pub const ENV_TIMEOUT_SECS: &str = "GATEWAY_TIMEOUT_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("invalid gateway config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Sent as `Authorization: Bearer <token>` when set.
    pub token: Option<String>,
    pub content_type: String,
    pub accept: String,
    pub queue: QueueConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token: None,
            content_type: APPLICATION_JSON.to_string(),
            accept: APPLICATION_JSON.to_string(),
            queue: QueueConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        config.token = get(ENV_TOKEN);
        if let Some(content_type) = get(ENV_CONTENT_TYPE) {
            config.content_type = content_type;
        }
        if let Some(accept) = get(ENV_ACCEPT) {
            config.accept = accept;
        }
        if let Some(raw) = get(ENV_MAX_WORKERS) {
            config.queue.max_workers = parse_positive(ENV_MAX_WORKERS, &raw)?;
        }
        if let Some(raw) = get(ENV_TIMEOUT_SECS) {
            config.queue.timeout_secs = Some(parse_positive(ENV_TIMEOUT_SECS, &raw)? as u64);
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Upper bound on concurrently executing requests.
    pub max_workers: usize,
    pub thread_name: String,
    /// Whole-exchange timeout handed to the transport. `None` keeps the
    /// transport's own defaults.
    pub timeout_secs: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            thread_name: "gateway-dispatch".to_string(),
            timeout_secs: None,
        }
    }
}

impl QueueConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_json_without_token() {
        let config = GatewayConfig::default();
        assert_eq!(config.token, None);
        assert_eq!(config.content_type, "application/json");
        assert_eq!(config.accept, "application/json");
        assert_eq!(config.queue.max_workers, 4);
        assert_eq!(config.queue.timeout(), None);
    }

    #[test]
    fn env_overrides_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[
            (ENV_TOKEN, "abc123"),
            (ENV_ACCEPT, "text/plain"),
            (ENV_MAX_WORKERS, "8"),
            (ENV_TIMEOUT_SECS, "30"),
        ]))
        .unwrap();
        assert_eq!(config.token.as_deref(), Some("abc123"));
        assert_eq!(config.accept, "text/plain");
        assert_eq!(config.content_type, "application/json");
        assert_eq!(config.queue.max_workers, 8);
        assert_eq!(config.queue.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let config = GatewayConfig::from_lookup(lookup(&[(ENV_TOKEN, "  ")])).unwrap();
        assert_eq!(config.token, None);
    }

    #[test]
    fn bad_worker_count_is_rejected() {
        let err = GatewayConfig::from_lookup(lookup(&[(ENV_MAX_WORKERS, "zero")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { key: ENV_MAX_WORKERS, .. }));
        let err = GatewayConfig::from_lookup(lookup(&[(ENV_MAX_WORKERS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = GatewayConfig::from_json(r#"{"token":"t","queue":{"max_workers":2}}"#).unwrap();
        assert_eq!(config.token.as_deref(), Some("t"));
        assert_eq!(config.accept, "application/json");
        assert_eq!(config.queue.max_workers, 2);
        assert_eq!(config.queue.thread_name, "gateway-dispatch");
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(GatewayConfig::from_json("{"), Err(ConfigError::Json(_))));
    }
}
