//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Orchestration engine configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum attempts per step before it is marked failed.
    pub max_retries: u32,
    /// First backoff interval; doubles after each failed attempt.
    pub retry_base_delay: Duration,
    /// Characters of step output carried by PARTIAL_OUTPUT events.
    pub step_preview_chars: usize,
    /// Characters of final output carried by the TASK_COMPLETED event.
    pub final_preview_chars: usize,
    /// Characters of task input shown in task listings.
    pub summary_input_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            step_preview_chars: 500,
            final_preview_chars: 1000,
            summary_input_chars: 100,
        }
    }
}

impl OrchestratorConfig {
    /// Load from `TASKFLOW_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_retries = env_parse("TASKFLOW_MAX_RETRIES")?.unwrap_or(defaults.max_retries);
        if max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASKFLOW_MAX_RETRIES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        let retry_base_delay = env_parse::<u64>("TASKFLOW_RETRY_BASE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_base_delay);

        Ok(Self {
            max_retries,
            retry_base_delay,
            ..defaults
        })
    }
}

/// Simulated latencies of the planner and the built-in handlers.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub planning_latency: Duration,
    pub retrieval_latency: Duration,
    pub analysis_latency: Duration,
    pub generation_latency: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            planning_latency: Duration::from_millis(200),
            retrieval_latency: Duration::from_millis(100),
            analysis_latency: Duration::from_millis(150),
            generation_latency: Duration::from_millis(100),
        }
    }
}

impl HandlerConfig {
    /// All latencies zero (used by tests).
    pub fn instant() -> Self {
        Self {
            planning_latency: Duration::ZERO,
            retrieval_latency: Duration::ZERO,
            analysis_latency: Duration::ZERO,
            generation_latency: Duration::ZERO,
        }
    }

    /// `TASKFLOW_SIMULATED_LATENCY=off` disables the simulated latencies.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("TASKFLOW_SIMULATED_LATENCY") {
            Err(_) => Ok(Self::default()),
            Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => Ok(Self::default()),
                "off" | "false" | "0" => Ok(Self::instant()),
                other => Err(ConfigError::InvalidValue {
                    key: "TASKFLOW_SIMULATED_LATENCY".to_string(),
                    message: format!("expected on/off, got {other:?}"),
                }),
            },
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            host: std::env::var("TASKFLOW_HOST").unwrap_or(defaults.host),
            port: env_parse("TASKFLOW_PORT")?.unwrap_or(defaults.port),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
