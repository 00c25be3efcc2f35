//! Engine configuration loaded from `coursegen.toml`.
//!
//! Every knob has a sensible default so a missing file still yields a
//! working engine. The `COURSEGEN_API_KEY` environment variable takes
//! precedence over the file for the API key.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

use crate::job::RetryPolicy;
use crate::logger::Severity;

/// Top-level configuration loaded from `coursegen.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// API key for the generative text service.
    #[serde(default)]
    pub api_key: String,

    /// Directory for jobs, content, logs and alerts.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Concurrent tasks per running job.
    #[serde(default = "default_per_job_concurrency")]
    pub per_job_concurrency: usize,

    /// Global ceiling on concurrently running jobs.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: u32,

    /// Total attempts per task, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay before a task-level retry, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Hard ceiling for one task including retries, in seconds.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Multiplier applied to the summed expected task durations to derive
    /// the job-level timeout.
    #[serde(default = "default_job_timeout_margin")]
    pub job_timeout_margin: u32,

    /// Fixed job-level timeout in seconds; overrides the derived budget.
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,

    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    /// Circuit cool-down before the half-open probe, in seconds.
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,

    /// Content cache time-to-live, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Minimum severity that raises an operator alert.
    #[serde(default = "default_alert_severity")]
    pub alert_severity: Severity,
}

fn default_state_dir() -> String {
    ".coursegen".to_string()
}

fn default_per_job_concurrency() -> usize {
    3
}

fn default_max_concurrent_jobs() -> u32 {
    100
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_task_timeout_secs() -> u64 {
    600
}

fn default_job_timeout_margin() -> u32 {
    2
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_cooldown_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    86400
}

fn default_alert_severity() -> Severity {
    Severity::Error
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            state_dir: default_state_dir(),
            per_job_concurrency: default_per_job_concurrency(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            job_timeout_margin: default_job_timeout_margin(),
            job_timeout_secs: None,
            breaker_threshold: default_breaker_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            alert_severity: default_alert_severity(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `coursegen.toml` in the current directory.
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Path::new("coursegen.toml");
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<EngineConfig>(&contents)?
        } else {
            Self::default()
        };

        // Environment takes precedence over the file for the API key.
        if let Ok(key) = std::env::var("COURSEGEN_API_KEY")
            && !key.is_empty()
        {
            config.api_key = key;
        }

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            retry_delay_ms: self.retry_delay_ms,
            task_timeout_secs: self.task_timeout_secs,
        }
    }
}
