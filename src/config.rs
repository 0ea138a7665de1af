//! Engine and scheduler configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the execution orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix marking credential-class environment variables. Variables with
    /// this prefix are the only ones handed to the Credential Phase beyond the
    /// base allow-list, and the only ones withheld from the Global Phase.
    pub credential_prefix: String,
    /// Maximum number of secure data variables per request.
    pub max_data_variables: usize,
    /// Timeout for one Credential Phase fetch subprocess, in seconds.
    pub fetch_timeout_secs: u64,
    /// Timeout for the Global Phase subprocess, in seconds. A per-request
    /// `timeout` option overrides this.
    pub global_timeout_secs: u64,
    /// Sliding-window rate limit: max fetches per variable name per window.
    pub rate_limit_max: usize,
    /// Sliding-window rate limit: window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Maximum size of a sanitized response body, in bytes. Larger bodies are
    /// replaced by a sanitization error.
    pub max_response_bytes: usize,
    /// Runtime switch for the raw-command escape hatch. The `raw-command`
    /// cargo feature must also be enabled; both are off by default.
    pub allow_raw_commands: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            credential_prefix: "SECURE_".to_string(),
            max_data_variables: 10,
            fetch_timeout_secs: 30,
            global_timeout_secs: 60,
            rate_limit_max: 10,
            rate_limit_window_secs: 60,
            max_response_bytes: 1024 * 1024,
            allow_raw_commands: false,
        }
    }
}

/// Configuration for the job scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Size of the worker pool: max jobs executing concurrently.
    pub max_concurrent_jobs: usize,
    /// Terminal jobs older than this are removed by the sweep, in seconds.
    pub job_ttl_secs: u64,
    /// Interval between expiry sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            job_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}
