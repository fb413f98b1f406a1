//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the stemsep engine
///
/// Fields are organized into logical sub-configs:
/// - [`api`](ApiConfig) — remote service endpoint, credential, per-call timeouts
/// - [`retry`](RetryConfig) — backoff policy for transient failures
/// - [`poll`](PollConfig) — status polling cadence and per-job budget
///
/// Everything has a sensible default except the API key, which must be
/// supplied explicitly. The engine never reads ambient state (environment
/// variables, global settings); the caller owns credential discovery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Remote service settings
    pub api: ApiConfig,

    /// Retry behavior for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Status polling settings
    #[serde(default)]
    pub poll: PollConfig,

    /// Number of jobs executed concurrently in a batch (default: 2)
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
            workers: default_workers(),
        }
    }
}

/// Remote separation service configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the service (default: <https://api.audioshake.ai>)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent with every request
    pub api_key: String,

    /// Timeout for the upload call (default: 300 seconds)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    pub upload_timeout: Duration,

    /// Timeout for task creation (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Timeout for a single status poll (default: 30 seconds)
    #[serde(default = "default_status_timeout", with = "duration_serde")]
    pub status_timeout: Duration,

    /// Timeout for downloading one result artifact (default: 300 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            upload_timeout: default_upload_timeout(),
            request_timeout: default_request_timeout(),
            status_timeout: default_status_timeout(),
            download_timeout: default_download_timeout(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    ///
    /// Jitter desynchronizes retries across concurrently running jobs so a
    /// shared outage does not turn into a synchronized stampede.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Status polling configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between status polls (default: 5 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Overall polling budget per job (default: 30 minutes)
    ///
    /// Bounds the total wall-clock commitment to one file. A job that is
    /// still not terminal when this elapses fails with a poll timeout.
    #[serde(default = "default_job_timeout", with = "duration_serde")]
    pub job_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            job_timeout: default_job_timeout(),
        }
    }
}

/// Serialize/deserialize Duration as seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

fn default_base_url() -> String {
    "https://api.audioshake.ai".to_string()
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_status_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_job_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_workers() -> usize {
    2
}

fn default_true() -> bool {
    true
}
