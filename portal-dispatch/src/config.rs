use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{DispatchError, DispatchResult};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Retry budget handed to each job at assignment
    pub max_retry: u32,

    /// Default per-job processing timeout; zero disables it
    pub timeout: Duration,

    /// How often the scheduling loop runs without being woken
    pub sweep_interval: Duration,

    /// Where pending exportable jobs are saved on shutdown
    pub queue_file: PathBuf,

    /// Directory for exported job logs
    pub log_dir: PathBuf,

    /// Maximum characters of an inspected result in log exports
    pub inspect_limit: usize,

    /// Capacity of the lifecycle event channel
    pub event_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retry: 3,
            timeout: Duration::ZERO,
            sweep_interval: Duration::from_secs(1),
            queue_file: PathBuf::from("queue.json"),
            log_dir: PathBuf::from("logs"),
            inspect_limit: 512,
            event_capacity: 1024,
        }
    }
}

impl DispatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `{prefix}_*` environment variables on top of the
    /// defaults. Unset variables keep their default; malformed ones are errors.
    pub fn from_env(prefix: &str) -> DispatchResult<Self> {
        let mut config = Self::default();

        if let Some(max_retry) = env_parse::<u32>(prefix, "MAX_RETRY")? {
            config.max_retry = max_retry;
        }
        if let Some(secs) = env_parse::<u64>(prefix, "TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(millis) = env_parse::<u64>(prefix, "SWEEP_INTERVAL_MS")? {
            config.sweep_interval = Duration::from_millis(millis);
        }
        if let Some(path) = env_var(prefix, "QUEUE_FILE") {
            config.queue_file = PathBuf::from(path);
        }
        if let Some(path) = env_var(prefix, "LOG_DIR") {
            config.log_dir = PathBuf::from(path);
        }
        if let Some(limit) = env_parse::<usize>(prefix, "INSPECT_LIMIT")? {
            config.inspect_limit = limit;
        }

        Ok(config)
    }

    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_queue_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.queue_file = path.into();
        self
    }

    pub fn with_log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_dir = path.into();
        self
    }

    pub fn with_inspect_limit(mut self, limit: usize) -> Self {
        self.inspect_limit = limit;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

fn env_key(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}_{name}")
    }
}

fn env_var(prefix: &str, name: &str) -> Option<String> {
    std::env::var(env_key(prefix, name))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(prefix: &str, name: &str) -> DispatchResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = env_key(prefix, name);
    match env_var(prefix, name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err: T::Err| DispatchError::config(key, err.to_string())),
        None => Ok(None),
    }
}
