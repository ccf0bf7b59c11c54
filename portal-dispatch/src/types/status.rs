use serde::{Deserialize, Serialize};
use std::fmt;

/// Job status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    /// Queued, not yet handed to a worker
    New,

    /// Handed to a worker
    Processing,

    /// Worker returned a result
    Done,

    /// Worker failed terminally or ran out of retries
    Error,

    /// Dispatcher gave up waiting for the worker
    TimedOut,

    /// Withdrawn without running
    Skipped,
}

impl JobStatus {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Error | Self::TimedOut | Self::Skipped
        )
    }

    /// Jobs past `new` and `processing` are worth keeping in exported logs
    pub fn is_loggable(&self) -> bool {
        !matches!(self, Self::New | Self::Processing)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
            Self::TimedOut => "timed-out",
            Self::Skipped => "skipped",
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::New
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
