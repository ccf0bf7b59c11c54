use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JobId, JobKind};

/// Job lifecycle events published by the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchEvent {
    /// Job was appended to the pending list
    Queued {
        job_id: JobId,
        kind: JobKind,
        at: DateTime<Utc>,
    },

    /// Job was handed to a worker
    Assigned {
        job_id: JobId,
        worker: String,
        at: DateTime<Utc>,
    },

    /// Job failed with a retryable error and is executed again
    Retrying {
        job_id: JobId,
        retry_count: u32,
        error: String,
        at: DateTime<Utc>,
    },

    /// Worker returned a result
    Done {
        job_id: JobId,
        result: Value,
        at: DateTime<Utc>,
    },

    /// Worker failed terminally or ran out of retries
    Failed {
        job_id: JobId,
        error: String,
        at: DateTime<Utc>,
    },

    /// Dispatcher retired the job after its timeout elapsed.
    ///
    /// Never accompanied by `Done` or `Failed` for the same job.
    TimedOut {
        job_id: JobId,
        at: DateTime<Utc>,
    },
}

impl DispatchEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "job-queued",
            Self::Assigned { .. } => "job-assigned",
            Self::Retrying { .. } => "job-retrying",
            Self::Done { .. } => "job-done",
            Self::Failed { .. } => "job-error",
            Self::TimedOut { .. } => "job-timeout",
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Queued { job_id, .. }
            | Self::Assigned { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Done { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::TimedOut { job_id, .. } => job_id,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Queued { at, .. }
            | Self::Assigned { at, .. }
            | Self::Retrying { at, .. }
            | Self::Done { at, .. }
            | Self::Failed { at, .. }
            | Self::TimedOut { at, .. } => at,
        }
    }
}
