use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{Accepts, QueueView, Worker};
use crate::{Job, JobTicket, WorkError, WorkResult};

/// Catch-all worker for jobs nobody else can take.
///
/// Only offered a job when no registered worker with a specific kind set
/// admits its kind, so routable work waits for its worker even when that
/// worker is busy. Fails each job terminally, so unroutable kinds leave the
/// pending queue instead of piling up.
pub struct Sink {
    name: String,
    accepts: Accepts,
}

impl Sink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepts: Accepts::All,
        }
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self::new("dead-letter")
    }
}

#[async_trait]
impl Worker for Sink {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        i32::MAX
    }

    fn accepts(&self) -> &Accepts {
        &self.accepts
    }

    fn can_accept(&self, job: &Job, queues: &QueueView<'_>) -> bool {
        !queues.is_routable(job.kind())
    }

    async fn execute(&self, job: &JobTicket) -> WorkResult<Value> {
        debug!(job_id = %job.id, kind = %job.kind, "Unroutable job, discarding");
        Err(WorkError::terminal("ignored"))
    }
}
