use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, instrument};

use super::{Accepts, QueueView, Worker};
use crate::{DispatchError, DispatchResult, Job, JobKind, JobTicket, WorkResult};

/// Handles `cleanup` jobs by wiping a shared working directory.
///
/// While a cleanup job is pending or running, automation executors refuse new
/// work. The cleaner in turn waits until no session job is in flight, so the
/// wipe never races a live session. Callback deliveries do not touch the
/// directory and are not waited on.
pub struct Cleaner {
    name: String,
    dir: PathBuf,
    accepts: Accepts,
}

impl Cleaner {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            accepts: Accepts::One(JobKind::Cleanup),
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl Worker for Cleaner {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self) -> &Accepts {
        &self.accepts
    }

    /// No session job in flight
    fn can_accept(&self, _job: &Job, queues: &QueueView<'_>) -> bool {
        !queues
            .running
            .iter()
            .any(|job| !matches!(job.kind(), JobKind::Cleanup | JobKind::Callback))
    }

    #[instrument(skip_all, fields(worker = %self.name, job_id = %job.id))]
    async fn execute(&self, job: &JobTicket) -> WorkResult<Value> {
        self.clean().await?;
        Ok(json!({ "removed": self.dir.display().to_string() }))
    }

    async fn clean(&self) -> WorkResult<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                info!(dir = %self.dir.display(), "Removed work directory");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn validate(&self) -> DispatchResult<()> {
        if self.dir.as_os_str().is_empty() || self.dir.parent().is_none() {
            return Err(DispatchError::config(
                "work_dir",
                format!("refusing to clean {:?}", self.dir),
            ));
        }
        Ok(())
    }
}
