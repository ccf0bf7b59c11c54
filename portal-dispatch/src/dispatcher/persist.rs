use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::ErrorKind;
use tracing::{debug, info, instrument};

use super::Dispatcher;
use crate::job::Payload;
use crate::{DispatchError, DispatchResult, Job, JobFlag, JobId, JobKind};

/// One pending job as written to the queue file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub id: JobId,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maps: Option<Value>,
}

impl QueueEntry {
    fn of(job: &Job) -> Self {
        Self {
            kind: job.kind().clone(),
            id: job.id().clone(),
            data: job.data().clone(),
            callback: job.callback().map(str::to_string),
            maps: job.payload().maps.clone(),
        }
    }

    fn into_job(self) -> Job {
        let payload = Payload {
            data: self.data,
            maps: self.maps,
        };
        Job::restore(self.id, self.kind, payload, self.callback)
    }
}

impl Dispatcher {
    /// Write every pending exportable job to the queue file.
    ///
    /// Returns the number of jobs written.
    #[instrument(skip(self), fields(path = %self.inner.config.queue_file.display()))]
    pub async fn save_queue(&self) -> DispatchResult<usize> {
        let entries: Vec<QueueEntry> = {
            let state = self.inner.state.lock();
            state
                .pending
                .iter()
                .filter(|job| job.is_flagged(JobFlag::Exportable))
                .map(QueueEntry::of)
                .collect()
        };

        let path = &self.inner.config.queue_file;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write aside and rename so a crash never leaves a truncated queue
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(&entries)?).await?;
        tokio::fs::rename(&staging, path).await?;

        info!(count = entries.len(), "Saved pending queue");
        Ok(entries.len())
    }

    /// Queue the jobs saved by [`Dispatcher::save_queue`] and delete the file.
    ///
    /// A missing file loads nothing.
    #[instrument(skip(self), fields(path = %self.inner.config.queue_file.display()))]
    pub async fn load_queue(&self) -> DispatchResult<usize> {
        if self.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }

        let path = &self.inner.config.queue_file;
        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No saved queue");
                return Ok(0);
            }
            Err(err) => return Err(err.into()),
        };

        let entries: Vec<QueueEntry> = serde_json::from_slice(&body)?;
        let count = self.add_all(entries.into_iter().map(QueueEntry::into_job).collect())?;
        tokio::fs::remove_file(path).await?;

        info!(count, "Loaded saved queue");
        Ok(count)
    }
}
