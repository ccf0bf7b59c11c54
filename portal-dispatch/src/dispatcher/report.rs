use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

use super::Dispatcher;
use crate::{DispatchResult, Job, JobFlag, JobId, JobKind, JobStatus};

/// Summary of a job for status reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    #[serde(rename = "type")]
    pub kind: JobKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub worker: Option<String>,
    pub status: JobStatus,
    pub retry_count: u32,
    pub time: Option<DateTime<Utc>>,
    pub readonly: bool,
}

impl JobSummary {
    pub(crate) fn of(job: &Job) -> Self {
        Self {
            id: job.id().clone(),
            kind: job.kind().clone(),
            name: job.name().map(str::to_string),
            worker: job.worker().map(str::to_string),
            status: job.status(),
            retry_count: job.retry_count(),
            time: job.time(),
            readonly: job.is_flagged(JobFlag::ReadOnly),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub done: usize,
    pub error: usize,
    pub timed_out: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    pub name: String,
    pub priority: i32,
    pub current: Option<JobId>,
}

/// Snapshot returned by [`Dispatcher::get_status`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub current: Vec<JobSummary>,
    pub last: Option<JobSummary>,
    pub workers: Vec<WorkerStatus>,
}

/// Which jobs [`Dispatcher::get_logs`] includes and how results render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Only kinds flagged exportable
    pub exportable_only: bool,
    /// Skip jobs still `new` or `processing`
    pub loggable_only: bool,
    /// Render results as truncated pretty-printed strings
    pub inspect: bool,
}

impl LogFilter {
    pub fn exportable(mut self) -> Self {
        self.exportable_only = true;
        self
    }

    pub fn loggable(mut self) -> Self {
        self.loggable_only = true;
        self
    }

    pub fn inspect(mut self) -> Self {
        self.inspect = true;
        self
    }

    fn admits(&self, job: &Job) -> bool {
        (!self.exportable_only || job.is_flagged(JobFlag::Exportable))
            && (!self.loggable_only || job.status().is_loggable())
    }
}

/// One exported job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: JobId,
    #[serde(rename = "type")]
    pub kind: JobKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl LogEntry {
    fn of(job: &Job, inspect: Option<usize>) -> Self {
        let result = job.result().map(|result| match (result, inspect) {
            (Ok(value), None) => value.clone(),
            (Ok(value), Some(limit)) => Value::String(inspected(value, limit)),
            (Err(error), _) => Value::String(error.message().to_string()),
        });

        Self {
            id: job.id().clone(),
            kind: job.kind().clone(),
            name: job.name().map(str::to_string),
            time: job.time(),
            status: job.status(),
            result,
        }
    }
}

/// Pretty-printed value cut to `limit` characters
fn inspected(value: &Value, limit: usize) -> String {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    if text.chars().count() <= limit {
        return text;
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push_str("...");
    cut
}

impl Dispatcher {
    pub fn get_status(&self) -> StatusReport {
        let state = self.inner.state.lock();

        let mut counts = StatusCounts {
            pending: state.pending.len(),
            running: state.running.len(),
            completed: state.completed.len(),
            ..StatusCounts::default()
        };
        for job in &state.completed {
            match job.status() {
                JobStatus::Done => counts.done += 1,
                JobStatus::Error => counts.error += 1,
                JobStatus::TimedOut => counts.timed_out += 1,
                JobStatus::Skipped => counts.skipped += 1,
                JobStatus::New | JobStatus::Processing => {}
            }
        }

        StatusReport {
            counts,
            current: state.running.iter().map(JobSummary::of).collect(),
            last: state.last.clone(),
            workers: state
                .slots
                .iter()
                .map(|slot| WorkerStatus {
                    name: slot.worker.name().to_string(),
                    priority: slot.worker.priority(),
                    current: slot.current.clone(),
                })
                .collect(),
        }
    }

    /// Every job across pending, running and completed, ordered by start
    /// time with unstarted jobs last.
    pub fn get_logs(&self, filter: LogFilter) -> Vec<LogEntry> {
        let state = self.inner.state.lock();
        let mut jobs: Vec<&Job> = state.all().filter(|job| filter.admits(job)).collect();
        jobs.sort_by(|a, b| a.cmp_time(b));

        let inspect = filter.inspect.then_some(self.inner.config.inspect_limit);
        jobs.into_iter().map(|job| LogEntry::of(job, inspect)).collect()
    }

    /// Write [`Dispatcher::get_logs`] to a timestamped file under the log
    /// directory and return its path.
    pub async fn write_logs(&self, filter: LogFilter) -> DispatchResult<PathBuf> {
        let entries = self.get_logs(filter);
        let dir = &self.inner.config.log_dir;
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(format!("jobs-{}.json", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&entries)?).await?;

        info!(count = entries.len(), path = %path.display(), "Wrote job log");
        Ok(path)
    }
}
