pub mod mapping;

pub use mapping::Payload;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{DispatchError, DispatchResult, JobFlag, JobId, JobKind, JobStatus, WorkError};

/// Final outcome delivered to a job's completion handle
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Done(Value),
    Failed(String),
    TimedOut,
    Skipped,
}

/// A unit of queued work.
///
/// Status only moves forward: `new -> processing -> done | error | timed-out`,
/// or `new -> skipped`. Once terminal, every mutator is a no-op.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    kind: JobKind,
    payload: Arc<Payload>,
    status: JobStatus,
    history: Vec<JobStatus>,
    result: Option<Result<Value, WorkError>>,
    time: Option<DateTime<Utc>>,
    started: Option<Instant>,
    retry_count: u32,
    max_retry: u32,
    retry: bool,
    timeout: Option<Duration>,
    callback: Option<String>,
    worker: Option<String>,
    completion: Option<oneshot::Sender<JobOutcome>>,
}

impl Job {
    /// Create a job in state `new`.
    ///
    /// Object payloads are used as-is; any other value is stored under `"value"`.
    pub fn new(kind: impl Into<JobKind>, data: Value) -> Self {
        let kind = kind.into();
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let retry = kind.flags().retryable;

        Self {
            id: JobId::new(),
            kind,
            payload: Arc::new(Payload::new(data)),
            status: JobStatus::New,
            history: vec![JobStatus::New],
            result: None,
            time: None,
            started: None,
            retry_count: 0,
            max_retry: 0,
            retry,
            timeout: None,
            callback: None,
            worker: None,
            completion: None,
        }
    }

    /// Keep a caller-supplied id instead of the generated one
    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    /// Request a follow-up notification to `url` once the job settles
    pub fn with_callback(mut self, url: impl Into<String>) -> Self {
        self.callback = Some(url.into());
        self
    }

    /// Attach a field map; only mappable kinds accept one
    pub fn with_maps(mut self, maps: Value) -> DispatchResult<Self> {
        if !self.is_flagged(JobFlag::Mappable) {
            return Err(DispatchError::NotMappable(self.kind.clone()));
        }
        let payload = Payload::clone(&self.payload).with_maps(maps);
        self.payload = Arc::new(payload);
        Ok(self)
    }

    /// Per-job timeout, overriding the dispatcher default
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable or disable retrying regardless of the kind's metadata
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// Rebuild a pending job from its persisted parts
    pub(crate) fn restore(id: JobId, kind: JobKind, payload: Payload, callback: Option<String>) -> Self {
        let mut job = Self::new(kind, Value::Null).with_id(id);
        job.payload = Arc::new(payload);
        job.callback = callback;
        job
    }

    /// Handle resolved once the job reaches a terminal status
    pub fn completion(&mut self) -> oneshot::Receiver<JobOutcome> {
        let (tx, rx) = oneshot::channel();
        self.completion = Some(tx);
        rx
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn payload(&self) -> &Arc<Payload> {
        &self.payload
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.payload.data
    }

    pub fn get_mapped_data(&self, path: &str) -> Option<Value> {
        self.payload.get_mapped_data(path)
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Every status the job has held, in order
    pub fn history(&self) -> &[JobStatus] {
        &self.history
    }

    pub fn result(&self) -> Option<&Result<Value, WorkError>> {
        self.result.as_ref()
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    pub fn retry_enabled(&self) -> bool {
        self.retry
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn callback(&self) -> Option<&str> {
        self.callback.as_deref()
    }

    /// Name of the worker currently holding the job
    pub fn worker(&self) -> Option<&str> {
        self.worker.as_deref()
    }

    /// Optional human label taken from the payload
    pub fn name(&self) -> Option<&str> {
        self.payload.get("name").and_then(Value::as_str)
    }

    /// Duplicate-detection key taken from the payload
    pub fn info(&self) -> Option<&Value> {
        self.payload.get("info")
    }

    pub fn is_flagged(&self, flag: JobFlag) -> bool {
        self.kind.flags().has(flag)
    }

    pub fn finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `status`, logging the transition.
    ///
    /// Returns false when nothing changed: same status, or the job is
    /// already terminal.
    pub fn set_status(&mut self, status: JobStatus) -> bool {
        if self.status == status {
            return false;
        }
        if self.finished() {
            warn!(
                job_id = %self.id,
                from = %self.status,
                to = %status,
                "Ignoring status change on finished job"
            );
            return false;
        }

        debug!(job_id = %self.id, kind = %self.kind, from = %self.status, to = %status, "Job status changed");
        self.status = status;
        self.history.push(status);
        true
    }

    /// `new -> processing`, stamping the start time
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::New {
            return false;
        }
        self.time = Some(Utc::now());
        self.started = Some(Instant::now());
        self.set_status(JobStatus::Processing)
    }

    /// `processing -> done` with the worker's result
    pub fn done(&mut self, value: Value) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        self.set_status(JobStatus::Done);
        self.result = Some(Ok(value.clone()));
        self.settle(JobOutcome::Done(value));
        true
    }

    /// `processing -> error` with the triggering error
    pub fn error(&mut self, err: WorkError) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        self.set_status(JobStatus::Error);
        let message = err.message().to_string();
        self.result = Some(Err(err));
        self.settle(JobOutcome::Failed(message));
        true
    }

    /// `processing -> timed-out`; no result is recorded
    pub fn time_out(&mut self) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        self.set_status(JobStatus::TimedOut);
        self.settle(JobOutcome::TimedOut);
        true
    }

    /// `new -> skipped`, for jobs withdrawn before they ran
    pub fn skip(&mut self) -> bool {
        if self.status != JobStatus::New {
            return false;
        }
        self.set_status(JobStatus::Skipped);
        self.settle(JobOutcome::Skipped);
        true
    }

    /// Time spent processing so far
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.started.map(|started| now.saturating_duration_since(started))
    }

    /// Ordering used for log export: stamped jobs by time ascending, then
    /// jobs that never started.
    pub fn cmp_time(&self, other: &Job) -> Ordering {
        match (self.time, other.time) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    /// Snapshot handed to the worker executing this job
    pub fn ticket(&self) -> JobTicket {
        JobTicket {
            id: self.id.clone(),
            kind: self.kind.clone(),
            payload: Arc::clone(&self.payload),
            retry_count: self.retry_count,
            callback: self.callback.clone(),
        }
    }

    pub(crate) fn assign(&mut self, worker: &str, max_retry: u32) {
        self.worker = Some(worker.to_string());
        self.max_retry = max_retry;
    }

    pub(crate) fn detach(&mut self) -> Option<String> {
        self.worker.take()
    }

    /// Count a retryable failure; returns whether another attempt is allowed
    pub(crate) fn record_retry(&mut self) -> bool {
        self.retry_count += 1;
        self.retry && self.retry_count <= self.max_retry
    }

    fn settle(&mut self, outcome: JobOutcome) {
        if let Some(tx) = self.completion.take() {
            // Receiver may have been dropped; the producer no longer cares.
            let _ = tx.send(outcome);
        }
    }
}

/// Read-only view of a job given to the worker executing it
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: Arc<Payload>,
    pub retry_count: u32,
    pub callback: Option<String>,
}

impl JobTicket {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn get_mapped_data(&self, path: &str) -> Option<Value> {
        self.payload.get_mapped_data(path)
    }

    pub fn get_mapped_string(&self, path: &str) -> Option<String> {
        self.payload.get_mapped_string(path)
    }
}
