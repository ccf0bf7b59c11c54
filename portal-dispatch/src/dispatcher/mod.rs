//! The dispatcher owns every job, matches pending work to idle workers,
//! enforces timeouts and carries pending work across restarts.
//!
//! All bookkeeping happens under one lock that is never held across an
//! await. Workers run on their own tasks and report back through
//! [`Settle`](crate::worker::lifecycle::Settle).

mod persist;
mod report;
mod schedule;

pub use persist::QueueEntry;
pub use report::{JobSummary, LogEntry, LogFilter, StatusCounts, StatusReport, WorkerStatus};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::worker::{Accepts, Worker};
use crate::{
    DispatchConfig, DispatchError, DispatchEvent, DispatchResult, Job, JobId, JobKind, JobStatus,
};

/// Acknowledgement returned by [`Dispatcher::add`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Queued {
    pub status: &'static str,
    pub id: JobId,
}

pub(crate) struct WorkerSlot {
    pub(crate) worker: Arc<dyn Worker>,
    pub(crate) current: Option<JobId>,
}

/// Jobs live in exactly one of `pending`, `running` or `completed`.
#[derive(Default)]
pub(crate) struct DispatchState {
    pub(crate) pending: Vec<Job>,
    pub(crate) running: Vec<Job>,
    pub(crate) completed: Vec<Job>,
    pub(crate) last: Option<JobSummary>,
    pub(crate) slots: Vec<WorkerSlot>,
    /// Kind sets of registered workers, catch-alls excluded
    pub(crate) routes: Vec<Accepts>,
    pub(crate) workers_set: bool,
}

impl DispatchState {
    fn all(&self) -> impl Iterator<Item = &Job> {
        self.pending
            .iter()
            .chain(self.running.iter())
            .chain(self.completed.iter())
    }

    fn find(&self, id: &JobId) -> Option<&Job> {
        self.all().find(|job| job.id() == id)
    }
}

pub(crate) struct Inner {
    pub(crate) config: DispatchConfig,
    pub(crate) state: Mutex<DispatchState>,
    events: broadcast::Sender<DispatchEvent>,
    wake: Notify,
    closed: AtomicBool,
}

impl Inner {
    pub(crate) fn emit(&self, event: DispatchEvent) {
        debug!(event = event.event_name(), job_id = %event.job_id(), "Dispatch event");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn enqueue(&self, state: &mut DispatchState, job: Job) {
        self.emit(DispatchEvent::Queued {
            job_id: job.id().clone(),
            kind: job.kind().clone(),
            at: Utc::now(),
        });
        state.pending.push(job);
    }

    /// Request another scheduling pass on the loop task
    pub(crate) fn wake(&self) {
        self.wake.notify_one();
    }
}

/// Handle to a running dispatch engine. Clones share the same state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Build a dispatcher and spawn its scheduling loop on the current runtime
    pub fn start(config: DispatchConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let inner = Arc::new(Inner {
            config,
            state: Mutex::new(DispatchState::default()),
            events,
            wake: Notify::new(),
            closed: AtomicBool::new(false),
        });

        info!(
            max_retry = inner.config.max_retry,
            timeout = ?inner.config.timeout,
            sweep_interval = ?inner.config.sweep_interval,
            "Starting dispatcher"
        );
        tokio::spawn(run(Arc::clone(&inner)));

        Self { inner }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Append a job to the pending list and schedule a pass
    #[instrument(skip_all, fields(job_id = %job.id(), kind = %job.kind()))]
    pub fn add(&self, job: Job) -> DispatchResult<Queued> {
        if self.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }

        let id = job.id().clone();
        self.inner.enqueue(&mut self.inner.state.lock(), job);
        info!("Job queued");
        self.inner.wake();

        Ok(Queued { status: "queued", id })
    }

    /// Queue a batch under one lock; either every job is queued or none is
    pub(crate) fn add_all(&self, jobs: Vec<Job>) -> DispatchResult<usize> {
        let count = jobs.len();
        {
            let mut state = self.inner.state.lock();
            if self.is_shut_down() {
                return Err(DispatchError::ShutDown);
            }
            for job in jobs {
                self.inner.enqueue(&mut state, job);
            }
        }
        self.inner.wake();
        Ok(count)
    }

    /// Register the fixed worker set and run the first scheduling pass.
    ///
    /// Can only be called once.
    pub fn set_workers(&self, workers: Vec<Arc<dyn Worker>>) -> DispatchResult<()> {
        for worker in &workers {
            worker.validate()?;
        }

        {
            let mut state = self.inner.state.lock();
            if state.workers_set {
                return Err(DispatchError::WorkersAlreadySet);
            }
            state.workers_set = true;
            state.slots = workers
                .into_iter()
                .map(|worker| WorkerSlot { worker, current: None })
                .collect();
            state.routes = state
                .slots
                .iter()
                .map(|slot| slot.worker.accepts())
                .filter(|accepts| !matches!(accepts, Accepts::All))
                .cloned()
                .collect();

            let names: Vec<&str> = state.slots.iter().map(|slot| slot.worker.name()).collect();
            info!(workers = ?names, "Workers registered");
        }

        self.inner.pass();
        Ok(())
    }

    /// Whether a job with this kind and `info` is pending or in flight.
    ///
    /// Producers call this before submitting to avoid duplicates. A `Null`
    /// info matches jobs that carry none.
    pub fn has_pending_queue(&self, kind: &JobKind, info: &Value) -> bool {
        let state = self.inner.state.lock();
        state
            .pending
            .iter()
            .chain(state.running.iter())
            .any(|job| job.kind() == kind && job.info().unwrap_or(&Value::Null) == info)
    }

    /// Withdraw a pending job before it runs. Returns false when the job is
    /// not pending.
    pub fn skip(&self, id: &JobId) -> bool {
        let mut state = self.inner.state.lock();
        let Some(index) = state.pending.iter().position(|job| job.id() == id) else {
            return false;
        };

        let mut job = state.pending.remove(index);
        job.skip();
        info!(job_id = %id, "Job skipped");
        state.completed.push(job);
        true
    }

    pub fn job_status(&self, id: &JobId) -> Option<JobStatus> {
        self.inner.state.lock().find(id).map(Job::status)
    }

    /// Every status the job has held
    pub fn job_history(&self, id: &JobId) -> Option<Vec<JobStatus>> {
        self.inner
            .state
            .lock()
            .find(id)
            .map(|job| job.history().to_vec())
    }

    /// Receive lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.inner.events.subscribe()
    }

    /// Stop the scheduling loop and refuse further submissions.
    ///
    /// Jobs already in flight still settle.
    pub fn shutdown(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            info!("Shutting down dispatcher");
            self.inner.wake();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Scheduling loop: one pass per wake-up or sweep tick
async fn run(inner: Arc<Inner>) {
    let mut sweep = (!inner.config.sweep_interval.is_zero()).then(|| {
        let mut ticker = interval(inner.config.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            _ = inner.wake.notified() => {}
            _ = tick(&mut sweep) => {}
        }

        if inner.closed.load(Ordering::SeqCst) {
            break;
        }
        inner.pass();
    }

    info!("Scheduling loop stopped");
}

async fn tick(sweep: &mut Option<Interval>) {
    match sweep {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
