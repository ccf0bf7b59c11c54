//! Workers: capability-declaring executors that hold at most one job at a time.

pub mod lifecycle;
pub mod executor;
pub mod notifier;
pub mod cleaner;
pub mod sink;

pub use executor::{Automation, AutomationExecutor, ExecutorBuilder};
pub use notifier::{Deliver, HttpDeliver, Notifier};
pub use cleaner::Cleaner;
pub use sink::Sink;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;

use crate::{DispatchResult, Job, JobKind, JobTicket, WorkResult};

/// Job kinds a worker is willing to take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepts {
    /// Every kind, including unregistered ones
    All,
    One(JobKind),
    Set(HashSet<JobKind>),
}

impl Accepts {
    pub fn set(kinds: impl IntoIterator<Item = JobKind>) -> Self {
        Self::Set(kinds.into_iter().collect())
    }

    pub fn admits(&self, kind: &JobKind) -> bool {
        match self {
            Self::All => true,
            Self::One(only) => only == kind,
            Self::Set(kinds) => kinds.contains(kind),
        }
    }
}

/// Read-only view of the dispatcher's pending and in-flight jobs, handed to
/// readiness checks while a scheduling pass runs.
#[derive(Debug, Clone, Copy)]
pub struct QueueView<'a> {
    pub pending: &'a [Job],
    pub running: &'a [Job],
    /// Kind sets of registered workers that do not accept everything
    pub routes: &'a [Accepts],
}

impl<'a> QueueView<'a> {
    pub fn new(pending: &'a [Job], running: &'a [Job]) -> Self {
        Self {
            pending,
            running,
            routes: &[],
        }
    }

    pub fn with_routes(mut self, routes: &'a [Accepts]) -> Self {
        self.routes = routes;
        self
    }

    /// Whether a job of `kind` is pending or in flight
    pub fn contains_kind(&self, kind: &JobKind) -> bool {
        self.pending
            .iter()
            .chain(self.running.iter())
            .any(|job| job.kind() == kind)
    }

    /// Whether some registered worker with a specific kind set takes `kind`
    pub fn is_routable(&self, kind: &JobKind) -> bool {
        self.routes.iter().any(|accepts| accepts.admits(kind))
    }
}

/// An executor the dispatcher can hand jobs to.
///
/// The dispatcher only assigns a job when [`Worker::is_accepted`] holds and
/// the worker is idle. [`lifecycle::consume`] drives execution, retries and
/// settlement.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Lower is preferred
    fn priority(&self) -> i32 {
        0
    }

    fn accepts(&self) -> &Accepts;

    /// Business-level readiness beyond the kind match
    fn can_accept(&self, _job: &Job, _queues: &QueueView<'_>) -> bool {
        true
    }

    /// Capability predicate used by the scheduler
    fn is_accepted(&self, job: &Job, queues: &QueueView<'_>) -> bool {
        self.accepts().admits(job.kind()) && self.can_accept(job, queues)
    }

    /// Perform the job
    async fn execute(&self, job: &JobTicket) -> WorkResult<Value>;

    /// Runs before a retryable failure is re-executed
    async fn on_retry(&self, _job: &JobTicket) -> WorkResult<()> {
        Ok(())
    }

    /// Whether [`Worker::on_timeout`] should run before a timed-out job is retired
    fn handles_timeout(&self) -> bool {
        false
    }

    async fn on_timeout(&self, _job: &JobTicket) {}

    /// Wipe the worker's mutable working area, if it has one
    async fn clean(&self) -> WorkResult<()> {
        Ok(())
    }

    /// Startup check run when the worker is registered
    fn validate(&self) -> DispatchResult<()> {
        Ok(())
    }
}
