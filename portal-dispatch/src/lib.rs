//! # portal-dispatch: job dispatch for portal automation
//!
//! Queues heterogeneous jobs and hands them to a small, fixed pool of
//! capability-constrained workers:
//!
//! - **Capability matching**: each worker declares the job kinds it accepts
//!   plus a runtime readiness check; lower priority wins, ties are random
//! - **One job per worker**: in-flight work is bounded by the worker count
//! - **Bounded retries**: retryable and clean-and-retry failures re-run the
//!   job while the budget lasts, everything else fails it
//! - **Timeouts**: stuck jobs are retired by the dispatcher, optionally after
//!   a worker hook force-stops the session
//! - **Persistence**: pending exportable jobs survive restarts through a
//!   JSON queue file
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use portal_dispatch::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> DispatchResult<()> {
//! let dispatcher = Dispatcher::start(DispatchConfig::default().with_max_retry(2));
//! let transport = HttpDeliver::new(HttpDeliver::DEFAULT_TIMEOUT)?;
//! let workers: Vec<Arc<dyn Worker>> = vec![
//!     Arc::new(Notifier::new("notifier", transport)),
//!     Arc::new(Cleaner::new("cleaner", "/var/lib/portal/profile")),
//! ];
//! dispatcher.set_workers(workers)?;
//!
//! let info = json!("REQ-2041");
//! if !dispatcher.has_pending_queue(&JobKind::Cleanup, &info) {
//!     let queued = dispatcher.add(Job::new(JobKind::Cleanup, json!({ "info": info })))?;
//!     println!("queued {}", queued.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod observability;
pub mod types;
pub mod worker;

pub use config::DispatchConfig;
pub use dispatcher::{
    Dispatcher, JobSummary, LogEntry, LogFilter, QueueEntry, Queued, StatusCounts, StatusReport,
    WorkerStatus,
};
pub use error::{DispatchError, DispatchResult, WorkError, WorkResult};
pub use job::{Job, JobOutcome, JobTicket, Payload};
pub use types::{DispatchEvent, JobFlag, JobId, JobKind, JobStatus, KindFlags};
pub use worker::{
    Accepts, Automation, AutomationExecutor, Cleaner, Deliver, HttpDeliver, Notifier, QueueView,
    Sink, Worker,
};

pub mod prelude {
    pub use crate::{Dispatcher, DispatchConfig, LogFilter};

    pub use crate::{
        DispatchError, DispatchEvent, DispatchResult, Job, JobId, JobKind, JobOutcome, JobStatus,
        JobTicket, WorkError, WorkResult,
    };

    pub use crate::{
        Accepts, Automation, AutomationExecutor, Cleaner, HttpDeliver, Notifier, QueueView, Sink,
        Worker,
    };

    pub use async_trait::async_trait;
}
