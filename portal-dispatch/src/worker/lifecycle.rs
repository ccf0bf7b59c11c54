use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::Worker;
use crate::{JobId, JobTicket, WorkError};

/// Bookkeeping side of an assignment, implemented by the dispatcher.
pub trait Settle: Send + Sync {
    /// Count a retryable failure. Returns the new retry count when another
    /// attempt is allowed, `None` when the job must fail (or is no longer in
    /// flight).
    fn retry(&self, id: &JobId, error: &WorkError) -> Option<u32>;

    /// Record the final outcome and retire the job
    fn finish(&self, id: &JobId, outcome: Result<Value, WorkError>);
}

/// Run one assignment to completion: `assigned -> running -> succeeded`,
/// `running -> retrying -> running`, or `running -> failed`.
#[instrument(skip_all, fields(worker = %worker.name(), job_id = %ticket.id, kind = %ticket.kind))]
pub async fn consume(worker: Arc<dyn Worker>, mut ticket: JobTicket, settle: Arc<dyn Settle>) {
    loop {
        let error = match worker.execute(&ticket).await {
            Ok(value) => {
                debug!("Worker succeeded");
                settle.finish(&ticket.id, Ok(value));
                return;
            }
            Err(error) => error,
        };

        if error.needs_clean() {
            if let Err(clean_error) = worker.clean().await {
                warn!(error = %clean_error, "Failed to clean worker area before retry");
            }
        }

        if error.is_retryable() {
            if let Some(retry_count) = settle.retry(&ticket.id, &error) {
                ticket.retry_count = retry_count;
                warn!(retry_count, error = %error, "Retrying job");

                if let Err(hook_error) = worker.on_retry(&ticket).await {
                    warn!(error = %hook_error, "Retry hook failed");
                    settle.finish(&ticket.id, Err(hook_error));
                    return;
                }
                continue;
            }
        }

        debug!(error = %error, "Worker failed");
        settle.finish(&ticket.id, Err(error));
        return;
    }
}
