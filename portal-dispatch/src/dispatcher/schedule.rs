use chrono::Utc;
use rand::seq::SliceRandom;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{DispatchState, Inner, JobSummary};
use crate::worker::lifecycle::{self, Settle};
use crate::worker::{QueueView, Worker};
use crate::{DispatchEvent, Job, JobId, JobKind, JobStatus, JobTicket, WorkError};

/// A job handed to a worker, started once the lock is released
struct Launch {
    worker: Arc<dyn Worker>,
    ticket: JobTicket,
}

impl Inner {
    /// One scheduling pass: at most one assignment, then the timeout sweep
    pub(crate) fn pass(self: &Arc<Self>) {
        let (launch, expired) = {
            let mut state = self.state.lock();
            let launch = self.assign_next(&mut state);
            let expired = self.sweep_timeouts(&mut state, Instant::now());
            (launch, expired)
        };

        if let Some(Launch { worker, ticket }) = launch {
            let settle: Arc<dyn Settle> = Arc::clone(self) as Arc<dyn Settle>;
            tokio::spawn(lifecycle::consume(worker, ticket, settle));
        }

        for Launch { worker, ticket } in expired {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                worker.on_timeout(&ticket).await;
                inner.end_queue(&ticket.id);
            });
        }
    }

    /// Pick the first pending job some idle worker accepts and move it to
    /// `running`. Among accepting workers the lowest priority wins; ties are
    /// broken uniformly at random.
    fn assign_next(&self, state: &mut DispatchState) -> Option<Launch> {
        let (index, slot) = {
            let view = QueueView::new(&state.pending, &state.running).with_routes(&state.routes);
            let slots = &state.slots;
            let mut rng = rand::thread_rng();

            state.pending.iter().enumerate().find_map(|(index, job)| {
                let candidates: Vec<usize> = slots
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.current.is_none() && slot.worker.is_accepted(job, &view))
                    .map(|(position, _)| position)
                    .collect();

                let best = candidates
                    .iter()
                    .map(|&position| slots[position].worker.priority())
                    .min()?;
                let ties: Vec<usize> = candidates
                    .into_iter()
                    .filter(|&position| slots[position].worker.priority() == best)
                    .collect();

                ties.choose(&mut rng).map(|&position| (index, position))
            })?
        };

        let mut job = state.pending.remove(index);
        let worker = Arc::clone(&state.slots[slot].worker);
        job.assign(worker.name(), self.config.max_retry);
        job.start();

        let ticket = job.ticket();
        state.slots[slot].current = Some(ticket.id.clone());

        info!(job_id = %ticket.id, kind = %ticket.kind, worker = worker.name(), "Job assigned");
        self.emit(DispatchEvent::Assigned {
            job_id: ticket.id.clone(),
            worker: worker.name().to_string(),
            at: Utc::now(),
        });
        state.running.push(job);

        if !state.pending.is_empty() {
            self.wake();
        }

        Some(Launch { worker, ticket })
    }

    /// Time out in-flight jobs past their limit. Jobs whose worker has a
    /// timeout hook are returned so the hook runs before retirement; the
    /// rest are retired here.
    fn sweep_timeouts(&self, state: &mut DispatchState, now: Instant) -> Vec<Launch> {
        let default = self.config.timeout;
        let expired: Vec<JobId> = state
            .running
            .iter()
            .filter(|job| !job.finished())
            .filter(|job| {
                let limit = job.timeout().unwrap_or(default);
                !limit.is_zero() && job.elapsed(now).is_some_and(|elapsed| elapsed >= limit)
            })
            .map(|job| job.id().clone())
            .collect();

        let mut hooks = Vec::new();
        for id in expired {
            let Some(job) = state.running.iter_mut().find(|job| job.id() == &id) else {
                continue;
            };
            job.time_out();
            let ticket = job.ticket();

            warn!(job_id = %id, kind = %ticket.kind, worker = ?job.worker(), "Job timed out");
            self.emit(DispatchEvent::TimedOut {
                job_id: id.clone(),
                at: Utc::now(),
            });

            let worker = state
                .slots
                .iter()
                .find(|slot| slot.current.as_ref() == Some(&id))
                .map(|slot| Arc::clone(&slot.worker));

            match worker {
                Some(worker) if worker.handles_timeout() => hooks.push(Launch { worker, ticket }),
                _ => self.retire(state, &id),
            }
        }
        hooks
    }

    pub(crate) fn end_queue(&self, id: &JobId) {
        let mut state = self.state.lock();
        self.retire(&mut state, id);
    }

    /// Move a job from `running` to `completed`, free its worker, queue the
    /// callback follow-up and schedule another pass if work remains.
    fn retire(&self, state: &mut DispatchState, id: &JobId) {
        let Some(index) = state.running.iter().position(|job| job.id() == id) else {
            return;
        };
        let mut job = state.running.remove(index);

        if !job.kind().is_callback() {
            state.last = Some(JobSummary::of(&job));
        }

        job.detach();
        if let Some(slot) = state
            .slots
            .iter_mut()
            .find(|slot| slot.current.as_ref() == Some(id))
        {
            slot.current = None;
        }

        if let Some(follow_up) = follow_up(&job) {
            debug!(job_id = %id, callback_id = %follow_up.id(), "Queueing callback");
            self.emit(DispatchEvent::Queued {
                job_id: follow_up.id().clone(),
                kind: follow_up.kind().clone(),
                at: Utc::now(),
            });
            state.pending.push(follow_up);
        }

        info!(job_id = %id, status = %job.status(), "Job retired");
        state.completed.push(job);

        if !state.pending.is_empty() || !state.running.is_empty() {
            self.wake();
        }
    }
}

/// Notification job for a finished job with a callback destination.
///
/// Only done and error outcomes notify, and callback jobs never do.
fn follow_up(job: &Job) -> Option<Job> {
    let url = job.callback()?;
    if job.kind().is_callback() || !matches!(job.status(), JobStatus::Done | JobStatus::Error) {
        return None;
    }

    let result = match job.result()? {
        Ok(value) => value.clone(),
        Err(error) => Value::String(error.message().to_string()),
    };

    Some(Job::new(
        JobKind::Callback,
        json!({
            "url": url,
            "payload": {
                "id": job.id(),
                "type": job.kind(),
                "status": job.status(),
                "result": result,
            },
        }),
    ))
}

impl Settle for Inner {
    fn retry(&self, id: &JobId, error: &WorkError) -> Option<u32> {
        let mut state = self.state.lock();
        let job = state
            .running
            .iter_mut()
            .find(|job| job.id() == id && !job.finished())?;

        if !job.record_retry() {
            debug!(job_id = %id, retry_count = job.retry_count(), "Retry budget exhausted");
            return None;
        }

        let retry_count = job.retry_count();
        self.emit(DispatchEvent::Retrying {
            job_id: id.clone(),
            retry_count,
            error: error.message().to_string(),
            at: Utc::now(),
        });
        Some(retry_count)
    }

    fn finish(&self, id: &JobId, outcome: Result<Value, WorkError>) {
        let mut state = self.state.lock();
        let Some(job) = state.running.iter_mut().find(|job| job.id() == id) else {
            debug!(job_id = %id, "Ignoring outcome for job no longer in flight");
            return;
        };
        if job.finished() {
            // Timed out while the worker was still running; the timeout path retires it
            debug!(job_id = %id, status = %job.status(), "Ignoring late outcome");
            return;
        }

        match outcome {
            Ok(value) => {
                job.done(value.clone());
                self.emit(DispatchEvent::Done {
                    job_id: id.clone(),
                    result: value,
                    at: Utc::now(),
                });
            }
            Err(error) => {
                warn!(job_id = %id, error = %error, retry_count = job.retry_count(), "Job failed");
                let message = error.message().to_string();
                job.error(error);
                self.emit(DispatchEvent::Failed {
                    job_id: id.clone(),
                    error: message,
                    at: Utc::now(),
                });
            }
        }

        self.retire(&mut state, id);
    }
}
