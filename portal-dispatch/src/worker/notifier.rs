use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{Accepts, Worker};
use crate::{DispatchResult, JobKind, JobTicket, WorkError, WorkResult};

/// Transport used by [`Notifier`] to hand a payload to an external endpoint.
///
/// Returns the endpoint's response, or `None` when nothing was delivered.
#[async_trait]
pub trait Deliver: Send + Sync + 'static {
    async fn deliver(&self, payload: &Value, destination: &str) -> Option<Value>;
}

/// JSON-over-HTTP POST delivery
#[derive(Debug, Clone)]
pub struct HttpDeliver {
    client: reqwest::Client,
}

impl HttpDeliver {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Duration) -> DispatchResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Deliver for HttpDeliver {
    async fn deliver(&self, payload: &Value, destination: &str) -> Option<Value> {
        let response = match self.client.post(destination).json(payload).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(destination, error = %err, "Callback delivery failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(destination, %status, "Callback endpoint rejected delivery");
            return None;
        }

        let body = response.text().await.unwrap_or_default();
        Some(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}

/// Delivers callback jobs: `data.payload` is posted to `data.url`, falling
/// back to the job's own callback destination.
pub struct Notifier<D: Deliver = HttpDeliver> {
    name: String,
    priority: i32,
    accepts: Accepts,
    transport: D,
}

impl<D: Deliver> Notifier<D> {
    pub fn new(name: impl Into<String>, transport: D) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            accepts: Accepts::One(JobKind::Callback),
            transport,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl<D: Deliver> Worker for Notifier<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn accepts(&self) -> &Accepts {
        &self.accepts
    }

    #[instrument(skip_all, fields(worker = %self.name, job_id = %job.id))]
    async fn execute(&self, job: &JobTicket) -> WorkResult<Value> {
        let destination = job
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| job.callback.clone())
            .ok_or_else(|| WorkError::terminal("Callback job has no destination"))?;

        let payload = job.get("payload").cloned().unwrap_or(Value::Null);

        match self.transport.deliver(&payload, &destination).await {
            Some(response) => {
                debug!(destination, "Callback delivered");
                Ok(response)
            }
            None => Err(WorkError::retryable(format!("Callback to {destination} not delivered"))),
        }
    }
}
