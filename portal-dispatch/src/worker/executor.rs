use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{Accepts, QueueView, Worker};
use crate::{DispatchError, DispatchResult, Job, JobKind, JobTicket, WorkError, WorkResult};

/// The browser-automation collaborator driven by [`AutomationExecutor`]
#[async_trait]
pub trait Automation: Send + Sync + 'static {
    /// Job kinds this automation can perform
    fn capabilities(&self) -> Vec<JobKind>;

    /// False while the session is unusable (e.g. the browser is down)
    fn is_operational(&self) -> bool {
        true
    }

    /// Reset session state before a retry
    async fn reset_session(&self) -> WorkResult<()> {
        Ok(())
    }

    /// Whether [`Automation::force_stop`] does anything
    fn can_force_stop(&self) -> bool {
        false
    }

    /// Abort whatever the session is doing
    async fn force_stop(&self) {}

    /// Mutable working area (profile, downloads) wiped on clean-and-retry
    fn work_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Typed handler for one job kind
pub type Handler<A> = Arc<dyn Fn(Arc<A>, JobTicket) -> BoxFuture<'static, WorkResult<Value>> + Send + Sync>;

/// Primary executor: routes each job kind to the handler registered for it
/// on the wrapped automation object.
pub struct AutomationExecutor<A: Automation> {
    name: String,
    priority: i32,
    automation: Arc<A>,
    accepts: Accepts,
    handlers: HashMap<JobKind, Handler<A>>,
    busy: AtomicBool,
}

impl<A: Automation> AutomationExecutor<A> {
    pub fn builder(name: impl Into<String>, automation: Arc<A>) -> ExecutorBuilder<A> {
        ExecutorBuilder {
            name: name.into(),
            priority: 0,
            automation,
            handlers: HashMap::new(),
        }
    }

    pub fn automation(&self) -> &Arc<A> {
        &self.automation
    }

    /// True while a handler is running, including one orphaned by a timeout
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Builder collecting the kind-to-handler table
pub struct ExecutorBuilder<A: Automation> {
    name: String,
    priority: i32,
    automation: Arc<A>,
    handlers: HashMap<JobKind, Handler<A>>,
}

impl<A: Automation> ExecutorBuilder<A> {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Register the handler for `kind`
    pub fn handle<F, Fut>(mut self, kind: JobKind, handler: F) -> Self
    where
        F: Fn(Arc<A>, JobTicket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkResult<Value>> + Send + 'static,
    {
        let handler: Handler<A> = Arc::new(move |automation, ticket| handler(automation, ticket).boxed());
        self.handlers.insert(kind, handler);
        self
    }

    /// Build the executor; the handler table must match the automation's
    /// capabilities exactly.
    pub fn build(self) -> DispatchResult<AutomationExecutor<A>> {
        let capabilities = self.automation.capabilities();

        if let Some(kind) = capabilities.iter().find(|kind| !self.handlers.contains_key(*kind)) {
            return Err(DispatchError::MissingHandler {
                worker: self.name,
                kind: kind.clone(),
            });
        }
        if let Some(kind) = self.handlers.keys().find(|kind| !capabilities.contains(kind)) {
            return Err(DispatchError::UnexpectedHandler {
                worker: self.name,
                kind: kind.clone(),
            });
        }

        info!(worker = %self.name, kinds = ?capabilities, "Automation executor ready");

        Ok(AutomationExecutor {
            name: self.name,
            priority: self.priority,
            automation: self.automation,
            accepts: Accepts::set(capabilities),
            handlers: self.handlers,
            busy: AtomicBool::new(false),
        })
    }
}

/// Clears the busy flag when the handler future completes or is dropped
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl<A: Automation> Worker for AutomationExecutor<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn accepts(&self) -> &Accepts {
        &self.accepts
    }

    /// Idle, operational, and no cleanup waiting to wipe the work area
    fn can_accept(&self, _job: &Job, queues: &QueueView<'_>) -> bool {
        !self.is_busy()
            && self.automation.is_operational()
            && !queues.contains_kind(&JobKind::Cleanup)
    }

    #[instrument(skip_all, fields(worker = %self.name, job_id = %job.id, kind = %job.kind))]
    async fn execute(&self, job: &JobTicket) -> WorkResult<Value> {
        let handler = self
            .handlers
            .get(&job.kind)
            .cloned()
            .ok_or_else(|| WorkError::terminal(format!("No handler for {}", job.kind)))?;

        self.busy.store(true, Ordering::SeqCst);
        let _guard = BusyGuard(&self.busy);

        handler(Arc::clone(&self.automation), job.clone()).await
    }

    async fn on_retry(&self, _job: &JobTicket) -> WorkResult<()> {
        self.automation.reset_session().await
    }

    fn handles_timeout(&self) -> bool {
        self.automation.can_force_stop()
    }

    async fn on_timeout(&self, job: &JobTicket) {
        warn!(worker = %self.name, job_id = %job.id, "Force-stopping automation after timeout");
        self.automation.force_stop().await;
    }

    async fn clean(&self) -> WorkResult<()> {
        let Some(dir) = self.automation.work_dir() else {
            return Ok(());
        };

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(worker = %self.name, dir = %dir.display(), "Wiped work area");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FakePortal {
        operational: AtomicBool,
    }

    impl FakePortal {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                operational: AtomicBool::new(true),
            })
        }

        async fn create(&self, ticket: JobTicket) -> WorkResult<Value> {
            let name = ticket
                .get_mapped_string("applicant.name")
                .ok_or_else(|| WorkError::terminal("missing applicant name"))?;
            Ok(json!({ "submitted": name }))
        }
    }

    #[async_trait]
    impl Automation for FakePortal {
        fn capabilities(&self) -> Vec<JobKind> {
            vec![JobKind::CreateRequest, JobKind::Noop]
        }

        fn is_operational(&self) -> bool {
            self.operational.load(Ordering::SeqCst)
        }
    }

    fn executor(portal: Arc<FakePortal>) -> AutomationExecutor<FakePortal> {
        AutomationExecutor::builder("browser", portal)
            .handle(JobKind::CreateRequest, |portal, ticket| async move {
                portal.create(ticket).await
            })
            .handle(JobKind::Noop, |_, _| async { Ok(Value::Null) })
            .build()
            .unwrap()
    }

    #[test]
    fn build_rejects_missing_handler() {
        let result = AutomationExecutor::builder("browser", FakePortal::new())
            .handle(JobKind::Noop, |_, _| async { Ok(Value::Null) })
            .build();

        assert!(matches!(
            result,
            Err(DispatchError::MissingHandler { kind: JobKind::CreateRequest, .. })
        ));
    }

    #[test]
    fn build_rejects_unexpected_handler() {
        let result = AutomationExecutor::builder("browser", FakePortal::new())
            .handle(JobKind::CreateRequest, |_, _| async { Ok(Value::Null) })
            .handle(JobKind::Noop, |_, _| async { Ok(Value::Null) })
            .handle(JobKind::FetchCaptcha, |_, _| async { Ok(Value::Null) })
            .build();

        assert!(matches!(
            result,
            Err(DispatchError::UnexpectedHandler { kind: JobKind::FetchCaptcha, .. })
        ));
    }

    #[tokio::test]
    async fn dispatches_to_handler_by_kind() {
        let worker = executor(FakePortal::new());
        let job = Job::new(JobKind::CreateRequest, json!({ "nm": "Ayu" }))
            .with_maps(json!({ "applicant": { "name": "nm" } }))
            .unwrap();

        let result = worker.execute(&job.ticket()).await.unwrap();
        assert_eq!(result, json!({ "submitted": "Ayu" }));
        assert!(!worker.is_busy());
    }

    #[test]
    fn readiness_checks() {
        let portal = FakePortal::new();
        let worker = executor(portal.clone());
        let job = Job::new(JobKind::Noop, json!({}));
        let none: Vec<Job> = Vec::new();

        assert!(worker.is_accepted(&job, &QueueView::new(&none, &none)));

        let cleanup = vec![Job::new(JobKind::Cleanup, json!({}))];
        assert!(!worker.is_accepted(&job, &QueueView::new(&cleanup, &none)));

        portal.operational.store(false, Ordering::SeqCst);
        assert!(!worker.is_accepted(&job, &QueueView::new(&none, &none)));

        let captcha = Job::new(JobKind::FetchCaptcha, json!({}));
        portal.operational.store(true, Ordering::SeqCst);
        assert!(!worker.is_accepted(&captcha, &QueueView::new(&none, &none)));
    }
}
