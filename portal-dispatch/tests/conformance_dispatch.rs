use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use portal_dispatch::{
    Accepts, Deliver, DispatchConfig, DispatchError, DispatchEvent, Dispatcher, Job, JobKind,
    JobOutcome, JobStatus, JobTicket, LogFilter, Notifier, QueueEntry, Sink, WorkError,
    WorkResult, Worker,
};

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    AlwaysRetryable,
    Hang,
    Sleep(Duration),
    SleepThenRetryable(Duration),
}

/// Test worker recording what it was given
struct TestWorker {
    name: String,
    priority: i32,
    accepts: Accepts,
    behaviour: Behaviour,
    stops_on_timeout: bool,
    assigned: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    timeouts: AtomicUsize,
}

impl TestWorker {
    fn new(name: &str, kind: JobKind, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            priority: 0,
            accepts: Accepts::One(kind),
            behaviour,
            stops_on_timeout: false,
            assigned: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            timeouts: AtomicUsize::new(0),
        }
    }

    fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn stops_on_timeout(mut self) -> Self {
        self.stops_on_timeout = true;
        self
    }

    fn assigned(&self) -> usize {
        self.assigned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for TestWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn accepts(&self) -> &Accepts {
        &self.accepts
    }

    async fn execute(&self, job: &JobTicket) -> WorkResult<Value> {
        if job.retry_count == 0 {
            self.assigned.fetch_add(1, Ordering::SeqCst);
        }
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let result = match self.behaviour {
            Behaviour::Succeed => Ok(json!({ "worker": self.name })),
            Behaviour::AlwaysRetryable => Err(WorkError::retryable("portal busy")),
            Behaviour::Hang => std::future::pending().await,
            Behaviour::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(json!({ "worker": self.name }))
            }
            Behaviour::SleepThenRetryable(duration) => {
                tokio::time::sleep(duration).await;
                Err(WorkError::retryable("portal busy"))
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn handles_timeout(&self) -> bool {
        self.stops_on_timeout
    }

    async fn on_timeout(&self, _job: &JobTicket) {
        self.timeouts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Delivery recorder standing in for the HTTP transport
#[derive(Clone, Default)]
struct Recorder {
    sent: Arc<Mutex<Vec<(String, Value)>>>,
}

#[async_trait]
impl Deliver for Recorder {
    async fn deliver(&self, payload: &Value, destination: &str) -> Option<Value> {
        self.sent.lock().push((destination.to_string(), payload.clone()));
        Some(json!("ok"))
    }
}

fn create_dispatcher() -> Dispatcher {
    Dispatcher::start(DispatchConfig::default().with_sweep_interval(Duration::from_millis(50)))
}

fn drain(events: &mut broadcast::Receiver<DispatchEvent>) -> Vec<DispatchEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

async fn settle(mut job: Job, dispatcher: &Dispatcher) -> (portal_dispatch::JobId, JobOutcome) {
    let outcome = job.completion();
    let queued = dispatcher.add(job).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(10), outcome)
        .await
        .expect("job did not settle")
        .expect("completion dropped");
    (queued.id, outcome)
}

/// D1. Submission acknowledges with the job id
#[tokio::test]
async fn test_add_acknowledges_queued() {
    let dispatcher = create_dispatcher();
    let job = Job::new(JobKind::QueryRequest, json!({})).with_id("q-1");

    let queued = dispatcher.add(job).unwrap();

    assert_eq!(serde_json::to_value(&queued).unwrap(), json!({ "status": "queued", "id": "q-1" }));
    assert_eq!(dispatcher.job_status(&queued.id), Some(JobStatus::New));
}

/// D2. Duplicate guard sees the first submission before the second
#[tokio::test]
async fn test_duplicate_submission_detected() {
    let dispatcher = create_dispatcher();
    let info = json!({ "permit": "P-77" });

    assert!(!dispatcher.has_pending_queue(&JobKind::CreateRequest, &info));
    dispatcher
        .add(Job::new(JobKind::CreateRequest, json!({ "info": info })))
        .unwrap();

    assert!(dispatcher.has_pending_queue(&JobKind::CreateRequest, &info));
    assert!(!dispatcher.has_pending_queue(&JobKind::QueryRequest, &info));
    assert!(!dispatcher.has_pending_queue(&JobKind::CreateRequest, &json!({ "permit": "P-78" })));
}

/// D3. Completed jobs no longer count as duplicates
#[tokio::test]
async fn test_duplicate_guard_ignores_completed() {
    let dispatcher = create_dispatcher();
    let worker = Arc::new(TestWorker::new("query", JobKind::QueryRequest, Behaviour::Succeed));
    dispatcher.set_workers(vec![worker]).unwrap();

    let (_, outcome) = settle(Job::new(JobKind::QueryRequest, json!({ "info": "R-1" })), &dispatcher).await;

    assert!(matches!(outcome, JobOutcome::Done(_)));
    assert!(!dispatcher.has_pending_queue(&JobKind::QueryRequest, &json!("R-1")));
}

/// D4. Equal-priority workers share the load; a worse priority never wins
#[tokio::test]
async fn test_random_tie_break_between_equal_priorities() {
    let dispatcher = create_dispatcher();
    let left = Arc::new(TestWorker::new("left", JobKind::Noop, Behaviour::Succeed));
    let right = Arc::new(TestWorker::new("right", JobKind::Noop, Behaviour::Succeed));
    let backup = Arc::new(TestWorker::new("backup", JobKind::Noop, Behaviour::Succeed).priority(5));
    dispatcher
        .set_workers(vec![left.clone(), right.clone(), backup.clone()])
        .unwrap();

    for _ in 0..100 {
        let (_, outcome) = settle(Job::new(JobKind::Noop, json!({})), &dispatcher).await;
        assert!(matches!(outcome, JobOutcome::Done(_)));
    }

    assert_eq!(left.assigned() + right.assigned(), 100);
    assert!(left.assigned() > 0);
    assert!(right.assigned() > 0);
    assert_eq!(backup.assigned(), 0);
}

/// D5. Lower priority number is preferred while it is idle
#[tokio::test]
async fn test_lowest_priority_preferred() {
    let dispatcher = create_dispatcher();
    let primary = Arc::new(TestWorker::new("primary", JobKind::Noop, Behaviour::Succeed).priority(-1));
    let secondary = Arc::new(TestWorker::new("secondary", JobKind::Noop, Behaviour::Succeed));
    dispatcher
        .set_workers(vec![secondary.clone(), primary.clone()])
        .unwrap();

    for _ in 0..10 {
        settle(Job::new(JobKind::Noop, json!({})), &dispatcher).await;
    }

    assert_eq!(primary.assigned(), 10);
    assert_eq!(secondary.assigned(), 0);
}

/// D6. A worker never holds more than one job
#[tokio::test]
async fn test_single_job_per_worker() {
    let dispatcher = create_dispatcher();
    let workers: Vec<Arc<TestWorker>> = (0..3)
        .map(|n| {
            Arc::new(TestWorker::new(
                &format!("slow-{n}"),
                JobKind::Noop,
                Behaviour::Sleep(Duration::from_millis(5)),
            ))
        })
        .collect();
    dispatcher
        .set_workers(workers.iter().map(|w| w.clone() as Arc<dyn Worker>).collect())
        .unwrap();

    let mut outcomes = Vec::new();
    for _ in 0..30 {
        let mut job = Job::new(JobKind::Noop, json!({}));
        outcomes.push(job.completion());
        dispatcher.add(job).unwrap();
        assert!(dispatcher.get_status().counts.running <= workers.len());
    }
    for outcome in outcomes {
        let outcome = tokio::time::timeout(Duration::from_secs(10), outcome)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Done(_)));
    }

    let total: usize = workers.iter().map(|w| w.assigned()).sum();
    assert_eq!(total, 30);
    for worker in &workers {
        assert!(worker.max_active.load(Ordering::SeqCst) <= 1);
    }
    assert_eq!(dispatcher.get_status().counts.done, 30);
}

/// D7. Retry budget N gives exactly N retries, then error
#[tokio::test]
async fn test_retry_accounting() {
    let dispatcher = Dispatcher::start(DispatchConfig::default().with_max_retry(2));
    let mut events = dispatcher.subscribe();
    let worker = Arc::new(TestWorker::new("flaky", JobKind::CreateRequest, Behaviour::AlwaysRetryable));
    dispatcher.set_workers(vec![worker.clone()]).unwrap();

    let (id, outcome) = settle(Job::new(JobKind::CreateRequest, json!({})), &dispatcher).await;

    assert_eq!(outcome, JobOutcome::Failed("portal busy".to_string()));
    assert_eq!(worker.assigned(), 1);
    assert_eq!(
        dispatcher.job_history(&id).unwrap(),
        vec![JobStatus::New, JobStatus::Processing, JobStatus::Error]
    );

    let last = dispatcher.get_status().last.unwrap();
    assert_eq!(last.id, id);
    assert_eq!(last.retry_count, 3);
    assert_eq!(last.worker.as_deref(), Some("flaky"));

    let retries: Vec<u32> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            DispatchEvent::Retrying { retry_count, .. } => Some(retry_count),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2]);
}

/// D8. Non-retryable kinds fail on the first retryable error
#[tokio::test]
async fn test_retry_disabled_kind_fails_immediately() {
    let dispatcher = Dispatcher::start(DispatchConfig::default().with_max_retry(5));
    let worker = Arc::new(TestWorker::new("noop", JobKind::Noop, Behaviour::AlwaysRetryable));
    dispatcher.set_workers(vec![worker]).unwrap();

    let (_, outcome) = settle(Job::new(JobKind::Noop, json!({})), &dispatcher).await;

    assert!(matches!(outcome, JobOutcome::Failed(_)));
    assert_eq!(dispatcher.get_status().last.unwrap().retry_count, 1);
}

/// D9. Timeout retires the job without done/error events
#[tokio::test(start_paused = true)]
async fn test_timeout_without_hook() {
    let dispatcher = Dispatcher::start(
        DispatchConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_sweep_interval(Duration::from_secs(1)),
    );
    let mut events = dispatcher.subscribe();
    let worker = Arc::new(TestWorker::new("stuck", JobKind::QueryRequest, Behaviour::Hang));
    dispatcher.set_workers(vec![worker.clone()]).unwrap();

    let (id, outcome) = settle(Job::new(JobKind::QueryRequest, json!({})), &dispatcher).await;

    assert_eq!(outcome, JobOutcome::TimedOut);
    assert_eq!(dispatcher.job_status(&id), Some(JobStatus::TimedOut));
    assert_eq!(
        dispatcher.job_history(&id).unwrap(),
        vec![JobStatus::New, JobStatus::Processing, JobStatus::TimedOut]
    );

    let status = dispatcher.get_status();
    assert_eq!(status.counts.completed, 1);
    assert_eq!(status.counts.timed_out, 1);
    assert_eq!(status.workers[0].current, None);

    let names: Vec<&str> = drain(&mut events)
        .iter()
        .filter(|event| event.job_id() == &id)
        .map(DispatchEvent::event_name)
        .collect();
    assert_eq!(names, vec!["job-queued", "job-assigned", "job-timeout"]);
}

/// Worker outcome arriving after the job already timed out
async fn assert_late_outcome_ignored(behaviour: Behaviour) {
    let dispatcher = Dispatcher::start(
        DispatchConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_sweep_interval(Duration::from_secs(1)),
    );
    let mut events = dispatcher.subscribe();
    let worker = Arc::new(TestWorker::new("slow", JobKind::QueryRequest, behaviour));
    dispatcher.set_workers(vec![worker.clone()]).unwrap();

    let job = Job::new(JobKind::QueryRequest, json!({})).with_callback("http://hooks.local/jobs");
    let (id, outcome) = settle(job, &dispatcher).await;
    assert_eq!(outcome, JobOutcome::TimedOut);

    // Let the worker wake up and report
    tokio::time::sleep(Duration::from_secs(30)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(worker.assigned(), 1);
    assert_eq!(worker.active.load(Ordering::SeqCst), 0);

    assert_eq!(dispatcher.job_status(&id), Some(JobStatus::TimedOut));
    assert_eq!(
        dispatcher.job_history(&id).unwrap(),
        vec![JobStatus::New, JobStatus::Processing, JobStatus::TimedOut]
    );

    let status = dispatcher.get_status();
    assert_eq!(status.counts.completed, 1);
    assert_eq!(status.counts.pending, 0);
    assert_eq!(status.counts.timed_out, 1);
    assert_eq!(status.last.unwrap().retry_count, 0);

    let names: Vec<&str> = drain(&mut events).iter().map(DispatchEvent::event_name).collect();
    assert_eq!(names, vec!["job-queued", "job-assigned", "job-timeout"]);
}

/// D9a. A success reported after the timeout changes nothing
#[tokio::test(start_paused = true)]
async fn test_late_success_after_timeout() {
    assert_late_outcome_ignored(Behaviour::Sleep(Duration::from_secs(8))).await;
}

/// D9b. A retryable failure reported after the timeout is not retried
#[tokio::test(start_paused = true)]
async fn test_late_retryable_after_timeout() {
    assert_late_outcome_ignored(Behaviour::SleepThenRetryable(Duration::from_secs(8))).await;
}

/// D10. Per-job timeout overrides the default; the worker hook runs first
#[tokio::test(start_paused = true)]
async fn test_timeout_hook_runs_before_retirement() {
    let dispatcher = Dispatcher::start(DispatchConfig::default().with_sweep_interval(Duration::from_secs(1)));
    let worker = Arc::new(TestWorker::new("browser", JobKind::CreateRequest, Behaviour::Hang).stops_on_timeout());
    dispatcher.set_workers(vec![worker.clone()]).unwrap();

    let job = Job::new(JobKind::CreateRequest, json!({})).with_timeout(Duration::from_secs(3));
    let (id, outcome) = settle(job, &dispatcher).await;
    assert_eq!(outcome, JobOutcome::TimedOut);

    for _ in 0..10 {
        if dispatcher.get_status().counts.completed == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(worker.timeouts.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.get_status().counts.timed_out, 1);
    assert_eq!(dispatcher.job_status(&id), Some(JobStatus::TimedOut));
}

/// D11. Zero timeout disables the sweep
#[tokio::test(start_paused = true)]
async fn test_zero_timeout_never_expires() {
    let dispatcher = Dispatcher::start(DispatchConfig::default().with_sweep_interval(Duration::from_secs(1)));
    let worker = Arc::new(TestWorker::new("stuck", JobKind::QueryRequest, Behaviour::Hang));
    dispatcher.set_workers(vec![worker]).unwrap();

    let queued = dispatcher.add(Job::new(JobKind::QueryRequest, json!({}))).unwrap();
    tokio::time::sleep(Duration::from_secs(3600)).await;

    assert_eq!(dispatcher.job_status(&queued.id), Some(JobStatus::Processing));
}

/// D12. Loggable filter drops new and processing jobs
#[tokio::test]
async fn test_loggable_filter() {
    let dispatcher = create_dispatcher();
    let worker = Arc::new(TestWorker::new("noop", JobKind::Noop, Behaviour::Succeed));
    dispatcher.set_workers(vec![worker]).unwrap();

    let waiting = dispatcher
        .add(Job::new(JobKind::CreateRequest, json!({ "name": "Permit renewal" })))
        .unwrap();
    let (done, _) = settle(Job::new(JobKind::Noop, json!({})), &dispatcher).await;

    let everything = dispatcher.get_logs(LogFilter::default());
    assert_eq!(everything.len(), 2);
    assert_eq!(everything[0].id, done);
    assert_eq!(everything[1].id, waiting.id);
    assert_eq!(everything[1].name.as_deref(), Some("Permit renewal"));

    let loggable = dispatcher.get_logs(LogFilter::default().loggable());
    assert_eq!(loggable.len(), 1);
    assert_eq!(loggable[0].id, done);
    assert_eq!(loggable[0].status, JobStatus::Done);

    let exportable = dispatcher.get_logs(LogFilter::default().exportable().loggable());
    assert!(exportable.is_empty());
}

/// D13. Inspected results are rendered as strings
#[tokio::test]
async fn test_inspected_results() {
    let dispatcher = Dispatcher::start(DispatchConfig::default().with_inspect_limit(4));
    let worker = Arc::new(TestWorker::new("noop", JobKind::Noop, Behaviour::Succeed));
    dispatcher.set_workers(vec![worker]).unwrap();
    settle(Job::new(JobKind::Noop, json!({})), &dispatcher).await;

    let raw = dispatcher.get_logs(LogFilter::default());
    assert_eq!(raw[0].result, Some(json!({ "worker": "noop" })));

    let inspected = dispatcher.get_logs(LogFilter::default().inspect());
    assert_eq!(inspected[0].result, Some(json!("{\n  ...")));
}

/// D14. Save then load reconstructs pending exportable jobs and deletes the file
#[tokio::test]
async fn test_save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = DispatchConfig::default().with_queue_file(dir.path().join("state/queue.json"));

    let before = Dispatcher::start(config.clone());
    before
        .add(
            Job::new(JobKind::CreateRequest, json!({ "nm": "Ayu", "info": "A-1" }))
                .with_callback("http://hooks.local/a")
                .with_maps(json!({ "applicant": { "name": "nm" } }))
                .unwrap(),
        )
        .unwrap();
    before
        .add(Job::new(JobKind::QueryRequest, json!({ "ref": "R-9" })))
        .unwrap();
    before
        .add(Job::new(JobKind::FetchCaptcha, json!({})))
        .unwrap();

    assert_eq!(before.save_queue().await.unwrap(), 2);
    let saved: Vec<QueueEntry> =
        serde_json::from_slice(&std::fs::read(&config.queue_file).unwrap()).unwrap();
    assert_eq!(saved.len(), 2);

    let after = Dispatcher::start(config.clone());
    assert_eq!(after.load_queue().await.unwrap(), 2);
    assert!(!config.queue_file.exists());
    assert!(after.has_pending_queue(&JobKind::CreateRequest, &json!("A-1")));

    after.save_queue().await.unwrap();
    let resaved: Vec<QueueEntry> =
        serde_json::from_slice(&std::fs::read(&config.queue_file).unwrap()).unwrap();
    assert_eq!(resaved, saved);
}

/// D15. Loading without a saved file is a no-op
#[tokio::test]
async fn test_load_missing_queue_file() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher =
        Dispatcher::start(DispatchConfig::default().with_queue_file(dir.path().join("none.json")));

    assert_eq!(dispatcher.load_queue().await.unwrap(), 0);
    assert_eq!(dispatcher.get_status().counts.pending, 0);
}

/// D16. Finished jobs with a callback notify through the notifier
#[tokio::test]
async fn test_callback_follow_up_delivered() {
    let dispatcher = create_dispatcher();
    let recorder = Recorder::default();
    let query = Arc::new(TestWorker::new("query", JobKind::QueryRequest, Behaviour::Succeed));
    dispatcher
        .set_workers(vec![query, Arc::new(Notifier::new("notifier", recorder.clone()))])
        .unwrap();

    let job = Job::new(JobKind::QueryRequest, json!({ "name": "status check" }))
        .with_callback("http://hooks.local/status");
    let (id, _) = settle(job, &dispatcher).await;

    for _ in 0..200 {
        if !recorder.sent.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let sent = recorder.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "http://hooks.local/status");
    assert_eq!(
        sent[0].1,
        json!({ "id": id, "type": "query-request", "status": "done", "result": { "worker": "query" } })
    );

    // The callback job is not the last reported job
    assert_eq!(dispatcher.get_status().last.unwrap().id, id);
}

/// D17. Workers register once
#[tokio::test]
async fn test_set_workers_only_once() {
    let dispatcher = create_dispatcher();
    dispatcher.set_workers(Vec::new()).unwrap();

    let again = dispatcher.set_workers(vec![Arc::new(TestWorker::new("late", JobKind::Noop, Behaviour::Succeed))]);
    assert!(matches!(again, Err(DispatchError::WorkersAlreadySet)));
}

/// D18. Shutdown refuses new submissions
#[tokio::test]
async fn test_add_after_shutdown() {
    let dispatcher = create_dispatcher();
    dispatcher.shutdown();

    let result = dispatcher.add(Job::new(JobKind::Noop, json!({})));
    assert!(matches!(result, Err(DispatchError::ShutDown)));
    assert!(dispatcher.is_shut_down());
}

/// D19. Skipping withdraws a pending job
#[tokio::test]
async fn test_skip_pending_job() {
    let dispatcher = create_dispatcher();
    let mut job = Job::new(JobKind::CreateRequest, json!({ "info": "S-1" }));
    let outcome = job.completion();
    let queued = dispatcher.add(job).unwrap();

    assert!(dispatcher.skip(&queued.id));
    assert!(!dispatcher.skip(&queued.id));
    assert_eq!(outcome.await.unwrap(), JobOutcome::Skipped);
    assert!(!dispatcher.has_pending_queue(&JobKind::CreateRequest, &json!("S-1")));
    assert_eq!(dispatcher.get_status().counts.skipped, 1);
}

/// D20. Log export writes a timestamped file
#[tokio::test]
async fn test_write_logs() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = Dispatcher::start(DispatchConfig::default().with_log_dir(dir.path().join("logs")));
    dispatcher
        .add(Job::new(JobKind::QueryRequest, json!({})).with_id("w-1"))
        .unwrap();

    let path = dispatcher.write_logs(LogFilter::default()).await.unwrap();

    assert!(path.starts_with(dir.path().join("logs")));
    let written: Vec<HashMap<String, Value>> =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0]["id"], json!("w-1"));
    assert_eq!(written[0]["status"], json!("new"));
}

/// D21. The dead-letter worker leaves routable jobs for their busy worker
#[tokio::test]
async fn test_sink_skips_routable_jobs() {
    let dispatcher = create_dispatcher();
    let slow = Arc::new(TestWorker::new(
        "query",
        JobKind::QueryRequest,
        Behaviour::Sleep(Duration::from_millis(200)),
    ));
    dispatcher
        .set_workers(vec![slow.clone(), Arc::new(Sink::default())])
        .unwrap();

    let mut first = Job::new(JobKind::QueryRequest, json!({}));
    let mut second = Job::new(JobKind::QueryRequest, json!({}));
    let first_done = first.completion();
    let second_done = second.completion();
    dispatcher.add(first).unwrap();
    let second_id = dispatcher.add(second).unwrap().id;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(dispatcher.job_status(&second_id), Some(JobStatus::New));

    let mut stray = Job::new(JobKind::Other("fax".to_string()), json!({}));
    let stray_done = stray.completion();
    dispatcher.add(stray).unwrap();

    for outcome in [first_done, second_done] {
        let outcome = tokio::time::timeout(Duration::from_secs(10), outcome)
            .await
            .expect("job did not settle")
            .expect("completion dropped");
        assert!(matches!(outcome, JobOutcome::Done(_)));
    }
    let stray = tokio::time::timeout(Duration::from_secs(10), stray_done)
        .await
        .expect("job did not settle")
        .expect("completion dropped");
    assert_eq!(stray, JobOutcome::Failed("ignored".to_string()));
    assert_eq!(slow.assigned(), 2);
}
