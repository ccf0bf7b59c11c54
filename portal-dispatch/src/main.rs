use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use portal_dispatch::observability::{init_tracing, LogFormat};
use portal_dispatch::prelude::*;

/// One job submitted on stdin, as a JSON line
#[derive(Debug, Deserialize)]
struct Submission {
    #[serde(rename = "type")]
    kind: JobKind,
    #[serde(default)]
    id: Option<JobId>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    callback: Option<String>,
    #[serde(default)]
    maps: Option<Value>,
}

impl Submission {
    fn into_job(self) -> DispatchResult<Job> {
        let mut job = Job::new(self.kind, self.data);
        if let Some(id) = self.id {
            job = job.with_id(id);
        }
        if let Some(callback) = self.callback {
            job = job.with_callback(callback);
        }
        match self.maps {
            Some(maps) => job.with_maps(maps),
            None => Ok(job),
        }
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn workers() -> Result<Vec<Arc<dyn Worker>>> {
    let work_dir = std::env::var("PORTAL_WORK_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("profile"));

    let transport = HttpDeliver::new(HttpDeliver::DEFAULT_TIMEOUT).context("building HTTP client")?;
    let mut workers: Vec<Arc<dyn Worker>> = vec![
        Arc::new(Notifier::new("notifier", transport)),
        Arc::new(Cleaner::new("cleaner", work_dir)),
    ];
    if env_flag("PORTAL_DEAD_LETTER") {
        workers.push(Arc::new(Sink::default()));
    }
    Ok(workers)
}

/// Read JSON-line submissions until stdin closes
async fn read_submissions(dispatcher: Dispatcher) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }

        let submission: Submission = match serde_json::from_str(&line) {
            Ok(submission) => submission,
            Err(err) => {
                warn!(error = %err, "Ignoring malformed submission");
                continue;
            }
        };

        let info = submission.data.get("info").cloned().unwrap_or(Value::Null);
        if !info.is_null() && dispatcher.has_pending_queue(&submission.kind, &info) {
            warn!(kind = %submission.kind, %info, "Duplicate submission ignored");
            continue;
        }

        match submission.into_job().and_then(|job| dispatcher.add(job)) {
            Ok(queued) => info!(job_id = %queued.id, "Submission accepted"),
            Err(err) => warn!(error = %err, "Submission rejected"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let format = std::env::var("PORTAL_LOG_FORMAT")
        .map(|value| LogFormat::parse(&value))
        .unwrap_or_default();
    init_tracing(format);

    let config = DispatchConfig::from_env("PORTAL").context("reading PORTAL_* configuration")?;
    let dispatcher = Dispatcher::start(config);

    dispatcher
        .set_workers(workers()?)
        .context("registering workers")?;

    let restored = dispatcher.load_queue().await.context("loading saved queue")?;
    info!(restored, "Dispatcher ready");

    tokio::spawn(read_submissions(dispatcher.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    dispatcher.shutdown();
    let saved = dispatcher.save_queue().await.context("saving pending queue")?;
    let log = dispatcher
        .write_logs(LogFilter::default().loggable())
        .await
        .context("writing job log")?;
    info!(saved, log = %log.display(), "Dispatcher stopped");

    Ok(())
}
