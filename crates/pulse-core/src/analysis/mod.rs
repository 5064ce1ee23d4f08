//! Bounded-concurrency media analysis.
//!
//! Every polled segment fans out into three independent jobs (probe,
//! loudness, thumbnail) submitted to a process-wide pipeline that runs at
//! most `max_jobs` external-tool invocations at a time. Excess jobs wait
//! in FIFO order. Job errors are logged and swallowed; they never reach
//! the scheduler.

pub mod loudness;
pub mod probe;
mod thumbnail;
mod toolkit;

pub use probe::{channel_layout_name, parse_frame_rate, parse_probe, ProbeReport};
pub use toolkit::{AnalysisError, FfmpegToolkit, MediaToolkit};

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event::EventSender;
use crate::model::StreamRecord;
use crate::store::StreamStore;

pub struct AnalysisPipeline {
    jobs: Arc<Semaphore>,
}

impl AnalysisPipeline {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            jobs: Arc::new(Semaphore::new(max_jobs.max(1))),
        }
    }

    /// Submit a job. Never blocks the caller; the job starts once a slot
    /// frees up (waiters run in submission order) and its outcome is only
    /// logged.
    pub fn submit<F>(&self, label: &'static str, stream_id: String, job: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), AnalysisError>> + Send + 'static,
    {
        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            let _permit = match jobs.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            match job.await {
                Ok(()) => debug!(job = label, stream_id = %stream_id, "Analysis task finished"),
                Err(e) => warn!(job = label, stream_id = %stream_id, error = %e, "Analysis task failed"),
            }
        })
    }
}

#[derive(Clone)]
pub(crate) struct TaskContext {
    pub stream_id: String,
    pub toolkit: Arc<dyn MediaToolkit>,
    pub store: Arc<dyn StreamStore>,
    pub events: EventSender,
}

/// Dispatches per-segment analysis jobs onto the shared pipeline.
pub struct Analyzer {
    pipeline: AnalysisPipeline,
    toolkit: Arc<dyn MediaToolkit>,
    store: Arc<dyn StreamStore>,
    events: EventSender,
}

impl Analyzer {
    pub fn new(
        max_jobs: usize,
        toolkit: Arc<dyn MediaToolkit>,
        store: Arc<dyn StreamStore>,
        events: EventSender,
    ) -> Self {
        Self {
            pipeline: AnalysisPipeline::new(max_jobs),
            toolkit,
            store,
            events,
        }
    }

    /// Queue probe, loudness, and thumbnail jobs for the segment. Returns
    /// immediately; the jobs run as pipeline slots free up.
    pub fn analyze_segment(&self, stream_id: &str, segment_url: &str) {
        let ctx = TaskContext {
            stream_id: stream_id.to_string(),
            toolkit: Arc::clone(&self.toolkit),
            store: Arc::clone(&self.store),
            events: self.events.clone(),
        };
        let url = segment_url.to_string();

        self.pipeline
            .submit("probe", ctx.stream_id.clone(), probe::run(ctx.clone(), url.clone()));
        self.pipeline
            .submit("loudness", ctx.stream_id.clone(), loudness::run(ctx.clone(), url.clone()));
        self.pipeline
            .submit("thumbnail", ctx.stream_id.clone(), thumbnail::run(ctx, url));
    }
}

/// Save an analysis result, tolerating version conflicts: the sweep may
/// have advanced the record since this job snapshotted it, and the policy
/// is drop, don't retry.
pub(crate) async fn save_best_effort(store: &Arc<dyn StreamStore>, record: &mut StreamRecord) {
    match store.save(record).await {
        Ok(()) => {}
        Err(e) if e.is_conflict() => {
            debug!(stream_id = %record.id, "Dropped analysis save on version conflict");
        }
        Err(e) => {
            warn!(stream_id = %record.id, error = %e, "Failed to persist analysis result");
        }
    }
}
