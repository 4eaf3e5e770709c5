//! Bounded-parallel scheduling of link pipelines.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use linkbak_shared::{LinkbakError, Result};

use crate::pipeline::{LinkPipeline, PipelineResult};

/// Summary of one scheduler run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Distinct links scheduled.
    pub total: usize,
    /// Links whose pipeline completed and wrote a record.
    pub processed: usize,
    /// Links whose pipeline could not complete, with the reason.
    pub failed: Vec<(String, String)>,
    /// Step failures across all processed links.
    pub step_failures: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting scheduler status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a worker picks up a link.
    fn link_started(&self, link: &str);
    /// Called when a link's pipeline ends, successfully or not.
    fn link_finished(&self, link: &str, result: std::result::Result<&PipelineResult, &str>);
    /// Called once after every link has finished.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn link_started(&self, _link: &str) {}
    fn link_finished(&self, _link: &str, _result: std::result::Result<&PipelineResult, &str>) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Runs a [`LinkPipeline`] for many links with at most `workers` in flight.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pipeline: Arc<LinkPipeline>,
}

impl Scheduler {
    pub fn new(pipeline: LinkPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &LinkPipeline {
        &self.pipeline
    }

    /// Process every distinct link. Per-link errors are collected in the
    /// summary and never abort the other links.
    #[instrument(skip_all, fields(links = links.len(), workers = self.pipeline.config().workers))]
    pub async fn run_all(
        &self,
        links: Vec<String>,
        progress: Arc<dyn ProgressReporter>,
    ) -> RunSummary {
        let start = Instant::now();
        let links = dedup(links);
        let workers = self.pipeline.config().workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        info!(distinct = links.len(), workers, "scheduling links");

        let mut handles = Vec::with_capacity(links.len());
        for link in &links {
            let pipeline = Arc::clone(&self.pipeline);
            let sem = Arc::clone(&semaphore);
            let progress = Arc::clone(&progress);
            let link_owned = link.clone();

            handles.push((
                link.clone(),
                tokio::spawn(async move {
                    let _permit = sem
                        .acquire()
                        .await
                        .map_err(|e| LinkbakError::validation(format!("worker pool closed: {e}")))?;
                    progress.link_started(&link_owned);
                    pipeline.process(&link_owned).await
                }),
            ));
        }

        let mut summary = RunSummary {
            total: links.len(),
            ..RunSummary::default()
        };

        for (link, handle) in handles {
            let outcome: Result<PipelineResult> = match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    error!(%link, error = %join_err, "link worker panicked");
                    Err(LinkbakError::validation(format!("worker panicked: {join_err}")))
                }
            };

            match outcome {
                Ok(result) => {
                    summary.processed += 1;
                    summary.step_failures += result.failed_steps().len();
                    progress.link_finished(&link, Ok(&result));
                }
                Err(e) => {
                    warn!(%link, error = %e, "link pipeline failed");
                    let message = e.to_string();
                    progress.link_finished(&link, Err(message.as_str()));
                    summary.failed.push((link, message));
                }
            }
        }

        summary.elapsed = start.elapsed();
        info!(
            processed = summary.processed,
            failed = summary.failed.len(),
            step_failures = summary.step_failures,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run complete"
        );
        progress.done(&summary);
        summary
    }
}

/// Drop repeated links, keeping first-seen order.
fn dedup(links: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(links.len());
    links
        .into_iter()
        .filter(|link| seen.insert(link.clone()))
        .collect()
}
