//! Link pipeline: workspace → metadata step → remaining steps → record.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use linkbak_shared::{LinkbakError, Metadata, Result, RunConfig, fields};

use crate::cache::{ExecutionCache, StepStatus};
use crate::executor::{Executor, StepReport};
use crate::step::StepRegistry;
use crate::workspace::{Workspace, write_atomic};

/// Result of processing one link.
#[derive(Debug)]
pub struct PipelineResult {
    pub link: String,
    /// The link's workspace directory.
    pub workspace: PathBuf,
    /// Final metadata, as written to the record file.
    pub metadata: Metadata,
    pub reports: Vec<StepReport>,
    pub elapsed: Duration,
}

impl PipelineResult {
    /// Names of steps that failed during this run.
    pub fn failed_steps(&self) -> Vec<&'static str> {
        self.reports
            .iter()
            .filter(|r| r.outcome.is_failure())
            .map(|r| r.step)
            .collect()
    }
}

/// Runs every registered step for a link, in declaration order.
#[derive(Debug)]
pub struct LinkPipeline {
    registry: StepRegistry,
    config: RunConfig,
    cache: ExecutionCache,
}

impl LinkPipeline {
    pub fn new(registry: StepRegistry, config: RunConfig) -> Self {
        let cache = ExecutionCache::new(config.diagnostics);
        Self {
            registry,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Process one link end to end and persist its record.
    ///
    /// Step failures are reported in the result, never returned as errors.
    /// Errors are workspace or record I/O problems only.
    #[instrument(skip_all, fields(link = %link))]
    pub async fn process(&self, link: &str) -> Result<PipelineResult> {
        let start = Instant::now();

        let workspace = Workspace::resolve(&self.config.output_root, link);
        workspace.ensure()?;

        let mut metadata = Metadata::base(workspace.id(), link);
        let mut executor = Executor::new(
            &self.registry,
            &self.cache,
            &self.config,
            &workspace,
            link,
        );

        // The metadata step is declared first, so it runs ahead of the rest.
        for step in self.registry.steps() {
            executor.execute(step.name(), &mut metadata).await;
        }
        let reports = executor.into_reports();

        if !metadata.contains(fields::ID) || !metadata.contains(fields::LINK) {
            return Err(LinkbakError::validation(format!(
                "record for {link} lost its id or link field"
            )));
        }

        write_record(&workspace.record_path(), &metadata)?;

        let elapsed = start.elapsed();
        let failed = reports.iter().filter(|r| r.outcome.is_failure()).count();
        info!(
            id = %workspace.id(),
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "link processed"
        );

        Ok(PipelineResult {
            link: link.to_string(),
            workspace: workspace.dir().to_path_buf(),
            metadata,
            reports,
            elapsed,
        })
    }

    /// Status of every registered step for `link`, read from disk.
    pub fn status(&self, link: &str) -> Vec<(&'static str, StepStatus)> {
        let workspace = Workspace::resolve(&self.config.output_root, link);
        self.registry
            .steps()
            .map(|s| (s.name(), self.cache.status(&workspace, s.output())))
            .collect()
    }
}

fn write_record(path: &Path, metadata: &Metadata) -> Result<()> {
    let json = serde_json::to_vec_pretty(metadata)
        .map_err(|e| LinkbakError::parse(format!("failed to serialize record: {e}")))?;
    write_atomic(path, &json)
}

/// Read a link's persisted record.
pub fn load_record(path: &Path) -> Result<Metadata> {
    let bytes = std::fs::read(path).map_err(|e| LinkbakError::io(path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| LinkbakError::parse(format!("invalid record {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::executor::StepOutcome;
    use crate::step::Requirement;
    use crate::testing::{Behavior, FakeState, FakeStep, registry, run_config, temp_root};

    const LINK: &str = "http://example.com/a";

    /// metadata → dom → readable(dom) → epub(readable), plus an unrelated pdf.
    fn catalogue(root: &Path) -> (LinkPipeline, Vec<Arc<FakeState>>) {
        let (registry, states) = registry(vec![
            FakeStep::new("metadata", "metadata.json")
                .delta("kind", "html")
                .delta("title", "From headers")
                .restoring(),
            FakeStep::new("dom", "index.dom"),
            FakeStep::new("pdf", "output.pdf"),
            FakeStep::new("readable", "readable.html")
                .requires(Requirement::Step("dom"))
                .input("index.dom")
                .delta("title", "From article")
                .restoring(),
            FakeStep::new("epub", "readable.epub")
                .requires(Requirement::Step("readable"))
                .input("readable.html"),
        ]);
        (LinkPipeline::new(registry, run_config(root)), states)
    }

    fn runs(states: &[Arc<FakeState>]) -> Vec<usize> {
        states.iter().map(|s| s.runs()).collect()
    }

    #[tokio::test]
    async fn first_run_produces_record() {
        let root = temp_root("pipeline");
        let (pipeline, states) = catalogue(&root);

        let result = pipeline.process(LINK).await.unwrap();

        let ws = Workspace::resolve(&root, LINK);
        assert_eq!(result.workspace, ws.dir());
        assert_eq!(runs(&states), [1, 1, 1, 1, 1]);
        assert!(result.failed_steps().is_empty());

        let record = load_record(&ws.record_path()).unwrap();
        assert_eq!(record, result.metadata);
        assert_eq!(record.get_str("id"), Some(ws.id().as_str()));
        assert_eq!(record.get_str("link"), Some(LINK));
        assert_eq!(record.get_str("kind"), Some("html"));
        for step in ["metadata", "dom", "pdf", "readable", "epub"] {
            assert!(record.step_record(step).is_some(), "missing bookkeeping for {step}");
        }

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let root = temp_root("pipeline");
        let (pipeline, states) = catalogue(&root);

        let first = pipeline.process(LINK).await.unwrap();
        let second = pipeline.process(LINK).await.unwrap();

        assert_eq!(runs(&states), [1, 1, 1, 1, 1]);
        assert_eq!(first.metadata, second.metadata);
        assert!(
            second
                .reports
                .iter()
                .all(|r| r.outcome == StepOutcome::Cached)
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn deleted_output_reruns_only_that_step() {
        let root = temp_root("pipeline");
        let (pipeline, states) = catalogue(&root);
        let ws = Workspace::resolve(&root, LINK);

        pipeline.process(LINK).await.unwrap();
        std::fs::remove_file(ws.artifact("readable.html")).unwrap();
        pipeline.process(LINK).await.unwrap();

        assert_eq!(runs(&states), [1, 1, 1, 2, 1]);

        // Remove a dependent too: both rerun, the rest stay cached.
        std::fs::remove_file(ws.artifact("index.dom")).unwrap();
        std::fs::remove_file(ws.artifact("readable.epub")).unwrap();
        pipeline.process(LINK).await.unwrap();

        assert_eq!(runs(&states), [1, 2, 1, 2, 2]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failing_step_does_not_stop_siblings() {
        let root = temp_root("pipeline");
        let (pipeline, states) = catalogue(&root);
        states[1].set(Behavior::Fail);

        let result = pipeline.process(LINK).await.unwrap();
        let ws = Workspace::resolve(&root, LINK);

        assert_eq!(result.failed_steps(), ["dom"]);
        assert!(ws.failure_marker("index.dom").exists());
        let readable = result.reports.iter().find(|r| r.step == "readable").unwrap();
        assert!(matches!(readable.outcome, StepOutcome::NotApplicable(_)));
        assert!(!ws.failure_marker("readable.html").exists());
        assert!(!ws.artifact("index.dom").exists());
        assert!(!result.metadata.contains("dom"));

        // The unrelated sibling still produced its artifact and entry.
        assert!(ws.artifact("output.pdf").exists());
        assert!(result.metadata.step_record("pdf").is_some());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failed_steps_stay_skipped_until_forced() {
        let root = temp_root("pipeline");
        let (registry, states) = registry(vec![
            FakeStep::new("metadata", "metadata.json").restoring(),
            FakeStep::new("pdf", "output.pdf").behave(Behavior::Fail),
        ]);
        let config = run_config(&root);
        let pipeline = LinkPipeline::new(registry, config.clone());

        for _ in 0..3 {
            pipeline.process(LINK).await.unwrap();
        }
        assert_eq!(states[1].runs(), 1);

        let mut forced_config = config;
        forced_config.force = true;
        let (registry, forced_states) = crate::testing::registry(vec![
            FakeStep::new("metadata", "metadata.json").restoring(),
            FakeStep::new("pdf", "output.pdf"),
        ]);
        let forced = LinkPipeline::new(registry, forced_config);
        let result = forced.process(LINK).await.unwrap();
        assert_eq!(forced_states[1].runs(), 1);

        let ws = Workspace::resolve(&root, LINK);
        assert!(result.failed_steps().is_empty());
        assert!(ws.artifact("output.pdf").exists());
        assert!(!ws.failure_marker("output.pdf").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn later_steps_overwrite_only_their_own_fields() {
        let root = temp_root("pipeline");
        let (pipeline, _) = catalogue(&root);

        let result = pipeline.process(LINK).await.unwrap();

        assert_eq!(result.metadata.get_str("title"), Some("From article"));
        assert_eq!(result.metadata.get_str("kind"), Some("html"));
        assert_eq!(result.metadata.get_str("link"), Some(LINK));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn record_keeps_identity_and_classification_when_metadata_step_fails() {
        let root = temp_root("pipeline");
        let (pipeline, states) = catalogue(&root);
        states[0].set(Behavior::Fail);

        let result = pipeline.process(LINK).await.unwrap();

        assert!(result.failed_steps().contains(&"metadata"));
        assert!(result.metadata.contains("id"));
        assert_eq!(result.metadata.get_str("link"), Some(LINK));
        assert_eq!(result.metadata.get_str("kind"), Some("unknown"));

        let record = load_record(&Workspace::resolve(&root, LINK).record_path()).unwrap();
        assert_eq!(record.get_str("kind"), Some("unknown"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn done_artifacts_survive_a_failed_upstream() {
        let root = temp_root("pipeline");
        let (pipeline, states) = catalogue(&root);
        let first = pipeline.process(LINK).await.unwrap();

        let ws = Workspace::resolve(&root, LINK);
        std::fs::remove_file(ws.artifact("index.dom")).unwrap();
        states[1].set(Behavior::Fail);

        let second = pipeline.process(LINK).await.unwrap();
        assert_eq!(runs(&states), [1, 2, 1, 1, 1]);
        let outcome = |name: &str| {
            second
                .reports
                .iter()
                .find(|r| r.step == name)
                .map(|r| r.outcome.clone())
        };
        assert!(matches!(outcome("dom"), Some(StepOutcome::Failed(_))));
        assert!(matches!(outcome("readable"), Some(StepOutcome::Cached)));
        assert!(matches!(outcome("epub"), Some(StepOutcome::Cached)));

        assert!(second.metadata.step_record("dom").is_none());
        for step in ["readable", "epub"] {
            assert_eq!(
                second.metadata.step_record(step),
                first.metadata.step_record(step),
                "bookkeeping for {step} changed"
            );
        }
        assert_eq!(second.metadata.get_str("title"), Some("From article"));
        assert!(ws.artifact("readable.html").exists());
        assert!(ws.artifact("readable.epub").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn status_reads_disk_state() {
        let root = temp_root("pipeline");
        let (pipeline, states) = catalogue(&root);
        states[2].set(Behavior::Fail);

        assert!(
            pipeline
                .status(LINK)
                .iter()
                .all(|(_, s)| *s == StepStatus::Pending)
        );

        pipeline.process(LINK).await.unwrap();
        let status = pipeline.status(LINK);
        assert_eq!(status[0], ("metadata", StepStatus::Done));
        assert_eq!(status[2], ("pdf", StepStatus::Failed));

        let _ = std::fs::remove_dir_all(&root);
    }
}
