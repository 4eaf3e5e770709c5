//! Step executor: runs one step and its requirements for a single link.
//!
//! The filesystem is the only source of truth. For each step:
//!
//! 1. `Failed` without force: skipped, requirements are not visited.
//! 2. `Failed` with force: marker cleared, treated as `Pending`.
//! 3. `Done`: the step's own work is skipped; its delta is restored from the
//!    artifact.
//! 4. `Pending`: requirements first, then `run`. A failure writes the marker
//!    (when diagnostics are on) and drops the delta.
//!
//! Whenever the artifact exists afterwards, the bookkeeping entry
//! `{name: [<hash>/<output>, mtime]}` is injected into the metadata.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tracing::{Instrument, debug, info, info_span, warn};

use linkbak_shared::{Metadata, RunConfig, StepRecord};

use crate::cache::{ExecutionCache, StepStatus};
use crate::step::{Requirement, Step, StepContext, StepError, StepRegistry};
use crate::workspace::Workspace;

/// What happened to a step during one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// `run` was invoked and produced the artifact.
    Ran,
    /// Artifact already present; nothing executed.
    Cached,
    /// A failure marker exists and force was not requested.
    SkippedFailed,
    /// The step does not apply to this link.
    NotApplicable(String),
    /// `run` was invoked and did not produce the artifact.
    Failed(String),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Per-step result of a pipeline run.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: &'static str,
    pub outcome: StepOutcome,
    pub elapsed: Duration,
}

/// Executes steps of one [`StepRegistry`] for one link, each at most once.
pub struct Executor<'a> {
    registry: &'a StepRegistry,
    cache: &'a ExecutionCache,
    config: &'a RunConfig,
    workspace: &'a Workspace,
    link: &'a str,
    visited: HashSet<&'static str>,
    reports: Vec<StepReport>,
}

impl<'a> Executor<'a> {
    pub fn new(
        registry: &'a StepRegistry,
        cache: &'a ExecutionCache,
        config: &'a RunConfig,
        workspace: &'a Workspace,
        link: &'a str,
    ) -> Self {
        Self {
            registry,
            cache,
            config,
            workspace,
            link,
            visited: HashSet::new(),
            reports: Vec::with_capacity(registry.len()),
        }
    }

    /// Execute `name` (and, if it needs to run, its requirements), folding
    /// every delta into `metadata`.
    ///
    /// A step already executed by this executor is a no-op.
    pub fn execute<'s>(
        &'s mut self,
        name: &'static str,
        metadata: &'s mut Metadata,
    ) -> BoxFuture<'s, ()> {
        let span = info_span!("step", step = name);
        Box::pin(
            async move {
                if !self.visited.insert(name) {
                    return;
                }
                let registry = self.registry;
                let Some(step) = registry.get(name) else {
                    warn!("unknown step, ignoring");
                    return;
                };

                let start = Instant::now();
                let outcome = self.attempt(step, metadata).await;

                if self.workspace.artifact(step.output()).exists() {
                    self.record_completion(step, metadata);
                }

                let elapsed = start.elapsed();
                match &outcome {
                    StepOutcome::Ran => {
                        info!(elapsed_ms = elapsed.as_millis() as u64, "step completed")
                    }
                    StepOutcome::Cached => debug!("step already done"),
                    StepOutcome::SkippedFailed => debug!("step failed earlier, skipping"),
                    StepOutcome::NotApplicable(reason) => debug!(%reason, "step not applicable"),
                    StepOutcome::Failed(error) => warn!(%error, "step failed"),
                }

                self.reports.push(StepReport {
                    step: name,
                    outcome,
                    elapsed,
                });
            }
            .instrument(span),
        )
    }

    /// Reports in completion order (requirements before dependents).
    pub fn into_reports(self) -> Vec<StepReport> {
        self.reports
    }

    async fn attempt(&mut self, step: &'a dyn Step, metadata: &mut Metadata) -> StepOutcome {
        let output = step.output();

        match self.cache.status(self.workspace, output) {
            StepStatus::Failed if !self.config.force => return StepOutcome::SkippedFailed,
            StepStatus::Failed => {
                if let Err(e) = self.cache.clear_failed(self.workspace, output) {
                    warn!(error = %e, "could not clear failure marker");
                }
            }
            StepStatus::Done => {
                if self.workspace.failure_marker(output).exists()
                    && let Err(e) = self.cache.clear_failed(self.workspace, output)
                {
                    warn!(error = %e, "could not clear stale failure marker");
                }
                self.check_requirements_recorded(step, metadata);
                let delta = step.restore(&self.context(metadata));
                metadata.merge(delta);
                return StepOutcome::Cached;
            }
            StepStatus::Pending => {}
        }

        for requirement in step.requires() {
            self.satisfy(*requirement, metadata).await;
        }

        let result = step.run(&self.context(metadata)).await;

        let result = match result {
            Ok(delta) if self.workspace.artifact(output).exists() => Ok(delta),
            Ok(_) => Err(StepError::MissingArtifact(output.to_string())),
            Err(e) => Err(e),
        };

        match result {
            Ok(delta) => {
                metadata.merge(delta);
                StepOutcome::Ran
            }
            Err(StepError::NotApplicable(reason)) => StepOutcome::NotApplicable(reason),
            Err(e) => {
                let message = e.to_string();
                if let Err(write_err) = self.cache.mark_failed(self.workspace, output, &message) {
                    warn!(error = %write_err, "could not write failure marker");
                }
                StepOutcome::Failed(message)
            }
        }
    }

    async fn satisfy(&mut self, requirement: Requirement, metadata: &mut Metadata) {
        match requirement {
            Requirement::Step(dep) => self.execute(dep, metadata).await,
            Requirement::FirstOf(alternatives) => {
                for alt in alternatives {
                    self.execute(*alt, metadata).await;
                    let present = self
                        .registry
                        .get(alt)
                        .is_some_and(|s| self.workspace.artifact(s.output()).exists());
                    if present {
                        debug!(source = *alt, "alternative satisfied");
                        break;
                    }
                }
            }
        }
    }

    /// A Done step whose requirement has no bookkeeping entry is an anomaly:
    /// its inputs are gone or failed. The artifact is kept regardless.
    fn check_requirements_recorded(&self, step: &dyn Step, metadata: &Metadata) {
        for requirement in step.requires() {
            let recorded = requirement.names().iter().any(|n| metadata.contains(n));
            if !recorded {
                warn!(
                    requirement = ?requirement.names(),
                    "cache inconsistency: artifact present but requirement not recorded"
                );
            }
        }
    }

    fn record_completion(&self, step: &dyn Step, metadata: &mut Metadata) {
        let output = step.output();
        let Some(completed_at) = self.cache.completed_at(self.workspace, output) else {
            return;
        };
        let record = StepRecord::new(self.workspace.relative(output), completed_at);
        metadata.insert(step.name(), record.to_value());
    }

    fn context<'c>(&'c self, metadata: &'c Metadata) -> StepContext<'c> {
        StepContext {
            link: self.link,
            workspace: self.workspace,
            metadata,
            config: self.config,
        }
    }
}
