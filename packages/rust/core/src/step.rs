//! Step model: the [`Step`] trait, its error type, and the ordered registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use linkbak_shared::{ContentKind, LinkbakError, Metadata, Result, RunConfig};

use crate::workspace::{FAILURE_SUFFIX, RECORD_FILE, Workspace};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a step run did not produce its artifact.
#[derive(Error, Debug)]
pub enum StepError {
    /// The step does not apply to this link. Not recorded as a failure.
    #[error("not applicable: {0}")]
    NotApplicable(String),

    /// External tool exited non-zero.
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// External tool or fetch exceeded the configured timeout.
    #[error("{tool} timed out after {}s", .after.as_secs())]
    Timeout { tool: String, after: Duration },

    /// External tool could not be started.
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The run reported success but its artifact is not on disk.
    #[error("run succeeded but {0} was not written")]
    MissingArtifact(String),

    #[error(transparent)]
    Other(#[from] LinkbakError),
}

impl StepError {
    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Self::NotApplicable(reason.into())
    }

    /// Whether this error counts as a failed attempt.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::NotApplicable(_))
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// A dependency edge of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// The named step must be executed first.
    Step(&'static str),
    /// Alternatives executed in order until one has its artifact on disk.
    FirstOf(&'static [&'static str]),
}

impl Requirement {
    /// Names of every step this requirement refers to.
    pub fn names(&self) -> &[&'static str] {
        match self {
            Self::Step(name) => std::slice::from_ref(name),
            Self::FirstOf(names) => names,
        }
    }
}

/// Everything a step can see while running for one link.
pub struct StepContext<'a> {
    pub link: &'a str,
    pub workspace: &'a Workspace,
    pub metadata: &'a Metadata,
    pub config: &'a RunConfig,
}

impl StepContext<'_> {
    pub fn artifact(&self, output: &str) -> PathBuf {
        self.workspace.artifact(output)
    }

    /// Path of an input artifact, or `NotApplicable` if it is not on disk yet.
    pub fn require_input(&self, output: &str) -> std::result::Result<PathBuf, StepError> {
        let path = self.artifact(output);
        if path.exists() {
            Ok(path)
        } else {
            Err(StepError::not_applicable(format!("input {output} is missing")))
        }
    }

    /// First of `outputs` present in the workspace.
    pub fn first_existing<'o>(&self, outputs: &[&'o str]) -> Option<(&'o str, PathBuf)> {
        outputs
            .iter()
            .map(|o| (*o, self.artifact(o)))
            .find(|(_, path)| path.exists())
    }

    /// `NotApplicable` when the link is known to be something other than HTML.
    ///
    /// An unknown kind (classification failed) is allowed through.
    pub fn require_html(&self) -> std::result::Result<(), StepError> {
        match self.metadata.kind() {
            Some(ContentKind::Html | ContentKind::Unknown) | None => Ok(()),
            Some(kind) => Err(StepError::not_applicable(format!(
                "content is {}, not html",
                kind.as_str()
            ))),
        }
    }
}

/// One named unit of work producing a single artifact for a link.
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable name, used as the bookkeeping key in metadata.
    fn name(&self) -> &'static str;

    /// Artifact file name inside the workspace. Its existence means Done.
    fn output(&self) -> &'static str;

    fn requires(&self) -> &[Requirement] {
        &[]
    }

    /// Produce the artifact and return the metadata fields it adds.
    async fn run(&self, ctx: &StepContext<'_>) -> std::result::Result<Metadata, StepError>;

    /// Re-derive the metadata delta of a Done step from its artifact.
    fn restore(&self, _ctx: &StepContext<'_>) -> Metadata {
        Metadata::new()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The ordered step catalogue of a pipeline.
///
/// Declaration order is execution order. The first step is the metadata
/// step, and every dependency is declared before its dependents.
pub struct StepRegistry {
    steps: Vec<Box<dyn Step>>,
    index: HashMap<&'static str, usize>,
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.steps.iter().map(|s| s.name())).finish()
    }
}

impl StepRegistry {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Result<Self> {
        if steps.is_empty() {
            return Err(LinkbakError::config("step registry is empty"));
        }

        let mut index = HashMap::with_capacity(steps.len());
        let mut outputs = HashMap::with_capacity(steps.len());

        for (pos, step) in steps.iter().enumerate() {
            let name = step.name();
            let output = step.output();

            if index.insert(name, pos).is_some() {
                return Err(LinkbakError::config(format!("duplicate step name '{name}'")));
            }
            if let Some(other) = outputs.insert(output, name) {
                return Err(LinkbakError::config(format!(
                    "steps '{other}' and '{name}' both produce {output}"
                )));
            }
            if output == RECORD_FILE || output.ends_with(FAILURE_SUFFIX) {
                return Err(LinkbakError::config(format!(
                    "step '{name}' uses reserved output name {output}"
                )));
            }
        }

        for (pos, step) in steps.iter().enumerate() {
            for requirement in step.requires() {
                if let Requirement::FirstOf(names) = requirement
                    && names.is_empty()
                {
                    return Err(LinkbakError::config(format!(
                        "step '{}' has an empty alternative list",
                        step.name()
                    )));
                }
                for dep in requirement.names() {
                    match index.get(dep) {
                        None => {
                            return Err(LinkbakError::config(format!(
                                "step '{}' requires unknown step '{dep}'",
                                step.name()
                            )));
                        }
                        Some(&dep_pos) if dep_pos >= pos => {
                            return Err(LinkbakError::config(format!(
                                "step '{}' requires '{dep}', which is not declared before it \
                                 (cycle or out-of-order declaration)",
                                step.name()
                            )));
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        Ok(Self { steps, index })
    }

    pub fn get(&self, name: &str) -> Option<&dyn Step> {
        self.index.get(name).map(|&pos| self.steps[pos].as_ref())
    }

    /// Steps in declaration order.
    pub fn steps(&self) -> impl Iterator<Item = &dyn Step> {
        self.steps.iter().map(|s| s.as_ref())
    }

    /// The step that establishes the base record. Always declared first.
    pub fn metadata_step(&self) -> &dyn Step {
        self.steps[0].as_ref()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
