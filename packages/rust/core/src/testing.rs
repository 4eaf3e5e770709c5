//! In-memory steps for engine tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use linkbak_shared::{AppConfig, Metadata, RunConfig};

use crate::step::{Requirement, Step, StepContext, StepError, StepRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Write the delta as JSON into the artifact and return it.
    Succeed,
    /// Return a tool failure.
    Fail,
    /// Return `NotApplicable`.
    Skip,
    /// Return success without writing the artifact.
    Forget,
}

/// Shared handle observing and steering a [`FakeStep`].
#[derive(Debug)]
pub struct FakeState {
    runs: AtomicUsize,
    behavior: Mutex<Behavior>,
}

impl FakeState {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }
}

pub struct FakeStep {
    name: &'static str,
    output: &'static str,
    requires: Vec<Requirement>,
    inputs: Vec<&'static str>,
    delta: Metadata,
    restores: bool,
    state: Arc<FakeState>,
}

impl FakeStep {
    pub fn new(name: &'static str, output: &'static str) -> Self {
        Self {
            name,
            output,
            requires: Vec::new(),
            inputs: Vec::new(),
            delta: Metadata::new(),
            restores: false,
            state: Arc::new(FakeState {
                runs: AtomicUsize::new(0),
                behavior: Mutex::new(Behavior::Succeed),
            }),
        }
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    /// Artifact that must exist for the run to apply.
    pub fn input(mut self, output: &'static str) -> Self {
        self.inputs.push(output);
        self
    }

    pub fn delta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.delta.insert(key, value);
        self
    }

    /// Reload the delta from the artifact when Done.
    pub fn restoring(mut self) -> Self {
        self.restores = true;
        self
    }

    pub fn behave(self, behavior: Behavior) -> Self {
        self.state.set(behavior);
        self
    }

    pub fn state(&self) -> Arc<FakeState> {
        Arc::clone(&self.state)
    }
}

#[async_trait]
impl Step for FakeStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn output(&self) -> &'static str {
        self.output
    }

    fn requires(&self) -> &[Requirement] {
        &self.requires
    }

    async fn run(&self, ctx: &StepContext<'_>) -> Result<Metadata, StepError> {
        self.state.runs.fetch_add(1, Ordering::SeqCst);
        for input in &self.inputs {
            ctx.require_input(input)?;
        }
        let behavior = *self.state.behavior.lock().unwrap();
        match behavior {
            Behavior::Succeed => {
                let body = serde_json::to_vec(&self.delta).unwrap();
                std::fs::write(ctx.artifact(self.output), body).unwrap();
                Ok(self.delta.clone())
            }
            Behavior::Fail => Err(StepError::ToolFailed {
                tool: self.name.to_string(),
                status: "exit status: 1".into(),
                stderr: "simulated failure".into(),
            }),
            Behavior::Skip => Err(StepError::not_applicable("simulated skip")),
            Behavior::Forget => Ok(self.delta.clone()),
        }
    }

    fn restore(&self, ctx: &StepContext<'_>) -> Metadata {
        if !self.restores {
            return Metadata::new();
        }
        std::fs::read(ctx.artifact(self.output))
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }
}

/// Build a registry from fake steps, keeping their state handles.
pub fn registry(steps: Vec<FakeStep>) -> (StepRegistry, Vec<Arc<FakeState>>) {
    let states = steps.iter().map(FakeStep::state).collect();
    let boxed = steps
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn Step>)
        .collect();
    (StepRegistry::new(boxed).unwrap(), states)
}

pub fn temp_root(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("lb-{label}-test-{}", uuid::Uuid::now_v7()))
}

pub fn run_config(root: &std::path::Path) -> RunConfig {
    let mut config = RunConfig::from(&AppConfig::default());
    config.output_root = root.to_path_buf();
    config.diagnostics = true;
    config.workers = 2;
    config.timeout = Duration::from_secs(5);
    config
}
