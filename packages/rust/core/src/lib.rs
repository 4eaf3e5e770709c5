//! Task-dependency execution engine for linkbak.
//!
//! For each link, a [`LinkPipeline`] resolves the link's [`Workspace`],
//! executes the registered [`Step`]s in dependency order through the
//! [`Executor`], and persists the accumulated metadata. The [`Scheduler`]
//! runs pipelines for many links with bounded parallelism, and
//! [`merge_records`] folds every record into the global index.

pub mod cache;
pub mod executor;
pub mod index;
pub mod pipeline;
pub mod scheduler;
pub mod step;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use cache::{ExecutionCache, StepStatus};
pub use executor::{Executor, StepOutcome, StepReport};
pub use index::{INDEX_FILE, MergeResult, load_index, merge_records};
pub use pipeline::{LinkPipeline, PipelineResult, load_record};
pub use scheduler::{ProgressReporter, RunSummary, Scheduler, SilentProgress};
pub use step::{Requirement, Step, StepContext, StepError, StepRegistry};
pub use workspace::{RECORD_FILE, Workspace, write_atomic};
