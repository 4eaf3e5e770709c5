//! Execution cache backed by the filesystem.
//!
//! The cache keeps no state of its own. A step's status is read from its
//! workspace every time:
//!
//! | artifact | failure marker | status    |
//! |----------|----------------|-----------|
//! | present  | any            | `Done`    |
//! | absent   | present        | `Failed`  |
//! | absent   | absent         | `Pending` |

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use linkbak_shared::{LinkbakError, Result};

use crate::workspace::Workspace;

/// Persisted outcome of one (link, step) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Done,
    Failed,
    Pending,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Failed => f.write_str("failed"),
            Self::Pending => f.write_str("pending"),
        }
    }
}

/// Reads and writes step outcomes as files inside a [`Workspace`].
#[derive(Debug, Clone)]
pub struct ExecutionCache {
    record_failures: bool,
}

impl ExecutionCache {
    /// `record_failures` controls whether [`mark_failed`](Self::mark_failed)
    /// persists a marker. Status checks only look at marker presence.
    pub fn new(record_failures: bool) -> Self {
        Self { record_failures }
    }

    pub fn records_failures(&self) -> bool {
        self.record_failures
    }

    pub fn status(&self, workspace: &Workspace, output: &str) -> StepStatus {
        if workspace.artifact(output).exists() {
            StepStatus::Done
        } else if workspace.failure_marker(output).exists() {
            StepStatus::Failed
        } else {
            StepStatus::Pending
        }
    }

    /// Persist a failure marker holding `error`.
    ///
    /// Returns whether a marker was written.
    pub fn mark_failed(&self, workspace: &Workspace, output: &str, error: &str) -> Result<bool> {
        if !self.record_failures {
            return Ok(false);
        }

        let marker = workspace.failure_marker(output);
        let body = format!("{} {error}\n", linkbak_shared::format_timestamp(&Utc::now()));
        std::fs::write(&marker, body).map_err(|e| LinkbakError::io(&marker, e))?;
        debug!(marker = %marker.display(), "wrote failure marker");
        Ok(true)
    }

    /// Remove the failure marker, if any.
    pub fn clear_failed(&self, workspace: &Workspace, output: &str) -> Result<()> {
        let marker = workspace.failure_marker(output);
        match std::fs::remove_file(&marker) {
            Ok(()) => {
                debug!(marker = %marker.display(), "cleared failure marker");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LinkbakError::io(&marker, e)),
        }
    }

    /// Completion time of a Done step: the artifact's modification time.
    ///
    /// Falls back to now when the platform reports no mtime.
    pub fn completed_at(&self, workspace: &Workspace, output: &str) -> Option<DateTime<Utc>> {
        let path = workspace.artifact(output);
        let meta = std::fs::metadata(&path).ok()?;
        match meta.modified() {
            Ok(mtime) => Some(DateTime::<Utc>::from(mtime)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "no modification time, using now");
                Some(Utc::now())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn workspace() -> (PathBuf, Workspace) {
        let root = std::env::temp_dir().join(format!("lb-cache-test-{}", uuid::Uuid::now_v7()));
        let ws = Workspace::resolve(&root, "http://example.com/a");
        ws.ensure().unwrap();
        (root, ws)
    }

    #[test]
    fn status_follows_files_on_disk() {
        let (root, ws) = workspace();
        let cache = ExecutionCache::new(true);

        assert_eq!(cache.status(&ws, "output.pdf"), StepStatus::Pending);

        cache.mark_failed(&ws, "output.pdf", "chromium exited with 1").unwrap();
        assert_eq!(cache.status(&ws, "output.pdf"), StepStatus::Failed);
        let marker = std::fs::read_to_string(ws.failure_marker("output.pdf")).unwrap();
        assert!(marker.contains("chromium exited with 1"));

        std::fs::write(ws.artifact("output.pdf"), b"%PDF").unwrap();
        assert_eq!(cache.status(&ws, "output.pdf"), StepStatus::Done);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn markers_only_written_with_diagnostics() {
        let (root, ws) = workspace();
        let cache = ExecutionCache::new(false);

        assert!(!cache.mark_failed(&ws, "index.dom", "boom").unwrap());
        assert!(!ws.failure_marker("index.dom").exists());
        assert_eq!(cache.status(&ws, "index.dom"), StepStatus::Pending);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn clear_failed_is_idempotent() {
        let (root, ws) = workspace();
        let cache = ExecutionCache::new(true);

        cache.mark_failed(&ws, "index.dom", "boom").unwrap();
        cache.clear_failed(&ws, "index.dom").unwrap();
        cache.clear_failed(&ws, "index.dom").unwrap();
        assert_eq!(cache.status(&ws, "index.dom"), StepStatus::Pending);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn completed_at_is_stable() {
        let (root, ws) = workspace();
        let cache = ExecutionCache::new(false);

        assert!(cache.completed_at(&ws, "index.html").is_none());
        std::fs::write(ws.artifact("index.html"), b"<html></html>").unwrap();

        let first = cache.completed_at(&ws, "index.html").unwrap();
        let second = cache.completed_at(&ws, "index.html").unwrap();
        assert_eq!(first, second);

        let _ = std::fs::remove_dir_all(&root);
    }
}
