//! External tool runner and staged artifact writes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument};

use linkbak_core::StepError;
use linkbak_shared::LinkbakError;

/// Bytes of stderr kept in a failure message.
const STDERR_TAIL: usize = 2048;

/// Run `program` to completion and return its stdout.
///
/// On Unix the tool leads its own process group, and the whole group is
/// killed when `timeout` elapses (Chrome leaves renderer processes behind
/// otherwise). Elsewhere only the direct child is killed.
#[instrument(skip(args), fields(args = args.len()))]
pub(crate) async fn run_tool(
    program: &str,
    args: &[OsString],
    timeout: Duration,
) -> Result<Vec<u8>, StepError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(|source| StepError::Spawn {
        tool: program.to_string(),
        source,
    })?;
    let pid = child.id();

    // Dropping the future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|source| StepError::Spawn {
            tool: program.to_string(),
            source,
        })?,
        Err(_) => {
            kill_group(pid);
            return Err(StepError::Timeout {
                tool: program.to_string(),
                after: timeout,
            });
        }
    };

    if !output.status.success() {
        return Err(StepError::ToolFailed {
            tool: program.to_string(),
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }

    debug!(stdout = output.stdout.len(), "tool finished");
    Ok(output.stdout)
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    if let Err(errno) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        debug!(pgid, %errno, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text.len().saturating_sub(STDERR_TAIL);
    let start = (start..text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(text.len());
    text[start..].to_string()
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// Hidden sibling a tool writes to before the artifact is promoted.
///
/// Keeps the extension, since some tools pick the output format from it.
pub(crate) fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".partial-{name}"))
}

/// Move a finished staging file onto its artifact path.
pub(crate) fn promote(staging: &Path, target: &Path) -> Result<(), StepError> {
    if !staging.exists() {
        return Err(StepError::MissingArtifact(target.display().to_string()));
    }
    std::fs::rename(staging, target).map_err(|e| LinkbakError::io(target, e))?;
    Ok(())
}

/// Remove a leftover staging file after a failed run.
pub(crate) fn discard(staging: &Path) {
    let _ = std::fs::remove_file(staging);
}

/// Run a tool that writes `target` through a staging file.
pub(crate) async fn produce_with(
    program: &str,
    args: Vec<OsString>,
    staging: &Path,
    target: &Path,
    timeout: Duration,
) -> Result<(), StepError> {
    let result = match run_tool(program, &args, timeout).await {
        Ok(_) => promote(staging, target),
        Err(e) => Err(e),
    };
    if result.is_err() {
        discard(staging);
    }
    result
}
