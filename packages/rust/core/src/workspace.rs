//! Per-link workspace directories.
//!
//! A link's workspace is `<output_root>/<sha256(link)>`. It is the persistent
//! cache for every artifact produced for that link and is never deleted here.

use std::path::{Path, PathBuf};

use tracing::debug;

use linkbak_shared::{LinkId, LinkbakError, Result};

/// File inside each workspace holding the link's final metadata record.
pub const RECORD_FILE: &str = "record.json";

/// Suffix of the failure marker written next to a step's missing output.
pub const FAILURE_SUFFIX: &str = ".log";

/// The directory owning every artifact of one link.
#[derive(Debug, Clone)]
pub struct Workspace {
    id: LinkId,
    dir: PathBuf,
}

impl Workspace {
    /// Map a link to its workspace under `output_root`. Pure; touches no files.
    pub fn resolve(output_root: &Path, link: &str) -> Self {
        let id = LinkId::of(link);
        let dir = output_root.join(id.as_str());
        Self { id, dir }
    }

    /// Create the directory if it does not exist yet.
    ///
    /// Safe to call concurrently for the same link: "already exists" is success.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| LinkbakError::io(&self.dir, e))?;
        debug!(dir = %self.dir.display(), "workspace ready");
        Ok(())
    }

    pub fn id(&self) -> &LinkId {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of an artifact inside the workspace.
    pub fn artifact(&self, output: &str) -> PathBuf {
        self.dir.join(output)
    }

    /// Path of an artifact relative to the output root (`<hash>/<output>`).
    pub fn relative(&self, output: &str) -> String {
        format!("{}/{output}", self.id)
    }

    /// Failure marker for a step output (`<output>.log`).
    pub fn failure_marker(&self, output: &str) -> PathBuf {
        self.dir.join(format!("{output}{FAILURE_SUFFIX}"))
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }
}

/// Write a file by writing a hidden sibling temp file and renaming it over
/// the target, so readers never observe a partially written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LinkbakError::validation(format!("invalid file path {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, contents).map_err(|e| LinkbakError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| LinkbakError::io(path, e))?;
    Ok(())
}
