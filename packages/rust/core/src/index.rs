//! Global index: every link's record merged into `<output_root>/results.json`.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use linkbak_shared::{LinkbakError, Metadata, Result, fields};

use crate::pipeline::load_record;
use crate::workspace::{RECORD_FILE, write_atomic};

/// Global index file name under the output root.
pub const INDEX_FILE: &str = "results.json";

/// Lock file serialising index writers.
pub const LOCK_FILE: &str = "results.json.lock";

/// Outcome of a merge.
#[derive(Debug)]
pub struct MergeResult {
    pub path: PathBuf,
    /// Records written to the index.
    pub records: usize,
    /// Record files that could not be read.
    pub skipped: usize,
}

/// Rebuild the global index from every workspace's record.
///
/// Records are sorted by `id`, so the index is independent of the order in
/// which links finished. Unreadable records are skipped with a warning.
#[instrument(skip_all, fields(output_root = %output_root.display()))]
pub fn merge_records(output_root: &Path) -> Result<MergeResult> {
    let lock = acquire_lock(output_root)?;

    let mut records: Vec<Metadata> = Vec::new();
    let mut skipped = 0;

    let entries =
        std::fs::read_dir(output_root).map_err(|e| LinkbakError::io(output_root, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| LinkbakError::io(output_root, e))?;
        let record_path = entry.path().join(RECORD_FILE);
        if !record_path.is_file() {
            continue;
        }
        match load_record(&record_path) {
            Ok(record) if record.contains(fields::ID) => records.push(record),
            Ok(_) => {
                warn!(path = %record_path.display(), "record has no id, skipping");
                skipped += 1;
            }
            Err(e) => {
                warn!(path = %record_path.display(), error = %e, "unreadable record, skipping");
                skipped += 1;
            }
        }
    }

    records.sort_by(|a, b| {
        a.get_str(fields::ID)
            .unwrap_or_default()
            .cmp(b.get_str(fields::ID).unwrap_or_default())
    });

    let path = output_root.join(INDEX_FILE);
    let json = serde_json::to_vec_pretty(&records)
        .map_err(|e| LinkbakError::parse(format!("failed to serialize index: {e}")))?;
    write_atomic(&path, &json)?;

    lock.unlock().map_err(|e| LinkbakError::io(output_root.join(LOCK_FILE), e))?;

    info!(records = records.len(), skipped, "index written");
    Ok(MergeResult {
        path,
        records: records.len(),
        skipped,
    })
}

/// Read the global index.
pub fn load_index(output_root: &Path) -> Result<Vec<Metadata>> {
    let path = output_root.join(INDEX_FILE);
    let bytes = std::fs::read(&path).map_err(|e| LinkbakError::io(&path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| LinkbakError::parse(format!("invalid index {}: {e}", path.display())))
}

fn acquire_lock(output_root: &Path) -> Result<File> {
    let path = output_root.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|e| LinkbakError::io(&path, e))?;
    file.lock().map_err(|e| LinkbakError::io(&path, e))?;
    debug!(lock = %path.display(), "index lock acquired");
    Ok(file)
}
