use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::domain::UtcDateTime;
use crate::error_sink::FailureEntry;
use crate::CoreError;

pub const DEFAULT_DIAGNOSTICS_FILE: &str = "fetch_errors.log";

pub fn default_diagnostics_path() -> PathBuf {
    PathBuf::from(DEFAULT_DIAGNOSTICS_FILE)
}

/// Renders the diagnostics file: a header line, then `key: reason` per entry.
pub fn render_diagnostics(run_id: Uuid, at: UtcDateTime, entries: &[FailureEntry]) -> String {
    let mut out = format!(
        "--- fetch errors {} run {run_id} ---\n",
        at.format_log_stamp()
    );
    for entry in entries {
        // Reasons are single-line in the file.
        let reason = entry.reason.replace(['\r', '\n'], " ");
        out.push_str(&format!("{}: {reason}\n", entry.key));
    }
    out
}

/// Overwrites `path` with this run's failures. Written even when there are
/// none, so the file always reflects the latest run.
pub fn write_diagnostics(
    path: &Path,
    run_id: Uuid,
    at: UtcDateTime,
    entries: &[FailureEntry],
) -> Result<(), CoreError> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(render_diagnostics(run_id, at, entries).as_bytes())?;
    file.flush()?;

    tracing::info!(path = %path.display(), entries = entries.len(), "diagnostics written");
    Ok(())
}
