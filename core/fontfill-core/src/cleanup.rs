//! Age-based cleanup of converted fonts (made by FontLab https://www.fontlab.com/)

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Kind, Result};

/// How often the server sweeps the converted directory.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Remove regular files in `dir` last modified more than `max_age` before `now`.
///
/// Subdirectories are left alone. Per-file failures are logged and counted;
/// only an unreadable `dir` is an error. A missing `dir` means nothing to do.
pub fn sweep_expired(dir: &Path, max_age: Duration, now: SystemTime) -> Result<SweepReport> {
    tracing::info!(dir = %dir.display(), "starting cleanup of old files");
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(err) => {
            let failed = Error::new(Kind::Validation, "read_dir")
                .with_path(dir)
                .with_cause(err);
            tracing::error!(error = %failed, "cleanup failed");
            return Err(failed);
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "failed to read entry");
                report.failed += 1;
                continue;
            }
        };
        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to get file info");
                report.failed += 1;
                continue;
            }
        };
        report.scanned += 1;

        // Files from the future count as fresh.
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "removed old file");
                report.removed += 1;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove old file");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        scanned = report.scanned,
        removed = report.removed,
        "cleanup finished"
    );
    Ok(report)
}
