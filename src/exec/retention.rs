// src/exec/retention.rs

//! Age-based pruning for backup and log directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Which entries of the directory are candidates for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneTarget {
    /// Any file or directory (backup folders).
    AnyEntry,
    /// Regular files ending in `.log` or `.txt`.
    LogFiles,
}

impl PruneTarget {
    fn matches(&self, path: &Path, is_dir: bool) -> bool {
        match self {
            PruneTarget::AnyEntry => true,
            PruneTarget::LogFiles => {
                !is_dir
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("log") || e.eq_ignore_ascii_case("txt"))
            }
        }
    }
}

pub fn cutoff_for(days_to_keep: u32, now: SystemTime) -> SystemTime {
    let window = Duration::from_secs(u64::from(days_to_keep) * SECS_PER_DAY);
    // `checked_sub` happily goes below the epoch on Unix.
    now.checked_sub(window)
        .filter(|cutoff| *cutoff >= SystemTime::UNIX_EPOCH)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Delete matching entries in `dir` last modified before `now - days_to_keep`.
/// Runs on the blocking pool. Returns how many entries were removed.
pub async fn prune_older_than(dir: PathBuf, days_to_keep: u32, target: PruneTarget) -> Result<usize> {
    let cutoff = cutoff_for(days_to_keep, SystemTime::now());
    tokio::task::spawn_blocking(move || prune_before(&dir, cutoff, target))
        .await
        .context("retention worker panicked")?
}

/// A missing directory is a successful no-op. Entries that cannot be read or
/// removed are logged and skipped.
pub fn prune_before(dir: &Path, cutoff: SystemTime, target: PruneTarget) -> Result<usize> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "retention target does not exist; nothing to prune");
        return Ok(0);
    }

    let entries =
        fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?;

    let mut removed = 0;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();

        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping entry without metadata");
                continue;
            }
        };

        if !target.matches(&path, meta.is_dir()) {
            continue;
        }

        let Ok(modified) = meta.modified() else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }

        let outcome = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match outcome {
            Ok(()) => {
                debug!(path = %path.display(), "pruned");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to prune entry"),
        }
    }

    info!(dir = %dir.display(), removed, "retention pass complete");
    Ok(removed)
}
