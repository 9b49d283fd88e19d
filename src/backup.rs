//! Config backup.
//!
//! Every run gets its own snapshot directory, `<prefix>_<YYYY-MM-DD_HH-MM-SS>`
//! under the backup root. Existing items are copied (or moved) into it under
//! their base name. A missing item is skipped; a failing item is recorded and
//! the rest are still backed up.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::fsops;
use crate::report::{Step, StepResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupMode {
    #[default]
    Copy,
    /// Relocates the originals; later steps find the live paths absent.
    Move,
}

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("static regex"));

/// What the backup left behind, threaded into placement so it knows which
/// targets were moved away and which must not be touched.
#[derive(Debug, Clone)]
pub struct BackupSnapshot {
    pub dir: PathBuf,
    pub mode: BackupMode,
    /// Paths inside `dir`, one per backed-up item.
    pub entries: Vec<PathBuf>,
    moved: HashSet<PathBuf>,
    failed: HashSet<PathBuf>,
}

impl BackupSnapshot {
    /// A snapshot for a run that backed nothing up.
    pub fn empty(dir: PathBuf, mode: BackupMode) -> Self {
        Self {
            dir,
            mode,
            entries: Vec::new(),
            moved: HashSet::new(),
            failed: HashSet::new(),
        }
    }

    /// True when `path` (or a directory containing it) was moved into the
    /// snapshot.
    pub fn was_moved(&self, path: &Path) -> bool {
        self.moved.iter().any(|m| path.starts_with(m))
    }

    /// True when `path`, a directory containing it, or anything inside it
    /// existed but could not be backed up. Such paths must not be
    /// overwritten.
    pub fn backup_failed(&self, path: &Path) -> bool {
        self.failed
            .iter()
            .any(|f| path.starts_with(f) || f.starts_with(path))
    }
}

/// Turns a user supplied prefix into something safe for a directory name.
pub fn sanitize_prefix(prefix: &str) -> String {
    let clean = UNSAFE_CHARS.replace_all(prefix.trim(), "_");
    let clean = clean.trim_matches('_');
    if clean.is_empty() {
        "backup".to_string()
    } else {
        clean.to_string()
    }
}

/// Picks a snapshot directory that does not exist yet.
pub fn snapshot_dir(root: &Path, prefix: &str, now: NaiveDateTime) -> PathBuf {
    let base = format!("{}_{}", sanitize_prefix(prefix), now.format("%Y-%m-%d_%H-%M-%S"));
    let mut candidate = root.join(&base);
    let mut n = 1;
    while fsops::exists(&candidate) {
        candidate = root.join(format!("{base}_{n}"));
        n += 1;
    }
    candidate
}

pub fn backup(
    items: &[PathBuf],
    mode: BackupMode,
    root: &Path,
    prefix: &str,
) -> (BackupSnapshot, Vec<StepResult>) {
    backup_at(items, mode, root, prefix, Local::now().naive_local())
}

pub fn backup_at(
    items: &[PathBuf],
    mode: BackupMode,
    root: &Path,
    prefix: &str,
    now: NaiveDateTime,
) -> (BackupSnapshot, Vec<StepResult>) {
    let mut snapshot = BackupSnapshot::empty(snapshot_dir(root, prefix, now), mode);
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        let result = backup_item(&mut snapshot, item);
        if result.is_failed() {
            snapshot.failed.insert(item.clone());
        }
        results.push(result);
    }
    (snapshot, results)
}

fn backup_item(snapshot: &mut BackupSnapshot, item: &Path) -> StepResult {
    let name = item.display().to_string();

    if !fsops::exists(item) {
        info!("{name} does not exist, skipping backup");
        return StepResult::skipped(Step::Backup, name, "does not exist");
    }
    if snapshot.dir.starts_with(item) {
        warn!("{name} contains the backup directory, refusing to back it up");
        return StepResult::failed(Step::Backup, name, "contains the backup directory");
    }
    let Some(base) = item.file_name() else {
        return StepResult::failed(Step::Backup, name, "path has no file name");
    };
    // created lazily so a run with nothing to back up leaves no empty snapshot
    if let Err(e) = fs::create_dir_all(&snapshot.dir) {
        warn!("Failed to create {}: {e}", snapshot.dir.display());
        return StepResult::failed(
            Step::Backup,
            name,
            format!("cannot create {}: {e}", snapshot.dir.display()),
        );
    }

    let dest = snapshot.dir.join(base);
    if fsops::exists(&dest) {
        warn!("{} is already in the snapshot", dest.display());
        return StepResult::failed(
            Step::Backup,
            name,
            format!("{} already in snapshot", base.to_string_lossy()),
        );
    }

    let copied = match snapshot.mode {
        BackupMode::Copy => fsops::copy_path(item, &dest),
        BackupMode::Move => fsops::move_path(item, &dest),
    };
    match copied {
        Ok(()) => {
            let verb = match snapshot.mode {
                BackupMode::Copy => "copied",
                BackupMode::Move => "moved",
            };
            info!("Backed up {name} ({verb}) to {}", dest.display());
            if snapshot.mode == BackupMode::Move {
                snapshot.moved.insert(item.to_path_buf());
            }
            snapshot.entries.push(dest.clone());
            StepResult::success(Step::Backup, name, format!("{verb} to {}", dest.display()))
        }
        Err(e) => {
            warn!("Failed to back up {name}: {e:#}");
            StepResult::failed(Step::Backup, name, format!("{e:#}"))
        }
    }
}
