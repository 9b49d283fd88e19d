//! Dotfile placement: copying files and folder trees from the profile into
//! the live configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::backup::BackupSnapshot;
use crate::fsops;
use crate::report::{Step, StepResult};

/// What to do when a destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteMode {
    /// Remove the destination, then copy.
    #[default]
    Replace,
    /// Leave the destination alone and report a conflict.
    SkipIfExists,
    /// Copy over the destination, keeping files the source doesn't have.
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigItem {
    pub source: PathBuf,
    pub target: PathBuf,
    pub kind: ItemKind,
}

impl ConfigItem {
    pub fn file(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self { source: source.into(), target: target.into(), kind: ItemKind::File }
    }

    pub fn directory(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self { source: source.into(), target: target.into(), kind: ItemKind::Directory }
    }
}

pub struct Placement<'a> {
    mode: OverwriteMode,
    snapshot: &'a BackupSnapshot,
}

impl<'a> Placement<'a> {
    /// Placement is built from the snapshot so it can only run after backup.
    pub fn new(mode: OverwriteMode, snapshot: &'a BackupSnapshot) -> Self {
        Self { mode, snapshot }
    }

    pub fn place_files(&self, items: &[ConfigItem]) -> Vec<StepResult> {
        items.iter().map(|item| self.place(Step::Files, item)).collect()
    }

    pub fn place_folders(&self, items: &[ConfigItem]) -> Vec<StepResult> {
        items.iter().map(|item| self.place(Step::Folders, item)).collect()
    }

    fn place(&self, step: Step, item: &ConfigItem) -> StepResult {
        let source = &item.source;

        if !fsops::exists(source) {
            warn!("Source not found: {}", source.display());
            return StepResult::skipped(
                step,
                item.target.display().to_string(),
                format!("source {} not found", source.display()),
            );
        }
        let (kind_ok, wanted) = match item.kind {
            ItemKind::File => (!source.is_dir(), "file"),
            ItemKind::Directory => (source.is_dir(), "directory"),
        };
        if !kind_ok {
            return StepResult::failed(
                step,
                item.target.display().to_string(),
                format!("{} is not a {wanted}", source.display()),
            );
        }

        // copying a file onto a directory drops it inside, like cp
        let dest = match (item.kind, source.file_name()) {
            (ItemKind::File, Some(base)) if item.target.is_dir() => item.target.join(base),
            _ => item.target.clone(),
        };
        let name = dest.display().to_string();

        if self.snapshot.backup_failed(&dest) {
            warn!("Backup of {name} failed, leaving it untouched");
            return StepResult::skipped(step, name, "backup failed, left untouched");
        }

        let present = fsops::exists(&dest);
        if present && self.snapshot.was_moved(&dest) {
            warn!("{name} was moved to {} but exists again", self.snapshot.dir.display());
        }
        let mut verb = "copied";
        if present {
            match self.mode {
                OverwriteMode::SkipIfExists => {
                    info!("{name} already exists, skipping");
                    return StepResult::skipped(step, name, "already exists at destination");
                }
                OverwriteMode::Replace => {
                    if let Err(e) = fsops::remove_path(&dest) {
                        return StepResult::failed(step, name, format!("{e:#}"));
                    }
                    verb = "replaced";
                }
                OverwriteMode::Merge => verb = "merged",
            }
        }

        match copy_into_place(source, &dest, item.kind) {
            Ok(()) => {
                info!("{} {} -> {name}", capitalize(verb), source.display());
                StepResult::success(step, name, format!("{verb} from {}", source.display()))
            }
            Err(e) => {
                warn!("Failed to place {name}: {e:#}");
                StepResult::failed(step, name, format!("{e:#}"))
            }
        }
    }
}

fn copy_into_place(source: &Path, dest: &Path, kind: ItemKind) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match kind {
        ItemKind::File => {
            // merge onto a symlink would write through it
            if fs::symlink_metadata(dest).is_ok_and(|m| m.file_type().is_symlink()) {
                fs::remove_file(dest)?;
            }
            fs::copy(source, dest)?;
            Ok(())
        }
        ItemKind::Directory => fsops::copy_tree(source, dest),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `mkdir -p` for each path.
pub fn create_folders(paths: &[PathBuf]) -> Vec<StepResult> {
    paths
        .iter()
        .map(|path| {
            let name = path.display().to_string();
            if path.is_dir() {
                return StepResult::skipped(Step::Folders, name, "already present");
            }
            match fs::create_dir_all(path) {
                Ok(()) => {
                    info!("Created {name}");
                    StepResult::success(Step::Folders, name, "created")
                }
                Err(e) => StepResult::failed(Step::Folders, name, e.to_string()),
            }
        })
        .collect()
}

/// Sets 0755 on each path that exists; absent paths are skipped.
pub fn make_executable(paths: &[PathBuf]) -> Vec<StepResult> {
    paths
        .iter()
        .map(|path| {
            let name = path.display().to_string();
            if !path.is_file() {
                info!("{name} not found, skipping");
                return StepResult::skipped(Step::Executables, name, "not present");
            }
            match fsops::set_mode(path, 0o755) {
                Ok(()) => {
                    info!("Made {name} executable");
                    StepResult::success(Step::Executables, name, "mode 755")
                }
                Err(e) => StepResult::failed(Step::Executables, name, format!("{e:#}")),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupMode, backup};
    use crate::report::Outcome;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn tree(root: &Path) -> Vec<String> {
        let mut entries: Vec<String> = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| e.unwrap().path().strip_prefix(root).unwrap().display().to_string())
            .collect();
        entries.sort();
        entries
    }

    fn no_backup(tmp: &TempDir) -> BackupSnapshot {
        BackupSnapshot::empty(tmp.path().join("unused"), BackupMode::Copy)
    }

    #[test]
    fn replace_leaves_exactly_the_source_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("dots/qtile");
        write(&src.join("config.py"), "new");
        write(&src.join("autostart.sh"), "#!/bin/sh");
        let dest = tmp.path().join(".config/qtile");
        write(&dest.join("config.py"), "old");
        write(&dest.join("stale/leftover.py"), "x");

        let snapshot = no_backup(&tmp);
        let results = Placement::new(OverwriteMode::Replace, &snapshot)
            .place_folders(&[ConfigItem::directory(&src, &dest)]);

        assert_eq!(results[0].outcome, Outcome::Success);
        assert_eq!(tree(&dest), tree(&src));
        assert_eq!(fs::read_to_string(dest.join("config.py")).unwrap(), "new");
    }

    #[test]
    fn skip_if_exists_reports_a_conflict() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("dots/dunst");
        write(&src.join("dunstrc"), "new");
        let dest = tmp.path().join(".config/dunst");
        write(&dest.join("dunstrc"), "old");

        let snapshot = no_backup(&tmp);
        let results = Placement::new(OverwriteMode::SkipIfExists, &snapshot)
            .place_folders(&[ConfigItem::directory(&src, &dest)]);

        assert_eq!(results[0].outcome, Outcome::Skipped);
        assert_eq!(results[0].detail, "already exists at destination");
        assert_eq!(fs::read_to_string(dest.join("dunstrc")).unwrap(), "old");
    }

    #[test]
    fn merge_keeps_local_extras() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("dots/picom");
        write(&src.join("picom.conf"), "new");
        let dest = tmp.path().join(".config/picom");
        write(&dest.join("picom.conf"), "old");
        write(&dest.join("local.conf"), "mine");

        let snapshot = no_backup(&tmp);
        Placement::new(OverwriteMode::Merge, &snapshot)
            .place_folders(&[ConfigItem::directory(&src, &dest)]);

        assert_eq!(fs::read_to_string(dest.join("picom.conf")).unwrap(), "new");
        assert!(dest.join("local.conf").is_file());
    }

    #[test]
    fn file_onto_directory_lands_inside_it() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("dots/scripts/.bashrc");
        write(&src, "export EDITOR=nano");
        let config_dir = tmp.path().join(".config");
        fs::create_dir_all(&config_dir).unwrap();

        let snapshot = no_backup(&tmp);
        let results = Placement::new(OverwriteMode::Replace, &snapshot)
            .place_files(&[ConfigItem::file(&src, &config_dir)]);

        assert_eq!(results[0].outcome, Outcome::Success);
        assert_eq!(
            fs::read_to_string(config_dir.join(".bashrc")).unwrap(),
            "export EDITOR=nano"
        );
    }

    #[test]
    fn missing_source_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let snapshot = no_backup(&tmp);
        let missing =
            ConfigItem::file(tmp.path().join("dots/missing"), tmp.path().join(".missing"));
        let results = Placement::new(OverwriteMode::Replace, &snapshot).place_files(&[missing]);
        assert_eq!(results[0].outcome, Outcome::Skipped);
        assert!(!tmp.path().join(".missing").exists());
    }

    #[test]
    fn target_whose_backup_failed_is_never_overwritten() {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join(".config");
        let alacritty = config.join("alacritty");
        write(&alacritty.join("alacritty.toml"), "old");
        let src = tmp.path().join("dots/alacritty");
        write(&src.join("alacritty.toml"), "new");

        // backing up the whole config dir into a root below it fails
        let (snapshot, _) =
            backup(&[config.clone()], BackupMode::Copy, &config.join("backup"), "backup");
        let results = Placement::new(OverwriteMode::Replace, &snapshot)
            .place_folders(&[ConfigItem::directory(&src, &alacritty)]);

        assert_eq!(results[0].outcome, Outcome::Skipped);
        assert_eq!(fs::read_to_string(alacritty.join("alacritty.toml")).unwrap(), "old");
    }

    #[test]
    fn folder_holding_a_failed_backup_is_left_alone() {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join(".config");
        let dunst_conf = config.join("dunst/config.py");
        let qtile_conf = config.join("qtile/config.py");
        write(&dunst_conf, "dunst");
        write(&qtile_conf, "precious");
        let src = tmp.path().join("dots/qtile");
        write(&src.join("config.py"), "new");

        // same base name twice: the qtile copy collides and is not backed up
        let (snapshot, results) = backup(
            &[dunst_conf, qtile_conf.clone()],
            BackupMode::Copy,
            &tmp.path().join("bk"),
            "backup",
        );
        assert_eq!(results[1].outcome, Outcome::Failed);

        for mode in [OverwriteMode::Replace, OverwriteMode::Merge] {
            let placed = Placement::new(mode, &snapshot)
                .place_folders(&[ConfigItem::directory(&src, config.join("qtile"))]);
            assert_eq!(placed[0].outcome, Outcome::Skipped);
        }
        assert_eq!(fs::read_to_string(&qtile_conf).unwrap(), "precious");
    }

    #[test]
    fn moved_targets_are_placed_fresh() {
        let tmp = TempDir::new().unwrap();
        let nano = tmp.path().join(".config/nano");
        write(&nano.join("nanorc"), "old");
        let src = tmp.path().join("dots/nano");
        write(&src.join("nanorc"), "new");

        let (snapshot, _) =
            backup(&[nano.clone()], BackupMode::Move, &tmp.path().join("bk"), "backup");
        assert!(!nano.exists());
        let results = Placement::new(OverwriteMode::SkipIfExists, &snapshot)
            .place_folders(&[ConfigItem::directory(&src, &nano)]);

        assert_eq!(results[0].outcome, Outcome::Success);
        assert_eq!(fs::read_to_string(nano.join("nanorc")).unwrap(), "new");
        assert_eq!(fs::read_to_string(snapshot.dir.join("nano/nanorc")).unwrap(), "old");
    }

    #[test]
    fn executables_and_folders() {
        let tmp = TempDir::new().unwrap();
        let script = tmp.path().join("autostart.sh");
        write(&script, "#!/bin/sh");
        let results = make_executable(&[script.clone(), tmp.path().join("absent.sh")]);
        assert_eq!(results[0].outcome, Outcome::Success);
        assert_eq!(results[1].outcome, Outcome::Skipped);
        let mode = fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        let pictures = tmp.path().join("Pictures/wallpapers");
        let first = create_folders(&[pictures.clone()]);
        let second = create_folders(&[pictures.clone()]);
        assert!(pictures.is_dir());
        assert_eq!(first[0].outcome, Outcome::Success);
        assert_eq!(second[0].outcome, Outcome::Skipped);
    }
}
