//! Filesystem helpers shared by backup and placement.

use std::fs;
use std::io;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// True for anything at `path`, including dangling symlinks.
pub fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Copies a file, symlink or whole directory tree to `dest`.
pub fn copy_path(src: &Path, dest: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src)
        .with_context(|| format!("Failed to stat {}", src.display()))?;
    if meta.file_type().is_symlink() {
        copy_symlink(src, dest)
    } else if meta.is_dir() {
        copy_tree(src, dest)
    } else {
        fs::copy(src, dest)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;
        Ok(())
    }
}

/// Recursively copies `src` into `dest`, creating `dest` if needed.
/// Files already present in `dest` are overwritten, extra ones are kept.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            // a symlink at the destination would make fs::copy write through it
            if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
                fs::remove_file(&target)?;
            }
            fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }
    Ok(())
}

fn copy_symlink(src: &Path, dest: &Path) -> Result<()> {
    let link =
        fs::read_link(src).with_context(|| format!("Failed to read link {}", src.display()))?;
    if exists(dest) {
        remove_path(dest)?;
    }
    symlink(&link, dest).with_context(|| format!("Failed to create link {}", dest.display()))
}

/// Renames `src` to `dest`, falling back to copy + delete across filesystems.
pub fn move_path(src: &Path, dest: &Path) -> Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_path(src, dest)?;
            remove_path(src)
        }
        Err(e) => Err(e).with_context(|| {
            format!("Failed to move {} to {}", src.display(), dest.display())
        }),
    }
}

/// Removes a file, symlink or directory tree.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.with_context(|| format!("Failed to remove {}", path.display()))
}

pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to chmod {:o} {}", mode, path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn copy_tree_keeps_nested_files_and_links() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("qtile");
        write(&src.join("config.py"), "bar = True");
        write(&src.join("scripts/autostart.sh"), "#!/bin/sh");
        symlink("config.py", src.join("current.py")).unwrap();

        let dest = tmp.path().join("out/qtile");
        copy_tree(&src, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("config.py")).unwrap(), "bar = True");
        assert!(dest.join("scripts/autostart.sh").is_file());
        assert_eq!(fs::read_link(dest.join("current.py")).unwrap(), Path::new("config.py"));
    }

    #[test]
    fn copy_tree_overwrites_and_keeps_extras() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dest = tmp.path().join("dest");
        write(&src.join("a.conf"), "new");
        write(&dest.join("a.conf"), "old");
        write(&dest.join("local.conf"), "mine");

        copy_tree(&src, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("a.conf")).unwrap(), "new");
        assert_eq!(fs::read_to_string(dest.join("local.conf")).unwrap(), "mine");
    }

    #[test]
    fn move_and_remove() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("dunst");
        write(&src.join("dunstrc"), "x");
        let dest = tmp.path().join("backup/dunst");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();

        move_path(&src, &dest).unwrap();
        assert!(!exists(&src));
        assert!(dest.join("dunstrc").is_file());

        remove_path(&dest).unwrap();
        assert!(!exists(&dest));
    }

    #[test]
    fn exists_sees_dangling_links() {
        let tmp = TempDir::new().unwrap();
        let link = tmp.path().join("dangling");
        symlink(tmp.path().join("nowhere"), &link).unwrap();
        assert!(exists(&link));
        assert!(!link.exists());
    }

    #[test]
    fn set_mode_applies_bits() {
        let tmp = TempDir::new().unwrap();
        let script = tmp.path().join("autostart.sh");
        write(&script, "#!/bin/sh");
        set_mode(&script, 0o755).unwrap();
        let mode = fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
