//! Post-upload filesystem disposal.
//!
//! Files are disposed of one by one as their uploads succeed; folders are
//! evaluated afterwards, deepest-first, once all their files have been
//! handled. Moving to trash recreates the file's path relative to the
//! sync root under the trash root and never overwrites: collisions get a
//! numeric suffix (`a.jpg` → `a(1).jpg`).
//!
//! The folder-level rule is kept as its own decision step
//! ([`folder_outcome`]): once a folder is being moved or deleted, per-file
//! `nothing` leftovers inside it are swept along with it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::mapper::{MediaFile, ScannedDir};
use crate::overlay::DeletionStrategy;

/// What actually happened to a file or folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposed {
    Kept,
    Deleted,
    Moved(PathBuf),
}

/// Apply the effective file strategy to one uploaded file.
pub fn dispose_file(
    file: &MediaFile,
    trash_root: &Path,
    dry_run: bool,
) -> Result<Disposed, SyncError> {
    match file.deletion_strategy {
        DeletionStrategy::Nothing => Ok(Disposed::Kept),
        DeletionStrategy::Delete => {
            if dry_run {
                tracing::info!(file = %file.path.display(), "dry-run: would delete file");
                return Ok(Disposed::Kept);
            }
            fs::remove_file(&file.path).map_err(|e| SyncError::fs(&file.path, e))?;
            tracing::debug!(file = %file.path.display(), "deleted file in place");
            Ok(Disposed::Deleted)
        }
        DeletionStrategy::Move => {
            let dest = free_destination(&trash_root.join(&file.relative_path));
            if dry_run {
                tracing::info!(
                    file = %file.path.display(),
                    dest = %dest.display(),
                    "dry-run: would move file to trash"
                );
                return Ok(Disposed::Kept);
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| SyncError::fs(parent, e))?;
            }
            move_path(&file.path, &dest)?;
            tracing::debug!(
                file = %file.path.display(),
                dest = %dest.display(),
                "moved file to trash"
            );
            Ok(Disposed::Moved(dest))
        }
    }
}

/// What to do with a folder once its files have been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderAction {
    Keep,
    Delete,
    Move,
}

/// The folder-level precedence decision, separated out so it can be
/// audited and tested on its own. `subtree_blocked` is true when some
/// file below the folder failed or was skipped this run; such folders are
/// always kept so the leftovers get another chance next run.
pub fn folder_outcome(strategy: DeletionStrategy, subtree_blocked: bool) -> FolderAction {
    if subtree_blocked {
        return FolderAction::Keep;
    }
    match strategy {
        DeletionStrategy::Nothing => FolderAction::Keep,
        DeletionStrategy::Delete => FolderAction::Delete,
        DeletionStrategy::Move => FolderAction::Move,
    }
}

/// Apply the folder strategy to one scanned directory. Anything still
/// inside (setup files, files kept by a per-file `nothing`) goes with the
/// folder — folder policy takes precedence.
pub fn dispose_folder(
    dir: &ScannedDir,
    trash_root: &Path,
    subtree_blocked: bool,
    dry_run: bool,
) -> Result<Disposed, SyncError> {
    match folder_outcome(dir.folder_strategy, subtree_blocked) {
        FolderAction::Keep => Ok(Disposed::Kept),
        FolderAction::Delete => {
            if !dir.path.exists() {
                return Ok(Disposed::Kept);
            }
            if dry_run {
                tracing::info!(dir = %dir.path.display(), "dry-run: would delete folder");
                return Ok(Disposed::Kept);
            }
            fs::remove_dir_all(&dir.path).map_err(|e| SyncError::fs(&dir.path, e))?;
            tracing::debug!(dir = %dir.path.display(), "deleted folder");
            Ok(Disposed::Deleted)
        }
        FolderAction::Move => {
            if !dir.path.exists() {
                return Ok(Disposed::Kept);
            }
            let dest = free_destination(&trash_root.join(&dir.relative_path));
            if dry_run {
                tracing::info!(
                    dir = %dir.path.display(),
                    dest = %dest.display(),
                    "dry-run: would move folder to trash"
                );
                return Ok(Disposed::Kept);
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| SyncError::fs(parent, e))?;
            }
            move_path(&dir.path, &dest)?;
            tracing::debug!(
                dir = %dir.path.display(),
                dest = %dest.display(),
                "moved folder to trash"
            );
            Ok(Disposed::Moved(dest))
        }
    }
}

/// First non-existing variant of `wanted`: the path itself, then
/// `name(1).ext`, `name(2).ext`, ...
fn free_destination(wanted: &Path) -> PathBuf {
    if !wanted.exists() {
        return wanted.to_path_buf();
    }

    let stem = wanted
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = wanted
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = wanted.parent().unwrap_or_else(|| Path::new(""));

    let mut n = 1;
    loop {
        let candidate = parent.join(format!("{stem}({n}){ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Rename, falling back to copy-and-remove when the trash root lives on a
/// different filesystem.
fn move_path(src: &Path, dest: &Path) -> Result<(), SyncError> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            if src.is_dir() {
                copy_dir_recursive(src, dest).map_err(|e| SyncError::fs(src, e))?;
                fs::remove_dir_all(src).map_err(|e| SyncError::fs(src, e))?;
            } else {
                fs::copy(src, dest).map_err(|e| SyncError::fs(src, e))?;
                fs::remove_file(src).map_err(|e| SyncError::fs(src, e))?;
            }
            Ok(())
        }
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
