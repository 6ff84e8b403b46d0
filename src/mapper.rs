//! Maps the filesystem hierarchy onto the service's collection model.
//!
//! Top-level directories under the sync root are owners (one remote account
//! each); they are never collections and never contribute tags. Below an
//! owner, every directory whose effective policy says `treat_as_collection`
//! opens a new [`LogicalCollection`]; any other directory is flattened into
//! its nearest collection ancestor, contributing only its tags. The mapper
//! also records every physical directory that contributed files, so the
//! disposal pass can later walk them bottom-up.
//!
//! Entries whose name starts with `_` and setup files are skipped. Traversal
//! is name-sorted so two runs over the same tree produce identical output.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::overlay::{DeletionStrategy, EffectivePolicy, SETUP_FILENAMES};

/// One media file attributed to a collection.
#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the sync root; mirrored under the trash root on move.
    pub relative_path: PathBuf,
    pub file_name: String,
    pub deletion_strategy: DeletionStrategy,
}

/// A named unit of upload: one remote collection with its tag set and
/// member files. Every eligible file belongs to exactly one of these.
#[derive(Debug, Clone)]
pub struct LogicalCollection {
    pub owner: String,
    pub name: String,
    /// The directory that opened this collection boundary.
    pub dir: PathBuf,
    pub tags: BTreeSet<String>,
    pub members: Vec<MediaFile>,
}

/// A physical directory that contributed at least one file, kept for the
/// folder-level disposal pass.
#[derive(Debug, Clone)]
pub struct ScannedDir {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub folder_strategy: DeletionStrategy,
    /// Distance from the sync root; disposal runs deepest-first.
    pub depth: usize,
}

/// Everything the mapper found for one owner.
#[derive(Debug, Clone)]
pub struct OwnerTree {
    pub owner: String,
    pub collections: Vec<LogicalCollection>,
    pub directories: Vec<ScannedDir>,
}

/// Walk the root and produce one [`OwnerTree`] per top-level directory.
pub fn map_tree(root: &Path, formats: &BTreeSet<String>) -> Result<Vec<OwnerTree>, SyncError> {
    let mut trees = Vec::new();

    for entry in sorted_entries(root)? {
        if !entry.is_dir() || is_skipped_name(&entry) {
            continue;
        }
        let owner = base_name(&entry);
        tracing::debug!(owner = %owner, "scanning owner directory");

        let mut scan = Scan {
            root,
            owner: &owner,
            formats,
            collections: Vec::new(),
            directories: Vec::new(),
        };

        let seed = EffectivePolicy::default();
        for child in sorted_entries(&entry)? {
            if !child.is_dir() || is_skipped_name(&child) {
                continue;
            }
            scan.visit_dir(&child, &seed, None, 2)?;
        }

        let Scan {
            collections,
            directories,
            ..
        } = scan;

        // Collections that gathered no files (even via flattened
        // descendants) produce no remote action at all.
        let collections: Vec<LogicalCollection> = collections
            .into_iter()
            .filter(|c| !c.members.is_empty())
            .collect();

        trees.push(OwnerTree {
            owner,
            collections,
            directories,
        });
    }

    Ok(trees)
}

struct Scan<'a> {
    root: &'a Path,
    owner: &'a str,
    formats: &'a BTreeSet<String>,
    collections: Vec<LogicalCollection>,
    directories: Vec<ScannedDir>,
}

impl Scan<'_> {
    /// Visit one directory, returning how many files its subtree
    /// contributed. `nearest` is the index of the closest collection
    /// ancestor, if any.
    fn visit_dir(
        &mut self,
        dir: &Path,
        parent_policy: &EffectivePolicy,
        nearest: Option<usize>,
        depth: usize,
    ) -> Result<usize, SyncError> {
        let policy = parent_policy.descend(dir)?;

        let idx = if policy.treat_as_collection {
            self.collections.push(LogicalCollection {
                owner: self.owner.to_string(),
                name: base_name(dir),
                dir: dir.to_path_buf(),
                tags: policy.tags.clone(),
                members: Vec::new(),
            });
            self.collections.len() - 1
        } else {
            match nearest {
                Some(idx) => {
                    // A flattened directory's name is discarded but its
                    // tags widen the ancestor collection.
                    self.collections[idx].tags.extend(policy.tags.iter().cloned());
                    idx
                }
                None => {
                    return Err(SyncError::config(
                        dir,
                        "treat_as_collection: false directly under an owner; \
                         there is no collection ancestor to fold into",
                    ));
                }
            }
        };

        let mut contributed = 0;
        let mut subdirs = Vec::new();

        for entry in sorted_entries(dir)? {
            if is_skipped_name(&entry) {
                continue;
            }
            if entry.is_dir() {
                subdirs.push(entry);
            } else if entry.is_file() && self.is_media(&entry) {
                let relative_path = entry
                    .strip_prefix(self.root)
                    .map_err(|_| SyncError::config(&entry, "file escapes the sync root"))?
                    .to_path_buf();
                self.collections[idx].members.push(MediaFile {
                    path: entry.clone(),
                    relative_path,
                    file_name: base_name(&entry),
                    deletion_strategy: policy.deletion_strategy_file,
                });
                contributed += 1;
            }
        }

        for sub in subdirs {
            contributed += self.visit_dir(&sub, &policy, Some(idx), depth + 1)?;
        }

        // Directories with no files anywhere below them get no disposal
        // action either.
        if contributed > 0 {
            let relative_path = dir
                .strip_prefix(self.root)
                .map_err(|_| SyncError::config(dir, "directory escapes the sync root"))?
                .to_path_buf();
            self.directories.push(ScannedDir {
                path: dir.to_path_buf(),
                relative_path,
                folder_strategy: policy.deletion_strategy_folder,
                depth,
            });
        }

        Ok(contributed)
    }

    fn is_media(&self, path: &Path) -> bool {
        if SETUP_FILENAMES.iter().any(|s| base_name(path) == *s) {
            return false;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.formats.contains(&format!(".{}", ext.to_lowercase())),
            None => false,
        }
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_skipped_name(path: &Path) -> bool {
    base_name(path).starts_with('_')
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut entries = Vec::new();
    let read = fs::read_dir(dir).map_err(|e| SyncError::fs(dir, e))?;
    for entry in read {
        let entry = entry.map_err(|e| SyncError::fs(dir, e))?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}
