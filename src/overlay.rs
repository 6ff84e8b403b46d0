//! Per-directory configuration overlays and their root-to-leaf resolution.
//!
//! Each directory may carry at most one setup file (`setup.yaml` or
//! `setup.yml`). An absent file means "inherit everything". Overlays are
//! merged strictly root → leaf: scalar fields are last-write-wins, `tags`
//! only ever grow. A setup file that fails to parse aborts the run — a
//! half-applied inheritance chain is worse than no run at all.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

use crate::error::SyncError;

/// Recognised setup file names, checked in order; the first hit wins.
pub const SETUP_FILENAMES: [&str; 2] = ["setup.yaml", "setup.yml"];

/// What to do with a file or folder once its content has landed remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionStrategy {
    Move,
    Delete,
    Nothing,
}

/// Raw overlay as written in a setup file. Every field is optional;
/// unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverlay {
    pub deletion_strategy_folder: Option<DeletionStrategy>,
    pub deletion_strategy_file: Option<DeletionStrategy>,
    pub treat_as_collection: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ConfigOverlay {
    /// Read the overlay for `dir`, if any.
    ///
    /// Returns `Ok(None)` when the directory carries no setup file. Any
    /// read or parse failure is a [`SyncError::Configuration`] attributed
    /// to that directory.
    pub fn load(dir: &Path) -> Result<Option<ConfigOverlay>, SyncError> {
        for name in SETUP_FILENAMES {
            let path = dir.join(name);
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(SyncError::config(dir, format!("cannot read {name}: {e}")));
                }
            };

            let overlay: ConfigOverlay = serde_yaml::from_str(&raw)
                .map_err(|e| SyncError::config(dir, format!("cannot parse {name}: {e}")))?;

            tracing::debug!(dir = %dir.display(), setup = name, "loaded overlay");
            return Ok(Some(overlay));
        }

        Ok(None)
    }
}

/// Fully resolved policy for one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub deletion_strategy_folder: DeletionStrategy,
    pub deletion_strategy_file: DeletionStrategy,
    pub treat_as_collection: bool,
    pub tags: BTreeSet<String>,
}

impl Default for EffectivePolicy {
    fn default() -> Self {
        EffectivePolicy {
            deletion_strategy_folder: DeletionStrategy::Move,
            deletion_strategy_file: DeletionStrategy::Move,
            treat_as_collection: true,
            tags: BTreeSet::new(),
        }
    }
}

impl EffectivePolicy {
    /// Merge one overlay on top of this policy. Pure: the receiver is the
    /// ancestor policy, the result is the policy for the overlay's
    /// directory.
    pub fn apply(&self, overlay: &ConfigOverlay) -> EffectivePolicy {
        let mut next = self.clone();

        if let Some(folder) = overlay.deletion_strategy_folder {
            next.deletion_strategy_folder = folder;
        }
        if let Some(file) = overlay.deletion_strategy_file {
            next.deletion_strategy_file = file;
        }
        if let Some(treat) = overlay.treat_as_collection {
            next.treat_as_collection = treat;
        }
        next.tags.extend(overlay.tags.iter().cloned());

        next
    }

    /// Resolve the policy for a child directory: load its overlay (if any)
    /// and merge it on top of this one.
    pub fn descend(&self, dir: &Path) -> Result<EffectivePolicy, SyncError> {
        match ConfigOverlay::load(dir)? {
            Some(overlay) => Ok(self.apply(&overlay)),
            None => Ok(self.clone()),
        }
    }
}
