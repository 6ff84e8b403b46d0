//! Error taxonomy for the sync pipeline.
//!
//! Only [`SyncError::Configuration`] is fatal to a run: a malformed overlay
//! means the inheritance chain below it cannot be trusted, and partially
//! applied policy could mis-tag or mis-dispose files irreversibly. Every
//! other kind degrades per item: the item is logged, left in place and
//! retried on the next run.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed per-directory configuration. Aborts the whole run.
    #[error("bad configuration in {dir}: {reason}")]
    Configuration { dir: PathBuf, reason: String },

    /// Network-level failure that is worth retrying with backoff.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The remote reported a state we cannot reconcile additively.
    #[error("remote conflict: {0}")]
    RemoteConflict(String),

    /// Local filesystem failure during scanning or disposal.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn config(dir: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SyncError::Configuration {
            dir: dir.into(),
            reason: reason.into(),
        }
    }

    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// True for errors that must abort the run instead of skipping the item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Configuration { .. })
    }
}
