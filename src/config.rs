//! Process-level configuration for a sync run.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info};

/// Credentials for one owner. The password is injected from the
/// environment by [`crate::load_config`], never stored in the YAML file.
#[derive(Debug, Clone)]
pub struct UserConfig {
    pub name: String,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// Local tree to mirror. Its top-level directories are owners.
    pub root_folder: PathBuf,
    /// Receives files disposed of with the `move` strategy, mirroring
    /// their relative path.
    pub trash_folder: PathBuf,
    /// Recognised media extensions, lowercase, with leading dot.
    pub supported_formats: BTreeSet<String>,
    pub users: Vec<UserConfig>,
    /// Log what would happen without touching disk or remote.
    pub dry_run: bool,
}

impl Config {
    pub fn default_formats() -> BTreeSet<String> {
        [".png", ".jpg", ".jpeg", ".webp"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn trace_loaded(&self) {
        info!(
            api_url = %self.api_url,
            root_folder = %self.root_folder.display(),
            trash_folder = %self.trash_folder.display(),
            users = self.users.len(),
            dry_run = self.dry_run,
            "Loaded Config"
        );
        debug!(formats = ?self.supported_formats, "Supported media formats");
    }
}
