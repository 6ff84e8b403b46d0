//! Loads the static YAML process config and injects per-owner passwords
//! from environment variables.
//!
//! This is the only place untrusted YAML for the process config is parsed
//! and mapped onto the strongly-typed [`Config`]. Secrets never live in
//! the file: each user's password comes from
//! `GALLERY_SYNC_PASSWORD__<LOGIN>` (login uppercased), so the config file
//! can be committed or shared as-is.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{error, info};

use crate::config::{Config, UserConfig};

#[derive(Debug, Deserialize)]
struct RawConfig {
    api_url: String,
    root_folder: PathBuf,
    trash_folder: PathBuf,
    #[serde(default)]
    supported_formats: Option<BTreeSet<String>>,
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    name: String,
    login: String,
}

/// Environment variable holding the password for a given login.
pub fn password_env_var(login: &str) -> String {
    format!("GALLERY_SYNC_PASSWORD__{}", login.to_uppercase())
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read config file {path_ref:?}"))?;

    let raw: RawConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config YAML {path_ref:?}"))?;

    let mut users = Vec::with_capacity(raw.users.len());
    for user in raw.users {
        let var = password_env_var(&user.login);
        let password = match env::var(&var) {
            Ok(p) => p,
            Err(e) => {
                error!(login = %user.login, env_var = %var, "Password missing in environment");
                return Err(e).with_context(|| format!("{var} must be set for user {}", user.login));
            }
        };
        users.push(UserConfig {
            name: user.name,
            login: user.login,
            password,
        });
    }

    let config = Config {
        api_url: raw.api_url,
        root_folder: raw.root_folder,
        trash_folder: raw.trash_folder,
        supported_formats: raw
            .supported_formats
            .unwrap_or_else(Config::default_formats),
        users,
        dry_run: false,
    };
    config.trace_loaded();

    Ok(config)
}
