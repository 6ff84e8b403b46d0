//! Top-level pipeline: resolve overlays → map the tree → reconcile against
//! remote state → execute uploads → dispose of local files and folders.
//!
//! The run is strictly sequential: one plan per owner, executed top to
//! bottom, then a deepest-first folder disposal pass. Only a configuration
//! error aborts the run; remote and filesystem trouble demotes the
//! affected item to "skipped, retry next run" and the pipeline carries on.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::dispose::{dispose_file, dispose_folder};
use crate::error::SyncError;
use crate::mapper::{map_tree, MediaFile, OwnerTree};
use crate::reconcile::{build_owner_plan, PlanStep};
use crate::remote::{with_retry, RemoteStore};

/// Outcome of one full run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub owners: Vec<OwnerReport>,
}

#[derive(Debug, Default)]
pub struct OwnerReport {
    pub owner: String,
    pub collections_created: usize,
    pub tags_merged: usize,
    pub uploaded: usize,
    pub already_present: usize,
    pub skipped: usize,
    pub failures: Vec<String>,
}

impl OwnerReport {
    fn new(owner: &str) -> Self {
        OwnerReport {
            owner: owner.to_string(),
            ..Default::default()
        }
    }
}

/// Run the whole pipeline for every owner under the configured root.
pub async fn synchronise<R: RemoteStore + ?Sized>(
    config: &Config,
    remote: &R,
) -> Result<SyncReport, SyncError> {
    info!(root = %config.root_folder.display(), dry_run = config.dry_run, "Starting sync run");

    let trees = map_tree(&config.root_folder, &config.supported_formats)?;
    let mut report = SyncReport::default();

    for tree in &trees {
        if !config.users.iter().any(|u| u.login == tree.owner) {
            warn!(owner = %tree.owner, "no credentials for owner, skipping");
            continue;
        }

        info!(
            owner = %tree.owner,
            collections = tree.collections.len(),
            "Synchronising owner"
        );
        match sync_owner(config, remote, tree).await {
            Ok(owner_report) => report.owners.push(owner_report),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(owner = %tree.owner, error = %e, "owner skipped for this run");
                let mut owner_report = OwnerReport::new(&tree.owner);
                owner_report.failures.push(e.to_string());
                report.owners.push(owner_report);
            }
        }
    }

    info!(owners = report.owners.len(), "Sync run complete");
    Ok(report)
}

async fn sync_owner<R: RemoteStore + ?Sized>(
    config: &Config,
    remote: &R,
    tree: &OwnerTree,
) -> Result<OwnerReport, SyncError> {
    let plan = build_owner_plan(tree, remote).await?;

    let mut report = OwnerReport::new(&tree.owner);
    report.skipped += plan.skipped_files.len();

    // Paths that must survive this run (failed or skipped); any folder
    // containing one of them is kept untouched.
    let mut blocked: Vec<PathBuf> = plan.skipped_files.clone();
    let mut failed_collections: HashSet<String> = HashSet::new();
    // Collections whose tag merge failed. Their files and directory stay
    // on disk so the next run rebuilds the collection and retries the
    // merge; otherwise disposal would leave the missing tags unmergeable.
    let mut unmerged_collections: HashSet<String> = HashSet::new();

    for step in &plan.steps {
        match step {
            PlanStep::EnsureCollection { owner, name, tags } => {
                if config.dry_run {
                    info!(owner = %owner, collection = %name, ?tags, "dry-run: would create collection");
                    report.collections_created += 1;
                    continue;
                }
                match with_retry("create_collection", || {
                    remote.create_collection(owner, name, tags)
                })
                .await
                {
                    Ok(created) => {
                        info!(owner = %owner, collection = %name, id = created.id, "created collection");
                        report.collections_created += 1;
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(owner = %owner, collection = %name, error = %e, "could not create collection");
                        failed_collections.insert(name.clone());
                        report.failures.push(format!("create {name}: {e}"));
                    }
                }
            }

            PlanStep::MergeTags {
                owner,
                name,
                dir,
                tags,
            } => {
                if config.dry_run {
                    info!(owner = %owner, collection = %name, ?tags, "dry-run: would merge tags");
                    report.tags_merged += 1;
                    continue;
                }
                match with_retry("add_tags", || remote.add_tags(owner, name, tags)).await {
                    Ok(()) => report.tags_merged += 1,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        // Uploads into the collection are still fine, but
                        // its files and directory must survive this run so
                        // the merge gets retried.
                        warn!(owner = %owner, collection = %name, error = %e, "could not merge tags");
                        unmerged_collections.insert(name.clone());
                        blocked.push(dir.clone());
                        report.failures.push(format!("merge tags {name}: {e}"));
                    }
                }
            }

            PlanStep::Upload {
                owner,
                collection,
                file,
                tags,
            } => {
                if failed_collections.contains(collection) {
                    report.skipped += 1;
                    blocked.push(file.path.clone());
                    continue;
                }

                if config.dry_run {
                    info!(owner = %owner, collection = %collection, file = %file.file_name, "dry-run: would upload");
                    report.uploaded += 1;
                    dispose_one(file, config, &mut report, &mut blocked);
                    continue;
                }

                let bytes = match fs::read(&file.path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(file = %file.path.display(), error = %e, "cannot read file");
                        report.skipped += 1;
                        report.failures.push(format!("read {}: {e}", file.file_name));
                        blocked.push(file.path.clone());
                        continue;
                    }
                };

                match with_retry("upload_file", || {
                    remote.upload_file(owner, collection, &file.file_name, bytes.clone(), tags)
                })
                .await
                {
                    Ok(()) => {
                        info!(owner = %owner, collection = %collection, file = %file.file_name, "uploaded");
                        report.uploaded += 1;
                        if unmerged_collections.contains(collection) {
                            blocked.push(file.path.clone());
                        } else {
                            dispose_one(file, config, &mut report, &mut blocked);
                        }
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        // Upload failed: the file stays where it is and
                        // gets another chance next run.
                        warn!(owner = %owner, collection = %collection, file = %file.file_name, error = %e, "upload failed");
                        report.skipped += 1;
                        report.failures.push(format!("upload {}: {e}", file.file_name));
                        blocked.push(file.path.clone());
                    }
                }
            }

            PlanStep::AlreadyPresent {
                collection, file, ..
            } => {
                // Verified present remotely: the upload already landed on
                // an earlier run, so disposal still applies.
                report.already_present += 1;
                if unmerged_collections.contains(collection) {
                    blocked.push(file.path.clone());
                } else {
                    dispose_one(file, config, &mut report, &mut blocked);
                }
            }
        }
    }

    // Folder pass, deepest first, after all file-level disposal.
    let mut directories = tree.directories.clone();
    directories.sort_by(|a, b| b.depth.cmp(&a.depth));

    for dir in &directories {
        let subtree_blocked = blocked.iter().any(|p| p.starts_with(&dir.path));
        if let Err(e) = dispose_folder(dir, &config.trash_folder, subtree_blocked, config.dry_run) {
            warn!(dir = %dir.path.display(), error = %e, "folder disposal failed, leaving in place");
            report.failures.push(format!("dispose {}: {e}", dir.path.display()));
        }
    }

    Ok(report)
}

/// File disposal never rolls back the upload: a failure here is logged,
/// the file is left for manual intervention and its folder is kept.
fn dispose_one(
    file: &MediaFile,
    config: &Config,
    report: &mut OwnerReport,
    blocked: &mut Vec<PathBuf>,
) {
    if let Err(e) = dispose_file(file, &config.trash_folder, config.dry_run) {
        warn!(file = %file.path.display(), error = %e, "disposal failed, leaving file in place");
        report.failures.push(format!("dispose {}: {e}", file.file_name));
        blocked.push(file.path.clone());
    }
}
