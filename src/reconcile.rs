//! Compares the logical tree against remote state and builds the run plan.
//!
//! The plan is ordered: a collection's `EnsureCollection`/`MergeTags` step
//! always precedes the uploads into it. The protocol is monotonic: the
//! reconciler never proposes removing a remote collection, file or tag.
//! Re-running against unchanged local and remote state yields an empty
//! plan.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::SyncError;
use crate::mapper::{LogicalCollection, MediaFile, OwnerTree};
use crate::remote::{with_retry, RemoteCollectionRef, RemoteStore};

#[derive(Debug, Clone)]
pub enum PlanStep {
    /// The collection does not exist remotely yet.
    EnsureCollection {
        owner: String,
        name: String,
        tags: Vec<String>,
    },
    /// The collection exists but lacks some locally inherited tags.
    /// `tags` holds only the missing ones; the union happens remotely.
    MergeTags {
        owner: String,
        name: String,
        /// The local directory backing the collection. If the merge fails,
        /// the executor keeps this directory so the merge can retry.
        dir: PathBuf,
        tags: Vec<String>,
    },
    /// The file is not present remotely and must be uploaded.
    Upload {
        owner: String,
        collection: String,
        file: MediaFile,
        tags: Vec<String>,
    },
    /// The remote already reports this file. No upload happens, but the
    /// verified presence means disposal still applies (idempotent replay).
    AlreadyPresent {
        owner: String,
        collection: String,
        file: MediaFile,
    },
}

/// Ordered plan for one owner, plus the files the reconciler had to give
/// up on (presence check kept failing); those are left untouched for the
/// next run.
#[derive(Debug, Default)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub skipped_files: Vec<PathBuf>,
}

impl Plan {
    /// True when the plan would not touch the remote at all.
    /// `AlreadyPresent` bookkeeping steps do not count: they exist only so
    /// the executor can still apply local disposal.
    pub fn is_noop(&self) -> bool {
        !self.steps.iter().any(|s| {
            matches!(
                s,
                PlanStep::EnsureCollection { .. }
                    | PlanStep::MergeTags { .. }
                    | PlanStep::Upload { .. }
            )
        })
    }
}

/// Per-owner cache of remote collection listings. Written once per owner,
/// read-only afterwards; avoids redundant listing calls when several
/// collections belong to the same owner.
pub struct RemoteView<'a, R: RemoteStore + ?Sized> {
    remote: &'a R,
    cache: HashMap<String, Vec<RemoteCollectionRef>>,
}

impl<'a, R: RemoteStore + ?Sized> RemoteView<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        RemoteView {
            remote,
            cache: HashMap::new(),
        }
    }

    pub async fn collections(&mut self, owner: &str) -> Result<&[RemoteCollectionRef], SyncError> {
        if !self.cache.contains_key(owner) {
            let remote = self.remote;
            let listed = with_retry("list_collections", || remote.list_collections(owner)).await?;
            tracing::debug!(owner, count = listed.len(), "cached remote collections");
            self.cache.insert(owner.to_string(), listed);
        }
        Ok(self.cache.get(owner).expect("just inserted"))
    }
}

/// Build the plan for one owner. Fatal configuration errors propagate;
/// per-file remote hiccups demote the file to `skipped_files`.
pub async fn build_owner_plan<R: RemoteStore + ?Sized>(
    tree: &OwnerTree,
    remote: &R,
) -> Result<Plan, SyncError> {
    let mut view = RemoteView::new(remote);
    let mut plan = Plan::default();

    for collection in &tree.collections {
        reconcile_collection(collection, remote, &mut view, &mut plan).await?;
    }

    Ok(plan)
}

async fn reconcile_collection<R: RemoteStore + ?Sized>(
    collection: &LogicalCollection,
    remote: &R,
    view: &mut RemoteView<'_, R>,
    plan: &mut Plan,
) -> Result<(), SyncError> {
    let owner = collection.owner.as_str();
    let tags: Vec<String> = collection.tags.iter().cloned().collect();

    let existing = view
        .collections(owner)
        .await?
        .iter()
        .find(|r| r.name == collection.name)
        .cloned();

    match &existing {
        None => {
            plan.steps.push(PlanStep::EnsureCollection {
                owner: owner.to_string(),
                name: collection.name.clone(),
                tags: tags.clone(),
            });
        }
        Some(remote_ref) => {
            // Additive merge: only tags the remote does not know yet.
            let missing: Vec<String> = tags
                .iter()
                .filter(|t| !remote_ref.tags.iter().any(|r| r == *t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                plan.steps.push(PlanStep::MergeTags {
                    owner: owner.to_string(),
                    name: collection.name.clone(),
                    dir: collection.dir.clone(),
                    tags: missing,
                });
            }
        }
    }

    for member in &collection.members {
        // A collection that does not exist remotely cannot contain the
        // file; skip the per-file round trip.
        let present = if existing.is_none() {
            false
        } else {
            match with_retry("contains_file", || {
                remote.contains_file(owner, &collection.name, &member.file_name)
            })
            .await
            {
                Ok(present) => present,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        owner,
                        collection = %collection.name,
                        file = %member.file_name,
                        error = %e,
                        "presence check failed, leaving file for next run"
                    );
                    plan.skipped_files.push(member.path.clone());
                    continue;
                }
            }
        };

        if present {
            plan.steps.push(PlanStep::AlreadyPresent {
                owner: owner.to_string(),
                collection: collection.name.clone(),
                file: member.clone(),
            });
        } else {
            plan.steps.push(PlanStep::Upload {
                owner: owner.to_string(),
                collection: collection.name.clone(),
                file: member.clone(),
                tags: tags.clone(),
            });
        }
    }

    Ok(())
}
