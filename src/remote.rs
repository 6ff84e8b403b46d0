//! Interface to the remote gallery service.
//!
//! The core never talks HTTP directly: it goes through [`RemoteStore`],
//! which real clients (see [`crate::client`]) and test mocks implement.
//! The protocol is strictly additive: the trait offers no way to delete
//! or strip anything remotely.
//!
//! The trait is annotated for `mockall`, so tests can generate
//! deterministic mocks (`MockRemoteStore`).

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;

use crate::error::SyncError;

/// A collection already present remotely. Read-only from the core's
/// perspective; used for existence and tag-diff checks.
#[derive(Debug, Clone)]
pub struct RemoteCollectionRef {
    pub id: i64,
    pub name: String,
    pub tags: Vec<String>,
}

/// Operations the sync core needs from the remote service. All calls are
/// blocking network operations from the pipeline's point of view; retry
/// policy is applied by the caller via [`with_retry`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List all collections the given owner has, with their tag sets.
    async fn list_collections(&self, owner: &str) -> Result<Vec<RemoteCollectionRef>, SyncError>;

    /// Whether a file with this name is already registered under the
    /// given collection.
    async fn contains_file(
        &self,
        owner: &str,
        collection: &str,
        file_name: &str,
    ) -> Result<bool, SyncError>;

    /// Create a collection with an initial tag set.
    async fn create_collection(
        &self,
        owner: &str,
        name: &str,
        tags: &[String],
    ) -> Result<RemoteCollectionRef, SyncError>;

    /// Add tags to an existing collection. Additive only; the service
    /// keeps whatever tags it already has.
    async fn add_tags(&self, owner: &str, collection: &str, tags: &[String])
        -> Result<(), SyncError>;

    /// Upload a file's bytes plus tags into a collection.
    async fn upload_file(
        &self,
        owner: &str,
        collection: &str,
        file_name: &str,
        bytes: Vec<u8>,
        tags: &[String],
    ) -> Result<(), SyncError>;
}

/// Maximum attempts per remote call, counting the first one.
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay of the exponential backoff: 500ms, 1s, 2s, ...
pub const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Run a remote operation, retrying transient failures with exponential
/// backoff. Non-transient errors are returned immediately.
pub async fn with_retry<T, F, Fut>(label: &str, mut op: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(SyncError::Transient(reason)) if attempt < MAX_ATTEMPTS => {
                let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
                tracing::warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "transient remote failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
