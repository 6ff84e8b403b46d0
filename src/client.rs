//! Reqwest implementation of [`RemoteStore`] against the gallery HTTP API.
//!
//! One client serves every owner: requests are authenticated per owner
//! with basic auth using the credentials from [`Config`]. All transport
//! and status-code classification lives here so the core only ever sees
//! [`SyncError`] values.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::config::{Config, UserConfig};
use crate::error::SyncError;
use crate::remote::{RemoteCollectionRef, RemoteStore};

pub struct GalleryClient {
    http: reqwest::Client,
    base_url: String,
    credentials: HashMap<String, UserConfig>,
}

#[derive(Debug, Deserialize)]
struct ApiCollection {
    id: i64,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl GalleryClient {
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SyncError::Transient(format!("cannot build HTTP client: {e}")))?;

        let credentials = config
            .users
            .iter()
            .map(|u| (u.login.clone(), u.clone()))
            .collect();

        tracing::info!(api_url = %config.api_url, "Initialized gallery client");
        Ok(GalleryClient {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn auth_for(&self, owner: &str) -> Result<&UserConfig, SyncError> {
        self.credentials
            .get(owner)
            .ok_or_else(|| SyncError::RemoteConflict(format!("no credentials for owner {owner}")))
    }

    fn authed(&self, owner: &str, builder: RequestBuilder) -> Result<RequestBuilder, SyncError> {
        let user = self.auth_for(owner)?;
        Ok(builder.basic_auth(&user.login, Some(&user.password)))
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response, SyncError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                SyncError::Transient(format!("{what}: {e}"))
            } else {
                SyncError::RemoteConflict(format!("{what}: {e}"))
            }
        })?;
        classify_status(response.status(), what)?;
        Ok(response)
    }
}

fn classify_status(status: StatusCode, what: &str) -> Result<(), SyncError> {
    if status.is_success() {
        return Ok(());
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SyncError::Transient(format!("{what}: HTTP {status}")));
    }
    Err(SyncError::RemoteConflict(format!("{what}: HTTP {status}")))
}

#[async_trait]
impl RemoteStore for GalleryClient {
    async fn list_collections(&self, owner: &str) -> Result<Vec<RemoteCollectionRef>, SyncError> {
        let url = format!("{}/api/users/{owner}/collections", self.base_url);
        tracing::debug!(owner, %url, "listing remote collections");

        let builder = self.authed(owner, self.http.get(&url))?;
        let response = self.send(builder, "list collections").await?;

        let listed: Vec<ApiCollection> = response
            .json()
            .await
            .map_err(|e| SyncError::Transient(format!("list collections: bad body: {e}")))?;

        Ok(listed
            .into_iter()
            .map(|c| RemoteCollectionRef {
                id: c.id,
                name: c.name,
                tags: c.tags,
            })
            .collect())
    }

    async fn contains_file(
        &self,
        owner: &str,
        collection: &str,
        file_name: &str,
    ) -> Result<bool, SyncError> {
        let url = format!(
            "{}/api/users/{owner}/collections/{collection}/files/{file_name}",
            self.base_url
        );

        let builder = self.authed(owner, self.http.get(&url))?;
        let response = builder
            .send()
            .await
            .map_err(|e| SyncError::Transient(format!("file lookup: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                classify_status(status, "file lookup")?;
                Ok(true)
            }
        }
    }

    async fn create_collection(
        &self,
        owner: &str,
        name: &str,
        tags: &[String],
    ) -> Result<RemoteCollectionRef, SyncError> {
        let url = format!("{}/api/users/{owner}/collections", self.base_url);
        tracing::info!(owner, collection = name, ?tags, "creating remote collection");

        let builder = self
            .authed(owner, self.http.post(&url))?
            .json(&json!({ "name": name, "tags": tags }));
        let response = self.send(builder, "create collection").await?;

        let created: ApiCollection = response
            .json()
            .await
            .map_err(|e| SyncError::Transient(format!("create collection: bad body: {e}")))?;

        Ok(RemoteCollectionRef {
            id: created.id,
            name: created.name,
            tags: created.tags,
        })
    }

    async fn add_tags(
        &self,
        owner: &str,
        collection: &str,
        tags: &[String],
    ) -> Result<(), SyncError> {
        let url = format!(
            "{}/api/users/{owner}/collections/{collection}/tags",
            self.base_url
        );
        tracing::info!(owner, collection, ?tags, "merging tags into remote collection");

        let builder = self
            .authed(owner, self.http.patch(&url))?
            .json(&json!({ "tags": tags }));
        self.send(builder, "add tags").await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        owner: &str,
        collection: &str,
        file_name: &str,
        bytes: Vec<u8>,
        tags: &[String],
    ) -> Result<(), SyncError> {
        let url = format!(
            "{}/api/users/{owner}/collections/{collection}/files/{file_name}",
            self.base_url
        );
        tracing::info!(owner, collection, file = file_name, size = bytes.len(), "uploading file");

        let builder = self
            .authed(owner, self.http.post(&url))?
            .query(&[("tags", tags.join(","))])
            .body(bytes);
        self.send(builder, "upload file").await?;
        Ok(())
    }
}
