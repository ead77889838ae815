//! Permission catalog sources and the caching loader.

use super::types::{CatalogResponse, PermissionCatalog, PermissionType};
use crate::matching::OperationKey;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("catalog request timed out after {0:?}")]
    Timeout(Duration),
    #[error("catalog source answered {0}")]
    Status(u16),
    #[error("failed to decode catalog: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to read catalog file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CatalogError {
    /// Whether a second attempt could succeed.
    fn is_transient(&self) -> bool {
        match self {
            CatalogError::Transport(_) | CatalogError::Timeout(_) => true,
            CatalogError::Status(status) => *status >= 500 || *status == 429,
            CatalogError::Decode(_) | CatalogError::Io { .. } => false,
        }
    }
}

/// One operation to look up. Only `method` and `url` go on the wire; the
/// surface and key tie the answer back to this request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRequest {
    pub method: String,
    pub url: String,
    #[serde(skip)]
    pub api_surface: String,
    #[serde(skip)]
    pub operation: OperationKey,
}

impl CatalogRequest {
    pub fn new(api_surface: &str, key: &OperationKey) -> Self {
        Self {
            method: key.method.clone(),
            url: format!("{api_surface}{}", key.path),
            api_surface: api_surface.to_string(),
            operation: key.clone(),
        }
    }
}

/// Where ranked scopes come from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch(
        &self,
        permission_type: PermissionType,
        requests: &[CatalogRequest],
    ) -> Result<CatalogResponse, CatalogError>;
}

/// Remote lookup: `POST <endpoint>?scopeType=<type>` with a JSON array of requests.
pub struct HttpCatalogSource {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpCatalogSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CatalogError::Transport)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    async fn fetch_once(
        &self,
        permission_type: PermissionType,
        requests: &[CatalogRequest],
    ) -> Result<CatalogResponse, CatalogError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("scopeType", permission_type.as_str())])
            .json(requests)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice(&bytes).map_err(CatalogError::Decode)
    }

    fn classify(&self, e: reqwest::Error) -> CatalogError {
        if e.is_timeout() {
            CatalogError::Timeout(self.timeout)
        } else {
            CatalogError::Transport(e)
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    fn describe(&self) -> String {
        self.endpoint.clone()
    }

    /// Transient failures are retried once.
    async fn fetch(
        &self,
        permission_type: PermissionType,
        requests: &[CatalogRequest],
    ) -> Result<CatalogResponse, CatalogError> {
        match self.fetch_once(permission_type, requests).await {
            Err(e) if e.is_transient() => {
                warn!(endpoint = %self.endpoint, "{e}; retrying once");
                self.fetch_once(permission_type, requests).await
            }
            other => other,
        }
    }
}

/// Catalog read from a JSON file with the same shape as the remote response.
/// The file serves both permission types.
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(
        &self,
        _permission_type: PermissionType,
        _requests: &[CatalogRequest],
    ) -> Result<CatalogResponse, CatalogError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| CatalogError::Io {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(CatalogError::Decode)
    }
}

/// Caches ranked scopes across analysis runs.
///
/// The cache is replaced by pointer swap, so readers keep a consistent
/// snapshot while a fetch is merging new entries.
pub struct PermissionCatalogLoader {
    source: Arc<dyn CatalogSource>,
    cache: RwLock<Arc<PermissionCatalog>>,
}

impl PermissionCatalogLoader {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(Arc::new(PermissionCatalog::new())),
        }
    }

    pub fn cached(&self) -> Arc<PermissionCatalog> {
        Arc::clone(&self.cache.read())
    }

    /// Make sure every requested operation has been looked up, fetching only
    /// the ones not cached yet for their API surface.
    ///
    /// Catalog answers name operations by method and path only, so each
    /// surface is fetched on its own and its results are filed under it. On
    /// any failure the cache is left untouched.
    pub async fn ensure(
        &self,
        permission_type: PermissionType,
        requests: &[CatalogRequest],
    ) -> Result<Arc<PermissionCatalog>, CatalogError> {
        let cached = self.cached();
        let mut missing: BTreeMap<&str, Vec<CatalogRequest>> = BTreeMap::new();
        for request in requests {
            if !cached.contains(&request.api_surface, permission_type, &request.operation) {
                missing
                    .entry(request.api_surface.as_str())
                    .or_default()
                    .push(request.clone());
            }
        }
        if missing.is_empty() {
            return Ok(cached);
        }

        let mut fetched = PermissionCatalog::new();
        for (api_surface, batch) in &missing {
            debug!(
                source = %self.source.describe(),
                api = %api_surface,
                permission_type = %permission_type,
                operations = batch.len(),
                "Fetching permission catalog"
            );
            let response = self.source.fetch(permission_type, batch).await?;
            for error in &response.errors {
                debug!(url = %error.url, "Catalog has no entry: {}", error.message);
            }
            let answered = PermissionCatalog::from_response(api_surface, permission_type, &response);
            info!(
                api = %api_surface,
                permission_type = %permission_type,
                entries = answered.len(),
                "Loaded permission catalog entries"
            );
            fetched.merge(answered);
        }

        let mut cache = self.cache.write();
        let mut merged = PermissionCatalog::clone(&cache);
        merged.merge(fetched);
        let merged = Arc::new(merged);
        *cache = Arc::clone(&merged);
        Ok(merged)
    }
}
