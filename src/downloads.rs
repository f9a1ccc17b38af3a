//! Resolve, fetch and persist a media file locally.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ResolveError;
use crate::resolver::ContentId;
use crate::service::ResolutionService;
use crate::storage::{FileStore, StoredFile};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Descarga de bytes desde la URL resuelta
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, ResolveError>;
}

/// Fetcher HTTP basado en reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ResolveError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, ResolveError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ResolveError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Fetch(format!("HTTP {status}")));
        }

        response
            .bytes()
            .await
            .map_err(|e| ResolveError::Fetch(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Download {
    pub file: StoredFile,
    /// The file was already on disk
    pub existing: bool,
    pub title: Option<String>,
    pub strategy_used: Option<String>,
}

#[derive(Clone)]
pub struct DownloadService {
    resolution: ResolutionService,
    fetcher: Arc<dyn MediaFetcher>,
    store: Arc<dyn FileStore>,
}

impl DownloadService {
    pub fn new(
        resolution: ResolutionService,
        fetcher: Arc<dyn MediaFetcher>,
        store: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            resolution,
            fetcher,
            store,
        }
    }

    /// Returns the stored file for `raw`, downloading it first if needed.
    ///
    /// A degraded resolution only points at the content page, so it is
    /// refused instead of saving HTML as audio.
    pub async fn download(&self, raw: &str) -> Result<Download, ResolveError> {
        let id = ContentId::parse(raw)?;

        if let Some(file) = self.store.get(&id).await? {
            info!("📂 Archivo existente para {}: {}", id, file.filename);
            return Ok(Download {
                file,
                existing: true,
                title: None,
                strategy_used: None,
            });
        }

        let resolved = self.resolution.resolve(id.as_str()).await?;
        let result = resolved.result;
        if result.degraded {
            warn!("⚠️ Sin stream directo para {}, descarga cancelada", id);
            return Err(ResolveError::Degraded { id: id.to_string() });
        }

        info!("⬇️ Descargando {} ({})", id, result.strategy_used);
        let data = self.fetcher.fetch(&result.resource_url).await?;
        if data.is_empty() {
            return Err(ResolveError::Fetch("empty response body".to_string()));
        }

        let extension = result.extension.as_deref().unwrap_or("m4a");
        let file = self.store.save(&id, extension, data).await?;

        Ok(Download {
            file,
            existing: false,
            title: Some(result.title),
            strategy_used: Some(result.strategy_used),
        })
    }

    /// Stored file for `raw` without resolving or downloading anything.
    pub async fn file_info(&self, raw: &str) -> Result<StoredFile, ResolveError> {
        let id = ContentId::parse(raw)?;
        self.store
            .get(&id)
            .await?
            .ok_or_else(|| ResolveError::NotFound {
                what: format!("local file {id}"),
            })
    }

    pub async fn list_files(&self) -> Result<Vec<StoredFile>, ResolveError> {
        Ok(self.store.list().await?)
    }

    pub async fn delete_file(&self, raw: &str) -> Result<(), ResolveError> {
        let id = ContentId::parse(raw)?;
        Ok(self.store.delete(&id).await?)
    }

    pub async fn clear_files(&self) -> Result<usize, ResolveError> {
        Ok(self.store.clear_all().await?)
    }
}
