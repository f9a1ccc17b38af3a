//! # API
//!
//! Upward-facing façade for an HTTP layer. [`Engine`] wires the services
//! together from a [`Config`] and returns plain serializable responses;
//! routing and transport are left to the caller.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::ResolutionCache;
use crate::config::Config;
use crate::downloads::{Download, DownloadService, HttpFetcher, MediaFetcher};
use crate::error::ResolveError;
use crate::metadata::{MetadataService, Regional, SearchPage};
use crate::resolver::Resolver;
use crate::service::{Resolved, ResolutionService};
use crate::sources::{
    Charts, ExtractionProvider, InvidiousClient, MetadataProvider, Playlist, SearchFilter,
    SongInfo, YtDlpProvider,
};
use crate::storage::{FileStore, LocalFileStore, StoredFile};

/// Respuesta de streaming
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamResponse {
    pub id: String,
    pub audio_url: String,
    pub title: String,
    pub duration: u64,
    pub format: String,
    pub quality: String,
    pub strategy: String,
    pub degraded: bool,
    pub cached: bool,
    /// Seconds until the cache entry expires
    pub expires_in: Option<u64>,
    pub cache_duration: u64,
}

impl StreamResponse {
    fn from_resolved(resolved: Resolved, cache_duration: u64) -> Self {
        let result = resolved.result;
        Self {
            id: resolved.id.to_string(),
            audio_url: result.resource_url,
            title: result.title,
            duration: result.duration_seconds,
            format: result.format_label,
            quality: result.bitrate_label,
            strategy: result.strategy_used,
            degraded: result.degraded,
            cached: resolved.cached,
            expires_in: resolved.expires_in.map(|d| d.as_secs()),
            cache_duration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub title: String,
    pub age_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsResponse {
    pub total_entries: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: Vec<CacheEntryInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheClearResponse {
    pub deleted_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilesClearResponse {
    pub deleted_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidateResponse {
    pub id: String,
    pub removed: bool,
}

/// Cuerpo de error para la capa HTTP
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
    pub retryable: bool,
}

impl From<&ResolveError> for ErrorResponse {
    fn from(err: &ResolveError) -> Self {
        Self {
            status: err.status_code(),
            error: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    resolution: ResolutionService,
    metadata: MetadataService,
    downloads: DownloadService,
}

impl Engine {
    /// Builds every collaborator from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let extractor: Arc<dyn ExtractionProvider> =
            Arc::new(YtDlpProvider::new(config.ytdlp_path.clone()));
        let metadata_provider: Arc<dyn MetadataProvider> = Arc::new(
            InvidiousClient::new(&config.metadata_base_url, config.metadata_timeout)
                .context("failed to build metadata client")?,
        );
        let store: Arc<dyn FileStore> = Arc::new(
            LocalFileStore::new(config.audio_dir.clone())
                .await
                .context("failed to open audio directory")?,
        );
        let fetcher: Arc<dyn MediaFetcher> = Arc::new(
            HttpFetcher::new(config.download_timeout).context("failed to build download client")?,
        );

        let resolver = Resolver::new(extractor, config.strategy_catalog()?)
            .with_jitter(config.jitter())
            .with_attempt_timeout(config.provider_timeout)
            .with_content_base_url(config.content_base_url.clone());

        let resolution = ResolutionService::new(resolver, ResolutionCache::new(config.cache_ttl))
            .with_single_flight(config.single_flight)
            .with_deadline(config.resolve_deadline);

        let metadata = MetadataService::new(metadata_provider, config.region_directory()?);

        Ok(Self::new(resolution, metadata, fetcher, store))
    }

    pub fn new(
        resolution: ResolutionService,
        metadata: MetadataService,
        fetcher: Arc<dyn MediaFetcher>,
        store: Arc<dyn FileStore>,
    ) -> Self {
        let downloads = DownloadService::new(resolution.clone(), fetcher, store);
        Self {
            resolution,
            metadata,
            downloads,
        }
    }

    /// Starts the periodic cache sweep; `None` when the interval is zero.
    pub fn spawn_cache_sweeper(&self, config: &Config) -> Option<JoinHandle<()>> {
        if config.cache_sweep_interval.is_zero() {
            return None;
        }
        info!(
            "🧹 Limpieza de cache cada {}",
            humantime::format_duration(config.cache_sweep_interval)
        );
        self.resolution.cache().spawn_sweeper(config.cache_sweep_interval)
    }

    pub async fn resolve(&self, id: &str) -> Result<StreamResponse, ResolveError> {
        let resolved = self.resolution.resolve(id).await?;
        Ok(StreamResponse::from_resolved(
            resolved,
            self.resolution.cache().ttl().as_secs(),
        ))
    }

    pub fn invalidate(&self, id: &str) -> Result<InvalidateResponse, ResolveError> {
        let removed = self.resolution.invalidate(id)?;
        Ok(InvalidateResponse {
            id: id.trim().to_string(),
            removed,
        })
    }

    pub fn cache_stats(&self) -> CacheStatsResponse {
        let cache = self.resolution.cache();
        let stats = cache.stats();

        let mut entries: Vec<CacheEntryInfo> = cache
            .entries()
            .into_iter()
            .map(|(key, result, age)| CacheEntryInfo {
                key: key.to_string(),
                title: result.title,
                age_seconds: age.as_secs(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStatsResponse {
            total_entries: stats.total_entries,
            ttl_seconds: stats.ttl_seconds,
            hits: stats.hits,
            misses: stats.misses,
            hit_rate: stats.hit_rate(),
            entries,
        }
    }

    pub fn cache_clear(&self) -> CacheClearResponse {
        CacheClearResponse {
            deleted_count: self.resolution.cache_clear(),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Regional<SearchPage>, ResolveError> {
        self.metadata.search(query, filter, limit).await
    }

    pub async fn song(&self, id: &str) -> Result<Regional<SongInfo>, ResolveError> {
        self.metadata.song_info(id).await
    }

    pub async fn playlist(&self, id: &str) -> Result<Regional<Playlist>, ResolveError> {
        self.metadata.playlist(id).await
    }

    pub async fn charts(&self) -> Result<Regional<Charts>, ResolveError> {
        self.metadata.charts().await
    }

    pub async fn download(&self, id: &str) -> Result<Download, ResolveError> {
        self.downloads.download(id).await
    }

    pub async fn file_info(&self, id: &str) -> Result<StoredFile, ResolveError> {
        self.downloads.file_info(id).await
    }

    pub async fn list_files(&self) -> Result<Vec<StoredFile>, ResolveError> {
        self.downloads.list_files().await
    }

    pub async fn delete_file(&self, id: &str) -> Result<(), ResolveError> {
        self.downloads.delete_file(id).await
    }

    pub async fn clear_files(&self) -> Result<FilesClearResponse, ResolveError> {
        let deleted_count = self.downloads.clear_files().await?;
        Ok(FilesClearResponse { deleted_count })
    }
}
