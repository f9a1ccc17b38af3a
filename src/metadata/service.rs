use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use super::region::{RegionDescriptor, RegionFallbackDirectory};
use crate::error::{MetadataError, ResolveError};
use crate::fallback::{FallbackFailure, OrderedFallback};
use crate::resolver::ContentId;
use crate::sources::{Charts, MetadataProvider, Playlist, SearchFilter, SongInfo, SongRecord};

/// Límite máximo de resultados por búsqueda
pub const MAX_SEARCH_LIMIT: usize = 50;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// A metadata value together with the region that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Regional<T> {
    #[serde(flatten)]
    pub value: T,
    pub region_used: Option<RegionDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    pub query: String,
    pub results: Vec<SongRecord>,
    pub total_results: usize,
}

/// Metadata lookups with per-region fallback.
#[derive(Clone)]
pub struct MetadataService {
    provider: Arc<dyn MetadataProvider>,
    regions: Arc<RegionFallbackDirectory>,
}

impl MetadataService {
    pub fn new(provider: Arc<dyn MetadataProvider>, regions: RegionFallbackDirectory) -> Self {
        Self {
            provider,
            regions: Arc::new(regions),
        }
    }

    pub fn regions(&self) -> &RegionFallbackDirectory {
        &self.regions
    }

    /// Searches region by region.
    ///
    /// A region with no results counts as failed. When every region came
    /// back empty the answer is an empty page, not an error.
    pub async fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
    ) -> Result<Regional<SearchPage>, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::invalid("search query is empty"));
        }
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let context = format!("search '{query}'");

        let outcome = OrderedFallback::new(&context, self.regions.regions())
            .run(|region| self.provider.search(query, filter, limit, region))
            .await;

        match outcome {
            Ok(success) => {
                info!(
                    "✅ Búsqueda exitosa en región {}: {} resultados",
                    success.attempt,
                    success.value.len()
                );
                Ok(Regional {
                    value: SearchPage {
                        query: query.to_string(),
                        total_results: success.value.len(),
                        results: success.value,
                    },
                    region_used: Some(success.attempt.clone()),
                })
            }
            Err(FallbackFailure::Exhausted(failures))
                if failures.iter().all(|f| f.error == MetadataError::Empty) =>
            {
                info!("📭 Sin resultados en ninguna región para '{}'", query);
                Ok(Regional {
                    value: SearchPage {
                        query: query.to_string(),
                        results: Vec::new(),
                        total_results: 0,
                    },
                    region_used: None,
                })
            }
            Err(failure) => Err(Self::surface(&context, failure)),
        }
    }

    pub async fn song_info(&self, raw_id: &str) -> Result<Regional<SongInfo>, ResolveError> {
        let id = ContentId::parse(raw_id)?;
        let context = format!("song {id}");

        let outcome = OrderedFallback::new(&context, self.regions.regions())
            .run(|region| self.provider.song_info(id.as_str(), region))
            .await;

        Self::regional(&context, outcome.map(|s| (s.value, s.attempt.clone())))
    }

    pub async fn playlist(&self, raw_id: &str) -> Result<Regional<Playlist>, ResolveError> {
        let id = ContentId::parse(raw_id)?;
        let context = format!("playlist {id}");

        let outcome = OrderedFallback::new(&context, self.regions.regions())
            .run(|region| self.provider.playlist(id.as_str(), region))
            .await;

        Self::regional(&context, outcome.map(|s| (s.value, s.attempt.clone())))
    }

    pub async fn charts(&self) -> Result<Regional<Charts>, ResolveError> {
        let context = "charts";

        let outcome = OrderedFallback::new(context, self.regions.regions())
            .run(|region| self.provider.charts(region))
            .await;

        Self::regional(context, outcome.map(|s| (s.value, s.attempt.clone())))
    }

    fn regional<T>(
        context: &str,
        outcome: Result<(T, RegionDescriptor), FallbackFailure<MetadataError>>,
    ) -> Result<Regional<T>, ResolveError> {
        match outcome {
            Ok((value, region)) => Ok(Regional {
                value,
                region_used: Some(region),
            }),
            Err(failure) => Err(Self::surface(context, failure)),
        }
    }

    /// Not-found is authoritative; anything else means the provider is
    /// currently unreachable from every region.
    fn surface(context: &str, failure: FallbackFailure<MetadataError>) -> ResolveError {
        let reason = failure.summary();
        match failure {
            FallbackFailure::Aborted(failure) => {
                info!("🔎 {}: no encontrado ({})", context, failure.error);
                ResolveError::NotFound {
                    what: context.to_string(),
                }
            }
            FallbackFailure::Exhausted(_) => {
                error!("❌ {}: ninguna región disponible: {}", context, reason);
                ResolveError::TemporarilyUnavailable {
                    reason: format!("{context}: no region available ({reason})"),
                }
            }
        }
    }
}

impl std::fmt::Debug for MetadataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataService")
            .field("regions", &self.regions)
            .finish()
    }
}
