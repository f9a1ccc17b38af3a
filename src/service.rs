//! Cache-fronted resolution service.
//!
//! Owns the one externally visible guarantee: at most one resolution
//! sequence per content id per TTL window. With single-flight enabled this
//! also holds for concurrent callers; without it, two concurrent misses for
//! the same id may both reach the resolver.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{CacheStats, ResolutionCache};
use crate::error::ResolveError;
use crate::resolver::{ContentId, ResolutionResult, Resolver};

/// Result of [`ResolutionService::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub id: ContentId,
    pub result: ResolutionResult,
    /// Served from the cache
    pub cached: bool,
    /// Remaining lifetime of the cache entry
    pub expires_in: Option<Duration>,
}

#[derive(Clone)]
pub struct ResolutionService {
    resolver: Resolver,
    cache: ResolutionCache,
    in_flight: Arc<DashMap<ContentId, Arc<Mutex<()>>>>,
    single_flight: bool,
    deadline: Option<Duration>,
}

impl ResolutionService {
    pub fn new(resolver: Resolver, cache: ResolutionCache) -> Self {
        Self {
            resolver,
            cache,
            in_flight: Arc::new(DashMap::new()),
            single_flight: true,
            deadline: None,
        }
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Outer bound on a whole resolution sequence (all strategies).
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Validates `raw`, then serves from the cache or resolves and caches.
    ///
    /// Degraded results are cached like any other so an unresolvable id is
    /// not re-resolved before its entry expires.
    pub async fn resolve(&self, raw: &str) -> Result<Resolved, ResolveError> {
        let id = ContentId::parse(raw)?;

        if let Some(hit) = self.lookup(&id) {
            return Ok(hit);
        }

        if !self.single_flight {
            return self.resolve_and_store(id).await;
        }

        let lock = self
            .in_flight
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let outcome = {
            let _guard = lock.lock().await;
            // Otro llamador pudo haber resuelto mientras esperábamos
            match self.lookup(&id) {
                Some(hit) => Ok(hit),
                None => self.resolve_and_store(id.clone()).await,
            }
        };

        self.in_flight
            .remove_if(&id, |_, current| Arc::ptr_eq(current, &lock));

        outcome
    }

    fn lookup(&self, id: &ContentId) -> Option<Resolved> {
        let result = self.cache.get(id)?;
        debug!("💾 Cache hit: {}", id);
        Some(Resolved {
            id: id.clone(),
            result,
            cached: true,
            expires_in: self.cache.remaining(id),
        })
    }

    async fn resolve_and_store(&self, id: ContentId) -> Result<Resolved, ResolveError> {
        debug!("🔍 Cache miss: {}", id);

        let result = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.resolver.extract(&id))
                .await
                .map_err(|_| ResolveError::DeadlineExceeded(deadline))?,
            None => self.resolver.extract(&id).await,
        };

        self.cache.set(id.clone(), result.clone());

        Ok(Resolved {
            id,
            result,
            cached: false,
            expires_in: Some(self.cache.ttl()),
        })
    }

    /// Drops the cached entry for `raw`; `false` if there was none.
    pub fn invalidate(&self, raw: &str) -> Result<bool, ResolveError> {
        let id = ContentId::parse(raw)?;
        let removed = self.cache.invalidate(&id);
        if removed {
            info!("🗑️ Entrada invalidada: {}", id);
        }
        Ok(removed)
    }

    pub fn cache_clear(&self) -> usize {
        let removed = self.cache.clear();
        info!("🗑️ Cache vaciado: {} entradas eliminadas", removed);
        removed
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl std::fmt::Debug for ResolutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionService")
            .field("resolver", &self.resolver)
            .field("ttl", &self.cache.ttl())
            .field("single_flight", &self.single_flight)
            .field("deadline", &self.deadline)
            .finish()
    }
}
