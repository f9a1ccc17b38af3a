use dashmap::DashMap;
use serde::Serialize;
use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info};

/// Entrada del cache con su instante de creación
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.created_at)
    }

    /// Visible only on `[created_at, created_at + ttl)`.
    fn is_expired(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }
}

#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired_removals: AtomicU64,
}

/// Snapshot of cache state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Physical entry count, may include expired entries not yet purged
    pub total_entries: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    pub expired_removals: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// Concurrent key/value store where every entry lives for a fixed TTL.
///
/// Expired entries are logically absent: [`TtlCache::get`] drops them on
/// access, and [`TtlCache::sweep_expired`] purges them in bulk. Clones share
/// the same underlying map.
#[derive(Debug)]
pub struct TtlCache<K: Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    counters: Arc<CacheCounters>,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            ttl,
            counters: Arc::new(CacheCounters::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Devuelve el valor si existe y no ha expirado
    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.data.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            // Un `set` concurrente pudo reemplazar la entrada entre medio
            if self
                .data
                .remove_if(key, |_, entry| entry.is_expired(self.ttl))
                .is_some()
            {
                self.counters.expired_removals.fetch_add(1, Ordering::Relaxed);
                debug!("⏰ Entrada expirada removida en lectura");
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserta o reemplaza la entrada completa, reiniciando su TTL
    pub fn set(&self, key: K, value: V) -> Option<V> {
        self.data
            .insert(key, CacheEntry::new(value))
            .map(|old| old.value)
    }

    /// Tiempo de vida restante de una entrada visible
    pub fn remaining(&self, key: &K) -> Option<Duration> {
        self.data.get(key).and_then(|entry| {
            let age = entry.age();
            (age < self.ttl).then(|| self.ttl - age)
        })
    }

    pub fn invalidate(&self, key: &K) -> bool {
        self.data.remove(key).is_some()
    }

    /// Vacía el cache y retorna cuántas entradas había
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        self.data.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn sweep_expired(&self) -> usize {
        let mut removed = 0;
        self.data.retain(|_, entry| {
            let keep = !entry.is_expired(self.ttl);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            self.counters
                .expired_removals
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }

    /// Visible entries with their age.
    pub fn entries(&self) -> Vec<(K, V, Duration)> {
        self.data
            .iter()
            .filter(|entry| !entry.value().is_expired(self.ttl))
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().value.clone(),
                    entry.value().age(),
                )
            })
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.data.len(),
            ttl_seconds: self.ttl.as_secs(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired_removals: self.counters.expired_removals.load(Ordering::Relaxed),
        }
    }

    /// Lanza una tarea que purga entradas expiradas periódicamente.
    /// Con intervalo cero no se lanza nada.
    pub fn spawn_sweeper(&self, every: Duration) -> Option<JoinHandle<()>> {
        if every.is_zero() {
            return None;
        }
        let cache = self.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // El primer tick es inmediato
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let removed = cache.sweep_expired();
                if removed > 0 {
                    info!("🧹 Cache cleanup: removed {} expired entries", removed);
                }
            }
        }))
    }
}

impl<K, V> Clone for TtlCache<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            ttl: self.ttl,
            counters: self.counters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::advance;

    fn cache(ttl_secs: u64) -> TtlCache<String, String> {
        TtlCache::new(Duration::from_secs(ttl_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_visible_within_ttl_window() {
        let cache = cache(10);
        cache.set("abc".into(), "v1".into());

        assert_eq!(cache.get(&"abc".into()), Some("v1".to_string()));
        advance(Duration::from_millis(9_999)).await;
        assert_eq!(cache.get(&"abc".into()), Some("v1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_at_exact_ttl_boundary() {
        let cache = cache(10);
        cache.set("abc".into(), "v1".into());

        advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get(&"abc".into()), None);
        // La lectura removió la entrada
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expired_removals, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_restarts_ttl() {
        let cache = cache(10);
        cache.set("abc".into(), "v1".into());
        advance(Duration::from_secs(8)).await;

        let previous = cache.set("abc".into(), "v2".into());
        assert_eq!(previous, Some("v1".to_string()));

        advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&"abc".into()), Some("v2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_hits_do_not_mutate_entries() {
        let cache = cache(10);
        cache.set("abc".into(), "v1".into());
        advance(Duration::from_secs(3)).await;

        for _ in 0..5 {
            assert_eq!(cache.get(&"abc".into()), Some("v1".to_string()));
        }

        assert_eq!(cache.remaining(&"abc".into()), Some(Duration::from_secs(7)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().hits, 5);
    }

    #[tokio::test]
    async fn test_invalidate_is_noop_for_missing_key() {
        let cache = cache(10);
        assert!(!cache.invalidate(&"missing".into()));

        cache.set("abc".into(), "v1".into());
        assert!(cache.invalidate(&"abc".into()));
        assert_eq!(cache.get(&"abc".into()), None);
    }

    #[tokio::test]
    async fn test_clear_returns_prior_count() {
        let cache = cache(10);
        for i in 0..4 {
            cache.set(format!("k{i}"), "v".into());
        }

        assert_eq!(cache.clear(), 4);
        assert_eq!(cache.stats().total_entries, 0);
        assert_eq!(cache.clear(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_only_removes_expired() {
        let cache = cache(10);
        cache.set("old".into(), "v".into());
        advance(Duration::from_secs(6)).await;
        cache.set("new".into(), "v".into());
        advance(Duration::from_secs(5)).await;

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.get(&"new".into()), Some("v".to_string()));
        assert_eq!(cache.get(&"old".into()), None);
        assert_eq!(cache.sweep_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_hide_expired() {
        let cache = cache(10);
        cache.set("old".into(), "a".into());
        advance(Duration::from_secs(10)).await;
        cache.set("new".into(), "b".into());
        advance(Duration::from_secs(2)).await;

        let entries = cache.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "new");
        assert_eq!(entries[0].2, Duration::from_secs(2));
        // Aún no purgada físicamente
        assert_eq!(cache.stats().total_entries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_purges() {
        let cache = cache(5);
        cache.set("abc".into(), "v".into());
        let handle = cache.spawn_sweeper(Duration::from_secs(1)).unwrap();

        tokio::time::sleep(Duration::from_secs(7)).await;

        assert_eq!(cache.len(), 0);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_sweeper_is_not_spawned() {
        let cache = cache(5);
        cache.set("abc".into(), "v".into());

        assert!(cache.spawn_sweeper(Duration::ZERO).is_none());

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_access_keeps_all_entries() {
        let cache: TtlCache<String, usize> = TtlCache::new(Duration::from_secs(60));
        let mut handles = Vec::new();

        for task in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    let key = format!("{task}-{i}");
                    cache.set(key.clone(), i);
                    assert_eq!(cache.get(&key), Some(i));
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 400);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            total_entries: 0,
            ttl_seconds: 1,
            hits: 3,
            misses: 1,
            expired_removals: 0,
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
