//! # Cache Module
//!
//! Time-bounded memoization of resolution results.
//!
//! Entries live for a fixed TTL from the moment they are written. Reads
//! never return an expired entry and evict it on the spot; a background
//! sweeper (see [`TtlCache::spawn_sweeper`]) purges whatever nobody reads.
//!
//! ## Configuration
//!
//! ```env
//! CACHE_TTL=300            # seconds or humantime ("5m")
//! CACHE_SWEEP_INTERVAL=60  # 0 disables the sweeper
//! ```

pub mod ttl_cache;

pub use ttl_cache::{CacheStats, TtlCache};

use crate::resolver::{ContentId, ResolutionResult};

/// Cache de resoluciones indexado por identificador de contenido
pub type ResolutionCache = TtlCache<ContentId, ResolutionResult>;
