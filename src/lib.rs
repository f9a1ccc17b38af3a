//! Stream Resolver
//!
//! Resolves content identifiers to playable audio stream URLs through an
//! ordered list of extraction strategies, memoizes results in a TTL cache
//! and exposes metadata lookups with regional fallback.

pub mod api;
pub mod cache;
pub mod config;
pub mod downloads;
pub mod error;
pub mod fallback;
pub mod metadata;
pub mod resolver;
pub mod serve;
pub mod service;
pub mod sources;
pub mod storage;

pub use api::Engine;
pub use config::Config;
pub use error::ResolveError;
