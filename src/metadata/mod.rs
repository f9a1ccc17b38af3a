//! # Metadata
//!
//! Search, song info, playlists and charts from the metadata provider.
//! Every lookup walks the [`RegionFallbackDirectory`] in order until one
//! region answers; this path never touches the stream resolver.

pub mod region;
pub mod service;

pub use region::{RegionDescriptor, RegionFallbackDirectory};
pub use service::{MetadataService, Regional, SearchPage, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
