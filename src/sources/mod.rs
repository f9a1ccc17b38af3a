//! # Sources
//!
//! Contracts for the external collaborators the engine talks to, plus the
//! concrete clients used in production:
//!
//! - [`ExtractionProvider`]: turns a content page URL into a set of media
//!   format candidates. Implemented by [`YtDlpProvider`].
//! - [`MetadataProvider`]: search, song info, playlists and charts, with a
//!   region hint. Implemented by [`InvidiousClient`].

pub mod invidious;
pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{MetadataError, ProviderError};
use crate::metadata::RegionDescriptor;

pub use invidious::InvidiousClient;
pub use ytdlp::YtDlpProvider;

/// One alternative returned by a single provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFormatCandidate {
    pub has_audio: bool,
    pub has_video: bool,
    /// Audio bitrate in kbps, when the provider reports one
    pub bitrate_kbps: Option<f64>,
    pub extension: String,
    pub resource_url: String,
    /// Provider label such as "medium" or "tiny"
    pub format_note: Option<String>,
}

impl MediaFormatCandidate {
    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }

    /// Bitrate used for ordering; absent, zero or bogus values count as 0.
    pub fn bitrate(&self) -> f64 {
        self.bitrate_kbps
            .filter(|b| b.is_finite() && *b > 0.0)
            .unwrap_or(0.0)
    }

    pub fn has_url(&self) -> bool {
        !self.resource_url.trim().is_empty()
    }
}

/// Result of a successful provider call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedMedia {
    pub title: Option<String>,
    pub duration_seconds: u64,
    pub candidates: Vec<MediaFormatCandidate>,
}

/// Where the extractor should take session cookies from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Cookies read from a local browser profile ("chrome", "firefox", ...)
    Browser(String),
    /// Netscape cookies.txt file
    CookieFile(PathBuf),
}

/// Concrete request identity for a single extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkIdentity {
    pub user_agent: Option<String>,
    pub headers: Vec<(String, String)>,
    pub credentials: Option<CredentialSource>,
    pub geo_bypass_country: Option<String>,
}

impl NetworkIdentity {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Trait común para los extractores de medios
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Extracts the available formats for `url` using the given identity.
    ///
    /// `format_hint` is the extractor-level format expression for the
    /// attempt (e.g. `bestaudio[ext=m4a]/bestaudio/best`).
    async fn extract(
        &self,
        url: &str,
        identity: &NetworkIdentity,
        format_hint: &str,
    ) -> Result<ExtractedMedia, ProviderError>;
}

/// Kind of results a metadata search should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFilter {
    #[default]
    Songs,
    Videos,
    Playlists,
    Artists,
}

impl std::str::FromStr for SearchFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "songs" | "song" => Ok(Self::Songs),
            "videos" | "video" => Ok(Self::Videos),
            "playlists" | "playlist" => Ok(Self::Playlists),
            "artists" | "artist" => Ok(Self::Artists),
            other => Err(format!("unknown search filter '{other}'")),
        }
    }
}

/// Song/video entry as listed by search, playlists and charts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    pub video_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub duration_seconds: Option<u64>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongInfo {
    #[serde(flatten)]
    pub record: SongRecord,
    pub view_count: Option<u64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub playlist_id: String,
    pub title: String,
    pub author: Option<String>,
    pub tracks: Vec<SongRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charts {
    pub tracks: Vec<SongRecord>,
}

/// Proveedor de metadata (búsqueda, canciones, playlists, charts)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
        region: &RegionDescriptor,
    ) -> Result<Vec<SongRecord>, MetadataError>;

    async fn song_info(&self, id: &str, region: &RegionDescriptor)
        -> Result<SongInfo, MetadataError>;

    async fn playlist(&self, id: &str, region: &RegionDescriptor)
        -> Result<Playlist, MetadataError>;

    async fn charts(&self, region: &RegionDescriptor) -> Result<Charts, MetadataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(bitrate: Option<f64>) -> MediaFormatCandidate {
        MediaFormatCandidate {
            has_audio: true,
            has_video: false,
            bitrate_kbps: bitrate,
            extension: "m4a".to_string(),
            resource_url: "https://cdn.example/a".to_string(),
            format_note: None,
        }
    }

    #[test]
    fn test_bitrate_normalization() {
        assert_eq!(candidate(None).bitrate(), 0.0);
        assert_eq!(candidate(Some(0.0)).bitrate(), 0.0);
        assert_eq!(candidate(Some(f64::NAN)).bitrate(), 0.0);
        assert_eq!(candidate(Some(129.5)).bitrate(), 129.5);
    }

    #[test]
    fn test_identity_header_lookup_is_case_insensitive() {
        let identity = NetworkIdentity {
            headers: vec![("Accept-Language".to_string(), "en-US".to_string())],
            ..Default::default()
        };
        assert_eq!(identity.header("accept-language"), Some("en-US"));
        assert_eq!(identity.header("X-Forwarded-For"), None);
    }

    #[test]
    fn test_search_filter_parsing() {
        assert_eq!("Songs".parse::<SearchFilter>(), Ok(SearchFilter::Songs));
        assert_eq!("playlist".parse::<SearchFilter>(), Ok(SearchFilter::Playlists));
        assert!("albums".parse::<SearchFilter>().is_err());
    }
}
