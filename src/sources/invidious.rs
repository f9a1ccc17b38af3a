use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{Charts, MetadataProvider, Playlist, SearchFilter, SongInfo, SongRecord};
use crate::error::MetadataError;
use crate::metadata::RegionDescriptor;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Cliente para Invidious API (metadata sin cuenta de YouTube)
#[derive(Debug, Clone)]
pub struct InvidiousClient {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
    #[serde(default)]
    width: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvidiousVideo {
    video_id: Option<String>,
    title: Option<String>,
    author: Option<String>,
    length_seconds: Option<u64>,
    video_thumbnails: Option<Vec<Thumbnail>>,
    view_count: Option<u64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvidiousPlaylist {
    playlist_id: String,
    title: String,
    author: Option<String>,
    #[serde(default)]
    videos: Vec<InvidiousVideo>,
}

impl InvidiousVideo {
    /// Canales y playlists en resultados de búsqueda no tienen videoId
    fn into_record(self) -> Option<SongRecord> {
        let video_id = self.video_id?;
        let thumbnail = self
            .video_thumbnails
            .and_then(|thumbs| thumbs.into_iter().find(|t| t.width >= 320))
            .map(|t| t.url);

        Some(SongRecord {
            video_id,
            title: self.title.unwrap_or_else(|| "Unknown".to_string()),
            artist: self.author,
            duration_seconds: self.length_seconds,
            thumbnail,
        })
    }
}

impl InvidiousClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MetadataError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| MetadataError::Provider(format!("invalid base URL '{base_url}': {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MetadataError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, MetadataError> {
        self.base_url
            .join(path)
            .map_err(|e| MetadataError::Provider(format!("invalid endpoint '{path}': {e}")))
    }

    fn region_params(region: &RegionDescriptor) -> Vec<(&'static str, String)> {
        match region {
            RegionDescriptor::Locale { language, location } => {
                vec![("region", location.clone()), ("hl", language.clone())]
            }
            RegionDescriptor::Default => Vec::new(),
        }
    }

    fn filter_type(filter: SearchFilter) -> &'static str {
        match filter {
            SearchFilter::Songs | SearchFilter::Videos => "video",
            SearchFilter::Playlists => "playlist",
            SearchFilter::Artists => "channel",
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<T, MetadataError> {
        let url = self.endpoint(path)?;
        debug!("🌐 GET {} {:?}", url, params);

        let response = self.client.get(url).query(params).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(MetadataError::NotFound(what.to_string())),
            status if !status.is_success() => {
                return Err(MetadataError::Provider(format!("HTTP {status} for {what}")))
            }
            _ => {}
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MetadataError::Parse(format!("{what}: {e}")))
    }
}

#[async_trait]
impl MetadataProvider for InvidiousClient {
    async fn search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: usize,
        region: &RegionDescriptor,
    ) -> Result<Vec<SongRecord>, MetadataError> {
        info!("🔍 Buscando en Invidious ({}): {}", region, query);

        let mut params = vec![
            ("q", query.to_string()),
            ("type", Self::filter_type(filter).to_string()),
            ("sort_by", "relevance".to_string()),
            ("page", "1".to_string()),
        ];
        params.extend(Self::region_params(region));

        let items: Vec<InvidiousVideo> = self
            .get_json("api/v1/search", &params, &format!("search '{query}'"))
            .await?;

        let records: Vec<SongRecord> = items
            .into_iter()
            .filter_map(InvidiousVideo::into_record)
            .take(limit)
            .collect();

        if records.is_empty() {
            return Err(MetadataError::Empty);
        }
        Ok(records)
    }

    async fn song_info(
        &self,
        id: &str,
        region: &RegionDescriptor,
    ) -> Result<SongInfo, MetadataError> {
        let video: InvidiousVideo = self
            .get_json(
                &format!("api/v1/videos/{id}"),
                &Self::region_params(region),
                &format!("song {id}"),
            )
            .await?;

        let view_count = video.view_count;
        let description = video.description.clone();
        let record = video
            .into_record()
            .ok_or_else(|| MetadataError::Parse(format!("song {id}: missing videoId")))?;

        Ok(SongInfo {
            record,
            view_count,
            description,
        })
    }

    async fn playlist(
        &self,
        id: &str,
        region: &RegionDescriptor,
    ) -> Result<Playlist, MetadataError> {
        let playlist: InvidiousPlaylist = self
            .get_json(
                &format!("api/v1/playlists/{id}"),
                &Self::region_params(region),
                &format!("playlist {id}"),
            )
            .await?;

        Ok(Playlist {
            playlist_id: playlist.playlist_id,
            title: playlist.title,
            author: playlist.author,
            tracks: playlist
                .videos
                .into_iter()
                .filter_map(InvidiousVideo::into_record)
                .collect(),
        })
    }

    async fn charts(&self, region: &RegionDescriptor) -> Result<Charts, MetadataError> {
        let mut params = vec![("type", "music".to_string())];
        params.extend(Self::region_params(region));

        let items: Vec<InvidiousVideo> = self
            .get_json("api/v1/trending", &params, "charts")
            .await?;

        let tracks: Vec<SongRecord> = items
            .into_iter()
            .filter_map(InvidiousVideo::into_record)
            .collect();

        if tracks.is_empty() {
            return Err(MetadataError::Empty);
        }
        Ok(Charts { tracks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_search_items_skip_channels() {
        let json = r#"[
            {"type": "channel", "author": "Some Channel"},
            {"type": "video", "videoId": "abc123", "title": "Song", "author": "Artist",
             "lengthSeconds": 200,
             "videoThumbnails": [{"url": "https://i/small.jpg", "width": 120},
                                 {"url": "https://i/big.jpg", "width": 480}]}
        ]"#;

        let items: Vec<InvidiousVideo> = serde_json::from_str(json).unwrap();
        let records: Vec<SongRecord> = items
            .into_iter()
            .filter_map(InvidiousVideo::into_record)
            .collect();

        assert_eq!(
            records,
            vec![SongRecord {
                video_id: "abc123".to_string(),
                title: "Song".to_string(),
                artist: Some("Artist".to_string()),
                duration_seconds: Some(200),
                thumbnail: Some("https://i/big.jpg".to_string()),
            }]
        );
    }

    #[test]
    fn test_playlist_parsing() {
        let json = r#"{"playlistId": "PL1", "title": "Mix", "author": "me",
                       "videos": [{"videoId": "a", "title": "A"}, {"videoId": "b", "title": "B"}]}"#;
        let playlist: InvidiousPlaylist = serde_json::from_str(json).unwrap();
        assert_eq!(playlist.videos.len(), 2);
        assert_eq!(playlist.playlist_id, "PL1");
    }

    #[test]
    fn test_region_params() {
        let region = RegionDescriptor::locale("fr", "FR");
        assert_eq!(
            InvidiousClient::region_params(&region),
            vec![("region", "FR".to_string()), ("hl", "fr".to_string())]
        );
        assert!(InvidiousClient::region_params(&RegionDescriptor::Default).is_empty());
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = InvidiousClient::new("https://inv.example/proxy", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint("api/v1/trending").unwrap().as_str(),
            "https://inv.example/proxy/api/v1/trending"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = InvidiousClient::new("not a url", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, MetadataError::Provider(_)));
    }
}
