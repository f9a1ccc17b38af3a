use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CredentialSource, ExtractedMedia, ExtractionProvider, MediaFormatCandidate, NetworkIdentity};
use crate::error::ProviderError;

/// Extractor basado en el binario yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpProvider {
    binary: String,
}

/// Información extraída de yt-dlp (`--dump-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
    // Presentes cuando yt-dlp resuelve un único formato
    url: Option<String>,
    ext: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    url: Option<String>,
    ext: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
    format_note: Option<String>,
}

impl YtDlpProvider {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Verifica que yt-dlp esté disponible y retorna su versión
    pub async fn version(&self) -> Result<String, ProviderError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(ProviderError::Execution(format!(
                "{} --version exited with {}",
                self.binary, output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!("✅ yt-dlp disponible: {}", version);
        Ok(version)
    }

    fn build_args(url: &str, identity: &NetworkIdentity, format_hint: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "--dump-json",
            "--no-playlist",
            "--skip-download",
            "--no-warnings",
            "--quiet",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if !format_hint.is_empty() {
            args.push("--format".to_string());
            args.push(format_hint.to_string());
        }

        if let Some(user_agent) = &identity.user_agent {
            args.push("--user-agent".to_string());
            args.push(user_agent.clone());
        }

        for (name, value) in &identity.headers {
            args.push("--add-header".to_string());
            args.push(format!("{name}:{value}"));
        }

        match &identity.credentials {
            Some(CredentialSource::Browser(browser)) => {
                args.push("--cookies-from-browser".to_string());
                args.push(browser.clone());
            }
            Some(CredentialSource::CookieFile(path)) => {
                args.push("--cookies".to_string());
                args.push(path.display().to_string());
            }
            None => {}
        }

        if let Some(country) = &identity.geo_bypass_country {
            args.push("--geo-bypass-country".to_string());
            args.push(country.clone());
        }

        args.push(url.to_string());
        args
    }

    fn parse_output(stdout: &[u8]) -> Result<ExtractedMedia, ProviderError> {
        let info: YtDlpInfo = serde_json::from_slice(stdout)
            .map_err(|e| ProviderError::Parse(format!("invalid yt-dlp JSON: {e}")))?;

        let mut candidates: Vec<MediaFormatCandidate> = info
            .formats
            .into_iter()
            .filter_map(|f| {
                let resource_url = f.url?;
                Some(MediaFormatCandidate {
                    has_audio: codec_present(f.acodec.as_deref()),
                    has_video: codec_present(f.vcodec.as_deref()),
                    bitrate_kbps: f.abr,
                    extension: f.ext.unwrap_or_default(),
                    resource_url,
                    format_note: f.format_note,
                })
            })
            .collect();

        if candidates.is_empty() {
            if let Some(resource_url) = info.url {
                candidates.push(MediaFormatCandidate {
                    has_audio: codec_present(info.acodec.as_deref()),
                    has_video: codec_present(info.vcodec.as_deref()),
                    bitrate_kbps: info.abr,
                    extension: info.ext.unwrap_or_default(),
                    resource_url,
                    format_note: None,
                });
            }
        }

        Ok(ExtractedMedia {
            title: info.title,
            duration_seconds: info.duration.map_or(0, |d| d.max(0.0) as u64),
            candidates,
        })
    }

    fn spawn_error(&self, e: std::io::Error) -> ProviderError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProviderError::ToolNotFound(self.binary.clone())
        } else {
            ProviderError::Execution(format!("failed to run {}: {e}", self.binary))
        }
    }
}

impl Default for YtDlpProvider {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

/// yt-dlp reporta "none" cuando el formato no tiene esa pista
fn codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(c) if !c.is_empty() && c != "none")
}

#[async_trait]
impl ExtractionProvider for YtDlpProvider {
    async fn extract(
        &self,
        url: &str,
        identity: &NetworkIdentity,
        format_hint: &str,
    ) -> Result<ExtractedMedia, ProviderError> {
        let args = Self::build_args(url, identity, format_hint);
        debug!("📊 yt-dlp {}", args.join(" "));

        // kill_on_drop: el timeout del resolver cancela el proceso
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::classify(&stderr));
        }

        let media = Self::parse_output(&output.stdout)?;
        if media.candidates.is_empty() {
            return Err(ProviderError::NoFormats);
        }

        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "id": "dQw4w9WgXcQ",
        "title": "Never Gonna Give You Up",
        "duration": 212.0,
        "formats": [
            {"format_id": "139", "url": "https://cdn/139", "ext": "m4a", "acodec": "mp4a.40.5", "vcodec": "none", "abr": 48.7, "format_note": "low"},
            {"format_id": "140", "url": "https://cdn/140", "ext": "m4a", "acodec": "mp4a.40.2", "vcodec": "none", "abr": 129.5, "format_note": "medium"},
            {"format_id": "18", "url": "https://cdn/18", "ext": "mp4", "acodec": "mp4a.40.2", "vcodec": "avc1.42001E", "abr": null},
            {"format_id": "sb0", "ext": "mhtml", "acodec": "none", "vcodec": "none"}
        ]
    }"#;

    #[test]
    fn test_parse_formats() {
        let media = YtDlpProvider::parse_output(SAMPLE.as_bytes()).unwrap();

        assert_eq!(media.title.as_deref(), Some("Never Gonna Give You Up"));
        assert_eq!(media.duration_seconds, 212);
        // El storyboard sin URL se descarta
        assert_eq!(media.candidates.len(), 3);

        let audio_only: Vec<_> = media
            .candidates
            .iter()
            .filter(|c| c.is_audio_only())
            .map(|c| c.resource_url.as_str())
            .collect();
        assert_eq!(audio_only, vec!["https://cdn/139", "https://cdn/140"]);

        let muxed = &media.candidates[2];
        assert!(muxed.has_audio && muxed.has_video);
        assert_eq!(muxed.bitrate(), 0.0);
    }

    #[test]
    fn test_parse_single_format_response() {
        let json = r#"{"title": "t", "url": "https://cdn/x", "ext": "webm", "acodec": "opus", "vcodec": "none", "abr": 160}"#;
        let media = YtDlpProvider::parse_output(json.as_bytes()).unwrap();

        assert_eq!(media.candidates.len(), 1);
        assert!(media.candidates[0].is_audio_only());
        assert_eq!(media.candidates[0].bitrate(), 160.0);
        assert_eq!(media.duration_seconds, 0);
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = YtDlpProvider::parse_output(b"not json").unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn test_build_args_with_identity() {
        let identity = NetworkIdentity {
            user_agent: Some("UA/1.0".to_string()),
            headers: vec![("X-Forwarded-For".to_string(), "1.2.3.4".to_string())],
            credentials: Some(CredentialSource::Browser("chrome".to_string())),
            geo_bypass_country: Some("US".to_string()),
        };

        let args = YtDlpProvider::build_args("https://x/watch?v=1", &identity, "bestaudio");

        assert_eq!(args.last().map(String::as_str), Some("https://x/watch?v=1"));
        assert!(args.windows(2).any(|w| w == ["--format", "bestaudio"]));
        assert!(args.windows(2).any(|w| w == ["--user-agent", "UA/1.0"]));
        assert!(args.windows(2).any(|w| w == ["--add-header", "X-Forwarded-For:1.2.3.4"]));
        assert!(args.windows(2).any(|w| w == ["--cookies-from-browser", "chrome"]));
        assert!(args.windows(2).any(|w| w == ["--geo-bypass-country", "US"]));
    }

    #[test]
    fn test_build_args_bare_identity() {
        let args = YtDlpProvider::build_args("u", &NetworkIdentity::default(), "");
        assert!(!args.iter().any(|a| a == "--user-agent" || a == "--format"));
        assert_eq!(args.last().map(String::as_str), Some("u"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_not_found() {
        let provider = YtDlpProvider::new("definitely-not-a-real-yt-dlp-binary");
        let err = provider
            .extract("u", &NetworkIdentity::default(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ToolNotFound(_)));
    }
}
