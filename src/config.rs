use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::metadata::RegionFallbackDirectory;
use crate::resolver::{Jitter, StrategyCatalog, DEFAULT_CONTENT_BASE_URL};

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    // Cache
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration, // 0 = sin limpieza periódica

    // Resolución
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub provider_timeout: Duration,
    pub resolve_deadline: Option<Duration>,
    pub single_flight: bool,
    pub strategies: Vec<String>,
    pub cookies_browser: String,
    pub ytdlp_path: String,
    pub content_base_url: String,

    // Metadata
    pub metadata_base_url: String,
    pub metadata_regions: String,
    pub metadata_timeout: Duration,

    // Descargas
    pub audio_dir: PathBuf,
    pub download_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, falling back to
    /// defaults for missing or blank values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let duration = |key: &str, default: Duration| -> Result<Duration> {
            match get(key) {
                Some(raw) => parse_duration(&raw).with_context(|| format!("invalid {key}")),
                None => Ok(default),
            }
        };

        let config = Self {
            // Cache
            cache_ttl: duration("CACHE_TTL", defaults.cache_ttl)?,
            cache_sweep_interval: duration("CACHE_SWEEP_INTERVAL", defaults.cache_sweep_interval)?,

            // Resolución
            jitter_min: duration("JITTER_MIN", defaults.jitter_min)?,
            jitter_max: duration("JITTER_MAX", defaults.jitter_max)?,
            provider_timeout: duration("PROVIDER_TIMEOUT", defaults.provider_timeout)?,
            resolve_deadline: match get("RESOLVE_DEADLINE") {
                Some(raw) => Some(parse_duration(&raw).context("invalid RESOLVE_DEADLINE")?),
                None => None,
            },
            single_flight: match get("SINGLE_FLIGHT") {
                Some(raw) => parse_bool(&raw).context("invalid SINGLE_FLIGHT")?,
                None => defaults.single_flight,
            },
            strategies: get("STRATEGIES")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.strategies),
            cookies_browser: get("COOKIES_BROWSER").unwrap_or(defaults.cookies_browser),
            ytdlp_path: get("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            content_base_url: get("CONTENT_BASE_URL").unwrap_or(defaults.content_base_url),

            // Metadata
            metadata_base_url: get("METADATA_BASE_URL").unwrap_or(defaults.metadata_base_url),
            metadata_regions: get("METADATA_REGIONS").unwrap_or(defaults.metadata_regions),
            metadata_timeout: duration("METADATA_TIMEOUT", defaults.metadata_timeout)?,

            // Descargas
            audio_dir: get("AUDIO_DIR").map(PathBuf::from).unwrap_or(defaults.audio_dir),
            download_timeout: duration("DOWNLOAD_TIMEOUT", defaults.download_timeout)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - TTL and timeouts must be greater than zero
    /// - `JITTER_MIN` must not exceed `JITTER_MAX`
    /// - Strategy names must be known and unique
    /// - Regions must parse and be unique
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl.is_zero() {
            anyhow::bail!("CACHE_TTL must be greater than 0");
        }

        if self.jitter_min > self.jitter_max {
            anyhow::bail!(
                "JITTER_MIN ({:?}) cannot exceed JITTER_MAX ({:?})",
                self.jitter_min,
                self.jitter_max
            );
        }

        if self.provider_timeout.is_zero() {
            anyhow::bail!("PROVIDER_TIMEOUT must be greater than 0");
        }

        if self.resolve_deadline.is_some_and(|d| d.is_zero()) {
            anyhow::bail!("RESOLVE_DEADLINE must be greater than 0 when set");
        }

        if self.metadata_timeout.is_zero() || self.download_timeout.is_zero() {
            anyhow::bail!("METADATA_TIMEOUT and DOWNLOAD_TIMEOUT must be greater than 0");
        }

        self.strategy_catalog().context("invalid STRATEGIES")?;
        self.region_directory().context("invalid METADATA_REGIONS")?;

        url::Url::parse(&self.metadata_base_url).context("invalid METADATA_BASE_URL")?;

        Ok(())
    }

    pub fn strategy_catalog(&self) -> Result<StrategyCatalog> {
        Ok(StrategyCatalog::from_names(&self.strategies, &self.cookies_browser)?)
    }

    pub fn region_directory(&self) -> Result<RegionFallbackDirectory> {
        Ok(RegionFallbackDirectory::parse(&self.metadata_regions)?)
    }

    pub fn jitter(&self) -> Jitter {
        Jitter::new(self.jitter_min, self.jitter_max)
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Cache: TTL {}, sweep {}\n  \
            Resolver: strategies [{}], jitter {}..{}, timeout {}, deadline {}, single-flight={}\n  \
            Extractor: {} ({})\n  \
            Metadata: {} regions [{}]\n  \
            Downloads: {}",
            humantime::format_duration(self.cache_ttl),
            humantime::format_duration(self.cache_sweep_interval),
            self.strategies.join(", "),
            humantime::format_duration(self.jitter_min),
            humantime::format_duration(self.jitter_max),
            humantime::format_duration(self.provider_timeout),
            self.resolve_deadline
                .map_or("none".to_string(), |d| humantime::format_duration(d).to_string()),
            self.single_flight,
            self.ytdlp_path,
            self.content_base_url,
            self.metadata_base_url,
            self.metadata_regions,
            self.audio_dir.display(),
        )
    }
}

/// Default configuration values.
impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300), // 5 minutos
            cache_sweep_interval: Duration::from_secs(60),

            jitter_min: Duration::from_millis(500),
            jitter_max: Duration::from_secs(2),
            provider_timeout: Duration::from_secs(30),
            resolve_deadline: None,
            single_flight: true,
            strategies: ["lightweight", "proxy_simulation", "mobile", "simple"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cookies_browser: "chrome".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            content_base_url: DEFAULT_CONTENT_BASE_URL.to_string(),

            metadata_base_url: "https://yewtu.be".to_string(),
            metadata_regions: "en-US,en-GB,fr-FR,en-CA,en-AU,pt-BR,default".to_string(),
            metadata_timeout: Duration::from_secs(10),

            audio_dir: "./audio_files".into(),
            download_timeout: Duration::from_secs(120),
        }
    }
}

/// Plain seconds (`"300"`) or humantime (`"5m"`, `"1500ms"`)
fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).with_context(|| format!("'{raw}' is not a duration"))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("'{other}' is not a boolean"),
    }
}
