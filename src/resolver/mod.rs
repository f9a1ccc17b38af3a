//! # Resolver
//!
//! Turns a content identifier into a playable media URL by walking the
//! strategy catalog in order. Each attempt waits a random jitter, renders a
//! fresh network identity, calls the extraction provider under a timeout and
//! picks a format according to the strategy's preference.
//!
//! When every strategy fails the resolver does not error: it returns a
//! degraded result pointing at the content page itself.

pub mod format;
pub mod jitter;
pub mod strategy;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

use crate::error::{ProviderError, ResolveError};
use crate::fallback::OrderedFallback;
use crate::sources::{ExtractedMedia, ExtractionProvider};

pub use format::{FormatSelector, Selection, SelectionRule};
pub use jitter::Jitter;
pub use strategy::{FormatPreference, LocaleHeaders, StrategyCatalog, StrategyDescriptor, UserAgentPolicy};

pub const DEFAULT_CONTENT_BASE_URL: &str = "https://www.youtube.com/watch?v=";

/// Etiqueta de estrategia para resultados degradados
pub const FALLBACK_STRATEGY: &str = "fallback";

static CONTENT_ID_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").ok());

/// Validated, opaque content identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Trims surrounding whitespace and checks the allowed alphabet.
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::invalid("identifier is empty"));
        }

        let valid = CONTENT_ID_RE
            .as_ref()
            .is_some_and(|re| re.is_match(trimmed));
        if !valid {
            return Err(ResolveError::invalid(format!(
                "'{trimmed}' must be 1-64 characters of [A-Za-z0-9_-]"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ContentId {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Outcome of resolving one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub resource_url: String,
    pub title: String,
    pub duration_seconds: u64,
    /// `"<n>kbps"`, `"unknown"`, or `"direct"` for degraded results
    pub bitrate_label: String,
    pub format_label: String,
    pub strategy_used: String,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl ResolutionResult {
    /// Content-page result used when no strategy produced a stream.
    pub fn degraded(page_url: impl Into<String>) -> Self {
        Self {
            resource_url: page_url.into(),
            title: "Unknown title".to_string(),
            duration_seconds: 0,
            bitrate_label: "direct".to_string(),
            format_label: "page_fallback".to_string(),
            strategy_used: FALLBACK_STRATEGY.to_string(),
            degraded: true,
            extension: None,
        }
    }

    fn from_selection(media: &ExtractedMedia, selection: &Selection<'_>, strategy: &str) -> Self {
        let title = media
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("Unknown title")
            .to_string();
        let extension = Some(selection.candidate.extension.clone()).filter(|e| !e.is_empty());

        Self {
            resource_url: selection.candidate.resource_url.clone(),
            title,
            duration_seconds: media.duration_seconds,
            bitrate_label: selection.bitrate_label(),
            format_label: selection.format_label(),
            strategy_used: strategy.to_string(),
            degraded: false,
            extension,
        }
    }
}

/// Multi-strategy stream resolver.
#[derive(Clone)]
pub struct Resolver {
    provider: Arc<dyn ExtractionProvider>,
    catalog: Arc<StrategyCatalog>,
    jitter: Jitter,
    attempt_timeout: Duration,
    content_base_url: String,
}

impl Resolver {
    pub fn new(provider: Arc<dyn ExtractionProvider>, catalog: StrategyCatalog) -> Self {
        Self {
            provider,
            catalog: Arc::new(catalog),
            jitter: Jitter::default(),
            attempt_timeout: Duration::from_secs(30),
            content_base_url: DEFAULT_CONTENT_BASE_URL.to_string(),
        }
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_content_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.content_base_url = base_url.into();
        self
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.catalog
    }

    /// Content page for `id`; also the degraded result URL.
    pub fn canonical_url(&self, id: &ContentId) -> String {
        format!("{}{}", self.content_base_url, id)
    }

    /// Resolves `id`, trying strategies in catalog order.
    ///
    /// Never fails: exhaustion yields [`ResolutionResult::degraded`].
    pub async fn extract(&self, id: &ContentId) -> ResolutionResult {
        let url = self.canonical_url(id);
        let url = url.as_str();
        let context = format!("resolve {id}");

        info!("🎵 Resolviendo {} con {} estrategias", id, self.catalog.len());

        let outcome = OrderedFallback::new(&context, self.catalog.strategies())
            .run(move |strategy| self.attempt(strategy, url))
            .await;

        match outcome {
            Ok(success) => success.value,
            Err(failure) => {
                warn!(
                    "⚠️ Todas las estrategias fallaron para {}, usando fallback: {}",
                    id,
                    failure.summary()
                );
                ResolutionResult::degraded(url)
            }
        }
    }

    async fn attempt(
        &self,
        strategy: &StrategyDescriptor,
        url: &str,
    ) -> Result<ResolutionResult, ProviderError> {
        self.jitter.pause().await;

        let identity = strategy.render_identity(&mut rand::thread_rng());

        let media = tokio::time::timeout(
            self.attempt_timeout,
            self.provider.extract(url, &identity, strategy.format_hint()),
        )
        .await
        .map_err(|_| ProviderError::Timeout(self.attempt_timeout))??;

        if media.candidates.is_empty() {
            return Err(ProviderError::NoFormats);
        }

        let selection = FormatSelector::select(&media.candidates, strategy.format_preference())
            .ok_or(ProviderError::NoFormats)?;

        Ok(ResolutionResult::from_selection(&media, &selection, strategy.name()))
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("strategies", &self.catalog.names())
            .field("jitter", &self.jitter)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("content_base_url", &self.content_base_url)
            .finish()
    }
}
