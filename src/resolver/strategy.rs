//! Extraction strategies and their ordered catalog.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

use crate::error::CatalogError;
use crate::fallback::FallbackAttempt;
use crate::sources::{CredentialSource, NetworkIdentity};

// User agents rotativos para evitar la detección
const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Format policy applied to the candidates of one provider response.
///
/// `MedianAudioOnly` is an anti-fingerprinting guess: it skips both the best
/// and the worst stream. It has no measured backing and is kept as one named
/// option among the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatPreference {
    BestAudioOnly,
    MedianAudioOnly,
    AnyWithAudio,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgentPolicy {
    /// Let the extractor send its own default
    ExtractorDefault,
    /// Pick one desktop browser UA per attempt
    RandomDesktop,
    Fixed(String),
}

/// Accept-Language hint sent with an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleHeaders {
    pub accept_language: String,
}

impl LocaleHeaders {
    pub fn new(accept_language: impl Into<String>) -> Self {
        Self {
            accept_language: accept_language.into(),
        }
    }
}

/// One complete extraction configuration, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDescriptor {
    name: String,
    user_agent: UserAgentPolicy,
    credentials: Option<CredentialSource>,
    synthetic_forwarded_for: bool,
    browser_headers: bool,
    locale: Option<LocaleHeaders>,
    geo_bypass_country: Option<String>,
    format_preference: FormatPreference,
    format_hint: String,
}

impl StrategyDescriptor {
    pub fn new(name: impl Into<String>, format_preference: FormatPreference) -> Self {
        Self {
            name: name.into(),
            user_agent: UserAgentPolicy::ExtractorDefault,
            credentials: None,
            synthetic_forwarded_for: false,
            browser_headers: false,
            locale: None,
            geo_bypass_country: None,
            format_preference,
            format_hint: "bestaudio".to_string(),
        }
    }

    pub fn with_user_agent(mut self, policy: UserAgentPolicy) -> Self {
        self.user_agent = policy;
        self
    }

    pub fn with_credentials(mut self, source: CredentialSource) -> Self {
        self.credentials = Some(source);
        self
    }

    pub fn with_synthetic_forwarded_for(mut self) -> Self {
        self.synthetic_forwarded_for = true;
        self
    }

    pub fn with_browser_headers(mut self) -> Self {
        self.browser_headers = true;
        self
    }

    pub fn with_locale(mut self, locale: LocaleHeaders) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn with_geo_bypass_country(mut self, country: impl Into<String>) -> Self {
        self.geo_bypass_country = Some(country.into());
        self
    }

    pub fn with_format_hint(mut self, hint: impl Into<String>) -> Self {
        self.format_hint = hint.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format_preference(&self) -> FormatPreference {
        self.format_preference
    }

    pub fn format_hint(&self) -> &str {
        &self.format_hint
    }

    pub fn locale(&self) -> Option<&LocaleHeaders> {
        self.locale.as_ref()
    }

    /// Natural-looking desktop request, preferred container first.
    pub fn lightweight() -> Self {
        Self::new("lightweight", FormatPreference::BestAudioOnly)
            .with_user_agent(UserAgentPolicy::RandomDesktop)
            .with_browser_headers()
            .with_locale(LocaleHeaders::new("en-US,en;q=0.9"))
            .with_format_hint("bestaudio[ext=m4a]/bestaudio/best")
    }

    /// Synthetic forwarding address and a deliberately unremarkable format.
    pub fn proxy_simulation() -> Self {
        Self::new("proxy_simulation", FormatPreference::MedianAudioOnly)
            .with_user_agent(UserAgentPolicy::RandomDesktop)
            .with_synthetic_forwarded_for()
            .with_locale(LocaleHeaders::new("fr-FR,fr;q=0.9,en;q=0.8"))
            .with_format_hint("worst[ext=m4a]/worst/bestaudio")
    }

    pub fn mobile() -> Self {
        Self::new("mobile", FormatPreference::BestAudioOnly)
            .with_user_agent(UserAgentPolicy::Fixed(MOBILE_USER_AGENT.to_string()))
            .with_browser_headers()
            .with_format_hint("bestaudio[ext=m4a]/bestaudio")
    }

    /// Bare-bones request, no extra headers.
    pub fn simple() -> Self {
        Self::new("simple", FormatPreference::BestAudioOnly)
    }

    pub fn browser_cookies(browser: impl Into<String>) -> Self {
        Self::new("browser_cookies", FormatPreference::BestAudioOnly)
            .with_credentials(CredentialSource::Browser(browser.into()))
            .with_format_hint("bestaudio[ext=m4a]/bestaudio/best")
    }

    /// Renders the concrete identity for one attempt.
    ///
    /// Randomized parts (user agent, forwarding address) are drawn fresh on
    /// every call, so two attempts with the same descriptor differ.
    pub fn render_identity<R: Rng + ?Sized>(&self, rng: &mut R) -> NetworkIdentity {
        let user_agent = match &self.user_agent {
            UserAgentPolicy::ExtractorDefault => None,
            UserAgentPolicy::RandomDesktop => DESKTOP_USER_AGENTS
                .choose(rng)
                .map(|ua| ua.to_string()),
            UserAgentPolicy::Fixed(ua) => Some(ua.clone()),
        };

        let mut headers = Vec::new();
        if self.browser_headers {
            headers.push(("Accept".to_string(), BROWSER_ACCEPT.to_string()));
            headers.push(("DNT".to_string(), "1".to_string()));
        }
        if let Some(locale) = &self.locale {
            headers.push(("Accept-Language".to_string(), locale.accept_language.clone()));
        }
        if self.synthetic_forwarded_for {
            let ip = format!(
                "{}.{}.{}.{}",
                rng.gen_range(1..=255u8),
                rng.gen_range(1..=255u8),
                rng.gen_range(1..=255u8),
                rng.gen_range(1..=255u8)
            );
            headers.push(("X-Forwarded-For".to_string(), ip));
        }

        NetworkIdentity {
            user_agent,
            headers,
            credentials: self.credentials.clone(),
            geo_bypass_country: self.geo_bypass_country.clone(),
        }
    }
}

impl FallbackAttempt for StrategyDescriptor {
    fn label(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }
}

/// Ordered, read-only list of strategies.
///
/// Order goes from the most natural-looking request to the most conservative
/// one; the resolver always walks it front to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyCatalog {
    strategies: Vec<StrategyDescriptor>,
}

impl StrategyCatalog {
    pub const BUILTIN_NAMES: &'static [&'static str] = &[
        "lightweight",
        "proxy_simulation",
        "mobile",
        "simple",
        "browser_cookies",
    ];

    pub fn new(strategies: Vec<StrategyDescriptor>) -> Result<Self, CatalogError> {
        if strategies.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for strategy in &strategies {
            if !seen.insert(strategy.name()) {
                return Err(CatalogError::Duplicate(strategy.name().to_string()));
            }
        }

        Ok(Self { strategies })
    }

    /// Builds a catalog from built-in strategy names, keeping their order.
    pub fn from_names<S: AsRef<str>>(
        names: &[S],
        cookies_browser: &str,
    ) -> Result<Self, CatalogError> {
        let strategies = names
            .iter()
            .map(|name| match name.as_ref().trim() {
                "lightweight" => Ok(StrategyDescriptor::lightweight()),
                "proxy_simulation" => Ok(StrategyDescriptor::proxy_simulation()),
                "mobile" => Ok(StrategyDescriptor::mobile()),
                "simple" => Ok(StrategyDescriptor::simple()),
                "browser_cookies" => Ok(StrategyDescriptor::browser_cookies(cookies_browser)),
                other => Err(CatalogError::Unknown(other.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(strategies)
    }

    pub fn strategies(&self) -> &[StrategyDescriptor] {
        &self.strategies
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(StrategyDescriptor::name).collect()
    }
}

impl Default for StrategyCatalog {
    fn default() -> Self {
        Self {
            strategies: vec![
                StrategyDescriptor::lightweight(),
                StrategyDescriptor::proxy_simulation(),
                StrategyDescriptor::mobile(),
                StrategyDescriptor::simple(),
            ],
        }
    }
}
