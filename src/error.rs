//! Error types for resolution, metadata lookups and local storage.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

// "bot" como palabra completa, no dentro de "both"
static BOT_WORD_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\bbot\b").ok());

/// Failure of a single extraction attempt.
///
/// These never leave the resolver: every variant is recoverable by moving
/// on to the next strategy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The attempt did not finish within its time budget
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure talking to the upstream site
    #[error("network error: {0}")]
    Network(String),

    /// Upstream rejected the request (429, bot check, sign-in wall)
    #[error("blocked by upstream: {0}")]
    Blocked(String),

    /// Content is geo-restricted, private or removed for this identity
    #[error("content unavailable: {0}")]
    Unavailable(String),

    /// The provider answered but returned no usable candidates
    #[error("no usable formats returned")]
    NoFormats,

    /// The extractor binary could not be started
    #[error("extractor not found: {0}")]
    ToolNotFound(String),

    /// The provider output could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// Anything else the extractor reported
    #[error("extraction failed: {0}")]
    Execution(String),
}

impl ProviderError {
    /// Classifies raw extractor stderr into an error kind.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let trimmed = message.trim().to_string();

        if lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("sign in to confirm")
            || BOT_WORD_RE.as_ref().is_some_and(|re| re.is_match(&lower))
        {
            return Self::Blocked(trimmed);
        }

        if lower.contains("available in your country")
            || lower.contains("geo")
            || lower.contains("private video")
            || lower.contains("video unavailable")
            || lower.contains("has been removed")
        {
            return Self::Unavailable(trimmed);
        }

        if lower.contains("timed out") || lower.contains("timeout") {
            return Self::Network(trimmed);
        }

        if lower.contains("unable to download")
            || lower.contains("connection")
            || lower.contains("name resolution")
        {
            return Self::Network(trimmed);
        }

        if lower.contains("json") || lower.contains("parse") {
            return Self::Parse(trimmed);
        }

        Self::Execution(trimmed)
    }
}

/// Failure of a metadata provider call for one region.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// The provider confirmed the item does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The provider answered with an empty result set
    #[error("empty result")]
    Empty,

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    /// Provider-side rejection (rate limit, region block, 5xx)
    #[error("provider error: {0}")]
    Provider(String),
}

impl MetadataError {
    /// A not-found answer is authoritative; trying another region won't help.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for MetadataError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else if e.status().is_some_and(|s| s.as_u16() == 404) {
            Self::NotFound(e.to_string())
        } else if e.is_status() {
            Self::Provider(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Local file store errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file not found for {id}")]
    NotFound { id: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Invalid strategy catalog or region directory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("list must contain at least one entry")]
    Empty,

    #[error("duplicate entry '{0}'")]
    Duplicate(String),

    #[error("unknown entry '{0}'")]
    Unknown(String),

    #[error("invalid entry '{0}'")]
    Invalid(String),
}

/// Errors surfaced to callers of the engine.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Empty or malformed identifier, rejected before any network activity
    #[error("invalid content id: {reason}")]
    InvalidInput { reason: String },

    /// The metadata provider confirmed the item does not exist
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Every region was tried and none answered
    #[error("temporarily unavailable: {reason}")]
    TemporarilyUnavailable { reason: String },

    /// The caller-imposed deadline elapsed
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Only a content-page fallback is available, no media stream
    #[error("no direct media stream available for {id}")]
    Degraded { id: String },

    /// Fetching resolved media bytes failed
    #[error("media fetch failed: {0}")]
    Fetch(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ResolveError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Status code an HTTP layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } => 400,
            Self::NotFound { .. } | Self::Storage(StorageError::NotFound { .. }) => 404,
            Self::TemporarilyUnavailable { .. } => 503,
            Self::DeadlineExceeded(_) => 504,
            Self::Degraded { .. } | Self::Fetch(_) => 502,
            Self::Storage(_) => 500,
        }
    }

    /// Whether the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TemporarilyUnavailable { .. }
                | Self::DeadlineExceeded(_)
                | Self::Degraded { .. }
                | Self::Fetch(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_blocked() {
        let err = ProviderError::classify("ERROR: Sign in to confirm you're not a bot");
        assert!(matches!(err, ProviderError::Blocked(_)));

        let err = ProviderError::classify("HTTP Error 429: Too Many Requests");
        assert!(matches!(err, ProviderError::Blocked(_)));
    }

    #[test]
    fn test_classify_unavailable_and_network() {
        let err = ProviderError::classify(
            "ERROR: The uploader has not made this video available in your country",
        );
        assert!(matches!(err, ProviderError::Unavailable(_)));

        let err = ProviderError::classify("ERROR: Unable to download webpage: connection reset");
        assert!(matches!(err, ProviderError::Network(_)));
    }

    #[test]
    fn test_classify_bot_needs_whole_word() {
        let err = ProviderError::classify("ERROR: both requested formats failed to merge");
        assert!(!matches!(err, ProviderError::Blocked(_)));

        let err = ProviderError::classify("ERROR: this looks like a bot, please retry later");
        assert!(matches!(err, ProviderError::Blocked(_)));
    }

    #[test]
    fn test_classify_fallback_is_execution() {
        let err = ProviderError::classify("something odd happened");
        assert_eq!(err, ProviderError::Execution("something odd happened".to_string()));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ResolveError::invalid("empty").status_code(), 400);
        assert_eq!(
            ResolveError::NotFound { what: "song x".into() }.status_code(),
            404
        );
        assert_eq!(
            ResolveError::TemporarilyUnavailable { reason: "regions".into() }.status_code(),
            503
        );
        assert!(!ResolveError::invalid("empty").is_retryable());
        assert!(ResolveError::DeadlineExceeded(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_metadata_not_found_is_terminal() {
        assert!(MetadataError::NotFound("x".into()).is_terminal());
        assert!(!MetadataError::Empty.is_terminal());
        assert!(!MetadataError::Provider("503".into()).is_terminal());
    }
}
