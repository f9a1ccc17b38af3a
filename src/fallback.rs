//! Ordered fallback execution.
//!
//! Runs a list of attempt descriptors one at a time, in order, until one
//! succeeds. Individual failures are logged and collected; only when every
//! attempt has failed does the caller see an error. Used for extraction
//! strategies and for metadata regions.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;

use tracing::{debug, info, warn};

use crate::error::{MetadataError, ProviderError};

/// Longitud máxima del motivo de fallo en logs
const MAX_REASON_CHARS: usize = 100;

/// Something that can be tried as one step of a fallback chain.
pub trait FallbackAttempt {
    fn label(&self) -> Cow<'_, str>;
}

/// Error produced by a single attempt.
pub trait AttemptError: fmt::Display {
    /// Terminal errors stop the chain instead of moving on.
    fn is_terminal(&self) -> bool {
        false
    }
}

impl AttemptError for ProviderError {}

impl AttemptError for MetadataError {
    fn is_terminal(&self) -> bool {
        MetadataError::is_terminal(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure<E> {
    pub attempt: String,
    pub error: E,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackFailure<E> {
    /// Every attempt failed, in order
    Exhausted(Vec<AttemptFailure<E>>),
    /// An attempt failed with a terminal error
    Aborted(AttemptFailure<E>),
}

impl<E: fmt::Display> FallbackFailure<E> {
    /// One-line summary, e.g. `"lightweight: timeout; mobile: blocked"`.
    pub fn summary(&self) -> String {
        match self {
            Self::Exhausted(failures) if failures.is_empty() => "no attempts configured".to_string(),
            Self::Exhausted(failures) => failures
                .iter()
                .map(|f| format!("{}: {}", f.attempt, truncate(&f.error.to_string())))
                .collect::<Vec<_>>()
                .join("; "),
            Self::Aborted(failure) => format!("{}: {}", failure.attempt, failure.error),
        }
    }
}

/// Success of a fallback chain: the value and the attempt that produced it.
#[derive(Debug)]
pub struct FallbackSuccess<'a, D, T> {
    pub value: T,
    pub attempt: &'a D,
    /// Zero-based position of the winning attempt
    pub position: usize,
}

/// Ordered, first-success-wins executor over a fixed list of attempts.
#[derive(Debug, Clone, Copy)]
pub struct OrderedFallback<'a, D> {
    context: &'a str,
    attempts: &'a [D],
}

impl<'a, D: FallbackAttempt> OrderedFallback<'a, D> {
    pub fn new(context: &'a str, attempts: &'a [D]) -> Self {
        Self { context, attempts }
    }

    /// Runs `exec` for each attempt until one returns `Ok`.
    ///
    /// Attempts run strictly sequentially; a later attempt never starts
    /// before the previous one has finished.
    pub async fn run<T, E, F, Fut>(
        &self,
        mut exec: F,
    ) -> Result<FallbackSuccess<'a, D, T>, FallbackFailure<E>>
    where
        E: AttemptError,
        F: FnMut(&'a D) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let total = self.attempts.len();
        let mut failures = Vec::new();

        for (position, attempt) in self.attempts.iter().enumerate() {
            let label = attempt.label();
            debug!("🔄 {}: intento {}/{} ({})", self.context, position + 1, total, label);

            match exec(attempt).await {
                Ok(value) => {
                    info!("✅ {}: éxito con '{}'", self.context, label);
                    return Ok(FallbackSuccess {
                        value,
                        attempt,
                        position,
                    });
                }
                Err(error) if error.is_terminal() => {
                    warn!("⛔ {}: '{}' falló de forma definitiva: {}", self.context, label, error);
                    return Err(FallbackFailure::Aborted(AttemptFailure {
                        attempt: label.into_owned(),
                        error,
                    }));
                }
                Err(error) => {
                    warn!(
                        "❌ {}: falló '{}': {}",
                        self.context,
                        label,
                        truncate(&error.to_string())
                    );
                    failures.push(AttemptFailure {
                        attempt: label.into_owned(),
                        error,
                    });
                }
            }
        }

        Err(FallbackFailure::Exhausted(failures))
    }
}

fn truncate(reason: &str) -> Cow<'_, str> {
    if reason.chars().count() <= MAX_REASON_CHARS {
        Cow::Borrowed(reason)
    } else {
        Cow::Owned(reason.chars().take(MAX_REASON_CHARS).collect())
    }
}
