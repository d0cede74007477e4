//! Errors crossing the search boundary.

use thiserror::Error;

/// Result alias used throughout the search layer.
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Failure of a search invocation or of an open iteration.
///
/// [`SearchError::Evaluation`] is the single checked evaluation kind: the
/// backend could not satisfy the request. The other variants are usage errors
/// raised by the caller's own misuse of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// The backend could not execute the search or produce the next result.
    #[error("search evaluation failed in {backend}: {cause}")]
    Evaluation { backend: String, cause: String },

    /// The search terms were rejected before reaching the backend.
    #[error("invalid search terms: {0}")]
    InvalidTerms(String),

    /// `next_statement()` was called with no element available.
    #[error("no further statements in search iteration")]
    NoSuchElement,

    /// The iteration was already closed.
    #[error("search iteration is closed")]
    Closed,

    /// No search function is registered under the requested IRI.
    #[error("no search function registered for <{0}>")]
    UnknownFunction(String),
}

impl SearchError {
    /// Build an evaluation error preserving the backend's own message.
    pub fn evaluation(backend: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        SearchError::Evaluation {
            backend: backend.into(),
            cause: cause.to_string(),
        }
    }

    /// Whether this error reports caller misuse rather than a backend fault.
    pub fn is_usage(&self) -> bool {
        !matches!(self, SearchError::Evaluation { .. })
    }
}
