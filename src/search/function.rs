//! The pluggable search contract.

use super::constraints::StatementConstraints;
use super::error::{SearchError, SearchResult};
use super::iteration::SearchIteration;

/// Full-text search function IRI.
pub const FTS_TEXT: &str = "http://rdf.useekm.com/fts#text";

/// Temporal function namespace.
pub const TEMPORAL_NS: &str = "tag:rya-rdf.org,2015:temporal#";
pub const TEMPORAL_BEFORE: &str = "tag:rya-rdf.org,2015:temporal#before";
pub const TEMPORAL_AFTER: &str = "tag:rya-rdf.org,2015:temporal#after";
pub const TEMPORAL_EQUALS: &str = "tag:rya-rdf.org,2015:temporal#equals";
pub const TEMPORAL_INSIDE_INTERVAL: &str = "tag:rya-rdf.org,2015:temporal#insideInterval";

/// Index technology behind a search function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    FullText,
    Geospatial,
    Temporal,
    Other,
}

impl FunctionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionKind::FullText => "full-text",
            FunctionKind::Geospatial => "geospatial",
            FunctionKind::Temporal => "temporal",
            FunctionKind::Other => "other",
        }
    }
}

/// How a backend treats empty or blank search terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyTermsPolicy {
    /// Blank terms are a usage error.
    #[default]
    Reject,
    /// Blank terms match every indexed statement.
    MatchAll,
}

impl EmptyTermsPolicy {
    /// Apply the policy. Returns `Ok(true)` when the terms are blank and the
    /// backend should match everything.
    pub fn check(self, search_terms: &str) -> SearchResult<bool> {
        if !search_terms.trim().is_empty() {
            return Ok(false);
        }
        match self {
            EmptyTermsPolicy::Reject => Err(SearchError::InvalidTerms(
                "search terms must not be blank".into(),
            )),
            EmptyTermsPolicy::MatchAll => Ok(true),
        }
    }
}

/// A search over an external index.
///
/// Implementations wrap one index technology. The returned iteration yields
/// only statements that match `search_terms` by the backend's rules and
/// satisfy every set field of `constraints`.
///
/// If the search fails after resources were partially acquired, those
/// resources are released before the error is returned. The caller owns the
/// returned iteration and must close it.
pub trait SearchFunction: Send + Sync {
    /// Short backend name used in logs and error messages.
    fn name(&self) -> &str;

    fn kind(&self) -> FunctionKind;

    fn empty_terms_policy(&self) -> EmptyTermsPolicy {
        EmptyTermsPolicy::Reject
    }

    /// Search the index and return an open iteration positioned before the
    /// first result. Ordering is backend-defined.
    fn perform_search(
        &self,
        search_terms: &str,
        constraints: &StatementConstraints,
    ) -> SearchResult<SearchIteration>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_policy_refuses_blank_terms() {
        assert!(matches!(
            EmptyTermsPolicy::Reject.check("   "),
            Err(SearchError::InvalidTerms(_))
        ));
        assert_eq!(EmptyTermsPolicy::Reject.check("foo"), Ok(false));
    }

    #[test]
    fn match_all_policy_accepts_blank_terms() {
        assert_eq!(EmptyTermsPolicy::MatchAll.check(""), Ok(true));
        assert_eq!(EmptyTermsPolicy::MatchAll.check("foo"), Ok(false));
    }

    #[test]
    fn temporal_iris_share_namespace() {
        for iri in [
            TEMPORAL_BEFORE,
            TEMPORAL_AFTER,
            TEMPORAL_EQUALS,
            TEMPORAL_INSIDE_INTERVAL,
        ] {
            assert!(iri.starts_with(TEMPORAL_NS));
        }
    }
}
