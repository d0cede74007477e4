//! Temporal search over `xsd:dateTime` objects.
//!
//! Search terms are RFC 3339 instants (`2020-01-01T00:00:00Z`) or, for
//! [`TemporalRelation::InsideInterval`], a `start/end` pair. Results are
//! ordered by instant, then insertion order.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::constraints::StatementConstraints;
use super::error::{SearchError, SearchResult};
use super::function::{FunctionKind, SearchFunction};
use super::iteration::SearchIteration;
use crate::model::types::Statement;

/// Relation between the indexed instant and the query terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalRelation {
    /// Strictly before the query instant.
    Before,
    /// Strictly after the query instant.
    After,
    /// Exactly at the query instant.
    Equals,
    /// Strictly inside the open interval `start/end`.
    InsideInterval,
}

impl TemporalRelation {
    pub fn backend_name(self) -> &'static str {
        match self {
            TemporalRelation::Before => "temporal-before",
            TemporalRelation::After => "temporal-after",
            TemporalRelation::Equals => "temporal-equals",
            TemporalRelation::InsideInterval => "temporal-inside",
        }
    }

    fn bounds(self, terms: &str) -> SearchResult<(Bound<DateTime<Utc>>, Bound<DateTime<Utc>>)> {
        let terms = terms.trim();
        Ok(match self {
            TemporalRelation::Before => (Bound::Unbounded, Bound::Excluded(parse_instant(terms)?)),
            TemporalRelation::After => (Bound::Excluded(parse_instant(terms)?), Bound::Unbounded),
            TemporalRelation::Equals => {
                let at = parse_instant(terms)?;
                (Bound::Included(at), Bound::Included(at))
            }
            TemporalRelation::InsideInterval => {
                let (start, end) = terms.split_once('/').ok_or_else(|| {
                    SearchError::InvalidTerms(format!("expected `start/end` interval, got `{terms}`"))
                })?;
                let (start, end) = (parse_instant(start)?, parse_instant(end)?);
                if start >= end {
                    return Err(SearchError::InvalidTerms(format!(
                        "interval start {start} is not before end {end}"
                    )));
                }
                (Bound::Excluded(start), Bound::Excluded(end))
            }
        })
    }
}

fn parse_instant(s: &str) -> SearchResult<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SearchError::InvalidTerms("search terms must not be blank".into()));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| SearchError::InvalidTerms(format!("`{s}` is not an RFC 3339 instant: {e}")))
}

/// Instant-ordered index shared by every temporal function.
#[derive(Debug, Clone, Default)]
pub struct TemporalIndex {
    entries: Arc<RwLock<BTreeMap<DateTime<Utc>, Vec<Statement>>>>,
}

impl TemporalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `statement` if its object is an `xsd:dateTime` literal.
    /// Returns whether it was indexed.
    pub fn insert(&self, statement: Statement) -> bool {
        match statement.object.as_date_time() {
            Some(at) => {
                self.entries.write().entry(at).or_default().push(statement);
                true
            }
            None => false,
        }
    }

    /// Index every temporal statement, returning how many were accepted.
    pub fn extend(&self, statements: impl IntoIterator<Item = Statement>) -> usize {
        statements.into_iter().filter(|s| self.insert(s.clone())).count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Search function for one relation over this index.
    pub fn function(&self, relation: TemporalRelation) -> TemporalSearch {
        TemporalSearch {
            index: self.clone(),
            relation,
        }
    }
}

/// One temporal relation exposed as a [`SearchFunction`].
#[derive(Debug, Clone)]
pub struct TemporalSearch {
    index: TemporalIndex,
    relation: TemporalRelation,
}

impl SearchFunction for TemporalSearch {
    fn name(&self) -> &str {
        self.relation.backend_name()
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::Temporal
    }

    fn perform_search(
        &self,
        search_terms: &str,
        constraints: &StatementConstraints,
    ) -> SearchResult<SearchIteration> {
        let range = self.relation.bounds(search_terms)?;
        // The range is snapshotted under the read lock so the returned
        // iteration holds no lock.
        let matched: Vec<Statement> = self
            .index
            .entries
            .read()
            .range(range)
            .flat_map(|(_, statements)| statements.iter())
            .filter(|s| constraints.matches(s))
            .cloned()
            .collect();
        debug!(backend = self.name(), matched = matched.len(), "temporal_range_scanned");
        Ok(SearchIteration::from_statements(
            self.name(),
            matched,
            constraints.clone(),
        ))
    }
}
