//! Resource-bound, pull-based iteration over search results.
//!
//! A [`SearchIteration`] wraps a backend [`SearchCursor`] and owns its
//! lifecycle:
//!
//! ```text
//!            has_next / next_statement
//!          ┌─────────────┐
//!          ▼             │
//!        Open ───────────┘
//!       │  │  │
//!  end  │  │  └── backend error ──► Failed ──┐
//!       ▼  │                                  │ close()
//!  Exhausted                                  ▼
//!       │  └──────────── close() ───────────► Closed
//!       └─────────────── close() ───────────►
//! ```
//!
//! The cursor is released exactly once: on exhaustion, on the first backend
//! failure, on `close()` from `Open`, or when the iteration is dropped while
//! still holding it. Every statement handed out is re-checked against the
//! iteration's [`StatementConstraints`], so adapters that cannot push
//! constraints down still honour them.

use std::collections::VecDeque;
use std::iter::FusedIterator;

use tracing::{debug, warn};

use super::constraints::StatementConstraints;
use super::error::{SearchError, SearchResult};
use crate::model::types::Statement;

/// Backend side of an iteration: an open cursor over a result set.
///
/// Implementations do not need to track their own lifecycle. The owning
/// [`SearchIteration`] stops calling [`advance`](SearchCursor::advance) after
/// it returns `Ok(None)` or an error, and calls
/// [`release`](SearchCursor::release) exactly once.
pub trait SearchCursor: Send {
    /// Produce the next candidate statement, `Ok(None)` at the end.
    fn advance(&mut self) -> SearchResult<Option<Statement>>;

    /// Release every backend resource held by the cursor.
    ///
    /// Must return in bounded time. Errors are reported to the caller of
    /// `close()` at most once; the iteration is closed either way.
    fn release(&mut self) -> SearchResult<()>;
}

/// Lifecycle state of a [`SearchIteration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    /// May produce further statements.
    Open,
    /// No further statements; resources already released.
    Exhausted,
    /// Explicitly closed; no further pulls permitted.
    Closed,
    /// A pull raised an error; resources already released.
    Failed,
}

/// Counters collected over the lifetime of one iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationStats {
    /// Statements handed to the consumer.
    pub yielded: u64,
    /// Statements produced by the backend but rejected by the constraints.
    pub filtered: u64,
}

/// An open, stateful cursor over matching statements.
///
/// Owned by exactly one consumer and driven sequentially through `&mut self`.
/// Callers must [`close`](SearchIteration::close) it on every exit path;
/// dropping an unreleased iteration releases it as a fallback.
pub struct SearchIteration {
    backend: String,
    cursor: Option<Box<dyn SearchCursor>>,
    constraints: StatementConstraints,
    state: IterationState,
    lookahead: Option<Statement>,
    failure: Option<SearchError>,
    pending_release_error: Option<SearchError>,
    failure_surfaced: bool,
    stats: IterationStats,
}

impl SearchIteration {
    /// Wrap an opened cursor. `backend` names the adapter in logs and errors.
    pub fn new(
        backend: impl Into<String>,
        cursor: Box<dyn SearchCursor>,
        constraints: StatementConstraints,
    ) -> Self {
        let backend = backend.into();
        debug!(backend = %backend, constraints = %constraints, "search_iteration_open");
        Self {
            backend,
            cursor: Some(cursor),
            constraints,
            state: IterationState::Open,
            lookahead: None,
            failure: None,
            pending_release_error: None,
            failure_surfaced: false,
            stats: IterationStats::default(),
        }
    }

    /// Iteration over already-materialized results. Releasing it frees the
    /// buffered statements.
    pub fn from_statements(
        backend: impl Into<String>,
        statements: impl IntoIterator<Item = Statement>,
        constraints: StatementConstraints,
    ) -> Self {
        let buffer: VecDeque<Statement> = statements.into_iter().collect();
        Self::new(backend, Box::new(BufferedCursor { buffer }), constraints)
    }

    /// Iteration that yields nothing.
    pub fn empty(backend: impl Into<String>) -> Self {
        Self::from_statements(backend, Vec::new(), StatementConstraints::none())
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn stats(&self) -> IterationStats {
        self.stats
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn constraints(&self) -> &StatementConstraints {
        &self.constraints
    }

    /// Whether backend resources are still held.
    pub fn holds_resources(&self) -> bool {
        self.cursor.is_some()
    }

    /// Report whether another statement is available without consuming it.
    ///
    /// Repeated calls without an intervening pull return the same answer and
    /// do not advance the cursor. A backend failure releases the cursor,
    /// moves the iteration to [`IterationState::Failed`] and is re-signalled
    /// by every later pull. Pulling from a closed iteration is a usage error.
    pub fn has_next(&mut self) -> SearchResult<bool> {
        match self.state {
            IterationState::Exhausted => return Ok(false),
            IterationState::Closed => return Err(SearchError::Closed),
            IterationState::Failed => return Err(self.recorded_failure()),
            IterationState::Open => {}
        }
        if self.lookahead.is_some() {
            return Ok(true);
        }

        loop {
            let pulled = match self.cursor.as_mut() {
                Some(cursor) => cursor.advance(),
                None => Ok(None),
            };
            match pulled {
                Ok(Some(statement)) => {
                    if self.constraints.matches(&statement) {
                        self.lookahead = Some(statement);
                        return Ok(true);
                    }
                    self.stats.filtered += 1;
                }
                Ok(None) => {
                    if let Err(e) = self.release("exhausted") {
                        self.pending_release_error = Some(e);
                    }
                    self.state = IterationState::Exhausted;
                    debug!(
                        backend = %self.backend,
                        yielded = self.stats.yielded,
                        filtered = self.stats.filtered,
                        "search_iteration_exhausted"
                    );
                    return Ok(false);
                }
                Err(e) => {
                    // The pull error takes precedence; a release failure on
                    // this path is only logged.
                    let _ = self.release("failed");
                    warn!(backend = %self.backend, error = %e, "search_iteration_failed");
                    self.state = IterationState::Failed;
                    self.failure = Some(e.clone());
                    return Err(e);
                }
            }
        }
    }

    /// Return the next matching statement and advance.
    ///
    /// Fails with [`SearchError::NoSuchElement`] when the iteration is
    /// exhausted.
    pub fn next_statement(&mut self) -> SearchResult<Statement> {
        if !self.has_next()? {
            return Err(SearchError::NoSuchElement);
        }
        match self.lookahead.take() {
            Some(statement) => {
                self.stats.yielded += 1;
                Ok(statement)
            }
            None => Err(SearchError::NoSuchElement),
        }
    }

    /// Release backend resources and move to [`IterationState::Closed`].
    ///
    /// Safe from every state and idempotent. A release failure is returned
    /// by the first `close()` that observes it and never again; the
    /// iteration is closed regardless.
    pub fn close(&mut self) -> SearchResult<()> {
        let result = match self.state {
            IterationState::Closed => Ok(()),
            IterationState::Open => self.release("closed"),
            IterationState::Exhausted | IterationState::Failed => {
                self.pending_release_error.take().map_or(Ok(()), Err)
            }
        };
        if self.state != IterationState::Closed {
            debug!(
                backend = %self.backend,
                from = ?self.state,
                yielded = self.stats.yielded,
                "search_iteration_closed"
            );
        }
        self.state = IterationState::Closed;
        self.lookahead = None;
        result
    }

    /// Drain every remaining statement, then close.
    ///
    /// The iteration is closed on the error path too; a pull error wins over
    /// a close error.
    pub fn collect_all(mut self) -> SearchResult<Vec<Statement>> {
        let mut out = Vec::new();
        let drained = loop {
            match self.has_next() {
                Ok(true) => match self.next_statement() {
                    Ok(statement) => out.push(statement),
                    Err(e) => break Err(e),
                },
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        let closed = self.close();
        drained?;
        closed?;
        Ok(out)
    }

    fn recorded_failure(&self) -> SearchError {
        self.failure.clone().unwrap_or_else(|| {
            SearchError::evaluation(self.backend.clone(), "iteration failed")
        })
    }

    fn release(&mut self, reason: &'static str) -> SearchResult<()> {
        self.lookahead = None;
        let Some(mut cursor) = self.cursor.take() else {
            return Ok(());
        };
        let result = cursor.release();
        drop(cursor);
        match &result {
            Ok(()) => debug!(backend = %self.backend, reason, "search_cursor_released"),
            Err(e) => warn!(
                backend = %self.backend,
                reason,
                error = %e,
                "search_cursor_release_failed"
            ),
        }
        result
    }
}

impl Iterator for SearchIteration {
    type Item = SearchResult<Statement>;

    /// Yields each statement, or a failure once followed by `None`.
    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            IterationState::Closed | IterationState::Exhausted => return None,
            IterationState::Failed if self.failure_surfaced => return None,
            _ => {}
        }
        match self.has_next() {
            Ok(true) => Some(self.next_statement()),
            Ok(false) => None,
            Err(e) => {
                self.failure_surfaced = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for SearchIteration {}

impl Drop for SearchIteration {
    fn drop(&mut self) {
        if self.cursor.is_some() {
            warn!(backend = %self.backend, "search iteration dropped without close");
            let _ = self.release("dropped");
        }
    }
}

impl std::fmt::Debug for SearchIteration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIteration")
            .field("backend", &self.backend)
            .field("state", &self.state)
            .field("holds_resources", &self.cursor.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

struct BufferedCursor {
    buffer: VecDeque<Statement>,
}

impl SearchCursor for BufferedCursor {
    fn advance(&mut self) -> SearchResult<Option<Statement>> {
        Ok(self.buffer.pop_front())
    }

    fn release(&mut self) -> SearchResult<()> {
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::Term;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn st(s: &str, p: &str) -> Statement {
        Statement::new(Term::iri(s), Term::iri(p), Term::literal("o"))
    }

    /// Cursor over a fixed script that counts releases and can fail.
    struct CountingCursor {
        items: VecDeque<SearchResult<Statement>>,
        releases: Arc<AtomicUsize>,
        release_error: Option<SearchError>,
    }

    fn counting(
        items: Vec<SearchResult<Statement>>,
        release_error: Option<SearchError>,
    ) -> (Box<dyn SearchCursor>, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let cursor = CountingCursor {
            items: items.into(),
            releases: releases.clone(),
            release_error,
        };
        (Box::new(cursor), releases)
    }

    impl SearchCursor for CountingCursor {
        fn advance(&mut self) -> SearchResult<Option<Statement>> {
            self.items.pop_front().transpose()
        }

        fn release(&mut self) -> SearchResult<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            match self.release_error.take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    #[test]
    fn drain_releases_once_and_exhausts() {
        let (cursor, releases) = counting(vec![Ok(st("ex:a", "ex:p")), Ok(st("ex:b", "ex:p"))], None);
        let mut it = SearchIteration::new("test", cursor, StatementConstraints::none());
        assert_eq!(it.next_statement().unwrap().subject, Term::iri("ex:a"));
        assert_eq!(it.next_statement().unwrap().subject, Term::iri("ex:b"));
        assert!(!it.has_next().unwrap());
        assert_eq!(it.state(), IterationState::Exhausted);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!it.holds_resources());

        it.close().unwrap();
        it.close().unwrap();
        assert_eq!(it.state(), IterationState::Closed);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn has_next_is_idempotent() {
        let (cursor, _) = counting(vec![Ok(st("ex:a", "ex:p")), Ok(st("ex:b", "ex:p"))], None);
        let mut it = SearchIteration::new("test", cursor, StatementConstraints::none());
        for _ in 0..5 {
            assert!(it.has_next().unwrap());
        }
        assert_eq!(it.next_statement().unwrap().subject, Term::iri("ex:a"));
        it.close().unwrap();
    }

    #[test]
    fn next_past_end_is_usage_error() {
        let mut it = SearchIteration::empty("test");
        assert_eq!(it.next_statement(), Err(SearchError::NoSuchElement));
        assert_eq!(it.state(), IterationState::Exhausted);
        it.close().unwrap();
    }

    #[test]
    fn pulls_after_close_fail() {
        let (cursor, releases) = counting(vec![Ok(st("ex:a", "ex:p"))], None);
        let mut it = SearchIteration::new("test", cursor, StatementConstraints::none());
        it.close().unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(it.has_next(), Err(SearchError::Closed));
        assert_eq!(it.next_statement(), Err(SearchError::Closed));
        assert!(Iterator::next(&mut it).is_none());
    }

    #[test]
    fn failure_releases_before_surfacing_and_is_resignalled() {
        let boom = SearchError::evaluation("test", "connection reset");
        let (cursor, releases) = counting(vec![Ok(st("ex:a", "ex:p")), Err(boom.clone())], None);
        let mut it = SearchIteration::new("test", cursor, StatementConstraints::none());
        it.next_statement().unwrap();
        assert_eq!(it.next_statement(), Err(boom.clone()));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(it.state(), IterationState::Failed);
        assert_eq!(it.has_next(), Err(boom));
        it.close().unwrap();
        it.close().unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn constraints_filter_backend_output() {
        let (cursor, _) = counting(
            vec![
                Ok(st("ex:a", "ex:p1")),
                Ok(st("ex:b", "ex:p2")),
                Ok(st("ex:c", "ex:p1")),
            ],
            None,
        );
        let constraints = StatementConstraints::none().with_predicate(Term::iri("ex:p1"));
        let it = SearchIteration::new("test", cursor, constraints);
        let out = it.collect_all().unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.predicate == Term::iri("ex:p1")));
    }

    #[test]
    fn filtered_statements_are_counted() {
        let (cursor, _) = counting(vec![Ok(st("ex:a", "ex:p1")), Ok(st("ex:b", "ex:p2"))], None);
        let constraints = StatementConstraints::none().with_subject(Term::iri("ex:b"));
        let mut it = SearchIteration::new("test", cursor, constraints);
        it.next_statement().unwrap();
        assert_eq!(it.stats(), IterationStats { yielded: 1, filtered: 1 });
        it.close().unwrap();
    }

    #[test]
    fn release_error_reported_once_on_close() {
        let (cursor, releases) = counting(
            vec![Ok(st("ex:a", "ex:p"))],
            Some(SearchError::evaluation("test", "close failed")),
        );
        let mut it = SearchIteration::new("test", cursor, StatementConstraints::none());
        assert!(it.close().is_err());
        assert_eq!(it.state(), IterationState::Closed);
        it.close().unwrap();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_error_at_exhaustion_surfaces_from_close() {
        let (cursor, _) = counting(vec![], Some(SearchError::evaluation("test", "close failed")));
        let mut it = SearchIteration::new("test", cursor, StatementConstraints::none());
        assert!(!it.has_next().unwrap());
        assert!(it.close().is_err());
        it.close().unwrap();
    }

    #[test]
    fn drop_releases_unclosed_iteration() {
        let (cursor, releases) = counting(vec![Ok(st("ex:a", "ex:p"))], None);
        {
            let mut it = SearchIteration::new("test", cursor, StatementConstraints::none());
            assert!(it.has_next().unwrap());
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn iterator_surfaces_failure_once() {
        let boom = SearchError::evaluation("test", "timeout");
        let (cursor, _) = counting(vec![Ok(st("ex:a", "ex:p")), Err(boom.clone())], None);
        let it = SearchIteration::new("test", cursor, StatementConstraints::none());
        let items: Vec<_> = it.collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(items[1], Err(boom));
    }

    #[test]
    fn collect_all_closes_on_error() {
        let boom = SearchError::evaluation("test", "timeout");
        let (cursor, releases) = counting(vec![Err(boom.clone())], None);
        let it = SearchIteration::new("test", cursor, StatementConstraints::none());
        assert_eq!(it.collect_all(), Err(boom));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
