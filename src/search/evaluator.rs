//! Evaluator-side glue: run a search fragment and always close the iteration.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::constraints::StatementConstraints;
use super::error::{SearchError, SearchResult};
use super::iteration::{IterationStats, SearchIteration};
use super::registry::SearchFunctionRegistry;
use crate::model::types::Statement;

/// One search fragment of a larger query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchPattern {
    /// Function IRI resolved through the registry.
    pub function: String,
    pub terms: String,
    pub constraints: StatementConstraints,
}

impl SearchPattern {
    pub fn new(
        function: impl Into<String>,
        terms: impl Into<String>,
        constraints: StatementConstraints,
    ) -> Self {
        Self {
            function: function.into(),
            terms: terms.into(),
            constraints,
        }
    }
}

/// Outcome of driving one pattern to completion or early stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    /// Backend name of the function that served the pattern.
    pub backend: String,
    pub stats: IterationStats,
    /// The sink asked to stop before the iteration was exhausted.
    pub stopped_early: bool,
    pub elapsed_ms: u64,
}

/// Resolves patterns through a shared registry.
#[derive(Debug, Clone)]
pub struct SearchEvaluator {
    registry: Arc<SearchFunctionRegistry>,
}

impl SearchEvaluator {
    pub fn new(registry: Arc<SearchFunctionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SearchFunctionRegistry> {
        &self.registry
    }

    /// Open the iteration for `pattern` without consuming it.
    pub fn open(&self, pattern: &SearchPattern) -> SearchResult<SearchIteration> {
        let function = self.registry.resolve(&pattern.function)?;
        info!(
            function = %pattern.function,
            backend = function.name(),
            terms = %pattern.terms,
            constraints = %pattern.constraints,
            "search_start"
        );
        function.perform_search(&pattern.terms, &pattern.constraints)
    }

    /// Feed every matching statement to `sink` until exhaustion or until the
    /// sink returns `Break`.
    ///
    /// The iteration is closed on every exit path. When both the evaluation
    /// and the close fail, the evaluation error is returned and the close
    /// error is logged.
    pub fn evaluate<E, F>(&self, pattern: &SearchPattern, sink: F) -> Result<EvaluationSummary, E>
    where
        E: From<SearchError>,
        F: FnMut(Statement) -> Result<ControlFlow<()>, E>,
    {
        self.evaluate_limited(pattern, None, sink)
    }

    /// [`evaluate`](Self::evaluate), stopping once `limit` statements have
    /// reached the sink.
    ///
    /// The pattern is always resolved and opened, so usage errors surface
    /// even when `limit` is zero.
    pub fn evaluate_limited<E, F>(
        &self,
        pattern: &SearchPattern,
        limit: Option<usize>,
        mut sink: F,
    ) -> Result<EvaluationSummary, E>
    where
        E: From<SearchError>,
        F: FnMut(Statement) -> Result<ControlFlow<()>, E>,
    {
        let start = Instant::now();
        let mut iteration = self.open(pattern)?;

        let mut delivered = 0usize;
        let mut stopped_early = false;
        let outcome: Result<(), E> = loop {
            if limit.is_some_and(|l| delivered >= l) {
                stopped_early = true;
                break Ok(());
            }
            match iteration.has_next() {
                Ok(false) => break Ok(()),
                Ok(true) => {}
                Err(e) => break Err(e.into()),
            }
            let statement = match iteration.next_statement() {
                Ok(statement) => statement,
                Err(e) => break Err(e.into()),
            };
            delivered += 1;
            match sink(statement) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => {
                    stopped_early = true;
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        let closed = iteration.close();
        let summary = EvaluationSummary {
            backend: iteration.backend().to_string(),
            stats: iteration.stats(),
            stopped_early,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        match (outcome, closed) {
            (Err(e), Err(close_err)) => {
                warn!(function = %pattern.function, error = %close_err, "close failed after evaluation error");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Err(close_err)) => Err(close_err.into()),
            (Ok(()), Ok(())) => {
                info!(
                    function = %pattern.function,
                    backend = %summary.backend,
                    yielded = summary.stats.yielded,
                    filtered = summary.stats.filtered,
                    stopped_early,
                    elapsed_ms = summary.elapsed_ms,
                    "search_done"
                );
                Ok(summary)
            }
        }
    }

    /// Collect up to `limit` statements (all when `None`).
    pub fn collect(&self, pattern: &SearchPattern, limit: Option<usize>) -> SearchResult<Vec<Statement>> {
        let mut out = Vec::new();
        self.evaluate_limited::<SearchError, _>(pattern, limit, |statement| {
            out.push(statement);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(out)
    }

    /// Run [`collect`](Self::collect) on the blocking thread pool.
    ///
    /// The search contract is blocking; async callers use this instead of
    /// driving an iteration on a runtime worker.
    pub async fn collect_async(
        &self,
        pattern: SearchPattern,
        limit: Option<usize>,
    ) -> SearchResult<Vec<Statement>> {
        let evaluator = self.clone();
        tokio::task::spawn_blocking(move || evaluator.collect(&pattern, limit))
            .await
            .map_err(|e| SearchError::evaluation("evaluator", format!("search task failed: {e}")))?
    }
}
