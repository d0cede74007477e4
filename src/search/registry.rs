//! Registry of search functions keyed by function IRI.
//!
//! The query evaluator resolves the IRI found in a query fragment to the
//! [`SearchFunction`] that serves it. New index technologies plug in by
//! registering here; the evaluator itself never changes.
//!
//! # Example
//!
//! ```ignore
//! let registry = SearchFunctionRegistry::new();
//! registry.register(FTS_TEXT, Arc::new(MemoryTextSearch::new(statements)));
//!
//! let function = registry.resolve(FTS_TEXT)?;
//! let iteration = function.perform_search("foo", &StatementConstraints::none())?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::error::{SearchError, SearchResult};
use super::function::{FunctionKind, SearchFunction};

/// Summary of a registered function for listings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegisteredFunction {
    /// Function IRI the evaluator matches on.
    pub iri: String,
    /// Backend name reported by the function.
    pub backend: String,
    pub kind: &'static str,
}

/// Thread-safe map from function IRI to implementation.
#[derive(Default)]
pub struct SearchFunctionRegistry {
    functions: RwLock<HashMap<String, Arc<dyn SearchFunction>>>,
}

impl SearchFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `iri`, returning the function it replaced.
    pub fn register(
        &self,
        iri: impl Into<String>,
        function: Arc<dyn SearchFunction>,
    ) -> Option<Arc<dyn SearchFunction>> {
        let iri = iri.into();
        info!(
            function = %iri,
            backend = function.name(),
            kind = function.kind().as_str(),
            "search_function_registered"
        );
        self.functions.write().insert(iri, function)
    }

    pub fn unregister(&self, iri: &str) -> Option<Arc<dyn SearchFunction>> {
        self.functions.write().remove(iri)
    }

    pub fn get(&self, iri: &str) -> Option<Arc<dyn SearchFunction>> {
        self.functions.read().get(iri).cloned()
    }

    pub fn contains(&self, iri: &str) -> bool {
        self.functions.read().contains_key(iri)
    }

    /// Like [`get`](Self::get) but fails with
    /// [`SearchError::UnknownFunction`].
    pub fn resolve(&self, iri: &str) -> SearchResult<Arc<dyn SearchFunction>> {
        self.get(iri)
            .ok_or_else(|| SearchError::UnknownFunction(iri.to_string()))
    }

    /// Registered functions sorted by IRI.
    pub fn functions(&self) -> Vec<RegisteredFunction> {
        let mut out: Vec<RegisteredFunction> = self
            .functions
            .read()
            .iter()
            .map(|(iri, f)| RegisteredFunction {
                iri: iri.clone(),
                backend: f.name().to_string(),
                kind: f.kind().as_str(),
            })
            .collect();
        out.sort_by(|a, b| a.iri.cmp(&b.iri));
        out
    }

    /// IRIs of every function of the given kind, sorted.
    pub fn by_kind(&self, kind: FunctionKind) -> Vec<String> {
        let mut out: Vec<String> = self
            .functions
            .read()
            .iter()
            .filter(|(_, f)| f.kind() == kind)
            .map(|(iri, _)| iri.clone())
            .collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}

impl std::fmt::Debug for SearchFunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchFunctionRegistry")
            .field("functions", &self.functions())
            .finish()
    }
}
