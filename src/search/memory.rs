//! In-memory full-text search over object lexical forms.
//!
//! A statement matches when every whitespace-separated term, lowercased,
//! occurs as a token of the object's lexical form. Results come back in
//! insertion order. Terms with no tokens at all are rejected. No constraint
//! pushdown: the iteration's filter applies the structural constraints.

use std::sync::Arc;

use parking_lot::RwLock;

use super::constraints::StatementConstraints;
use super::error::{SearchError, SearchResult};
use super::function::{EmptyTermsPolicy, FunctionKind, SearchFunction};
use super::iteration::{SearchCursor, SearchIteration};
use crate::model::types::Statement;

const BACKEND: &str = "memory";

#[derive(Debug, Clone)]
struct IndexedStatement {
    statement: Statement,
    tokens: Vec<String>,
}

/// Shared, appendable in-memory text index.
#[derive(Debug, Clone, Default)]
pub struct MemoryTextSearch {
    entries: Arc<RwLock<Vec<IndexedStatement>>>,
}

impl MemoryTextSearch {
    pub fn new(statements: impl IntoIterator<Item = Statement>) -> Self {
        let index = Self::default();
        index.extend(statements);
        index
    }

    pub fn insert(&self, statement: Statement) {
        let tokens = tokenize(statement.object.lexical_form());
        self.entries.write().push(IndexedStatement { statement, tokens });
    }

    pub fn extend(&self, statements: impl IntoIterator<Item = Statement>) {
        let mut entries = self.entries.write();
        for statement in statements {
            let tokens = tokenize(statement.object.lexical_form());
            entries.push(IndexedStatement { statement, tokens });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Lowercased alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl SearchFunction for MemoryTextSearch {
    fn name(&self) -> &str {
        BACKEND
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::FullText
    }

    fn perform_search(
        &self,
        search_terms: &str,
        constraints: &StatementConstraints,
    ) -> SearchResult<SearchIteration> {
        self.empty_terms_policy().check(search_terms)?;
        let terms = tokenize(search_terms);
        if terms.is_empty() {
            return Err(SearchError::InvalidTerms(format!(
                "no searchable tokens in {search_terms:?}"
            )));
        }
        let cursor = MemoryCursor {
            entries: self.entries.clone(),
            terms,
            position: 0,
        };
        Ok(SearchIteration::new(
            BACKEND,
            Box::new(cursor),
            constraints.clone(),
        ))
    }

    fn empty_terms_policy(&self) -> EmptyTermsPolicy {
        EmptyTermsPolicy::Reject
    }
}

/// Scans the shared entries lazily; statements appended while the cursor is
/// open become visible to it.
struct MemoryCursor {
    entries: Arc<RwLock<Vec<IndexedStatement>>>,
    terms: Vec<String>,
    position: usize,
}

impl SearchCursor for MemoryCursor {
    fn advance(&mut self) -> SearchResult<Option<Statement>> {
        let entries = self.entries.read();
        while let Some(entry) = entries.get(self.position) {
            self.position += 1;
            if self.terms.iter().all(|t| entry.tokens.contains(t)) {
                return Ok(Some(entry.statement.clone()));
            }
        }
        Ok(None)
    }

    fn release(&mut self) -> SearchResult<()> {
        self.terms.clear();
        Ok(())
    }
}
