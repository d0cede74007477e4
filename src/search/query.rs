//! Tantivy-backed full-text search function.
//!
//! The terms go through tantivy's query parser over the object text with
//! conjunction as the default operator. Constraints become exact `TermQuery`
//! clauses on the stored term keys, so the iteration's own filter never has
//! anything to drop. Hits come back best score first, capped at
//! `max_results`; documents are loaded from the searcher one pull at a time.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::Result;
use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Term as IndexTerm};
use tantivy::{DocAddress, IndexReader, Searcher, TantivyDocument};
use tracing::debug;

use super::constraints::StatementConstraints;
use super::error::{SearchError, SearchResult};
use super::function::{EmptyTermsPolicy, FunctionKind, SearchFunction};
use super::iteration::{SearchCursor, SearchIteration};
use crate::model::types::{Statement, Term};
use crate::search::tantivy::{Fields, TantivyIndex, open_reader, statement_from_doc};

const BACKEND: &str = "tantivy";

pub struct TantivySearch {
    reader: IndexReader,
    fields: Fields,
    max_results: usize,
}

impl TantivySearch {
    pub fn new(reader: IndexReader, fields: Fields, max_results: usize) -> Self {
        Self {
            reader,
            fields,
            max_results: max_results.max(1),
        }
    }

    /// Search an on-disk index without taking its writer lock.
    pub fn open(index_path: &Path, max_results: usize) -> Result<Self> {
        let (reader, fields) = open_reader(index_path)?;
        Ok(Self::new(reader, fields, max_results))
    }

    pub fn for_index(index: &TantivyIndex, max_results: usize) -> Result<Self> {
        Ok(Self::new(index.reader()?, index.fields, max_results))
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    fn build_query(
        &self,
        searcher: &Searcher,
        search_terms: &str,
        match_all: bool,
        constraints: &StatementConstraints,
    ) -> SearchResult<Box<dyn Query>> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        if match_all {
            clauses.push((Occur::Must, Box::new(AllQuery)));
        } else {
            let mut parser = QueryParser::for_index(searcher.index(), vec![self.fields.object_text]);
            parser.set_conjunction_by_default();
            let parsed = parser
                .parse_query(search_terms)
                .map_err(|e| SearchError::evaluation(BACKEND, format!("parsing `{search_terms}`: {e}")))?;
            clauses.push((Occur::Must, parsed));
        }

        let exact = |field: Field, term: &Term| -> (Occur, Box<dyn Query>) {
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    IndexTerm::from_field_text(field, &term.index_key()),
                    IndexRecordOption::Basic,
                )),
            )
        };
        if let Some(subject) = constraints.subject() {
            clauses.push(exact(self.fields.subject, subject));
        }
        if let Some(predicate) = constraints.predicate() {
            clauses.push(exact(self.fields.predicate, predicate));
        }
        if let Some(context) = constraints.context() {
            clauses.push(exact(self.fields.context, context));
        }

        Ok(if clauses.len() == 1 {
            clauses.pop().map(|(_, q)| q).unwrap_or_else(|| Box::new(AllQuery))
        } else {
            Box::new(BooleanQuery::new(clauses))
        })
    }
}

impl SearchFunction for TantivySearch {
    fn name(&self) -> &str {
        BACKEND
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::FullText
    }

    fn empty_terms_policy(&self) -> EmptyTermsPolicy {
        EmptyTermsPolicy::MatchAll
    }

    fn perform_search(
        &self,
        search_terms: &str,
        constraints: &StatementConstraints,
    ) -> SearchResult<SearchIteration> {
        let match_all = self.empty_terms_policy().check(search_terms)?;
        self.reader
            .reload()
            .map_err(|e| SearchError::evaluation(BACKEND, e))?;
        let searcher = self.reader.searcher();
        let query = self.build_query(&searcher, search_terms, match_all, constraints)?;
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(self.max_results).order_by_score())
            .map_err(|e| SearchError::evaluation(BACKEND, e))?;
        debug!(
            backend = BACKEND,
            hits = top_docs.len(),
            max_results = self.max_results,
            match_all,
            "tantivy_search_opened"
        );

        let cursor = TantivyCursor {
            searcher: Some(searcher),
            fields: self.fields,
            hits: top_docs.into_iter().map(|(_, addr)| addr).collect(),
        };
        Ok(SearchIteration::new(
            BACKEND,
            Box::new(cursor),
            constraints.clone(),
        ))
    }
}

/// Holds the searcher (and with it the segment readers) until released.
struct TantivyCursor {
    searcher: Option<Searcher>,
    fields: Fields,
    hits: VecDeque<DocAddress>,
}

impl SearchCursor for TantivyCursor {
    fn advance(&mut self) -> SearchResult<Option<Statement>> {
        let Some(searcher) = self.searcher.as_ref() else {
            return Ok(None);
        };
        let Some(addr) = self.hits.pop_front() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher
            .doc(addr)
            .map_err(|e| SearchError::evaluation(BACKEND, e))?;
        statement_from_doc(&doc, &self.fields)
            .map(Some)
            .map_err(|e| SearchError::evaluation(BACKEND, format!("{e:#}")))
    }

    fn release(&mut self) -> SearchResult<()> {
        self.hits.clear();
        self.searcher = None;
        Ok(())
    }
}
