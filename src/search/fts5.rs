//! SQLite FTS5 search function.
//!
//! Every iteration opens its own query-only connection to the statement
//! database; that connection is the resource released on close. Results are
//! fetched in rowid-keyset pages of `batch_size`, so an abandoned iteration
//! never materializes the whole result set. Structural constraints are
//! pushed into the SQL.
//!
//! By default each whitespace-separated term is quoted, which makes the
//! search an implicit AND of literal tokens. With raw syntax enabled the
//! terms go to `MATCH` unchanged and FTS5 operators (`OR`, `NEAR`, `prefix*`)
//! are available; malformed expressions then fail as evaluation errors.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, ToSql};
use tracing::debug;

use super::constraints::StatementConstraints;
use super::error::{SearchError, SearchResult};
use super::function::{EmptyTermsPolicy, FunctionKind, SearchFunction};
use super::iteration::{SearchCursor, SearchIteration};
use crate::model::types::Statement;
use crate::storage::sqlite::{RawRow, open_query_connection};

const BACKEND: &str = "sqlite-fts5";

/// Escape a query string for safe use with FTS5 MATCH.
///
/// Each term is wrapped in double quotes, with internal double quotes
/// doubled.
///
/// ```
/// use rdf_search::search::fts5::escape_fts5_query;
///
/// assert_eq!(escape_fts5_query("hello world"), r#""hello" "world""#);
/// assert_eq!(escape_fts5_query("foo\"bar"), r#""foo""bar""#);
/// ```
pub fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full-text search over a [`SqliteStore`](crate::storage::sqlite::SqliteStore)
/// database.
#[derive(Debug, Clone)]
pub struct Fts5Search {
    db_path: PathBuf,
    batch_size: usize,
    busy_timeout: Duration,
    raw_syntax: bool,
}

impl Fts5Search {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            batch_size: 256,
            busy_timeout: Duration::from_secs(5),
            raw_syntax: false,
        }
    }

    /// Rows fetched per page; at least 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Upper bound on waiting for a locked database, which also bounds
    /// release time.
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Pass terms to FTS5 unescaped.
    pub fn with_raw_syntax(mut self, raw_syntax: bool) -> Self {
        self.raw_syntax = raw_syntax;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl SearchFunction for Fts5Search {
    fn name(&self) -> &str {
        BACKEND
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::FullText
    }

    fn empty_terms_policy(&self) -> EmptyTermsPolicy {
        EmptyTermsPolicy::Reject
    }

    fn perform_search(
        &self,
        search_terms: &str,
        constraints: &StatementConstraints,
    ) -> SearchResult<SearchIteration> {
        self.empty_terms_policy().check(search_terms)?;
        let match_expr = if self.raw_syntax {
            search_terms.trim().to_string()
        } else {
            escape_fts5_query(search_terms)
        };

        let conn = open_query_connection(&self.db_path, self.busy_timeout)
            .map_err(|e| SearchError::evaluation(BACKEND, e))?;

        let mut cursor = Fts5Cursor::new(conn, match_expr, constraints, self.batch_size);
        // Fetch the first page eagerly so rejected MATCH syntax fails here
        // rather than on the first pull.
        if let Err(e) = cursor.fetch_page() {
            let _ = cursor.release();
            return Err(e);
        }
        debug!(
            backend = BACKEND,
            first_page = cursor.page.len(),
            "fts5_search_opened"
        );
        Ok(SearchIteration::new(
            BACKEND,
            Box::new(cursor),
            constraints.clone(),
        ))
    }
}

struct Fts5Cursor {
    conn: Option<Connection>,
    sql: String,
    match_expr: String,
    constraint_keys: Vec<String>,
    batch_size: i64,
    last_id: i64,
    page: VecDeque<Statement>,
    done: bool,
}

impl Fts5Cursor {
    fn new(
        conn: Connection,
        match_expr: String,
        constraints: &StatementConstraints,
        batch_size: usize,
    ) -> Self {
        let mut sql = String::from(
            "SELECT s.id, s.subject, s.predicate, s.object, s.context
             FROM statements_fts JOIN statements s ON s.id = statements_fts.rowid
             WHERE statements_fts MATCH ?1 AND s.id > ?2",
        );
        let mut constraint_keys = Vec::new();
        for (column, term) in [
            ("subject", constraints.subject()),
            ("predicate", constraints.predicate()),
            ("context", constraints.context()),
        ] {
            if let Some(term) = term {
                constraint_keys.push(term.index_key());
                sql.push_str(&format!(" AND s.{column} = ?{}", constraint_keys.len() + 2));
            }
        }
        sql.push_str(&format!(" ORDER BY s.id LIMIT ?{}", constraint_keys.len() + 3));

        Self {
            conn: Some(conn),
            sql,
            match_expr,
            constraint_keys,
            batch_size: batch_size as i64,
            last_id: 0,
            page: VecDeque::new(),
            done: false,
        }
    }

    fn fetch_page(&mut self) -> SearchResult<()> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| SearchError::evaluation(BACKEND, "connection already released"))?;

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(self.constraint_keys.len() + 3);
        params.push(&self.match_expr);
        params.push(&self.last_id);
        for key in &self.constraint_keys {
            params.push(key);
        }
        params.push(&self.batch_size);

        let rows: Vec<RawRow> = {
            let mut stmt = conn
                .prepare_cached(&self.sql)
                .map_err(|e| SearchError::evaluation(BACKEND, e))?;
            let mapped = stmt
                .query_map(params.as_slice(), RawRow::from_row)
                .map_err(|e| SearchError::evaluation(BACKEND, e))?;
            mapped
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| SearchError::evaluation(BACKEND, e))?
        };

        if (rows.len() as i64) < self.batch_size {
            self.done = true;
        }
        for row in rows {
            self.last_id = row.id;
            let statement = row
                .decode()
                .map_err(|e| SearchError::evaluation(BACKEND, e))?;
            self.page.push_back(statement);
        }
        Ok(())
    }
}

impl SearchCursor for Fts5Cursor {
    fn advance(&mut self) -> SearchResult<Option<Statement>> {
        if self.page.is_empty() && !self.done {
            self.fetch_page()?;
        }
        Ok(self.page.pop_front())
    }

    fn release(&mut self) -> SearchResult<()> {
        self.page.clear();
        self.done = true;
        match self.conn.take() {
            Some(conn) => {
                conn.flush_prepared_statement_cache();
                conn.close().map_err(|(_, e)| {
                    SearchError::evaluation(BACKEND, format!("closing connection: {e}"))
                })?;
                debug!(backend = BACKEND, last_id = self.last_id, "fts5_connection_closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
