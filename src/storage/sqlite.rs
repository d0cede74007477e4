//! `SQLite` statement store: schema, pragmas, and migrations.
//!
//! Statements live in `statements` with each term stored as its
//! [`Term::index_key`]. `statements_fts` is an external-content FTS5 table
//! over the object's lexical form, keyed by the statement rowid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::types::{Statement, Term};

/// Public schema version constant for external checks.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Store-level failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database not found at {0}")]
    NotFound(PathBuf),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt term encoding in row {row}: {reason}")]
    CorruptTerm { row: i64, reason: String },

    #[error("Schema version {found} is newer than supported version {supported}")]
    FutureSchema { found: i64, supported: i64 },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS statements (
    id INTEGER PRIMARY KEY,
    subject TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object TEXT NOT NULL,
    context TEXT,
    object_text TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_statements_subject ON statements(subject);
CREATE INDEX IF NOT EXISTS idx_statements_predicate ON statements(predicate);
CREATE INDEX IF NOT EXISTS idx_statements_context ON statements(context);
CREATE VIRTUAL TABLE IF NOT EXISTS statements_fts USING fts5(
    object_text,
    content='statements',
    content_rowid='id',
    tokenize='unicode61'
);
";

const CLEAR_SQL: &str = "DELETE FROM statements;
     INSERT INTO statements_fts(statements_fts) VALUES('rebuild');";

/// Read/write handle on the statement database.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open or create the database at `path`, applying migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        apply_pragmas(&conn, Duration::from_secs(5))?;
        init_meta(&conn)?;
        migrate(&mut conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn raw(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> StoreResult<i64> {
        read_schema_version(&self.conn)?.ok_or_else(|| {
            StoreError::Database(rusqlite::Error::QueryReturnedNoRows)
        })
    }

    /// Insert statements in one transaction, returning how many were added.
    pub fn insert_statements<'a>(
        &mut self,
        statements: impl IntoIterator<Item = &'a Statement>,
    ) -> StoreResult<usize> {
        self.write_statements(statements, false, || Ok::<_, StoreError>(()))
    }

    /// Insert statements, first dropping existing ones when `replace` is
    /// set, all in one transaction.
    ///
    /// `before_commit` runs after the rows are written but before they are
    /// committed; if it fails the transaction rolls back and nothing,
    /// including the `replace` delete, becomes visible.
    pub fn write_statements<'a, E, F>(
        &mut self,
        statements: impl IntoIterator<Item = &'a Statement>,
        replace: bool,
        before_commit: F,
    ) -> Result<usize, E>
    where
        E: From<StoreError>,
        F: FnOnce() -> Result<(), E>,
    {
        let tx = self.conn.transaction().map_err(StoreError::from)?;
        if replace {
            tx.execute_batch(CLEAR_SQL).map_err(StoreError::from)?;
        }
        let mut inserted = 0;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO statements(subject, predicate, object, context, object_text)
                     VALUES(?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(StoreError::from)?;
            let mut insert_fts = tx
                .prepare("INSERT INTO statements_fts(rowid, object_text) VALUES(?1, ?2)")
                .map_err(StoreError::from)?;
            for statement in statements {
                let object_text = statement.object.lexical_form();
                let id = insert
                    .insert(params![
                        statement.subject.index_key(),
                        statement.predicate.index_key(),
                        statement.object.index_key(),
                        statement.context.as_ref().map(Term::index_key),
                        object_text,
                    ])
                    .map_err(StoreError::from)?;
                insert_fts
                    .execute(params![id, object_text])
                    .map_err(StoreError::from)?;
                inserted += 1;
            }
        }
        before_commit()?;
        tx.commit().map_err(StoreError::from)?;
        info!(path = %self.path.display(), inserted, replace, "statements stored");
        Ok(inserted)
    }

    pub fn count(&self) -> StoreResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM statements", [], |r| r.get(0))?)
    }

    /// Every stored statement in insertion order.
    pub fn all_statements(&self) -> StoreResult<Vec<Statement>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, subject, predicate, object, context FROM statements ORDER BY id")?;
        let rows = stmt.query_map([], RawRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.decode()?);
        }
        Ok(out)
    }

    /// Drop every statement and its full-text entry.
    pub fn clear(&mut self) -> StoreResult<()> {
        self.conn.execute_batch(CLEAR_SQL)?;
        Ok(())
    }
}

/// Undecoded statement row: `(id, subject, predicate, object, context)`.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub id: i64,
    subject: String,
    predicate: String,
    object: String,
    context: Option<String>,
}

impl RawRow {
    /// Read columns 0..=4 as id, subject, predicate, object, context.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            predicate: row.get(2)?,
            object: row.get(3)?,
            context: row.get(4)?,
        })
    }

    pub fn decode(self) -> StoreResult<Statement> {
        let id = self.id;
        let term = |key: &str| {
            Term::from_index_key(key).map_err(|e| StoreError::CorruptTerm {
                row: id,
                reason: e.to_string(),
            })
        };
        Ok(Statement {
            subject: term(&self.subject)?,
            predicate: term(&self.predicate)?,
            object: term(&self.object)?,
            context: self.context.as_deref().map(term).transpose()?,
        })
    }
}

/// Open a query-only connection for one search cursor.
///
/// The database must already exist.
pub fn open_query_connection(path: &Path, busy_timeout: Duration) -> StoreResult<Connection> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    apply_pragmas(&conn, busy_timeout)?;
    conn.execute_batch("PRAGMA query_only = ON;")?;
    debug!(path = %path.display(), "opened query connection");
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> StoreResult<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        r"
        PRAGMA temp_store = MEMORY;
        PRAGMA cache_size = -16384; -- 16MB
        ",
    )?;
    Ok(())
}

fn read_schema_version(conn: &Connection) -> StoreResult<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
        )
        .optional()?)
}

fn init_meta(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;
    if read_schema_version(conn)?.is_none() {
        // Start at version 0 so migrate() applies the full schema on first open.
        conn.execute(
            "INSERT INTO meta(key, value) VALUES('schema_version', '0')",
            [],
        )?;
    }
    Ok(())
}

fn migrate(conn: &mut Connection) -> StoreResult<()> {
    let current = read_schema_version(conn)?.unwrap_or(0);
    if current == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }
    if current > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::FutureSchema {
            found: current,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_V1)?;
    tx.execute(
        "UPDATE meta SET value = ?1 WHERE key = 'schema_version'",
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    tx.commit()?;
    info!(from = current, to = CURRENT_SCHEMA_VERSION, "sqlite schema migrated");
    Ok(())
}
