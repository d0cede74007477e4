use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tantivy::schema::*;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, doc};
use tracing::debug;

use crate::model::types::{Statement, Term};

const SCHEMA_VERSION: &str = "v1";

/// Writer heap used when the caller does not pick one.
pub const DEFAULT_WRITER_HEAP: usize = 50_000_000;

#[derive(Debug, Clone, Copy)]
pub struct Fields {
    pub subject: Field,
    pub predicate: Field,
    pub object: Field,
    pub context: Field,
    pub object_text: Field,
}

pub struct TantivyIndex {
    pub index: Index,
    writer: IndexWriter,
    pub fields: Fields,
    pending: usize,
}

impl TantivyIndex {
    pub fn open_or_create(path: &Path, writer_heap: usize) -> Result<Self> {
        let schema = build_schema();
        std::fs::create_dir_all(path)?;
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            Index::create_in_dir(path, schema.clone())?
        };
        Self::with_index(index, writer_heap)
    }

    /// Index that lives only as long as this value.
    pub fn create_in_ram() -> Result<Self> {
        Self::with_index(Index::create_in_ram(build_schema()), DEFAULT_WRITER_HEAP)
    }

    fn with_index(index: Index, writer_heap: usize) -> Result<Self> {
        let writer = index
            .writer_with_num_threads(1, writer_heap)
            .with_context(|| "create index writer")?;
        let fields = fields_from_schema(&index.schema())?;
        Ok(Self {
            index,
            writer,
            fields,
            pending: 0,
        })
    }

    pub fn add_statement(&mut self, statement: &Statement) -> Result<()> {
        let mut d = doc! {
            self.fields.subject => statement.subject.index_key(),
            self.fields.predicate => statement.predicate.index_key(),
            self.fields.object => statement.object.index_key(),
            self.fields.object_text => statement.object.lexical_form().to_string(),
        };
        if let Some(context) = &statement.context {
            d.add_text(self.fields.context, context.index_key());
        }
        self.writer.add_document(d)?;
        self.pending += 1;
        Ok(())
    }

    pub fn add_statements<'a>(
        &mut self,
        statements: impl IntoIterator<Item = &'a Statement>,
    ) -> Result<usize> {
        let mut added = 0;
        for statement in statements {
            self.add_statement(statement)?;
            added += 1;
        }
        Ok(added)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.writer.commit()?;
        debug!(docs = self.pending, "tantivy commit");
        self.pending = 0;
        Ok(())
    }

    /// Remove every document; takes effect on the next commit.
    pub fn clear(&mut self) -> Result<()> {
        self.writer.delete_all_documents()?;
        Ok(())
    }

    pub fn reader(&self) -> Result<IndexReader> {
        Ok(self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?)
    }
}

/// Open an existing on-disk index for searching only; takes no writer lock.
pub fn open_reader(path: &Path) -> Result<(IndexReader, Fields)> {
    let index = Index::open_in_dir(path)
        .with_context(|| format!("open tantivy index at {}", path.display()))?;
    let fields = fields_from_schema(&index.schema())?;
    let reader = index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()?;
    Ok((reader, fields))
}

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    // Term keys are matched exactly, so they are indexed untokenized.
    schema_builder.add_text_field("subject", STRING | STORED);
    schema_builder.add_text_field("predicate", STRING | STORED);
    schema_builder.add_text_field("object", STRING | STORED);
    schema_builder.add_text_field("context", STRING | STORED);
    schema_builder.add_text_field("object_text", TEXT);
    schema_builder.build()
}

pub fn fields_from_schema(schema: &Schema) -> Result<Fields> {
    let field = |name: &str| {
        schema
            .get_field(name)
            .with_context(|| format!("schema missing {name}"))
    };
    Ok(Fields {
        subject: field("subject")?,
        predicate: field("predicate")?,
        object: field("object")?,
        context: field("context")?,
        object_text: field("object_text")?,
    })
}

/// Rebuild the statement stored in `doc`.
pub fn statement_from_doc(doc: &TantivyDocument, fields: &Fields) -> Result<Statement> {
    let key = |field: Field, name: &str| -> Result<Option<Term>> {
        doc.get_first(field)
            .and_then(|v| v.as_str())
            .map(|s| Term::from_index_key(s).with_context(|| format!("decode stored {name}")))
            .transpose()
    };
    let required = |field: Field, name: &str| -> Result<Term> {
        key(field, name)?.with_context(|| format!("document missing {name}"))
    };
    Ok(Statement {
        subject: required(fields.subject, "subject")?,
        predicate: required(fields.predicate, "predicate")?,
        object: required(fields.object, "object")?,
        context: key(fields.context, "context")?,
    })
}

/// Versioned index location under `base`, without touching the filesystem.
pub fn index_path(base: &Path) -> PathBuf {
    base.join("index").join(SCHEMA_VERSION)
}

pub fn index_dir(base: &Path) -> Result<PathBuf> {
    let dir = index_path(base);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
