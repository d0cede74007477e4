pub mod config;
pub mod model;
pub mod search;
pub mod storage;

use std::io::{BufRead, BufReader, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use tracing::info;

use config::SearchConfig;
use model::{Statement, Term};
use search::fts5::Fts5Search;
use search::function::{
    FTS_TEXT, TEMPORAL_AFTER, TEMPORAL_BEFORE, TEMPORAL_EQUALS, TEMPORAL_INSIDE_INTERVAL,
    TEMPORAL_NS,
};
use search::memory::MemoryTextSearch;
use search::query::TantivySearch;
use search::tantivy::TantivyIndex;
use search::temporal::{TemporalIndex, TemporalRelation};
use search::{
    EvaluationSummary, SearchError, SearchEvaluator, SearchFunctionRegistry, SearchPattern,
    StatementConstraints,
};
use storage::sqlite::SqliteStore;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "rdfsearch",
    version,
    about = "Full-text and temporal search over RDF statements"
)]
pub struct Cli {
    /// Override data dir (db + index). Defaults to platform data dir.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database (defaults to <data-dir>/statements.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load JSONL statements into the SQLite store and the tantivy index
    Load {
        /// One JSON statement per line
        #[arg(long)]
        input: PathBuf,

        /// Drop existing statements first
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
    /// Run a search function
    Search {
        /// Search terms; blank terms are only accepted by the tantivy backend
        terms: String,

        /// Function IRI to evaluate
        #[arg(long, default_value = FTS_TEXT)]
        function: String,

        /// Index serving the full-text function
        #[arg(long, value_enum, default_value_t = Backend::Tantivy)]
        backend: Backend,

        /// Pass terms to SQLite FTS5 unescaped (sqlite backend only)
        #[arg(long, default_value_t = false)]
        raw: bool,

        #[arg(long, value_parser = parse_term)]
        subject: Option<Term>,

        #[arg(long, value_parser = parse_term)]
        predicate: Option<Term>,

        /// Named graph
        #[arg(long, value_parser = parse_term)]
        context: Option<Term>,

        /// Stop after this many statements
        #[arg(long)]
        limit: Option<usize>,

        /// Emit JSON instead of N-Triples-style lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List registered search functions
    Functions {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

/// Index behind the full-text function.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Tantivy,
    Sqlite,
    Memory,
}

fn parse_term(s: &str) -> Result<Term, String> {
    s.parse::<Term>().map_err(|e| e.to_string())
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Load { input, replace } => {
            let config = load_config(cli.data_dir, cli.db)?;
            let loaded = load_statements(&config, &input, replace)?;
            println!(
                "Loaded {} statements into {}",
                loaded.to_string().bold(),
                config.data_dir.display()
            );
            Ok(())
        }
        Commands::Search {
            terms,
            function,
            backend,
            raw,
            subject,
            predicate,
            context,
            limit,
            json,
        } => {
            let config = load_config(cli.data_dir, cli.db)?;
            let pattern = SearchPattern::new(
                function,
                terms,
                StatementConstraints::new(subject, predicate, context),
            );
            let options = RegistryOptions {
                backend,
                raw_fts: raw,
                scan_store: backend == Backend::Memory || pattern.function.starts_with(TEMPORAL_NS),
            };
            let (statements, summary) = tokio::task::spawn_blocking(move || {
                let registry = build_registry(&config, options)?;
                run_search(&SearchEvaluator::new(Arc::new(registry)), &pattern, limit)
            })
            .await
            .context("search task panicked")??;
            print_statements(&statements, &summary, json)
        }
        Commands::Functions { json } => {
            let config = load_config(cli.data_dir, cli.db)?;
            let registry = build_registry(
                &config,
                RegistryOptions {
                    backend: Backend::Tantivy,
                    raw_fts: false,
                    scan_store: false,
                },
            )?;
            let functions = registry.functions();
            if json {
                println!("{}", serde_json::to_string_pretty(&functions)?);
            } else {
                for f in functions {
                    println!("{}  {} ({})", f.iri.bold(), f.backend, f.kind.dimmed());
                }
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "rdfsearch", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

fn load_config(data_dir: Option<PathBuf>, db: Option<PathBuf>) -> Result<SearchConfig> {
    let mut config = SearchConfig::load(data_dir).context("loading configuration")?;
    if let Some(db) = db {
        config.db_path = db;
    }
    Ok(config)
}

/// Read JSONL statements from `input` into both the SQLite store and the
/// tantivy index. Blank lines are skipped.
///
/// Both sides are opened before anything is written, and the store only
/// commits once the index has committed.
pub fn load_statements(config: &SearchConfig, input: &Path, replace: bool) -> Result<usize> {
    let file = std::fs::File::open(input)
        .with_context(|| format!("opening {}", input.display()))?;
    let mut statements = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", input.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let statement: Statement = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid statement", input.display(), idx + 1))?;
        statements.push(statement);
    }

    let mut store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening store at {}", config.db_path.display()))?;
    let mut index = TantivyIndex::open_or_create(&config.index_dir, config.writer_heap)
        .with_context(|| format!("opening index at {}", config.index_dir.display()))?;
    // The index commits inside the store transaction, so an index failure
    // leaves the store untouched. A failed store commit after the index
    // commit can still leave the two apart; `--replace` repairs that.
    let stored = store.write_statements(&statements, replace, || -> Result<()> {
        if replace {
            index.clear()?;
        }
        index.add_statements(&statements)?;
        index.commit()?;
        Ok(())
    })?;
    info!(
        input = %input.display(),
        stored,
        db = %config.db_path.display(),
        index = %config.index_dir.display(),
        "statements_loaded"
    );
    Ok(stored)
}

/// What [`build_registry`] wires up.
#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    pub backend: Backend,
    pub raw_fts: bool,
    /// Read every stored statement into the in-memory and temporal indices.
    pub scan_store: bool,
}

/// Register the full-text function for the chosen backend plus the four
/// temporal functions.
pub fn build_registry(config: &SearchConfig, options: RegistryOptions) -> Result<SearchFunctionRegistry> {
    let registry = SearchFunctionRegistry::new();

    let stored = if options.scan_store && config.db_path.exists() {
        SqliteStore::open(&config.db_path)
            .and_then(|store| store.all_statements())
            .with_context(|| format!("reading statements from {}", config.db_path.display()))?
    } else {
        Vec::new()
    };

    match options.backend {
        Backend::Tantivy => {
            let search = if config.index_dir.join("meta.json").exists() {
                TantivySearch::open(&config.index_dir, config.max_results)?
            } else {
                // Nothing loaded yet; searches see an empty index.
                TantivySearch::for_index(&TantivyIndex::create_in_ram()?, config.max_results)?
            };
            registry.register(FTS_TEXT, Arc::new(search));
        }
        Backend::Sqlite => {
            let search = Fts5Search::new(&config.db_path)
                .with_batch_size(config.batch_size)
                .with_busy_timeout(config.busy_timeout)
                .with_raw_syntax(options.raw_fts);
            registry.register(FTS_TEXT, Arc::new(search));
        }
        Backend::Memory => {
            registry.register(FTS_TEXT, Arc::new(MemoryTextSearch::new(stored.iter().cloned())));
        }
    }

    let temporal = TemporalIndex::new();
    temporal.extend(stored);
    for (iri, relation) in [
        (TEMPORAL_BEFORE, TemporalRelation::Before),
        (TEMPORAL_AFTER, TemporalRelation::After),
        (TEMPORAL_EQUALS, TemporalRelation::Equals),
        (TEMPORAL_INSIDE_INTERVAL, TemporalRelation::InsideInterval),
    ] {
        registry.register(iri, Arc::new(temporal.function(relation)));
    }
    Ok(registry)
}

/// Evaluate `pattern`, keeping at most `limit` statements.
pub fn run_search(
    evaluator: &SearchEvaluator,
    pattern: &SearchPattern,
    limit: Option<usize>,
) -> Result<(Vec<Statement>, EvaluationSummary)> {
    let mut out = Vec::new();
    let summary = evaluator
        .evaluate_limited::<SearchError, _>(pattern, limit, |statement| {
            out.push(statement);
            Ok(ControlFlow::Continue(()))
        })
        .with_context(|| format!("searching <{}> for `{}`", pattern.function, pattern.terms))?;
    Ok((out, summary))
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    backend: &'a str,
    statements: &'a [Statement],
    count: usize,
    yielded: u64,
    filtered: u64,
    stopped_early: bool,
    elapsed_ms: u64,
}

fn print_statements(
    statements: &[Statement],
    summary: &EvaluationSummary,
    json: bool,
) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        let payload = SearchOutput {
            backend: &summary.backend,
            statements,
            count: statements.len(),
            yielded: summary.stats.yielded,
            filtered: summary.stats.filtered,
            stopped_early: summary.stopped_early,
            elapsed_ms: summary.elapsed_ms,
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&payload)?)?;
        return Ok(());
    }
    for statement in statements {
        writeln!(out, "{statement}")?;
    }
    writeln!(
        out,
        "{}",
        format!(
            "{} statements via {} in {} ms",
            statements.len(),
            summary.backend,
            summary.elapsed_ms
        )
        .dimmed()
    )?;
    Ok(())
}
