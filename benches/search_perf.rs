use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rdf_search::model::{Statement, Term};
use rdf_search::search::fts5::Fts5Search;
use rdf_search::search::memory::MemoryTextSearch;
use rdf_search::search::query::TantivySearch;
use rdf_search::search::tantivy::TantivyIndex;
use rdf_search::search::{SearchFunction, StatementConstraints};
use rdf_search::storage::sqlite::SqliteStore;
use std::hint::black_box;
use tempfile::TempDir;

const WORDS: &[&str] = &[
    "rust", "graph", "triple", "search", "index", "query", "literal", "context",
];

fn corpus(n: usize) -> Vec<Statement> {
    (0..n)
        .map(|i| {
            let text = format!(
                "{} {} {} statement {i}",
                WORDS[i % WORDS.len()],
                WORDS[(i / 3) % WORDS.len()],
                WORDS[(i / 7) % WORDS.len()]
            );
            Statement::in_context(
                Term::iri(format!("http://example.org/s{}", i % 100)),
                Term::iri(format!("http://example.org/p{}", i % 5)),
                Term::literal(text),
                Term::iri(format!("http://example.org/g{}", i % 3)),
            )
        })
        .collect()
}

// =============================================================================
// Full drain per backend
// =============================================================================

fn bench_drain_backends(c: &mut Criterion) {
    let statements = corpus(5_000);
    let tmp = TempDir::new().expect("tempdir");
    let db = tmp.path().join("bench.db");
    SqliteStore::open(&db)
        .and_then(|mut store| store.insert_statements(&statements))
        .expect("sqlite store");
    let mut index = TantivyIndex::create_in_ram().expect("tantivy index");
    index.add_statements(&statements).expect("index statements");
    index.commit().expect("commit");

    let backends: Vec<(&str, Box<dyn SearchFunction>)> = vec![
        ("memory", Box::new(MemoryTextSearch::new(statements.clone()))),
        ("sqlite-fts5", Box::new(Fts5Search::new(&db))),
        (
            "tantivy",
            Box::new(TantivySearch::for_index(&index, 10_000).expect("tantivy search")),
        ),
    ];

    let mut group = c.benchmark_group("drain_rust_graph");
    for (name, backend) in &backends {
        group.bench_with_input(BenchmarkId::from_parameter(name), backend, |b, backend| {
            b.iter(|| {
                let out = backend
                    .perform_search("rust graph", &StatementConstraints::none())
                    .and_then(|it| it.collect_all())
                    .expect("search");
                black_box(out.len())
            })
        });
    }
    group.finish();
}

// =============================================================================
// First result latency (open, pull one, close)
// =============================================================================

fn bench_first_result(c: &mut Criterion) {
    let statements = corpus(5_000);
    let tmp = TempDir::new().expect("tempdir");
    let db = tmp.path().join("bench.db");
    SqliteStore::open(&db)
        .and_then(|mut store| store.insert_statements(&statements))
        .expect("sqlite store");
    let search = Fts5Search::new(&db).with_batch_size(64);
    let constraints =
        StatementConstraints::none().with_predicate(Term::iri("http://example.org/p2"));

    c.bench_function("fts5_first_result_constrained", |b| {
        b.iter(|| {
            let mut it = search
                .perform_search("search", &constraints)
                .expect("search");
            let first = it.next_statement().ok();
            it.close().expect("close");
            black_box(first)
        })
    });
}

criterion_group!(benches, bench_drain_backends, bench_first_result);
criterion_main!(benches);
