use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rdf_search::model::{Statement, Term};
use rdf_search::search::{
    FunctionKind, SearchCursor, SearchError, SearchFunction, SearchIteration, SearchResult,
    StatementConstraints,
};

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub fn iri(local: &str) -> Term {
    Term::iri(format!("http://example.org/{local}"))
}

/// The three-statement dataset: "foo" matches o1 and o3, not o2.
#[allow(dead_code)]
pub fn scenario_statements() -> Vec<Statement> {
    vec![
        Statement::in_context(iri("s1"), iri("p1"), Term::literal("foo one"), iri("g1")),
        Statement::in_context(iri("s2"), iri("p1"), Term::literal("bar two"), iri("g1")),
        Statement::in_context(iri("s1"), iri("p2"), Term::literal("foo three"), iri("g2")),
    ]
}

/// Shared counters of a [`ScriptedSearch`], observable after the iteration
/// has been handed out.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub pulls: AtomicUsize,
    pub releases: AtomicUsize,
}

#[allow(dead_code)]
impl CallCounts {
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Fake backend replaying a fixed script. Ignores terms and constraints, so
/// every filtering decision is the iteration's own.
#[allow(dead_code)]
pub struct ScriptedSearch {
    pub statements: Vec<Statement>,
    /// 1-based pull number that fails with a connectivity fault.
    pub fail_on_pull: Option<usize>,
    pub fail_release: bool,
    pub counts: Arc<CallCounts>,
}

#[allow(dead_code)]
impl ScriptedSearch {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            statements,
            fail_on_pull: None,
            fail_release: false,
            counts: Arc::new(CallCounts::default()),
        }
    }

    pub fn failing_on_pull(mut self, pull: usize) -> Self {
        self.fail_on_pull = Some(pull);
        self
    }

    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }
}

impl SearchFunction for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted"
    }

    fn kind(&self) -> FunctionKind {
        FunctionKind::Other
    }

    fn perform_search(
        &self,
        _search_terms: &str,
        constraints: &StatementConstraints,
    ) -> SearchResult<SearchIteration> {
        let cursor = ScriptedCursor {
            remaining: self.statements.iter().cloned().collect(),
            fail_on_pull: self.fail_on_pull,
            fail_release: self.fail_release,
            counts: self.counts.clone(),
        };
        Ok(SearchIteration::new(
            "scripted",
            Box::new(cursor),
            constraints.clone(),
        ))
    }
}

struct ScriptedCursor {
    remaining: VecDeque<Statement>,
    fail_on_pull: Option<usize>,
    fail_release: bool,
    counts: Arc<CallCounts>,
}

impl SearchCursor for ScriptedCursor {
    fn advance(&mut self) -> SearchResult<Option<Statement>> {
        let pull = self.counts.pulls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_pull == Some(pull) {
            return Err(SearchError::evaluation("scripted", "connection reset by peer"));
        }
        Ok(self.remaining.pop_front())
    }

    fn release(&mut self) -> SearchResult<()> {
        self.counts.releases.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(SearchError::evaluation("scripted", "release timed out"));
        }
        Ok(())
    }
}
