//! Search layer facade.
//!
//! The contract lives in [`function`], [`iteration`], [`constraints`] and
//! [`error`]; everything else is an adapter or glue around it:
//!
//! - **[`memory`]**: In-memory token matching over object lexical forms.
//! - **[`fts5`]**: SQLite FTS5 search with one connection per iteration.
//! - **[`tantivy`]**: Tantivy schema, index creation, and document indexing.
//! - **[`query`]**: Tantivy-backed search function.
//! - **[`temporal`]**: `xsd:dateTime` before/after/equals/inside searches.
//! - **[`registry`]**: Function IRI to implementation lookup.
//! - **[`evaluator`]**: Drives a search fragment and always closes it.

pub mod constraints;
pub mod error;
pub mod evaluator;
pub mod fts5;
pub mod function;
pub mod iteration;
pub mod memory;
pub mod query;
pub mod registry;
pub mod tantivy;
pub mod temporal;

pub use constraints::StatementConstraints;
pub use error::{SearchError, SearchResult};
pub use evaluator::{EvaluationSummary, SearchEvaluator, SearchPattern};
pub use function::{EmptyTermsPolicy, FunctionKind, SearchFunction};
pub use iteration::{IterationState, IterationStats, SearchCursor, SearchIteration};
pub use registry::SearchFunctionRegistry;
