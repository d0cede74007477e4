//! RDF data model consumed by the search layer.

pub mod types;

pub use types::{Statement, Term, TermParseError};
