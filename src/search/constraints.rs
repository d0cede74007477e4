//! Structural restrictions on the statements a search may return.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::types::{Statement, Term};

/// Optional subject / predicate / context restrictions.
///
/// An unset field accepts any value on that dimension; a set field requires
/// exact term equality. The object is never constrained here: it is the
/// dimension the search terms address.
///
/// Values are immutable once built and cheap to share between concurrent
/// searches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementConstraints {
    subject: Option<Term>,
    predicate: Option<Term>,
    context: Option<Term>,
}

impl StatementConstraints {
    /// No structural filtering.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(subject: Option<Term>, predicate: Option<Term>, context: Option<Term>) -> Self {
        Self {
            subject,
            predicate,
            context,
        }
    }

    pub fn with_subject(mut self, subject: Term) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_predicate(mut self, predicate: Term) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_context(mut self, context: Term) -> Self {
        self.context = Some(context);
        self
    }

    pub fn subject(&self) -> Option<&Term> {
        self.subject.as_ref()
    }

    pub fn predicate(&self) -> Option<&Term> {
        self.predicate.as_ref()
    }

    pub fn context(&self) -> Option<&Term> {
        self.context.as_ref()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.subject.is_none() && self.predicate.is_none() && self.context.is_none()
    }

    /// Whether `statement` satisfies every set field.
    ///
    /// A set context never matches a statement in the default graph.
    pub fn matches(&self, statement: &Statement) -> bool {
        self.subject
            .as_ref()
            .is_none_or(|s| *s == statement.subject)
            && self
                .predicate
                .as_ref()
                .is_none_or(|p| *p == statement.predicate)
            && self
                .context
                .as_ref()
                .is_none_or(|c| statement.context.as_ref() == Some(c))
    }
}

impl fmt::Display for StatementConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn slot(term: Option<&Term>) -> String {
            term.map_or_else(|| "*".to_string(), ToString::to_string)
        }
        write!(
            f,
            "[subject={} predicate={} context={}]",
            slot(self.subject()),
            slot(self.predicate()),
            slot(self.context())
        )
    }
}
