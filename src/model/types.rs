//! RDF term and statement values.
//!
//! Terms are compared by identity: two literals with the same lexical form but
//! different datatypes or language tags are different terms.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `xsd:dateTime` datatype IRI.
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// `xsd:string` datatype IRI.
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Term {
    /// IRI reference
    Iri { value: String },
    /// Blank node with a store-local label
    BlankNode { id: String },
    /// Literal with an optional datatype or language tag
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

impl Term {
    pub fn iri<S: Into<String>>(iri: S) -> Self {
        Term::Iri { value: iri.into() }
    }

    pub fn blank_node<S: Into<String>>(id: S) -> Self {
        Term::BlankNode { id: id.into() }
    }

    /// Plain literal without datatype or language.
    pub fn literal<S: Into<String>>(value: S) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed_literal<S: Into<String>, T: Into<String>>(value: S, datatype: T) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    pub fn lang_literal<S: Into<String>, L: Into<String>>(value: S, language: L) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    /// `xsd:dateTime` literal for the given instant.
    pub fn date_time(instant: DateTime<Utc>) -> Self {
        Term::typed_literal(instant.to_rfc3339(), XSD_DATE_TIME)
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri { .. })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }

    pub fn is_blank_node(&self) -> bool {
        matches!(self, Term::BlankNode { .. })
    }

    /// The IRI string, blank node label, or literal lexical form.
    pub fn lexical_form(&self) -> &str {
        match self {
            Term::Iri { value } => value,
            Term::BlankNode { id } => id,
            Term::Literal { value, .. } => value,
        }
    }

    /// Parse the term as an `xsd:dateTime` literal.
    ///
    /// Returns `None` for other datatypes and for lexical forms that are not
    /// valid RFC 3339 timestamps.
    pub fn as_date_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Term::Literal {
                value,
                datatype: Some(dt),
                ..
            } if dt == XSD_DATE_TIME => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|d| d.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Stable string key used by the persistent indices for exact matching.
    pub fn index_key(&self) -> String {
        // Struct variants serialize in declaration order, so equal terms
        // always produce equal keys.
        serde_json::to_string(self).unwrap_or_else(|_| self.to_string())
    }

    /// Inverse of [`Term::index_key`].
    pub fn from_index_key(key: &str) -> Result<Self, TermParseError> {
        serde_json::from_str(key).map_err(|e| TermParseError(format!("{key}: {e}")))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri { value } => write!(f, "<{value}>"),
            Term::BlankNode { id } => write!(f, "_:{id}"),
            Term::Literal {
                value,
                datatype,
                language,
            } => {
                let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\"")?;
                if let Some(lang) = language {
                    write!(f, "@{lang}")
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{dt}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Failure to read a term from its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid RDF term: {0}")]
pub struct TermParseError(pub String);

impl FromStr for Term {
    type Err = TermParseError;

    /// Accepts `<iri>`, a bare absolute IRI, `_:label`, and `"literal"` with an
    /// optional `@lang` or `^^<datatype>` suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TermParseError("empty term".into()));
        }
        if let Some(inner) = s.strip_prefix('<') {
            let iri = inner
                .strip_suffix('>')
                .ok_or_else(|| TermParseError(format!("unterminated IRI: {s}")))?;
            return Ok(Term::iri(iri));
        }
        if let Some(label) = s.strip_prefix("_:") {
            if label.is_empty() {
                return Err(TermParseError("blank node without label".into()));
            }
            return Ok(Term::blank_node(label));
        }
        if s.starts_with('"') {
            return parse_literal(s);
        }
        if s.contains(':') && !s.contains(char::is_whitespace) {
            return Ok(Term::iri(s));
        }
        Err(TermParseError(format!("cannot read `{s}` as a term")))
    }
}

fn parse_literal(s: &str) -> Result<Term, TermParseError> {
    let close = s[1..]
        .rfind('"')
        .map(|i| i + 1)
        .filter(|&i| i > 0)
        .ok_or_else(|| TermParseError(format!("unterminated literal: {s}")))?;
    let value = s[1..close].replace("\\\"", "\"").replace("\\\\", "\\");
    let suffix = &s[close + 1..];
    if suffix.is_empty() {
        Ok(Term::literal(value))
    } else if let Some(lang) = suffix.strip_prefix('@') {
        Ok(Term::lang_literal(value, lang))
    } else if let Some(dt) = suffix.strip_prefix("^^") {
        let dt = dt
            .strip_prefix('<')
            .and_then(|d| d.strip_suffix('>'))
            .unwrap_or(dt);
        Ok(Term::typed_literal(value, dt))
    } else {
        Err(TermParseError(format!("unexpected literal suffix: {suffix}")))
    }
}

/// An RDF statement: a triple with an optional named graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    /// Named graph; `None` is the default graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Term>,
}

impl Statement {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: None,
        }
    }

    pub fn in_context(subject: Term, predicate: Term, object: Term, context: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: Some(context),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(ctx) = &self.context {
            write!(f, " {ctx}")?;
        }
        f.write_str(" .")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_short_forms() {
        assert_eq!("<http://ex/a>".parse::<Term>().unwrap(), Term::iri("http://ex/a"));
        assert_eq!("http://ex/a".parse::<Term>().unwrap(), Term::iri("http://ex/a"));
        assert_eq!("_:b0".parse::<Term>().unwrap(), Term::blank_node("b0"));
        assert_eq!("\"hi\"".parse::<Term>().unwrap(), Term::literal("hi"));
        assert_eq!(
            "\"hi\"@en".parse::<Term>().unwrap(),
            Term::lang_literal("hi", "en")
        );
        assert_eq!(
            format!("\"2020-01-01T00:00:00Z\"^^<{XSD_DATE_TIME}>")
                .parse::<Term>()
                .unwrap(),
            Term::typed_literal("2020-01-01T00:00:00Z", XSD_DATE_TIME)
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Term>().is_err());
        assert!("not a term".parse::<Term>().is_err());
        assert!("<http://ex/a".parse::<Term>().is_err());
        assert!("_:".parse::<Term>().is_err());
        assert!("\"x\"%".parse::<Term>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let terms = [
            Term::iri("http://ex/a"),
            Term::blank_node("n1"),
            Term::literal("say \"hi\""),
            Term::lang_literal("bonjour", "fr"),
            Term::typed_literal("42", "http://www.w3.org/2001/XMLSchema#integer"),
        ];
        for term in terms {
            assert_eq!(term.to_string().parse::<Term>().unwrap(), term);
        }
    }

    #[test]
    fn literals_differ_by_datatype() {
        assert_ne!(Term::literal("1"), Term::typed_literal("1", XSD_STRING));
        assert_ne!(
            Term::literal("1").index_key(),
            Term::typed_literal("1", XSD_STRING).index_key()
        );
    }

    #[test]
    fn index_key_is_reversible() {
        let term = Term::lang_literal("chat", "fr");
        assert_eq!(Term::from_index_key(&term.index_key()).unwrap(), term);
        assert!(Term::from_index_key("{bogus").is_err());
    }

    #[test]
    fn date_time_literals_parse() {
        let t = Term::typed_literal("2021-06-01T12:00:00+02:00", XSD_DATE_TIME);
        let dt = t.as_date_time().unwrap();
        assert_eq!(dt.to_rfc3339(), "2021-06-01T10:00:00+00:00");
        assert!(Term::literal("2021-06-01T12:00:00Z").as_date_time().is_none());
    }

    #[test]
    fn statement_json_shape() {
        let st = Statement::in_context(
            Term::iri("http://ex/s"),
            Term::iri("http://ex/p"),
            Term::literal("o"),
            Term::iri("http://ex/g"),
        );
        let json = serde_json::to_value(&st).unwrap();
        assert_eq!(json["subject"]["type"], "iri");
        assert_eq!(json["object"]["value"], "o");
        assert_eq!(json["context"]["value"], "http://ex/g");
        let back: Statement = serde_json::from_value(json).unwrap();
        assert_eq!(back, st);

        let default_graph = Statement::new(Term::iri("a:s"), Term::iri("a:p"), Term::literal("o"));
        let json = serde_json::to_value(&default_graph).unwrap();
        assert!(json.get("context").is_none());
    }
}
