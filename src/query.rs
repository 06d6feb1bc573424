//! Query dispatch object (spec §4.4 `supports_query`/`query_execute`,
//! §4.8 SPARQL-ODBC, §1 Non-goals).
//!
//! This crate does not parse or evaluate SPARQL (or any other query
//! language) — that's an external collaborator's job. What it owns is
//! the narrow shape a [`crate::storage::Storage`] backend dispatches
//! on: a language tag plus opaque query text in, a [`QueryResults`]
//! stream out.

use std::collections::BTreeMap;

use crate::node::Node;
use crate::triple::Triple;

/// A query to dispatch to a backend: a language tag (`"sparql"`,
/// `"vsparql"` for Virtuoso's SPARQL-over-ODBC dialect, …) plus
/// verbatim query text. The engine never inspects `text` itself; only
/// a backend that claims `supports_query(language) == true` may.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    language: String,
    text: String,
}

impl Query {
    pub fn new(language: impl Into<String>, text: impl Into<String>) -> Self {
        Query {
            language: language.into(),
            text: text.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// One row of a SELECT-shaped result: variable name to bound node.
/// Unbound variables (e.g. from an OPTIONAL) are simply absent from
/// the map rather than mapped to a sentinel.
pub type Solution = BTreeMap<String, Node>;

/// The result of [`crate::storage::Storage::query_execute`] (spec
/// §4.8 scenario S7: a SELECT returns one or more [`Solution`] rows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResults {
    /// SELECT-shaped: an ordered variable list plus zero or more
    /// solution rows.
    Bindings {
        variables: Vec<String>,
        rows: Vec<Solution>,
    },
    /// ASK-shaped: a single boolean.
    Boolean(bool),
    /// CONSTRUCT/DESCRIBE-shaped: a materialized triple set.
    Graph(Vec<Triple>),
}

impl QueryResults {
    pub fn empty_bindings(variables: Vec<String>) -> Self {
        QueryResults::Bindings {
            variables,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            QueryResults::Bindings { rows, .. } => rows.is_empty(),
            QueryResults::Boolean(_) => false,
            QueryResults::Graph(triples) => triples.is_empty(),
        }
    }

    /// Number of result rows (1 for `Boolean`, matching the original
    /// API's "one row, one column" treatment of ASK).
    pub fn len(&self) -> usize {
        match self {
            QueryResults::Bindings { rows, .. } => rows.len(),
            QueryResults::Boolean(_) => 1,
            QueryResults::Graph(triples) => triples.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_carries_language_and_text_verbatim() {
        let q = Query::new("sparql", "SELECT * WHERE { ?s ?p ?o }");
        assert_eq!(q.language(), "sparql");
        assert_eq!(q.text(), "SELECT * WHERE { ?s ?p ?o }");
    }

    #[test]
    fn empty_bindings_reports_empty() {
        let r = QueryResults::empty_bindings(vec!["s".to_string()]);
        assert!(r.is_empty());
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn boolean_results_are_never_empty() {
        assert!(!QueryResults::Boolean(false).is_empty());
        assert_eq!(QueryResults::Boolean(true).len(), 1);
    }
}
