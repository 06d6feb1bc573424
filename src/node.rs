//! RDF node model (spec §3, §4.1).
//!
//! A [`Node`] is an immutable, content-addressed RDF term: an IRI, a
//! blank node, or a literal. Equality is always structural byte
//! comparison — IRIs are opaque byte strings here, never normalized
//! against RFC 3986.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// `rdf:langString` — the implicit datatype of a language-tagged literal.
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
/// `rdf:XMLLiteral` — forced datatype of an XML-literal node.
pub const RDF_XML_LITERAL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#XMLLiteral";
/// `xsd:boolean` — literals with this datatype are canonicalized on construction.
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";

static BLANK_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NodeError {
    #[error("IRI must not be empty")]
    EmptyIri,
    #[error("literal cannot carry both a non-empty language tag and a datatype")]
    ConflictingLiteralFlags,
    #[error("XML literal cannot carry a language tag")]
    XmlLiteralWithLanguage,
}

pub type NodeResult<T> = Result<T, NodeError>;

/// An RDF literal: lexical form plus an optional language tag and/or datatype.
///
/// Invariant (spec §3): `language` and `datatype` are mutually exclusive
/// unless `datatype` is exactly `rdf:langString`. An empty language string
/// is normalized to `None` at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    lexical: Vec<u8>,
    language: Option<String>,
    datatype: Option<Vec<u8>>,
}

impl Literal {
    pub fn lexical(&self) -> &[u8] {
        &self.lexical
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn datatype(&self) -> Option<&[u8]> {
        self.datatype.as_deref()
    }

    /// True iff this literal's datatype is exactly `rdf:XMLLiteral`.
    pub fn is_wf_xml(&self) -> bool {
        self.datatype.as_deref() == Some(RDF_XML_LITERAL.as_bytes())
    }

    fn canonicalize_boolean(lexical: Vec<u8>, datatype: &Option<Vec<u8>>) -> Vec<u8> {
        if datatype.as_deref() == Some(XSD_BOOLEAN.as_bytes()) {
            match lexical.as_slice() {
                b"true" | b"TRUE" | b"1" => b"true".to_vec(),
                _ => b"false".to_vec(),
            }
        } else {
            lexical
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", String::from_utf8_lossy(&self.lexical))?;
        if let Some(lang) = &self.language {
            write!(f, "@{lang}")
        } else if let Some(dt) = &self.datatype {
            write!(f, "^^<{}>", String::from_utf8_lossy(dt))
        } else {
            Ok(())
        }
    }
}

/// An RDF term (spec §3): an absolute IRI, a process-scoped blank node, or a literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Iri(Vec<u8>),
    Blank(Vec<u8>),
    Literal(Literal),
}

impl Node {
    /// Construct an IRI node. Also serves the role of the original API's
    /// "counted" constructor: a Rust `&[u8]`/`Vec<u8>` already carries its
    /// own length, so there is no separate entry point for a raw pointer
    /// plus length.
    pub fn new_iri(bytes: impl Into<Vec<u8>>) -> NodeResult<Node> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(NodeError::EmptyIri);
        }
        Ok(Node::Iri(bytes))
    }

    /// Construct a blank node. With `id = None`, a fresh id is drawn from
    /// a process-wide monotonic counter (spec §4.1) — blank ids carry no
    /// cross-graph meaning.
    pub fn new_blank(id: Option<impl Into<Vec<u8>>>) -> Node {
        match id {
            Some(id) => Node::Blank(id.into()),
            None => {
                let n = BLANK_COUNTER.fetch_add(1, Ordering::Relaxed);
                Node::Blank(format!("b{n}").into_bytes())
            }
        }
    }

    /// Construct a plain or language-tagged literal, or (with
    /// `is_xml_literal = true`) an `rdf:XMLLiteral`-typed literal.
    pub fn new_literal(
        lexical: impl Into<Vec<u8>>,
        language: Option<impl Into<String>>,
        is_xml_literal: bool,
    ) -> NodeResult<Node> {
        let lexical = lexical.into();
        let language = normalize_language(language.map(Into::into));

        if is_xml_literal {
            if language.is_some() {
                return Err(NodeError::XmlLiteralWithLanguage);
            }
            return Ok(Node::Literal(Literal {
                lexical,
                language: None,
                datatype: Some(RDF_XML_LITERAL.as_bytes().to_vec()),
            }));
        }

        let datatype = language
            .is_some()
            .then(|| RDF_LANG_STRING.as_bytes().to_vec());
        Ok(Node::Literal(Literal {
            lexical,
            language,
            datatype,
        }))
    }

    /// Construct a typed literal. Rejects a non-empty language tag
    /// combined with any explicit datatype (spec §4.1) — use
    /// [`Node::new_literal`] for language-tagged literals instead.
    pub fn new_typed_literal(
        lexical: impl Into<Vec<u8>>,
        language: Option<impl Into<String>>,
        datatype: Option<impl Into<Vec<u8>>>,
    ) -> NodeResult<Node> {
        let lexical = lexical.into();
        let language = normalize_language(language.map(Into::into));
        let datatype = datatype.map(Into::into);

        if language.is_some() && datatype.is_some() {
            return Err(NodeError::ConflictingLiteralFlags);
        }

        let lexical = Literal::canonicalize_boolean(lexical, &datatype);
        Ok(Node::Literal(Literal {
            lexical,
            language,
            datatype,
        }))
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Node::Iri(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Node::Blank(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Node::Literal(_))
    }

    pub fn as_iri(&self) -> Option<&[u8]> {
        match self {
            Node::Iri(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_blank(&self) -> Option<&[u8]> {
        match self {
            Node::Blank(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Node::Literal(l) => Some(l),
            _ => None,
        }
    }

    /// True iff this node is a literal whose datatype is `rdf:XMLLiteral`.
    pub fn literal_value_is_wf_xml(&self) -> bool {
        self.as_literal().is_some_and(Literal::is_wf_xml)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Iri(b) => write!(f, "<{}>", String::from_utf8_lossy(b)),
            Node::Blank(b) => write!(f, "_:{}", String::from_utf8_lossy(b)),
            Node::Literal(l) => write!(f, "{l}"),
        }
    }
}

fn normalize_language(language: Option<String>) -> Option<String> {
    language.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iri_equality_is_byte_structural() {
        let a = Node::new_iri("http://example.org/a").unwrap();
        let b = Node::new_iri("http://example.org/a").unwrap();
        let c = Node::new_iri("http://example.org/b").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_iri_rejected() {
        assert_eq!(Node::new_iri("").unwrap_err(), NodeError::EmptyIri);
    }

    #[test]
    fn blank_without_id_gets_fresh_counter_value() {
        let a = Node::new_blank::<Vec<u8>>(None);
        let b = Node::new_blank::<Vec<u8>>(None);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_language_normalizes_to_absent() {
        let n = Node::new_literal("x", Some(""), false).unwrap();
        assert_eq!(n.as_literal().unwrap().language(), None);
        assert_eq!(n.as_literal().unwrap().datatype(), None);
    }

    #[test]
    fn language_tag_implies_lang_string_datatype() {
        let n = Node::new_literal("hello", Some("en"), false).unwrap();
        let lit = n.as_literal().unwrap();
        assert_eq!(lit.language(), Some("en"));
        assert_eq!(lit.datatype(), Some(RDF_LANG_STRING.as_bytes()));
    }

    #[test]
    fn xml_literal_forces_datatype_and_rejects_language() {
        let n = Node::new_literal("<a/>", None::<String>, true).unwrap();
        assert!(n.literal_value_is_wf_xml());

        let err = Node::new_literal("<a/>", Some("en"), true).unwrap_err();
        assert_eq!(err, NodeError::XmlLiteralWithLanguage);
    }

    #[test]
    fn typed_literal_rejects_language_plus_datatype() {
        let err =
            Node::new_typed_literal("1", Some("en"), Some(XSD_BOOLEAN.as_bytes())).unwrap_err();
        assert_eq!(err, NodeError::ConflictingLiteralFlags);
    }

    #[test]
    fn boolean_literal_canonicalizes() {
        for (input, expected) in [("true", "true"), ("TRUE", "true"), ("1", "true"), ("0", "false"), ("no", "false")] {
            let n = Node::new_typed_literal(input, None::<String>, Some(XSD_BOOLEAN.as_bytes()))
                .unwrap();
            assert_eq!(n.as_literal().unwrap().lexical(), expected.as_bytes());
        }
    }
}
