//! The parser adapter (spec §4.9): a thin protocol over an external
//! RDF syntax parser, not a parser itself. This crate owns the node
//! model and the dispatch/callback shape; concrete Turtle/RDF-XML/etc.
//! grammars are out of scope and are expected to live in separate
//! crates that implement [`ParserAdapter`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use thiserror::Error;

use crate::node::Node;
use crate::triple::Triple;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("no parser registered matching name={name:?} mime={mime:?}")]
    NoParserAvailable {
        name: Option<String>,
        mime: Option<String>,
    },
    #[error("parser {0} reported a fatal error: {1}")]
    Fatal(&'static str, String),
    #[error(transparent)]
    Node(#[from] crate::node::NodeError),
}

pub type ParserResult<T> = Result<T, ParserError>;

/// Where the bytes to parse come from (spec §4.9 step 1).
pub enum ParserSource {
    Iri(String),
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl ParserSource {
    /// The filename-extension hint used as the last resort in parser
    /// selection (spec §4.9 step 2's "source IRI suffix").
    fn extension_hint(&self) -> Option<&str> {
        let path = match self {
            ParserSource::Iri(s) => s.as_str(),
            ParserSource::File(p) => p.to_str()?,
            ParserSource::Bytes(_) => return None,
        };
        path.rsplit_once('.').map(|(_, ext)| ext)
    }
}

/// Byte chunk size for URL/file fetches (spec §4.9).
pub const FETCH_CHUNK_BYTES: usize = 1024;

/// Receives a parser's output: statements and namespace declarations
/// (spec §4.9 step 3). `add` and `namespace` are called zero or more
/// times during a single parse; `finish` is called exactly once at
/// the end, reporting the total error/warning counts the parser
/// accumulated (spec §6's `#parser-error-count`/`#parser-warning-count`
/// features read these back).
pub trait TripleSink {
    fn triple(&mut self, triple: Triple, context: Option<Node>) -> ParserResult<()>;
    fn namespace(&mut self, prefix: Option<&str>, uri: &[u8]);
    fn finish(&mut self, errors: u64, warnings: u64) {
        let _ = (errors, warnings);
    }
}

/// Accumulates parsed output into plain vectors — "appended to a
/// local list backing a Stream" (spec §4.9 step 3, caller's choice B).
#[derive(Debug, Default)]
pub struct VecTripleSink {
    pub triples: Vec<(Triple, Option<Node>)>,
    pub namespaces: Vec<NamespaceDeclaration>,
    pub errors: u64,
    pub warnings: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDeclaration {
    pub prefix: Option<String>,
    pub uri: Vec<u8>,
}

impl VecTripleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TripleSink for VecTripleSink {
    fn triple(&mut self, triple: Triple, context: Option<Node>) -> ParserResult<()> {
        self.triples.push((triple, context));
        Ok(())
    }

    fn namespace(&mut self, prefix: Option<&str>, uri: &[u8]) {
        self.namespaces.push(NamespaceDeclaration {
            prefix: prefix.map(str::to_string),
            uri: uri.to_vec(),
        });
    }

    fn finish(&mut self, errors: u64, warnings: u64) {
        self.errors = errors;
        self.warnings = warnings;
    }
}

/// An external RDF syntax parser (spec §4.9 step 2): "pushed into a
/// target Model via `add` or appended to a local list" is the sink's
/// job, not the adapter's — an adapter only has to turn bytes into
/// `(Triple, namespace)` callbacks.
pub trait ParserAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn mime_types(&self) -> &'static [&'static str];
    /// Filename extensions this adapter claims, without the leading dot.
    fn extensions(&self) -> &'static [&'static str];
    fn parse(
        &self,
        source: &ParserSource,
        base_iri: &Node,
        sink: &mut dyn TripleSink,
    ) -> ParserResult<()>;
}

fn registry() -> &'static Mutex<HashMap<&'static str, Box<dyn ParserAdapter>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<&'static str, Box<dyn ParserAdapter>>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn register_parser(adapter: Box<dyn ParserAdapter>) {
    let mut guard = registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.insert(adapter.name(), adapter);
}

pub fn registered_parser_names() -> Vec<&'static str> {
    let guard = registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut names: Vec<_> = guard.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Selection order (spec §4.9 step 2): exact name, then MIME type,
/// then filename extension taken from the source.
fn select_parser(
    name: Option<&str>,
    mime: Option<&str>,
    source: &ParserSource,
) -> ParserResult<&'static str> {
    let guard = registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(name) = name {
        if let Some((key, _)) = guard.iter().find(|(k, _)| **k == *name) {
            return Ok(*key);
        }
    }
    if let Some(mime) = mime {
        if let Some((key, _)) = guard.iter().find(|(_, a)| a.mime_types().contains(&mime)) {
            return Ok(*key);
        }
    }
    if let Some(ext) = source.extension_hint() {
        if let Some((key, _)) = guard.iter().find(|(_, a)| a.extensions().contains(&ext)) {
            return Ok(*key);
        }
    }
    Err(ParserError::NoParserAvailable {
        name: name.map(str::to_string),
        mime: mime.map(str::to_string),
    })
}

/// Runs a parser over `source` (spec §4.9): selects an adapter by
/// name, then MIME, then filename extension, and drives it with
/// `sink`. `base_iri` resolves any relative references the concrete
/// syntax carries — this crate's own node model has no notion of
/// relative IRIs, so the adapter is responsible for resolving before
/// calling back.
pub fn load(
    source: &ParserSource,
    parser_name: Option<&str>,
    mime: Option<&str>,
    base_iri: &Node,
    sink: &mut dyn TripleSink,
) -> ParserResult<()> {
    let key = select_parser(parser_name, mime, source)?;
    let guard = registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let parser = guard
        .get(key)
        .expect("select_parser only returns names present in the registry");
    parser.parse(source, base_iri, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    struct EchoParser;

    impl ParserAdapter for EchoParser {
        fn name(&self) -> &'static str {
            "echo-test"
        }
        fn mime_types(&self) -> &'static [&'static str] {
            &["text/x-echo-test"]
        }
        fn extensions(&self) -> &'static [&'static str] {
            &["echo"]
        }
        fn parse(
            &self,
            _source: &ParserSource,
            base_iri: &Node,
            sink: &mut dyn TripleSink,
        ) -> ParserResult<()> {
            sink.namespace(Some("ex"), b"http://example.org/");
            sink.triple(
                Triple::new(base_iri.clone(), base_iri.clone(), base_iri.clone()),
                None,
            )?;
            sink.finish(0, 0);
            Ok(())
        }
    }

    fn iri(s: &str) -> Node {
        Node::new_iri(s).unwrap()
    }

    #[test]
    fn select_by_name_then_mime_then_extension() {
        register_parser(Box::new(EchoParser));

        let source = ParserSource::File("doc.echo".into());
        let mut sink = VecTripleSink::new();
        load(&source, Some("echo-test"), None, &iri("http://base/"), &mut sink)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(sink.triples.len(), 1);
        assert_eq!(sink.namespaces[0].prefix.as_deref(), Some("ex"));

        let mut sink2 = VecTripleSink::new();
        load(&source, None, Some("text/x-echo-test"), &iri("http://base/"), &mut sink2).unwrap();
        assert_eq!(sink2.triples.len(), 1);

        let mut sink3 = VecTripleSink::new();
        load(&source, None, None, &iri("http://base/"), &mut sink3).unwrap();
        assert_eq!(sink3.triples.len(), 1);
    }

    #[test]
    fn unknown_parser_name_is_an_error() {
        let source = ParserSource::Bytes(b"irrelevant".to_vec());
        let mut sink = VecTripleSink::new();
        let err = load(&source, Some("nonexistent"), None, &iri("http://base/"), &mut sink)
            .unwrap_err();
        assert!(matches!(err, ParserError::NoParserAvailable { .. }));
    }
}
