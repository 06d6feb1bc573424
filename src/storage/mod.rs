//! The storage contract (spec §4.4): a pluggable backend trait plus a
//! process-wide factory registry, so the [`crate::model::Model`]
//! façade never has to know which concrete backend it is driving.
//!
//! [`Storage`] splits into mandatory operations (no default body —
//! every backend must supply these to be usable at all) and optional
//! operations, each with a default implementation composed from the
//! mandatory ones per spec §4.4's "Fallback composition rules."
//! Backends with a dedicated index for an optional operation (the
//! hash-indexed backend's `contexts`/`p2so` indices, a SQL backend's
//! `WHERE context = ?`) override the default for performance; nothing
//! is required to.

pub mod options;
pub mod registry;

pub mod hash;
#[cfg(feature = "odbc-backend")]
pub mod odbc;
#[cfg(any(
    feature = "sqlite-backend",
    feature = "postgres-backend",
    feature = "mysql-backend"
))]
pub mod sql;

use std::collections::HashSet;

use thiserror::Error;

use crate::node::Node;
use crate::query::{Query, QueryResults};
use crate::stream::{FilterQuadStream, GetMode, QuadStream, Stream, VecNodeIterator};
use crate::triple::{Pattern, Quad, Triple};

pub use options::StorageOptions;
pub use registry::{create, register_factory, registered_names, StorageFactory};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("operation not supported by this backend: {0}")]
    NotSupported(String),
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    #[error("invalid storage options: {0}")]
    InvalidOptions(String),
    #[error(transparent)]
    Codec(#[from] crate::codec::CodecError),
}

pub type StorageResult<T> = Result<T, StorageError>;

fn not_supported(op: &str) -> StorageError {
    StorageError::NotSupported(op.to_string())
}

/// A storage backend (spec §4.4). Mandatory: `open`, `close`, `size`,
/// `add`, `remove`, `contains`, `serialize`, `find`, `name`. Everything
/// else is optional and falls back to a generic composition of those
/// eight — see each method's default body.
pub trait Storage {
    // -- mandatory --------------------------------------------------
    fn open(&mut self, options: &StorageOptions) -> StorageResult<()>;
    fn close(&mut self) -> StorageResult<()>;

    /// Number of quads in the store. A negative value means the
    /// backend cannot compute this cheaply (spec §9 Open Question) —
    /// callers must handle that case rather than treating it as zero.
    fn size(&self) -> StorageResult<i64>;

    fn add(&mut self, quad: &Quad) -> StorageResult<()>;
    fn remove(&mut self, quad: &Quad) -> StorageResult<()>;

    /// True iff some quad in the store has exactly this `(s,p,o)` in
    /// *any* context. Use `find_in_context` to test a specific graph.
    fn contains(&self, triple: &Triple) -> StorageResult<bool>;

    fn find<'a>(&'a self, pattern: &Pattern) -> StorageResult<Box<dyn QuadStream + 'a>>;

    /// Human-readable backend name, for diagnostics and `rdfproc`.
    fn name(&self) -> &'static str;

    // -- optional, with generic fallbacks ----------------------------

    /// True iff contexts (named graphs) are meaningful for this
    /// backend instance (spec §4.5: the façade logs a warning, but
    /// still forwards, when a context op is invoked and this is
    /// false).
    fn supports_contexts(&self) -> bool {
        false
    }

    /// Every quad in the store, in unspecified order. Default is
    /// `find(Pattern::any())`.
    fn serialize<'a>(&'a self) -> StorageResult<Box<dyn QuadStream + 'a>> {
        self.find(&Pattern::any())
    }

    /// Add every quad yielded by `source`. Default loops calling
    /// `add`; backends with a bulk-write path (a single multi-row
    /// `INSERT`, a batched `WriteBatch`) should override this.
    fn add_many(&mut self, source: &mut dyn QuadStream) -> StorageResult<u64> {
        let mut n = 0u64;
        if source.end() {
            return Ok(n);
        }
        loop {
            if let Some(quad) = source.get(GetMode::Current) {
                self.add(&quad)?;
                n += 1;
            }
            if source.end() || !source.advance() {
                break;
            }
        }
        Ok(n)
    }

    fn context_add(&mut self, context: &Node, triple: &Triple) -> StorageResult<()> {
        self.add(&Quad::new(
            triple.subject.clone(),
            triple.predicate.clone(),
            triple.object.clone(),
            Some(context.clone()),
        ))
    }

    fn context_add_many(&mut self, context: &Node, source: &mut dyn Stream) -> StorageResult<u64> {
        let mut n = 0u64;
        if source.end() {
            return Ok(n);
        }
        loop {
            if let Some(triple) = source.get(GetMode::Current) {
                self.context_add(context, &triple)?;
                n += 1;
            }
            if source.end() || !source.advance() {
                break;
            }
        }
        Ok(n)
    }

    fn context_remove(&mut self, context: &Node, triple: &Triple) -> StorageResult<()> {
        self.remove(&Quad::new(
            triple.subject.clone(),
            triple.predicate.clone(),
            triple.object.clone(),
            Some(context.clone()),
        ))
    }

    /// Remove every quad in `context`. Default: `context_serialize`
    /// then `context_remove` per triple (spec §4.4 fallback rule).
    fn context_remove_all(&mut self, context: &Node) -> StorageResult<()> {
        let triples: Vec<Triple> = {
            let mut stream = self.context_serialize(context)?;
            collect_stream(&mut *stream)
        };
        for triple in triples {
            self.context_remove(context, &triple)?;
        }
        Ok(())
    }

    /// Every quad tagged with `context`. Default: `find` with a
    /// context-bound pattern.
    fn context_serialize<'a>(
        &'a self,
        context: &Node,
    ) -> StorageResult<Box<dyn QuadStream + 'a>> {
        self.find(&Pattern::any().with_context(Some(context.clone())))
    }

    /// `find`, scoped to one context. Default: `context_serialize`
    /// plus a map filter applying `pattern.matches` (spec §4.4
    /// fallback rule) so backends without a combined index still work.
    fn find_in_context<'a>(
        &'a self,
        pattern: &Pattern,
        context: &Node,
    ) -> StorageResult<Box<dyn QuadStream + 'a>> {
        let inner = self.context_serialize(context)?;
        let pattern = pattern.clone();
        Ok(Box::new(FilterQuadStream::new(inner, move |q| {
            q.matches(&pattern)
        })))
    }

    /// Subjects `s` such that `(s, predicate, object)` is in the
    /// store. Default: `find((?, predicate, object))` — duplicates
    /// may be returned; backends with a `po2s`-style index should
    /// override this and dedupe.
    fn find_sources(&self, predicate: &Node, object: &Node) -> StorageResult<Vec<Node>> {
        let pattern = Pattern::any()
            .with_predicate(predicate.clone())
            .with_object(object.clone());
        let mut stream = self.find(&pattern)?;
        Ok(collect_quad_stream(&mut *stream)
            .into_iter()
            .map(|q| q.subject)
            .collect())
    }

    /// Objects `o` such that `(subject, predicate, o)` is in the store.
    fn find_targets(&self, subject: &Node, predicate: &Node) -> StorageResult<Vec<Node>> {
        let pattern = Pattern::any()
            .with_subject(subject.clone())
            .with_predicate(predicate.clone());
        let mut stream = self.find(&pattern)?;
        Ok(collect_quad_stream(&mut *stream)
            .into_iter()
            .map(|q| q.object)
            .collect())
    }

    /// Predicates `p` such that `(subject, p, object)` is in the store.
    fn find_arcs(&self, subject: &Node, object: &Node) -> StorageResult<Vec<Node>> {
        let pattern = Pattern::any()
            .with_subject(subject.clone())
            .with_object(object.clone());
        let mut stream = self.find(&pattern)?;
        Ok(collect_quad_stream(&mut *stream)
            .into_iter()
            .map(|q| q.predicate)
            .collect())
    }

    fn has_arc_in(&self, node: &Node, predicate: &Node) -> StorageResult<bool> {
        Ok(!self.find_sources(predicate, node)?.is_empty())
    }

    fn has_arc_out(&self, node: &Node, predicate: &Node) -> StorageResult<bool> {
        Ok(!self.find_targets(node, predicate)?.is_empty())
    }

    /// Every distinct context node currently in use. Default scans
    /// `serialize()`; backends with a dedicated contexts index should
    /// override this for performance.
    fn get_contexts(&self) -> StorageResult<Vec<Node>> {
        let mut seen = HashSet::new();
        let mut stream = self.serialize()?;
        for quad in collect_quad_stream(&mut *stream) {
            if let Some(ctx) = quad.context {
                seen.insert(ctx);
            }
        }
        Ok(seen.into_iter().collect())
    }

    /// A node-yielding iterator version of `get_contexts` (spec §4.4's
    /// `Iterator<Node>` shape), for callers that want to stream rather
    /// than materialize.
    fn get_contexts_iter(&self) -> StorageResult<VecNodeIterator> {
        Ok(VecNodeIterator::new(self.get_contexts()?))
    }

    /// Read a backend feature (spec §6): `http://…#contexts` →
    /// `"0"`/`"1"` literal, `#parser-error-count`/`#parser-warning-count`
    /// → a non-negative integer literal. Default: unknown feature.
    fn get_feature(&self, _uri: &Node) -> StorageResult<Option<Node>> {
        Ok(None)
    }

    fn set_feature(&mut self, _uri: &Node, _value: &Node) -> StorageResult<()> {
        Err(not_supported("set_feature"))
    }

    /// Flush any buffered writes to stable storage. Default: no-op
    /// (appropriate for backends that write through on every `add`).
    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    /// Duplicate this backend's *configuration* (same hash type,
    /// directory, option set — or connection parameters) under a
    /// fresh identity, without copying data (spec §4.6.5). Default:
    /// not supported — most backends have no meaningful "fresh copy."
    fn clone_storage(&self) -> StorageResult<Box<dyn Storage>> {
        Err(not_supported("clone_storage"))
    }

    fn transaction_start(&mut self) -> StorageResult<()> {
        Err(not_supported("transaction_start"))
    }

    fn transaction_commit(&mut self) -> StorageResult<()> {
        Err(not_supported("transaction_commit"))
    }

    fn transaction_rollback(&mut self) -> StorageResult<()> {
        Err(not_supported("transaction_rollback"))
    }

    /// True iff this backend can evaluate queries in `language`
    /// natively (spec §4.8: `true` iff `language == "vsparql"` for the
    /// Virtuoso backend). Backends with no query engine return `false`.
    fn supports_query(&self, _language: &str) -> bool {
        false
    }

    fn query_execute(&self, _query: &Query) -> StorageResult<QueryResults> {
        Err(not_supported("query_execute"))
    }
}

fn collect_stream(stream: &mut dyn Stream) -> Vec<Triple> {
    let mut out = Vec::new();
    if stream.end() {
        return out;
    }
    loop {
        if let Some(t) = stream.get(GetMode::Current) {
            out.push(t);
        }
        if stream.end() || !stream.advance() {
            break;
        }
    }
    out
}

fn collect_quad_stream(stream: &mut dyn QuadStream) -> Vec<Quad> {
    let mut out = Vec::new();
    if stream.end() {
        return out;
    }
    loop {
        if let Some(q) = stream.get(GetMode::Current) {
            out.push(q);
        }
        if stream.end() || !stream.advance() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::hash::MemoryHashStorage;

    fn iri(s: &str) -> Node {
        Node::new_iri(s).unwrap()
    }

    fn opened_memory() -> MemoryHashStorage {
        let mut s = MemoryHashStorage::new();
        s.open(&StorageOptions::parse("hash-type='memory'").unwrap())
            .unwrap();
        s
    }

    #[test]
    fn fallback_find_sources_and_targets() {
        let mut s = opened_memory();
        s.add(&Quad::new(iri("a"), iri("p"), iri("o"), None)).unwrap();
        s.add(&Quad::new(iri("b"), iri("p"), iri("o"), None)).unwrap();

        let mut sources = s.find_sources(&iri("p"), &iri("o")).unwrap();
        sources.sort_by_key(|n| n.to_string());
        assert_eq!(sources, vec![iri("a"), iri("b")]);

        let targets = s.find_targets(&iri("a"), &iri("p")).unwrap();
        assert_eq!(targets, vec![iri("o")]);
    }

    #[test]
    fn fallback_has_arc_in_out() {
        let mut s = opened_memory();
        s.add(&Quad::new(iri("a"), iri("p"), iri("o"), None)).unwrap();
        assert!(s.has_arc_out(&iri("a"), &iri("p")).unwrap());
        assert!(s.has_arc_in(&iri("o"), &iri("p")).unwrap());
        assert!(!s.has_arc_out(&iri("o"), &iri("p")).unwrap());
    }

    #[test]
    fn fallback_context_remove_all_is_isolated() {
        let mut s = opened_memory();
        s.add(&Quad::new(iri("a"), iri("p"), iri("1"), Some(iri("c1"))))
            .unwrap();
        s.add(&Quad::new(iri("a"), iri("p"), iri("2"), Some(iri("c2"))))
            .unwrap();

        s.context_remove_all(&iri("c1")).unwrap();
        assert_eq!(s.size().unwrap(), 1);
        assert!(!s.contains(&Triple::new(iri("a"), iri("p"), iri("1"))).unwrap());
        assert!(s.contains(&Triple::new(iri("a"), iri("p"), iri("2"))).unwrap());
    }

    #[test]
    fn unsupported_transaction_reports_not_supported() {
        let mut s = opened_memory();
        assert!(matches!(
            s.transaction_commit(),
            Err(StorageError::NotSupported(_))
        ));
    }
}
