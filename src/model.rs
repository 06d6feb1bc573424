//! The user-facing graph object (spec §4.5): a handle over one
//! [`Storage`] plus zero or more sub-models, delegating every graph
//! operation to it.
//!
//! This crate's concurrency model is single-threaded and synchronous
//! (spec §5) — no internal threads, no async runtime. `Model` is
//! therefore built around `Rc<RefCell<..>>` rather than
//! `Arc<Mutex<..>>`: reference counting without atomics, interior
//! mutability without lock poisoning to handle. `add_reference`/
//! `remove_reference` exist to mirror the original API's explicit
//! lifetime management, but the `Rc` clone/drop machinery already
//! does the actual work — they are thin, intentionally so.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::log::FACILITY_MODEL;
use crate::node::{Node, NodeError};
use crate::parser::{self, ParserError, ParserSource, TripleSink};
use crate::storage::{Storage, StorageError, StorageOptions};
use crate::stream::QuadStream;
use crate::triple::{Pattern, Quad, Triple};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Parser(#[from] ParserError),
}

pub type ModelResult<T> = Result<T, ModelError>;

struct Inner {
    submodels: Vec<Model>,
    storage: Box<dyn Storage>,
    supports_contexts: bool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Fields drop in declaration order: sub-models first, each
        // recursively releasing its own storage, then this model's
        // own storage exactly once.
        if let Err(e) = self.storage.close() {
            tracing::warn!(target: FACILITY_MODEL, error = %e, "storage close failed during drop");
        }
    }
}

/// A graph handle (spec §4.5). Cheap to clone — every clone shares the
/// same underlying storage and sub-model list via `Rc`.
#[derive(Clone)]
pub struct Model {
    inner: Rc<RefCell<Inner>>,
}

impl Model {
    /// Opens `storage` with `options` and constructs a `Model` over
    /// it. Context support is learned once, up front, by asking the
    /// backend's `#contexts` feature (spec §4.5, §6) rather than
    /// re-querying it on every context operation.
    pub fn new(mut storage: Box<dyn Storage>, options: &StorageOptions) -> ModelResult<Self> {
        storage.open(options)?;
        let supports_contexts = storage.supports_contexts();
        Ok(Model {
            inner: Rc::new(RefCell::new(Inner {
                storage,
                supports_contexts,
                submodels: Vec::new(),
            })),
        })
    }

    /// Number of quads in the store; negative if the backend cannot
    /// compute this cheaply (spec §4.4).
    pub fn size(&self) -> ModelResult<i64> {
        Ok(self.inner.borrow().storage.size()?)
    }

    pub fn sync(&self) -> ModelResult<()> {
        self.inner.borrow_mut().storage.sync()?;
        Ok(())
    }

    /// Adds `(subject, predicate, object)` to the default graph.
    pub fn add(&self, subject: Node, predicate: Node, object: Node) -> ModelResult<()> {
        let quad = Quad::new(subject, predicate, object, None);
        self.inner.borrow_mut().storage.add(&quad)?;
        Ok(())
    }

    /// Adds a triple whose object is a typed or language-tagged
    /// literal constructed from `lexical`/`language`/`datatype` (spec
    /// §4.5: `typed_literal_add`). `language` and `datatype` are
    /// mutually exclusive, as enforced by [`Node::new_typed_literal`].
    pub fn typed_literal_add(
        &self,
        subject: Node,
        predicate: Node,
        lexical: impl Into<Vec<u8>>,
        language: Option<impl Into<String>>,
        datatype: Option<impl Into<Vec<u8>>>,
    ) -> ModelResult<()> {
        let object = Node::new_typed_literal(lexical, language, datatype)?;
        self.add(subject, predicate, object)
    }

    pub fn remove(&self, triple: &Triple) -> ModelResult<()> {
        let quad = Quad::new(
            triple.subject.clone(),
            triple.predicate.clone(),
            triple.object.clone(),
            None,
        );
        self.inner.borrow_mut().storage.remove(&quad)?;
        Ok(())
    }

    pub fn contains(&self, triple: &Triple) -> ModelResult<bool> {
        Ok(self.inner.borrow().storage.contains(triple)?)
    }

    pub fn find(&self, pattern: &Pattern) -> ModelResult<Vec<Quad>> {
        let inner = self.inner.borrow();
        let mut stream = inner.storage.find(pattern)?;
        Ok(collect(&mut *stream))
    }

    pub fn serialize(&self) -> ModelResult<Vec<Quad>> {
        let inner = self.inner.borrow();
        let mut stream = inner.storage.serialize()?;
        Ok(collect(&mut *stream))
    }

    fn warn_if_contextless(&self, op: &str) {
        if !self.inner.borrow().supports_contexts {
            tracing::warn!(
                target: FACILITY_MODEL,
                op,
                "context operation invoked on a backend that does not report context support"
            );
        }
    }

    pub fn context_add(&self, context: &Node, triple: &Triple) -> ModelResult<()> {
        self.warn_if_contextless("context_add");
        self.inner
            .borrow_mut()
            .storage
            .context_add(context, triple)?;
        Ok(())
    }

    pub fn context_remove(&self, context: &Node, triple: &Triple) -> ModelResult<()> {
        self.warn_if_contextless("context_remove");
        self.inner
            .borrow_mut()
            .storage
            .context_remove(context, triple)?;
        Ok(())
    }

    pub fn context_remove_all(&self, context: &Node) -> ModelResult<()> {
        self.warn_if_contextless("context_remove_all");
        self.inner.borrow_mut().storage.context_remove_all(context)?;
        Ok(())
    }

    pub fn context_serialize(&self, context: &Node) -> ModelResult<Vec<Quad>> {
        self.warn_if_contextless("context_serialize");
        let inner = self.inner.borrow();
        let mut stream = inner.storage.context_serialize(context)?;
        Ok(collect(&mut *stream))
    }

    pub fn contexts(&self) -> ModelResult<Vec<Node>> {
        self.warn_if_contextless("contexts");
        Ok(self.inner.borrow().storage.get_contexts()?)
    }

    /// Adds `submodel` as a child of this one (spec §4.5). No cycle
    /// check beyond a debug assertion that `submodel` is not this very
    /// model — the original API left deeper cycle detection untested,
    /// and reproducing that gap is the documented choice here too.
    pub fn add_submodel(&self, submodel: Model) {
        debug_assert!(
            !Rc::ptr_eq(&self.inner, &submodel.inner),
            "a model cannot be its own sub-model"
        );
        self.inner.borrow_mut().submodels.push(submodel);
    }

    pub fn submodels(&self) -> Vec<Model> {
        self.inner.borrow().submodels.clone()
    }

    /// Strong reference count, mirroring the original API's explicit
    /// add/remove-reference pair (spec §4.5). `Rc::clone`/drop already
    /// perform the actual bookkeeping; these exist for callers who
    /// want to mimic that lifecycle shape.
    pub fn reference_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    pub fn add_reference(&self) -> Model {
        self.clone()
    }

    pub fn remove_reference(self) {
        drop(self);
    }

    /// Parses `source` and routes every resulting triple into this
    /// model (spec §4.5): the default graph if the parser yields no
    /// context, `context_add` otherwise. `parser_name`/`mime` are
    /// forwarded to [`parser::load`]'s name-then-MIME-then-extension
    /// selection.
    pub fn load(
        &self,
        source: &ParserSource,
        parser_name: Option<&str>,
        mime: Option<&str>,
        base_iri: &Node,
    ) -> ModelResult<()> {
        let mut sink = ModelSink { model: self };
        parser::load(source, parser_name, mime, base_iri, &mut sink)?;
        Ok(())
    }
}

struct ModelSink<'a> {
    model: &'a Model,
}

impl TripleSink for ModelSink<'_> {
    fn triple(&mut self, triple: Triple, context: Option<Node>) -> Result<(), ParserError> {
        let result = match context {
            Some(ctx) => self.model.context_add(&ctx, &triple),
            None => self.model.add(triple.subject, triple.predicate, triple.object),
        };
        result.map_err(|e| ParserError::Fatal("model", e.to_string()))
    }

    fn namespace(&mut self, _prefix: Option<&str>, _uri: &[u8]) {
        // Namespace prefixes carry no meaning for the node model here
        // (spec §4.1: IRIs are opaque bytes) — nothing to record.
    }
}

fn collect(stream: &mut dyn QuadStream) -> Vec<Quad> {
    let mut out = Vec::new();
    if stream.end() {
        return out;
    }
    loop {
        if let Some(q) = stream.get(crate::stream::GetMode::Current) {
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

    fn memory_model() -> Model {
        let storage = Box::new(MemoryHashStorage::new());
        let options = StorageOptions::parse("hash-type='memory'").unwrap();
        Model::new(storage, &options).unwrap()
    }

    #[test]
    fn add_find_contains_round_trip() {
        let m = memory_model();
        m.add(iri("s"), iri("p"), iri("o")).unwrap();
        assert!(m.contains(&Triple::new(iri("s"), iri("p"), iri("o"))).unwrap());
        assert_eq!(m.size().unwrap(), 1);

        let found = m.find(&Pattern::any().with_subject(iri("s"))).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].object, iri("o"));
    }

    #[test]
    fn typed_literal_add_builds_object_literal() {
        let m = memory_model();
        m.typed_literal_add(
            iri("s"),
            iri("p"),
            "42",
            None::<String>,
            Some("http://www.w3.org/2001/XMLSchema#integer"),
        )
        .unwrap();
        let found = m.find(&Pattern::any()).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].object.is_literal());
    }

    #[test]
    fn remove_deletes_the_matching_quad() {
        let m = memory_model();
        let t = Triple::new(iri("s"), iri("p"), iri("o"));
        m.add(t.subject.clone(), t.predicate.clone(), t.object.clone())
            .unwrap();
        m.remove(&t).unwrap();
        assert!(!m.contains(&t).unwrap());
        assert_eq!(m.size().unwrap(), 0);
    }

    #[test]
    fn context_ops_forward_even_without_support() {
        let m = memory_model();
        // `hash-type='memory'` without `contexts='yes'` reports
        // `supports_contexts() == false`, but the call must still go
        // through (spec §4.5) rather than error out.
        m.context_add(&iri("g"), &Triple::new(iri("s"), iri("p"), iri("o")))
            .unwrap();
        assert!(m.contains(&Triple::new(iri("s"), iri("p"), iri("o"))).unwrap());
    }

    #[test]
    fn submodels_reject_self_reference_in_debug() {
        let m = memory_model();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            m.add_submodel(m.clone());
        }));
        if cfg!(debug_assertions) {
            assert!(result.is_err());
        } else {
            assert!(result.is_ok());
        }
    }

    #[test]
    fn clone_shares_the_same_underlying_storage() {
        let m = memory_model();
        let m2 = m.clone();
        m.add(iri("s"), iri("p"), iri("o")).unwrap();
        assert!(m2.contains(&Triple::new(iri("s"), iri("p"), iri("o"))).unwrap());
        assert_eq!(m.reference_count(), 2);
    }
}
