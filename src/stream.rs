//! Lazy, forward-only result cursors (spec §4.4).
//!
//! A [`Stream`] yields one [`Triple`] (or [`Quad`], via [`QuadStream`])
//! at a time. It is pull-based: nothing downstream of `find`/`serialize`
//! is materialized until `advance`/`get` is called. `close` releases
//! any backend resources (locks, cursors, file handles) the stream
//! holds — callers must call it, or drop the stream, before the
//! storage it reads from is mutated again.

use crate::node::Node;
use crate::triple::{Quad, Triple};

/// How much of the current element `get` should hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetMode {
    /// The element itself.
    Current,
}

/// A forward-only cursor over triples.
pub trait Stream {
    fn end(&mut self) -> bool;
    fn advance(&mut self) -> bool;
    fn get(&self, mode: GetMode) -> Option<Triple>;
    fn close(&mut self);
}

/// A forward-only cursor over quads.
pub trait QuadStream {
    fn end(&mut self) -> bool;
    fn advance(&mut self) -> bool;
    fn get(&self, mode: GetMode) -> Option<Quad>;
    fn close(&mut self);
}

/// The empty stream — `end()` is true immediately.
pub struct EmptyStream;

impl Stream for EmptyStream {
    fn end(&mut self) -> bool {
        true
    }
    fn advance(&mut self) -> bool {
        false
    }
    fn get(&self, _mode: GetMode) -> Option<Triple> {
        None
    }
    fn close(&mut self) {}
}

/// A stream over an owned, already-materialized sequence of triples.
/// Backends that compute their result set eagerly (e.g. an in-memory
/// index scan) wrap it in this adapter to present the same lazy
/// protocol as backends that genuinely stream.
pub struct VecStream {
    items: std::vec::IntoIter<Triple>,
    current: Option<Triple>,
    closed: bool,
}

impl VecStream {
    pub fn new(items: Vec<Triple>) -> Self {
        let mut items = items.into_iter();
        let current = items.next();
        VecStream {
            items,
            current,
            closed: false,
        }
    }
}

impl Stream for VecStream {
    fn end(&mut self) -> bool {
        self.closed || self.current.is_none()
    }

    fn advance(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.items.next();
        self.current.is_some()
    }

    fn get(&self, mode: GetMode) -> Option<Triple> {
        match mode {
            GetMode::Current => self.current.clone(),
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}

/// Applies a filter predicate to an underlying stream, skipping
/// elements that don't match (spec §4.4 map/filter chains). The
/// predicate owns whatever context it needs (a compiled pattern, a
/// capture), so chains compose without the caller threading state
/// through each stage.
pub struct FilterStream<S, F> {
    inner: S,
    predicate: F,
}

impl<S, F> FilterStream<S, F>
where
    S: Stream,
    F: Fn(&Triple) -> bool,
{
    pub fn new(mut inner: S, predicate: F) -> Self {
        while !inner.end() {
            if let Some(t) = inner.get(GetMode::Current) {
                if predicate(&t) {
                    break;
                }
            }
            if !inner.advance() {
                break;
            }
        }
        FilterStream { inner, predicate }
    }
}

impl<S, F> Stream for FilterStream<S, F>
where
    S: Stream,
    F: Fn(&Triple) -> bool,
{
    fn end(&mut self) -> bool {
        self.inner.end()
    }

    fn advance(&mut self) -> bool {
        while self.inner.advance() {
            if let Some(t) = self.inner.get(GetMode::Current) {
                if (self.predicate)(&t) {
                    return true;
                }
            } else {
                return false;
            }
        }
        false
    }

    fn get(&self, mode: GetMode) -> Option<Triple> {
        self.inner.get(mode)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Applies a 1:1 transform to each element of an underlying stream.
pub struct MapStream<S, F> {
    inner: S,
    transform: F,
}

impl<S, F> MapStream<S, F> {
    pub fn new(inner: S, transform: F) -> Self {
        MapStream { inner, transform }
    }
}

impl<S, F> Stream for MapStream<S, F>
where
    S: Stream,
    F: Fn(Triple) -> Triple,
{
    fn end(&mut self) -> bool {
        self.inner.end()
    }

    fn advance(&mut self) -> bool {
        self.inner.advance()
    }

    fn get(&self, mode: GetMode) -> Option<Triple> {
        self.inner.get(mode).map(&self.transform)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// The empty quad stream — `end()` is true immediately.
pub struct EmptyQuadStream;

impl QuadStream for EmptyQuadStream {
    fn end(&mut self) -> bool {
        true
    }
    fn advance(&mut self) -> bool {
        false
    }
    fn get(&self, _mode: GetMode) -> Option<Quad> {
        None
    }
    fn close(&mut self) {}
}

/// A quad stream over an owned, already-materialized sequence, for
/// backends (e.g. a hash-index scan, a SQL result set fetched eagerly)
/// that compute their full result set up front. Mirrors [`VecStream`].
pub struct VecQuadStream {
    items: std::vec::IntoIter<Quad>,
    current: Option<Quad>,
    closed: bool,
}

impl VecQuadStream {
    pub fn new(items: Vec<Quad>) -> Self {
        let mut items = items.into_iter();
        let current = items.next();
        VecQuadStream {
            items,
            current,
            closed: false,
        }
    }
}

impl QuadStream for VecQuadStream {
    fn end(&mut self) -> bool {
        self.closed || self.current.is_none()
    }

    fn advance(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.items.next();
        self.current.is_some()
    }

    fn get(&self, mode: GetMode) -> Option<Quad> {
        match mode {
            GetMode::Current => self.current.clone(),
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}

/// Applies a filter predicate to an underlying quad stream, skipping
/// elements that don't match. Used by the generic `find_in_context`
/// fallback (spec §4.4): `context_serialize(c)` plus a map filter
/// applying `match(pattern, candidate)`.
pub struct FilterQuadStream<S, F> {
    inner: S,
    predicate: F,
}

impl<S, F> FilterQuadStream<S, F>
where
    S: QuadStream,
    F: Fn(&Quad) -> bool,
{
    pub fn new(mut inner: S, predicate: F) -> Self {
        let mut positioned = false;
        while !inner.end() {
            if let Some(q) = inner.get(GetMode::Current) {
                if predicate(&q) {
                    positioned = true;
                    break;
                }
            }
            if !inner.advance() {
                break;
            }
        }
        if !positioned {
            inner.close();
        }
        FilterQuadStream { inner, predicate }
    }
}

impl<S, F> QuadStream for FilterQuadStream<S, F>
where
    S: QuadStream,
    F: Fn(&Quad) -> bool,
{
    fn end(&mut self) -> bool {
        self.inner.end()
    }

    fn advance(&mut self) -> bool {
        while self.inner.advance() {
            match self.inner.get(GetMode::Current) {
                Some(q) if (self.predicate)(&q) => return true,
                Some(_) => continue,
                None => return false,
            }
        }
        false
    }

    fn get(&self, mode: GetMode) -> Option<Quad> {
        self.inner.get(mode)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Adapts a node-only cursor (`find_sources`/`find_targets`/`find_arcs`,
/// `get_contexts` — spec §4.4 `Iterator`) over an owned, materialized
/// sequence of nodes.
pub struct VecNodeIterator {
    items: std::vec::IntoIter<Node>,
}

impl VecNodeIterator {
    pub fn new(items: Vec<Node>) -> Self {
        VecNodeIterator {
            items: items.into_iter(),
        }
    }
}

impl Iterator for VecNodeIterator {
    type Item = Node;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(n: u32) -> Triple {
        let iri = Node::new_iri(format!("http://example.org/{n}")).unwrap();
        Triple::new(iri.clone(), iri.clone(), iri)
    }

    fn quad(n: u32) -> Quad {
        let iri = Node::new_iri(format!("http://example.org/{n}")).unwrap();
        Quad::new(iri.clone(), iri.clone(), iri, None)
    }

    #[test]
    fn vec_stream_yields_in_order_then_ends() {
        let mut stream = VecStream::new(vec![triple(1), triple(2)]);
        assert!(!stream.end());
        assert_eq!(stream.get(GetMode::Current), Some(triple(1)));
        assert!(stream.advance());
        assert_eq!(stream.get(GetMode::Current), Some(triple(2)));
        assert!(!stream.advance());
        assert!(stream.end());
    }

    #[test]
    fn close_ends_stream_immediately() {
        let mut stream = VecStream::new(vec![triple(1), triple(2)]);
        stream.close();
        assert!(stream.end());
        assert_eq!(stream.get(GetMode::Current), None);
    }

    #[test]
    fn filter_stream_skips_non_matching() {
        let inner = VecStream::new(vec![triple(1), triple(2), triple(3)]);
        let target = triple(2);
        let mut filtered = FilterStream::new(inner, move |t| t == &target);
        assert!(!filtered.end());
        assert_eq!(filtered.get(GetMode::Current), Some(triple(2)));
        assert!(!filtered.advance());
        assert!(filtered.end());
    }

    #[test]
    fn vec_quad_stream_yields_in_order_then_ends() {
        let mut stream = VecQuadStream::new(vec![quad(1), quad(2)]);
        assert!(!stream.end());
        assert_eq!(stream.get(GetMode::Current), Some(quad(1)));
        assert!(stream.advance());
        assert_eq!(stream.get(GetMode::Current), Some(quad(2)));
        assert!(!stream.advance());
        assert!(stream.end());
    }

    #[test]
    fn filter_quad_stream_skips_non_matching() {
        let inner = VecQuadStream::new(vec![quad(1), quad(2), quad(3)]);
        let target = quad(2);
        let mut filtered = FilterQuadStream::new(inner, move |q| q == &target);
        assert!(!filtered.end());
        assert_eq!(filtered.get(GetMode::Current), Some(quad(2)));
        assert!(!filtered.advance());
        assert!(filtered.end());
    }

    #[test]
    fn filter_quad_stream_empty_result_closes_immediately() {
        let inner = VecQuadStream::new(vec![quad(1), quad(2)]);
        let mut filtered = FilterQuadStream::new(inner, |_| false);
        assert!(filtered.end());
    }

    #[test]
    fn vec_node_iterator_yields_all() {
        let iri = |n: u32| Node::new_iri(format!("http://example.org/{n}")).unwrap();
        let mut it = VecNodeIterator::new(vec![iri(1), iri(2)]);
        assert_eq!(it.next(), Some(iri(1)));
        assert_eq!(it.next(), Some(iri(2)));
        assert_eq!(it.next(), None);
    }
}
