//! Content-addressed 64-bit node ids (spec §4.7.1): an MD5 digest of
//! the node's canonical string form, the low 8 bytes taken
//! little-endian so the id is stable regardless of host endianness.
//! Computing an id never touches the database — a client can insert
//! idempotently without a round trip to learn whether a node is
//! already interned.

use md5::{Digest, Md5};

use crate::node::{Literal, Node};

pub type NodeId = u64;

/// Which intern table a node belongs to (spec §4.7.1's three interning
/// tables: `Resources`, `Bnodes`, `Literals`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Resource,
    Bnode,
    Literal,
}

/// `"R" ‖ uri` / `"B" ‖ name` / `"L" ‖ value ‖ "<" ‖ lang ‖ ">" ‖ datatype`.
fn canonical_bytes(node: &Node) -> Vec<u8> {
    match node {
        Node::Iri(uri) => prefixed(b'R', uri),
        Node::Blank(name) => prefixed(b'B', name),
        Node::Literal(lit) => canonical_literal_bytes(lit),
    }
}

fn prefixed(tag: u8, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(tag);
    out.extend_from_slice(bytes);
    out
}

fn canonical_literal_bytes(lit: &Literal) -> Vec<u8> {
    let lang = lit.language().unwrap_or("");
    let datatype = lit.datatype().unwrap_or(&[]);
    let mut out = Vec::with_capacity(lit.lexical().len() + lang.len() + datatype.len() + 3);
    out.push(b'L');
    out.extend_from_slice(lit.lexical());
    out.push(b'<');
    out.extend_from_slice(lang.as_bytes());
    out.push(b'>');
    out.extend_from_slice(datatype);
    out
}

/// The node's content-addressed id.
pub fn node_id(node: &Node) -> NodeId {
    let digest = Md5::digest(canonical_bytes(node));
    u64::from_le_bytes(digest[0..8].try_into().expect("md5 digest is 16 bytes"))
}

pub fn node_kind(node: &Node) -> NodeKind {
    match node {
        Node::Iri(_) => NodeKind::Resource,
        Node::Blank(_) => NodeKind::Bnode,
        Node::Literal(_) => NodeKind::Literal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deterministic() {
        let a = Node::new_iri("http://example.org/a").unwrap();
        let b = Node::new_iri("http://example.org/a").unwrap();
        assert_eq!(node_id(&a), node_id(&b));
    }

    #[test]
    fn different_kinds_with_equal_bytes_do_not_collide() {
        let iri = Node::new_iri("x").unwrap();
        let blank = Node::new_blank(Some("x"));
        assert_ne!(node_id(&iri), node_id(&blank));
    }

    #[test]
    fn literal_language_and_datatype_are_both_covered_by_the_digest() {
        let plain = Node::new_literal("v", None::<String>, false).unwrap();
        let tagged = Node::new_literal("v", Some("en"), false).unwrap();
        assert_ne!(node_id(&plain), node_id(&tagged));
    }
}
