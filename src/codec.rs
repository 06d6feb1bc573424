//! Canonical binary codec for nodes and statements (spec §4.3).
//!
//! Self-delimiting encoding: every node starts with a one-byte type
//! tag, followed by length-prefixed, NUL-terminated fields. Byte
//! layout is load-bearing — it is read back by `decode_node` and must
//! match exactly:
//!
//! * `R` (IRI) / `B` (Blank): `tag, len_hi, len_lo, bytes.., 0x00` —
//!   a 16-bit length, capped at `0xFFFF` bytes.
//! * `M` (short literal, lexical ≤ `0xFFFF` bytes): a 6-byte header
//!   (`tag, lex_len:u16, dt_len:u16, lang_len:u8`) then
//!   `lexical, 0x00, [datatype, 0x00], [language, 0x00]`.
//! * `N` (long literal): as `M` but with a 32-bit lexical length and
//!   an 8-byte header, for lexical forms over `0xFFFF` bytes.
//! * `L`: legacy literal tag, decode-only (spec §4.3 note). Predates
//!   the `dt_len` field: a 6-byte header (`tag, is_wf_xml:u8,
//!   lex_len:u16, <reserved>, lang_len:u8`) then `lexical, 0x00,
//!   [language, 0x00]` — no datatype-URI field at all. Instead the
//!   `is_wf_xml` flag (nonzero high nibble of byte 1) marks the
//!   literal as `rdf:XMLLiteral`-typed.

use thiserror::Error;

use crate::node::{Literal, Node};
use crate::triple::{ComponentMask, Pattern, Quad, Triple};

const TAG_IRI: u8 = b'R';
const TAG_BLANK: u8 = b'B';
const TAG_LITERAL_SHORT: u8 = b'M';
const TAG_LITERAL_LONG: u8 = b'N';
const TAG_LITERAL_LEGACY: u8 = b'L';

const MAX_SHORT_LEN: usize = 0xFFFF;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("node exceeds the 0xFFFF byte limit for its tag")]
    TooLong,
    #[error("buffer truncated while decoding")]
    Truncated,
    #[error("unrecognized node type tag {0:#04x}")]
    UnknownTag(u8),
    #[error("missing NUL terminator in encoded field")]
    MissingTerminator,
    #[error("invalid UTF-8 in encoded field")]
    InvalidUtf8,
    #[error(transparent)]
    Node(#[from] crate::node::NodeError),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Encode a node into its canonical byte representation, appending to `out`.
pub fn encode_node(node: &Node, out: &mut Vec<u8>) -> CodecResult<()> {
    match node {
        Node::Iri(bytes) => encode_tagged_bytes(TAG_IRI, bytes, out),
        Node::Blank(bytes) => encode_tagged_bytes(TAG_BLANK, bytes, out),
        Node::Literal(lit) => encode_literal(lit, out),
    }
}

fn encode_tagged_bytes(tag: u8, bytes: &[u8], out: &mut Vec<u8>) -> CodecResult<()> {
    if bytes.len() > MAX_SHORT_LEN {
        return Err(CodecError::TooLong);
    }
    out.push(tag);
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
    out.push(0x00);
    Ok(())
}

fn encode_literal(lit: &Literal, out: &mut Vec<u8>) -> CodecResult<()> {
    let lexical = lit.lexical();
    let datatype = lit.datatype().unwrap_or(&[]);
    let language = lit.language().unwrap_or("").as_bytes();

    if datatype.len() > MAX_SHORT_LEN || language.len() > 0xFF {
        return Err(CodecError::TooLong);
    }

    if lexical.len() <= MAX_SHORT_LEN {
        out.push(TAG_LITERAL_SHORT);
        out.extend_from_slice(&(lexical.len() as u16).to_be_bytes());
        out.extend_from_slice(&(datatype.len() as u16).to_be_bytes());
        out.push(language.len() as u8);
    } else {
        out.push(TAG_LITERAL_LONG);
        out.extend_from_slice(&(lexical.len() as u32).to_be_bytes());
        out.extend_from_slice(&(datatype.len() as u16).to_be_bytes());
        out.push(language.len() as u8);
    }

    out.extend_from_slice(lexical);
    out.push(0x00);
    if !datatype.is_empty() {
        out.extend_from_slice(datatype);
        out.push(0x00);
    }
    if !language.is_empty() {
        out.extend_from_slice(language);
        out.push(0x00);
    }
    Ok(())
}

/// Decode one node from the front of `buf`, returning it and the
/// number of bytes consumed.
pub fn decode_node(buf: &[u8]) -> CodecResult<(Node, usize)> {
    let tag = *buf.first().ok_or(CodecError::Truncated)?;
    match tag {
        TAG_IRI | TAG_BLANK => decode_tagged_bytes(tag, buf),
        TAG_LITERAL_SHORT | TAG_LITERAL_LONG | TAG_LITERAL_LEGACY => decode_literal(tag, buf),
        other => Err(CodecError::UnknownTag(other)),
    }
}

fn decode_tagged_bytes(tag: u8, buf: &[u8]) -> CodecResult<(Node, usize)> {
    let len = read_u16(buf, 1)? as usize;
    let start = 3;
    let end = start.checked_add(len).ok_or(CodecError::Truncated)?;
    let terminator = *buf.get(end).ok_or(CodecError::Truncated)?;
    if terminator != 0x00 {
        return Err(CodecError::MissingTerminator);
    }
    let bytes = buf[start..end].to_vec();
    let node = if tag == TAG_IRI {
        Node::new_iri(bytes)?
    } else {
        Node::new_blank(Some(bytes))
    };
    Ok((node, end + 1))
}

fn decode_literal(tag: u8, buf: &[u8]) -> CodecResult<(Node, usize)> {
    if tag == TAG_LITERAL_LEGACY {
        return decode_literal_legacy(buf);
    }

    let (lex_len, header_len) = if tag == TAG_LITERAL_LONG {
        (read_u32(buf, 1)? as usize, 8)
    } else {
        (read_u16(buf, 1)? as usize, 6)
    };
    let dt_len_offset = if tag == TAG_LITERAL_LONG { 5 } else { 3 };
    let dt_len = read_u16(buf, dt_len_offset)? as usize;
    let lang_len = *buf.get(dt_len_offset + 2).ok_or(CodecError::Truncated)? as usize;

    let mut pos = header_len;
    let lexical = read_terminated(buf, pos, lex_len)?;
    pos += lex_len + 1;

    let datatype = if dt_len > 0 {
        let field = read_terminated(buf, pos, dt_len)?;
        pos += dt_len + 1;
        Some(field)
    } else {
        None
    };

    let language = if lang_len > 0 {
        let field = read_terminated(buf, pos, lang_len)?;
        pos += lang_len + 1;
        Some(String::from_utf8(field).map_err(|_| CodecError::InvalidUtf8)?)
    } else {
        None
    };

    let node = if language.is_some() {
        Node::new_literal(lexical, language, false)?
    } else {
        Node::new_typed_literal(lexical, None::<String>, datatype)?
    };
    Ok((node, pos))
}

/// Decodes the legacy `L`-tagged literal (`rdf_node.c:1042-1062`). No
/// `dt_len` field exists here: `lex_len` sits at offset 2-3, `lang_len`
/// at offset 5, and XML-literal-ness rides on the `is_wf_xml` flag at
/// offset 1 rather than a datatype-URI length prefix.
fn decode_literal_legacy(buf: &[u8]) -> CodecResult<(Node, usize)> {
    let flag_byte = *buf.get(1).ok_or(CodecError::Truncated)?;
    let is_wf_xml = flag_byte & 0xf0 != 0;
    let lex_len = read_u16(buf, 2)? as usize;
    let lang_len = *buf.get(5).ok_or(CodecError::Truncated)? as usize;

    let mut pos = 6;
    let lexical = read_terminated(buf, pos, lex_len)?;
    pos += lex_len + 1;

    let language = if lang_len > 0 {
        let field = read_terminated(buf, pos, lang_len)?;
        pos += lang_len + 1;
        Some(String::from_utf8(field).map_err(|_| CodecError::InvalidUtf8)?)
    } else {
        None
    };

    let node = if is_wf_xml {
        Node::new_literal(lexical, None::<String>, true)?
    } else {
        Node::new_literal(lexical, language, false)?
    };
    Ok((node, pos))
}

fn read_terminated(buf: &[u8], start: usize, len: usize) -> CodecResult<Vec<u8>> {
    let end = start.checked_add(len).ok_or(CodecError::Truncated)?;
    let terminator = *buf.get(end).ok_or(CodecError::Truncated)?;
    if terminator != 0x00 {
        return Err(CodecError::MissingTerminator);
    }
    Ok(buf[start..end].to_vec())
}

fn read_u16(buf: &[u8], offset: usize) -> CodecResult<u16> {
    let slice = buf.get(offset..offset + 2).ok_or(CodecError::Truncated)?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_u32(buf: &[u8], offset: usize) -> CodecResult<u32> {
    let slice = buf.get(offset..offset + 4).ok_or(CodecError::Truncated)?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Encode a fully-bound triple as three back-to-back nodes.
pub fn encode_triple(triple: &Triple, out: &mut Vec<u8>) -> CodecResult<()> {
    encode_node(&triple.subject, out)?;
    encode_node(&triple.predicate, out)?;
    encode_node(&triple.object, out)
}

pub fn decode_triple(buf: &[u8]) -> CodecResult<(Triple, usize)> {
    let (subject, n1) = decode_node(buf)?;
    let (predicate, n2) = decode_node(&buf[n1..])?;
    let (object, n3) = decode_node(&buf[n1 + n2..])?;
    Ok((Triple::new(subject, predicate, object), n1 + n2 + n3))
}

/// Encode a partial statement (spec §4.2/§4.3): a leading mask byte
/// followed by only the nodes present in `pattern`, in
/// subject/predicate/object/context order.
pub fn encode_pattern(pattern: &Pattern, out: &mut Vec<u8>) -> CodecResult<()> {
    out.push(pattern.mask());
    if let Some(n) = &pattern.subject {
        encode_node(n, out)?;
    }
    if let Some(n) = &pattern.predicate {
        encode_node(n, out)?;
    }
    if let Some(n) = &pattern.object {
        encode_node(n, out)?;
    }
    if let Some(Some(n)) = &pattern.context {
        encode_node(n, out)?;
    }
    Ok(())
}

pub fn decode_pattern(buf: &[u8]) -> CodecResult<(Pattern, usize)> {
    let mask = *buf.first().ok_or(CodecError::Truncated)?;
    let mut pos = 1;
    let mut pattern = Pattern::any();

    if mask & ComponentMask::SUBJECT != 0 {
        let (n, len) = decode_node(&buf[pos..])?;
        pattern.subject = Some(n);
        pos += len;
    }
    if mask & ComponentMask::PREDICATE != 0 {
        let (n, len) = decode_node(&buf[pos..])?;
        pattern.predicate = Some(n);
        pos += len;
    }
    if mask & ComponentMask::OBJECT != 0 {
        let (n, len) = decode_node(&buf[pos..])?;
        pattern.object = Some(n);
        pos += len;
    }
    if mask & ComponentMask::CONTEXT != 0 {
        let (n, len) = decode_node(&buf[pos..])?;
        pattern.context = Some(Some(n));
        pos += len;
    }
    Ok((pattern, pos))
}

pub fn encode_quad(quad: &Quad, out: &mut Vec<u8>) -> CodecResult<()> {
    let has_context = quad.context.is_some() as u8;
    out.push(ComponentMask::ALL & !ComponentMask::CONTEXT | (has_context * ComponentMask::CONTEXT));
    encode_node(&quad.subject, out)?;
    encode_node(&quad.predicate, out)?;
    encode_node(&quad.object, out)?;
    if let Some(ctx) = &quad.context {
        encode_node(ctx, out)?;
    }
    Ok(())
}

pub fn decode_quad(buf: &[u8]) -> CodecResult<(Quad, usize)> {
    let mask = *buf.first().ok_or(CodecError::Truncated)?;
    let mut pos = 1;
    let (subject, len) = decode_node(&buf[pos..])?;
    pos += len;
    let (predicate, len) = decode_node(&buf[pos..])?;
    pos += len;
    let (object, len) = decode_node(&buf[pos..])?;
    pos += len;
    let context = if mask & ComponentMask::CONTEXT != 0 {
        let (n, len) = decode_node(&buf[pos..])?;
        pos += len;
        Some(n)
    } else {
        None
    };
    Ok((Quad::new(subject, predicate, object, context), pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Worked example from spec §8 scenario S1: the IRI
    /// `"http://example.org/"` (19 bytes) encodes as tag `R`, a 16-bit
    /// big-endian length `0x0013`, the 19 UTF-8 bytes, then a NUL.
    #[test]
    fn iri_encoding_matches_worked_example() {
        let node = Node::new_iri("http://example.org/").unwrap();
        let mut out = Vec::new();
        encode_node(&node, &mut out).unwrap();

        assert_eq!(out[0], b'R');
        assert_eq!(&out[1..3], &19u16.to_be_bytes());
        assert_eq!(&out[3..22], b"http://example.org/");
        assert_eq!(out[22], 0x00);
        assert_eq!(out.len(), 23);
    }

    #[test]
    fn node_round_trips_through_codec() {
        for node in [
            Node::new_iri("http://example.org/a").unwrap(),
            Node::new_blank(Some("x1")),
            Node::new_literal("hello", Some("en"), false).unwrap(),
            Node::new_typed_literal("42", None::<String>, Some(b"http://www.w3.org/2001/XMLSchema#integer".to_vec())).unwrap(),
            Node::new_literal("plain", None::<String>, false).unwrap(),
        ] {
            let mut buf = Vec::new();
            encode_node(&node, &mut buf).unwrap();
            let (decoded, consumed) = decode_node(&buf).unwrap();
            assert_eq!(consumed, buf.len());
            assert_eq!(decoded, node);
        }
    }

    #[test]
    fn long_literal_uses_n_tag() {
        let long = "x".repeat(MAX_SHORT_LEN + 10);
        let node = Node::new_literal(long, None::<String>, false).unwrap();
        let mut buf = Vec::new();
        encode_node(&node, &mut buf).unwrap();
        assert_eq!(buf[0], TAG_LITERAL_LONG);
        let (decoded, consumed) = decode_node(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, node);
    }

    #[test]
    fn oversized_iri_rejected() {
        let node = Node::new_iri("x".repeat(MAX_SHORT_LEN + 1)).unwrap();
        let mut buf = Vec::new();
        assert_eq!(encode_node(&node, &mut buf).unwrap_err(), CodecError::TooLong);
    }

    #[test]
    fn triple_round_trips() {
        let t = Triple::new(
            Node::new_iri("s").unwrap(),
            Node::new_iri("p").unwrap(),
            Node::new_literal("o", None::<String>, false).unwrap(),
        );
        let mut buf = Vec::new();
        encode_triple(&t, &mut buf).unwrap();
        let (decoded, consumed) = decode_triple(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, t);
    }

    /// Hand-built legacy `L` buffer, layout per `rdf_node.c:1042-1062`:
    /// `tag, is_wf_xml=0, lex_len:u16=2, <reserved>=0, lang_len=0, "hi", 0x00`.
    #[test]
    fn legacy_literal_decodes_with_correct_offsets() {
        let mut buf = vec![TAG_LITERAL_LEGACY, 0x00, 0x00, 0x02, 0x00, 0x00];
        buf.extend_from_slice(b"hi");
        buf.push(0x00);

        let (decoded, consumed) = decode_node(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, Node::new_literal("hi", None::<String>, false).unwrap());
    }

    #[test]
    fn legacy_literal_decodes_language() {
        let mut buf = vec![TAG_LITERAL_LEGACY, 0x00, 0x00, 0x05, 0x00, 0x02];
        buf.extend_from_slice(b"hello");
        buf.push(0x00);
        buf.extend_from_slice(b"en");
        buf.push(0x00);

        let (decoded, consumed) = decode_node(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded, Node::new_literal("hello", Some("en"), false).unwrap());
    }

    /// A nonzero high nibble in the `is_wf_xml` byte marks the literal
    /// `rdf:XMLLiteral`-typed instead of reading a datatype-URI field
    /// (the legacy format has none).
    #[test]
    fn legacy_literal_xml_flag_sets_xml_literal_datatype() {
        let mut buf = vec![TAG_LITERAL_LEGACY, 0xf0, 0x00, 0x04, 0x00, 0x00];
        buf.extend_from_slice(b"abcd");
        buf.push(0x00);

        let (decoded, consumed) = decode_node(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        let expected = Node::new_literal("abcd", None::<String>, true).unwrap();
        assert_eq!(decoded, expected);
        assert!(decoded.as_literal().unwrap().is_wf_xml());
    }

    #[test]
    fn pattern_mask_round_trips() {
        let pattern = Pattern::any()
            .with_predicate(Node::new_iri("p").unwrap())
            .with_context(None);
        let mut buf = Vec::new();
        encode_pattern(&pattern, &mut buf).unwrap();
        let (decoded, consumed) = decode_pattern(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded.predicate, pattern.predicate);
        assert!(decoded.subject.is_none());
    }
}
