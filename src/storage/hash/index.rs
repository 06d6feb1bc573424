//! The hash-indexed backend's index descriptor table (spec §4.6.1),
//! carried over from `rdf_storage_hashes.c`'s static
//! `librdf_storage_hashes_descriptions[]` (SPEC_FULL §A.2) rather than
//! re-derived: which named indices exist, which statement components
//! each one's key and value cover, and which one is the `contexts`
//! index (excluded from the generic per-triple write loop — see the
//! original's comment "do not touch when storing statements!").

use crate::triple::ComponentMask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// `(s,p) -> o` — `find (s,p,?)`; list targets.
    Sp2o,
    /// `(p,o) -> s` — `find (?,p,o)`; list sources.
    Po2s,
    /// `(s,o) -> p` — `find (s,?,o)`; list arcs.
    So2p,
    /// `p -> (s,o)` — `find (?,p,?)` without scanning the canonical
    /// index. Enabled by the `index-predicates` option.
    P2so,
    /// `context -> whole triple encoding`. Enabled by the `contexts`
    /// option; not part of the generic write loop (spec §4.6.2).
    Contexts,
}

pub struct IndexDescriptor {
    pub kind: IndexKind,
    pub name: &'static str,
    pub key_mask: u8,
    pub value_mask: u8,
    /// Required for every open storage (spec §4.6.1: "at least one
    /// index whose combined key+value spans {S,P,O} MUST exist").
    pub mandatory: bool,
}

/// `sp2o`/`po2s`/`so2p` are always active; `p2so` and `contexts` are
/// gated by the `index-predicates`/`contexts` options (spec §4.6.4).
/// `sp2o` is the canonical index (spec glossary) used by `size`,
/// `serialize`, and `contains`.
pub const INDEX_LAYOUT: &[IndexDescriptor] = &[
    IndexDescriptor {
        kind: IndexKind::Sp2o,
        name: "sp2o",
        key_mask: ComponentMask::SUBJECT | ComponentMask::PREDICATE,
        value_mask: ComponentMask::OBJECT,
        mandatory: true,
    },
    IndexDescriptor {
        kind: IndexKind::Po2s,
        name: "po2s",
        key_mask: ComponentMask::PREDICATE | ComponentMask::OBJECT,
        value_mask: ComponentMask::SUBJECT,
        mandatory: true,
    },
    IndexDescriptor {
        kind: IndexKind::So2p,
        name: "so2p",
        key_mask: ComponentMask::SUBJECT | ComponentMask::OBJECT,
        value_mask: ComponentMask::PREDICATE,
        mandatory: true,
    },
    IndexDescriptor {
        kind: IndexKind::P2so,
        name: "p2so",
        key_mask: ComponentMask::PREDICATE,
        value_mask: ComponentMask::SUBJECT | ComponentMask::OBJECT,
        mandatory: false,
    },
    IndexDescriptor {
        kind: IndexKind::Contexts,
        name: "contexts",
        key_mask: ComponentMask::CONTEXT,
        value_mask: ComponentMask::SUBJECT | ComponentMask::PREDICATE | ComponentMask::OBJECT,
        mandatory: false,
    },
];

pub const CANONICAL_INDEX: &str = "sp2o";

pub fn descriptor(name: &str) -> Option<&'static IndexDescriptor> {
    INDEX_LAYOUT.iter().find(|d| d.name == name)
}
