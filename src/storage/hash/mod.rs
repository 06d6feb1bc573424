//! The hash-indexed multi-index quad store (spec §4.6) — the engine's
//! always-available default backend: up to five named indices over a
//! generic byte multimap, answering partial-match `find` queries in
//! sub-linear time without a SQL engine in the loop.

pub mod disk;
pub mod index;
pub mod memory;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::codec::{decode_pattern, decode_triple, encode_pattern, encode_triple};
use crate::node::Node;
use crate::storage::{Storage, StorageError, StorageOptions, StorageResult};
use crate::stream::{QuadStream, VecQuadStream};
use crate::triple::{ComponentMask, Pattern, Quad, Triple};

pub use index::{IndexDescriptor, IndexKind, CANONICAL_INDEX, INDEX_LAYOUT};
pub use memory::MemoryMultimap;

/// A generic key → multi-value byte map (spec §4.6.1): the abstract
/// key-value service each named index is built over. `memory.rs` and
/// `disk.rs` are the two implementations this crate ships; any other
/// storage (an mmap'd hash file, a remote KV service) can plug in by
/// implementing this trait.
pub trait ByteMultimap: Send {
    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;
    fn delete(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;
    fn get(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>>;
    /// Every `(key, value)` pair, in implementation-defined order.
    fn iter_all(&self) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;
    /// Total `(key, value)` pair count, or a negative value if unknown.
    fn len(&self) -> StorageResult<i64>;
    fn clear(&mut self) -> StorageResult<()>;
}

/// The hash-indexed backend (spec §4.6). `open()` reads the `hash-type`
/// option to decide whether each active index is backed by
/// [`MemoryMultimap`] or [`disk::DiskMultimap`]; everything else
/// (write protocol, read protocol, options) is identical either way.
pub struct HashStorage {
    name: String,
    indices: HashMap<&'static str, Box<dyn ByteMultimap>>,
    index_predicates: bool,
    contexts_enabled: bool,
    write: bool,
    db_dir: Option<PathBuf>,
    db: Option<Arc<rocksdb::DB>>,
    opened: bool,
}

/// The in-memory configuration of the hash-indexed backend — the
/// library's zero-setup default (spec §A.1).
pub type MemoryHashStorage = HashStorage;
/// The on-disk (RocksDB-backed) configuration of the hash-indexed
/// backend, selected via the `hash-type='rocksdb'` option.
pub type DiskHashStorage = HashStorage;

impl Default for HashStorage {
    fn default() -> Self {
        HashStorage::new()
    }
}

impl HashStorage {
    pub fn new() -> Self {
        HashStorage {
            name: String::new(),
            indices: HashMap::new(),
            index_predicates: false,
            contexts_enabled: false,
            write: true,
            db_dir: None,
            db: None,
            opened: false,
        }
    }

    fn require_open(&self) -> StorageResult<()> {
        if self.opened {
            Ok(())
        } else {
            Err(StorageError::Backend("storage not open".to_string()))
        }
    }

    fn index(&self, name: &str) -> StorageResult<&dyn ByteMultimap> {
        self.indices
            .get(name)
            .map(|b| b.as_ref())
            .ok_or_else(|| StorageError::Backend(format!("index {name} not active")))
    }

    fn index_mut(&mut self, name: &str) -> StorageResult<&mut Box<dyn ByteMultimap>> {
        self.indices
            .get_mut(name)
            .ok_or_else(|| StorageError::Backend(format!("index {name} not active")))
    }

    fn active_index_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = vec!["sp2o", "po2s", "so2p"];
        if self.index_predicates {
            names.push("p2so");
        }
        if self.contexts_enabled {
            names.push("contexts");
        }
        names
    }

    /// Key/value encoding for the three (or four, with `p2so`)
    /// non-context indices: the key never carries context (spec
    /// §4.6.2 step 1); the value always carries context as an extra
    /// trailing field when present, so the same triple recorded under
    /// two different contexts produces two distinct value encodings.
    fn encode_key(triple: &Triple, mask: u8) -> StorageResult<Vec<u8>> {
        let mut pattern = Pattern::any();
        if mask & ComponentMask::SUBJECT != 0 {
            pattern = pattern.with_subject(triple.subject.clone());
        }
        if mask & ComponentMask::PREDICATE != 0 {
            pattern = pattern.with_predicate(triple.predicate.clone());
        }
        if mask & ComponentMask::OBJECT != 0 {
            pattern = pattern.with_object(triple.object.clone());
        }
        let mut out = Vec::new();
        encode_pattern(&pattern, &mut out)?;
        Ok(out)
    }

    fn encode_value(
        triple: &Triple,
        context: Option<&Node>,
        mask: u8,
    ) -> StorageResult<Vec<u8>> {
        let mut pattern = Pattern::any();
        if mask & ComponentMask::SUBJECT != 0 {
            pattern = pattern.with_subject(triple.subject.clone());
        }
        if mask & ComponentMask::PREDICATE != 0 {
            pattern = pattern.with_predicate(triple.predicate.clone());
        }
        if mask & ComponentMask::OBJECT != 0 {
            pattern = pattern.with_object(triple.object.clone());
        }
        pattern = pattern.with_context(context.cloned());
        let mut out = Vec::new();
        encode_pattern(&pattern, &mut out)?;
        Ok(out)
    }

    /// Decodes a non-context index's `(key, value)` pair back into a
    /// full quad, given the two masks used to encode it.
    fn decode_entry(key: &[u8], value: &[u8]) -> StorageResult<Quad> {
        let (key_pattern, _) = decode_pattern(key)?;
        let (value_pattern, _) = decode_pattern(value)?;
        let subject = key_pattern
            .subject
            .or(value_pattern.subject)
            .ok_or_else(|| StorageError::Backend("index entry missing subject".into()))?;
        let predicate = key_pattern
            .predicate
            .or(value_pattern.predicate)
            .ok_or_else(|| StorageError::Backend("index entry missing predicate".into()))?;
        let object = key_pattern
            .object
            .or(value_pattern.object)
            .ok_or_else(|| StorageError::Backend("index entry missing object".into()))?;
        let context = value_pattern.context.flatten();
        Ok(Quad::new(subject, predicate, object, context))
    }

    fn add_remove(&mut self, quad: &Quad, adding: bool) -> StorageResult<()> {
        self.require_open()?;
        if !self.write {
            return Err(StorageError::Backend(
                "storage opened read-only (write=false)".to_string(),
            ));
        }
        let triple = quad.triple();
        let context = quad.context.as_ref();

        for name in ["sp2o", "po2s", "so2p"]
            .into_iter()
            .chain(self.index_predicates.then_some("p2so"))
        {
            let descriptor = index::descriptor(name)
                .ok_or_else(|| StorageError::Backend(format!("unknown index {name}")))?;
            let key = Self::encode_key(&triple, descriptor.key_mask)?;
            let value = Self::encode_value(&triple, context, descriptor.value_mask)?;
            let bucket = self.index_mut(name)?;
            if adding {
                bucket.put(&key, &value)?;
            } else {
                bucket.delete(&key, &value)?;
            }
        }

        if self.contexts_enabled {
            if let Some(ctx) = context {
                let mut key = Vec::new();
                crate::codec::encode_node(ctx, &mut key)?;
                let mut value = Vec::new();
                encode_triple(&triple, &mut value)?;
                let bucket = self.index_mut("contexts")?;
                if adding {
                    bucket.put(&key, &value)?;
                } else {
                    bucket.delete(&key, &value)?;
                }
            }
        }

        Ok(())
    }
}

impl Storage for HashStorage {
    fn open(&mut self, options: &StorageOptions) -> StorageResult<()> {
        let hash_type = options
            .get("hash-type")
            .ok_or_else(|| StorageError::InvalidOptions("hash-type is required".to_string()))?
            .to_string();
        self.name = options.get("name").unwrap_or("default").to_string();
        self.write = options.get_bool("write", true);
        self.contexts_enabled = options.get_bool("contexts", false);
        self.index_predicates = options.get_bool("index-predicates", false);
        let is_new = options.get_bool("new", false);

        let names = {
            let mut n: Vec<&'static str> = vec!["sp2o", "po2s", "so2p"];
            if self.index_predicates {
                n.push("p2so");
            }
            if self.contexts_enabled {
                n.push("contexts");
            }
            n
        };

        match hash_type.as_str() {
            "memory" => {
                for name in names {
                    self.indices.insert(name, Box::new(MemoryMultimap::new()));
                }
            }
            "rocksdb" | "disk" => {
                let dir = options
                    .get("dir")
                    .ok_or_else(|| {
                        StorageError::InvalidOptions(
                            "dir is required for hash-type='rocksdb'".to_string(),
                        )
                    })?
                    .to_string();
                let dir = PathBuf::from(dir).join(&self.name);
                if is_new && dir.exists() {
                    std::fs::remove_dir_all(&dir)
                        .map_err(|e| StorageError::Backend(e.to_string()))?;
                }
                std::fs::create_dir_all(&dir).map_err(|e| StorageError::Backend(e.to_string()))?;
                let db = disk::open_db(&dir, &names)?;
                for name in names {
                    self.indices.insert(
                        name,
                        Box::new(disk::DiskMultimap::new(db.clone(), name, dir.clone())),
                    );
                }
                self.db_dir = Some(dir);
                self.db = Some(db);
            }
            other => {
                return Err(StorageError::InvalidOptions(format!(
                    "unrecognized hash-type {other:?}"
                )))
            }
        }

        self.opened = true;
        tracing::info!(target: crate::log::FACILITY_STORAGE, hash_type = %hash_type, contexts = self.contexts_enabled, "hash storage opened");
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        self.indices.clear();
        self.db = None;
        self.opened = false;
        Ok(())
    }

    fn size(&self) -> StorageResult<i64> {
        self.require_open()?;
        self.index(CANONICAL_INDEX)?.len()
    }

    fn add(&mut self, quad: &Quad) -> StorageResult<()> {
        self.add_remove(quad, true)
    }

    fn remove(&mut self, quad: &Quad) -> StorageResult<()> {
        self.add_remove(quad, false)
    }

    fn contains(&self, triple: &Triple) -> StorageResult<bool> {
        self.require_open()?;
        let descriptor = index::descriptor(CANONICAL_INDEX).unwrap();
        let key = Self::encode_key(triple, descriptor.key_mask)?;
        for value in self.index(CANONICAL_INDEX)?.get(&key)? {
            let quad = Self::decode_entry(&key, &value)?;
            if quad.object == triple.object {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn find<'a>(
        &'a self,
        pattern: &Pattern,
    ) -> StorageResult<Box<dyn crate::stream::QuadStream + 'a>> {
        self.require_open()?;

        // `(?, p, ?)` with the p2so index active: a direct lookup
        // instead of scanning the canonical index (spec §4.6.3).
        if self.index_predicates
            && pattern.subject.is_none()
            && pattern.object.is_none()
            && pattern.predicate.is_some()
        {
            let predicate = pattern.predicate.clone().unwrap();
            let mut key = Vec::new();
            crate::codec::encode_node(&predicate, &mut key)?;
            let mut quads = Vec::new();
            for value in self.index("p2so")?.get(&key)? {
                let (value_pattern, _) = decode_pattern(&value)?;
                let subject = value_pattern
                    .subject
                    .ok_or_else(|| StorageError::Backend("p2so entry missing subject".into()))?;
                let object = value_pattern
                    .object
                    .ok_or_else(|| StorageError::Backend("p2so entry missing object".into()))?;
                let context = value_pattern.context.flatten();
                let quad = Quad::new(subject, predicate.clone(), object, context);
                if quad.matches(pattern) {
                    quads.push(quad);
                }
            }
            return Ok(Box::new(VecQuadStream::new(quads)));
        }

        let mut quads = Vec::new();
        for (key, value) in self.index(CANONICAL_INDEX)?.iter_all()? {
            let quad = Self::decode_entry(&key, &value)?;
            if quad.matches(pattern) {
                quads.push(quad);
            }
        }
        Ok(Box::new(VecQuadStream::new(quads)))
    }

    fn name(&self) -> &'static str {
        "hashes"
    }

    fn supports_contexts(&self) -> bool {
        self.contexts_enabled
    }

    fn context_serialize<'a>(
        &'a self,
        context: &Node,
    ) -> StorageResult<Box<dyn crate::stream::QuadStream + 'a>> {
        self.require_open()?;
        if !self.contexts_enabled {
            return self.find(&Pattern::any().with_context(Some(context.clone())));
        }
        let mut key = Vec::new();
        crate::codec::encode_node(context, &mut key)?;
        let mut quads = Vec::new();
        for value in self.index("contexts")?.get(&key)? {
            let (triple, _) = decode_triple(&value)?;
            quads.push(Quad::new(
                triple.subject,
                triple.predicate,
                triple.object,
                Some(context.clone()),
            ));
        }
        Ok(Box::new(VecQuadStream::new(quads)))
    }

    fn get_contexts(&self) -> StorageResult<Vec<Node>> {
        self.require_open()?;
        if !self.contexts_enabled {
            return Err(StorageError::NotSupported(
                "get_contexts requires the contexts index".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for (key, _) in self.index("contexts")?.iter_all()? {
            let (node, _) = crate::codec::decode_node(&key)?;
            seen.insert(node);
        }
        Ok(seen.into_iter().collect())
    }

    fn find_sources(&self, predicate: &Node, object: &Node) -> StorageResult<Vec<Node>> {
        self.require_open()?;
        let descriptor = index::descriptor("po2s").unwrap();
        let triple = Triple::new(Node::new_blank::<Vec<u8>>(None), predicate.clone(), object.clone());
        let key = Self::encode_key(&triple, descriptor.key_mask)?;
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for value in self.index("po2s")?.get(&key)? {
            let (value_pattern, _) = decode_pattern(&value)?;
            if let Some(subject) = value_pattern.subject {
                if seen.insert(subject.clone()) {
                    out.push(subject);
                }
            }
        }
        Ok(out)
    }

    fn find_targets(&self, subject: &Node, predicate: &Node) -> StorageResult<Vec<Node>> {
        self.require_open()?;
        let descriptor = index::descriptor("sp2o").unwrap();
        let triple = Triple::new(subject.clone(), predicate.clone(), Node::new_blank::<Vec<u8>>(None));
        let key = Self::encode_key(&triple, descriptor.key_mask)?;
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for value in self.index("sp2o")?.get(&key)? {
            let (value_pattern, _) = decode_pattern(&value)?;
            if let Some(object) = value_pattern.object {
                if seen.insert(object.clone()) {
                    out.push(object);
                }
            }
        }
        Ok(out)
    }

    fn find_arcs(&self, subject: &Node, object: &Node) -> StorageResult<Vec<Node>> {
        self.require_open()?;
        let descriptor = index::descriptor("so2p").unwrap();
        let triple = Triple::new(subject.clone(), Node::new_blank::<Vec<u8>>(None), object.clone());
        let key = Self::encode_key(&triple, descriptor.key_mask)?;
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for value in self.index("so2p")?.get(&key)? {
            let (value_pattern, _) = decode_pattern(&value)?;
            if let Some(predicate) = value_pattern.predicate {
                if seen.insert(predicate.clone()) {
                    out.push(predicate);
                }
            }
        }
        Ok(out)
    }

    fn get_feature(&self, uri: &Node) -> StorageResult<Option<Node>> {
        if let Some(iri) = uri.as_iri() {
            if iri.ends_with(b"#contexts") {
                let value = if self.contexts_enabled { "1" } else { "0" };
                let literal = Node::new_typed_literal(value, None::<String>, None::<Vec<u8>>)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                return Ok(Some(literal));
            }
        }
        Ok(None)
    }

    /// Duplicates the hash-type/option configuration under a fresh
    /// name, so the clone gets its own storage files (spec §4.6.5);
    /// data is not copied — "FIXME: not tested" in the original, so
    /// this is best-effort per DESIGN.md's resolution of that Open
    /// Question.
    fn clone_storage(&self) -> StorageResult<Box<dyn Storage>> {
        self.require_open()?;
        let mut clone = HashStorage::new();
        clone.index_predicates = self.index_predicates;
        clone.contexts_enabled = self.contexts_enabled;
        clone.write = self.write;
        clone.name = format!("{}-clone-{}", self.name, uuid::Uuid::new_v4());

        let names = self.active_index_names();
        if let Some(dir) = &self.db_dir {
            let parent = dir
                .parent()
                .ok_or_else(|| StorageError::Backend("hash dir has no parent".to_string()))?;
            let new_dir = parent.join(&clone.name);
            std::fs::create_dir_all(&new_dir).map_err(|e| StorageError::Backend(e.to_string()))?;
            let db = disk::open_db(&new_dir, &names)?;
            for name in names {
                clone.indices.insert(
                    name,
                    Box::new(disk::DiskMultimap::new(db.clone(), name, new_dir.clone())),
                );
            }
            clone.db_dir = Some(new_dir);
            clone.db = Some(db);
        } else {
            for name in names {
                clone.indices.insert(name, Box::new(MemoryMultimap::new()));
            }
        }
        clone.opened = true;
        Ok(Box::new(clone))
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::storage::StorageOptions;

    fn iri(s: &str) -> Node {
        Node::new_iri(s).unwrap()
    }

    fn memory_store(extra: &str) -> HashStorage {
        let mut s = HashStorage::new();
        let opts_str = format!("hash-type='memory'{extra}");
        s.open(&StorageOptions::parse(&opts_str).unwrap()).unwrap();
        s
    }

    /// Scenario S1 (spec §8): add & find.
    #[test]
    fn s1_add_and_find() {
        let mut s = memory_store("");
        let t = Quad::new(iri("http://a"), iri("http://p"), iri("http://o"), None);
        s.add(&t).unwrap();
        assert_eq!(s.size().unwrap(), 1);

        let pattern = Pattern::any().with_subject(iri("http://a"));
        let mut stream = s.find(&pattern).unwrap();
        let found = crate::stream::QuadStream::get(&*stream, crate::stream::GetMode::Current);
        assert_eq!(found, Some(t));
        stream.close();
    }

    /// Scenario S2: duplicate rejection.
    #[test]
    fn s2_duplicate_add_is_idempotent() {
        let mut s = memory_store("");
        let t = Quad::new(iri("http://a"), iri("http://p"), iri("http://o"), None);
        s.add(&t).unwrap();
        s.add(&t).unwrap();
        assert_eq!(s.size().unwrap(), 1);
    }

    /// Scenario S3: remove.
    #[test]
    fn s3_remove() {
        let mut s = memory_store("");
        let t = Quad::new(iri("http://a"), iri("http://p"), iri("http://o"), None);
        s.add(&t).unwrap();
        s.remove(&t).unwrap();
        assert_eq!(s.size().unwrap(), 0);
        assert!(!s.contains(&t.triple()).unwrap());
    }

    /// Scenario S4: context enumeration and isolation.
    #[test]
    fn s4_context_enumeration_and_isolation() {
        let mut s = memory_store(",contexts='yes'");
        s.add(&Quad::new(iri("http://a"), iri("http://p"), iri("1"), Some(iri("http://c1"))))
            .unwrap();
        s.add(&Quad::new(iri("http://a"), iri("http://p"), iri("2"), Some(iri("http://c2"))))
            .unwrap();

        let mut contexts = s.get_contexts().unwrap();
        contexts.sort_by_key(|n| n.to_string());
        assert_eq!(contexts, vec![iri("http://c1"), iri("http://c2")]);

        s.context_remove_all(&iri("http://c1")).unwrap();
        assert_eq!(s.size().unwrap(), 1);
    }

    /// Index consistency (spec §8 property 4): canonical and
    /// auxiliary indices agree after interleaved add/remove.
    #[test]
    fn index_consistency_across_add_remove() {
        let mut s = memory_store(",index-predicates='yes'");
        let a = Quad::new(iri("http://a"), iri("http://p"), iri("http://o1"), None);
        let b = Quad::new(iri("http://a"), iri("http://p"), iri("http://o2"), None);
        s.add(&a).unwrap();
        s.add(&b).unwrap();
        s.remove(&a).unwrap();

        assert_eq!(s.size().unwrap(), 1);
        let via_p2so = s.find(&Pattern::any().with_predicate(iri("http://p"))).unwrap();
        let via_p2so = crate::stream::QuadStream::get(&*via_p2so, crate::stream::GetMode::Current);
        assert_eq!(via_p2so, Some(b.clone()));
        assert!(s.contains(&b.triple()).unwrap());
        assert!(!s.contains(&a.triple()).unwrap());
    }

    #[test]
    fn p2so_index_matches_canonical_scan() {
        let mut s = memory_store(",index-predicates='yes'");
        s.add(&Quad::new(iri("http://a"), iri("http://p"), iri("http://o"), None))
            .unwrap();
        s.add(&Quad::new(iri("http://b"), iri("http://p"), iri("http://o2"), None))
            .unwrap();
        s.add(&Quad::new(iri("http://a"), iri("http://other"), iri("http://x"), None))
            .unwrap();

        let pattern = Pattern::any().with_predicate(iri("http://p"));
        let mut via_index: Vec<Triple> = Vec::new();
        let mut stream = s.find(&pattern).unwrap();
        loop {
            if let Some(q) = crate::stream::QuadStream::get(&*stream, crate::stream::GetMode::Current) {
                via_index.push(q.triple());
            }
            if stream.end() || !stream.advance() {
                break;
            }
        }
        via_index.sort_by_key(|t| t.object.to_string());
        assert_eq!(via_index.len(), 2);
    }

    #[test]
    fn find_sources_targets_arcs_use_dedicated_indices() {
        let mut s = memory_store("");
        s.add(&Quad::new(iri("http://a"), iri("http://p"), iri("http://o"), None))
            .unwrap();
        assert_eq!(
            s.find_sources(&iri("http://p"), &iri("http://o")).unwrap(),
            vec![iri("http://a")]
        );
        assert_eq!(
            s.find_targets(&iri("http://a"), &iri("http://p")).unwrap(),
            vec![iri("http://o")]
        );
        assert_eq!(
            s.find_arcs(&iri("http://a"), &iri("http://o")).unwrap(),
            vec![iri("http://p")]
        );
    }

    #[test]
    fn missing_hash_type_is_invalid_options() {
        let mut s = HashStorage::new();
        assert!(matches!(
            s.open(&StorageOptions::parse("contexts='yes'").unwrap()),
            Err(StorageError::InvalidOptions(_))
        ));
    }

    #[test]
    fn clone_duplicates_config_without_data() {
        let mut s = memory_store(",contexts='yes'");
        s.add(&Quad::new(iri("http://a"), iri("http://p"), iri("http://o"), None))
            .unwrap();

        let clone = s.clone_storage().unwrap();
        assert_eq!(clone.size().unwrap(), 0);
        assert!(clone.supports_contexts());
    }

    #[test]
    fn get_feature_reports_contexts_support() {
        let s = memory_store(",contexts='yes'");
        let feature = s
            .get_feature(&iri("http://www.example.org/feature#contexts"))
            .unwrap()
            .unwrap();
        assert_eq!(feature.as_literal().unwrap().lexical(), b"1");
    }
}
