//! `hash-type='memory'`: an in-process byte multimap backed by
//! [`indexmap::IndexMap`] (teacher's dependency), giving deterministic
//! iteration order for `serialize()` within a single process run.

use indexmap::IndexMap;

use super::ByteMultimap;
use crate::storage::StorageResult;

#[derive(Default)]
pub struct MemoryMultimap {
    buckets: IndexMap<Vec<u8>, Vec<Vec<u8>>>,
}

impl MemoryMultimap {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ByteMultimap for MemoryMultimap {
    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let bucket = self.buckets.entry(key.to_vec()).or_default();
        if !bucket.iter().any(|v| v.as_slice() == value) {
            bucket.push(value.to_vec());
        }
        Ok(())
    }

    fn delete(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        if let Some(bucket) = self.buckets.get_mut(key) {
            bucket.retain(|v| v.as_slice() != value);
            if bucket.is_empty() {
                self.buckets.shift_remove(key);
            }
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self.buckets.get(key).cloned().unwrap_or_default())
    }

    fn iter_all(&self) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for (key, values) in &self.buckets {
            for value in values {
                out.push((key.clone(), value.clone()));
            }
        }
        Ok(out)
    }

    fn len(&self) -> StorageResult<i64> {
        Ok(self.buckets.values().map(|v| v.len() as i64).sum())
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.buckets.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_put_does_not_grow_bucket() {
        let mut m = MemoryMultimap::new();
        m.put(b"k", b"v").unwrap();
        m.put(b"k", b"v").unwrap();
        assert_eq!(m.get(b"k").unwrap(), vec![b"v".to_vec()]);
        assert_eq!(m.len().unwrap(), 1);
    }

    #[test]
    fn delete_removes_only_matching_value() {
        let mut m = MemoryMultimap::new();
        m.put(b"k", b"v1").unwrap();
        m.put(b"k", b"v2").unwrap();
        m.delete(b"k", b"v1").unwrap();
        assert_eq!(m.get(b"k").unwrap(), vec![b"v2".to_vec()]);
    }

    #[test]
    fn empty_bucket_is_removed_after_last_delete() {
        let mut m = MemoryMultimap::new();
        m.put(b"k", b"v").unwrap();
        m.delete(b"k", b"v").unwrap();
        assert!(m.get(b"k").unwrap().is_empty());
        assert_eq!(m.len().unwrap(), 0);
    }
}
