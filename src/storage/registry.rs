//! Process-wide storage factory registry (spec §4.5).
//!
//! Backends register a constructor under a short name (`"hashes"`,
//! `"sqlite"`, `"postgresql"`, `"mysql"`, `"virtuoso"`); the
//! [`crate::model::Model`] façade looks backends up by that name so
//! callers never need a concrete backend type in scope.
//!
//! A poisoned registry mutex (some other thread panicked while holding
//! it) is exactly the "continuing would corrupt state no caller can
//! inspect" case [`crate::log::fatal`] exists for: the registry is
//! process-global and every caller shares it, so there is no local
//! `Result` to hand back and no way to know which half of an in-flight
//! insert survived. Every lock site here goes through `fatal` rather
//! than `PoisonError::into_inner`.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use super::{Storage, StorageError, StorageResult};

pub trait StorageFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn create(&self) -> Box<dyn Storage>;
}

struct FnFactory {
    name: &'static str,
    ctor: fn() -> Box<dyn Storage>,
}

impl StorageFactory for FnFactory {
    fn name(&self) -> &'static str {
        self.name
    }
    fn create(&self) -> Box<dyn Storage> {
        (self.ctor)()
    }
}

fn registry() -> &'static Mutex<HashMap<&'static str, Box<dyn StorageFactory>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<&'static str, Box<dyn StorageFactory>>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a backend constructor under `name`. Re-registration of an
/// already-registered name logs an error and is a no-op (spec §4.4):
/// the registry is treated as append-only once a name is claimed.
pub fn register_factory(name: &'static str, ctor: fn() -> Box<dyn Storage>) {
    let mut guard = registry().lock().unwrap_or_else(|_| {
        crate::log::fatal(crate::log::FACILITY_STORAGE, "storage factory registry lock poisoned")
    });
    if guard.contains_key(name) {
        tracing::error!(target: crate::log::FACILITY_STORAGE, name, "storage backend already registered");
        return;
    }
    guard.insert(name, Box::new(FnFactory { name, ctor }));
}

/// Instantiate the backend registered under `name`.
pub fn create(name: &str) -> StorageResult<Box<dyn Storage>> {
    let guard = registry().lock().unwrap_or_else(|_| {
        crate::log::fatal(crate::log::FACILITY_STORAGE, "storage factory registry lock poisoned")
    });
    guard
        .get(name)
        .map(|f| f.create())
        .ok_or_else(|| StorageError::NotSupported(format!("no storage backend named {name:?}")))
}

/// Names of every backend currently registered, sorted.
pub fn registered_names() -> Vec<&'static str> {
    let guard = registry().lock().unwrap_or_else(|_| {
        crate::log::fatal(crate::log::FACILITY_STORAGE, "storage factory registry lock poisoned")
    });
    let mut names: Vec<_> = guard.keys().copied().collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::hash::MemoryHashStorage;

    fn make_memory() -> Box<dyn Storage> {
        Box::new(MemoryHashStorage::new())
    }

    #[test]
    fn register_then_create_round_trips() {
        register_factory("test-memory-hashes", make_memory);
        let backend = create("test-memory-hashes").unwrap();
        assert_eq!(backend.name(), "hashes");
    }

    #[test]
    fn unknown_name_is_not_supported() {
        assert!(matches!(
            create("no-such-backend"),
            Err(StorageError::NotSupported(_))
        ));
    }
}
