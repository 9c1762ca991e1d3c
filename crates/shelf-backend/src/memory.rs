use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::error::{BackendError, BackendResult};
use crate::validate_identifier;
use crate::traits::StorageBackend;

/// In-memory, HashMap-based document store.
///
/// Intended for tests and ephemeral use. All documents are held in memory
/// behind a `RwLock`. Documents are cloned on read/write and lost when the
/// store is dropped.
pub struct InMemoryBackend {
    documents: RwLock<HashMap<String, String>>,
}

impl InMemoryBackend {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Number of documents currently stored.
    pub fn len(&self) -> usize {
        self.documents.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.read().expect("lock poisoned").is_empty()
    }

    /// Return a sorted list of all stored identifiers.
    pub fn identifiers(&self) -> Vec<String> {
        let map = self.documents.read().expect("lock poisoned");
        let mut ids: Vec<String> = map.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of every stored document, ordered by identifier.
    pub fn documents(&self) -> BTreeMap<String, String> {
        let map = self.documents.read().expect("lock poisoned");
        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for InMemoryBackend {
    fn put(&self, identifier: &str, data: &str, overwrite: bool) -> BackendResult<()> {
        validate_identifier(identifier)?;
        let mut map = self.documents.write().expect("lock poisoned");
        if !overwrite && map.contains_key(identifier) {
            return Err(BackendError::AlreadyExists(identifier.to_string()));
        }
        map.insert(identifier.to_string(), data.to_string());
        Ok(())
    }

    fn get(&self, identifier: &str) -> BackendResult<String> {
        validate_identifier(identifier)?;
        let map = self.documents.read().expect("lock poisoned");
        map.get(identifier)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(identifier.to_string()))
    }

    fn exists(&self, identifier: &str) -> BackendResult<bool> {
        validate_identifier(identifier)?;
        let map = self.documents.read().expect("lock poisoned");
        Ok(map.contains_key(identifier))
    }

    fn delete(&self, identifier: &str) -> BackendResult<()> {
        validate_identifier(identifier)?;
        let mut map = self.documents.write().expect("lock poisoned");
        map.remove(identifier)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(identifier.to_string()))
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryBackend")
            .field("document_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::contract;
    use proptest::prelude::*;

    // -----------------------------------------------------------------------
    // Backend contract
    // -----------------------------------------------------------------------

    #[test]
    fn satisfies_backend_contract() {
        contract::run_all(InMemoryBackend::new);
    }

    proptest! {
        #[test]
        fn random_history_matches_model(ops in proptest::collection::vec(contract::op_strategy(), 0..40)) {
            let backend = InMemoryBackend::new();
            contract::replay_against_model(&backend, &ops);
        }
    }

    // -----------------------------------------------------------------------
    // Utility methods
    // -----------------------------------------------------------------------

    #[test]
    fn len_and_is_empty() {
        let store = InMemoryBackend::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);

        store.put("a", "1", false).unwrap();
        assert!(!store.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn identifiers_are_sorted() {
        let store = InMemoryBackend::new();
        store.put("ccc", "", false).unwrap();
        store.put("aaa", "", false).unwrap();
        store.put("bbb", "", false).unwrap();
        assert_eq!(store.identifiers(), vec!["aaa", "bbb", "ccc"]);
    }

    #[test]
    fn documents_snapshot() {
        let store = InMemoryBackend::new();
        store.put("main", "{}", false).unwrap();
        let docs = store.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs["main"], "{}");

        // A snapshot is detached from later writes.
        store.put("main", "[]", true).unwrap();
        assert_eq!(docs["main"], "{}");
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryBackend::new());
        store.put("shared", "data", false).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    assert_eq!(store.get("shared").unwrap(), "data");
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }

    #[test]
    fn debug_format() {
        let store = InMemoryBackend::new();
        store.put("x", "", false).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryBackend"));
        assert!(debug.contains("document_count"));
    }
}
