use std::sync::Arc;

use crate::error::{BackendError, BackendResult};

/// Text-level document store keyed by opaque identifiers.
///
/// All implementations must satisfy these invariants:
/// - `put` with `overwrite == false` on a present identifier fails with
///   [`BackendError::AlreadyExists`] and leaves the stored document unchanged.
/// - `get` and `delete` on an absent identifier fail with
///   [`BackendError::NotFound`].
/// - `exists` has no side effects.
/// - Each `put`/`delete` is atomic with respect to its identifier: callers
///   never observe a half-written or half-removed document.
pub trait StorageBackend: Send + Sync {
    /// Store `data` under `identifier`.
    ///
    /// Fails with `AlreadyExists` if a document is present and `overwrite`
    /// is false.
    fn put(&self, identifier: &str, data: &str, overwrite: bool) -> BackendResult<()>;

    /// Read the document stored under `identifier`.
    fn get(&self, identifier: &str) -> BackendResult<String>;

    /// Check whether a document is stored under `identifier`.
    fn exists(&self, identifier: &str) -> BackendResult<bool>;

    /// Delete the document stored under `identifier`.
    fn delete(&self, identifier: &str) -> BackendResult<()>;

    /// Store a document that must not exist yet.
    fn put_new(&self, identifier: &str, data: &str) -> BackendResult<()> {
        self.put(identifier, data, false)
    }

    /// Read a document, mapping absence to `Ok(None)`.
    fn get_opt(&self, identifier: &str) -> BackendResult<Option<String>> {
        match self.get(identifier) {
            Ok(data) => Ok(Some(data)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn put(&self, identifier: &str, data: &str, overwrite: bool) -> BackendResult<()> {
        (**self).put(identifier, data, overwrite)
    }

    fn get(&self, identifier: &str) -> BackendResult<String> {
        (**self).get(identifier)
    }

    fn exists(&self, identifier: &str) -> BackendResult<bool> {
        (**self).exists(identifier)
    }

    fn delete(&self, identifier: &str) -> BackendResult<()> {
        (**self).delete(identifier)
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn put(&self, identifier: &str, data: &str, overwrite: bool) -> BackendResult<()> {
        (**self).put(identifier, data, overwrite)
    }

    fn get(&self, identifier: &str) -> BackendResult<String> {
        (**self).get(identifier)
    }

    fn exists(&self, identifier: &str) -> BackendResult<bool> {
        (**self).exists(identifier)
    }

    fn delete(&self, identifier: &str) -> BackendResult<()> {
        (**self).delete(identifier)
    }
}

/// Contract checks shared by the test suites of every backend.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;

    pub fn put_then_get(backend: &dyn StorageBackend) {
        backend.put("p1", "{\"n\": 3}", false).unwrap();
        assert_eq!(backend.get("p1").unwrap(), "{\"n\": 3}");
    }

    pub fn put_without_overwrite_fails_and_keeps_data(backend: &dyn StorageBackend) {
        backend.put("p1", "old", false).unwrap();
        let err = backend.put("p1", "new", false).unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists(ref id) if id == "p1"));
        assert_eq!(backend.get("p1").unwrap(), "old");
    }

    pub fn put_with_overwrite_replaces(backend: &dyn StorageBackend) {
        backend.put("p1", "old", false).unwrap();
        backend.put("p1", "new", true).unwrap();
        assert_eq!(backend.get("p1").unwrap(), "new");
    }

    pub fn get_missing_is_not_found(backend: &dyn StorageBackend) {
        let err = backend.get("missing").unwrap_err();
        assert!(matches!(err, BackendError::NotFound(ref id) if id == "missing"));
        assert_eq!(backend.get_opt("missing").unwrap(), None);
    }

    pub fn delete_missing_is_not_found(backend: &dyn StorageBackend) {
        let err = backend.delete("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    pub fn exists_tracks_history(backend: &dyn StorageBackend) {
        assert!(!backend.exists("p1").unwrap());
        backend.put("p1", "a", false).unwrap();
        assert!(backend.exists("p1").unwrap());
        backend.delete("p1").unwrap();
        assert!(!backend.exists("p1").unwrap());
        assert!(backend.get("p1").unwrap_err().is_not_found());
        backend.put("p1", "b", false).unwrap();
        assert_eq!(backend.get("p1").unwrap(), "b");
    }

    pub fn documents_are_independent(backend: &dyn StorageBackend) {
        backend.put("a", "1", false).unwrap();
        backend.put("b", "2", false).unwrap();
        backend.put("c", "3", false).unwrap();
        backend.put("b", "22", true).unwrap();
        backend.delete("a").unwrap();
        assert!(!backend.exists("a").unwrap());
        assert_eq!(backend.get("b").unwrap(), "22");
        assert_eq!(backend.get("c").unwrap(), "3");
    }

    pub fn identifiers_must_be_flat_names(backend: &dyn StorageBackend) {
        for bad in ["", "../escaped", "a/b", "a\\b", "nul\0"] {
            let invalid = |err: BackendError| matches!(err, BackendError::InvalidIdentifier(ref id) if id == bad);
            assert!(invalid(backend.put(bad, "x", false).unwrap_err()), "put {bad:?}");
            assert!(invalid(backend.put(bad, "x", true).unwrap_err()), "overwrite {bad:?}");
            assert!(invalid(backend.get(bad).unwrap_err()), "get {bad:?}");
            assert!(invalid(backend.exists(bad).unwrap_err()), "exists {bad:?}");
            assert!(invalid(backend.delete(bad).unwrap_err()), "delete {bad:?}");
        }
        backend.put("..", "dots", false).unwrap();
        assert_eq!(backend.get("..").unwrap(), "dots");
    }

    /// Run every contract check, each against a fresh backend.
    pub fn run_all<B: StorageBackend>(mut make: impl FnMut() -> B) {
        put_then_get(&make());
        put_without_overwrite_fails_and_keeps_data(&make());
        put_with_overwrite_replaces(&make());
        get_missing_is_not_found(&make());
        delete_missing_is_not_found(&make());
        exists_tracks_history(&make());
        documents_are_independent(&make());
        identifiers_must_be_flat_names(&make());
    }

    /// Operation for randomized history checks.
    #[derive(Clone, Debug)]
    pub enum Op {
        Put { id: u8, data: String, overwrite: bool },
        Delete { id: u8 },
    }

    pub fn op_strategy() -> impl proptest::strategy::Strategy<Value = Op> {
        use proptest::prelude::*;
        prop_oneof![
            (0u8..4, "[a-z]{0,8}", any::<bool>())
                .prop_map(|(id, data, overwrite)| Op::Put { id, data, overwrite }),
            (0u8..4).prop_map(|id| Op::Delete { id }),
        ]
    }

    /// Replay `ops` against `backend` and a model map, asserting they agree.
    pub fn replay_against_model(backend: &dyn StorageBackend, ops: &[Op]) {
        use std::collections::HashMap;

        let mut model: HashMap<String, String> = HashMap::new();
        for op in ops {
            match op {
                Op::Put { id, data, overwrite } => {
                    let key = format!("doc{id}");
                    let result = backend.put(&key, data, *overwrite);
                    if model.contains_key(&key) && !overwrite {
                        assert!(matches!(result, Err(BackendError::AlreadyExists(_))));
                    } else {
                        result.unwrap();
                        model.insert(key, data.clone());
                    }
                }
                Op::Delete { id } => {
                    let key = format!("doc{id}");
                    let result = backend.delete(&key);
                    if model.remove(&key).is_some() {
                        result.unwrap();
                    } else {
                        assert!(result.unwrap_err().is_not_found());
                    }
                }
            }
        }
        for id in 0u8..4 {
            let key = format!("doc{id}");
            assert_eq!(backend.exists(&key).unwrap(), model.contains_key(&key));
            assert_eq!(backend.get_opt(&key).unwrap(), model.get(&key).cloned());
        }
    }
}
