use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{BackendError, BackendResult};
use crate::traits::StorageBackend;

/// Write-through memory cache in front of another backend.
///
/// Documents are kept in memory after the first successful `get` or `put`.
/// Writes and deletes go to the inner backend first and only touch the
/// cache when the inner call succeeded. The cache never evicts, so memory
/// grows with every distinct document touched: use it for short-lived
/// processes only.
///
/// Changes made to the inner backend behind this cache's back are not
/// observed by `get` for documents already cached.
pub struct CachingBackend {
    inner: Box<dyn StorageBackend>,
    cache: RwLock<HashMap<String, String>>,
}

impl CachingBackend {
    /// Wrap `inner` with a write-through cache.
    pub fn new(inner: impl StorageBackend + 'static) -> Self {
        Self::from_boxed(Box::new(inner))
    }

    /// Wrap an already boxed backend.
    pub fn from_boxed(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &dyn StorageBackend {
        self.inner.as_ref()
    }

    /// Number of documents held in memory.
    pub fn cached_len(&self) -> usize {
        self.cache.read().expect("cache lock poisoned").len()
    }

    /// Returns `true` if `identifier` is held in memory.
    pub fn is_cached(&self, identifier: &str) -> bool {
        self.cache
            .read()
            .expect("cache lock poisoned")
            .contains_key(identifier)
    }
}

impl StorageBackend for CachingBackend {
    fn put(&self, identifier: &str, data: &str, overwrite: bool) -> BackendResult<()> {
        if !overwrite && self.is_cached(identifier) {
            return Err(BackendError::AlreadyExists(identifier.to_string()));
        }
        self.inner.put(identifier, data, overwrite)?;
        self.cache
            .write()
            .expect("cache lock poisoned")
            .insert(identifier.to_string(), data.to_string());
        Ok(())
    }

    fn get(&self, identifier: &str) -> BackendResult<String> {
        if let Some(data) = self
            .cache
            .read()
            .expect("cache lock poisoned")
            .get(identifier)
        {
            return Ok(data.clone());
        }
        let data = self.inner.get(identifier)?;
        self.cache
            .write()
            .expect("cache lock poisoned")
            .insert(identifier.to_string(), data.clone());
        Ok(data)
    }

    fn exists(&self, identifier: &str) -> BackendResult<bool> {
        self.inner.exists(identifier)
    }

    fn delete(&self, identifier: &str) -> BackendResult<()> {
        self.inner.delete(identifier)?;
        self.cache
            .write()
            .expect("cache lock poisoned")
            .remove(identifier);
        Ok(())
    }
}

impl std::fmt::Debug for CachingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingBackend")
            .field("cached", &self.cached_len())
            .finish_non_exhaustive()
    }
}
