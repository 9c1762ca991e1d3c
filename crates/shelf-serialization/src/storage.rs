//! Transactional storage front-end.
//!
//! [`EntityStorage`] sits on top of a [`StorageBackend`] and keeps every
//! entity it has read or written materialized in memory, together with the
//! document text it was stored as. Writes go through a transaction: encoding
//! one entity may pull in nested identified entities, and all resulting
//! documents are flushed together when the outermost write finishes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

use shelf_backend::{BackendError, StorageBackend};
use shelf_types::Identifier;
use tracing::{debug, trace};

use crate::decoder::{Decoder, ReferenceResolver};
use crate::encoder::{Encoder, TransactionSink};
use crate::entity::{downcast_arc, same_instance, Serializable};
use crate::error::{Result, SerializationError};
use crate::registry::{
    default_registry, is_default_registry, set_default_registry, DefaultRegistryGuard,
    IdentifierRegistry, Registry,
};
use crate::types::TypeRegistry;

/// A materialized entity and the document it is stored as.
#[derive(Clone)]
struct StorageEntry {
    serialization: String,
    entity: Arc<dyn Serializable>,
}

struct PendingEntry {
    entity: Arc<dyn Serializable>,
    /// `None` while the entity is still being encoded.
    serialization: Option<String>,
}

#[derive(Default)]
struct Transaction {
    depth: usize,
    entries: BTreeMap<Identifier, PendingEntry>,
}

/// Marks one (possibly nested) `overwrite` call in progress.
///
/// Dropping the outermost scope discards whatever the transaction still
/// holds, so a failed write leaves nothing behind for the next one.
struct TransactionScope<'a> {
    transaction: &'a Mutex<Transaction>,
    outermost: bool,
}

impl<'a> TransactionScope<'a> {
    fn enter(transaction: &'a Mutex<Transaction>) -> Self {
        let mut tx = transaction.lock().expect("lock poisoned");
        tx.depth += 1;
        Self {
            transaction,
            outermost: tx.depth == 1,
        }
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        let mut tx = match self.transaction.lock() {
            Ok(tx) => tx,
            Err(poisoned) => poisoned.into_inner(),
        };
        tx.depth = tx.depth.saturating_sub(1);
        if tx.depth == 0 {
            tx.entries.clear();
        }
    }
}

type LoadingSet = Mutex<HashSet<(ThreadId, Identifier)>>;

/// Marks one identifier as being decoded by [`EntityStorage::read`] on the
/// current thread.
///
/// Entering an identifier that is already loading on the same thread means
/// its documents reference each other in a cycle.
struct LoadingScope<'a> {
    loading: &'a LoadingSet,
    key: (ThreadId, Identifier),
}

impl<'a> LoadingScope<'a> {
    fn enter(loading: &'a LoadingSet, identifier: &Identifier) -> Result<Self> {
        let key = (thread::current().id(), identifier.clone());
        let mut set = loading.lock().expect("lock poisoned");
        if !set.insert(key.clone()) {
            return Err(SerializationError::CyclicReference(identifier.clone()));
        }
        Ok(Self { loading, key })
    }
}

impl Drop for LoadingScope<'_> {
    fn drop(&mut self) {
        let mut set = match self.loading.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        set.remove(&self.key);
    }
}

/// Storage front-end: a backend plus a cache of materialized entities.
///
/// Reading an identifier twice yields the same instance as long as it stays
/// cached. The cache is assumed to be a subset of the backend; mutating the
/// backend behind the front-end's back is unsupported.
///
/// A transaction is shared by nested calls on the same thread only. Callers
/// that write from several threads at once must serialize those writes.
pub struct EntityStorage {
    backend: Box<dyn StorageBackend>,
    types: Arc<TypeRegistry>,
    registry: Option<Arc<dyn Registry>>,
    cache: RwLock<HashMap<Identifier, StorageEntry>>,
    transaction: Mutex<Transaction>,
    loading: LoadingSet,
}

impl EntityStorage {
    /// Front-end over `backend` using the process-wide type table.
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    /// Front-end over `backend` using an explicit type table.
    pub fn with_types(backend: impl StorageBackend + 'static, types: Arc<TypeRegistry>) -> Self {
        let mut storage = Self::new(backend);
        storage.types = types;
        storage
    }

    /// Front-end over an already boxed backend, e.g. from
    /// [`BackendConfig::open`](shelf_backend::BackendConfig::open).
    pub fn from_boxed(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            types: TypeRegistry::global(),
            registry: None,
            cache: RwLock::new(HashMap::new()),
            transaction: Mutex::new(Transaction::default()),
            loading: Mutex::new(HashSet::new()),
        }
    }

    /// Register decoded entities into `registry` instead of the
    /// process-wide default.
    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    // ---- Reads ----

    /// Returns `true` if `identifier` is cached or stored in the backend.
    pub fn contains(&self, identifier: &Identifier) -> Result<bool> {
        if self.cached(identifier).is_some() {
            return Ok(true);
        }
        Ok(self.backend.exists(identifier.as_str())?)
    }

    /// The entity stored under `identifier`, loading it if not cached.
    ///
    /// Documents that reach themselves through references fail with
    /// `CyclicReference`.
    pub fn read(&self, identifier: &Identifier) -> Result<Arc<dyn Serializable>> {
        if let Some(entry) = self.cached(identifier) {
            trace!(identifier = %identifier, "cache hit");
            return Ok(entry.entity);
        }
        trace!(identifier = %identifier, "cache miss");

        let _loading = LoadingScope::enter(&self.loading, identifier)?;
        let serialization = self.backend.get(identifier.as_str())?;
        let entity = self.decode(&serialization)?;

        let mut cache = self.cache.write().expect("lock poisoned");
        let entry = cache
            .entry(identifier.clone())
            .or_insert(StorageEntry {
                serialization,
                entity,
            });
        Ok(Arc::clone(&entry.entity))
    }

    /// [`read`](Self::read) and downcast to the concrete entity type.
    pub fn read_as<T: Serializable>(&self, identifier: &Identifier) -> Result<Arc<T>> {
        let entity = self.read(identifier)?;
        downcast_arc::<T>(&entity).ok_or_else(|| SerializationError::TypeMismatch {
            expected: std::any::type_name::<T>(),
            found: entity.type_tag().to_string(),
        })
    }

    // ---- Writes ----

    /// Store `entity` under an identifier that must not be taken yet.
    ///
    /// Writing the instance already cached under `identifier` is a no-op.
    /// Any other cached instance, or any stored document, fails with
    /// `AlreadyBound`.
    pub fn write(&self, identifier: &Identifier, entity: Arc<dyn Serializable>) -> Result<()> {
        if let Some(entry) = self.cached(identifier) {
            if same_instance(&entry.entity, &entity) {
                return Ok(());
            }
            return Err(SerializationError::AlreadyBound(identifier.clone()));
        }
        if self.backend.exists(identifier.as_str())? {
            return Err(SerializationError::AlreadyBound(identifier.clone()));
        }
        self.overwrite(identifier, entity)
    }

    /// Store `entity` under `identifier`, replacing whatever is there.
    ///
    /// Nested identified entities met while encoding join the same
    /// transaction. Documents are written only when the outermost call
    /// finishes encoding; a failure during encoding writes nothing.
    pub fn overwrite(&self, identifier: &Identifier, entity: Arc<dyn Serializable>) -> Result<()> {
        if let Some(own) = entity.identifier() {
            if own != identifier {
                return Err(SerializationError::IdentifierMismatch {
                    storage: identifier.clone(),
                    entity: own.clone(),
                });
            }
        }

        let scope = TransactionScope::enter(&self.transaction);
        self.encode_into_transaction(identifier, &entity)?;
        if scope.outermost {
            self.flush()?;
        }
        Ok(())
    }

    /// Delete the document stored under `identifier` and forget the cached
    /// entity. A document that is already absent is not an error.
    pub fn remove(&self, identifier: &Identifier) -> Result<()> {
        match self.backend.delete(identifier.as_str()) {
            Ok(()) => {}
            Err(BackendError::NotFound(_)) => {
                debug!(identifier = %identifier, "remove: document already absent");
            }
            Err(e) => return Err(e.into()),
        }
        self.cache
            .write()
            .expect("lock poisoned")
            .remove(identifier);
        Ok(())
    }

    /// Drop every materialized entity. The backend is untouched.
    pub fn clear(&self) {
        self.cache.write().expect("lock poisoned").clear();
    }

    /// Identifiers currently materialized, sorted.
    pub fn cached_identifiers(&self) -> Vec<Identifier> {
        let mut ids: Vec<Identifier> = self
            .cache
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Document text of a materialized entity.
    pub fn cached_serialization(&self, identifier: &Identifier) -> Option<String> {
        self.cached(identifier).map(|entry| entry.serialization)
    }

    // ---- Default registry ----

    /// Make this storage the process-wide default registry until the
    /// returned guard is dropped.
    pub fn as_default_registry(self: &Arc<Self>) -> DefaultRegistryGuard {
        DefaultRegistryGuard::install(Arc::clone(self) as Arc<dyn Registry>)
    }

    /// Make this storage the process-wide default registry for good,
    /// returning the one it replaces.
    pub fn make_default(self: &Arc<Self>) -> Arc<dyn Registry> {
        set_default_registry(Arc::clone(self) as Arc<dyn Registry>)
    }

    // ---- Internals ----

    fn cached(&self, identifier: &Identifier) -> Option<StorageEntry> {
        self.cache
            .read()
            .expect("lock poisoned")
            .get(identifier)
            .cloned()
    }

    fn pending(&self, identifier: &Identifier) -> Option<Arc<dyn Serializable>> {
        let tx = self.transaction.lock().expect("lock poisoned");
        tx.entries.get(identifier).map(|p| Arc::clone(&p.entity))
    }

    fn decode(&self, serialization: &str) -> Result<Arc<dyn Serializable>> {
        // Entities register themselves on construction. When this storage is
        // the default registry, that would collide with the entry `read`
        // creates, so decoded entities go to a throwaway registry instead.
        if is_default_registry(self) {
            let scratch = IdentifierRegistry::new();
            return Decoder::new(&self.types, self, &scratch).decode_entity(serialization);
        }
        let registry = self.registry.clone().unwrap_or_else(default_registry);
        Decoder::new(&self.types, self, &*registry).decode_entity(serialization)
    }

    fn encode_into_transaction(
        &self,
        identifier: &Identifier,
        entity: &Arc<dyn Serializable>,
    ) -> Result<()> {
        {
            let mut tx = self.transaction.lock().expect("lock poisoned");
            match tx.entries.get(identifier) {
                Some(pending) if same_instance(&pending.entity, entity) => return Ok(()),
                Some(_) => return Err(SerializationError::IdentifierConflict(identifier.clone())),
                None => {
                    tx.entries.insert(
                        identifier.clone(),
                        PendingEntry {
                            entity: Arc::clone(entity),
                            serialization: None,
                        },
                    );
                }
            }
        }

        let serialization = Encoder::new(self).encode_document(entity.as_ref())?;

        let mut tx = self.transaction.lock().expect("lock poisoned");
        if let Some(pending) = tx.entries.get_mut(identifier) {
            pending.serialization = Some(serialization);
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let entries = std::mem::take(&mut self.transaction.lock().expect("lock poisoned").entries);
        let count = entries.len();
        for (identifier, pending) in entries {
            let Some(serialization) = pending.serialization else {
                continue;
            };
            self.backend
                .put(identifier.as_str(), &serialization, true)?;
            self.cache.write().expect("lock poisoned").insert(
                identifier,
                StorageEntry {
                    serialization,
                    entity: pending.entity,
                },
            );
        }
        debug!(documents = count, "transaction flushed");
        Ok(())
    }
}

impl TransactionSink for EntityStorage {
    fn register_nested(&self, entity: &Arc<dyn Serializable>) -> Result<()> {
        let Some(identifier) = entity.identifier().cloned() else {
            return Ok(());
        };
        if let Some(pending) = self.pending(&identifier) {
            if same_instance(&pending, entity) {
                return Ok(());
            }
            return Err(SerializationError::IdentifierConflict(identifier));
        }
        if let Some(entry) = self.cached(&identifier) {
            if !same_instance(&entry.entity, entity) {
                return Err(SerializationError::IdentifierConflict(identifier));
            }
        }
        self.overwrite(&identifier, Arc::clone(entity))
    }
}

impl ReferenceResolver for EntityStorage {
    fn resolve(&self, identifier: &Identifier) -> Result<Arc<dyn Serializable>> {
        match self.read(identifier) {
            Err(SerializationError::Backend(BackendError::NotFound(missing)))
                if missing == identifier.as_str() =>
            {
                Err(SerializationError::DanglingReference(identifier.clone()))
            }
            other => other,
        }
    }
}

/// Registering an entity with this storage writes it.
impl Registry for EntityStorage {
    fn register(&self, entity: Arc<dyn Serializable>) -> Result<()> {
        let Some(identifier) = entity.identifier().cloned() else {
            return Ok(());
        };
        if let Some(pending) = self.pending(&identifier) {
            if same_instance(&pending, &entity) {
                return Ok(());
            }
        }
        match self.write(&identifier, entity) {
            Err(SerializationError::AlreadyBound(id)) => {
                Err(SerializationError::DuplicateIdentifier(id))
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for EntityStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStorage")
            .field("cached", &self.cached_identifiers().len())
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}
