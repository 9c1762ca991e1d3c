//! Identifier registry: at most one live entity per identifier.
//!
//! The registry holds weak handles only, so it never keeps an entity alive.
//! Once the last strong handle is dropped the identifier becomes free again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use shelf_types::Identifier;
use tracing::debug;

use crate::entity::{same_instance, Serializable};
use crate::error::{Result, SerializationError};

/// Something that accepts newly constructed entities.
///
/// Entity constructors call [`register`](Registry::register) with the
/// entity they just built. [`IdentifierRegistry`] and
/// [`EntityStorage`](crate::EntityStorage) implement it.
pub trait Registry: Send + Sync {
    fn register(&self, entity: Arc<dyn Serializable>) -> Result<()>;
}

/// In-process map from identifier to the live entity holding it.
#[derive(Default)]
pub struct IdentifierRegistry {
    entries: Mutex<HashMap<Identifier, Weak<dyn Serializable>>>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live entity registered under `identifier`.
    pub fn get(&self, identifier: &Identifier) -> Option<Arc<dyn Serializable>> {
        let entries = self.entries.lock().expect("lock poisoned");
        entries.get(identifier).and_then(Weak::upgrade)
    }

    /// Returns `true` if a live entity holds `identifier`.
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.get(identifier).is_some()
    }

    /// Number of live registered entities.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().expect("lock poisoned");
        entries.values().filter(|w| w.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose entity is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.lock().expect("lock poisoned");
        let before = entries.len();
        entries.retain(|_, w| w.strong_count() > 0);
        before - entries.len()
    }
}

impl Registry for IdentifierRegistry {
    fn register(&self, entity: Arc<dyn Serializable>) -> Result<()> {
        let Some(identifier) = entity.identifier().cloned() else {
            return Ok(());
        };
        let mut entries = self.entries.lock().expect("lock poisoned");
        if let Some(existing) = entries.get(&identifier).and_then(Weak::upgrade) {
            if same_instance(&existing, &entity) {
                return Ok(());
            }
            return Err(SerializationError::DuplicateIdentifier(identifier));
        }
        if entries.contains_key(&identifier) {
            debug!(identifier = %identifier, "reclaiming identifier of dropped entity");
        }
        entries.insert(identifier, Arc::downgrade(&entity));
        Ok(())
    }
}

impl std::fmt::Debug for IdentifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierRegistry")
            .field("live", &self.len())
            .finish()
    }
}

/// Build `entity` into a shared handle and register it.
///
/// The usual body of an entity constructor.
pub fn register_new<T: Serializable>(entity: T, registry: &dyn Registry) -> Result<Arc<T>> {
    let entity = Arc::new(entity);
    registry.register(entity.clone())?;
    Ok(entity)
}

// ---------------------------------------------------------------------------
// Process-wide default
// ---------------------------------------------------------------------------

fn default_slot() -> &'static RwLock<Arc<dyn Registry>> {
    static SLOT: OnceLock<RwLock<Arc<dyn Registry>>> = OnceLock::new();
    SLOT.get_or_init(|| RwLock::new(Arc::new(IdentifierRegistry::new())))
}

/// The registry entity constructors use when none is passed explicitly.
pub fn default_registry() -> Arc<dyn Registry> {
    Arc::clone(&default_slot().read().expect("lock poisoned"))
}

/// Replace the process-wide default registry, returning the previous one.
pub fn set_default_registry(registry: Arc<dyn Registry>) -> Arc<dyn Registry> {
    let mut slot = default_slot().write().expect("lock poisoned");
    std::mem::replace(&mut *slot, registry)
}

/// Returns `true` if `registry` is the current process-wide default.
pub fn is_default_registry<R: ?Sized>(registry: &R) -> bool {
    let current = default_slot().read().expect("lock poisoned");
    std::ptr::addr_eq(Arc::as_ptr(&current), registry as *const R)
}

/// Installs a default registry for a scope and restores the previous one
/// when dropped, including on early return and unwinding.
#[must_use = "the previous default registry is restored when the guard is dropped"]
pub struct DefaultRegistryGuard {
    previous: Option<Arc<dyn Registry>>,
}

impl DefaultRegistryGuard {
    pub fn install(registry: Arc<dyn Registry>) -> Self {
        Self {
            previous: Some(set_default_registry(registry)),
        }
    }
}

impl Drop for DefaultRegistryGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let mut slot = match default_slot().write() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = previous;
        }
    }
}
