//! Type-tag dispatch table for reconstruction callbacks.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use shelf_types::{validate_type_tag, Identifier};
use tracing::debug;

use crate::entity::{Deserializable, Fields, Serializable};
use crate::error::{Result, SerializationError};
use crate::registry::Registry;

/// Reconstruction callback: decoded fields plus optional identifier in,
/// registered entity out.
pub type DeserializeFn = Arc<
    dyn Fn(Fields, Option<Identifier>, &dyn Registry) -> Result<Arc<dyn Serializable>>
        + Send
        + Sync,
>;

struct TypeEntry {
    type_id: Option<TypeId>,
    callback: DeserializeFn,
}

/// Maps type tags to reconstruction callbacks.
///
/// Entity types register once, typically at startup. A process-wide table
/// is available through [`TypeRegistry::global`]; tests and embedders that
/// want isolation build their own.
#[derive(Default)]
pub struct TypeRegistry {
    entries: RwLock<HashMap<String, TypeEntry>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table.
    pub fn global() -> Arc<TypeRegistry> {
        static GLOBAL: OnceLock<Arc<TypeRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(TypeRegistry::new())))
    }

    /// Register `T` under [`Deserializable::TYPE_TAG`].
    ///
    /// Registering the same type twice is a no-op. A tag already taken by a
    /// different type fails with `DuplicateTypeTag`.
    pub fn register<T: Deserializable>(&self) -> Result<()> {
        validate_type_tag(T::TYPE_TAG)?;
        let mut entries = self.entries.write().expect("lock poisoned");
        if let Some(existing) = entries.get(T::TYPE_TAG) {
            if existing.type_id == Some(TypeId::of::<T>()) {
                return Ok(());
            }
            return Err(SerializationError::DuplicateTypeTag(T::TYPE_TAG.to_string()));
        }
        entries.insert(
            T::TYPE_TAG.to_string(),
            TypeEntry {
                type_id: Some(TypeId::of::<T>()),
                callback: Arc::new(deserialize_erased::<T>),
            },
        );
        debug!(type_tag = T::TYPE_TAG, "registered entity type");
        Ok(())
    }

    /// Register a free-standing callback under `type_tag`.
    pub fn register_fn<F>(&self, type_tag: &str, callback: F) -> Result<()>
    where
        F: Fn(Fields, Option<Identifier>, &dyn Registry) -> Result<Arc<dyn Serializable>>
            + Send
            + Sync
            + 'static,
    {
        validate_type_tag(type_tag)?;
        let mut entries = self.entries.write().expect("lock poisoned");
        if entries.contains_key(type_tag) {
            return Err(SerializationError::DuplicateTypeTag(type_tag.to_string()));
        }
        entries.insert(
            type_tag.to_string(),
            TypeEntry {
                type_id: None,
                callback: Arc::new(callback),
            },
        );
        debug!(type_tag, "registered entity callback");
        Ok(())
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.entries
            .read()
            .expect("lock poisoned")
            .contains_key(type_tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .entries
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        tags.sort();
        tags
    }

    /// Reconstruct an entity of type `type_tag` from decoded fields.
    pub fn deserialize(
        &self,
        type_tag: &str,
        fields: Fields,
        identifier: Option<Identifier>,
        registry: &dyn Registry,
    ) -> Result<Arc<dyn Serializable>> {
        let callback = {
            let entries = self.entries.read().expect("lock poisoned");
            match entries.get(type_tag) {
                Some(entry) => Arc::clone(&entry.callback),
                None => return Err(SerializationError::UnknownType(type_tag.to_string())),
            }
        };
        callback(fields, identifier, registry)
    }
}

fn deserialize_erased<T: Deserializable>(
    fields: Fields,
    identifier: Option<Identifier>,
    registry: &dyn Registry,
) -> Result<Arc<dyn Serializable>> {
    let entity: Arc<dyn Serializable> = T::deserialize(fields, identifier, registry)?;
    Ok(entity)
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
