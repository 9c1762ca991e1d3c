//! Capabilities implemented by domain objects.

use std::any::{self, Any};
use std::fmt;
use std::sync::Arc;

use shelf_types::Identifier;

use crate::error::{Result, SerializationError};
use crate::registry::Registry;
use crate::value::{Record, Value};

/// Upcast helper so entities behind `Arc<dyn Serializable>` can be
/// downcast to their concrete type. Implemented for every eligible type.
///
/// The blanket impl covers `Arc<dyn Serializable>` itself, so
/// `arc.as_any()` returns the handle, not the entity. Call it on the entity
/// (`(*arc).as_any()`) or use [`downcast_ref`] / [`downcast_arc`].
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An object that can be stored and reconstructed.
///
/// An entity with an [`identifier`](Serializable::identifier) is always
/// stored as a standalone document and referenced from everywhere else. An
/// entity without one is embedded into the document of whatever owns it.
///
/// [`serialization_data`](Serializable::serialization_data) returns the
/// entity's own fields only. Nested entities stay in object form as
/// [`Value::Entity`]; the encoder handles them.
pub trait Serializable: AsAny + fmt::Debug {
    /// The identifier this entity is stored under, if any.
    fn identifier(&self) -> Option<&Identifier>;

    /// Registry key selecting the reconstruction callback for this shape.
    fn type_tag(&self) -> &str;

    /// Fields of this entity. Must not use the reserved `#` keys.
    fn serialization_data(&self) -> Record;
}

/// An entity shape that can be registered in a [`TypeRegistry`].
///
/// [`TypeRegistry`]: crate::TypeRegistry
pub trait Deserializable: Serializable + Sized {
    /// Tag written into every encoded record of this shape.
    const TYPE_TAG: &'static str;

    /// Reconstruct an entity from its decoded fields.
    ///
    /// Nested entities in `fields` are already live objects. Implementations
    /// register the new entity into `registry`, the same way their regular
    /// constructor does (see [`register_new`](crate::register_new)).
    fn deserialize(
        fields: Fields,
        identifier: Option<Identifier>,
        registry: &dyn Registry,
    ) -> Result<Arc<Self>>;
}

/// A value that never carries an identifier and is always embedded.
///
/// Its type is implied by its position in the owning entity's record; no
/// type tag is written.
pub trait AnonymousSerializable: fmt::Debug + Send + Sync {
    fn serialization_data(&self) -> Value;
}

/// Returns `true` if both handles point at the same entity instance.
pub fn same_instance(a: &Arc<dyn Serializable>, b: &Arc<dyn Serializable>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Borrow an entity as its concrete type.
pub fn downcast_ref<T: Serializable>(entity: &dyn Serializable) -> Option<&T> {
    <dyn Serializable as AsAny>::as_any(entity).downcast_ref::<T>()
}

/// Downcast a shared entity to its concrete type.
pub fn downcast_arc<T: Serializable>(entity: &Arc<dyn Serializable>) -> Option<Arc<T>> {
    let any = <dyn Serializable as AsAny>::into_any_arc(Arc::clone(entity));
    any.downcast::<T>().ok()
}

/// Decoded fields handed to a reconstruction callback.
///
/// Reserved tags are already stripped. The `take_*` accessors remove a field
/// and check its shape, failing with `MissingField` / `InvalidField`.
#[derive(Debug)]
pub struct Fields {
    type_tag: String,
    values: Record,
}

impl Fields {
    pub fn new(type_tag: impl Into<String>, values: Record) -> Self {
        Self {
            type_tag: type_tag.into(),
            values,
        }
    }

    /// Type tag of the record these fields came from.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names of the fields not taken yet.
    pub fn remaining(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Remove an optional field.
    pub fn take_opt(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    /// Remove a required field.
    pub fn take(&mut self, name: &str) -> Result<Value> {
        self.values
            .remove(name)
            .ok_or_else(|| SerializationError::MissingField {
                type_tag: self.type_tag.clone(),
                field: name.to_string(),
            })
    }

    pub fn take_bool(&mut self, name: &str) -> Result<bool> {
        let value = self.take(name)?;
        value.as_bool().ok_or_else(|| self.invalid(name, "bool", &value))
    }

    pub fn take_i64(&mut self, name: &str) -> Result<i64> {
        let value = self.take(name)?;
        value.as_i64().ok_or_else(|| self.invalid(name, "integer", &value))
    }

    pub fn take_f64(&mut self, name: &str) -> Result<f64> {
        let value = self.take(name)?;
        value.as_f64().ok_or_else(|| self.invalid(name, "number", &value))
    }

    pub fn take_string(&mut self, name: &str) -> Result<String> {
        match self.take(name)? {
            Value::String(s) => Ok(s),
            other => Err(self.invalid(name, "string", &other)),
        }
    }

    /// Remove an array (or set) field and return its items.
    pub fn take_list(&mut self, name: &str) -> Result<Vec<Value>> {
        match self.take(name)? {
            Value::Array(items) | Value::Set(items) => Ok(items),
            other => Err(self.invalid(name, "array", &other)),
        }
    }

    /// Remove a nested entity field of the given concrete type.
    pub fn take_entity<T: Serializable>(&mut self, name: &str) -> Result<Arc<T>> {
        let value = self.take(name)?;
        value
            .downcast_entity::<T>()
            .ok_or_else(|| self.invalid(name, any::type_name::<T>(), &value))
    }

    /// Remove a nested entity field of any type.
    pub fn take_any_entity(&mut self, name: &str) -> Result<Arc<dyn Serializable>> {
        match self.take(name)? {
            Value::Entity(e) => Ok(e),
            other => Err(self.invalid(name, "entity", &other)),
        }
    }

    /// Fail if any field was left untaken.
    pub fn finish(self) -> Result<()> {
        match self.values.into_keys().next() {
            None => Ok(()),
            Some(field) => Err(SerializationError::UnexpectedField {
                type_tag: self.type_tag,
                field,
            }),
        }
    }

    /// Hand the remaining fields over as a plain record.
    pub fn into_record(self) -> Record {
        self.values
    }

    fn invalid(&self, field: &str, expected: &str, found: &Value) -> SerializationError {
        SerializationError::InvalidField {
            type_tag: self.type_tag.clone(),
            field: field.to_string(),
            reason: format!("expected {expected}, found {}", found.kind_name()),
        }
    }
}
