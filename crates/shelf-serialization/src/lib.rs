//! Serialization protocol and storage front-end for shelf.
//!
//! Domain objects ("entities") are persisted as JSON documents, one document
//! per identifier. An entity that carries an [`Identifier`] is always stored
//! as its own document and replaced by a reference token wherever another
//! entity points at it; an entity without one is embedded inline. Loading a
//! document resolves reference tokens back to shared live instances.
//!
//! # Architecture
//!
//! - [`Serializable`] / [`Deserializable`]: capabilities an entity implements
//! - [`Value`]: JSON-compatible value tree that may hold live entities
//! - [`IdentifierRegistry`]: guarantees one live entity per identifier
//! - [`TypeRegistry`]: type tag → reconstruction callback
//! - [`Encoder`] / [`Decoder`]: embed-or-reference encoding and its inverse
//! - [`EntityStorage`]: transactional front-end over a storage backend
//!
//! # Modules
//!
//! - [`document`]: type-free inspection of stored documents

pub mod decoder;
pub mod document;
pub mod encoder;
pub mod entity;
pub mod error;
pub mod registry;
pub mod storage;
pub mod types;
pub mod value;

#[cfg(test)]
pub(crate) mod fixtures;

pub use decoder::{Decoder, ReferenceResolver};
pub use encoder::{Encoder, TransactionSink};
pub use entity::{
    downcast_arc, downcast_ref, same_instance, AnonymousSerializable, AsAny, Deserializable, Fields,
    Serializable,
};
pub use error::{Result, SerializationError};
pub use registry::{
    default_registry, is_default_registry, register_new, set_default_registry,
    DefaultRegistryGuard, IdentifierRegistry, Registry,
};
pub use storage::EntityStorage;
pub use types::{DeserializeFn, TypeRegistry};
pub use value::{Record, Value};

// Re-export key types
pub use shelf_backend::{BackendError, StorageBackend};
pub use shelf_types::Identifier;
