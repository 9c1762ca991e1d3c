//! Storage backends for shelf.
//!
//! A backend is a text-level key-value store: one document per identifier,
//! nothing else. It never interprets document contents; the serialization
//! layer on top decides what goes into a document and how documents refer
//! to each other.
//!
//! # Storage Backends
//!
//! All backends implement the [`StorageBackend`] trait:
//!
//! - [`FilesystemBackend`] -- one `<id>.json` file per document in a directory
//! - [`ZipFileBackend`] -- all documents as entries of a single zip archive
//! - [`CachingBackend`] -- write-through memory cache in front of another backend
//! - [`InMemoryBackend`] -- `HashMap`-based store for tests and ephemeral use
//!
//! # Design Rules
//!
//! 1. `put` without `overwrite` never replaces an existing document.
//! 2. A `put` or `delete` is never partially applied.
//! 3. Absent documents are reported as [`BackendError::NotFound`].
//! 4. Identifiers are flat names; anything else is
//!    [`BackendError::InvalidIdentifier`] on every backend.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod archive;
pub mod caching;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use archive::ZipFileBackend;
pub use caching::CachingBackend;
pub use config::{BackendConfig, BackendKind};
pub use error::{BackendError, BackendResult};
pub use filesystem::FilesystemBackend;
pub use memory::InMemoryBackend;
pub use traits::StorageBackend;

/// Extension appended to an identifier to form a file or archive entry name.
pub const DOCUMENT_EXTENSION: &str = "json";

/// File or archive entry name of the document stored under `identifier`.
pub fn document_name(identifier: &str) -> BackendResult<String> {
    validate_identifier(identifier)?;
    Ok(format!("{identifier}.{DOCUMENT_EXTENSION}"))
}

/// Every backend accepts the same identifiers: non-empty flat names with no
/// path separator and no NUL byte.
pub fn validate_identifier(identifier: &str) -> BackendResult<()> {
    if identifier.is_empty() || identifier.contains(['/', '\\', '\0']) {
        return Err(BackendError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}
