//! Foundation types for shelf.
//!
//! Every other shelf crate depends on `shelf-types`. It carries the
//! identifier newtype shared by the identifier registry and the storage
//! backends, and the reserved keys of the stored document format.
//!
//! # Key Types
//!
//! - [`Identifier`]: Non-empty string naming a standalone stored document
//! - [`TYPE_TAG_KEY`] / [`IDENTIFIER_KEY`]: Reserved document keys
//! - [`REFERENCE_TYPE_TAG`]: Type tag of reference tokens

pub mod error;
pub mod identifier;
pub mod tags;

pub use error::TypeError;
pub use identifier::Identifier;
pub use tags::{
    is_reserved_key, validate_type_tag, IDENTIFIER_KEY, REFERENCE_TYPE_TAG, TYPE_TAG_KEY,
};
