use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("identifier must not be empty")]
    EmptyIdentifier,

    #[error("type tag must not be empty")]
    EmptyTypeTag,

    #[error("type tag is reserved: {0}")]
    ReservedTypeTag(String),
}
