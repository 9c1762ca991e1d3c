use shelf_backend::BackendError;
use shelf_types::{Identifier, TypeError};
use thiserror::Error;

/// Errors from encoding, decoding and the storage front-end.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    /// First assignment to an identifier that is already taken.
    #[error("identifier already bound: {0}")]
    AlreadyBound(Identifier),

    /// Another live entity already owns this identifier.
    #[error("identifier already owned by a live entity: {0}")]
    DuplicateIdentifier(Identifier),

    /// Two distinct entities claimed one identifier within a transaction.
    #[error("identifier assigned to two different entities: {0}")]
    IdentifierConflict(Identifier),

    #[error("entity {entity} cannot be stored under identifier {storage}")]
    IdentifierMismatch {
        storage: Identifier,
        entity: Identifier,
    },

    #[error("reference to missing document: {0}")]
    DanglingReference(Identifier),

    #[error("documents reference each other in a cycle through: {0}")]
    CyclicReference(Identifier),

    #[error("no reconstruction callback for type tag: {0}")]
    UnknownType(String),

    #[error("type tag registered for two different types: {0}")]
    DuplicateTypeTag(String),

    #[error("malformed reference: {0}")]
    MalformedReference(String),

    #[error("document does not encode an entity")]
    NotAnEntity,

    #[error("expected {expected}, found type tag {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("field name is reserved: {0}")]
    ReservedField(String),

    #[error("{type_tag}: missing field {field}")]
    MissingField { type_tag: String, field: String },

    #[error("{type_tag}: invalid field {field}: {reason}")]
    InvalidField {
        type_tag: String,
        field: String,
        reason: String,
    },

    #[error("{type_tag}: unexpected field {field}")]
    UnexpectedField { type_tag: String, field: String },
}

pub type Result<T> = std::result::Result<T, SerializationError>;
