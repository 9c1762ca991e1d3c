use std::path::PathBuf;

/// Errors from storage backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A document is already stored under this identifier.
    #[error("document already exists: {0}")]
    AlreadyExists(String),

    /// No document is stored under this identifier.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The identifier cannot name a document: it is empty or contains a
    /// path separator or NUL byte.
    #[error("invalid document identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The storage root is not an existing directory.
    #[error("invalid storage root: {}", .0.display())]
    InvalidRoot(PathBuf),

    /// I/O error from the underlying storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The zip archive could not be read or written.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The stored bytes are not a valid UTF-8 document.
    #[error("cannot decode document {identifier}: {reason}")]
    Encoding { identifier: String, reason: String },

    /// The backend configuration is malformed.
    #[error("invalid backend configuration: {0}")]
    Config(String),
}

impl BackendError {
    /// Returns `true` for [`BackendError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
