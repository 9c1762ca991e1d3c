use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::document_name;
use crate::error::{BackendError, BackendResult};
use crate::traits::StorageBackend;

/// Document store backed by a directory of plain text files.
///
/// Each document lives in `<root>/<identifier>.json`. Writes go to a
/// temporary file inside `root` first and are renamed into place, so a
/// reader sees either the previous document or the new one, never a
/// partial write.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Open a store rooted at an existing directory.
    ///
    /// Fails with [`BackendError::InvalidRoot`] if `root` is not a directory.
    pub fn new(root: impl AsRef<Path>) -> BackendResult<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(BackendError::InvalidRoot(root.to_path_buf()));
        }
        let root = fs::canonicalize(root)?;
        Ok(Self { root })
    }

    /// The directory holding the documents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, identifier: &str) -> BackendResult<PathBuf> {
        Ok(self.root.join(document_name(identifier)?))
    }

    fn stage(&self, data: &str) -> BackendResult<NamedTempFile> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".shelf-")
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        tmp.write_all(data.as_bytes())?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }
}

impl StorageBackend for FilesystemBackend {
    fn put(&self, identifier: &str, data: &str, overwrite: bool) -> BackendResult<()> {
        let path = self.path(identifier)?;
        if !overwrite && path.is_file() {
            return Err(BackendError::AlreadyExists(identifier.to_string()));
        }

        let tmp = self.stage(data)?;
        if overwrite {
            tmp.persist(&path).map_err(|e| e.error)?;
        } else {
            tmp.persist_noclobber(&path).map_err(|e| match e.error.kind() {
                io::ErrorKind::AlreadyExists => {
                    BackendError::AlreadyExists(identifier.to_string())
                }
                _ => BackendError::Io(e.error),
            })?;
        }

        debug!(identifier, len = data.len(), overwrite, "document written");
        Ok(())
    }

    fn get(&self, identifier: &str) -> BackendResult<String> {
        let bytes = match fs::read(self.path(identifier)?) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackendError::NotFound(identifier.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        String::from_utf8(bytes).map_err(|e| BackendError::Encoding {
            identifier: identifier.to_string(),
            reason: e.to_string(),
        })
    }

    fn exists(&self, identifier: &str) -> BackendResult<bool> {
        Ok(self.path(identifier)?.is_file())
    }

    fn delete(&self, identifier: &str) -> BackendResult<()> {
        match fs::remove_file(self.path(identifier)?) {
            Ok(()) => {
                debug!(identifier, "document deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BackendError::NotFound(identifier.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
