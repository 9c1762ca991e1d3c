use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::ZipFileBackend;
use crate::caching::CachingBackend;
use crate::error::{BackendError, BackendResult};
use crate::filesystem::FilesystemBackend;
use crate::memory::InMemoryBackend;
use crate::traits::StorageBackend;

/// Which backend to open and where its data lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendKind {
    /// Directory of `<id>.json` files.
    Filesystem { root: PathBuf },
    /// Single zip archive.
    Archive { path: PathBuf },
    /// Process-local map; nothing is persisted.
    Memory,
}

/// Backend configuration, usually loaded from a TOML file:
///
/// ```toml
/// kind = "archive"
/// path = "pulses.zip"
/// cached = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(flatten)]
    pub kind: BackendKind,
    /// Wrap the backend in a write-through [`CachingBackend`].
    #[serde(default)]
    pub cached: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Filesystem {
                root: PathBuf::from("."),
            },
            cached: false,
        }
    }
}

impl BackendConfig {
    /// Configuration for a directory store.
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            kind: BackendKind::Filesystem { root: root.into() },
            cached: false,
        }
    }

    /// Configuration for an archive store.
    pub fn archive(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: BackendKind::Archive { path: path.into() },
            cached: false,
        }
    }

    /// Enable or disable the write-through cache.
    pub fn with_cache(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> BackendResult<Self> {
        toml::from_str(text).map_err(|e| BackendError::Config(e.to_string()))
    }

    /// Load a configuration file.
    ///
    /// Relative data paths are resolved against the directory holding the
    /// configuration file.
    pub fn load(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.kind = match config.kind {
                BackendKind::Filesystem { root } if root.is_relative() => BackendKind::Filesystem {
                    root: base.join(root),
                },
                BackendKind::Archive { path } if path.is_relative() => BackendKind::Archive {
                    path: base.join(path),
                },
                other => other,
            };
        }
        Ok(config)
    }

    /// Open the configured backend.
    pub fn open(&self) -> BackendResult<Box<dyn StorageBackend>> {
        let backend: Box<dyn StorageBackend> = match &self.kind {
            BackendKind::Filesystem { root } => Box::new(FilesystemBackend::new(root)?),
            BackendKind::Archive { path } => Box::new(ZipFileBackend::new(path)?),
            BackendKind::Memory => Box::new(InMemoryBackend::new()),
        };
        if self.cached {
            Ok(Box::new(CachingBackend::from_boxed(backend)))
        } else {
            Ok(backend)
        }
    }
}
