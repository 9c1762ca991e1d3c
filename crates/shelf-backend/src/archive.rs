use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::document_name;
use crate::error::{BackendError, BackendResult};
use crate::traits::StorageBackend;

/// Document store backed by a single zip archive.
///
/// Every document is a Deflate-compressed entry named `<identifier>.json`.
/// Zip archives cannot be edited in place, so two write paths exist:
///
/// - **Append** (document absent): the entry is appended to the archive
///   directly.
/// - **Rewrite** (document present, `put` with overwrite or `delete`): every
///   other entry is copied, without recompression, into a temporary archive
///   next to the original. The new entry is added (for `put`), the archive
///   comment is carried over, and the temporary archive then replaces the
///   original with a single rename. An abandoned rewrite leaves the original
///   archive untouched.
///
/// The rewrite reads and writes the whole archive, so updates cost time
/// proportional to the archive size.
#[derive(Debug)]
pub struct ZipFileBackend {
    path: PathBuf,
    /// Serializes writers within this process.
    write_lock: Mutex<()>,
}

/// Changes applied while copying an archive.
#[derive(Default)]
struct Rewrite<'a> {
    /// Entry left out of the copy.
    skip: Option<&'a str>,
    /// Entry added after the copy: (name, contents).
    insert: Option<(&'a str, &'a str)>,
    /// Replacement archive comment; the existing bytes are kept otherwise.
    comment: Option<&'a [u8]>,
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

impl ZipFileBackend {
    /// Open the archive at `path`, creating an empty one if it is missing.
    ///
    /// Fails with [`BackendError::InvalidRoot`] if the parent directory does
    /// not exist or `path` is a directory, and with
    /// [`BackendError::Archive`] if an existing file is not a zip archive.
    pub fn new(path: impl AsRef<Path>) -> BackendResult<Self> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.is_dir() {
            return Err(BackendError::InvalidRoot(parent));
        }
        if path.is_dir() {
            return Err(BackendError::InvalidRoot(path.to_path_buf()));
        }

        if path.exists() {
            ZipArchive::new(File::open(path)?)?;
        } else {
            ZipWriter::new(File::create(path)?).finish()?;
            debug!(path = %path.display(), "created empty archive");
        }

        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The archive comment, with bytes that are not UTF-8 replaced.
    pub fn comment(&self) -> BackendResult<String> {
        Ok(String::from_utf8_lossy(&self.raw_comment()?).into_owned())
    }

    /// The archive comment exactly as stored.
    pub fn raw_comment(&self) -> BackendResult<Vec<u8>> {
        let archive = self.open_archive()?;
        Ok(archive.comment().to_vec())
    }

    /// Replace the archive comment. Entries are carried over unchanged.
    pub fn set_comment(&self, comment: &str) -> BackendResult<()> {
        let _guard = self.write_lock.lock().expect("archive lock poisoned");
        let staged = self.stage_rewrite(Rewrite {
            comment: Some(comment.as_bytes()),
            ..Default::default()
        })?;
        self.commit(staged)
    }

    fn open_archive(&self) -> BackendResult<ZipArchive<File>> {
        Ok(ZipArchive::new(File::open(&self.path)?)?)
    }

    fn contains_entry(&self, name: &str) -> BackendResult<bool> {
        let archive = self.open_archive()?;
        let found = archive.file_names().any(|n| n == name);
        Ok(found)
    }

    fn append(&self, name: &str, data: &str) -> BackendResult<()> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let mut zip = ZipWriter::new_append(file)?;
        zip.start_file(name, entry_options())?;
        zip.write_all(data.as_bytes())?;
        let file = zip.finish()?;
        file.sync_all()?;
        debug!(entry = name, len = data.len(), "archive entry appended");
        Ok(())
    }

    /// Build the rewritten archive in a temporary file next to the original.
    ///
    /// The original archive is only read. Dropping the returned file
    /// discards the rewrite.
    fn stage_rewrite(&self, rewrite: Rewrite<'_>) -> BackendResult<NamedTempFile> {
        let mut source = self.open_archive()?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".shelf-")
            .suffix(".zip.tmp")
            .tempfile_in(dir)?;

        let mut out = ZipWriter::new(tmp);
        let comment = rewrite.comment.unwrap_or(source.comment());
        out.set_raw_comment(comment.into());

        let mut kept = 0usize;
        for i in 0..source.len() {
            let entry = source.by_index_raw(i)?;
            if Some(entry.name()) == rewrite.skip {
                continue;
            }
            out.raw_copy_file(entry)?;
            kept += 1;
        }

        if let Some((name, data)) = rewrite.insert {
            out.start_file(name, entry_options())?;
            out.write_all(data.as_bytes())?;
        }

        let tmp = out.finish()?;
        tmp.as_file().sync_all()?;
        debug!(kept, skipped = ?rewrite.skip, "archive rewrite staged");
        Ok(tmp)
    }

    /// Replace the original archive with a staged rewrite.
    fn commit(&self, staged: NamedTempFile) -> BackendResult<()> {
        match staged.persist(&self.path) {
            Ok(_) => {
                debug!(path = %self.path.display(), "archive replaced");
                Ok(())
            }
            Err(e) => {
                let tmp_path = e.file.path().to_path_buf();
                if let Err(close_err) = e.file.close() {
                    warn!(
                        path = %tmp_path.display(),
                        error = %close_err,
                        "failed to remove staged archive"
                    );
                }
                Err(e.error.into())
            }
        }
    }
}

impl StorageBackend for ZipFileBackend {
    fn put(&self, identifier: &str, data: &str, overwrite: bool) -> BackendResult<()> {
        let name = document_name(identifier)?;
        let _guard = self.write_lock.lock().expect("archive lock poisoned");

        if !self.contains_entry(&name)? {
            return self.append(&name, data);
        }
        if !overwrite {
            return Err(BackendError::AlreadyExists(identifier.to_string()));
        }

        let staged = self.stage_rewrite(Rewrite {
            skip: Some(&name),
            insert: Some((&name, data)),
            ..Default::default()
        })?;
        self.commit(staged)
    }

    fn get(&self, identifier: &str) -> BackendResult<String> {
        let name = document_name(identifier)?;
        let mut archive = self.open_archive()?;
        let mut entry = match archive.by_name(&name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(BackendError::NotFound(identifier.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| BackendError::Encoding {
            identifier: identifier.to_string(),
            reason: e.to_string(),
        })
    }

    fn exists(&self, identifier: &str) -> BackendResult<bool> {
        self.contains_entry(&document_name(identifier)?)
    }

    fn delete(&self, identifier: &str) -> BackendResult<()> {
        let name = document_name(identifier)?;
        let _guard = self.write_lock.lock().expect("archive lock poisoned");

        if !self.contains_entry(&name)? {
            return Err(BackendError::NotFound(identifier.to_string()));
        }
        let staged = self.stage_rewrite(Rewrite {
            skip: Some(&name),
            ..Default::default()
        })?;
        self.commit(staged)
    }
}
