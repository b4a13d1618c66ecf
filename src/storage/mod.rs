//! Local image storage with collision-free naming
//!
//! Files are named `{prefix}{n}{ext}` from a [`NamingCounter`] shared by all
//! concurrent writers. A name is claimed with exclusive create while the
//! counter lock is held, so two tasks can never end up with the same path,
//! not even against files created by another process.

pub mod extension;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub use extension::{ResponseMeta, resolve_extension};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot create directory {}: {source}", path.display())]
    CreateDirectory { path: PathBuf, source: io::Error },

    #[error("cannot claim {}: {source}", path.display())]
    Claim { path: PathBuf, source: io::Error },

    #[error("cannot write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("image numbers exhausted in {}", directory.display())]
    NamesExhausted { directory: PathBuf },
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Monotonic image number shared by every task writing into a store
#[derive(Debug)]
pub struct NamingCounter {
    next: Mutex<u64>,
}

impl NamingCounter {
    pub fn new(start: u64) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }

    /// Number the next allocation will try first
    pub async fn peek(&self) -> u64 {
        *self.next.lock().await
    }
}

impl Default for NamingCounter {
    fn default() -> Self {
        Self::new(1)
    }
}

/// A written image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Destination directory plus naming scheme
#[derive(Debug, Clone)]
pub struct ImageStore {
    directory: PathBuf,
    prefix: String,
    counter: Arc<NamingCounter>,
}

impl ImageStore {
    pub fn new(
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
        counter: Arc<NamingCounter>,
    ) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            counter,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the directory and its parents if missing
    ///
    /// Returns `true` when the directory had to be created.
    pub async fn ensure_directory(&self) -> Result<bool> {
        if fs::metadata(&self.directory)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Ok(false);
        }

        fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| StorageError::CreateDirectory {
                path: self.directory.clone(),
                source,
            })?;

        tracing::info!(path = %self.directory.display(), "Created download directory");
        Ok(true)
    }

    /// Claim the next free name for `extension`
    ///
    /// The returned file exists on disk and is removed again if the claim is
    /// dropped before [`ClaimedFile::commit`].
    pub async fn allocate(&self, extension: &str) -> Result<ClaimedFile> {
        let mut next = self.counter.next.lock().await;

        loop {
            let n = *next;
            *next = n.checked_add(1).ok_or_else(|| StorageError::NamesExhausted {
                directory: self.directory.clone(),
            })?;

            let path = self
                .directory
                .join(format!("{}{}{}", self.prefix, n, extension));

            let exists = fs::try_exists(&path)
                .await
                .map_err(|source| StorageError::Claim {
                    path: path.clone(),
                    source,
                })?;
            if exists {
                tracing::debug!(path = %path.display(), "Name taken, skipping");
                continue;
            }

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    return Ok(ClaimedFile {
                        file: Some(file),
                        path,
                        committed: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(path = %path.display(), "Lost race for name, skipping");
                }
                Err(source) => return Err(StorageError::Claim { path, source }),
            }
        }
    }

    /// Allocate a name and write the full body to it
    pub async fn save(&self, body: &[u8], extension: &str) -> Result<SavedImage> {
        let mut claim = self.allocate(extension).await?;
        claim.write_all(body).await?;
        let saved = claim.commit(body.len() as u64);

        tracing::debug!(path = %saved.path.display(), size = saved.bytes, "Image written");
        Ok(saved)
    }
}

/// A name reserved on disk that has not been completely written yet
#[derive(Debug)]
pub struct ClaimedFile {
    file: Option<File>,
    path: PathBuf,
    committed: bool,
}

impl ClaimedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_all(&mut self, body: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        let written = async {
            file.write_all(body).await?;
            file.flush().await
        }
        .await;

        written.map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Keep the file
    pub fn commit(mut self, bytes: u64) -> SavedImage {
        self.committed = true;
        SavedImage {
            path: self.path.clone(),
            bytes,
        }
    }
}

impl Drop for ClaimedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove unfinished file");
        }
    }
}
