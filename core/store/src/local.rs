//! Local filesystem persistent store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::store::{PersistentStore, StoredObject};
use crate::stream::{BlobRead, BlobWrite, FileReader, FileWriter};
use sable_common::{Error, Result, StorePath};

/// Persistent store backed by a local directory prefix.
///
/// Objects resolve to `<root>/<storage_path components>/<name>` using a
/// single path-separator convention.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a new local store rooted at the given directory.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Invalid path
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self { root })
    }

    /// Directory a storage path resolves to.
    fn dir_for(&self, storage_path: &StorePath) -> PathBuf {
        let mut dir = self.root.clone();
        for component in storage_path.components() {
            dir.push(component);
        }
        dir
    }

    /// Full filesystem path for an object.
    fn path_for(&self, storage_path: &StorePath, name: &str) -> Result<PathBuf> {
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Object name cannot be empty".to_string(),
            ));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(Error::InvalidInput(
                "Object name cannot contain separators".to_string(),
            ));
        }
        Ok(self.dir_for(storage_path).join(name))
    }
}

#[async_trait]
impl PersistentStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_objects(
        &self,
        storage_path: &StorePath,
        prefix: &str,
    ) -> Result<Vec<StoredObject>> {
        let dir = self.dir_for(storage_path);

        // An inaccessible path is an I/O failure; only an existing-but-empty
        // directory yields an empty listing.
        let mut entries = fs::read_dir(&dir).await?;

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if name.starts_with(prefix) {
                results.push(StoredObject::new(name));
            }
        }

        results.sort_by(|a, b| a.name().cmp(b.name()));
        debug!(
            "listed {} object(s) under {} with prefix '{}'",
            results.len(),
            storage_path,
            prefix
        );
        Ok(results)
    }

    async fn open_read(&self, storage_path: &StorePath, name: &str) -> Result<Box<dyn BlobRead>> {
        let path = self.path_for(storage_path, name)?;
        let reader = FileReader::open(&path).await?;
        Ok(Box::new(reader))
    }

    async fn open_write(&self, storage_path: &StorePath, name: &str) -> Result<Box<dyn BlobWrite>> {
        let path = self.path_for(storage_path, name)?;

        // Buckets materialize lazily on first write.
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let writer = FileWriter::create(&path).await?;
        Ok(Box::new(writer))
    }

    async fn delete_object(&self, storage_path: &StorePath, name: &str) -> Result<()> {
        let path = self.path_for(storage_path, name)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // Delete is idempotent on this medium.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("delete of already-missing object {}", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
