//! Persistent store facade trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::stream::{BlobRead, BlobWrite};
use sable_common::{Result, StorePath};

/// An application-named blob the engine persists through the store.
///
/// The engine owns the plaintext/ciphertext framing around the bytes; the
/// application owns where and how the bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredObject {
    name: String,
}

impl StoredObject {
    /// Create an object handle from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The name of this persisted object.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Contract the engine calls into for storing and retrieving encrypted
/// objects on application-chosen backing media.
///
/// An implementation is handed to the engine when a network share is
/// created or opened. The engine may call any method from its own tasks at
/// arbitrary times, so implementations must not assume they are called
/// only from the thread that constructed them.
///
/// Vended streams are released by calling `close()` on them (or dropping
/// the box); the store must not require any other handoff.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Get the store name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// List objects under `storage_path` whose names start with `prefix`.
    ///
    /// # Postconditions
    /// - An empty prefix matches every object at the path
    /// - A path with no matching objects yields an empty vec, not an error
    ///
    /// # Errors
    /// - `Io` if the path cannot be accessed at all (as opposed to
    ///   existing but empty)
    async fn list_objects(
        &self,
        storage_path: &StorePath,
        prefix: &str,
    ) -> Result<Vec<StoredObject>>;

    /// Open the named object for reading.
    ///
    /// The engine only opens objects it knows to exist.
    ///
    /// # Errors
    /// - `Io` if the object cannot be opened
    async fn open_read(&self, storage_path: &StorePath, name: &str) -> Result<Box<dyn BlobRead>>;

    /// Open the named object for writing, creating it if it does not exist.
    ///
    /// # Errors
    /// - `Io` if the object cannot be created or opened
    async fn open_write(&self, storage_path: &StorePath, name: &str) -> Result<Box<dyn BlobWrite>>;

    /// Delete the named object.
    ///
    /// Deleting an object that is already gone succeeds where the backing
    /// medium allows it.
    ///
    /// # Errors
    /// - `Io` on any other backing-medium failure
    async fn delete_object(&self, storage_path: &StorePath, name: &str) -> Result<()>;
}
