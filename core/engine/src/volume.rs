//! Encrypted volumes.
//!
//! A volume is an engine-managed encrypted container exposing a virtual
//! file namespace. It must be mounted into a small integer slot before any
//! path-dependent operation is meaningful.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use sable_common::{Error, Result, StorePath};
use sable_store::{BlobRead, BlobWrite};

/// A validated mount-point slot. Valid slots are 1 through 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint(u8);

impl MountPoint {
    /// Create a mount point from a slot number.
    ///
    /// # Errors
    /// - Returns error unless `slot` is in `[1, 9]`
    pub fn new(slot: u8) -> Result<Self> {
        if (1..=9).contains(&slot) {
            Ok(Self(slot))
        } else {
            Err(Error::InvalidInput(format!(
                "Mount point must be in [1, 9], got {}",
                slot
            )))
        }
    }

    /// The slot number.
    pub fn slot(self) -> u8 {
        self.0
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Types of volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeKind {
    /// Can be mounted without unlocking the engine.
    Transient,
    /// Requires the engine to be unlocked before mounting.
    Permanent,
}

/// Metadata for an entry in a volume's namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether this entry is a directory.
    pub is_directory: bool,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

/// An engine-managed encrypted container.
///
/// File operations address entries by a path relative to the volume root.
/// Every path-dependent operation on an unmounted volume is rejected with
/// a `State` error; callers are expected to check `is_mounted` first.
#[async_trait]
pub trait Volume: Send + Sync {
    /// The user label, unique within the engine's known volumes.
    fn label(&self) -> &str;

    /// The volume type.
    fn kind(&self) -> VolumeKind;

    /// Whether the volume is mounted and ready for file operations.
    fn is_mounted(&self) -> bool;

    /// Mount the volume into a slot.
    ///
    /// # Errors
    /// - `State` if the engine must be unlocked first, or the volume is
    ///   already mounted
    async fn mount(&self, point: MountPoint) -> Result<()>;

    /// Unmount the volume. Idempotent.
    async fn unmount(&self) -> Result<()>;

    /// Whether an entry exists at the given path.
    async fn exists(&self, path: &StorePath) -> Result<bool>;

    /// Metadata for the entry at the given path.
    ///
    /// # Errors
    /// - `NotFound` if no entry exists at the path
    async fn file_info(&self, path: &StorePath) -> Result<FileInfo>;

    /// Open a file in the volume for reading. Bytes are decrypted by the
    /// engine transparently.
    async fn open_read(&self, path: &StorePath) -> Result<Box<dyn BlobRead>>;

    /// Open a file in the volume for writing, creating it if absent.
    /// Bytes are encrypted by the engine transparently.
    async fn open_write(&self, path: &StorePath) -> Result<Box<dyn BlobWrite>>;

    /// Remove a file from the volume.
    ///
    /// # Errors
    /// - `NotFound` if no entry exists at the path
    async fn remove_file(&self, path: &StorePath) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_point_range() {
        assert!(MountPoint::new(0).is_err());
        assert!(MountPoint::new(10).is_err());
        for slot in 1..=9 {
            assert_eq!(MountPoint::new(slot).unwrap().slot(), slot);
        }
    }
}
