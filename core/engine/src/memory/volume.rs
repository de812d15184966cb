//! In-memory volume.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::volume::{FileInfo, MountPoint, Volume, VolumeKind};
use sable_common::{Error, Result, StorePath};
use sable_store::{BlobRead, BlobWrite, ReadOutcome};

type Namespace = Arc<RwLock<HashMap<String, (Vec<u8>, DateTime<Utc>)>>>;

/// Volume whose namespace lives in memory.
pub struct MemoryVolume {
    label: String,
    kind: VolumeKind,
    #[allow(dead_code)]
    backing: PathBuf,
    #[allow(dead_code)]
    capacity: u64,
    mounted: RwLock<Option<MountPoint>>,
    files: Namespace,
    /// Shared view of the owning engine's unlocked flag.
    unlocked: Arc<AtomicBool>,
}

impl MemoryVolume {
    pub(crate) fn new(
        kind: VolumeKind,
        backing: PathBuf,
        label: String,
        capacity: u64,
        unlocked: Arc<AtomicBool>,
    ) -> Self {
        Self {
            label,
            kind,
            backing,
            capacity,
            mounted: RwLock::new(None),
            files: Arc::new(RwLock::new(HashMap::new())),
            unlocked,
        }
    }

    fn require_mounted(&self) -> Result<()> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(Error::State(format!(
                "volume '{}' is not mounted",
                self.label
            )))
        }
    }

    fn key(path: &StorePath) -> String {
        path.to_string_path()
    }
}

#[async_trait]
impl Volume for MemoryVolume {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> VolumeKind {
        self.kind
    }

    fn is_mounted(&self) -> bool {
        self.mounted.read().unwrap().is_some()
    }

    async fn mount(&self, point: MountPoint) -> Result<()> {
        if self.kind == VolumeKind::Permanent && !self.unlocked.load(Ordering::SeqCst) {
            return Err(Error::State(
                "unlock required to mount a permanent volume".to_string(),
            ));
        }

        let mut mounted = self.mounted.write().unwrap();
        if mounted.is_some() {
            return Err(Error::State(format!(
                "volume '{}' is already mounted",
                self.label
            )));
        }
        *mounted = Some(point);
        Ok(())
    }

    async fn unmount(&self) -> Result<()> {
        self.mounted.write().unwrap().take();
        Ok(())
    }

    async fn exists(&self, path: &StorePath) -> Result<bool> {
        self.require_mounted()?;
        let key = Self::key(path);
        let files = self.files.read().unwrap();
        if files.contains_key(&key) {
            return Ok(true);
        }
        // Directories are implicit.
        let dir_prefix = if path.is_root() {
            "/".to_string()
        } else {
            format!("{}/", key)
        };
        Ok(path.is_root() || files.keys().any(|k| k.starts_with(&dir_prefix)))
    }

    async fn file_info(&self, path: &StorePath) -> Result<FileInfo> {
        self.require_mounted()?;
        let key = Self::key(path);
        let files = self.files.read().unwrap();

        if let Some((data, modified)) = files.get(&key) {
            return Ok(FileInfo {
                size: data.len() as u64,
                is_directory: false,
                modified: *modified,
            });
        }

        let dir_prefix = if path.is_root() {
            "/".to_string()
        } else {
            format!("{}/", key)
        };
        if path.is_root() || files.keys().any(|k| k.starts_with(&dir_prefix)) {
            return Ok(FileInfo {
                size: 0,
                is_directory: true,
                modified: Utc::now(),
            });
        }

        Err(Error::NotFound(format!("no entry at {}", path)))
    }

    async fn open_read(&self, path: &StorePath) -> Result<Box<dyn BlobRead>> {
        self.require_mounted()?;
        let key = Self::key(path);
        let files = self.files.read().unwrap();
        let (data, _) = files
            .get(&key)
            .ok_or_else(|| Error::NotFound(format!("no entry at {}", path)))?;
        Ok(Box::new(VolumeReader {
            data: data.clone(),
            pos: 0,
        }))
    }

    async fn open_write(&self, path: &StorePath) -> Result<Box<dyn BlobWrite>> {
        self.require_mounted()?;
        Ok(Box::new(VolumeWriter {
            buf: Some(Vec::new()),
            dest: self.files.clone(),
            key: Self::key(path),
        }))
    }

    async fn remove_file(&self, path: &StorePath) -> Result<()> {
        self.require_mounted()?;
        let key = Self::key(path);
        self.files
            .write()
            .unwrap()
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("no entry at {}", path)))
    }
}

struct VolumeReader {
    data: Vec<u8>,
    pos: usize,
}

#[async_trait]
impl BlobRead for VolumeReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        if self.pos >= self.data.len() {
            return Ok(ReadOutcome::Eof);
        }
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(ReadOutcome::Data(n))
    }

    async fn close(&mut self) -> Result<()> {
        self.pos = self.data.len();
        Ok(())
    }
}

struct VolumeWriter {
    buf: Option<Vec<u8>>,
    dest: Namespace,
    key: String,
}

#[async_trait]
impl BlobWrite for VolumeWriter {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let buf = self
            .buf
            .as_mut()
            .ok_or_else(|| Error::State("write to closed stream".to_string()))?;
        buf.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(buf) = self.buf.take() {
            self.dest
                .write()
                .unwrap()
                .insert(self.key.clone(), (buf, Utc::now()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unlocked_volume() -> MemoryVolume {
        MemoryVolume::new(
            VolumeKind::Permanent,
            PathBuf::from("black_data.bin"),
            "testvol".to_string(),
            10 * 1024 * 1024,
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[tokio::test]
    async fn test_unmounted_operations_rejected() {
        let vol = unlocked_volume();
        let path = StorePath::parse("/file.txt").unwrap();

        assert!(!vol.is_mounted());
        assert!(matches!(vol.exists(&path).await, Err(Error::State(_))));
        assert!(matches!(vol.open_read(&path).await, Err(Error::State(_))));
        assert!(matches!(vol.open_write(&path).await, Err(Error::State(_))));
        assert!(matches!(
            vol.remove_file(&path).await,
            Err(Error::State(_))
        ));
    }

    #[tokio::test]
    async fn test_mount_requires_unlock_for_permanent() {
        let vol = MemoryVolume::new(
            VolumeKind::Permanent,
            PathBuf::from("black_data.bin"),
            "locked".to_string(),
            1024,
            Arc::new(AtomicBool::new(false)),
        );
        let result = vol.mount(MountPoint::new(1).unwrap()).await;
        assert!(matches!(result, Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_mount_store_retrieve() {
        let vol = unlocked_volume();
        vol.mount(MountPoint::new(1).unwrap()).await.unwrap();

        let path = StorePath::parse("/docs/report.bin").unwrap();
        let data = b"volume payload".to_vec();

        let mut writer = vol.open_write(&path).await.unwrap();
        writer.write(&data).await.unwrap();
        writer.close().await.unwrap();

        assert!(vol.exists(&path).await.unwrap());
        let info = vol.file_info(&path).await.unwrap();
        assert_eq!(info.size, data.len() as u64);
        assert!(!info.is_directory);

        // The parent is an implicit directory.
        let dir = StorePath::parse("/docs").unwrap();
        assert!(vol.file_info(&dir).await.unwrap().is_directory);

        let mut reader = vol.open_read(&path).await.unwrap();
        let mut buf = [0u8; 64];
        let ReadOutcome::Data(n) = reader.read(&mut buf).await.unwrap() else {
            panic!("expected data");
        };
        assert_eq!(&buf[..n], &data[..]);
    }

    #[tokio::test]
    async fn test_double_mount_rejected() {
        let vol = unlocked_volume();
        vol.mount(MountPoint::new(2).unwrap()).await.unwrap();
        let result = vol.mount(MountPoint::new(3).unwrap()).await;
        assert!(matches!(result, Err(Error::State(_))));

        vol.unmount().await.unwrap();
        vol.unmount().await.unwrap();
        vol.mount(MountPoint::new(3).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_missing_file() {
        let vol = unlocked_volume();
        vol.mount(MountPoint::new(1).unwrap()).await.unwrap();
        let path = StorePath::parse("/ghost").unwrap();
        assert!(matches!(
            vol.remove_file(&path).await,
            Err(Error::NotFound(_))
        ));
    }
}
