//! In-memory persistent store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::store::{PersistentStore, StoredObject};
use crate::stream::{BlobRead, BlobWrite, ReadOutcome};
use sable_common::{Error, Result, StorePath};

type Objects = Arc<RwLock<HashMap<(String, String), Vec<u8>>>>;

/// In-memory persistent store.
///
/// Useful for testing and as the reference engine's scratch space. All
/// data is lost on drop. Writers buffer locally and commit the object
/// atomically on close.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Objects,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(storage_path: &StorePath, name: &str) -> (String, String) {
        (storage_path.to_string_path(), name.to_string())
    }

    /// Raw object bytes, if present. Test helper.
    pub fn raw_bytes(&self, storage_path: &StorePath, name: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap()
            .get(&Self::key(storage_path, name))
            .cloned()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_objects(
        &self,
        storage_path: &StorePath,
        prefix: &str,
    ) -> Result<Vec<StoredObject>> {
        let bucket = storage_path.to_string_path();
        let objects = self.objects.read().unwrap();

        let mut results: Vec<StoredObject> = objects
            .keys()
            .filter(|(b, name)| *b == bucket && name.starts_with(prefix))
            .map(|(_, name)| StoredObject::new(name.clone()))
            .collect();

        results.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(results)
    }

    async fn open_read(&self, storage_path: &StorePath, name: &str) -> Result<Box<dyn BlobRead>> {
        let objects = self.objects.read().unwrap();
        let data = objects
            .get(&Self::key(storage_path, name))
            .cloned()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("object not found: {}", name),
                ))
            })?;

        Ok(Box::new(MemoryReader { data, pos: 0 }))
    }

    async fn open_write(&self, storage_path: &StorePath, name: &str) -> Result<Box<dyn BlobWrite>> {
        Ok(Box::new(MemoryWriter {
            buf: Some(Vec::new()),
            dest: self.objects.clone(),
            key: Self::key(storage_path, name),
        }))
    }

    async fn delete_object(&self, storage_path: &StorePath, name: &str) -> Result<()> {
        self.objects
            .write()
            .unwrap()
            .remove(&Self::key(storage_path, name));
        Ok(())
    }
}

/// Reader over a snapshot of an object's bytes.
struct MemoryReader {
    data: Vec<u8>,
    pos: usize,
}

#[async_trait]
impl BlobRead for MemoryReader {
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

/// Writer that buffers locally and commits on close.
struct MemoryWriter {
    buf: Option<Vec<u8>>,
    dest: Objects,
    key: (String, String),
}

#[async_trait]
impl BlobWrite for MemoryWriter {
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
            self.dest.write().unwrap().insert(self.key.clone(), buf);
        }
        Ok(())
    }
}
