//! In-memory network share.
//!
//! Key and membership metadata are persisted through the application's
//! `PersistentStore` exactly like payload objects, so the facade sees the
//! same traffic the real engine would generate. Payload streams are sealed
//! with a per-share key; removing a member rotates the key.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::seal::{self, SealKey, KEY_LEN};
use crate::contact::Contact;
use crate::share::NetworkShare;
use sable_common::{Error, Result, ShareId, StorePath};
use sable_store::{BlobRead, BlobWrite, PersistentStore, ReadOutcome};

/// Serialized share bookkeeping, stored as an object in the backing store.
#[derive(Serialize, Deserialize)]
struct ShareMetadata {
    id: String,
    key: String,
    members: Vec<Contact>,
}

pub struct MemoryShare {
    id: ShareId,
    storage_path: StorePath,
    store: Arc<dyn PersistentStore>,
    identity: Contact,
    key: RwLock<SealKey>,
    members: RwLock<Vec<Contact>>,
}

impl MemoryShare {
    fn meta_name(id: &ShareId) -> String {
        format!("{}.sharekeys", id.as_str())
    }

    /// Create a new share with this engine instance as the only member.
    pub(crate) async fn create(
        id: &ShareId,
        storage_path: &StorePath,
        store: Arc<dyn PersistentStore>,
        identity: Contact,
    ) -> Result<Arc<Self>> {
        let meta_name = Self::meta_name(id);
        let existing = store.list_objects(storage_path, &meta_name).await?;
        if existing.iter().any(|o| o.name() == meta_name) {
            return Err(Error::AlreadyExists(format!(
                "share '{}' already exists",
                id
            )));
        }

        let share = Arc::new(Self {
            id: id.clone(),
            storage_path: storage_path.clone(),
            store,
            identity: identity.clone(),
            key: RwLock::new(SealKey::generate()),
            members: RwLock::new(vec![identity]),
        });
        share.persist().await?;
        debug!("created share '{}'", id);
        Ok(share)
    }

    /// Load an existing share from its persisted metadata.
    pub(crate) async fn load(
        id: &ShareId,
        storage_path: &StorePath,
        store: Arc<dyn PersistentStore>,
        identity: Contact,
    ) -> Result<Arc<Self>> {
        let meta_name = Self::meta_name(id);
        let existing = store.list_objects(storage_path, &meta_name).await?;
        if !existing.iter().any(|o| o.name() == meta_name) {
            return Err(Error::NotFound(format!("share '{}' does not exist", id)));
        }

        let mut stream = store.open_read(storage_path, &meta_name).await?;
        let bytes = read_all(stream.as_mut()).await?;
        stream.close().await?;

        let meta: ShareMetadata = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Serialization(format!("share metadata: {}", e)))?;

        let key_bytes = BASE64
            .decode(&meta.key)
            .map_err(|e| Error::Serialization(format!("share key: {}", e)))?;
        let key_bytes: [u8; KEY_LEN] = key_bytes
            .try_into()
            .map_err(|_| Error::Serialization("share key has wrong length".to_string()))?;

        if !meta
            .members
            .iter()
            .any(|m| m.fingerprint == identity.fingerprint)
        {
            return Err(Error::Permission(format!(
                "'{}' is not a member of share '{}'",
                identity.alias, id
            )));
        }

        Ok(Arc::new(Self {
            id: id.clone(),
            storage_path: storage_path.clone(),
            store,
            identity,
            key: RwLock::new(SealKey::from_bytes(key_bytes)),
            members: RwLock::new(meta.members),
        }))
    }

    fn require_membership(&self) -> Result<()> {
        let members = self.members.read().unwrap();
        if members
            .iter()
            .any(|m| m.fingerprint == self.identity.fingerprint)
        {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "'{}' is not a member of share '{}'",
                self.identity.alias, self.id
            )))
        }
    }

    async fn persist(&self) -> Result<()> {
        // Locks are taken one at a time, never nested.
        let key = BASE64.encode(self.key.read().unwrap().as_bytes());
        let members = self.members.read().unwrap().clone();
        let meta = ShareMetadata {
            id: self.id.as_str().to_string(),
            key,
            members,
        };
        let bytes = serde_json::to_vec(&meta)
            .map_err(|e| Error::Serialization(format!("share metadata: {}", e)))?;

        let meta_name = Self::meta_name(&self.id);
        let mut stream = self.store.open_write(&self.storage_path, &meta_name).await?;
        stream.write(&bytes).await?;
        stream.close().await?;
        Ok(())
    }
}

#[async_trait]
impl NetworkShare for MemoryShare {
    fn id(&self) -> &ShareId {
        &self.id
    }

    async fn add_member(&self, member: &Contact) -> Result<()> {
        self.require_membership()?;
        {
            let mut members = self.members.write().unwrap();
            if members.iter().any(|m| m.fingerprint == member.fingerprint) {
                return Err(Error::AlreadyExists(format!(
                    "'{}' is already a member of share '{}'",
                    member.alias, self.id
                )));
            }
            members.push(member.clone());
        }
        self.persist().await
    }

    async fn remove_member(&self, member: &Contact) -> Result<()> {
        self.require_membership()?;
        {
            let mut members = self.members.write().unwrap();
            let idx = members
                .iter()
                .position(|m| m.fingerprint == member.fingerprint)
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "'{}' is not a member of share '{}'",
                        member.alias, self.id
                    ))
                })?;
            members.remove(idx);
        }

        // Rotate the share key so the removed member cannot read anything
        // persisted from here on.
        *self.key.write().unwrap() = SealKey::generate();
        self.persist().await
    }

    async fn members(&self) -> Result<Vec<Contact>> {
        Ok(self.members.read().unwrap().clone())
    }

    async fn delete(&self) -> Result<()> {
        let meta_name = Self::meta_name(&self.id);
        self.store
            .delete_object(&self.storage_path, &meta_name)
            .await
    }

    async fn encrypt_stream(&self, sink: Box<dyn BlobWrite>) -> Result<Box<dyn BlobWrite>> {
        let key = self.key.read().unwrap().clone();
        Ok(Box::new(SealWriter {
            key,
            buf: Some(Vec::new()),
            inner: sink,
        }))
    }

    async fn decrypt_stream(&self, mut source: Box<dyn BlobRead>) -> Result<Box<dyn BlobRead>> {
        let sealed = read_all(source.as_mut()).await?;
        source.close().await?;

        let key = self.key.read().unwrap().clone();
        let plain = seal::open(&key, &sealed)?;
        Ok(Box::new(PlainReader {
            data: plain,
            pos: 0,
        }))
    }
}

/// Drain a stream to its end.
async fn read_all(stream: &mut dyn BlobRead) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    while let ReadOutcome::Data(n) = stream.read(&mut buf).await? {
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}

/// Buffers plaintext and seals it into the inner sink on close.
struct SealWriter {
    key: SealKey,
    buf: Option<Vec<u8>>,
    inner: Box<dyn BlobWrite>,
}

#[async_trait]
impl BlobWrite for SealWriter {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let buf = self
            .buf
            .as_mut()
            .ok_or_else(|| Error::State("write to closed stream".to_string()))?;
        buf.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        // Nothing is sealed until close; there is nothing to push down yet.
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(buf) = self.buf.take() {
            let sealed = seal::seal(&self.key, &buf)?;
            self.inner.write(&sealed).await?;
            self.inner.flush().await?;
            self.inner.close().await?;
        }
        Ok(())
    }
}

/// Serves already-decrypted bytes.
struct PlainReader {
    data: Vec<u8>,
    pos: usize,
}

#[async_trait]
impl BlobRead for PlainReader {
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

#[cfg(test)]
mod tests {
    use super::*;
    use sable_store::MemoryStore;

    fn identity() -> Contact {
        Contact::new("alice", "fp-alice")
    }

    fn setup() -> (ShareId, StorePath, Arc<MemoryStore>) {
        (
            ShareId::new("team-share").unwrap(),
            StorePath::parse("/black_data").unwrap(),
            Arc::new(MemoryStore::new()),
        )
    }

    async fn store_via_share(
        share: &dyn NetworkShare,
        store: &MemoryStore,
        path: &StorePath,
        name: &str,
        data: &[u8],
    ) {
        let sink = store.open_write(path, name).await.unwrap();
        let mut enc = share.encrypt_stream(sink).await.unwrap();
        enc.write(data).await.unwrap();
        enc.close().await.unwrap();
    }

    async fn retrieve_via_share(
        share: &dyn NetworkShare,
        store: &MemoryStore,
        path: &StorePath,
        name: &str,
    ) -> Result<Vec<u8>> {
        let source = store.open_read(path, name).await?;
        let mut dec = share.decrypt_stream(source).await?;
        read_all(dec.as_mut()).await
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (id, path, store) = setup();

        MemoryShare::create(&id, &path, store.clone(), identity())
            .await
            .unwrap();
        let share = MemoryShare::load(&id, &path, store.clone(), identity())
            .await
            .unwrap();
        assert_eq!(share.id().as_str(), "team-share");
    }

    #[tokio::test]
    async fn test_create_existing_fails_then_get_succeeds() {
        let (id, path, store) = setup();

        MemoryShare::create(&id, &path, store.clone(), identity())
            .await
            .unwrap();
        let second = MemoryShare::create(&id, &path, store.clone(), identity()).await;
        assert!(matches!(second, Err(Error::AlreadyExists(_))));

        let share = MemoryShare::load(&id, &path, store.clone(), identity()).await;
        assert!(share.is_ok());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (id, path, store) = setup();
        let result = MemoryShare::load(&id, &path, store, identity()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_non_member_cannot_load() {
        let (id, path, store) = setup();
        MemoryShare::create(&id, &path, store.clone(), identity())
            .await
            .unwrap();

        let outsider = Contact::new("mallory", "fp-mallory");
        let result = MemoryShare::load(&id, &path, store, outsider).await;
        assert!(matches!(result, Err(Error::Permission(_))));
    }

    #[tokio::test]
    async fn test_payload_roundtrip_and_ciphertext_at_rest() {
        let (id, path, store) = setup();
        let share = MemoryShare::create(&id, &path, store.clone(), identity())
            .await
            .unwrap();

        let data = b"hello world";
        store_via_share(share.as_ref(), &store, &path, "greeting.txt", data).await;

        // What landed in the store is ciphertext, not the plaintext.
        let at_rest = store.raw_bytes(&path, "greeting.txt").unwrap();
        assert!(!at_rest.windows(data.len()).any(|w| w == *data));

        let retrieved = retrieve_via_share(share.as_ref(), &store, &path, "greeting.txt")
            .await
            .unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_membership_changes() {
        let (id, path, store) = setup();
        let share = MemoryShare::create(&id, &path, store.clone(), identity())
            .await
            .unwrap();

        let bob = Contact::new("bob", "fp-bob");
        share.add_member(&bob).await.unwrap();
        assert!(matches!(
            share.add_member(&bob).await,
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(share.members().await.unwrap().len(), 2);

        share.remove_member(&bob).await.unwrap();
        assert!(matches!(
            share.remove_member(&bob).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_member_rotates_key() {
        let (id, path, store) = setup();
        let share = MemoryShare::create(&id, &path, store.clone(), identity())
            .await
            .unwrap();
        let bob = Contact::new("bob", "fp-bob");
        share.add_member(&bob).await.unwrap();

        store_via_share(share.as_ref(), &store, &path, "old.bin", b"pre-rotation").await;
        share.remove_member(&bob).await.unwrap();

        // Data sealed before the rotation no longer authenticates.
        let result = retrieve_via_share(share.as_ref(), &store, &path, "old.bin").await;
        assert!(matches!(result, Err(Error::Permission(_))));

        // New writes use the rotated key.
        store_via_share(share.as_ref(), &store, &path, "new.bin", b"post-rotation").await;
        let retrieved = retrieve_via_share(share.as_ref(), &store, &path, "new.bin")
            .await
            .unwrap();
        assert_eq!(retrieved, b"post-rotation");
    }

    #[tokio::test]
    async fn test_delete_removes_metadata_only() {
        let (id, path, store) = setup();
        let share = MemoryShare::create(&id, &path, store.clone(), identity())
            .await
            .unwrap();
        store_via_share(share.as_ref(), &store, &path, "payload.bin", b"data").await;

        share.delete().await.unwrap();

        let result = MemoryShare::load(&id, &path, store.clone(), identity()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        // The payload object is the application's to clean up.
        assert!(store.raw_bytes(&path, "payload.bin").is_some());
    }
}
