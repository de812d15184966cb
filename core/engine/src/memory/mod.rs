//! In-memory reference engine.
//!
//! `MemoryEngine` implements the full engine contract without any real
//! cryptographic identity, network, or container format behind it. It is
//! the stand-in used by tests and the demo binary; engines built over a
//! shared [`MessageHub`] can message each other in-process.

mod hub;
mod seal;
mod session;
mod share;
mod volume;

pub use hub::MessageHub;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use self::session::MemorySession;
use self::share::MemoryShare;
use self::volume::MemoryVolume;
use crate::contact::Contact;
use crate::engine::Engine;
use crate::message::Message;
use crate::provision::ProvisioningRequest;
use crate::session::SecureSession;
use crate::share::NetworkShare;
use crate::state::ManagementState;
use crate::volume::{Volume, VolumeKind};
use sable_common::{Credential, Error, Result, ShareId, StorePath};
use sable_store::PersistentStore;

/// Builder for [`MemoryEngine`].
pub struct MemoryEngineBuilder {
    alias: String,
    credential: Vec<u8>,
    contacts: Vec<Contact>,
    start_unkeyed: bool,
    admin_locked: bool,
    poisoned: bool,
    fail_refreshes: u32,
    hub: Option<Arc<MessageHub>>,
}

impl MemoryEngineBuilder {
    /// The engine's own alias (defaults to "local").
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// The credential `unlock` must be called with.
    pub fn credential(mut self, secret: &str) -> Self {
        self.credential = secret.as_bytes().to_vec();
        self
    }

    /// The credential `unlock` must be called with, as raw bytes.
    pub fn credential_bytes(mut self, secret: &[u8]) -> Self {
        self.credential = secret.to_vec();
        self
    }

    /// Add a known contact.
    pub fn contact(mut self, contact: Contact) -> Self {
        self.contacts.push(contact);
        self
    }

    /// Start without a key pair; `initialize` reports `Unkeyed`.
    pub fn unkeyed(mut self) -> Self {
        self.start_unkeyed = true;
        self
    }

    /// Require an administrative reset before unlock can succeed.
    pub fn admin_locked(mut self) -> Self {
        self.admin_locked = true;
        self
    }

    /// Report the terminal `Error` state from `initialize`.
    pub fn poisoned(mut self) -> Self {
        self.poisoned = true;
        self
    }

    /// Fail the first `n` refresh attempts with an I/O error.
    pub fn fail_refreshes(mut self, n: u32) -> Self {
        self.fail_refreshes = n;
        self
    }

    /// Route messages and sessions through a shared hub.
    pub fn hub(mut self, hub: Arc<MessageHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Build the engine.
    pub fn build(self) -> MemoryEngine {
        let identity = Contact::new(self.alias, Uuid::new_v4().to_string());
        MemoryEngine {
            identity,
            expected_credential: RwLock::new(self.credential),
            start_unkeyed: self.start_unkeyed,
            admin_locked: self.admin_locked,
            poisoned: self.poisoned,
            state: RwLock::new(ManagementState::Uninitialized),
            unlocked: Arc::new(AtomicBool::new(false)),
            subscribed: AtomicBool::new(false),
            contacts: RwLock::new(self.contacts),
            hub: self.hub.unwrap_or_default(),
            volumes: RwLock::new(HashMap::new()),
            refresh_failures: AtomicU32::new(self.fail_refreshes),
            refresh_count: AtomicU64::new(0),
            keystore: RwLock::new(None),
        }
    }
}

/// In-memory engine implementation.
pub struct MemoryEngine {
    identity: Contact,
    expected_credential: RwLock<Vec<u8>>,
    start_unkeyed: bool,
    admin_locked: bool,
    poisoned: bool,
    state: RwLock<ManagementState>,
    unlocked: Arc<AtomicBool>,
    subscribed: AtomicBool,
    contacts: RwLock<Vec<Contact>>,
    hub: Arc<MessageHub>,
    volumes: RwLock<HashMap<String, Arc<MemoryVolume>>>,
    refresh_failures: AtomicU32,
    refresh_count: AtomicU64,
    keystore: RwLock<Option<PathBuf>>,
}

impl MemoryEngine {
    /// Start building an engine.
    pub fn builder() -> MemoryEngineBuilder {
        MemoryEngineBuilder {
            alias: "local".to_string(),
            credential: Vec::new(),
            contacts: Vec::new(),
            start_unkeyed: false,
            admin_locked: false,
            poisoned: false,
            fail_refreshes: 0,
            hub: None,
        }
    }

    /// This engine's own identity.
    pub fn identity(&self) -> &Contact {
        &self.identity
    }

    /// Add a contact after construction. On a real deployment contacts
    /// arrive through refresh; tests and demos wire them up directly.
    pub fn add_contact(&self, contact: Contact) {
        self.contacts.write().unwrap().push(contact);
    }

    /// How many refresh attempts have succeeded.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    fn require_initialized(&self) -> Result<()> {
        match *self.state.read().unwrap() {
            ManagementState::Initialized => Ok(()),
            other => Err(Error::State(format!(
                "operation requires the initialized state, engine is {}",
                other
            ))),
        }
    }

    fn require_unlocked(&self) -> Result<()> {
        self.require_initialized()?;
        if self.unlocked.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::State("unlock required".to_string()))
        }
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn initialize(&self, keystore: &Path) -> Result<ManagementState> {
        *self.keystore.write().unwrap() = Some(keystore.to_path_buf());

        let next = if self.poisoned {
            ManagementState::Error
        } else if self.start_unkeyed {
            ManagementState::Unkeyed
        } else {
            ManagementState::Initialized
        };
        *self.state.write().unwrap() = next;
        debug!("engine initialized: {}", next);
        Ok(next)
    }

    fn state(&self) -> ManagementState {
        *self.state.read().unwrap()
    }

    async fn generate_provisioning(
        &self,
        identity: &str,
        credential: &Credential,
        _addresses: &[String],
    ) -> Result<ProvisioningRequest> {
        if self.state() != ManagementState::Unkeyed {
            return Err(Error::State(
                "provisioning is only valid in the unkeyed state".to_string(),
            ));
        }

        // The generated keystore is protected with the supplied credential.
        *self.expected_credential.write().unwrap() = credential.as_bytes().to_vec();

        let csr = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            seal::random_bytes(96),
        );
        debug!("generated provisioning request for '{}'", identity);
        Ok(ProvisioningRequest::new(csr, Vec::new()))
    }

    async fn unlock(&self, credential: &Credential) -> Result<()> {
        self.require_initialized()?;
        if self.admin_locked {
            return Err(Error::AdminLocked(
                "an administrative password reset is required".to_string(),
            ));
        }
        if credential.as_bytes() != self.expected_credential.read().unwrap().as_slice() {
            return Err(Error::Credential("wrong unlock secret".to_string()));
        }
        self.unlocked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }

    async fn subscribe(&self) -> Result<()> {
        self.require_initialized()?;
        self.subscribed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    async fn refresh(&self) -> Result<()> {
        if self.state() == ManagementState::Uninitialized {
            return Err(Error::State("refresh before initialize".to_string()));
        }

        let remaining = self.refresh_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.refresh_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "refresh endpoint unreachable",
            )));
        }

        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn contacts(&self) -> Result<Vec<Contact>> {
        Ok(self.contacts.read().unwrap().clone())
    }

    async fn contact_by_alias(&self, alias: &str) -> Result<Contact> {
        self.contacts
            .read()
            .unwrap()
            .iter()
            .find(|c| c.alias == alias)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no contact with alias '{}'", alias)))
    }

    async fn send_message(&self, to: &Contact, kind: &str, body: Vec<u8>) -> Result<()> {
        self.require_unlocked()?;
        self.hub.deliver(
            &to.alias,
            Message {
                sender: self.identity.clone(),
                kind: kind.to_string(),
                body,
            },
        );
        Ok(())
    }

    async fn fetch_messages(&self, kind: &str) -> Result<Vec<Message>> {
        if !self.is_subscribed() {
            return Err(Error::State("subscribe required".to_string()));
        }
        Ok(self.hub.drain(&self.identity.alias, kind))
    }

    async fn connect_session(
        &self,
        peer: &Contact,
        timeout: Duration,
    ) -> Result<Box<dyn SecureSession>> {
        self.require_unlocked()?;
        let link = self
            .hub
            .connect(self.identity.clone(), peer.clone(), timeout)
            .await?;
        Ok(Box::new(MemorySession::new(link)))
    }

    async fn accept_session(&self) -> Result<Box<dyn SecureSession>> {
        self.require_unlocked()?;
        let link = self.hub.accept(&self.identity.alias).await;
        Ok(Box::new(MemorySession::new(link)))
    }

    async fn list_volumes(&self) -> Result<Vec<Arc<dyn Volume>>> {
        self.require_initialized()?;
        let volumes = self.volumes.read().unwrap();
        let mut all: Vec<Arc<dyn Volume>> = volumes
            .values()
            .map(|v| v.clone() as Arc<dyn Volume>)
            .collect();
        all.sort_by(|a, b| a.label().cmp(b.label()));
        Ok(all)
    }

    async fn create_volume(
        &self,
        kind: VolumeKind,
        backing: &Path,
        label: &str,
        size: u64,
    ) -> Result<Arc<dyn Volume>> {
        self.require_initialized()?;
        let mut volumes = self.volumes.write().unwrap();
        if volumes.contains_key(label) {
            return Err(Error::AlreadyExists(format!(
                "volume '{}' already exists",
                label
            )));
        }

        let volume = Arc::new(MemoryVolume::new(
            kind,
            backing.to_path_buf(),
            label.to_string(),
            size,
            self.unlocked.clone(),
        ));
        volumes.insert(label.to_string(), volume.clone());
        debug!("created volume '{}' ({} bytes)", label, size);
        Ok(volume)
    }

    async fn remove_volume(&self, label: &str) -> Result<()> {
        self.require_initialized()?;
        self.volumes
            .write()
            .unwrap()
            .remove(label)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("no volume with label '{}'", label)))
    }

    async fn get_share(
        &self,
        id: &ShareId,
        storage_path: &StorePath,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Arc<dyn NetworkShare>> {
        self.require_unlocked()?;
        let share = MemoryShare::load(id, storage_path, store, self.identity.clone()).await?;
        Ok(share as Arc<dyn NetworkShare>)
    }

    async fn create_share(
        &self,
        id: &ShareId,
        storage_path: &StorePath,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Arc<dyn NetworkShare>> {
        self.require_unlocked()?;
        let share = MemoryShare::create(id, storage_path, store, self.identity.clone()).await?;
        Ok(share as Arc<dyn NetworkShare>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_store::MemoryStore;

    const KEYSTORE: &str = ".SaifeStore";

    async fn ready_engine() -> MemoryEngine {
        let engine = MemoryEngine::builder().credential("mysecret").build();
        engine.initialize(Path::new(KEYSTORE)).await.unwrap();
        engine
            .unlock(&Credential::from_str("mysecret"))
            .await
            .unwrap();
        engine.subscribe().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_unlock_before_initialize_is_state_error() {
        let engine = MemoryEngine::builder().credential("pw").build();
        let result = engine.unlock(&Credential::from_str("pw")).await;
        assert!(matches!(result, Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_wrong_credential() {
        let engine = MemoryEngine::builder().credential("right").build();
        engine.initialize(Path::new(KEYSTORE)).await.unwrap();

        let result = engine.unlock(&Credential::from_str("wrong")).await;
        assert!(matches!(result, Err(Error::Credential(_))));
        assert!(!engine.is_unlocked());
    }

    #[tokio::test]
    async fn test_admin_locked() {
        let engine = MemoryEngine::builder()
            .credential("pw")
            .admin_locked()
            .build();
        engine.initialize(Path::new(KEYSTORE)).await.unwrap();

        let result = engine.unlock(&Credential::from_str("pw")).await;
        assert!(matches!(result, Err(Error::AdminLocked(_))));
    }

    #[tokio::test]
    async fn test_unkeyed_provisioning_flow() {
        let engine = MemoryEngine::builder().unkeyed().build();
        let state = engine.initialize(Path::new(KEYSTORE)).await.unwrap();
        assert_eq!(state, ManagementState::Unkeyed);

        let request = engine
            .generate_provisioning("EchoDemo", &Credential::from_str("pw"), &[])
            .await
            .unwrap();
        assert!(!request.csr.is_empty());

        // The process restarts after provisioning; until then the engine
        // stays unkeyed and unlock is a state error.
        let result = engine.unlock(&Credential::from_str("pw")).await;
        assert!(matches!(result, Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_provisioning_requires_unkeyed() {
        let engine = MemoryEngine::builder().build();
        engine.initialize(Path::new(KEYSTORE)).await.unwrap();

        let result = engine
            .generate_provisioning("EchoDemo", &Credential::from_str("pw"), &[])
            .await;
        assert!(matches!(result, Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_poisoned_engine_reports_error_state() {
        let engine = MemoryEngine::builder().poisoned().build();
        let state = engine.initialize(Path::new(KEYSTORE)).await.unwrap();
        assert_eq!(state, ManagementState::Error);
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let engine = ready_engine().await;
        engine.subscribe().await.unwrap();
        engine.subscribe().await.unwrap();
        assert!(engine.is_subscribed());
    }

    #[tokio::test]
    async fn test_refresh_failures_then_success() {
        let engine = MemoryEngine::builder().fail_refreshes(2).build();
        engine.initialize(Path::new(KEYSTORE)).await.unwrap();

        assert!(matches!(engine.refresh().await, Err(Error::Io(_))));
        assert!(matches!(engine.refresh().await, Err(Error::Io(_))));
        engine.refresh().await.unwrap();
        assert_eq!(engine.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_before_initialize() {
        let engine = MemoryEngine::builder().build();
        assert!(matches!(engine.refresh().await, Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_unknown_contact_is_not_found() {
        let engine = ready_engine().await;
        let result = engine.contact_by_alias("nobody").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_volume_label() {
        let engine = ready_engine().await;
        let backing = Path::new("black_data.bin");

        engine
            .create_volume(VolumeKind::Permanent, backing, "vol", 1024)
            .await
            .unwrap();
        let result = engine
            .create_volume(VolumeKind::Permanent, backing, "vol", 1024)
            .await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_remove_missing_volume() {
        let engine = ready_engine().await;
        let result = engine.remove_volume("ghost").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_share_requires_unlock() {
        let engine = MemoryEngine::builder().credential("pw").build();
        engine.initialize(Path::new(KEYSTORE)).await.unwrap();

        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let id = ShareId::new("share").unwrap();
        let result = engine
            .create_share(&id, &StorePath::root(), store)
            .await;
        assert!(matches!(result, Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_messaging_between_engines() {
        let hub = Arc::new(MessageHub::new());

        let alice = MemoryEngine::builder()
            .alias("alice")
            .credential("pw")
            .hub(hub.clone())
            .build();
        let bob = MemoryEngine::builder()
            .alias("bob")
            .credential("pw")
            .hub(hub)
            .build();

        for engine in [&alice, &bob] {
            engine.initialize(Path::new(KEYSTORE)).await.unwrap();
            engine.unlock(&Credential::from_str("pw")).await.unwrap();
            engine.subscribe().await.unwrap();
        }

        alice
            .send_message(bob.identity(), "app.echo", b"hi bob".to_vec())
            .await
            .unwrap();

        let inbound = bob.fetch_messages("app.echo").await.unwrap();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].sender.alias, "alice");
        assert_eq!(inbound[0].body, b"hi bob");

        // Drained; a second fetch is empty.
        assert!(bob.fetch_messages("app.echo").await.unwrap().is_empty());
    }
}
