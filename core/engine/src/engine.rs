//! The engine trait.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::contact::Contact;
use crate::message::Message;
use crate::provision::ProvisioningRequest;
use crate::session::SecureSession;
use crate::share::NetworkShare;
use crate::state::ManagementState;
use crate::volume::{Volume, VolumeKind};
use sable_common::{Credential, Result, ShareId, StorePath};
use sable_store::PersistentStore;

/// The external secure-identity/secure-storage/secure-messaging engine.
///
/// Exactly one handle exists per process. The engine is internally
/// thread-safe: concurrent calls from multiple tasks require no external
/// locking. Applications receive the handle as an `Arc<dyn Engine>`
/// injected into the components that need it.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Initialize the engine with its private keystore directory.
    ///
    /// # Postconditions
    /// - Returns the resulting management state synchronously: `Unkeyed`
    ///   when no key pair exists yet, `Initialized` when ready for unlock,
    ///   `Error` on an unrecoverable fault
    async fn initialize(&self, keystore: &Path) -> Result<ManagementState>;

    /// The current management state.
    fn state(&self) -> ManagementState;

    /// Generate a key pair and certificate signing request for out-of-band
    /// provisioning. Valid only in the `Unkeyed` state; the process must
    /// be restarted after provisioning completes.
    ///
    /// # Errors
    /// - `State` unless the engine is `Unkeyed`
    async fn generate_provisioning(
        &self,
        identity: &str,
        credential: &Credential,
        addresses: &[String],
    ) -> Result<ProvisioningRequest>;

    /// Unlock the engine's private key material.
    ///
    /// # Errors
    /// - `Credential` on a wrong secret
    /// - `State` unless the engine is `Initialized`
    /// - `AdminLocked` if an administrative reset is required first
    async fn unlock(&self, credential: &Credential) -> Result<()>;

    /// Whether the private key material is currently usable.
    fn is_unlocked(&self) -> bool;

    /// Begin live update delivery from the engine's network. Idempotent.
    async fn subscribe(&self) -> Result<()>;

    /// Whether the engine is subscribed for live updates.
    fn is_subscribed(&self) -> bool;

    /// Refresh the engine's locally cached network and identity data.
    ///
    /// Must succeed at least once after startup before volume and share
    /// operations are guaranteed usable.
    ///
    /// # Errors
    /// - `State` before `initialize`
    /// - `Io` on network failure (retryable)
    async fn refresh(&self) -> Result<()>;

    /// All contacts known to this engine instance.
    async fn contacts(&self) -> Result<Vec<Contact>>;

    /// Look up a contact by alias.
    ///
    /// # Errors
    /// - `NotFound` if no contact has the alias
    async fn contact_by_alias(&self, alias: &str) -> Result<Contact>;

    /// Send a message of the given kind to a contact.
    async fn send_message(&self, to: &Contact, kind: &str, body: Vec<u8>) -> Result<()>;

    /// Drain pending inbound messages of the given kind.
    async fn fetch_messages(&self, kind: &str) -> Result<Vec<Message>>;

    /// Establish a secure session with a peer, waiting at most `timeout`.
    ///
    /// # Errors
    /// - `Timeout` if the peer does not accept in time
    async fn connect_session(
        &self,
        peer: &Contact,
        timeout: Duration,
    ) -> Result<Box<dyn SecureSession>>;

    /// Accept the next inbound secure session. Blocks until a peer
    /// connects.
    async fn accept_session(&self) -> Result<Box<dyn SecureSession>>;

    /// Volumes this engine instance knows about.
    async fn list_volumes(&self) -> Result<Vec<Arc<dyn Volume>>>;

    /// Create a new volume.
    ///
    /// # Errors
    /// - `AlreadyExists` if a volume with the label already exists
    /// - `State` if the engine is locked
    async fn create_volume(
        &self,
        kind: VolumeKind,
        backing: &Path,
        label: &str,
        size: u64,
    ) -> Result<Arc<dyn Volume>>;

    /// Remove a volume by label.
    ///
    /// # Errors
    /// - `NotFound` if no volume has the label
    async fn remove_volume(&self, label: &str) -> Result<()>;

    /// Open an existing network share, using `store` for all backing I/O.
    ///
    /// # Errors
    /// - `NotFound` if no share with the id exists in the store
    async fn get_share(
        &self,
        id: &ShareId,
        storage_path: &StorePath,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Arc<dyn NetworkShare>>;

    /// Create a new network share, persisting its keys and metadata
    /// through `store`.
    ///
    /// # Errors
    /// - `AlreadyExists` if a share with the id already exists in the store
    async fn create_share(
        &self,
        id: &ShareId,
        storage_path: &StorePath,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Arc<dyn NetworkShare>>;
}
