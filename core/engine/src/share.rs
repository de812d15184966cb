//! Network shares.
//!
//! A network share is a logical group of engine principals who share
//! access to a set of persisted objects. The engine owns the share keys
//! and wraps/unwraps them per member; the application only ever sees the
//! encrypt/decrypt stream wrappers and the ciphertext they produce.

use async_trait::async_trait;

use crate::contact::Contact;
use sable_common::{Result, ShareId};
use sable_store::{BlobRead, BlobWrite};

/// Handle to a network share.
#[async_trait]
pub trait NetworkShare: Send + Sync {
    /// The share identifier.
    fn id(&self) -> &ShareId;

    /// Add a member. The new member gains access to the share's persisted
    /// objects.
    ///
    /// # Errors
    /// - `Permission` if this engine instance is not a current member
    /// - `AlreadyExists` if the contact is already a member
    async fn add_member(&self, member: &Contact) -> Result<()>;

    /// Remove a member. The share key is rotated so the removed member
    /// cannot read objects persisted afterwards.
    ///
    /// # Errors
    /// - `Permission` if this engine instance is not a current member
    /// - `NotFound` if the contact is not a member
    async fn remove_member(&self, member: &Contact) -> Result<()>;

    /// The current members of the share.
    async fn members(&self) -> Result<Vec<Contact>>;

    /// Delete the share's keys and metadata from the backing store.
    ///
    /// The application owns deleting the payload objects themselves; this
    /// only removes access to them.
    async fn delete(&self) -> Result<()>;

    /// Wrap a store-vended sink so that everything written through the
    /// returned stream lands in the sink as ciphertext.
    async fn encrypt_stream(&self, sink: Box<dyn BlobWrite>) -> Result<Box<dyn BlobWrite>>;

    /// Wrap a store-vended source so that ciphertext read from it is
    /// returned as plaintext.
    ///
    /// # Errors
    /// - `Permission` if the data cannot be authenticated with the current
    ///   share key (e.g., after a key rotation)
    async fn decrypt_stream(&self, source: Box<dyn BlobRead>) -> Result<Box<dyn BlobRead>>;
}
