//! Secure point-to-point sessions.

use async_trait::async_trait;
use std::time::Duration;

use crate::contact::Contact;
use sable_common::Result;

/// An established secure session with a peer.
///
/// Reads block up to a caller-specified timeout and fail with a `Timeout`
/// kind on expiry. The session transport and its framing live inside the
/// engine; only already-decrypted payload bytes cross this interface.
#[async_trait]
pub trait SecureSession: Send + Sync {
    /// The peer on the other end of this session.
    fn peer(&self) -> &Contact;

    /// Send payload bytes to the peer.
    ///
    /// # Errors
    /// - `State` if the session has been closed locally
    /// - `Io` if the peer has closed the session
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Receive up to `max_len` payload bytes, waiting at most `timeout`.
    ///
    /// # Errors
    /// - `Timeout` if no data arrives within `timeout`
    /// - `State` if the session has been closed locally
    /// - `Io` if the peer has closed the session
    async fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Close the session. Idempotent.
    async fn close(&self) -> Result<()>;
}
