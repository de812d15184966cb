//! In-memory secure session.

use async_trait::async_trait;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use super::hub::SessionLink;
use crate::contact::Contact;
use crate::session::SecureSession;
use sable_common::{Error, Result};

/// Session over a pair of in-process channels.
pub struct MemorySession {
    peer: Contact,
    tx: StdMutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    /// Carryover when a delivery exceeds the caller's max_len.
    pending: Mutex<Vec<u8>>,
}

impl MemorySession {
    pub(crate) fn new(link: SessionLink) -> Self {
        Self {
            peer: link.peer,
            tx: StdMutex::new(Some(link.tx)),
            rx: Mutex::new(link.rx),
            pending: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SecureSession for MemorySession {
    fn peer(&self) -> &Contact {
        &self.peer
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        let guard = self.tx.lock().unwrap();
        let tx = guard
            .as_ref()
            .ok_or_else(|| Error::State("session is closed".to_string()))?;
        tx.send(data.to_vec()).map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "session closed by peer",
            ))
        })
    }

    async fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        {
            let guard = self.tx.lock().unwrap();
            if guard.is_none() {
                return Err(Error::State("session is closed".to_string()));
            }
        }

        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            let n = pending.len().min(max_len);
            let out = pending.drain(..n).collect();
            return Ok(out);
        }

        let mut rx = self.rx.lock().await;
        let received = tokio::time::timeout(timeout, rx.recv())
            .await
            .map_err(|_| Error::Timeout(format!("no session data within {:?}", timeout)))?;

        let mut data = received.ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "session closed by peer",
            ))
        })?;

        if data.len() > max_len {
            *pending = data.split_off(max_len);
        }
        Ok(data)
    }

    async fn close(&self) -> Result<()> {
        self.tx.lock().unwrap().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::hub::MessageHub;
    use std::sync::Arc;

    async fn session_pair() -> (MemorySession, MemorySession) {
        let hub = Arc::new(MessageHub::new());
        let hub2 = hub.clone();
        let server = tokio::spawn(async move { hub2.accept("server").await });

        let client_link = hub
            .connect(
                Contact::new("client", "fp-client"),
                Contact::new("server", "fp-server"),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        let server_link = server.await.unwrap();

        (
            MemorySession::new(client_link),
            MemorySession::new(server_link),
        )
    }

    #[tokio::test]
    async fn test_write_read_echo() {
        let (client, server) = session_pair().await;

        client.write(b"ping").await.unwrap();
        let received = server.read(1024, Duration::from_secs(1)).await.unwrap();
        assert_eq!(received, b"ping");

        server.write(&received).await.unwrap();
        let echoed = client.read(1024, Duration::from_secs(1)).await.unwrap();
        assert_eq!(echoed, b"ping");
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (client, _server) = session_pair().await;

        let result = client.read(1024, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_oversized_delivery_carries_over() {
        let (client, server) = session_pair().await;

        client.write(b"abcdefgh").await.unwrap();
        let first = server.read(5, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first, b"abcde");
        let second = server.read(5, Duration::from_secs(1)).await.unwrap();
        assert_eq!(second, b"fgh");
    }

    #[tokio::test]
    async fn test_use_after_close() {
        let (client, server) = session_pair().await;

        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(matches!(client.write(b"late").await, Err(Error::State(_))));

        // The peer sees the closed channel as an I/O failure.
        let result = server.read(1024, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
