//! In-process message and session routing.
//!
//! A `MessageHub` stands in for the engine's network: engines built over
//! the same hub can exchange messages and establish sessions with each
//! other, which is how the echo demo runs a client and a server in one
//! process.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::contact::Contact;
use crate::message::Message;
use sable_common::{Error, Result};

/// Poll interval for waiters inside the hub.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One end of an established session, ready to wrap in a `MemorySession`.
pub(crate) struct SessionLink {
    pub peer: Contact,
    pub tx: mpsc::UnboundedSender<Vec<u8>>,
    pub rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

#[derive(Default)]
struct HubState {
    /// Pending messages per recipient alias.
    mailboxes: HashMap<String, VecDeque<Message>>,
    /// Inbound session ends awaiting accept, per listener alias.
    inbound: HashMap<String, VecDeque<SessionLink>>,
    /// Aliases that have started accepting sessions.
    listening: HashSet<String>,
}

/// Shared routing fabric between in-memory engines.
#[derive(Default)]
pub struct MessageHub {
    state: Mutex<HubState>,
}

impl MessageHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message into the recipient's mailbox.
    pub(crate) fn deliver(&self, to_alias: &str, message: Message) {
        let mut state = self.state.lock().unwrap();
        state
            .mailboxes
            .entry(to_alias.to_string())
            .or_default()
            .push_back(message);
    }

    /// Drain pending messages of one kind for a recipient.
    pub(crate) fn drain(&self, alias: &str, kind: &str) -> Vec<Message> {
        let mut state = self.state.lock().unwrap();
        let Some(mailbox) = state.mailboxes.get_mut(alias) else {
            return Vec::new();
        };

        let mut matched = Vec::new();
        let mut rest = VecDeque::new();
        while let Some(msg) = mailbox.pop_front() {
            if msg.kind == kind {
                matched.push(msg);
            } else {
                rest.push_back(msg);
            }
        }
        *mailbox = rest;
        matched
    }

    /// Establish a session from `from` to the listener at `to.alias`,
    /// waiting at most `timeout` for the listener to appear.
    pub(crate) async fn connect(
        &self,
        from: Contact,
        to: Contact,
        timeout: Duration,
    ) -> Result<SessionLink> {
        tokio::time::timeout(timeout, self.wait_listening(&to.alias))
            .await
            .map_err(|_| Error::Timeout(format!("no session listener for '{}'", to.alias)))?;

        let (c2s_tx, c2s_rx) = mpsc::unbounded_channel();
        let (s2c_tx, s2c_rx) = mpsc::unbounded_channel();

        let server_end = SessionLink {
            peer: from,
            tx: s2c_tx,
            rx: c2s_rx,
        };
        let client_end = SessionLink {
            peer: to.clone(),
            tx: c2s_tx,
            rx: s2c_rx,
        };

        let mut state = self.state.lock().unwrap();
        state
            .inbound
            .entry(to.alias.clone())
            .or_default()
            .push_back(server_end);

        Ok(client_end)
    }

    /// Accept the next inbound session for `alias`, blocking until one
    /// arrives.
    pub(crate) async fn accept(&self, alias: &str) -> SessionLink {
        {
            let mut state = self.state.lock().unwrap();
            state.listening.insert(alias.to_string());
        }

        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(queue) = state.inbound.get_mut(alias) {
                    if let Some(link) = queue.pop_front() {
                        return link;
                    }
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_listening(&self, alias: &str) {
        loop {
            {
                let state = self.state.lock().unwrap();
                if state.listening.contains(alias) {
                    return;
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
