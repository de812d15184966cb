//! Engine contacts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A peer principal known to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    /// Human-readable alias, unique within the contact list.
    pub alias: String,
    /// Stable key fingerprint identifying the principal.
    pub fingerprint: String,
}

impl Contact {
    /// Create a contact from an alias and fingerprint.
    pub fn new(alias: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.alias)
    }
}
