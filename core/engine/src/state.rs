//! Engine lifecycle states.

use std::fmt;

/// Management state reported by the engine.
///
/// Transitions are driven only by the application calling `initialize` and
/// the key-generation operations; the engine reports the resulting state
/// synchronously. `Error` is terminal for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementState {
    /// The engine has not been initialized yet.
    Uninitialized,
    /// The engine has no public/private key pair; provisioning is required.
    Unkeyed,
    /// The engine is initialized and keyed; unlock is possible.
    Initialized,
    /// The engine is in an unrecoverable state.
    Error,
}

impl fmt::Display for ManagementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ManagementState::Uninitialized => "uninitialized",
            ManagementState::Unkeyed => "unkeyed",
            ManagementState::Initialized => "initialized",
            ManagementState::Error => "error",
        };
        write!(f, "{}", s)
    }
}
