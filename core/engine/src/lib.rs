//! Engine boundary contract for Sable.
//!
//! This module defines the contract an application codes against when
//! driving an external secure-identity/secure-storage/secure-messaging
//! engine:
//! - Lifecycle states and the operations that move between them
//! - Contacts, messaging, and secure sessions
//! - Encrypted volumes with mount-point slots
//! - Network shares backed by an application-supplied persistent store
//!
//! The engine itself is an opaque collaborator: key management, encryption,
//! share key wrapping, and the volume format all live behind these traits.
//! `MemoryEngine` is an in-memory stand-in used by tests and demos; it is
//! not a compatible implementation of any vendor engine.

pub mod contact;
pub mod engine;
pub mod memory;
pub mod message;
pub mod provision;
pub mod session;
pub mod share;
pub mod state;
pub mod volume;

pub use contact::Contact;
pub use engine::Engine;
pub use memory::{MemoryEngine, MemoryEngineBuilder, MessageHub};
pub use message::Message;
pub use provision::ProvisioningRequest;
pub use session::SecureSession;
pub use share::NetworkShare;
pub use state::ManagementState;
pub use volume::{FileInfo, MountPoint, Volume, VolumeKind};
