//! Persistent store abstraction for Sable.
//!
//! This module provides the byte-stream adapters and the store facade the
//! engine calls back into when persisting encrypted objects on
//! application-chosen backing media (local filesystem, in-memory, etc.).
//!
//! # Design Principles
//! - Byte fidelity: the store never transforms, truncates, or reorders the
//!   bytes it is handed; everything crossing this boundary is ciphertext
//!   produced and consumed by the engine
//! - Thread safety: the engine may call into a store from its own tasks at
//!   arbitrary times relative to the application's threads
//! - Explicit failure: an unusable backing medium is reported when a stream
//!   is opened, never silently swallowed afterwards

pub mod local;
pub mod memory;
pub mod store;
pub mod stream;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use store::{PersistentStore, StoredObject};
pub use stream::{BlobRead, BlobWrite, FileReader, FileWriter, ReadOutcome};
