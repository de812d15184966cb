//! Lifecycle driver for Sable.
//!
//! This module takes an engine from cold start to a usable state and keeps
//! it there:
//! - Initialize, provision-if-unkeyed, unlock, subscribe
//! - A cancellable background task that refreshes the engine's cached
//!   network data on a fixed interval, with an explicit readiness signal
//!   set by the first successful refresh
//! - Find-or-create-and-mount for volumes, get-or-create fallback for
//!   network shares

pub mod driver;
pub mod refresh;

pub use driver::{DriverConfig, LifecycleDriver, Startup, VolumeSpec};
pub use refresh::{spawn_refresh, RefreshHandle};
