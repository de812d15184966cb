//! Lifecycle driver.
//!
//! Drives the engine through its startup state machine: initialize, key
//! provisioning when unkeyed, unlock, subscribe, background refresh, and
//! on to volume and share acquisition.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::refresh::{spawn_refresh, RefreshHandle};
use sable_common::{Credential, Error, Result, ShareId, StorePath};
use sable_engine::{
    Engine, ManagementState, MountPoint, NetworkShare, Volume, VolumeKind,
};
use sable_store::PersistentStore;

/// Default private keystore directory for engine-internal data.
pub const DEFAULT_KEYSTORE: &str = ".SaifeStore";

/// Filename of the provisioning artifact written under the keystore.
pub const PROVISION_FILENAME: &str = "newkey.smcsr";

/// Default interval between refresh attempts.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Default bound on waiting for the first successful refresh.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the lifecycle driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Directory for engine-internal persisted key material.
    pub keystore: PathBuf,
    /// Identity label used in the certificate signing request.
    pub identity: String,
    /// Application capabilities appended to the provisioning request.
    pub capabilities: Vec<String>,
    /// Logical addresses associated with this end point.
    pub addresses: Vec<String>,
    /// Interval between refresh attempts.
    pub refresh_interval: Duration,
    /// Bound on waiting for the first successful refresh.
    pub ready_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            keystore: PathBuf::from(DEFAULT_KEYSTORE),
            identity: "sable".to_string(),
            capabilities: Vec::new(),
            addresses: Vec::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

/// Outcome of driving the engine through initialization.
#[derive(Debug)]
pub enum Startup {
    /// The engine is keyed and ready for unlock.
    Ready,
    /// The engine had no key pair. A provisioning request was written to
    /// `artifact`; deliver it out-of-band and restart the process once
    /// provisioning completes.
    NeedsProvisioning {
        /// Path of the written provisioning artifact.
        artifact: PathBuf,
    },
}

/// Everything needed to find or create a mounted volume.
#[derive(Debug, Clone)]
pub struct VolumeSpec {
    /// Volume label, unique among the engine's known volumes.
    pub label: String,
    /// Backing file for the container.
    pub backing: PathBuf,
    /// Volume type.
    pub kind: VolumeKind,
    /// Container capacity in bytes.
    pub size: u64,
    /// Slot to mount into when unmounted.
    pub mount_point: MountPoint,
    /// Remove and recreate the volume if it already exists.
    pub recreate: bool,
}

/// Drives the engine lifecycle and owns the background refresh task.
///
/// The engine handle is injected at construction; there is no process
/// global. Call [`LifecycleDriver::shutdown`] before exit to stop and
/// join the refresh task.
pub struct LifecycleDriver {
    engine: Arc<dyn Engine>,
    config: DriverConfig,
    refresh: Option<RefreshHandle>,
}

impl LifecycleDriver {
    /// Create a driver for an engine.
    pub fn new(engine: Arc<dyn Engine>, config: DriverConfig) -> Self {
        Self {
            engine,
            config,
            refresh: None,
        }
    }

    /// The engine handle.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// The driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Initialize the engine and handle the unkeyed path.
    ///
    /// When the engine reports `Unkeyed`, a key pair is generated, the
    /// configured capabilities are appended, and the provisioning request
    /// is written as JSON to `<keystore>/newkey.smcsr`.
    ///
    /// # Errors
    /// - `State` if the engine reports the terminal `Error` state
    pub async fn start(&self, credential: &Credential) -> Result<Startup> {
        let state = self.engine.initialize(&self.config.keystore).await?;
        info!("engine initialized in state '{}'", state);

        match state {
            ManagementState::Initialized => Ok(Startup::Ready),
            ManagementState::Unkeyed => {
                let mut request = self
                    .engine
                    .generate_provisioning(&self.config.identity, credential, &self.config.addresses)
                    .await?;
                for capability in &self.config.capabilities {
                    request.push_capability(capability.clone());
                }

                tokio::fs::create_dir_all(&self.config.keystore).await?;
                let artifact = self.config.keystore.join(PROVISION_FILENAME);
                tokio::fs::write(&artifact, request.to_json()?).await?;
                info!(
                    "wrote provisioning request to {}; provision it and restart",
                    artifact.display()
                );
                Ok(Startup::NeedsProvisioning { artifact })
            }
            ManagementState::Error => Err(Error::State(
                "engine reported the terminal error state".to_string(),
            )),
            ManagementState::Uninitialized => {
                Err(Error::State("engine did not initialize".to_string()))
            }
        }
    }

    /// Unlock the engine's private key material.
    pub async fn unlock(&self, credential: &Credential) -> Result<()> {
        self.engine.unlock(credential).await
    }

    /// Subscribe for live updates. Idempotent.
    pub async fn subscribe(&self) -> Result<()> {
        self.engine.subscribe().await
    }

    /// Start the background refresh task if not already running.
    pub fn spawn_refresh(&mut self) {
        if self.refresh.is_none() {
            self.refresh = Some(spawn_refresh(
                self.engine.clone(),
                self.config.refresh_interval,
            ));
        }
    }

    /// Wait for the first successful refresh, bounded by the configured
    /// readiness timeout. Volume and share operations are reliable only
    /// after this resolves.
    ///
    /// # Errors
    /// - `State` if the refresh task was never started
    /// - `Timeout` if no refresh succeeds in time
    pub async fn ready(&self) -> Result<()> {
        let handle = self
            .refresh
            .as_ref()
            .ok_or_else(|| Error::State("refresh task not started".to_string()))?;
        handle.ready(self.config.ready_timeout).await
    }

    /// Stop and join the refresh task.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.refresh.take() {
            handle.shutdown().await;
        }
    }

    /// Find or create the volume described by `spec` and make sure it is
    /// mounted.
    ///
    /// With `recreate` set, an existing volume with the same label is
    /// removed first and a fresh one created.
    pub async fn ensure_volume(&self, spec: &VolumeSpec) -> Result<Arc<dyn Volume>> {
        let mut found = None;
        for volume in self.engine.list_volumes().await? {
            if volume.label() == spec.label {
                if spec.recreate {
                    info!("removing volume '{}' for recreation", spec.label);
                    self.engine.remove_volume(&spec.label).await?;
                } else {
                    found = Some(volume);
                }
                break;
            }
        }

        let volume = match found {
            Some(volume) => volume,
            None => {
                self.engine
                    .create_volume(spec.kind, &spec.backing, &spec.label, spec.size)
                    .await?
            }
        };

        if !volume.is_mounted() {
            volume.mount(spec.mount_point).await?;
        }
        Ok(volume)
    }

    /// Open the network share with the given id, creating it when it does
    /// not exist yet.
    ///
    /// A creation race with another member is absorbed: if the create
    /// fails because the share appeared in the meantime, the share is
    /// fetched again. Any other failure aborts this operation only.
    pub async fn open_or_create_share(
        &self,
        id: &ShareId,
        storage_path: &StorePath,
        store: Arc<dyn PersistentStore>,
    ) -> Result<Arc<dyn NetworkShare>> {
        match self
            .engine
            .get_share(id, storage_path, store.clone())
            .await
        {
            Ok(share) => Ok(share),
            Err(Error::NotFound(_)) => {
                info!("share '{}' does not exist, creating it", id);
                match self
                    .engine
                    .create_share(id, storage_path, store.clone())
                    .await
                {
                    Ok(share) => Ok(share),
                    Err(Error::AlreadyExists(_)) => {
                        self.engine.get_share(id, storage_path, store).await
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }
}
