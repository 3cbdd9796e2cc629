//! Process root.
//!
//! Wires the registry, poller pool, session manager and trap receiver
//! together, owns the shutdown token, and exposes the two runtime entry
//! points external adapters use: explicit device registration and atomic
//! configuration replacement.

use std::net::IpAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigHandle};
use crate::error::Result;
use crate::hub::{HubEndpoint, SessionManager, SessionTiming};
use crate::poller::PollerPool;
use crate::registry::Registry;
use crate::state::{derive_fingerprint, DeviceState};
use crate::trap::TrapReceiver;

/// The gateway runtime.
pub struct Agent {
    config: ConfigHandle,
    registry: Arc<Registry>,
    poller: PollerPool,
    sessions: Arc<SessionManager>,
    cancel: CancellationToken,
}

impl Agent {
    /// Build the runtime from a finalized configuration.
    pub fn new(config: Config) -> Self {
        Self::with_timing(config, SessionTiming::default())
    }

    /// Build with custom hub session timing (tests).
    pub fn with_timing(config: Config, timing: SessionTiming) -> Self {
        let endpoint = HubEndpoint::from_config(&config.hub).with_timing(timing);
        let config = ConfigHandle::new(config);
        let registry = Arc::new(Registry::new());
        let cancel = CancellationToken::new();

        let sessions = SessionManager::new(endpoint, registry.clone(), cancel.clone());
        let poller = PollerPool::new(
            config.clone(),
            registry.clone(),
            sessions.clone(),
            cancel.clone(),
        );

        Self {
            config,
            registry,
            poller,
            sessions,
            cancel,
        }
    }

    /// The device registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The session manager.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// The poller pool.
    pub fn poller(&self) -> &PollerPool {
        &self.poller
    }

    /// The root cancellation token (for signal wiring).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bind the trap listener and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let receiver = TrapReceiver::bind(
            self.config.clone(),
            self.registry.clone(),
            self.poller.clone(),
            self.sessions.clone(),
        )
        .await?;

        receiver.run(self.cancel.clone()).await
    }

    /// Register a device ahead of its first trap.
    ///
    /// The hostname doubles as the identity's sysName, so the fingerprint
    /// is the same one a later trap carrying that sysName would derive.
    pub fn ensure_device(&self, ip: IpAddr, hostname: &str) {
        let fingerprint = derive_fingerprint(&ip, hostname, "");
        let hostname = if hostname.is_empty() {
            ip.to_string()
        } else {
            hostname.to_string()
        };

        self.registry
            .insert(Arc::new(DeviceState::new(ip, fingerprint, hostname.clone())));
        self.poller.ensure_polling(ip);
        self.sessions.notify(&ip);

        tracing::info!(device.ip = %ip, device.hostname = %hostname, "device added");
    }

    /// Validate and atomically install a new configuration.
    ///
    /// Poll loops and the trap receiver pick up the new value on their next
    /// tick/packet; tasks mid-flight finish on the snapshot they captured.
    /// The hub endpoint itself is fixed for the process lifetime.
    pub fn replace_config(&self, mut config: Config) -> Result<()> {
        config.finalize()?;
        self.config.swap(config);
        tracing::info!("configuration replaced");
        Ok(())
    }

    /// Cancel every loop and session; sessions close with code 1000.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
