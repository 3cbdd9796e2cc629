//! Per-device SNMP poll loops.
//!
//! One background loop per poll-enabled device, started when the device is
//! first seen. Each tick opens a short-lived v2c client (2 s timeout, one
//! retry), GETs every forwardable OID from the device's rule, and notifies
//! the session manager. A failed tick is skipped, never torn down; loops
//! end only on shutdown.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientConfig, SnmpClient};
use crate::config::ConfigHandle;
use crate::hub::SessionManager;
use crate::mapping::{should_forward, transform};
use crate::oid::Oid;
use crate::registry::Registry;

/// Owns the poll loops. Cheap to clone; clones share the loop set.
#[derive(Clone)]
pub struct PollerPool {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    config: ConfigHandle,
    registry: Arc<Registry>,
    sessions: Arc<SessionManager>,
    /// IPs with a running loop.
    active: Mutex<HashSet<String>>,
    cancel: CancellationToken,
}

impl PollerPool {
    /// Create a pool; loops are spawned on demand by `ensure_polling`.
    pub fn new(
        config: ConfigHandle,
        registry: Arc<Registry>,
        sessions: Arc<SessionManager>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                config,
                registry,
                sessions,
                active: Mutex::new(HashSet::new()),
                cancel,
            }),
        }
    }

    /// Start polling an IP if a poll-enabled rule matches it. Idempotent:
    /// at most one loop per IP for the process lifetime.
    pub fn ensure_polling(&self, ip: IpAddr) {
        let ip_text = ip.to_string();
        if self.inner.config.load().first_poll_rule(&ip_text).is_none() {
            return;
        }

        {
            let mut active = self.inner.active.lock().expect("poller set poisoned");
            if !active.insert(ip_text.clone()) {
                return;
            }
        }

        tracing::info!(device.ip = %ip_text, "poll loop started");
        let pool = self.clone();
        tokio::spawn(async move {
            pool.poll_loop(ip).await;
        });
    }

    /// Number of poll loops started (tests).
    pub fn active_count(&self) -> usize {
        self.inner.active.lock().expect("poller set poisoned").len()
    }

    async fn poll_loop(self, ip: IpAddr) {
        loop {
            self.poll_once(ip).await;

            // Interval comes from the current config snapshot, so a swap
            // takes effect on the next tick.
            let interval = self
                .inner
                .config
                .load()
                .first_poll_rule(&ip.to_string())
                .map(|rule| rule.poll_interval())
                .unwrap_or_else(|| self.inner.config.load().send_interval());

            tokio::select! {
                biased;
                _ = self.inner.cancel.cancelled() => {
                    tracing::debug!(device.ip = %ip, "poll loop stopping");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One polling pass over the device's configured OIDs.
    async fn poll_once(&self, ip: IpAddr) {
        let config = self.inner.config.load();
        let ip_text = ip.to_string();
        let Some(rule) = config.first_poll_rule(&ip_text) else {
            return;
        };

        let target = SocketAddr::new(ip, rule.snmp_port);
        let client_config = ClientConfig {
            community: Bytes::copy_from_slice(rule.first_community().as_bytes()),
            ..ClientConfig::default()
        };
        let client = match SnmpClient::connect(target, client_config).await {
            Ok(client) => client,
            Err(e) => {
                // Skip the tick; the loop stays up.
                tracing::debug!(device.ip = %ip_text, error = %e, "poll connect failed");
                return;
            }
        };

        for (oid_text, map) in &rule.oids {
            if !should_forward(map) {
                continue;
            }
            let oid = match Oid::parse(oid_text) {
                Ok(oid) => oid,
                Err(_) => {
                    tracing::warn!(snmp.oid = %oid_text, "unparsable OID in device rule");
                    continue;
                }
            };

            let varbind = match client.get(&oid).await {
                Ok(vb) => vb,
                Err(e) => {
                    tracing::debug!(device.ip = %ip_text, snmp.oid = %oid_text, error = %e, "poll GET failed");
                    continue;
                }
            };
            let Some(raw) = varbind.value.as_f64() else {
                tracing::debug!(device.ip = %ip_text, snmp.oid = %oid_text, snmp.value = %varbind.value, "non-numeric poll value dropped");
                continue;
            };

            let scaled = transform(raw, map.scale, config.defaults.round_to_one_decimal);
            if let Some(state) = self.inner.registry.get(&ip) {
                state.set_metric(&map.category, &map.name, scaled);
                tracing::debug!(
                    device.ip = %ip_text,
                    metric.name = %map.name,
                    metric.value = scaled,
                    "poll value stored"
                );
            }
        }

        self.inner.sessions.notify(&ip);
    }
}
