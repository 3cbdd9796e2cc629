//! SNMP trap receiver.
//!
//! Binds the configured UDP listen address and turns SNMPv2c traps (and
//! informs, which it acknowledges) into device state updates. Unknown
//! senders are materialized on their first trap: the first matching device
//! rule supplies identity templates, polling starts if the rule asks for
//! it, and the session manager learns the device exists.
//!
//! Per-packet failures are logged and dropped; the receive loop only ends
//! on cancellation or a socket-level error.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigHandle;
use crate::hub::SessionManager;
use crate::mapping::{find_oid_map, log_unknown_oid, should_forward, transform};
use crate::message::{CommunityMessage, Version};
use crate::oid::Oid;
use crate::pdu::PduType;
use crate::poller::PollerPool;
use crate::registry::Registry;
use crate::state::{derive_fingerprint, expand_template, DeviceState};
use crate::util::{bind_udp_socket, parse_listen_addr};
use crate::error::{Error, Result};

/// Well-known OIDs every v2c notification carries. These describe the trap
/// itself, not a sensor, so the mapper never sees them.
mod meta {
    use crate::oid::Oid;

    /// sysUpTime.0
    pub fn sys_uptime() -> Oid {
        crate::oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)
    }

    /// snmpTrapOID.0
    pub fn snmp_trap_oid() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0)
    }

    /// sysName.0
    pub fn sys_name() -> Oid {
        crate::oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)
    }
}

/// UDP SNMPv2c trap/inform listener.
pub struct TrapReceiver {
    config: ConfigHandle,
    registry: Arc<Registry>,
    poller: PollerPool,
    sessions: Arc<SessionManager>,
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl TrapReceiver {
    /// Bind the listener at the configured address.
    pub async fn bind(
        config: ConfigHandle,
        registry: Arc<Registry>,
        poller: PollerPool,
        sessions: Arc<SessionManager>,
    ) -> Result<Self> {
        let listen = config.load().defaults.listen_addr.clone();
        let addr = parse_listen_addr(&listen)
            .ok_or_else(|| Error::Config(format!("invalid listen_addr {listen:?}")))?;

        let socket = bind_udp_socket(addr).await.map_err(|e| Error::Io {
            target: Some(addr),
            source: e,
        })?;
        let local_addr = socket.local_addr().map_err(|e| Error::Io {
            target: Some(addr),
            source: e,
        })?;

        tracing::info!(listen.addr = %local_addr, "trap listener bound");

        Ok(Self {
            config,
            registry,
            poller,
            sessions,
            socket,
            local_addr,
        })
    }

    /// The bound listen address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive until cancelled. Returns `Err` only for socket failures.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut buf = vec![0u8; 65535];

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("trap listener stopping");
                    return Ok(());
                }

                received = self.socket.recv_from(&mut buf) => {
                    let (len, source) = received.map_err(|e| Error::Io {
                        target: None,
                        source: e,
                    })?;
                    let data = Bytes::copy_from_slice(&buf[..len]);
                    if let Err(e) = self.handle_datagram(data, source).await {
                        tracing::warn!(snmp.source = %source, error = %e, "dropped trap");
                    }
                }
            }
        }
    }

    /// Decode one datagram and apply it.
    async fn handle_datagram(&self, data: Bytes, source: SocketAddr) -> Result<()> {
        let message = CommunityMessage::decode(data)?;

        if message.version != Version::V2c {
            tracing::debug!(snmp.source = %source, version = %message.version, "non-v2c packet ignored");
            return Ok(());
        }
        if !message.pdu.is_notification() {
            tracing::debug!(snmp.source = %source, pdu = %message.pdu.pdu_type, "non-notification PDU ignored");
            return Ok(());
        }

        let config = self.config.load();
        let ip = source.ip();
        let ip_text = ip.to_string();

        // The community must be on the matched rule's list (which falls back
        // to the defaults during finalization).
        let allowed = match config.match_device(&ip_text) {
            Some(rule) => &rule.communities,
            None => &config.defaults.communities,
        };
        let community = String::from_utf8_lossy(&message.community);
        if !allowed.iter().any(|c| c.as_str() == community.as_ref()) {
            tracing::warn!(snmp.source = %source, snmp.community = %community, "community rejected");
            return Ok(());
        }

        // Informs are confirmed: acknowledge before processing.
        if message.pdu.pdu_type == PduType::InformRequest {
            let response = CommunityMessage::v2c(message.community.clone(), message.pdu.to_response());
            self.socket
                .send_to(&response.encode(), source)
                .await
                .map_err(|e| Error::Io {
                    target: Some(source),
                    source: e,
                })?;
            tracing::debug!(snmp.source = %source, "inform acknowledged");
        }

        tracing::info!(
            snmp.source = %source,
            snmp.varbinds = message.pdu.varbinds.len(),
            "trap received"
        );

        let sys_name = message
            .pdu
            .varbinds
            .iter()
            .find(|vb| vb.oid == meta::sys_name())
            .and_then(|vb| vb.value.as_str())
            .unwrap_or("")
            .to_string();

        let (state, created) = self.registry.get_or_insert_with(&ip, || {
            let rule = config.match_device(&ip_text);
            let fp_template = rule.map(|r| r.fingerprint_template.as_str()).unwrap_or("");
            let host_template = rule.map(|r| r.hostname_template.as_str()).unwrap_or("");

            let fingerprint = derive_fingerprint(&ip, &sys_name, fp_template);
            let hostname = if !host_template.is_empty() {
                expand_template(host_template, &ip, &sys_name)
            } else if !sys_name.is_empty() {
                sys_name.clone()
            } else {
                ip_text.clone()
            };

            DeviceState::new(ip, fingerprint, hostname)
        });

        if created {
            tracing::info!(
                device.ip = %ip,
                device.hostname = state.hostname(),
                device.fingerprint = state.fingerprint(),
                "device registered from trap"
            );
            self.poller.ensure_polling(ip);
        }

        let skip = [meta::sys_uptime(), meta::snmp_trap_oid(), meta::sys_name()];
        for vb in &message.pdu.varbinds {
            if skip.contains(&vb.oid) {
                continue;
            }
            self.apply_varbind(&config, &ip_text, &state, &vb.oid, &vb.value);
        }

        self.sessions.notify(&ip);
        Ok(())
    }

    /// Map one varbind through the value pipeline into device state.
    fn apply_varbind(
        &self,
        config: &crate::config::Config,
        ip_text: &str,
        state: &DeviceState,
        oid: &Oid,
        value: &crate::value::Value,
    ) {
        let oid_text = oid.to_string();
        let Some(map) = find_oid_map(config, ip_text, &oid_text) else {
            log_unknown_oid(&oid_text, value, config.defaults.log_unknown);
            return;
        };
        if !should_forward(map) {
            return;
        }
        let Some(raw) = value.as_f64() else {
            tracing::debug!(snmp.oid = %oid_text, snmp.value = %value, "non-numeric value dropped");
            return;
        };

        let scaled = transform(raw, map.scale, config.defaults.round_to_one_decimal);
        if state.set_metric(&map.category, &map.name, scaled) {
            tracing::info!(
                device.ip = %ip_text,
                snmp.oid = %oid_text,
                metric.name = %map.name,
                metric.category = %map.category,
                metric.value = scaled,
                "value mapped"
            );
        }
    }
}
