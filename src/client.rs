//! SNMPv2c GET client.
//!
//! One short-lived client per poll tick: an ephemeral UDP socket connected
//! to the device, a fixed timeout, and a fixed retry count. Responses are
//! correlated by request ID; datagrams with the wrong ID are discarded
//! until the deadline passes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UdpSocket;

use crate::error::{Error, Result};
use crate::message::{CommunityMessage, Version};
use crate::oid::Oid;
use crate::pdu::{Pdu, PduType};
use crate::util::bind_ephemeral_udp_socket;
use crate::varbind::VarBind;

/// Process-wide request ID counter.
static REQUEST_ID: AtomicI32 = AtomicI32::new(1);

fn next_request_id() -> i32 {
    // Wrap back to 1 rather than going negative.
    let id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    if id <= 0 {
        REQUEST_ID.store(2, Ordering::Relaxed);
        1
    } else {
        id
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Community string.
    pub community: Bytes,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retries: u32,
}

impl Default for ClientConfig {
    /// Poller defaults: 2 second timeout, one retry.
    fn default() -> Self {
        Self {
            community: Bytes::from_static(b"public"),
            timeout: Duration::from_secs(2),
            retries: 1,
        }
    }
}

/// SNMPv2c client bound to a single target.
pub struct SnmpClient {
    socket: UdpSocket,
    target: SocketAddr,
    config: ClientConfig,
}

impl SnmpClient {
    /// Bind an ephemeral socket and connect it to the target.
    pub async fn connect(target: SocketAddr, config: ClientConfig) -> Result<Self> {
        let socket = bind_ephemeral_udp_socket(target).await.map_err(|e| Error::Io {
            target: Some(target),
            source: e,
        })?;
        socket.connect(target).await.map_err(|e| Error::Io {
            target: Some(target),
            source: e,
        })?;
        Ok(Self {
            socket,
            target,
            config,
        })
    }

    /// The remote address this client polls.
    pub fn peer_addr(&self) -> SocketAddr {
        self.target
    }

    /// GET a single OID.
    pub async fn get(&self, oid: &Oid) -> Result<VarBind> {
        let request_id = next_request_id();
        let pdu = Pdu::get_request(request_id, std::slice::from_ref(oid));
        let message = CommunityMessage::v2c(self.config.community.clone(), pdu);
        let data = message.encode();

        let response = self.send_and_recv(request_id, &data).await?;

        response
            .varbinds
            .into_iter()
            .next()
            .ok_or(Error::Decode {
                offset: 0,
                kind: crate::error::DecodeErrorKind::Truncated,
            })
    }

    /// Send a request and wait for the matching response, retrying on timeout.
    async fn send_and_recv(&self, request_id: i32, data: &[u8]) -> Result<Pdu> {
        let start = Instant::now();

        for attempt in 0..=self.config.retries {
            if attempt > 0 {
                tracing::debug!(snmp.target = %self.target, attempt, "retrying request");
            }

            self.socket.send(data).await.map_err(|e| Error::Io {
                target: Some(self.target),
                source: e,
            })?;

            match self.recv_matching(request_id).await {
                Ok(Some(pdu)) => {
                    if pdu.is_error() {
                        let status = pdu.error_status_enum();
                        // error_index is 1-based; 0 means the whole PDU
                        let oid = (pdu.error_index as usize)
                            .checked_sub(1)
                            .and_then(|idx| pdu.varbinds.get(idx))
                            .map(|vb| vb.oid.clone());
                        return Err(Error::Snmp {
                            target: self.target,
                            status,
                            index: pdu.error_index.max(0) as u32,
                            oid,
                        });
                    }
                    return Ok(pdu);
                }
                Ok(None) => continue, // deadline passed, maybe retry
                Err(e) => return Err(e),
            }
        }

        Err(Error::Timeout {
            target: self.target,
            elapsed: start.elapsed(),
            retries: self.config.retries,
        })
    }

    /// Receive until a Response with the expected request ID arrives or the
    /// attempt deadline passes. Mismatched datagrams are logged and dropped.
    async fn recv_matching(&self, request_id: i32) -> Result<Option<Pdu>> {
        let deadline = Instant::now() + self.config.timeout;
        let mut buf = vec![0u8; 65535];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let len = match tokio::time::timeout(remaining, self.socket.recv(&mut buf)).await {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => {
                    return Err(Error::Io {
                        target: Some(self.target),
                        source: e,
                    });
                }
                Err(_) => return Ok(None),
            };

            let data = Bytes::copy_from_slice(&buf[..len]);
            let message = match CommunityMessage::decode(data) {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(snmp.target = %self.target, error = %e, "malformed response");
                    continue;
                }
            };

            if message.version != Version::V2c {
                tracing::debug!(snmp.target = %self.target, version = %message.version, "response version mismatch");
                continue;
            }

            let pdu = message.into_pdu();
            if pdu.pdu_type != PduType::Response || pdu.request_id != request_id {
                tracing::debug!(
                    snmp.target = %self.target,
                    expected = request_id,
                    actual = pdu.request_id,
                    "response for a different request"
                );
                continue;
            }

            return Ok(Some(pdu));
        }
    }
}
