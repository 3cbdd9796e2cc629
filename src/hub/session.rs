//! Per-device hub session.
//!
//! One supervised task per device IP: connect, serve inbound requests,
//! reconnect after a fixed delay when the transport drops. All outbound
//! writes happen inside the request handler, so replies leave in request
//! order and nothing is ever sent unsolicited.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::protocol::{FingerprintRequest, FingerprintResponse, HubAction, HubRequest};
use super::{browser_user_agent, HubEndpoint};
use crate::error::{Error, Result};
use crate::state::DeviceState;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Lifecycle of a session's transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Never attempted.
    Disconnected,
    /// Dialing the hub.
    Connecting,
    /// Transport up, hub not yet authenticated.
    Open,
    /// Hub signature checked out; data may flow.
    Verified,
    /// Transport down; reconnect pending (or shutdown).
    Closed,
}

/// One device's channel to the hub.
pub struct Session {
    ip: IpAddr,
    state: Arc<DeviceState>,
    endpoint: Arc<HubEndpoint>,
    phase: Mutex<SessionPhase>,
}

impl Session {
    pub(crate) fn new(ip: IpAddr, state: Arc<DeviceState>, endpoint: Arc<HubEndpoint>) -> Self {
        Self {
            ip,
            state,
            endpoint,
            phase: Mutex::new(SessionPhase::Disconnected),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    /// Whether the hub has authenticated on the current transport.
    pub fn is_verified(&self) -> bool {
        self.phase() == SessionPhase::Verified
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }

    /// Supervision loop: connect, serve, wait, reconnect.
    pub(crate) async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let missing = self.endpoint.missing();
        if !missing.is_empty() {
            tracing::warn!(
                device.ip = %self.ip,
                missing = %missing.join(", "),
                "hub not configured, session parked"
            );
            return;
        }

        loop {
            self.set_phase(SessionPhase::Connecting);
            tracing::info!(device.ip = %self.ip, "connecting to hub");

            match self.serve(&cancel).await {
                Ok(()) => tracing::info!(device.ip = %self.ip, "hub session closed"),
                Err(e) => tracing::warn!(device.ip = %self.ip, error = %e, "hub session failed"),
            }
            self.set_phase(SessionPhase::Closed);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.endpoint.timing.reconnect_delay) => {}
            }
        }
    }

    /// One connection lifetime: upgrade, then answer requests until the
    /// transport drops, the read deadline lapses, or shutdown.
    async fn serve(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(url) = self.endpoint.url.as_ref() else {
            return Err(Error::WebSocket("hub url not configured".to_string()));
        };
        let uri = url
            .as_str()
            .parse()
            .map_err(|e| Error::WebSocket(format!("invalid hub uri: {e}")))?;

        let request = ClientRequestBuilder::new(uri)
            .with_header("User-Agent", browser_user_agent())
            .with_header("X-Token", self.endpoint.token.as_str())
            .with_header("X-Beszel", crate::VERSION);

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        tracing::info!(device.ip = %self.ip, "hub connected");
        self.set_phase(SessionPhase::Open);

        let (mut write, mut read) = ws.split();
        // Verification is per-transport; a reconnect starts unverified.
        let mut verified = false;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    let _ = write
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        })))
                        .await;
                    return Ok(());
                }

                next = self.read_frame(&mut read) => {
                    match next? {
                        Some(Message::Binary(data)) => {
                            self.handle_request(&mut write, &mut verified, Bytes::from(data))
                                .await?;
                        }
                        Some(Message::Ping(payload)) => {
                            write
                                .send(Message::Pong(payload))
                                .await
                                .map_err(|e| Error::WebSocket(e.to_string()))?;
                        }
                        Some(Message::Close(_)) | None => return Ok(()),
                        // Text and stray pongs only refresh the deadline.
                        Some(_) => {}
                    }
                }
            }
        }
    }

    /// Read one frame within the deadline. Every arriving frame re-arms it.
    async fn read_frame(&self, read: &mut WsStream) -> Result<Option<Message>> {
        match tokio::time::timeout(self.endpoint.timing.read_deadline, read.next()).await {
            Err(_) => Err(Error::WebSocket("read deadline exceeded".to_string())),
            Ok(None) => Ok(None),
            Ok(Some(Err(e))) => Err(Error::WebSocket(e.to_string())),
            Ok(Some(Ok(msg))) => Ok(Some(msg)),
        }
    }

    /// Dispatch one inbound request. Undecodable frames are dropped and the
    /// session keeps running; only transport errors propagate.
    async fn handle_request(
        &self,
        write: &mut WsSink,
        verified: &mut bool,
        frame: Bytes,
    ) -> Result<()> {
        let request = match HubRequest::decode(frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(device.ip = %self.ip, error = %e, "undecodable hub frame");
                return Ok(());
            }
        };

        match HubAction::from_u8(request.action) {
            Some(HubAction::CheckFingerprint) => {
                let fr = match FingerprintRequest::decode(request.data) {
                    Ok(fr) => fr,
                    Err(e) => {
                        tracing::debug!(device.ip = %self.ip, error = %e, "bad fingerprint request");
                        return Ok(());
                    }
                };

                if !self.endpoint.verify_signature(&fr.signature) {
                    // No response: the hub times out and decides what's next.
                    tracing::warn!(device.ip = %self.ip, "hub signature rejected");
                    return Ok(());
                }

                *verified = true;
                self.set_phase(SessionPhase::Verified);
                tracing::info!(device.ip = %self.ip, "hub verified");

                let response = FingerprintResponse {
                    fingerprint: self.state.fingerprint().to_string(),
                    hostname: fr
                        .need_sys_info
                        .then(|| self.state.hostname().to_string()),
                };
                self.send(write, response.encode()).await
            }

            Some(HubAction::GetData) => {
                if !*verified {
                    tracing::debug!(device.ip = %self.ip, "GetData before verification, dropped");
                    return Ok(());
                }
                match self.state.snapshot(crate::VERSION) {
                    Some(data) => {
                        self.send(write, data.encode()).await?;
                        tracing::debug!(device.ip = %self.ip, "data sent");
                        Ok(())
                    }
                    None => {
                        tracing::trace!(device.ip = %self.ip, "empty snapshot, nothing sent");
                        Ok(())
                    }
                }
            }

            None => {
                tracing::debug!(device.ip = %self.ip, action = request.action, "unknown hub action");
                Ok(())
            }
        }
    }

    async fn send(&self, write: &mut WsSink, frame: Bytes) -> Result<()> {
        write
            .send(Message::Binary(frame.to_vec()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("ip", &self.ip)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
