//! Shared test infrastructure: a scripted SNMP device, a mock hub, and a
//! hub keypair helper.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use snmp_gateway::hub::protocol::{
    CombinedData, FingerprintRequest, FingerprintResponse, HubRequest,
};
use snmp_gateway::message::CommunityMessage;
use snmp_gateway::pdu::Pdu;
use snmp_gateway::value::Value;
use snmp_gateway::varbind::VarBind;
use snmp_gateway::{oid, Oid};

/// How long test drivers wait for a reply before deciding none is coming.
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

// ── Hub keypair ──────────────────────────────────────────────────────

/// An Ed25519 identity standing in for the hub's key.
pub struct HubIdentity {
    private: ssh_key::PrivateKey,
}

impl HubIdentity {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        let private = ssh_key::PrivateKey::random(
            &mut rand_core::OsRng,
            ssh_key::Algorithm::Ed25519,
        )
        .expect("keygen");
        Self { private }
    }

    /// The authorized-key line a gateway config carries.
    pub fn public_openssh(&self) -> String {
        self.private.public_key().to_openssh().expect("openssh encode")
    }

    /// Raw signature blob over the token bytes.
    pub fn sign(&self, token: &str) -> Vec<u8> {
        use signature::Signer;
        let sig: ssh_key::Signature = self.private.try_sign(token.as_bytes()).expect("sign");
        sig.as_bytes().to_vec()
    }
}

// ── Mock hub ─────────────────────────────────────────────────────────

/// Accept loop standing in for the hub. Each accepted agent connection is
/// handed to the test as a [`HubConn`].
pub struct TestHub {
    pub addr: SocketAddr,
    conns: mpsc::Receiver<HubConn>,
}

impl TestHub {
    /// Bind an ephemeral listener and start accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("hub bind");
        let addr = listener.local_addr().expect("hub addr");
        let (tx, conns) = mpsc::channel(8);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let token = Arc::new(Mutex::new(None));
                    let token_capture = token.clone();
                    let callback = move |req: &Request, resp: Response| {
                        let header = req
                            .headers()
                            .get("X-Token")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        *token_capture.lock().unwrap() = header;
                        Ok(resp)
                    };
                    if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                        let token_header = token.lock().unwrap().clone();
                        let _ = tx.send(HubConn { ws, token_header }).await;
                    }
                });
            }
        });

        Self { addr, conns }
    }

    /// Hub base URL for a gateway config.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Wait for the next agent connection.
    pub async fn next_conn(&mut self) -> HubConn {
        tokio::time::timeout(Duration::from_secs(5), self.conns.recv())
            .await
            .expect("timed out waiting for agent connection")
            .expect("hub accept channel closed")
    }
}

/// One agent connection, driven from the hub side.
pub struct HubConn {
    ws: WebSocketStream<TcpStream>,
    /// `X-Token` header from the upgrade request.
    pub token_header: Option<String>,
}

impl HubConn {
    /// Send CheckFingerprint and wait briefly for the reply.
    pub async fn check_fingerprint(
        &mut self,
        signature: &[u8],
        need_sys_info: bool,
    ) -> Option<FingerprintResponse> {
        let payload = FingerprintRequest {
            signature: Bytes::copy_from_slice(signature),
            need_sys_info,
        }
        .encode();
        let frame = HubRequest::encode(0, &payload);
        self.ws
            .send(Message::Binary(frame.to_vec()))
            .await
            .expect("hub send");

        self.recv_binary()
            .await
            .map(|frame| FingerprintResponse::decode(frame).expect("fingerprint response"))
    }

    /// Send GetData and wait briefly for the reply.
    pub async fn get_data(&mut self) -> Option<CombinedData> {
        let frame = HubRequest::encode(1, &[]);
        self.ws
            .send(Message::Binary(frame.to_vec()))
            .await
            .expect("hub send");

        self.recv_binary()
            .await
            .map(|frame| CombinedData::decode(frame).expect("combined data"))
    }

    /// Send a ping; the session must pong with the same payload.
    pub async fn ping(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        self.ws
            .send(Message::Ping(payload.to_vec()))
            .await
            .expect("hub ping");

        let deadline = tokio::time::sleep(REPLY_TIMEOUT);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return None,
                msg = self.ws.next() => match msg {
                    Some(Ok(Message::Pong(data))) => return Some(data),
                    Some(Ok(_)) => continue,
                    _ => return None,
                }
            }
        }
    }

    /// Drop the transport from the hub side.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }

    async fn recv_binary(&mut self) -> Option<Bytes> {
        let deadline = tokio::time::sleep(REPLY_TIMEOUT);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return None,
                msg = self.ws.next() => match msg {
                    Some(Ok(Message::Binary(data))) => return Some(Bytes::from(data)),
                    Some(Ok(_)) => continue,
                    _ => return None,
                }
            }
        }
    }
}

// ── Scripted SNMP device ─────────────────────────────────────────────

/// Mutable behavior of a [`TestDevice`].
pub struct DeviceScript {
    /// When false, requests are swallowed and the client times out.
    pub responding: bool,
    /// OID text (no leading dot) to value.
    pub values: HashMap<String, Value>,
    /// GET requests seen, responding or not.
    pub requests_seen: usize,
}

/// UDP responder standing in for an SNMP agent.
pub struct TestDevice {
    pub addr: SocketAddr,
    pub script: Arc<Mutex<DeviceScript>>,
}

impl TestDevice {
    /// Bind an ephemeral UDP port and start answering GETs.
    pub async fn start(values: HashMap<String, Value>) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("device bind");
        let addr = socket.local_addr().expect("device addr");
        let script = Arc::new(Mutex::new(DeviceScript {
            responding: true,
            values,
            requests_seen: 0,
        }));

        let loop_script = script.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Ok(message) = CommunityMessage::decode(Bytes::copy_from_slice(&buf[..len]))
                else {
                    continue;
                };

                let reply = {
                    let mut script = loop_script.lock().unwrap();
                    script.requests_seen += 1;
                    if !script.responding {
                        continue;
                    }

                    let mut response = message.pdu.to_response();
                    for vb in &mut response.varbinds {
                        let key = vb.oid.to_string();
                        vb.value = script
                            .values
                            .get(&key)
                            .cloned()
                            .unwrap_or(Value::NoSuchInstance);
                    }
                    CommunityMessage::v2c(message.community, response).encode()
                };
                let _ = socket.send_to(&reply, peer).await;
            }
        });

        Self { addr, script }
    }

    /// Toggle whether the device answers.
    pub fn set_responding(&self, responding: bool) {
        self.script.lock().unwrap().responding = responding;
    }

    /// Replace one OID's value.
    pub fn set_value(&self, oid: &str, value: Value) {
        let key = oid.trim_start_matches('.').to_string();
        self.script.lock().unwrap().values.insert(key, value);
    }

    /// Number of GETs observed.
    pub fn requests_seen(&self) -> usize {
        self.script.lock().unwrap().requests_seen
    }
}

// ── Trap construction ────────────────────────────────────────────────

/// Encode a standard v2c sensor trap: sysUpTime + snmpTrapOID + sysName +
/// one integer varbind.
pub fn sensor_trap(community: &str, sys_name: &str, value_oid: &Oid, value: i32) -> Bytes {
    let varbinds = vec![
        VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::TimeTicks(1)),
        VarBind::new(
            oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0),
            Value::ObjectIdentifier(oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 1)),
        ),
        VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0), Value::from(sys_name)),
        VarBind::new(value_oid.clone(), Value::Integer(value)),
    ];
    CommunityMessage::v2c(community.as_bytes().to_vec(), Pdu::trap_v2(1, varbinds)).encode()
}

/// Poll a condition until it holds or the deadline passes.
pub async fn wait_for(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}
