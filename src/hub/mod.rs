//! Hub session layer.
//!
//! Every registered device gets its own long-lived WebSocket session to the
//! hub, so each physical SNMP source appears to the hub as an independent
//! agent. The hub drives all traffic: sessions never push, they answer
//! `CheckFingerprint` and `GetData` requests. `notify()` only makes sure a
//! session exists; fresh data waits in device state for the next `GetData`.

pub mod protocol;
mod session;
pub mod wire;

pub use session::{Session, SessionPhase};

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use signature::Verifier;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::HubConfig;
use crate::registry::Registry;

/// Per-session timing knobs. Production values come from `Default`; tests
/// shrink them.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// Delay between a session dropping and the next connect attempt.
    pub reconnect_delay: Duration,
    /// Idle limit per read; any inbound frame re-arms it.
    pub read_deadline: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            read_deadline: Duration::from_secs(70),
        }
    }
}

/// Parsed hub endpoint shared by all sessions.
pub struct HubEndpoint {
    /// Full WebSocket URL including the agent-connect path.
    pub(crate) url: Option<Url>,
    pub(crate) token: String,
    pub(crate) public_key: Option<ssh_key::PublicKey>,
    pub(crate) timing: SessionTiming,
}

impl HubEndpoint {
    /// Parse the configured hub settings.
    ///
    /// Unparsable values are logged and left unset; affected sessions park
    /// instead of crash-looping, and trap ingestion keeps running.
    pub fn from_config(hub: &HubConfig) -> Self {
        let url = match Url::parse(hub.url.trim()) {
            Ok(base) => agent_connect_url(&base),
            Err(e) => {
                if !hub.url.trim().is_empty() {
                    tracing::warn!(error = %e, "invalid hub url");
                }
                None
            }
        };

        let public_key = match ssh_key::PublicKey::from_openssh(hub.key.trim()) {
            Ok(key) => Some(key),
            Err(e) => {
                if !hub.key.trim().is_empty() {
                    tracing::warn!(error = %e, "invalid hub key");
                }
                None
            }
        };

        Self {
            url,
            token: hub.token.trim().to_string(),
            public_key,
            timing: SessionTiming::default(),
        }
    }

    /// Override the timing knobs (tests).
    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Names of the settings a session cannot run without.
    pub(crate) fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.url.is_none() {
            missing.push("hub url");
        }
        if self.token.is_empty() {
            missing.push("token");
        }
        if self.public_key.is_none() {
            missing.push("hub public key");
        }
        missing
    }

    /// Verify an SSH signature over the token bytes.
    ///
    /// The signature format is the configured key's algorithm, which is how
    /// the hub constructs it.
    pub fn verify_signature(&self, blob: &[u8]) -> bool {
        let Some(key) = &self.public_key else {
            return false;
        };
        let Ok(sig) = ssh_key::Signature::new(key.algorithm(), blob.to_vec()) else {
            return false;
        };
        key.key_data().verify(self.token.as_bytes(), &sig).is_ok()
    }
}

/// Map the hub's HTTP URL to the WebSocket agent-connect endpoint.
fn agent_connect_url(base: &Url) -> Option<Url> {
    let mut url = base.clone();

    let scheme = if base.scheme() == "https" || base.scheme() == "wss" {
        "wss"
    } else {
        "ws"
    };
    if url.set_scheme(scheme).is_err() {
        tracing::warn!(url = %base, "hub url scheme cannot carry a websocket");
        return None;
    }

    let path = format!(
        "{}/api/beszel/agent-connect",
        url.path().trim_end_matches('/')
    );
    url.set_path(&path);
    Some(url)
}

/// Browser-like User-Agent, so proxies and CDNs in front of the hub don't
/// challenge the upgrade request.
pub(crate) fn browser_user_agent() -> &'static str {
    const UA_WINDOWS: &str = "Mozilla/5.0 (Windows NT 11.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
    const UA_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

    let even_second = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() % 2 == 0)
        .unwrap_or(false);
    if even_second {
        UA_WINDOWS
    } else {
        UA_MAC
    }
}

/// Owns one [`Session`] per device IP.
pub struct SessionManager {
    endpoint: Arc<HubEndpoint>,
    registry: Arc<Registry>,
    conns: Mutex<HashMap<String, Arc<Session>>>,
    cancel: CancellationToken,
}

impl SessionManager {
    /// Create a manager over the given endpoint and registry.
    pub fn new(
        endpoint: HubEndpoint,
        registry: Arc<Registry>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            endpoint: Arc::new(endpoint),
            registry,
            conns: Mutex::new(HashMap::new()),
            cancel,
        })
    }

    /// Hint that a device has fresh data.
    ///
    /// Lazily creates and spawns the device's session on first call. Never
    /// writes to the socket: the hub asks for data when it wants it, and
    /// the state holds the latest values until then.
    pub fn notify(&self, ip: &IpAddr) {
        let key = ip.to_string();
        let mut conns = self.conns.lock().expect("session map poisoned");
        if conns.contains_key(&key) {
            return;
        }
        let Some(state) = self.registry.get(ip) else {
            return;
        };

        let session = Arc::new(Session::new(*ip, state, self.endpoint.clone()));
        conns.insert(key, session.clone());

        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            session.run(cancel).await;
        });
    }

    /// Look up a device's session (tests and diagnostics).
    pub fn session(&self, ip: &IpAddr) -> Option<Arc<Session>> {
        self.conns
            .lock()
            .expect("session map poisoned")
            .get(&ip.to_string())
            .cloned()
    }

    /// Number of sessions created so far.
    pub fn len(&self) -> usize {
        self.conns.lock().expect("session map poisoned").len()
    }

    /// Check whether no session exists yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint_for(url: &str) -> HubEndpoint {
        HubEndpoint::from_config(&HubConfig {
            url: url.to_string(),
            token: "tok".to_string(),
            key: String::new(),
        })
    }

    #[test]
    fn scheme_mapping() {
        let e = endpoint_for("https://hub.example");
        assert_eq!(
            e.url.unwrap().as_str(),
            "wss://hub.example/api/beszel/agent-connect"
        );

        let e = endpoint_for("http://hub.example:8090");
        assert_eq!(
            e.url.unwrap().as_str(),
            "ws://hub.example:8090/api/beszel/agent-connect"
        );
    }

    #[test]
    fn base_path_is_preserved() {
        let e = endpoint_for("https://hub.example/beszel/");
        assert_eq!(
            e.url.unwrap().as_str(),
            "wss://hub.example/beszel/api/beszel/agent-connect"
        );
    }

    #[test]
    fn invalid_settings_reported_missing() {
        let e = HubEndpoint::from_config(&HubConfig::default());
        assert_eq!(e.missing(), vec!["hub url", "token", "hub public key"]);
    }

    #[test]
    fn verify_without_key_fails_closed() {
        let e = endpoint_for("https://hub.example");
        assert!(!e.verify_signature(&[0u8; 64]));
    }

    #[test]
    fn user_agent_is_browser_like() {
        assert!(browser_user_agent().starts_with("Mozilla/5.0 ("));
    }
}
