//! Hub session behavior: signature-gated authentication, request-driven
//! data delivery, empty suppression, and reconnect with stable identity.

mod common;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{HubIdentity, TestHub};
use tokio_util::sync::CancellationToken;

use snmp_gateway::config::HubConfig;
use snmp_gateway::hub::{HubEndpoint, SessionManager, SessionTiming};
use snmp_gateway::state::{derive_fingerprint, DeviceState};
use snmp_gateway::{Registry, SessionPhase};

const TOKEN: &str = "test-token";

fn test_timing() -> SessionTiming {
    SessionTiming {
        reconnect_delay: Duration::from_millis(200),
        read_deadline: Duration::from_secs(10),
    }
}

/// Wire a registry with one device and a session manager pointed at the
/// mock hub.
fn start_manager(
    hub_url: &str,
    identity: &HubIdentity,
) -> (Arc<Registry>, Arc<SessionManager>, Arc<DeviceState>, IpAddr, CancellationToken) {
    let ip: IpAddr = "192.168.1.10".parse().unwrap();
    let fingerprint = derive_fingerprint(&ip, "sw-a", "snmp-%IP%");
    let state = Arc::new(DeviceState::new(ip, fingerprint, "sw-a".to_string()));

    let registry = Arc::new(Registry::new());
    registry.insert(state.clone());

    let endpoint = HubEndpoint::from_config(&HubConfig {
        url: hub_url.to_string(),
        token: TOKEN.to_string(),
        key: identity.public_openssh(),
    })
    .with_timing(test_timing());

    let cancel = CancellationToken::new();
    let sessions = SessionManager::new(endpoint, registry.clone(), cancel.clone());

    (registry, sessions, state, ip, cancel)
}

/// A valid signature verifies the session; GetData yields the metrics
/// and dashboard summary.
#[tokio::test]
async fn hub_auth_and_data_request() {
    let mut hub = TestHub::start().await;
    let identity = HubIdentity::generate();
    let (_registry, sessions, state, ip, _cancel) = start_manager(&hub.url(), &identity);
    state.set_metric("temperature", "temp1", 237.0);

    sessions.notify(&ip);
    let mut conn = hub.next_conn().await;

    // The upgrade carried the token header.
    assert_eq!(conn.token_header.as_deref(), Some(TOKEN));

    let response = conn
        .check_fingerprint(&identity.sign(TOKEN), true)
        .await
        .expect("fingerprint response");
    assert_eq!(response.fingerprint, state.fingerprint());
    assert_eq!(response.hostname.as_deref(), Some("sw-a"));

    let session = sessions.session(&ip).unwrap();
    assert_eq!(session.phase(), SessionPhase::Verified);

    let data = conn.get_data().await.expect("combined data");
    assert_eq!(data.stats.temperatures.get("temp1"), Some(&237.0));
    assert_eq!(data.info.agent_type, "snmp");
    assert_eq!(data.info.hostname, "sw-a");
    assert_eq!(data.info.dashboard_temp, Some(237.0));
}

/// Hostname is withheld unless the hub asks for system info.
#[tokio::test]
async fn hostname_only_on_request() {
    let mut hub = TestHub::start().await;
    let identity = HubIdentity::generate();
    let (_registry, sessions, _state, ip, _cancel) = start_manager(&hub.url(), &identity);

    sessions.notify(&ip);
    let mut conn = hub.next_conn().await;

    let response = conn
        .check_fingerprint(&identity.sign(TOKEN), false)
        .await
        .expect("fingerprint response");
    assert_eq!(response.hostname, None);
}

/// A bad signature gets no response and the session stays unverified;
/// a follow-up GetData produces nothing.
#[tokio::test]
async fn invalid_signature_gets_silence() {
    let mut hub = TestHub::start().await;
    let identity = HubIdentity::generate();
    let (_registry, sessions, state, ip, _cancel) = start_manager(&hub.url(), &identity);
    state.set_metric("temperature", "temp1", 237.0);

    sessions.notify(&ip);
    let mut conn = hub.next_conn().await;

    let response = conn.check_fingerprint(&[0x42; 64], true).await;
    assert!(response.is_none());

    let session = sessions.session(&ip).unwrap();
    assert_ne!(session.phase(), SessionPhase::Verified);

    assert!(conn.get_data().await.is_none());
}

/// GetData before any verification is dropped.
#[tokio::test]
async fn get_data_before_verification_is_dropped() {
    let mut hub = TestHub::start().await;
    let identity = HubIdentity::generate();
    let (_registry, sessions, state, ip, _cancel) = start_manager(&hub.url(), &identity);
    state.set_metric("temperature", "temp1", 237.0);

    sessions.notify(&ip);
    let mut conn = hub.next_conn().await;

    assert!(conn.get_data().await.is_none());
}

/// A device with no readings answers GetData with nothing at all.
#[tokio::test]
async fn empty_snapshot_is_suppressed() {
    let mut hub = TestHub::start().await;
    let identity = HubIdentity::generate();
    let (_registry, sessions, _state, ip, _cancel) = start_manager(&hub.url(), &identity);

    sessions.notify(&ip);
    let mut conn = hub.next_conn().await;

    conn.check_fingerprint(&identity.sign(TOKEN), false)
        .await
        .expect("fingerprint response");

    assert!(conn.get_data().await.is_none());
}

/// Sessions answer pings with matching pongs.
#[tokio::test]
async fn ping_gets_pong() {
    let mut hub = TestHub::start().await;
    let identity = HubIdentity::generate();
    let (_registry, sessions, _state, ip, _cancel) = start_manager(&hub.url(), &identity);

    sessions.notify(&ip);
    let mut conn = hub.next_conn().await;

    let pong = conn.ping(b"keepalive").await.expect("pong");
    assert_eq!(pong, b"keepalive");
}

/// After the hub drops the transport, the session reconnects within
/// the delay, re-verifies with the same identity, and the next snapshot
/// includes values accumulated during the outage.
#[tokio::test]
async fn reconnect_preserves_identity_and_metrics() {
    let mut hub = TestHub::start().await;
    let identity = HubIdentity::generate();
    let (_registry, sessions, state, ip, _cancel) = start_manager(&hub.url(), &identity);
    state.set_metric("temperature", "temp1", 237.0);

    sessions.notify(&ip);
    let mut conn = hub.next_conn().await;
    let first = conn
        .check_fingerprint(&identity.sign(TOKEN), true)
        .await
        .expect("first verification");

    // Hub drops the connection.
    conn.close().await;

    // Data keeps accumulating while the session is down.
    state.set_metric("humidity", "h1", 40.0);

    // The session dials again after the (shortened) reconnect delay.
    let mut conn = hub.next_conn().await;

    // A fresh transport starts unverified.
    assert!(conn.get_data().await.is_none());

    let second = conn
        .check_fingerprint(&identity.sign(TOKEN), true)
        .await
        .expect("second verification");
    assert_eq!(second.fingerprint, first.fingerprint);
    assert_eq!(second.hostname, first.hostname);

    let data = conn.get_data().await.expect("combined data");
    assert_eq!(data.stats.temperatures.get("temp1"), Some(&237.0));
    assert_eq!(data.stats.humidity.get("h1"), Some(&40.0));
}

/// notify() is create-only: repeated hints never open extra sessions or
/// push frames.
#[tokio::test]
async fn notify_never_pushes() {
    let mut hub = TestHub::start().await;
    let identity = HubIdentity::generate();
    let (_registry, sessions, state, ip, _cancel) = start_manager(&hub.url(), &identity);
    state.set_metric("temperature", "temp1", 237.0);

    sessions.notify(&ip);
    let mut conn = hub.next_conn().await;
    conn.check_fingerprint(&identity.sign(TOKEN), false)
        .await
        .expect("verification");

    // More notifies while connected: no unsolicited frames arrive.
    sessions.notify(&ip);
    sessions.notify(&ip);
    assert_eq!(sessions.len(), 1);

    // Nothing shows up until the hub asks.
    assert!(conn.ping(b"x").await.is_some());
    let data = conn.get_data().await.expect("requested data");
    assert_eq!(data.stats.temperatures.get("temp1"), Some(&237.0));
}
