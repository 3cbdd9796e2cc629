//! # snmp-gateway
//!
//! SNMP sensor-ingest gateway: receives SNMPv2c traps, polls devices for
//! configured OIDs, and fronts each device to a monitoring hub as its own
//! authenticated WebSocket session.
//!
//! ## Data flow
//!
//! ```text
//! SNMP device --(trap/poll)--> value pipeline --> device state
//!                                                     |
//!                         hub --(GetData)--> session -+--> CombinedData
//! ```
//!
//! The hub drives every send: sessions authenticate it by SSH signature
//! over the shared token, then answer `GetData` requests with a snapshot
//! of the device's last-observed values. Nothing is pushed unsolicited and
//! empty snapshots are suppressed.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use snmp_gateway::{Agent, Config};
//!
//! #[tokio::main]
//! async fn main() -> snmp_gateway::Result<()> {
//!     let config = Config::load("gateway.json")?;
//!     config.require_hub()?;
//!
//!     let agent = Agent::new(config);
//!     agent.run().await
//! }
//! ```

pub mod agent;
pub mod ber;
pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod mapping;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod poller;
pub mod registry;
pub mod state;
pub mod trap;
pub mod value;
pub mod varbind;

pub(crate) mod util;

// Re-exports for convenience
pub use agent::Agent;
pub use client::{ClientConfig, SnmpClient};
pub use config::{Config, ConfigHandle};
pub use error::{DecodeErrorKind, Error, ErrorStatus, Result, WireErrorKind};
pub use hub::{HubEndpoint, Session, SessionManager, SessionPhase, SessionTiming};
pub use mapping::Category;
pub use message::{CommunityMessage, Version};
pub use oid::Oid;
pub use pdu::{Pdu, PduType};
pub use poller::PollerPool;
pub use registry::Registry;
pub use state::{derive_fingerprint, DeviceState};
pub use trap::TrapReceiver;
pub use value::Value;
pub use varbind::VarBind;

/// Gateway version, reported to the hub in the `X-Beszel` header and in
/// every `Info` payload.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hex encoding helper, exposed for tests and tooling.
pub use util::encode_hex;
