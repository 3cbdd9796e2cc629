//! Gateway configuration.
//!
//! Loaded once from a JSON file at startup; hub credentials and defaults may
//! fall back to `SNMPGW_*` environment variables. File values win. The
//! loaded value is immutable; runtime replacement goes through
//! [`ConfigHandle::swap`] and running tasks keep the snapshot they captured.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Hub endpoint credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubConfig {
    /// Hub base URL (`http`/`https`; upgraded to a WebSocket).
    #[serde(default)]
    pub url: String,
    /// Registration token. The hub signs these bytes to authenticate itself.
    #[serde(default)]
    pub token: String,
    /// Hub public key, one SSH authorized-key line.
    #[serde(default)]
    pub key: String,
}

/// Gateway-wide defaults. Zero/empty means "unset" and is filled during
/// finalization, the same convention the JSON file uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub send_interval_sec: u64,
    #[serde(default)]
    pub poll_interval_sec: u64,
    /// UDP trap listener address; `:PORT` shorthand binds all interfaces.
    #[serde(default)]
    pub listen_addr: String,
    #[serde(default)]
    pub communities: Vec<String>,
    /// Round forwarded values to one decimal place.
    #[serde(default, rename = "round1")]
    pub round_to_one_decimal: bool,
    /// Log samples that match no OID map entry.
    #[serde(default)]
    pub log_unknown: bool,
}

/// One OID mapping: where a raw SNMP value lands and how it is scaled.
#[derive(Debug, Clone, Deserialize)]
pub struct OidMap {
    /// Sensor name, unique within its category.
    pub name: String,
    /// Display unit, informational only.
    #[serde(default)]
    pub unit: String,
    /// Target category (see [`crate::mapping::Category`]).
    #[serde(default)]
    pub category: String,
    /// Divisor applied to the raw value; 0 means 1.
    #[serde(default)]
    pub scale: f64,
}

/// IP match criteria for a device rule.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceMatch {
    /// Regex over the textual IP. Empty matches any address.
    #[serde(default)]
    pub ip_regex: String,
}

/// One device rule; rules are evaluated in order, first hit wins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceRule {
    #[serde(default, rename = "match")]
    pub match_rule: DeviceMatch,
    /// Fingerprint template; `%IP%` and `%sysName%` are substituted.
    #[serde(default, rename = "fingerprint")]
    pub fingerprint_template: String,
    /// Hostname template, same placeholders.
    #[serde(default)]
    pub hostname_template: String,
    /// Whether to run a poll loop for devices matched by this rule.
    #[serde(default)]
    pub poll: bool,
    #[serde(default)]
    pub poll_interval_sec: u64,
    /// SNMP agent port on matched devices; 0 means the standard 161.
    #[serde(default)]
    pub snmp_port: u16,
    #[serde(default)]
    pub communities: Vec<String>,
    /// OID (with or without leading dot) to mapping.
    #[serde(default)]
    pub oids: HashMap<String, OidMap>,

    /// Compiled from `match.ip_regex` during finalization.
    #[serde(skip)]
    pub(crate) ip_regex: Option<Regex>,
}

impl DeviceRule {
    /// Check whether this rule applies to the given IP text.
    pub fn matches(&self, ip: &str) -> bool {
        match &self.ip_regex {
            Some(re) => re.is_match(ip),
            None => true,
        }
    }

    /// Community used when polling a device matched by this rule.
    pub fn first_community(&self) -> &str {
        self.communities.first().map(String::as_str).unwrap_or("public")
    }

    /// Poll interval for this rule.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_sec)
    }
}

/// Parsed, validated gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub devices: Vec<DeviceRule>,
}

impl Config {
    /// Load from a JSON file, fill gaps from the environment, finalize.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Parse from a JSON string, fill gaps from the environment, finalize.
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: Config =
            serde_json::from_str(raw).map_err(|e| Error::Config(format!("invalid JSON: {e}")))?;
        config.fill_from_env();
        config.finalize()?;
        Ok(config)
    }

    /// Fill unset fields from `SNMPGW_*` environment variables.
    fn fill_from_env(&mut self) {
        fn env(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        }

        if self.hub.url.is_empty() {
            self.hub.url = env("SNMPGW_HUB_URL").unwrap_or_default();
        }
        if self.hub.token.is_empty() {
            self.hub.token = env("SNMPGW_HUB_TOKEN").unwrap_or_default();
        }
        if self.hub.key.is_empty() {
            self.hub.key = env("SNMPGW_HUB_KEY").unwrap_or_default();
        }
        if self.defaults.listen_addr.is_empty() {
            self.defaults.listen_addr = env("SNMPGW_LISTEN_ADDR").unwrap_or_default();
        }
        if self.defaults.send_interval_sec == 0 {
            if let Some(v) = env("SNMPGW_SEND_INTERVAL_SEC").and_then(|v| v.parse().ok()) {
                self.defaults.send_interval_sec = v;
            }
        }
        if self.defaults.poll_interval_sec == 0 {
            if let Some(v) = env("SNMPGW_POLL_INTERVAL_SEC").and_then(|v| v.parse().ok()) {
                self.defaults.poll_interval_sec = v;
            }
        }
        if self.defaults.communities.is_empty() {
            if let Some(v) = env("SNMPGW_COMMUNITIES") {
                self.defaults.communities =
                    v.split(',').map(|s| s.trim().to_string()).collect();
            }
        }
        if !self.defaults.round_to_one_decimal {
            if let Some(v) = env("SNMPGW_ROUND1") {
                self.defaults.round_to_one_decimal = matches!(v.as_str(), "1" | "true" | "TRUE");
            }
        }
        if !self.defaults.log_unknown {
            if let Some(v) = env("SNMPGW_LOG_UNKNOWN") {
                self.defaults.log_unknown = matches!(v.as_str(), "1" | "true" | "TRUE");
            }
        }
    }

    /// Fill remaining defaults, compile regexes, propagate per-device
    /// fallbacks. Called by [`load`](Self::load); tests building configs by
    /// hand call it directly.
    pub fn finalize(&mut self) -> Result<()> {
        if self.defaults.send_interval_sec == 0 {
            self.defaults.send_interval_sec = 10;
        }
        if self.defaults.poll_interval_sec == 0 {
            self.defaults.poll_interval_sec = 30;
        }
        if self.defaults.listen_addr.is_empty() {
            self.defaults.listen_addr = ":9162".to_string();
        }
        if self.defaults.communities.is_empty() {
            self.defaults.communities = vec!["public".to_string()];
        }

        for (i, device) in self.devices.iter_mut().enumerate() {
            if device.poll_interval_sec == 0 {
                device.poll_interval_sec = self.defaults.poll_interval_sec;
            }
            if device.snmp_port == 0 {
                device.snmp_port = 161;
            }
            if device.communities.is_empty() {
                device.communities = self.defaults.communities.clone();
            }
            if !device.match_rule.ip_regex.is_empty() {
                let re = Regex::new(&device.match_rule.ip_regex).map_err(|e| {
                    Error::Config(format!("bad ip_regex for device {i}: {e}"))
                })?;
                device.ip_regex = Some(re);
            }
        }

        Ok(())
    }

    /// Require the hub credentials a running gateway needs.
    ///
    /// Trap ingestion and polling work without a hub, but a production
    /// gateway without one is a misconfiguration, so the binary treats
    /// missing credentials as fatal.
    pub fn require_hub(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.hub.url.trim().is_empty() {
            missing.push("hub.url");
        }
        if self.hub.token.trim().is_empty() {
            missing.push("hub.token");
        }
        if self.hub.key.trim().is_empty() {
            missing.push("hub.key");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing {}", missing.join(", "))))
        }
    }

    /// First device rule matching the IP text, if any.
    pub fn match_device(&self, ip: &str) -> Option<&DeviceRule> {
        self.devices.iter().find(|d| d.matches(ip))
    }

    /// First poll-enabled rule matching the IP text, if any.
    pub fn first_poll_rule(&self, ip: &str) -> Option<&DeviceRule> {
        self.devices.iter().find(|d| d.poll && d.matches(ip))
    }

    /// How often the hub is expected to ask for data.
    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.defaults.send_interval_sec)
    }
}

/// Shared, atomically swappable configuration.
///
/// `load()` hands out the current `Arc<Config>`; tasks capture one per
/// tick/packet and never hold it across a swap boundary.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl ConfigHandle {
    /// Wrap an initial configuration.
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Get the current snapshot.
    pub fn load(&self) -> Arc<Config> {
        self.inner.read().expect("config lock poisoned").clone()
    }

    /// Replace the configuration. In-flight tasks keep their snapshot.
    pub fn swap(&self, config: Config) {
        *self.inner.write().expect("config lock poisoned") = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "hub": { "url": "https://hub.example", "token": "tok", "key": "ssh-ed25519 AAAA test" },
        "defaults": { "round1": true },
        "devices": [
            {
                "match": { "ip_regex": "192\\.168\\.1\\..*" },
                "fingerprint": "snmp-%IP%",
                "hostname_template": "%sysName%",
                "poll": true,
                "oids": {
                    ".1.3.6.1.4.1.9.9.13.1.3.1.3.0": { "name": "temp1", "category": "temperature", "scale": 1 }
                }
            },
            { "communities": ["lab"], "oids": {} }
        ]
    }"#;

    #[test]
    fn defaults_are_filled() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.defaults.send_interval_sec, 10);
        assert_eq!(config.defaults.poll_interval_sec, 30);
        assert_eq!(config.defaults.listen_addr, ":9162");
        assert_eq!(config.defaults.communities, vec!["public"]);
        assert!(config.defaults.round_to_one_decimal);
    }

    #[test]
    fn device_fallbacks_propagate() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.devices[0].poll_interval_sec, 30);
        assert_eq!(config.devices[0].communities, vec!["public"]);
        // Explicit communities are kept.
        assert_eq!(config.devices[1].communities, vec!["lab"]);
    }

    #[test]
    fn first_hit_matching() {
        let config = Config::from_json(SAMPLE).unwrap();

        // 192.168.1.x hits the regex rule.
        let rule = config.match_device("192.168.1.10").unwrap();
        assert_eq!(rule.fingerprint_template, "snmp-%IP%");

        // Anything else falls through to the catch-all second rule.
        let rule = config.match_device("10.0.0.1").unwrap();
        assert!(rule.fingerprint_template.is_empty());
    }

    #[test]
    fn poll_rule_requires_poll_flag() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert!(config.first_poll_rule("192.168.1.10").is_some());
        // Second rule matches 10.x but has poll=false.
        assert!(config.first_poll_rule("10.0.0.1").is_none());
    }

    #[test]
    fn bad_regex_is_fatal() {
        let raw = r#"{ "devices": [ { "match": { "ip_regex": "(" } } ] }"#;
        match Config::from_json(raw) {
            Err(Error::Config(msg)) => assert!(msg.contains("device 0"), "{msg}"),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_fatal() {
        assert!(matches!(Config::from_json("{"), Err(Error::Config(_))));
    }

    #[test]
    fn require_hub_names_missing_fields() {
        let config = Config::from_json(r#"{ "hub": { "url": "http://h" } }"#).unwrap();
        match config.require_hub() {
            Err(Error::Config(msg)) => {
                assert!(msg.contains("hub.token"));
                assert!(msg.contains("hub.key"));
                assert!(!msg.contains("hub.url"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn handle_swap_is_atomic_for_holders() {
        let handle = ConfigHandle::new(Config::from_json(SAMPLE).unwrap());
        let before = handle.load();

        let mut next = Config::default();
        next.finalize().unwrap();
        handle.swap(next);

        // The captured snapshot is unchanged; new loads see the swap.
        assert_eq!(before.devices.len(), 2);
        assert!(handle.load().devices.is_empty());
    }
}
