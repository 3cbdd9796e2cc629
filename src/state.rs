//! Per-device state.
//!
//! One [`DeviceState`] per source IP: immutable identity (fingerprint,
//! hostname) plus the last-observed value per sensor, guarded by a mutex.
//! Trap and poll writers both go through [`set_metric`]; last writer wins.
//! Outbound payloads are built by [`snapshot`], which copies everything out
//! under the lock so the hub never sees a torn update.
//!
//! [`set_metric`]: DeviceState::set_metric
//! [`snapshot`]: DeviceState::snapshot

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::hub::protocol::{CombinedData, Info, Stats};
use crate::mapping::Category;
use crate::util::encode_hex;

/// Mutable per-device record.
pub struct DeviceState {
    ip: IpAddr,
    fingerprint: String,
    hostname: String,
    metrics: Mutex<BTreeMap<Category, BTreeMap<String, f64>>>,
}

impl DeviceState {
    /// Create a state with a fixed identity.
    pub fn new(ip: IpAddr, fingerprint: String, hostname: String) -> Self {
        Self {
            ip,
            fingerprint,
            hostname,
            metrics: Mutex::new(BTreeMap::new()),
        }
    }

    /// Source IP.
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Stable 48-hex-character identifier.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Human-readable label.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Upsert a sensor reading.
    ///
    /// The category string is normalized; readings for categories outside
    /// the closed set are dropped. Returns whether the reading was retained.
    pub fn set_metric(&self, category: &str, name: &str, value: f64) -> bool {
        let Some(category) = Category::parse(category) else {
            return false;
        };
        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
        metrics
            .entry(category)
            .or_default()
            .insert(name.to_string(), value);
        true
    }

    /// Current value of one sensor (tests and diagnostics).
    pub fn metric(&self, category: Category, name: &str) -> Option<f64> {
        let metrics = self.metrics.lock().expect("metrics lock poisoned");
        metrics.get(&category).and_then(|m| m.get(name)).copied()
    }

    /// Build the outbound payload from a consistent view of the metrics.
    ///
    /// Returns `None` when no category has any reading; an empty snapshot is
    /// never sent.
    pub fn snapshot(&self, agent_version: &str) -> Option<CombinedData> {
        let metrics = self.metrics.lock().expect("metrics lock poisoned");

        if metrics.values().all(BTreeMap::is_empty) {
            return None;
        }

        let mut stats = Stats::default();
        for (category, values) in metrics.iter() {
            if values.is_empty() {
                continue;
            }
            *stats.category_mut(*category) = values.clone();
        }
        drop(metrics);

        let mut info = Info::new(self.hostname.clone(), agent_version.to_string());
        for category in Category::ALL {
            let values = stats.category(category);
            if values.is_empty() {
                continue;
            }
            // Pressure sensors correlate; the rest summarize as the worst case.
            let summary = match category {
                Category::Pressure => mean_of(values),
                _ => max_of(values),
            };
            *info.dashboard_mut(category) = Some(summary);
        }

        Some(CombinedData { stats, info })
    }
}

impl std::fmt::Debug for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceState")
            .field("ip", &self.ip)
            .field("fingerprint", &self.fingerprint)
            .field("hostname", &self.hostname)
            .finish_non_exhaustive()
    }
}

/// Derive the stable device fingerprint.
///
/// The identity base is the expanded fingerprint template when one is
/// configured, else `"<sysName>-<ip>"` when the device told us its name,
/// else the bare IP. SHA-256, first 24 bytes, lowercase hex.
pub fn derive_fingerprint(ip: &IpAddr, sys_name: &str, template: &str) -> String {
    let base = if !template.is_empty() {
        expand_template(template, ip, sys_name)
    } else if !sys_name.is_empty() {
        format!("{sys_name}-{ip}")
    } else {
        ip.to_string()
    };

    let digest = Sha256::digest(base.as_bytes());
    encode_hex(&digest[..24])
}

/// Substitute `%IP%` and `%sysName%` in an identity template.
pub fn expand_template(template: &str, ip: &IpAddr, sys_name: &str) -> String {
    template
        .replace("%IP%", &ip.to_string())
        .replace("%sysName%", sys_name)
}

fn max_of(values: &BTreeMap<String, f64>) -> f64 {
    values.values().copied().fold(f64::MIN, f64::max)
}

fn mean_of(values: &BTreeMap<String, f64>) -> f64 {
    let sum: f64 = values.values().sum();
    sum / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DeviceState {
        let ip: IpAddr = "192.168.1.10".parse().unwrap();
        let fp = derive_fingerprint(&ip, "sw-a", "snmp-%IP%");
        DeviceState::new(ip, fp, "sw-a".to_string())
    }

    #[test]
    fn fingerprint_is_stable_and_48_hex() {
        let ip: IpAddr = "192.168.1.10".parse().unwrap();
        let a = derive_fingerprint(&ip, "sw-a", "snmp-%IP%");
        let b = derive_fingerprint(&ip, "sw-a", "snmp-%IP%");
        assert_eq!(a, b);
        assert_eq!(a.len(), 48);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprint_matches_known_digest() {
        // sha256("snmp-192.168.1.10") truncated to 24 bytes.
        let ip: IpAddr = "192.168.1.10".parse().unwrap();
        let expected = {
            let digest = Sha256::digest(b"snmp-192.168.1.10");
            encode_hex(&digest[..24])
        };
        assert_eq!(derive_fingerprint(&ip, "ignored", "snmp-%IP%"), expected);
    }

    #[test]
    fn fingerprint_base_fallbacks() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        // With a sysName but no template: "<sysName>-<ip>".
        let with_name = derive_fingerprint(&ip, "pdu-1", "");
        let expected = encode_hex(&Sha256::digest(b"pdu-1-10.0.0.1")[..24]);
        assert_eq!(with_name, expected);

        // Neither: bare IP.
        let bare = derive_fingerprint(&ip, "", "");
        let expected = encode_hex(&Sha256::digest(b"10.0.0.1")[..24]);
        assert_eq!(bare, expected);
    }

    #[test]
    fn template_expansion() {
        let ip: IpAddr = "192.168.1.10".parse().unwrap();
        assert_eq!(
            expand_template("%sysName% (%IP%)", &ip, "sw-a"),
            "sw-a (192.168.1.10)"
        );
        // Missing sysName substitutes empty.
        assert_eq!(expand_template("h-%sysName%", &ip, ""), "h-");
    }

    #[test]
    fn unknown_categories_are_dropped() {
        let state = state();
        assert!(state.set_metric("temperature", "t1", 23.7));
        assert!(state.set_metric("TEMP", "t2", 24.0));
        assert!(!state.set_metric("fanspeed", "f1", 9000.0));
        assert!(!state.set_metric("", "x", 1.0));

        assert_eq!(state.metric(Category::Temperature, "t1"), Some(23.7));
        assert_eq!(state.metric(Category::Temperature, "t2"), Some(24.0));
    }

    #[test]
    fn last_writer_wins() {
        let state = state();
        state.set_metric("temperature", "t1", 20.0);
        state.set_metric("t", "t1", 25.0);
        assert_eq!(state.metric(Category::Temperature, "t1"), Some(25.0));
    }

    #[test]
    fn empty_snapshot_is_none() {
        assert!(state().snapshot("0.0.0").is_none());
    }

    #[test]
    fn snapshot_carries_values_and_identity() {
        let state = state();
        state.set_metric("temperature", "t1", 23.7);
        state.set_metric("humidity", "h1", 40.0);

        let data = state.snapshot("0.3.1").unwrap();
        assert_eq!(data.stats.temperatures.get("t1"), Some(&23.7));
        assert_eq!(data.stats.humidity.get("h1"), Some(&40.0));
        assert!(data.stats.co2.is_empty());
        assert_eq!(data.info.hostname, "sw-a");
        assert_eq!(data.info.agent_version, "0.3.1");
        assert_eq!(data.info.agent_type, "snmp");
    }

    #[test]
    fn dashboard_max_and_pressure_mean() {
        let state = state();
        state.set_metric("temperature", "t1", 20.0);
        state.set_metric("temperature", "t2", 30.0);
        state.set_metric("pressure", "p1", 1000.0);
        state.set_metric("pressure", "p2", 1010.0);
        state.set_metric("co2", "c1", 450.0);

        let data = state.snapshot("0.0.0").unwrap();
        assert_eq!(data.info.dashboard_temp, Some(30.0));
        assert_eq!(data.info.dashboard_pressure, Some(1005.0));
        assert_eq!(data.info.dashboard_co2, Some(450.0));
        assert_eq!(data.info.dashboard_voc, None);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let state = state();
        state.set_metric("temperature", "t1", 20.0);
        let data = state.snapshot("0.0.0").unwrap();

        state.set_metric("temperature", "t1", 99.0);
        assert_eq!(data.stats.temperatures.get("t1"), Some(&20.0));
    }
}
