//! Device registry.
//!
//! Process-wide map from source IP to device state. Keys are the canonical
//! textual form of the parsed address (lowercase, bracketless), so every
//! spelling of the same IPv6 address collapses to one entry.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use crate::state::DeviceState;

/// Concurrent IP -> device state map. States are never removed.
#[derive(Default)]
pub struct Registry {
    devices: RwLock<HashMap<String, Arc<DeviceState>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the state for an IP, if present.
    pub fn get(&self, ip: &IpAddr) -> Option<Arc<DeviceState>> {
        let devices = self.devices.read().expect("registry lock poisoned");
        devices.get(&ip.to_string()).cloned()
    }

    /// Insert a state, keyed by its own IP. Replaces any previous entry.
    pub fn insert(&self, state: Arc<DeviceState>) {
        let key = state.ip().to_string();
        let mut devices = self.devices.write().expect("registry lock poisoned");
        devices.insert(key, state);
    }

    /// Get the state for an IP, inserting the one built by `make` if absent.
    ///
    /// The winner under a racing insert is whichever writer got the lock
    /// first; the loser's state is discarded, keeping exactly one state per
    /// IP.
    pub fn get_or_insert_with(
        &self,
        ip: &IpAddr,
        make: impl FnOnce() -> DeviceState,
    ) -> (Arc<DeviceState>, bool) {
        if let Some(existing) = self.get(ip) {
            return (existing, false);
        }
        let mut devices = self.devices.write().expect("registry lock poisoned");
        match devices.get(&ip.to_string()) {
            Some(existing) => (existing.clone(), false),
            None => {
                let state = Arc::new(make());
                devices.insert(ip.to_string(), state.clone());
                (state, true)
            }
        }
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.read().expect("registry lock poisoned").len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::derive_fingerprint;

    fn make_state(ip: IpAddr) -> DeviceState {
        let fp = derive_fingerprint(&ip, "", "");
        DeviceState::new(ip, fp, ip.to_string())
    }

    #[test]
    fn get_after_insert() {
        let registry = Registry::new();
        let ip: IpAddr = "192.168.1.10".parse().unwrap();

        assert!(registry.get(&ip).is_none());
        registry.insert(Arc::new(make_state(ip)));

        let state = registry.get(&ip).unwrap();
        assert_eq!(state.ip(), ip);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn one_state_per_ip() {
        let registry = Registry::new();
        let ip: IpAddr = "192.168.1.10".parse().unwrap();

        let (first, created) = registry.get_or_insert_with(&ip, || make_state(ip));
        assert!(created);
        let (second, created) = registry.get_or_insert_with(&ip, || make_state(ip));
        assert!(!created);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn ipv6_spellings_collapse() {
        let registry = Registry::new();
        let canonical: IpAddr = "2001:db8::1".parse().unwrap();
        registry.insert(Arc::new(make_state(canonical)));

        // A non-compressed spelling parses to the same address.
        let alt: IpAddr = "2001:0db8:0000:0000:0000:0000:0000:0001".parse().unwrap();
        assert!(registry.get(&alt).is_some());
        assert_eq!(registry.len(), 1);
    }
}
