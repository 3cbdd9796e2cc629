//! Value pipeline: category routing, OID-map lookup, value transform.
//!
//! Pure functions between the SNMP layer and device state. Anything that
//! falls out of this pipeline is dropped, not errored.

use crate::config::{Config, OidMap};

/// The closed set of sensor categories the gateway forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Temperature,
    Humidity,
    Co2,
    Pressure,
    Pm25,
    Pm10,
    Voc,
}

impl Category {
    /// Parse a configured category string, case-insensitive, accepting the
    /// short aliases device configs commonly use.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "temperature" | "temp" | "t" => Some(Self::Temperature),
            "humidity" | "hum" | "h" => Some(Self::Humidity),
            "co2" => Some(Self::Co2),
            "pressure" | "press" | "pr" => Some(Self::Pressure),
            "pm25" => Some(Self::Pm25),
            "pm10" => Some(Self::Pm10),
            "voc" => Some(Self::Voc),
            _ => None,
        }
    }

    /// Canonical name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Co2 => "co2",
            Self::Pressure => "pressure",
            Self::Pm25 => "pm25",
            Self::Pm10 => "pm10",
            Self::Voc => "voc",
        }
    }

    /// All categories, in wire order.
    pub const ALL: [Category; 7] = [
        Self::Temperature,
        Self::Humidity,
        Self::Co2,
        Self::Pressure,
        Self::Pm25,
        Self::Pm10,
        Self::Voc,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Find the OID mapping for a value observed from `ip`.
///
/// Scans device rules in order; for each rule whose IP regex matches (or is
/// absent), the OID is looked up both without and with its leading dot, so
/// the config can spell OIDs either way. First hit wins.
pub fn find_oid_map<'a>(config: &'a Config, ip: &str, oid: &str) -> Option<&'a OidMap> {
    let no_dot = oid.strip_prefix('.').unwrap_or(oid);
    let with_dot = format!(".{no_dot}");

    for device in &config.devices {
        if !device.matches(ip) {
            continue;
        }
        if let Some(map) = device.oids.get(no_dot) {
            return Some(map);
        }
        if let Some(map) = device.oids.get(with_dot.as_str()) {
            return Some(map);
        }
    }
    None
}

/// Whether a mapped value should be forwarded to the hub.
pub fn should_forward(map: &OidMap) -> bool {
    Category::parse(&map.category).is_some()
}

/// Scale and optionally round a raw value.
///
/// `scale == 0` divides by 1. Rounding is half-away-from-zero to one
/// decimal place (`f64::round` semantics).
pub fn transform(value: f64, scale: f64, round_to_one_decimal: bool) -> f64 {
    let scale = if scale == 0.0 { 1.0 } else { scale };
    let scaled = value / scale;
    if round_to_one_decimal {
        (scaled * 10.0).round() / 10.0
    } else {
        scaled
    }
}

/// Log a sample that matched no OID map entry, when enabled.
pub fn log_unknown_oid(oid: &str, value: &crate::value::Value, enabled: bool) {
    if enabled {
        tracing::info!(snmp.oid = %oid, snmp.value = %value, "unknown OID");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn sample_config() -> Config {
        Config::from_json(
            r#"{
                "devices": [
                    {
                        "match": { "ip_regex": "192\\.168\\.1\\..*" },
                        "oids": {
                            ".1.3.6.1.4.1.9.9.13.1.3.1.3.0": { "name": "temp1", "category": "temperature", "scale": 10 }
                        }
                    },
                    {
                        "oids": {
                            "1.3.6.1.4.1.9.9.13.1.3.1.3.0": { "name": "other", "category": "humidity", "scale": 1 }
                        }
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn category_aliases() {
        for (alias, expected) in [
            ("temperature", Category::Temperature),
            ("TEMP", Category::Temperature),
            ("t", Category::Temperature),
            ("Humidity", Category::Humidity),
            ("hum", Category::Humidity),
            ("h", Category::Humidity),
            ("co2", Category::Co2),
            ("CO2", Category::Co2),
            ("pressure", Category::Pressure),
            ("press", Category::Pressure),
            ("pr", Category::Pressure),
            ("pm25", Category::Pm25),
            ("pm10", Category::Pm10),
            ("voc", Category::Voc),
        ] {
            assert_eq!(Category::parse(alias), Some(expected), "{alias}");
        }
        assert_eq!(Category::parse("fanspeed"), None);
        assert_eq!(Category::parse(""), None);
    }

    #[test]
    fn lookup_tolerates_leading_dot() {
        let config = sample_config();

        // Config key has a dot; query without one still hits.
        let map = find_oid_map(&config, "192.168.1.10", "1.3.6.1.4.1.9.9.13.1.3.1.3.0").unwrap();
        assert_eq!(map.name, "temp1");

        // Config key without a dot; query with one still hits.
        let map = find_oid_map(&config, "10.0.0.5", ".1.3.6.1.4.1.9.9.13.1.3.1.3.0").unwrap();
        assert_eq!(map.name, "other");
    }

    #[test]
    fn first_matching_rule_wins() {
        let config = sample_config();
        // 192.168.1.x matches rule 0 first even though rule 1 also has the OID.
        let map = find_oid_map(&config, "192.168.1.7", ".1.3.6.1.4.1.9.9.13.1.3.1.3.0").unwrap();
        assert_eq!(map.name, "temp1");
    }

    #[test]
    fn unknown_oid_is_none() {
        let config = sample_config();
        assert!(find_oid_map(&config, "192.168.1.7", ".1.3.6.1.9.9.9").is_none());
    }

    #[test]
    fn forward_filter() {
        let mut map = sample_config().devices[0]
            .oids
            .values()
            .next()
            .unwrap()
            .clone();
        assert!(should_forward(&map));
        map.category = "fanspeed".into();
        assert!(!should_forward(&map));
    }

    #[test]
    fn transform_scale_and_round() {
        // Scale 10, rounding on.
        assert_eq!(transform(237.0, 10.0, true), 23.7);
        // Rounding off, fractional scale multiplies.
        assert_eq!(transform(237.0, 0.1, false), 2370.0);
        // Zero scale divides by 1.
        assert_eq!(transform(237.0, 0.0, true), 237.0);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(transform(2.25, 1.0, true), 2.3);
        assert_eq!(transform(-2.25, 1.0, true), -2.3);
        assert_eq!(transform(2.24, 1.0, true), 2.2);
    }
}
