//! Hub protocol messages.
//!
//! Request/response over one WebSocket, hub-driven: the hub sends a
//! [`HubRequest`] envelope, the gateway answers with a
//! [`FingerprintResponse`] or [`CombinedData`] frame. Control envelopes use
//! integer keys; payload maps use the field names the dashboard knows.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{Error, Result, WireErrorKind};
use crate::hub::wire::{Reader, Writer};
use crate::mapping::Category;

/// Agent type reported to the hub for every device this gateway fronts.
pub const AGENT_TYPE: &str = "snmp";

/// Actions the hub may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubAction {
    /// Authenticate the hub and fetch the device fingerprint.
    CheckFingerprint,
    /// Fetch the current metric snapshot.
    GetData,
}

impl HubAction {
    /// Create from the wire value.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::CheckFingerprint),
            1 => Some(Self::GetData),
            _ => None,
        }
    }

    /// Get the wire value.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::CheckFingerprint => 0,
            Self::GetData => 1,
        }
    }
}

/// Inbound request envelope: `{ 0: action, 1: payload }`.
///
/// The payload stays raw until the action is known; unknown keys are
/// skipped so the hub can grow the envelope.
#[derive(Debug, Clone)]
pub struct HubRequest {
    /// Action discriminant (may be outside [`HubAction`]'s range).
    pub action: u8,
    /// Raw payload item; empty when the envelope had none.
    pub data: Bytes,
}

impl HubRequest {
    /// Decode from a binary frame.
    pub fn decode(frame: Bytes) -> Result<Self> {
        let mut r = Reader::new(frame);
        let pairs = r.read_map_len()?;

        let mut action = None;
        let mut data = Bytes::new();

        for _ in 0..pairs {
            match r.read_uint()? {
                0 => action = Some(r.read_uint()? as u8),
                1 => data = r.read_raw_item()?,
                _ => r.skip_item()?,
            }
        }

        let action =
            action.ok_or_else(|| Error::wire(0, WireErrorKind::MissingField("action")))?;
        Ok(Self { action, data })
    }

    /// Encode an envelope (used by tests standing in for the hub).
    pub fn encode(action: u8, payload: &[u8]) -> Bytes {
        let mut w = Writer::new();
        if payload.is_empty() {
            w.map(1);
            w.uint(0);
            w.uint(u64::from(action));
        } else {
            w.map(2);
            w.uint(0);
            w.uint(u64::from(action));
            w.uint(1);
            w.raw_item(payload);
        }
        w.finish()
    }
}

/// CheckFingerprint payload: `{ 0: signature, 1: need_sys_info }`.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintRequest {
    /// SSH signature over the token bytes.
    pub signature: Bytes,
    /// Whether the hub wants the hostname in the response.
    pub need_sys_info: bool,
}

impl FingerprintRequest {
    /// Decode from the request payload.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut r = Reader::new(data);
        let pairs = r.read_map_len()?;

        let mut signature = None;
        let mut need_sys_info = false;

        for _ in 0..pairs {
            match r.read_uint()? {
                0 => signature = Some(r.read_bytes()?),
                1 => need_sys_info = r.read_bool()?,
                _ => r.skip_item()?,
            }
        }

        let signature =
            signature.ok_or_else(|| Error::wire(0, WireErrorKind::MissingField("signature")))?;
        Ok(Self {
            signature,
            need_sys_info,
        })
    }

    /// Encode (tests standing in for the hub).
    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new();
        w.map(2);
        w.uint(0);
        w.bytes(&self.signature);
        w.uint(1);
        w.bool(self.need_sys_info);
        w.finish()
    }
}

/// Reply to CheckFingerprint: `{ 0: fingerprint, 1: hostname? }`.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintResponse {
    /// The device's stable identifier.
    pub fingerprint: String,
    /// Present only when the request set `need_sys_info`.
    pub hostname: Option<String>,
}

impl FingerprintResponse {
    /// Encode to a binary frame.
    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new();
        match &self.hostname {
            Some(hostname) => {
                w.map(2);
                w.uint(0);
                w.text(&self.fingerprint);
                w.uint(1);
                w.text(hostname);
            }
            None => {
                w.map(1);
                w.uint(0);
                w.text(&self.fingerprint);
            }
        }
        w.finish()
    }

    /// Decode (tests standing in for the hub).
    pub fn decode(frame: Bytes) -> Result<Self> {
        let mut r = Reader::new(frame);
        let pairs = r.read_map_len()?;

        let mut fingerprint = None;
        let mut hostname = None;

        for _ in 0..pairs {
            match r.read_uint()? {
                0 => fingerprint = Some(r.read_text()?),
                1 => hostname = Some(r.read_text()?),
                _ => r.skip_item()?,
            }
        }

        let fingerprint = fingerprint
            .ok_or_else(|| Error::wire(0, WireErrorKind::MissingField("fingerprint")))?;
        Ok(Self {
            fingerprint,
            hostname,
        })
    }
}

/// Sensor readings by category. Empty categories are not encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub temperatures: BTreeMap<String, f64>,
    pub humidity: BTreeMap<String, f64>,
    pub co2: BTreeMap<String, f64>,
    pub pressure: BTreeMap<String, f64>,
    pub pm25: BTreeMap<String, f64>,
    pub pm10: BTreeMap<String, f64>,
    pub voc: BTreeMap<String, f64>,
}

impl Stats {
    /// Wire field name for a category's sensor map.
    fn field_name(category: Category) -> &'static str {
        match category {
            Category::Temperature => "temperatures",
            Category::Humidity => "humidity",
            Category::Co2 => "co2",
            Category::Pressure => "pressure",
            Category::Pm25 => "pm25",
            Category::Pm10 => "pm10",
            Category::Voc => "voc",
        }
    }

    /// Borrow a category's sensor map.
    pub fn category(&self, category: Category) -> &BTreeMap<String, f64> {
        match category {
            Category::Temperature => &self.temperatures,
            Category::Humidity => &self.humidity,
            Category::Co2 => &self.co2,
            Category::Pressure => &self.pressure,
            Category::Pm25 => &self.pm25,
            Category::Pm10 => &self.pm10,
            Category::Voc => &self.voc,
        }
    }

    /// Mutably borrow a category's sensor map.
    pub fn category_mut(&mut self, category: Category) -> &mut BTreeMap<String, f64> {
        match category {
            Category::Temperature => &mut self.temperatures,
            Category::Humidity => &mut self.humidity,
            Category::Co2 => &mut self.co2,
            Category::Pressure => &mut self.pressure,
            Category::Pm25 => &mut self.pm25,
            Category::Pm10 => &mut self.pm10,
            Category::Voc => &mut self.voc,
        }
    }

    /// Check whether every category is empty.
    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|c| self.category(*c).is_empty())
    }

    fn encode_into(&self, w: &mut Writer) {
        let present: Vec<Category> = Category::ALL
            .into_iter()
            .filter(|c| !self.category(*c).is_empty())
            .collect();

        w.map(present.len());
        for category in present {
            w.text(Self::field_name(category));
            let values = self.category(category);
            w.map(values.len());
            for (name, value) in values {
                w.text(name);
                w.f64(*value);
            }
        }
    }

    fn decode_from(r: &mut Reader) -> Result<Self> {
        let mut stats = Self::default();
        let pairs = r.read_map_len()?;

        for _ in 0..pairs {
            let field = r.read_text()?;
            let target = Category::ALL
                .into_iter()
                .find(|c| Self::field_name(*c) == field);
            match target {
                Some(category) => {
                    let entries = r.read_map_len()?;
                    let map = stats.category_mut(category);
                    for _ in 0..entries {
                        let name = r.read_text()?;
                        let value = r.read_f64()?;
                        map.insert(name, value);
                    }
                }
                None => r.skip_item()?,
            }
        }

        Ok(stats)
    }
}

/// Device description and dashboard summary scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    pub hostname: String,
    pub agent_version: String,
    pub agent_type: String,
    pub dashboard_temp: Option<f64>,
    pub dashboard_humidity: Option<f64>,
    pub dashboard_co2: Option<f64>,
    pub dashboard_pressure: Option<f64>,
    pub dashboard_pm25: Option<f64>,
    pub dashboard_pm10: Option<f64>,
    pub dashboard_voc: Option<f64>,
}

impl Info {
    /// Create with the gateway's fixed agent type.
    pub fn new(hostname: String, agent_version: String) -> Self {
        Self {
            hostname,
            agent_version,
            agent_type: AGENT_TYPE.to_string(),
            dashboard_temp: None,
            dashboard_humidity: None,
            dashboard_co2: None,
            dashboard_pressure: None,
            dashboard_pm25: None,
            dashboard_pm10: None,
            dashboard_voc: None,
        }
    }

    fn dashboard_field(category: Category) -> &'static str {
        match category {
            Category::Temperature => "dashboard_temp",
            Category::Humidity => "dashboard_humidity",
            Category::Co2 => "dashboard_co2",
            Category::Pressure => "dashboard_pressure",
            Category::Pm25 => "dashboard_pm25",
            Category::Pm10 => "dashboard_pm10",
            Category::Voc => "dashboard_voc",
        }
    }

    /// Borrow a dashboard scalar.
    pub fn dashboard(&self, category: Category) -> Option<f64> {
        match category {
            Category::Temperature => self.dashboard_temp,
            Category::Humidity => self.dashboard_humidity,
            Category::Co2 => self.dashboard_co2,
            Category::Pressure => self.dashboard_pressure,
            Category::Pm25 => self.dashboard_pm25,
            Category::Pm10 => self.dashboard_pm10,
            Category::Voc => self.dashboard_voc,
        }
    }

    /// Mutably borrow a dashboard scalar.
    pub fn dashboard_mut(&mut self, category: Category) -> &mut Option<f64> {
        match category {
            Category::Temperature => &mut self.dashboard_temp,
            Category::Humidity => &mut self.dashboard_humidity,
            Category::Co2 => &mut self.dashboard_co2,
            Category::Pressure => &mut self.dashboard_pressure,
            Category::Pm25 => &mut self.dashboard_pm25,
            Category::Pm10 => &mut self.dashboard_pm10,
            Category::Voc => &mut self.dashboard_voc,
        }
    }

    fn encode_into(&self, w: &mut Writer) {
        let scalars: Vec<Category> = Category::ALL
            .into_iter()
            .filter(|c| self.dashboard(*c).is_some())
            .collect();

        w.map(3 + scalars.len());
        w.text("hostname");
        w.text(&self.hostname);
        w.text("agent_version");
        w.text(&self.agent_version);
        w.text("agent_type");
        w.text(&self.agent_type);
        for category in scalars {
            w.text(Self::dashboard_field(category));
            w.f64(self.dashboard(category).unwrap_or_default());
        }
    }

    fn decode_from(r: &mut Reader) -> Result<Self> {
        let mut info = Self::new(String::new(), String::new());
        info.agent_type = String::new();
        let pairs = r.read_map_len()?;

        for _ in 0..pairs {
            let field = r.read_text()?;
            match field.as_str() {
                "hostname" => info.hostname = r.read_text()?,
                "agent_version" => info.agent_version = r.read_text()?,
                "agent_type" => info.agent_type = r.read_text()?,
                other => {
                    let target = Category::ALL
                        .into_iter()
                        .find(|c| Self::dashboard_field(*c) == other);
                    match target {
                        Some(category) => *info.dashboard_mut(category) = Some(r.read_f64()?),
                        None => r.skip_item()?,
                    }
                }
            }
        }

        Ok(info)
    }
}

/// The full data frame: `{ 0: stats, 1: info }`.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedData {
    pub stats: Stats,
    pub info: Info,
}

impl CombinedData {
    /// Encode to a binary frame.
    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new();
        w.map(2);
        w.uint(0);
        self.stats.encode_into(&mut w);
        w.uint(1);
        self.info.encode_into(&mut w);
        w.finish()
    }

    /// Decode (tests standing in for the hub).
    pub fn decode(frame: Bytes) -> Result<Self> {
        let mut r = Reader::new(frame);
        let pairs = r.read_map_len()?;

        let mut stats = None;
        let mut info = None;

        for _ in 0..pairs {
            match r.read_uint()? {
                0 => stats = Some(Stats::decode_from(&mut r)?),
                1 => info = Some(Info::decode_from(&mut r)?),
                _ => r.skip_item()?,
            }
        }

        Ok(Self {
            stats: stats.ok_or_else(|| Error::wire(0, WireErrorKind::MissingField("stats")))?,
            info: info.ok_or_else(|| Error::wire(0, WireErrorKind::MissingField("info")))?,
        })
    }
}
