//! Inbound loop measurement and the coordinate pair it carries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A `(lon, lat)` pair, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinates {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Catalog geopoint encoding: `"lon, lat"`.
    pub fn geopoint(&self) -> String {
        format!("{}, {}", self.lon, self.lat)
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from([lon, lat]: [f64; 2]) -> Self {
        Self { lon, lat }
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(c: Coordinates) -> Self {
        [c.lon, c.lat]
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lon, self.lat)
    }
}

/// One traffic-loop reading as delivered by the device adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    /// `yyyy-mm-dd`
    pub date: String,
    /// `HH:MM-HH:MM`, 24h clock.
    pub time_slot: String,
    pub traffic_flow: i64,
    pub coordinates: Coordinates,
    pub lane_direction: String,
}

/// The dynamic part of a measurement, as written onto the twin.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub device_id: String,
    pub traffic_flow: i64,
    pub time_slot: String,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn from_measurement(m: &Measurement, observed_at: DateTime<Utc>) -> Self {
        Self {
            device_id: m.device_id.clone(),
            traffic_flow: m.traffic_flow,
            time_slot: m.time_slot.clone(),
            observed_at,
        }
    }

    /// URN of the reporting device, target of `observedBy`.
    pub fn device_urn(&self) -> String {
        format!("urn:ngsi-ld:Device:{}", self.device_id)
    }
}
