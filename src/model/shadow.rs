//! Shadows: cached bindings from a physical sensor to its logical identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Coordinates, Measurement};

/// Which shadow partition a resolution targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowKind {
    Road,
    Loop,
}

impl ShadowKind {
    pub const ALL: [ShadowKind; 2] = [ShadowKind::Road, ShadowKind::Loop];

    pub fn as_str(self) -> &'static str {
        match self {
            ShadowKind::Road => "road",
            ShadowKind::Loop => "loop",
        }
    }
}

impl fmt::Display for ShadowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction codes are compared case-insensitively; store them upper-cased.
pub fn normalize_direction(direction: &str) -> String {
    direction.trim().to_uppercase()
}

/// Strip a type prefix from a raw device identifier.
///
/// `TL451` → `451`, `urn:ngsi-ld:Device:TL451` → `451`, `451` → `451`.
/// An identifier that is nothing but prefix is returned as-is.
pub fn device_suffix(raw: &str) -> &str {
    let tail = raw.rsplit(':').next().unwrap_or(raw).trim();
    let stripped = tail
        .trim_start_matches(|c: char| c.is_ascii_alphabetic() || c.is_whitespace() || c == '_' || c == '-');
    if stripped.is_empty() { tail } else { stripped }
}

/// Natural key of a shadow inside its partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShadowKey {
    Road { geopoint: String, direction: String, device: String },
    Loop { device: String },
}

impl ShadowKey {
    pub fn for_measurement(kind: ShadowKind, m: &Measurement) -> Self {
        match kind {
            ShadowKind::Road => ShadowKey::Road {
                geopoint: m.coordinates.geopoint(),
                direction: normalize_direction(&m.lane_direction),
                device: device_suffix(&m.device_id).to_owned(),
            },
            ShadowKind::Loop => ShadowKey::Loop {
                device: device_suffix(&m.device_id).to_owned(),
            },
        }
    }
}

/// A loop resolved onto a named road and one of its edges.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadShadow {
    pub road_name: String,
    pub edge_id: String,
    pub start_node: i64,
    pub end_node: i64,
    pub coordinates: Coordinates,
    pub lane_direction: String,
    pub device_id: String,
    pub last_time_slot: String,
    pub last_flow: i64,
}

/// A loop resolved onto its station code and level.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopShadow {
    pub device_id: String,
    pub coordinates: Coordinates,
    pub lane_direction: String,
    pub loop_code: String,
    pub loop_level: String,
    pub last_time_slot: String,
    pub last_flow: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shadow {
    Road(RoadShadow),
    Loop(LoopShadow),
}

impl Shadow {
    pub fn kind(&self) -> ShadowKind {
        match self {
            Shadow::Road(_) => ShadowKind::Road,
            Shadow::Loop(_) => ShadowKind::Loop,
        }
    }

    pub fn key(&self) -> ShadowKey {
        match self {
            Shadow::Road(r) => ShadowKey::Road {
                geopoint: r.coordinates.geopoint(),
                direction: normalize_direction(&r.lane_direction),
                device: device_suffix(&r.device_id).to_owned(),
            },
            Shadow::Loop(l) => ShadowKey::Loop {
                device: device_suffix(&l.device_id).to_owned(),
            },
        }
    }

    pub fn last_flow(&self) -> i64 {
        match self {
            Shadow::Road(r) => r.last_flow,
            Shadow::Loop(l) => l.last_flow,
        }
    }

    /// Overwrite the cached dynamic fields. Static fields never change.
    pub fn observe(&mut self, time_slot: &str, flow: i64) {
        let (slot, last) = match self {
            Shadow::Road(r) => (&mut r.last_time_slot, &mut r.last_flow),
            Shadow::Loop(l) => (&mut l.last_time_slot, &mut l.last_flow),
        };
        slot.clear();
        slot.push_str(time_slot);
        *last = flow;
    }

    /// Legacy identity rule: same location/device and same last flow.
    pub fn matches_last_value(&self, m: &Measurement) -> bool {
        match self {
            Shadow::Road(r) => {
                r.coordinates.geopoint() == m.coordinates.geopoint()
                    && normalize_direction(&r.lane_direction) == normalize_direction(&m.lane_direction)
                    && r.last_flow == m.traffic_flow
            }
            Shadow::Loop(l) => {
                device_suffix(&l.device_id) == device_suffix(&m.device_id)
                    && l.last_flow == m.traffic_flow
            }
        }
    }

    pub fn as_road(&self) -> Option<&RoadShadow> {
        match self {
            Shadow::Road(r) => Some(r),
            Shadow::Loop(_) => None,
        }
    }

    pub fn into_road(self) -> Option<RoadShadow> {
        match self {
            Shadow::Road(r) => Some(r),
            Shadow::Loop(_) => None,
        }
    }

    pub fn as_loop(&self) -> Option<&LoopShadow> {
        match self {
            Shadow::Loop(l) => Some(l),
            Shadow::Road(_) => None,
        }
    }
}
