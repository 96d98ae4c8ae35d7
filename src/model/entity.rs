//! Context entity (Road, RoadSegment, TrafficFlowObserved).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{PropertyMap, Value};

/// Attribute and relationship names used on the twin entities.
pub mod attr {
    pub const NAME: &str = "name";
    pub const HAS_PART: &str = "hasPart";

    pub const START_POINT: &str = "startPoint";
    pub const END_POINT: &str = "endPoint";
    pub const LOCATION: &str = "location";
    pub const DIRECTION: &str = "direction";
    pub const EDGE_ID: &str = "edgeID";
    pub const REF_TRAFFIC_FLOW_OBS: &str = "refTrafficFlowObs";
    pub const IS_CONTAINED_IN: &str = "isContainedIn";

    pub const LANE_DIRECTION: &str = "laneDirection";
    pub const REF_ROAD_SEGMENT: &str = "refRoadSegment";

    pub const TRAFFIC_FLOW: &str = "trafficFlow";
    pub const OBSERVED_AT: &str = "observedAt";
    pub const TIMESLOT: &str = "timeslot";
    pub const OBSERVED_BY: &str = "observedBy";
}

/// Type URIs of the smart data models the twin is built on.
pub const ROAD_TYPE_URI: &str = "https://smartdatamodels.org/dataModel.Transportation/Road";
pub const ROAD_SEGMENT_TYPE_URI: &str =
    "https://smartdatamodels.org/dataModel.Transportation/RoadSegment";
pub const TRAFFIC_FLOW_OBSERVED_TYPE_URI: &str =
    "https://smartdatamodels.org/dataModel.Transportation/TrafficFlowObserved";

/// The entity types this engine mints and maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Road,
    RoadSegment,
    TrafficFlowObserved,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [
        EntityType::Road,
        EntityType::RoadSegment,
        EntityType::TrafficFlowObserved,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EntityType::Road => "Road",
            EntityType::RoadSegment => "RoadSegment",
            EntityType::TrafficFlowObserved => "TrafficFlowObserved",
        }
    }

    /// Identifier prefix, e.g. `RS` in `RS001`.
    pub fn id_prefix(self) -> &'static str {
        match self {
            EntityType::Road => "R",
            EntityType::RoadSegment => "RS",
            EntityType::TrafficFlowObserved => "TFO",
        }
    }

    pub fn type_uri(self) -> &'static str {
        match self {
            EntityType::Road => ROAD_TYPE_URI,
            EntityType::RoadSegment => ROAD_SEGMENT_TYPE_URI,
            EntityType::TrafficFlowObserved => TRAFFIC_FLOW_OBSERVED_TYPE_URI,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name || t.type_uri() == name)
    }

    /// Mint an identifier: prefix plus a sequence zero-padded to three digits.
    pub fn format_id(self, seq: u64) -> String {
        format!("{}{:03}", self.id_prefix(), seq)
    }

    /// Split an identifier minted by [`format_id`](Self::format_id) back into
    /// its type and sequence number. Longest prefix wins (`RS` before `R`).
    pub fn parse_id(id: &str) -> Option<(EntityType, u64)> {
        let mut by_prefix = Self::ALL;
        by_prefix.sort_by_key(|t| std::cmp::Reverse(t.id_prefix().len()));
        by_prefix.into_iter().find_map(|t| {
            let digits = id.strip_prefix(t.id_prefix())?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse().ok().map(|seq| (t, seq))
        })
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Targets of one named relationship. Almost always a single id.
pub type RelTargets = SmallVec<[String; 1]>;

/// A context entity as held by the external graph store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub entity_type: EntityType,
    pub properties: PropertyMap,
    pub relationships: BTreeMap<String, RelTargets>,
}

impl Entity {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type,
            properties: PropertyMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.add_relationship(name, target);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    /// First target of a relationship, if any.
    pub fn related(&self, name: &str) -> Option<&str> {
        self.relationships.get(name).and_then(|t| t.first()).map(String::as_str)
    }

    pub fn related_all(&self, name: &str) -> &[String] {
        self.relationships.get(name).map(|t| t.as_slice()).unwrap_or(&[])
    }

    /// Add a relationship target. Returns false if it was already present.
    pub fn add_relationship(&mut self, name: impl Into<String>, target: impl Into<String>) -> bool {
        let target = target.into();
        let targets = self.relationships.entry(name.into()).or_default();
        if targets.iter().any(|t| *t == target) {
            return false;
        }
        targets.push(target);
        true
    }
}
