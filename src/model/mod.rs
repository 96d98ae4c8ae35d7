//! # Twin Data Model
//!
//! Plain DTOs shared by the resolver, the synchronizer and the store
//! back-ends: measurements, shadows, context entities and their values.
//!
//! Design rule: no I/O, no locks, no async in this module.

pub mod entity;
pub mod measurement;
pub mod property_map;
pub mod shadow;
pub mod value;

pub use entity::{attr, Entity, EntityType, RelTargets};
pub use measurement::{Coordinates, Measurement, Observation};
pub use property_map::PropertyMap;
pub use shadow::{
    device_suffix, normalize_direction, LoopShadow, RoadShadow, Shadow, ShadowKey, ShadowKind,
};
pub use value::Value;
