//! Builders for the twin entities and their observation patches.

use crate::model::*;

/// A new Road, owning its first segment.
pub fn road(id: &str, name: &str, first_segment: &str) -> Entity {
    Entity::new(EntityType::Road, id)
        .with_property(attr::NAME, name)
        .with_relationship(attr::HAS_PART, first_segment)
}

/// A new RoadSegment for a resolved edge, carrying the first observation.
pub fn road_segment(
    id: &str,
    shadow: &RoadShadow,
    obs: &Observation,
    road_id: &str,
    observation_id: &str,
) -> Entity {
    Entity::new(EntityType::RoadSegment, id)
        .with_property(attr::START_POINT, shadow.start_node)
        .with_property(attr::END_POINT, shadow.end_node)
        .with_property(
            attr::LOCATION,
            Value::Point2D { x: shadow.coordinates.lon, y: shadow.coordinates.lat },
        )
        .with_property(attr::DIRECTION, shadow.lane_direction.as_str())
        .with_property(attr::EDGE_ID, shadow.edge_id.as_str())
        .with_property(attr::TRAFFIC_FLOW, obs.traffic_flow)
        .with_property(attr::OBSERVED_AT, obs.observed_at)
        .with_property(attr::TIMESLOT, obs.time_slot.as_str())
        .with_property(attr::REF_TRAFFIC_FLOW_OBS, observation_id)
        .with_relationship(attr::IS_CONTAINED_IN, road_id)
        .with_relationship(attr::OBSERVED_BY, obs.device_urn())
}

/// The TrafficFlowObserved paired with a new RoadSegment.
pub fn traffic_flow_observed(
    id: &str,
    shadow: &RoadShadow,
    obs: &Observation,
    segment_id: &str,
) -> Entity {
    Entity::new(EntityType::TrafficFlowObserved, id)
        .with_property(attr::LANE_DIRECTION, shadow.lane_direction.as_str())
        .with_property(attr::TRAFFIC_FLOW, obs.traffic_flow)
        .with_property(attr::OBSERVED_AT, obs.observed_at)
        .with_property(attr::TIMESLOT, obs.time_slot.as_str())
        .with_relationship(attr::REF_ROAD_SEGMENT, segment_id)
        .with_relationship(attr::OBSERVED_BY, segment_id)
}

/// Overwrite payload for the dynamic attributes of an existing entity.
pub fn observation_patch(entity_type: EntityType, id: &str, obs: &Observation) -> Entity {
    Entity::new(entity_type, id)
        .with_property(attr::TRAFFIC_FLOW, obs.traffic_flow)
        .with_property(attr::OBSERVED_AT, obs.observed_at)
        .with_property(attr::TIMESLOT, obs.time_slot.as_str())
}

/// Overwrite payload for a Road's full `hasPart` list.
pub fn has_part_patch(road: &Entity) -> Entity {
    let mut patch = Entity::new(EntityType::Road, road.id.as_str());
    for part in road.related_all(attr::HAS_PART) {
        patch.add_relationship(attr::HAS_PART, part.as_str());
    }
    patch
}

/// The id a segment's `refTrafficFlowObs` points at, whether the store kept
/// it as a property or as a relationship.
pub fn observation_ref(segment: &Entity) -> Option<&str> {
    segment
        .get(attr::REF_TRAFFIC_FLOW_OBS)
        .and_then(Value::as_str)
        .or_else(|| segment.related(attr::REF_TRAFFIC_FLOW_OBS))
}
