//! NGSI-LD normalized JSON codec.
//!
//! Entities travel as
//!
//! ```json
//! {
//!   "id": "urn:ngsi-ld:RoadSegment:RS001",
//!   "type": "RoadSegment",
//!   "edgeID": { "type": "Property", "value": "23288872#4" },
//!   "location": { "type": "GeoProperty", "value": { "type": "Point", "coordinates": [44.51, 11.28] } },
//!   "isContainedIn": { "type": "Relationship", "object": "urn:ngsi-ld:Road:R001" }
//! }
//! ```
//!
//! Inside the crate ids are short (`RS001`); the codec expands them to
//! `urn:ngsi-ld:{Type}:{id}` on the way out and strips them on the way in.
//! Ids that already are URNs of a foreign type (devices) pass through.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value as Json};

use super::AttrFilter;
use crate::model::{Entity, EntityType, Value};
use crate::timestamp::OBSERVED_AT_FORMAT;
use crate::{Error, Result};

/// JSON-LD context of the transportation smart data models.
pub const DEFAULT_CONTEXT: &str =
    "https://raw.githubusercontent.com/smart-data-models/dataModel.Transportation/master/context.jsonld";

const URN_PREFIX: &str = "urn:ngsi-ld:";

/// `urn:ngsi-ld:{Type}:{id}`.
pub fn urn(entity_type: EntityType, id: &str) -> String {
    format!("{URN_PREFIX}{}:{id}", entity_type.name())
}

/// Expand a short id minted by this engine. URNs and unknown ids pass through.
pub fn to_urn(id: &str) -> String {
    if id.starts_with("urn:") {
        return id.to_string();
    }
    match EntityType::parse_id(id) {
        Some((t, _)) => urn(t, id),
        None => id.to_string(),
    }
}

/// Strip `urn:ngsi-ld:{Type}:` when `Type` is one of ours.
pub fn short_id(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix(URN_PREFIX) else {
        return raw;
    };
    match rest.split_once(':') {
        Some((ty, id)) if EntityType::from_name(ty).is_some() => id,
        _ => raw,
    }
}

/// `q=` expression for an equality filter.
pub fn query_expr(filter: &AttrFilter) -> String {
    match &filter.value {
        Value::String(s) => format!("{}==\"{}\"", filter.attr, s.replace('"', "\\\"")),
        other => format!("{}=={}", filter.attr, other),
    }
}

// ============================================================================
// Encode
// ============================================================================

/// Entity → NGSI-LD normalized JSON. `context` is attached as `@context`.
pub fn encode(entity: &Entity, context: Option<&str>) -> Json {
    let mut obj = Map::new();
    obj.insert("id".into(), Json::String(urn(entity.entity_type, &entity.id)));
    obj.insert("type".into(), Json::String(entity.entity_type.name().into()));

    let mut keys: Vec<&String> = entity.properties.keys().collect();
    keys.sort();
    for key in keys {
        let value = &entity.properties[key];
        if value.is_null() {
            continue;
        }
        obj.insert(key.clone(), encode_attribute(value));
    }

    for (name, targets) in &entity.relationships {
        let object = match targets.as_slice() {
            [one] => Json::String(to_urn(one)),
            many => Json::Array(many.iter().map(|t| Json::String(to_urn(t))).collect()),
        };
        obj.insert(name.clone(), json!({ "type": "Relationship", "object": object }));
    }

    if let Some(ctx) = context {
        obj.insert("@context".into(), json!([ctx]));
    }
    Json::Object(obj)
}

fn encode_attribute(value: &Value) -> Json {
    match value {
        Value::Point2D { x, y } => json!({
            "type": "GeoProperty",
            "value": { "type": "Point", "coordinates": [x, y] },
        }),
        other => json!({ "type": "Property", "value": encode_value(other) }),
    }
}

fn encode_value(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::String(s) => json!(s),
        Value::List(items) => Json::Array(items.iter().map(encode_value).collect()),
        Value::Map(m) => Json::Object(m.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect()),
        Value::DateTime(dt) => json!({
            "@type": "DateTime",
            "@value": dt.format(OBSERVED_AT_FORMAT).to_string(),
        }),
        Value::Point2D { x, y } => json!({ "type": "Point", "coordinates": [x, y] }),
    }
}

// ============================================================================
// Decode
// ============================================================================

/// NGSI-LD normalized JSON → entity. Unknown types are rejected.
pub fn decode(json: &Json) -> Result<Entity> {
    let obj = json.as_object().ok_or_else(|| malformed("entity is not an object"))?;
    let raw_id = obj.get("id").and_then(Json::as_str).ok_or_else(|| malformed("missing id"))?;
    let raw_type = obj.get("type").and_then(Json::as_str).ok_or_else(|| malformed("missing type"))?;
    let entity_type = EntityType::from_name(raw_type)
        .ok_or_else(|| malformed(&format!("unknown entity type {raw_type}")))?;

    let mut entity = Entity::new(entity_type, short_id(raw_id));
    for (name, attr) in obj {
        if matches!(name.as_str(), "id" | "type" | "@context") {
            continue;
        }
        match attr.get("type").and_then(Json::as_str) {
            Some("Relationship") => match attr.get("object") {
                Some(Json::String(target)) => {
                    entity.add_relationship(name.clone(), short_id(target));
                }
                Some(Json::Array(targets)) => {
                    for target in targets.iter().filter_map(Json::as_str) {
                        entity.add_relationship(name.clone(), short_id(target));
                    }
                }
                _ => return Err(malformed(&format!("relationship {name} has no object"))),
            },
            Some("GeoProperty") => {
                let point = attr
                    .get("value")
                    .and_then(|v| v.get("coordinates"))
                    .and_then(Json::as_array)
                    .and_then(|c| Some((c.first()?.as_f64()?, c.get(1)?.as_f64()?)));
                match point {
                    Some((x, y)) => entity.set(name.clone(), Value::Point2D { x, y }),
                    None => return Err(malformed(&format!("geo property {name} is not a point"))),
                }
            }
            _ => {
                let value = attr.get("value").map(decode_value).unwrap_or(Value::Null);
                entity.set(name.clone(), value);
            }
        }
    }
    Ok(entity)
}

fn decode_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(decode_value).collect()),
        Json::Object(obj) => {
            if obj.get("@type").and_then(Json::as_str) == Some("DateTime") {
                if let Some(dt) = obj
                    .get("@value")
                    .and_then(Json::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                {
                    return Value::DateTime(dt.with_timezone(&Utc));
                }
            }
            Value::Map(obj.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect())
        }
    }
}

fn malformed(what: &str) -> Error {
    Error::StoreRejected(format!("malformed NGSI-LD entity: {what}"))
}
