//! Shared fixtures for the end-to-end tests.
#![allow(dead_code)]

use roadtwin::{Catalog, CatalogRow, Coordinates, Measurement, MemoryStore, ShadowResolver, TwinSync};
use roadtwin::{CacheMatch, ContextSynchronizer};

pub const CATALOG_HEADER: &str = "StartingPoint;EndPoint;RoadName;Direction;Longitude;Latitude;Geopoint;TrafficLoopID;EdgeID;TrafficLoopCode;TrafficLoopLevel";

fn row(
    start: i64,
    end: i64,
    road: &str,
    direction: &str,
    lon: f64,
    lat: f64,
    loop_id: &str,
    edge: &str,
) -> CatalogRow {
    CatalogRow {
        start_node: start,
        end_node: end,
        road_name: road.into(),
        direction: direction.into(),
        longitude: lon,
        latitude: lat,
        geopoint: Coordinates::new(lon, lat).geopoint(),
        loop_id: loop_id.into(),
        edge_id: edge.into(),
        loop_code: loop_id.into(),
        loop_level: "1".into(),
    }
}

/// Two loops on Via Emilia Ponente (two edges) and one on Via Saragozza.
pub fn catalog_rows() -> Vec<CatalogRow> {
    vec![
        row(1001, 1002, "Via Emilia Ponente", "NO", 44.5123626162894, 11.287461221671, "451", "23288872#4"),
        row(1002, 1003, "Via Emilia Ponente", "NO", 44.513, 11.29, "452", "23288872#5"),
        row(2001, 2002, "Via Saragozza", "SE", 44.49, 11.32, "77", "-1000#2"),
    ]
}

pub fn catalog() -> Catalog {
    Catalog::from_rows(catalog_rows())
}

/// The catalog as the preprocessing step writes it.
pub fn catalog_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("catalog.csv");
    let mut body = String::from(CATALOG_HEADER);
    body.push('\n');
    for r in catalog_rows() {
        body.push_str(&format!(
            "{};{};{};{};{};{};{};{};{};{};{}\n",
            r.start_node,
            r.end_node,
            r.road_name,
            r.direction,
            r.longitude,
            r.latitude,
            r.geopoint,
            r.loop_id,
            r.edge_id,
            r.loop_code,
            r.loop_level
        ));
    }
    std::fs::write(&path, body).unwrap();
    path
}

pub fn measurement(device: &str, flow: i64, hour: u32) -> Measurement {
    let (coordinates, direction) = match device {
        "TL451" => (Coordinates::new(44.5123626162894, 11.287461221671), "NO"),
        "TL452" => (Coordinates::new(44.513, 11.29), "no"),
        "TL77" => (Coordinates::new(44.49, 11.32), "SE"),
        _ => (Coordinates::new(1.0, 2.0), "NO"),
    };
    Measurement {
        device_id: device.into(),
        date: "2024-02-01".into(),
        time_slot: format!("{:02}:00-{:02}:00", hour - 1, hour),
        traffic_flow: flow,
        coordinates,
        lane_direction: direction.into(),
    }
}

/// In-memory twin with deterministic timestamps.
pub fn twin() -> TwinSync<MemoryStore> {
    twin_on(MemoryStore::new())
}

pub fn twin_on(store: MemoryStore) -> TwinSync<MemoryStore> {
    TwinSync::new(
        ShadowResolver::new(catalog(), CacheMatch::NaturalKey),
        ContextSynchronizer::new(store),
    )
    .with_max_jitter(0)
}
