//! Append-only per-type shadow journal.
//!
//! One `;`-separated file per shadow kind (`road_shadows.csv`,
//! `loop_shadows.csv`). The header is written with the first row; every
//! later call appends. Rows are never rewritten, so the journal records
//! creations, not the live cache.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::{Coordinates, LoopShadow, RoadShadow, Shadow, ShadowKind};
use crate::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
struct RoadRecord {
    #[serde(rename = "RoadName")]
    road_name: String,
    #[serde(rename = "EdgeID")]
    edge_id: String,
    #[serde(rename = "StartNode")]
    start_node: i64,
    #[serde(rename = "EndNode")]
    end_node: i64,
    #[serde(rename = "Longitude")]
    longitude: f64,
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "LaneDirection")]
    lane_direction: String,
    #[serde(rename = "DeviceID")]
    device_id: String,
    #[serde(rename = "TimeSlot")]
    time_slot: String,
    #[serde(rename = "TrafficFlow")]
    traffic_flow: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct LoopRecord {
    #[serde(rename = "DeviceID")]
    device_id: String,
    #[serde(rename = "Longitude")]
    longitude: f64,
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "LaneDirection")]
    lane_direction: String,
    #[serde(rename = "LoopCode")]
    loop_code: String,
    #[serde(rename = "LoopLevel")]
    loop_level: String,
    #[serde(rename = "TimeSlot")]
    time_slot: String,
    #[serde(rename = "TrafficFlow")]
    traffic_flow: i64,
}

impl From<&RoadShadow> for RoadRecord {
    fn from(s: &RoadShadow) -> Self {
        Self {
            road_name: s.road_name.clone(),
            edge_id: s.edge_id.clone(),
            start_node: s.start_node,
            end_node: s.end_node,
            longitude: s.coordinates.lon,
            latitude: s.coordinates.lat,
            lane_direction: s.lane_direction.clone(),
            device_id: s.device_id.clone(),
            time_slot: s.last_time_slot.clone(),
            traffic_flow: s.last_flow,
        }
    }
}

impl From<RoadRecord> for Shadow {
    fn from(r: RoadRecord) -> Self {
        Shadow::Road(RoadShadow {
            road_name: r.road_name,
            edge_id: r.edge_id,
            start_node: r.start_node,
            end_node: r.end_node,
            coordinates: Coordinates::new(r.longitude, r.latitude),
            lane_direction: r.lane_direction,
            device_id: r.device_id,
            last_time_slot: r.time_slot,
            last_flow: r.traffic_flow,
        })
    }
}

impl From<&LoopShadow> for LoopRecord {
    fn from(s: &LoopShadow) -> Self {
        Self {
            device_id: s.device_id.clone(),
            longitude: s.coordinates.lon,
            latitude: s.coordinates.lat,
            lane_direction: s.lane_direction.clone(),
            loop_code: s.loop_code.clone(),
            loop_level: s.loop_level.clone(),
            time_slot: s.last_time_slot.clone(),
            traffic_flow: s.last_flow,
        }
    }
}

impl From<LoopRecord> for Shadow {
    fn from(r: LoopRecord) -> Self {
        Shadow::Loop(LoopShadow {
            device_id: r.device_id,
            coordinates: Coordinates::new(r.longitude, r.latitude),
            lane_direction: r.lane_direction,
            loop_code: r.loop_code,
            loop_level: r.loop_level,
            last_time_slot: r.time_slot,
            last_flow: r.traffic_flow,
        })
    }
}

/// Durable creation log for shadows.
#[derive(Debug)]
pub struct ShadowJournal {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ShadowJournal {
    /// Open (and create if needed) a journal directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, write_lock: Mutex::new(()) })
    }

    pub fn path_for(&self, kind: ShadowKind) -> PathBuf {
        self.dir.join(format!("{}_shadows.csv", kind.as_str()))
    }

    /// Append one shadow row to its kind's journal.
    pub fn append(&self, shadow: &Shadow) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.path_for(shadow.kind());
        let fresh = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(fresh)
            .from_writer(file);

        let written = match shadow {
            Shadow::Road(r) => writer.serialize(RoadRecord::from(r)),
            Shadow::Loop(l) => writer.serialize(LoopRecord::from(l)),
        };
        written.map_err(|e| journal_error(&path, e))?;
        writer.flush()?;
        Ok(())
    }

    /// Read a kind's journal back, one shadow per natural key.
    ///
    /// Later rows for a key replace earlier ones; first-seen order is kept.
    pub fn replay(&self, kind: ShadowKind) -> Result<Vec<Shadow>> {
        let path = self.path_for(kind);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .from_path(&path)
            .map_err(|e| journal_error(&path, e))?;

        let mut shadows: Vec<Shadow> = Vec::new();
        let mut index = hashbrown::HashMap::new();
        let mut push = |shadow: Shadow| match index.get(&shadow.key()).copied() {
            Some(i) => shadows[i] = shadow,
            None => {
                index.insert(shadow.key(), shadows.len());
                shadows.push(shadow);
            }
        };

        match kind {
            ShadowKind::Road => {
                for record in reader.deserialize::<RoadRecord>() {
                    push(record.map_err(|e| journal_error(&path, e))?.into());
                }
            }
            ShadowKind::Loop => {
                for record in reader.deserialize::<LoopRecord>() {
                    push(record.map_err(|e| journal_error(&path, e))?.into());
                }
            }
        }
        Ok(shadows)
    }
}

fn journal_error(path: &Path, e: csv::Error) -> Error {
    Error::Journal(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn road(device: &str, edge: &str, flow: i64) -> Shadow {
        Shadow::Road(RoadShadow {
            road_name: "Via Emilia Ponente".into(),
            edge_id: edge.into(),
            start_node: 1001,
            end_node: 1002,
            coordinates: Coordinates::new(44.5123626162894, 11.287461221671),
            lane_direction: "NO".into(),
            device_id: device.into(),
            last_time_slot: "00:00-01:00".into(),
            last_flow: flow,
        })
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ShadowJournal::open(dir.path()).unwrap();
        journal.append(&road("TL451", "e1", 78)).unwrap();
        journal.append(&road("TL452", "e2", 12)).unwrap();

        let raw = fs::read_to_string(journal.path_for(ShadowKind::Road)).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("RoadName;EdgeID;StartNode;EndNode;Longitude;Latitude"));
        assert_eq!(raw.matches("RoadName").count(), 1);
        assert!(lines[1].contains("44.5123626162894;11.287461221671"));
    }

    #[test]
    fn test_replay_dedups_by_natural_key() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ShadowJournal::open(dir.path()).unwrap();
        journal.append(&road("TL451", "e1", 78)).unwrap();
        journal.append(&road("TL452", "e2", 12)).unwrap();
        journal.append(&road("TL451", "e1", 59)).unwrap();

        let shadows = journal.replay(ShadowKind::Road).unwrap();
        assert_eq!(shadows.len(), 2);
        assert_eq!(shadows[0].last_flow(), 59);
        assert_eq!(shadows[0].as_road().unwrap().edge_id, "e1");
        assert_eq!(shadows[1].as_road().unwrap().edge_id, "e2");
    }

    #[test]
    fn test_replay_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ShadowJournal::open(dir.path()).unwrap();
        assert!(journal.replay(ShadowKind::Loop).unwrap().is_empty());
    }

    #[test]
    fn test_kinds_use_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let journal = ShadowJournal::open(dir.path()).unwrap();
        journal.append(&road("TL451", "e1", 78)).unwrap();
        journal
            .append(&Shadow::Loop(LoopShadow {
                device_id: "TL451".into(),
                coordinates: Coordinates::new(44.5, 11.2),
                lane_direction: "NO".into(),
                loop_code: "451".into(),
                loop_level: "1".into(),
                last_time_slot: "00:00-01:00".into(),
                last_flow: 78,
            }))
            .unwrap();

        assert_eq!(journal.replay(ShadowKind::Road).unwrap().len(), 1);
        let loops = journal.replay(ShadowKind::Loop).unwrap();
        assert_eq!(loops[0].as_loop().unwrap().loop_code, "451");
    }
}
