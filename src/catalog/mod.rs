//! # Catalog Store
//!
//! Read-only, lane-level table built by the preprocessing pipeline. One row
//! per (road name, lane direction, loop) triple with the segment boundaries
//! and edge code that loop sits on.
//!
//! The on-disk form is the `;`-separated file the preprocessing step emits:
//!
//! ```text
//! StartingPoint;EndPoint;RoadName;Direction;Longitude;Latitude;Geopoint;TrafficLoopID;EdgeID;TrafficLoopCode;TrafficLoopLevel
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{device_suffix, normalize_direction, ShadowKind};
use crate::{Error, Result};

/// One lane-level catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    #[serde(rename = "StartingPoint")]
    pub start_node: i64,
    #[serde(rename = "EndPoint")]
    pub end_node: i64,
    #[serde(rename = "RoadName")]
    pub road_name: String,
    #[serde(rename = "Direction")]
    pub direction: String,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Geopoint")]
    pub geopoint: String,
    #[serde(rename = "TrafficLoopID")]
    pub loop_id: String,
    #[serde(rename = "EdgeID")]
    pub edge_id: String,
    #[serde(rename = "TrafficLoopCode")]
    pub loop_code: String,
    #[serde(rename = "TrafficLoopLevel")]
    pub loop_level: String,
}

/// Lookup keys, already normalized by the caller.
#[derive(Debug, Clone, Copy)]
pub struct CatalogQuery<'a> {
    pub kind: ShadowKind,
    pub geopoint: &'a str,
    pub direction: &'a str,
    pub device: &'a str,
}

/// Outcome of a lookup that did not yield exactly one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupFailure {
    NoMatch,
    Ambiguous(usize),
}

/// Immutable lane-level table.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    rows: Vec<CatalogRow>,
}

impl Catalog {
    pub fn from_rows(rows: Vec<CatalogRow>) -> Self {
        Self { rows }
    }

    /// Load the `;`-separated catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| Error::Catalog(format!("{}: {e}", path.display())))?;

        let mut rows = Vec::new();
        for (line, record) in reader.deserialize::<CatalogRow>().enumerate() {
            let row = record.map_err(|e| {
                Error::Catalog(format!("{} row {}: {e}", path.display(), line + 1))
            })?;
            rows.push(row);
        }
        tracing::info!(path = %path.display(), rows = rows.len(), "catalog loaded");
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find the single row for a natural key.
    ///
    /// Road lookups match geopoint + direction and only fall back to the
    /// device suffix to break a tie between several loops at the same spot.
    /// Several rows at one spot are therefore not an error by themselves;
    /// the lookup is ambiguous only when the suffix leaves more than one.
    /// Loop lookups always require the device suffix.
    pub fn lookup(&self, q: &CatalogQuery<'_>) -> std::result::Result<&CatalogRow, LookupFailure> {
        let direction = normalize_direction(q.direction);
        let at_spot: Vec<&CatalogRow> = self
            .rows
            .iter()
            .filter(|r| r.geopoint == q.geopoint && normalize_direction(&r.direction) == direction)
            .collect();

        let matches_device = |r: &&CatalogRow| device_suffix(&r.loop_id) == q.device;
        let candidates: Vec<&CatalogRow> = match q.kind {
            ShadowKind::Road if at_spot.len() <= 1 => at_spot,
            _ => at_spot.into_iter().filter(matches_device).collect(),
        };

        match candidates.as_slice() {
            [] => Err(LookupFailure::NoMatch),
            [row] => Ok(*row),
            many => Err(LookupFailure::Ambiguous(many.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn row(geopoint: &str, direction: &str, loop_id: &str, edge_id: &str) -> CatalogRow {
        CatalogRow {
            start_node: 100,
            end_node: 200,
            road_name: "Via Emilia Ponente".into(),
            direction: direction.into(),
            longitude: 0.0,
            latitude: 0.0,
            geopoint: geopoint.into(),
            loop_id: loop_id.into(),
            edge_id: edge_id.into(),
            loop_code: loop_id.into(),
            loop_level: "1".into(),
        }
    }

    fn query<'a>(kind: ShadowKind, geopoint: &'a str, direction: &'a str, device: &'a str) -> CatalogQuery<'a> {
        CatalogQuery { kind, geopoint, direction, device }
    }

    #[test]
    fn test_road_lookup_direction_case_insensitive() {
        let catalog = Catalog::from_rows(vec![row("44.5, 11.2", "no", "451", "23288872#4")]);
        let hit = catalog.lookup(&query(ShadowKind::Road, "44.5, 11.2", "NO", "999")).unwrap();
        assert_eq!(hit.edge_id, "23288872#4");
    }

    #[test]
    fn test_road_lookup_no_match() {
        let catalog = Catalog::from_rows(vec![row("44.5, 11.2", "NO", "451", "e1")]);
        assert_eq!(
            catalog.lookup(&query(ShadowKind::Road, "44.5, 11.2", "SE", "451")).unwrap_err(),
            LookupFailure::NoMatch
        );
    }

    #[test]
    fn test_road_lookup_device_breaks_tie() {
        let catalog = Catalog::from_rows(vec![
            row("44.5, 11.2", "NO", "451", "e1"),
            row("44.5, 11.2", "NO", "452", "e2"),
        ]);
        let hit = catalog.lookup(&query(ShadowKind::Road, "44.5, 11.2", "NO", "452")).unwrap();
        assert_eq!(hit.edge_id, "e2");
        assert_eq!(
            catalog.lookup(&query(ShadowKind::Road, "44.5, 11.2", "NO", "999")).unwrap_err(),
            LookupFailure::NoMatch
        );
    }

    #[test]
    fn test_road_lookup_ambiguous() {
        let catalog = Catalog::from_rows(vec![
            row("44.5, 11.2", "NO", "451", "e1"),
            row("44.5, 11.2", "NO", "451", "e2"),
        ]);
        assert_eq!(
            catalog.lookup(&query(ShadowKind::Road, "44.5, 11.2", "NO", "451")).unwrap_err(),
            LookupFailure::Ambiguous(2)
        );
    }

    #[test]
    fn test_loop_lookup_requires_device() {
        let catalog = Catalog::from_rows(vec![row("44.5, 11.2", "NO", "451", "e1")]);
        assert!(catalog.lookup(&query(ShadowKind::Loop, "44.5, 11.2", "NO", "451")).is_ok());
        assert_eq!(
            catalog.lookup(&query(ShadowKind::Loop, "44.5, 11.2", "NO", "452")).unwrap_err(),
            LookupFailure::NoMatch
        );
    }

    #[test]
    fn test_load_semicolon_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "StartingPoint;EndPoint;RoadName;Direction;Longitude;Latitude;Geopoint;TrafficLoopID;EdgeID;TrafficLoopCode;TrafficLoopLevel"
        )
        .unwrap();
        writeln!(
            file,
            "1001;1002;Via Emilia Ponente;NO;11.287461221671;44.5123626162894;44.5123626162894, 11.287461221671;451;23288872#4;451;1"
        )
        .unwrap();

        let catalog = Catalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        let hit = catalog
            .lookup(&query(ShadowKind::Road, "44.5123626162894, 11.287461221671", "no", "451"))
            .unwrap();
        assert_eq!(hit.start_node, 1001);
        assert_eq!(hit.road_name, "Via Emilia Ponente");
    }

    #[test]
    fn test_load_reports_bad_row() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "StartingPoint;EndPoint;RoadName;Direction;Longitude;Latitude;Geopoint;TrafficLoopID;EdgeID;TrafficLoopCode;TrafficLoopLevel"
        )
        .unwrap();
        writeln!(file, "abc;1002;Via X;NO;1;2;1, 2;451;e;451;1").unwrap();
        let err = Catalog::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Catalog(_)));
    }
}
