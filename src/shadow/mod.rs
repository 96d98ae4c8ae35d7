//! # Shadow Resolver
//!
//! Turns a raw measurement into a stable identity (a [`Shadow`]) anchored to
//! a named road, its segment boundaries and an edge code, or to a loop's
//! station code. Catalog lookups happen once per physical entity; after
//! that the cache answers.
//!
//! ```text
//! measurement ─► normalize keys ─► cache ──hit──► shadow
//!                                    │
//!                                   miss
//!                                    ▼
//!                                 catalog ─► journal append ─► cache insert ─► shadow
//! ```
//!
//! No network I/O happens here; the only side effects are the cache and the
//! journal.

pub mod cache;
pub mod journal;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::catalog::{Catalog, CatalogQuery, CatalogRow, LookupFailure};
use crate::model::*;
use crate::{Error, ResolutionFailure, Result};

pub use cache::{CacheLookup, CacheMatch, ShadowCache};
pub use journal::ShadowJournal;

/// Resolver statistics, for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub cache_hits: u64,
    pub catalog_lookups: u64,
    pub created: u64,
}

/// Measurement → shadow resolution backed by a cache and a journal.
pub struct ShadowResolver {
    catalog: Catalog,
    cache: ShadowCache,
    journal: Option<ShadowJournal>,
    mode: CacheMatch,
    cache_hits: AtomicU64,
    catalog_lookups: AtomicU64,
    created: AtomicU64,
}

impl ShadowResolver {
    /// Resolver with an empty cache and no journal.
    pub fn new(catalog: Catalog, mode: CacheMatch) -> Self {
        Self {
            catalog,
            cache: ShadowCache::new(),
            journal: None,
            mode,
            cache_hits: AtomicU64::new(0),
            catalog_lookups: AtomicU64::new(0),
            created: AtomicU64::new(0),
        }
    }

    /// Resolver that journals new shadows and starts from whatever the
    /// journal already holds.
    pub fn open(catalog: Catalog, journal: ShadowJournal, mode: CacheMatch) -> Result<Self> {
        let mut resolver = Self::new(catalog, mode);
        for kind in ShadowKind::ALL {
            let replayed = journal.replay(kind)?;
            tracing::info!(kind = %kind, shadows = replayed.len(), "shadow journal replayed");
            for shadow in replayed {
                resolver.cache.restore(shadow);
            }
        }
        resolver.journal = Some(journal);
        Ok(resolver)
    }

    pub fn cache(&self) -> &ShadowCache {
        &self.cache
    }

    pub fn mode(&self) -> CacheMatch {
        self.mode
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            catalog_lookups: self.catalog_lookups.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
        }
    }

    /// Resolve a measurement to exactly one shadow of the given kind.
    pub fn resolve(&self, kind: ShadowKind, m: &Measurement) -> Result<Shadow> {
        let key = ShadowKey::for_measurement(kind, m);

        match self.cache.lookup(kind, &key, m, self.mode) {
            Ok(shadow) => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(kind = %kind, device_id = %m.device_id, "shadow cache hit");
                return Ok(shadow);
            }
            Err(CacheLookup::Ambiguous(n)) => {
                return Err(resolution_error(kind, m, ResolutionFailure::AmbiguousCache(n)));
            }
            Err(CacheLookup::Miss) => {}
        }

        self.catalog_lookups.fetch_add(1, Ordering::Relaxed);
        let (geopoint, direction, device) = match &key {
            ShadowKey::Road { geopoint, direction, device } => {
                (geopoint.clone(), direction.as_str(), device.as_str())
            }
            ShadowKey::Loop { device } => (m.coordinates.geopoint(), m.lane_direction.as_str(), device.as_str()),
        };
        let query = CatalogQuery { kind, geopoint: &geopoint, direction, device };
        let row = self.catalog.lookup(&query).map_err(|failure| {
            let reason = match failure {
                LookupFailure::NoMatch => ResolutionFailure::NoCatalogMatch,
                LookupFailure::Ambiguous(n) => ResolutionFailure::AmbiguousCatalog(n),
            };
            resolution_error(kind, m, reason)
        })?;

        let fresh = build_shadow(kind, row, m);
        let mut inserted = false;
        let shadow = self.cache.insert_with(fresh, m, |s| {
            inserted = true;
            match &self.journal {
                Some(journal) => journal.append(s),
                None => Ok(()),
            }
        })?;

        if inserted {
            self.created.fetch_add(1, Ordering::Relaxed);
            tracing::info!(kind = %kind, device_id = %m.device_id, "shadow created");
        }
        Ok(shadow)
    }
}

fn build_shadow(kind: ShadowKind, row: &CatalogRow, m: &Measurement) -> Shadow {
    match kind {
        ShadowKind::Road => Shadow::Road(RoadShadow {
            road_name: row.road_name.clone(),
            edge_id: row.edge_id.clone(),
            start_node: row.start_node,
            end_node: row.end_node,
            coordinates: m.coordinates,
            lane_direction: normalize_direction(&m.lane_direction),
            device_id: m.device_id.clone(),
            last_time_slot: m.time_slot.clone(),
            last_flow: m.traffic_flow,
        }),
        ShadowKind::Loop => Shadow::Loop(LoopShadow {
            device_id: m.device_id.clone(),
            coordinates: m.coordinates,
            lane_direction: normalize_direction(&m.lane_direction),
            loop_code: row.loop_code.clone(),
            loop_level: row.loop_level.clone(),
            last_time_slot: m.time_slot.clone(),
            last_flow: m.traffic_flow,
        }),
    }
}

fn resolution_error(kind: ShadowKind, m: &Measurement, reason: ResolutionFailure) -> Error {
    Error::Resolution {
        kind,
        device_id: m.device_id.clone(),
        coordinates: m.coordinates.to_string(),
        direction: m.lane_direction.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GEOPOINT: &str = "44.5123626162894, 11.287461221671";

    fn catalog() -> Catalog {
        Catalog::from_rows(vec![
            CatalogRow {
                start_node: 1001,
                end_node: 1002,
                road_name: "Via Emilia Ponente".into(),
                direction: "NO".into(),
                longitude: 11.287461221671,
                latitude: 44.5123626162894,
                geopoint: GEOPOINT.into(),
                loop_id: "451".into(),
                edge_id: "23288872#4".into(),
                loop_code: "451".into(),
                loop_level: "1".into(),
            },
            CatalogRow {
                start_node: 2001,
                end_node: 2002,
                road_name: "Via Saragozza".into(),
                direction: "SE".into(),
                longitude: 11.32,
                latitude: 44.49,
                geopoint: "44.49, 11.32".into(),
                loop_id: "77".into(),
                edge_id: "-1000#2".into(),
                loop_code: "77".into(),
                loop_level: "0".into(),
            },
        ])
    }

    fn measurement(flow: i64, slot: &str) -> Measurement {
        Measurement {
            device_id: "TL451".into(),
            date: "2024-02-01".into(),
            time_slot: slot.into(),
            traffic_flow: flow,
            coordinates: Coordinates::new(44.5123626162894, 11.287461221671),
            lane_direction: "no".into(),
        }
    }

    #[test]
    fn test_resolve_road_from_catalog() {
        let resolver = ShadowResolver::new(catalog(), CacheMatch::NaturalKey);
        let shadow = resolver.resolve(ShadowKind::Road, &measurement(78, "00:00-01:00")).unwrap();
        let road = shadow.as_road().unwrap();
        assert_eq!(road.edge_id, "23288872#4");
        assert_eq!(road.road_name, "Via Emilia Ponente");
        assert_eq!(road.lane_direction, "NO");
        assert_eq!((road.start_node, road.end_node), (1001, 1002));
    }

    #[test]
    fn test_catalog_consulted_once_per_entity() {
        let resolver = ShadowResolver::new(catalog(), CacheMatch::NaturalKey);
        let first = resolver.resolve(ShadowKind::Road, &measurement(78, "00:00-01:00")).unwrap();
        let second = resolver.resolve(ShadowKind::Road, &measurement(59, "01:00-02:00")).unwrap();

        assert_eq!(first.as_road().unwrap().edge_id, second.as_road().unwrap().edge_id);
        assert_eq!(second.last_flow(), 59);
        assert_eq!(
            resolver.stats(),
            ResolverStats { cache_hits: 1, catalog_lookups: 1, created: 1 }
        );
    }

    #[test]
    fn test_last_value_mode_rechecks_catalog_but_keeps_one_shadow() {
        let resolver = ShadowResolver::new(catalog(), CacheMatch::LastValue);
        resolver.resolve(ShadowKind::Road, &measurement(78, "00:00-01:00")).unwrap();
        resolver.resolve(ShadowKind::Road, &measurement(59, "01:00-02:00")).unwrap();
        resolver.resolve(ShadowKind::Road, &measurement(59, "02:00-03:00")).unwrap();

        let stats = resolver.stats();
        assert_eq!(stats.catalog_lookups, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(resolver.cache().len(ShadowKind::Road), 1);
    }

    #[test]
    fn test_resolve_loop_shadow() {
        let resolver = ShadowResolver::new(catalog(), CacheMatch::NaturalKey);
        let shadow = resolver.resolve(ShadowKind::Loop, &measurement(78, "00:00-01:00")).unwrap();
        let lp = shadow.as_loop().unwrap();
        assert_eq!(lp.loop_code, "451");
        assert_eq!(lp.loop_level, "1");
    }

    #[test]
    fn test_unknown_location_is_resolution_error() {
        let resolver = ShadowResolver::new(catalog(), CacheMatch::NaturalKey);
        let mut m = measurement(78, "00:00-01:00");
        m.coordinates = Coordinates::new(1.0, 2.0);
        let err = resolver.resolve(ShadowKind::Road, &m).unwrap_err();
        assert!(matches!(
            err,
            Error::Resolution { reason: ResolutionFailure::NoCatalogMatch, .. }
        ));
        assert!(resolver.cache().is_empty());
    }

    #[test]
    fn test_journal_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let journal = ShadowJournal::open(dir.path()).unwrap();
            let resolver = ShadowResolver::open(catalog(), journal, CacheMatch::NaturalKey).unwrap();
            resolver.resolve(ShadowKind::Road, &measurement(78, "00:00-01:00")).unwrap();
        }

        let journal = ShadowJournal::open(dir.path()).unwrap();
        let resolver = ShadowResolver::open(catalog(), journal, CacheMatch::NaturalKey).unwrap();
        assert_eq!(resolver.cache().len(ShadowKind::Road), 1);
        resolver.resolve(ShadowKind::Road, &measurement(59, "01:00-02:00")).unwrap();
        assert_eq!(resolver.stats().catalog_lookups, 0);
    }
}
