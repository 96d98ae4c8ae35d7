//! # roadtwin — Physical-to-Twin Synchronization for Road Networks
//!
//! Keeps a live digital twin of an urban road network in an NGSI-LD context
//! store. Traffic-loop measurements are resolved to a stable identity (a
//! *shadow*) through a lane-level catalog, then written to the store as a
//! deduplicated Road / RoadSegment / TrafficFlowObserved subgraph.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `ContextStore` is the contract between the engine and the store
//! 2. **Clean DTOs**: `Measurement`, `Shadow`, `Entity`, `Value` cross all boundaries
//! 3. **Resolve once**: the catalog is consulted once per physical entity, then cached and journaled
//! 4. **Search before create**: an edge gets exactly one segment, under a per-edge lock
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roadtwin::{Catalog, Measurement, TwinSync};
//!
//! # async fn example() -> roadtwin::Result<()> {
//! let catalog = Catalog::load("data/catalog.csv")?;
//! let twin = TwinSync::open_memory(catalog);
//!
//! let m: Measurement = serde_json::from_str(r#"{
//!     "deviceID": "TL451", "date": "2024-02-01", "timeSlot": "00:00-01:00",
//!     "trafficFlow": 78, "coordinates": [44.5123626162894, 11.287461221671],
//!     "laneDirection": "NO"
//! }"#).unwrap();
//!
//! let outcome = twin.process(&m).await?;
//! println!("segment {}", outcome.segment_id());
//! # Ok(())
//! # }
//! ```
//!
//! ## Stores
//!
//! | Store | Feature | Description |
//! |-------|---------|-------------|
//! | Memory | (default) | In-process store for testing/embedding |
//! | NGSI-LD | `http` | Context broker over HTTP |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod catalog;
pub mod shadow;
pub mod storage;
pub mod sync;
pub mod timestamp;
pub mod config;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    attr, Coordinates, Entity, EntityType, LoopShadow, Measurement, Observation, PropertyMap,
    RoadShadow, Shadow, ShadowKind, Value,
};

// ============================================================================
// Re-exports: Resolution
// ============================================================================

pub use catalog::{Catalog, CatalogRow};
pub use shadow::{CacheMatch, ShadowCache, ShadowJournal, ShadowResolver};

// ============================================================================
// Re-exports: Storage and sync
// ============================================================================

pub use storage::{AttrFilter, ContextStore, MemoryStore, StoreConfig, StoreKind};
#[cfg(feature = "http")]
pub use storage::NgsiLdStore;
pub use sync::{ContextSynchronizer, ProgressiveCounters, SyncOutcome, SyncState};
pub use config::TwinConfig;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

// ============================================================================
// Top-level pipeline handle
// ============================================================================

/// The primary entry point. A `TwinSync` owns a resolver and a
/// synchronizer and runs measurements through both.
pub struct TwinSync<S: ContextStore> {
    resolver: ShadowResolver,
    synchronizer: ContextSynchronizer<S>,
    resolve_loops: bool,
    max_jitter_minutes: u32,
    rng: Mutex<StdRng>,
}

/// What happened to one ingested measurement.
#[derive(Debug)]
pub enum IngestReport {
    Synced(SyncOutcome),
    /// Dropped after logging; the stream continues.
    Skipped { kind: ErrorKind, reason: String },
}

impl IngestReport {
    pub fn is_synced(&self) -> bool {
        matches!(self, IngestReport::Synced(_))
    }
}

impl<S: ContextStore> TwinSync<S> {
    pub fn new(resolver: ShadowResolver, synchronizer: ContextSynchronizer<S>) -> Self {
        Self {
            resolver,
            synchronizer,
            resolve_loops: false,
            max_jitter_minutes: config::TimestampConfig::default().max_jitter_minutes,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Build the whole pipeline from configuration: catalog, journal and
    /// timestamp settings. Counters are recovered from the store when
    /// `recover_counters` is set.
    pub async fn from_config(config: &TwinConfig, store: S) -> Result<Self> {
        let catalog = Catalog::load(&config.catalog_path)?;
        let resolver = match &config.journal_dir {
            Some(dir) => ShadowResolver::open(catalog, ShadowJournal::open(dir)?, config.cache_match)?,
            None => ShadowResolver::new(catalog, config.cache_match),
        };
        let synchronizer = ContextSynchronizer::new(store);
        if config.recover_counters {
            synchronizer.recover_counters().await?;
        }

        let mut twin = Self::new(resolver, synchronizer)
            .with_loop_shadows(config.resolve_loop_shadows)
            .with_max_jitter(config.timestamp.max_jitter_minutes);
        if let Some(seed) = config.timestamp.seed {
            twin = twin.with_seed(seed);
        }
        Ok(twin)
    }

    pub fn with_loop_shadows(mut self, enabled: bool) -> Self {
        self.resolve_loops = enabled;
        self
    }

    pub fn with_max_jitter(mut self, minutes: u32) -> Self {
        self.max_jitter_minutes = minutes;
        self
    }

    /// Fix the timestamp jitter RNG.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn resolver(&self) -> &ShadowResolver {
        &self.resolver
    }

    pub fn synchronizer(&self) -> &ContextSynchronizer<S> {
        &self.synchronizer
    }

    pub fn store(&self) -> &S {
        self.synchronizer.store()
    }

    /// Resolve, timestamp and sync one measurement.
    pub async fn process(&self, m: &Measurement) -> Result<SyncOutcome> {
        if m.device_id.trim().is_empty() {
            return Err(Error::InvalidMeasurement("empty deviceID".into()));
        }
        if m.lane_direction.trim().is_empty() {
            return Err(Error::InvalidMeasurement(format!("{}: empty laneDirection", m.device_id)));
        }

        let road = self
            .resolver
            .resolve(ShadowKind::Road, m)?
            .into_road()
            .ok_or_else(|| Error::Resolution {
                kind: ShadowKind::Road,
                device_id: m.device_id.clone(),
                coordinates: m.coordinates.to_string(),
                direction: m.lane_direction.clone(),
                reason: ResolutionFailure::NoCatalogMatch,
            })?;

        if self.resolve_loops {
            if let Err(e) = self.resolver.resolve(ShadowKind::Loop, m) {
                tracing::warn!(device_id = %m.device_id, error = %e, "loop shadow not resolved");
            }
        }

        let observed_at = {
            let mut rng = self.rng.lock();
            timestamp::observation_time(&m.date, &m.time_slot, self.max_jitter_minutes, &mut *rng)?
        };
        let obs = Observation::from_measurement(m, observed_at);
        self.synchronizer.sync(&road, &obs).await
    }

    /// Like [`process`](Self::process), but never fails: errors are logged
    /// here, once, and reported as skipped.
    pub async fn ingest(&self, m: &Measurement) -> IngestReport {
        match self.process(m).await {
            Ok(outcome) => IngestReport::Synced(outcome),
            Err(e) => {
                let kind = e.kind();
                match kind {
                    ErrorKind::Resolution | ErrorKind::InvalidMeasurement => tracing::warn!(
                        kind = ?kind,
                        device_id = %m.device_id,
                        date = %m.date,
                        time_slot = %m.time_slot,
                        coordinates = %m.coordinates,
                        lane_direction = %m.lane_direction,
                        error = %e,
                        "measurement skipped"
                    ),
                    _ => tracing::error!(
                        kind = ?kind,
                        device_id = %m.device_id,
                        date = %m.date,
                        time_slot = %m.time_slot,
                        traffic_flow = m.traffic_flow,
                        coordinates = %m.coordinates,
                        lane_direction = %m.lane_direction,
                        error = %e,
                        "sync failed"
                    ),
                }
                IngestReport::Skipped { kind, reason: e.to_string() }
            }
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.store().shutdown().await
    }
}

/// In-memory twin for testing and embedding.
impl TwinSync<MemoryStore> {
    pub fn open_memory(catalog: Catalog) -> Self {
        Self::new(
            ShadowResolver::new(catalog, CacheMatch::default()),
            ContextSynchronizer::new(MemoryStore::new()),
        )
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Why a measurement could not be bound to exactly one shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionFailure {
    #[error("no catalog row matches")]
    NoCatalogMatch,
    #[error("{0} catalog rows match")]
    AmbiguousCatalog(usize),
    #[error("{0} cached shadows match")]
    AmbiguousCache(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Resolution error ({kind}) for {device_id} at {coordinates} {direction}: {reason}")]
    Resolution {
        kind: ShadowKind,
        device_id: String,
        coordinates: String,
        direction: String,
        reason: ResolutionFailure,
    },

    #[error("Road entity error. Coordinates: {coordinates}, Lane Direction: {direction}: {reason}")]
    RoadEntity { coordinates: String, direction: String, reason: String },

    #[error("RoadSegment entity error. Entity ID: {entity_id}: {reason}")]
    RoadSegmentEntity { entity_id: String, reason: String },

    #[error("TrafficFlowObserved error. Supposed ID: {supposed_id}: {reason}")]
    TrafficFlowObserved { supposed_id: String, reason: String },

    #[error("Store connectivity error: {0}")]
    StoreConnectivity(String),

    #[error("Store rejected request: {0}")]
    StoreRejected(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Taxonomy kind of an [`Error`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Resolution,
    RoadEntity,
    RoadSegmentEntity,
    TrafficFlowObserved,
    StoreConnectivity,
    StoreRejected,
    Catalog,
    Journal,
    InvalidMeasurement,
    Config,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Resolution { .. } => ErrorKind::Resolution,
            Error::RoadEntity { .. } => ErrorKind::RoadEntity,
            Error::RoadSegmentEntity { .. } => ErrorKind::RoadSegmentEntity,
            Error::TrafficFlowObserved { .. } => ErrorKind::TrafficFlowObserved,
            Error::StoreConnectivity(_) => ErrorKind::StoreConnectivity,
            Error::StoreRejected(_) => ErrorKind::StoreRejected,
            Error::Catalog(_) => ErrorKind::Catalog,
            Error::Journal(_) => ErrorKind::Journal,
            Error::InvalidMeasurement(_) => ErrorKind::InvalidMeasurement,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Transport failures may succeed on redelivery. Nothing is retried
    /// inside the engine.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreConnectivity(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
