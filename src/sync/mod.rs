//! # Context Synchronizer
//!
//! Idempotent create-or-update of the twin subgraph for one resolved edge.
//!
//! ```text
//! S0 query RoadSegment by edgeID
//!  ├─ found ──► S1 update segment ─► follow refTrafficFlowObs ─► update observation
//!  └─ absent ─► S2 query Road by name
//!                ├─ found ──► create [RS, TFO]     ─► advance RS, TFO ─► add hasPart to Road
//!                └─ absent ─► create [R, RS, TFO]  ─► advance R, RS, TFO
//! ```
//!
//! Each call holds the edge's lock from S0 to the end, and every S2 also
//! holds the mint lock, so two measurements for the same new edge (or two
//! new edges of the same new road) inside one process never mint twice.
//! Across processes the store's conditional create is the backstop: it
//! rejects ids that already exist.
//!
//! Counters advance only after the store accepts the batch create. When the
//! store refuses one, the counters are re-read from the store before the
//! error is returned, so an id minted elsewhere is skipped on the next call
//! instead of being re-minted forever. The
//! Road's `hasPart` update comes after that and is not atomic with it; if
//! it fails the Road is left without the new part and the call fails with
//! a Road entity error.

pub mod counters;
pub mod entities;
pub mod locks;

use tokio::sync::Mutex as AsyncMutex;

use crate::model::*;
use crate::storage::{AttrFilter, ContextStore};
use crate::{Error, Result};

pub use counters::ProgressiveCounters;
pub use locks::EdgeLocks;

// ============================================================================
// SyncState
// ============================================================================

/// Mutable state owned by one synchronizer: counters and locks.
#[derive(Debug, Default)]
pub struct SyncState {
    pub counters: ProgressiveCounters,
    edge_locks: EdgeLocks,
    mint_lock: AsyncMutex<()>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// SyncOutcome
// ============================================================================

/// What a successful `sync` did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The edge already existed; its segment and observation were updated.
    Updated { segment_id: String, observation_id: String },
    /// A new segment and observation were created, plus the Road when
    /// `road_created` is set.
    Created {
        road_id: String,
        road_created: bool,
        segment_id: String,
        observation_id: String,
    },
}

impl SyncOutcome {
    pub fn segment_id(&self) -> &str {
        match self {
            SyncOutcome::Updated { segment_id, .. } | SyncOutcome::Created { segment_id, .. } => {
                segment_id
            }
        }
    }

    pub fn observation_id(&self) -> &str {
        match self {
            SyncOutcome::Updated { observation_id, .. }
            | SyncOutcome::Created { observation_id, .. } => observation_id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, SyncOutcome::Created { .. })
    }
}

// ============================================================================
// ContextSynchronizer
// ============================================================================

/// Create-or-update against a [`ContextStore`].
pub struct ContextSynchronizer<S: ContextStore> {
    store: S,
    state: SyncState,
}

impl<S: ContextStore> ContextSynchronizer<S> {
    pub fn new(store: S) -> Self {
        Self::with_state(store, SyncState::new())
    }

    pub fn with_state(store: S, state: SyncState) -> Self {
        Self { store, state }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn counters(&self) -> &ProgressiveCounters {
        &self.state.counters
    }

    /// Bring the store up to date with one observation of a resolved edge.
    pub async fn sync(&self, shadow: &RoadShadow, obs: &Observation) -> Result<SyncOutcome> {
        let _edge = self.state.edge_locks.acquire(&shadow.edge_id).await;

        let existing = self
            .store
            .find_first(EntityType::RoadSegment, &AttrFilter::eq(attr::EDGE_ID, shadow.edge_id.as_str()))
            .await?;
        match existing {
            Some(segment) => self.update_existing(&segment, obs).await,
            None => self.create_new(shadow, obs).await,
        }
    }

    /// Seed the counters from what the store already holds, so that a fresh
    /// process never mints an id that exists. Returns the counters after.
    pub async fn recover_counters(&self) -> Result<std::collections::BTreeMap<EntityType, u64>> {
        for entity_type in EntityType::ALL {
            let highest = self
                .store
                .list(entity_type)
                .await?
                .iter()
                .filter_map(|e| EntityType::parse_id(&e.id))
                .filter(|(t, _)| *t == entity_type)
                .map(|(_, seq)| seq)
                .max()
                .unwrap_or(0);
            let now = self.state.counters.advance(entity_type, highest);
            tracing::info!(entity_type = %entity_type, counter = now, "counter recovered");
        }
        Ok(self.state.counters.snapshot())
    }

    // ========================================================================
    // S1 UpdateExisting
    // ========================================================================

    async fn update_existing(&self, segment: &Entity, obs: &Observation) -> Result<SyncOutcome> {
        let patch = entities::observation_patch(EntityType::RoadSegment, &segment.id, obs);
        self.store.update(&patch).await.map_err(|e| Error::RoadSegmentEntity {
            entity_id: segment.id.clone(),
            reason: e.to_string(),
        })?;

        let observation_id = entities::observation_ref(segment).ok_or_else(|| {
            Error::TrafficFlowObserved {
                supposed_id: String::new(),
                reason: format!("{} has no {}", segment.id, attr::REF_TRAFFIC_FLOW_OBS),
            }
        })?;
        let tfo_error = |reason: String| Error::TrafficFlowObserved {
            supposed_id: observation_id.to_string(),
            reason,
        };

        let observation = match self.store.get(observation_id).await {
            Ok(Some(found)) => found,
            Ok(None) => return Err(tfo_error("not found in store".into())),
            Err(e) => return Err(tfo_error(e.to_string())),
        };
        let patch = entities::observation_patch(EntityType::TrafficFlowObserved, &observation.id, obs);
        self.store.update(&patch).await.map_err(|e| tfo_error(e.to_string()))?;

        tracing::debug!(
            segment_id = %segment.id,
            observation_id = %observation.id,
            traffic_flow = obs.traffic_flow,
            "twin updated"
        );
        Ok(SyncOutcome::Updated {
            segment_id: segment.id.clone(),
            observation_id: observation.id,
        })
    }

    // ========================================================================
    // S2 CreateNew
    // ========================================================================

    async fn create_new(&self, shadow: &RoadShadow, obs: &Observation) -> Result<SyncOutcome> {
        let _mint = self.state.mint_lock.lock().await;
        let counters = &self.state.counters;

        let road = self
            .store
            .find_first(EntityType::Road, &AttrFilter::eq(attr::NAME, shadow.road_name.as_str()))
            .await?;

        let rs_seq = counters.peek_next(EntityType::RoadSegment);
        let tfo_seq = counters.peek_next(EntityType::TrafficFlowObserved);
        let segment_id = EntityType::RoadSegment.format_id(rs_seq);
        let observation_id = EntityType::TrafficFlowObserved.format_id(tfo_seq);

        let road_error = |reason: String| Error::RoadEntity {
            coordinates: shadow.coordinates.to_string(),
            direction: shadow.lane_direction.clone(),
            reason,
        };

        match road {
            Some(mut road) => {
                let segment = entities::road_segment(&segment_id, shadow, obs, &road.id, &observation_id);
                let tfo = entities::traffic_flow_observed(&observation_id, shadow, obs, &segment_id);
                if let Err(e) = self.store.create(vec![segment, tfo]).await {
                    self.reseed_after_rejection(&e).await;
                    return Err(Error::RoadSegmentEntity { entity_id: segment_id, reason: e.to_string() });
                }
                counters.advance(EntityType::RoadSegment, rs_seq);
                counters.advance(EntityType::TrafficFlowObserved, tfo_seq);
                tracing::info!(
                    edge_id = %shadow.edge_id,
                    road_id = %road.id,
                    segment_id = %segment_id,
                    observation_id = %observation_id,
                    "segment created on existing road"
                );

                if road.add_relationship(attr::HAS_PART, segment_id.as_str()) {
                    let patch = entities::has_part_patch(&road);
                    if let Err(e) = self.store.update(&patch).await {
                        tracing::warn!(
                            road_id = %road.id,
                            segment_id = %segment_id,
                            error = %e,
                            "road left without hasPart for a created segment"
                        );
                        return Err(road_error(e.to_string()));
                    }
                }

                Ok(SyncOutcome::Created {
                    road_id: road.id,
                    road_created: false,
                    segment_id,
                    observation_id,
                })
            }
            None => {
                let road_seq = counters.peek_next(EntityType::Road);
                let road_id = EntityType::Road.format_id(road_seq);
                let road = entities::road(&road_id, &shadow.road_name, &segment_id);
                let segment = entities::road_segment(&segment_id, shadow, obs, &road_id, &observation_id);
                let tfo = entities::traffic_flow_observed(&observation_id, shadow, obs, &segment_id);

                if let Err(e) = self.store.create(vec![road, segment, tfo]).await {
                    self.reseed_after_rejection(&e).await;
                    return Err(road_error(e.to_string()));
                }
                counters.advance(EntityType::Road, road_seq);
                counters.advance(EntityType::RoadSegment, rs_seq);
                counters.advance(EntityType::TrafficFlowObserved, tfo_seq);
                tracing::info!(
                    edge_id = %shadow.edge_id,
                    road_id = %road_id,
                    segment_id = %segment_id,
                    observation_id = %observation_id,
                    "road, segment and observation created"
                );

                Ok(SyncOutcome::Created {
                    road_id,
                    road_created: true,
                    segment_id,
                    observation_id,
                })
            }
        }
    }

    /// A refused create usually means another writer took one of the minted
    /// ids. Connectivity failures leave the counters alone.
    async fn reseed_after_rejection(&self, err: &Error) {
        if !matches!(err, Error::StoreRejected(_)) {
            return;
        }
        match self.recover_counters().await {
            Ok(counters) => {
                tracing::warn!(error = %err, ?counters, "batch create rejected, counters reseeded");
            }
            Err(e) => tracing::warn!(error = %e, "batch create rejected, counter reseed failed"),
        }
    }
}
