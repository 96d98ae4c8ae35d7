//! # Context Store Trait
//!
//! The contract between the synchronizer and the external graph store that
//! holds the long-lived Road / RoadSegment / TrafficFlowObserved entities.
//! The synchronizer only needs four operations: fetch by id, query by type
//! plus one attribute filter, batch create and overwrite update.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-process reference store for tests/embedding |
//! | `NgsiLdStore` | `http` | NGSI-LD context broker over HTTP (feature `http`) |

pub mod memory;
pub mod ngsi;
#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::*;
use crate::Result;

pub use memory::{MemoryStore, StoreStats};
#[cfg(feature = "http")]
pub use http::NgsiLdStore;

// ============================================================================
// Store Configuration
// ============================================================================

/// Which store back-end to connect to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// In-process, no persistence.
    #[default]
    Memory,
    /// NGSI-LD context broker.
    Http,
}

/// Connection settings for the external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Broker root, e.g. `http://localhost:1026`.
    pub base_url: Option<String>,
    /// Sent as `NGSILD-Tenant` when set.
    pub tenant: Option<String>,
    /// JSON-LD `@context` attached to every payload.
    pub context_url: String,
    /// Bound on every network round trip.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            base_url: None,
            tenant: None,
            context_url: ngsi::DEFAULT_CONTEXT.to_string(),
            timeout_ms: 5_000,
        }
    }
}

// ============================================================================
// Query filter
// ============================================================================

/// Equality filter on one attribute (`q=edgeID=="23288872#4"`).
#[derive(Debug, Clone, PartialEq)]
pub struct AttrFilter {
    pub attr: String,
    pub value: Value,
}

impl AttrFilter {
    pub fn eq(attr: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { attr: attr.into(), value: value.into() }
    }

    /// Does the entity carry this attribute with this value?
    pub fn matches(&self, entity: &Entity) -> bool {
        entity.get(&self.attr) == Some(&self.value)
    }
}

// ============================================================================
// ContextStore Trait
// ============================================================================

/// The external graph store contract.
///
/// Write operations either apply completely or fail; a failed batch create
/// leaves no entity behind.
#[async_trait]
pub trait ContextStore: Send + Sync + 'static {
    /// Fetch one entity by its short id. `None` when it does not exist.
    async fn get(&self, id: &str) -> Result<Option<Entity>>;

    /// All entities of a type matching the filter, in store order.
    async fn query(&self, entity_type: EntityType, filter: &AttrFilter) -> Result<Vec<Entity>>;

    /// Every entity of a type. Used for counter recovery.
    async fn list(&self, entity_type: EntityType) -> Result<Vec<Entity>>;

    /// Create a batch of entities. Rejected as a whole if any id exists.
    async fn create(&self, entities: Vec<Entity>) -> Result<()>;

    /// Overwrite the given attributes of an existing entity.
    async fn update(&self, entity: &Entity) -> Result<()>;

    /// Release connections and flush anything pending.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// First match of a query, if any.
    async fn find_first(
        &self,
        entity_type: EntityType,
        filter: &AttrFilter,
    ) -> Result<Option<Entity>> {
        Ok(self.query(entity_type, filter).await?.into_iter().next())
    }
}

#[async_trait]
impl<S: ContextStore> ContextStore for std::sync::Arc<S> {
    async fn get(&self, id: &str) -> Result<Option<Entity>> {
        (**self).get(id).await
    }

    async fn query(&self, entity_type: EntityType, filter: &AttrFilter) -> Result<Vec<Entity>> {
        (**self).query(entity_type, filter).await
    }

    async fn list(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        (**self).list(entity_type).await
    }

    async fn create(&self, entities: Vec<Entity>) -> Result<()> {
        (**self).create(entities).await
    }

    async fn update(&self, entity: &Entity) -> Result<()> {
        (**self).update(entity).await
    }

    async fn shutdown(&self) -> Result<()> {
        (**self).shutdown().await
    }
}
