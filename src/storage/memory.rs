//! In-memory context store.
//!
//! This is the reference implementation of `ContextStore`.
//! It uses plain HashMaps behind one RwLock so that a batch create is
//! all-or-nothing.
//!
//! ## Limitations
//!
//! - **No persistence**: everything is gone when the last handle drops.
//! - **No attribute indexes**: `query()` scans the entities of one type.
//!
//! Use this store for:
//! - Testing the resolver and synchronizer end to end
//! - Running the pipeline without a broker
//!
//! Fault injection (`set_unreachable`, `reject_creates`, `reject_updates`)
//! lets tests drive every failure path of the synchronizer.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{AttrFilter, ContextStore};
use crate::model::*;
use crate::{Error, Result};

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory context store. Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tables: RwLock<Tables>,
    faults: RwLock<Faults>,
    gets: AtomicU64,
    queries: AtomicU64,
    create_batches: AtomicU64,
    created_entities: AtomicU64,
    updates: AtomicU64,
}

#[derive(Default)]
struct Tables {
    entities: HashMap<String, Entity>,
    /// entity type → ids in creation order (poor man's type index)
    by_type: HashMap<EntityType, Vec<String>>,
}

#[derive(Default)]
struct Faults {
    unreachable: bool,
    reject_create: HashSet<EntityType>,
    reject_update: HashSet<EntityType>,
}

/// Operation counters, for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub gets: u64,
    pub queries: u64,
    pub create_batches: u64,
    pub created_entities: u64,
    pub updates: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        let i = &self.inner;
        StoreStats {
            gets: i.gets.load(Ordering::Relaxed),
            queries: i.queries.load(Ordering::Relaxed),
            create_batches: i.create_batches.load(Ordering::Relaxed),
            created_entities: i.created_entities.load(Ordering::Relaxed),
            updates: i.updates.load(Ordering::Relaxed),
        }
    }

    /// Number of entities of one type.
    pub fn count(&self, entity_type: EntityType) -> usize {
        self.inner.tables.read().by_type.get(&entity_type).map_or(0, Vec::len)
    }

    /// Synchronous peek, bypassing stats and faults.
    pub fn snapshot(&self, id: &str) -> Option<Entity> {
        self.inner.tables.read().entities.get(id).cloned()
    }

    /// Insert an entity directly, replacing any entity with the same id.
    pub fn seed(&self, entity: Entity) {
        let mut tables = self.inner.tables.write();
        if !tables.entities.contains_key(&entity.id) {
            tables.by_type.entry(entity.entity_type).or_default().push(entity.id.clone());
        }
        tables.entities.insert(entity.id.clone(), entity);
    }

    /// Drop an entity. Returns true if it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut tables = self.inner.tables.write();
        let Some(removed) = tables.entities.remove(id) else {
            return false;
        };
        if let Some(ids) = tables.by_type.get_mut(&removed.entity_type) {
            ids.retain(|e| e != id);
        }
        true
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Every operation fails with a connectivity error while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.faults.write().unreachable = unreachable;
    }

    /// Reject any batch create containing an entity of this type.
    pub fn reject_creates(&self, entity_type: EntityType) {
        self.inner.faults.write().reject_create.insert(entity_type);
    }

    /// Reject updates of entities of this type.
    pub fn reject_updates(&self, entity_type: EntityType) {
        self.inner.faults.write().reject_update.insert(entity_type);
    }

    pub fn clear_faults(&self) {
        *self.inner.faults.write() = Faults::default();
    }

    fn check_reachable(&self) -> Result<()> {
        if self.inner.faults.read().unreachable {
            return Err(Error::StoreConnectivity("memory store marked unreachable".into()));
        }
        Ok(())
    }
}

// ============================================================================
// ContextStore impl
// ============================================================================

#[async_trait]
impl ContextStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Entity>> {
        self.check_reachable()?;
        self.inner.gets.fetch_add(1, Ordering::Relaxed);
        Ok(self.inner.tables.read().entities.get(id).cloned())
    }

    async fn query(&self, entity_type: EntityType, filter: &AttrFilter) -> Result<Vec<Entity>> {
        self.check_reachable()?;
        self.inner.queries.fetch_add(1, Ordering::Relaxed);
        let tables = self.inner.tables.read();
        let Some(ids) = tables.by_type.get(&entity_type) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| tables.entities.get(id))
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn list(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        self.check_reachable()?;
        self.inner.queries.fetch_add(1, Ordering::Relaxed);
        let tables = self.inner.tables.read();
        Ok(tables
            .by_type
            .get(&entity_type)
            .map(|ids| ids.iter().filter_map(|id| tables.entities.get(id)).cloned().collect())
            .unwrap_or_default())
    }

    async fn create(&self, entities: Vec<Entity>) -> Result<()> {
        self.check_reachable()?;
        {
            let faults = self.inner.faults.read();
            if let Some(e) = entities.iter().find(|e| faults.reject_create.contains(&e.entity_type)) {
                return Err(Error::StoreRejected(format!(
                    "create of {} {} refused",
                    e.entity_type, e.id
                )));
            }
        }

        let mut tables = self.inner.tables.write();
        let mut seen = HashSet::with_capacity(entities.len());
        for e in &entities {
            if tables.entities.contains_key(&e.id) || !seen.insert(e.id.as_str()) {
                return Err(Error::StoreRejected(format!("entity {} already exists", e.id)));
            }
        }

        let n = entities.len() as u64;
        for e in entities {
            tables.by_type.entry(e.entity_type).or_default().push(e.id.clone());
            tables.entities.insert(e.id.clone(), e);
        }
        self.inner.create_batches.fetch_add(1, Ordering::Relaxed);
        self.inner.created_entities.fetch_add(n, Ordering::Relaxed);
        Ok(())
    }

    async fn update(&self, entity: &Entity) -> Result<()> {
        self.check_reachable()?;
        if self.inner.faults.read().reject_update.contains(&entity.entity_type) {
            return Err(Error::StoreRejected(format!(
                "update of {} {} refused",
                entity.entity_type, entity.id
            )));
        }

        let mut tables = self.inner.tables.write();
        let stored = tables
            .entities
            .get_mut(&entity.id)
            .ok_or_else(|| Error::StoreRejected(format!("entity {} not found", entity.id)))?;
        for (k, v) in &entity.properties {
            stored.properties.insert(k.clone(), v.clone());
        }
        for (name, targets) in &entity.relationships {
            stored.relationships.insert(name.clone(), targets.clone());
        }
        self.inner.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn segment(id: &str, edge: &str) -> Entity {
        Entity::new(EntityType::RoadSegment, id)
            .with_property(attr::EDGE_ID, edge)
            .with_property(attr::TRAFFIC_FLOW, 10i64)
    }

    #[tokio::test]
    async fn test_create_and_query_by_attribute() {
        let store = MemoryStore::new();
        store.create(vec![segment("RS001", "e1"), segment("RS002", "e2")]).await.unwrap();

        let hits = store
            .query(EntityType::RoadSegment, &AttrFilter::eq(attr::EDGE_ID, "e2"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "RS002");

        let none = store
            .query(EntityType::Road, &AttrFilter::eq(attr::EDGE_ID, "e2"))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_batch_create_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.create(vec![segment("RS001", "e1")]).await.unwrap();

        let err = store
            .create(vec![segment("RS002", "e2"), segment("RS001", "e1")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreRejected(_)));
        assert!(store.snapshot("RS002").is_none());
        assert_eq!(store.count(EntityType::RoadSegment), 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_within_batch_rejected() {
        let store = MemoryStore::new();
        let err = store
            .create(vec![segment("RS001", "e1"), segment("RS001", "e2")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreRejected(_)));
        assert_eq!(store.count(EntityType::RoadSegment), 0);
    }

    #[tokio::test]
    async fn test_update_overwrites_only_given_attributes() {
        let store = MemoryStore::new();
        store.create(vec![segment("RS001", "e1")]).await.unwrap();

        let patch = Entity::new(EntityType::RoadSegment, "RS001").with_property(attr::TRAFFIC_FLOW, 59i64);
        store.update(&patch).await.unwrap();

        let stored = store.get("RS001").await.unwrap().unwrap();
        assert_eq!(stored.get(attr::TRAFFIC_FLOW), Some(&Value::Int(59)));
        assert_eq!(stored.get(attr::EDGE_ID), Some(&Value::from("e1")));
        assert_eq!(store.stats().updates, 1);
    }

    #[tokio::test]
    async fn test_update_missing_entity_rejected() {
        let store = MemoryStore::new();
        let err = store.update(&segment("RS404", "e")).await.unwrap_err();
        assert!(matches!(err, Error::StoreRejected(_)));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        assert!(matches!(store.get("RS001").await, Err(Error::StoreConnectivity(_))));

        store.clear_faults();
        store.reject_creates(EntityType::TrafficFlowObserved);
        let tfo = Entity::new(EntityType::TrafficFlowObserved, "TFO001");
        assert!(store.create(vec![segment("RS001", "e1"), tfo]).await.is_err());
        assert_eq!(store.count(EntityType::RoadSegment), 0);
    }

    #[tokio::test]
    async fn test_remove_updates_type_index() {
        let store = MemoryStore::new();
        store.seed(segment("RS001", "e1"));
        assert!(store.remove("RS001"));
        assert!(!store.remove("RS001"));
        assert!(store.list(EntityType::RoadSegment).await.unwrap().is_empty());
    }
}
