//! Per-type progressive counters used to mint entity ids.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::model::EntityType;

/// Highest sequence number issued per entity type.
///
/// Counters only move forward: `advance` stores `max(current, issued)`, so
/// replaying an old value or recovering from a store that is behind is a
/// no-op.
#[derive(Debug, Default)]
pub struct ProgressiveCounters {
    issued: RwLock<BTreeMap<EntityType, u64>>,
}

impl ProgressiveCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from known values (e.g. persisted by a previous run).
    pub fn with_values(values: impl IntoIterator<Item = (EntityType, u64)>) -> Self {
        let counters = Self::new();
        for (t, v) in values {
            counters.advance(t, v);
        }
        counters
    }

    pub fn get(&self, entity_type: EntityType) -> u64 {
        self.issued.read().get(&entity_type).copied().unwrap_or(0)
    }

    /// The sequence number the next create of this type will use.
    pub fn peek_next(&self, entity_type: EntityType) -> u64 {
        self.get(entity_type) + 1
    }

    /// Record `issued` as used. Returns the counter after the update.
    pub fn advance(&self, entity_type: EntityType, issued: u64) -> u64 {
        let mut map = self.issued.write();
        let slot = map.entry(entity_type).or_insert(0);
        *slot = (*slot).max(issued);
        *slot
    }

    pub fn snapshot(&self) -> BTreeMap<EntityType, u64> {
        let map = self.issued.read();
        EntityType::ALL
            .into_iter()
            .map(|t| (t, map.get(&t).copied().unwrap_or(0)))
            .collect()
    }
}
