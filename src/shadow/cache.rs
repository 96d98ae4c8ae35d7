//! In-memory, type-partitioned shadow index.

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::{Measurement, Shadow, ShadowKey, ShadowKind};
use crate::Result;

/// How a cache hit is recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMatch {
    /// Hit when a shadow with the same natural key exists.
    #[default]
    NaturalKey,
    /// Hit only when location/device *and* the last cached flow match the
    /// incoming measurement. Misses fall through to the catalog, and the
    /// result is merged onto any shadow already holding the natural key.
    LastValue,
}

/// Result of a cache lookup that did not produce a usable shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Miss,
    /// More than one shadow satisfied the match rule.
    Ambiguous(usize),
}

#[derive(Debug, Default)]
struct Partition {
    shadows: Vec<Shadow>,
    by_key: HashMap<ShadowKey, usize>,
}

impl Partition {
    fn refresh(&mut self, idx: usize, m: &Measurement) -> Shadow {
        let shadow = &mut self.shadows[idx];
        shadow.observe(&m.time_slot, m.traffic_flow);
        shadow.clone()
    }
}

/// Shadows grouped by [`ShadowKind`], one lock per kind.
#[derive(Debug, Default)]
pub struct ShadowCache {
    road: RwLock<Partition>,
    loops: RwLock<Partition>,
}

impl ShadowCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, kind: ShadowKind) -> &RwLock<Partition> {
        match kind {
            ShadowKind::Road => &self.road,
            ShadowKind::Loop => &self.loops,
        }
    }

    /// Look up a measurement's shadow. On a hit the cached dynamic fields are
    /// overwritten with the measurement's flow and time slot.
    pub fn lookup(
        &self,
        kind: ShadowKind,
        key: &ShadowKey,
        m: &Measurement,
        mode: CacheMatch,
    ) -> std::result::Result<Shadow, CacheLookup> {
        let mut part = self.partition(kind).write();
        let idx = match mode {
            CacheMatch::NaturalKey => part.by_key.get(key).copied(),
            CacheMatch::LastValue => {
                let hits: Vec<usize> = part
                    .shadows
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.matches_last_value(m))
                    .map(|(i, _)| i)
                    .collect();
                match hits.as_slice() {
                    [] => None,
                    [i] => Some(*i),
                    many => return Err(CacheLookup::Ambiguous(many.len())),
                }
            }
        };
        match idx {
            Some(i) => Ok(part.refresh(i, m)),
            None => Err(CacheLookup::Miss),
        }
    }

    /// Insert a freshly resolved shadow.
    ///
    /// `persist` runs under the partition lock and only when the natural key
    /// is new; if it fails nothing is inserted. When the key already exists
    /// the stored shadow is refreshed from `m` and returned instead.
    pub fn insert_with<F>(&self, shadow: Shadow, m: &Measurement, persist: F) -> Result<Shadow>
    where
        F: FnOnce(&Shadow) -> Result<()>,
    {
        let key = shadow.key();
        let mut part = self.partition(shadow.kind()).write();
        let existing = part.by_key.get(&key).copied();
        if let Some(i) = existing {
            return Ok(part.refresh(i, m));
        }
        persist(&shadow)?;
        let idx = part.shadows.len();
        part.shadows.push(shadow.clone());
        part.by_key.insert(key, idx);
        Ok(shadow)
    }

    /// Seed a shadow without persisting it (journal replay).
    pub fn restore(&self, shadow: Shadow) {
        let key = shadow.key();
        let mut part = self.partition(shadow.kind()).write();
        let existing = part.by_key.get(&key).copied();
        match existing {
            Some(i) => part.shadows[i] = shadow,
            None => {
                let idx = part.shadows.len();
                part.shadows.push(shadow);
                part.by_key.insert(key, idx);
            }
        }
    }

    pub fn len(&self, kind: ShadowKind) -> usize {
        self.partition(kind).read().shadows.len()
    }

    pub fn is_empty(&self) -> bool {
        ShadowKind::ALL.into_iter().all(|k| self.len(k) == 0)
    }

    /// Copy of every shadow of one kind, in creation order.
    pub fn snapshot(&self, kind: ShadowKind) -> Vec<Shadow> {
        self.partition(kind).read().shadows.clone()
    }
}
