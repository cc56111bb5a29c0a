// src/cache/mod.rs
//
// Scenario cache store.
//
// Each pipeline run writes into a freshly staged generation. Readers always
// see the active generation; `publish` swaps the active generation in one
// step, so a reader observes either the complete pre-run or the complete
// post-run state and never a partial rebuild. A staged generation that is
// never published is discarded without affecting readers.

pub mod sqlite;

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::types::{CorridorLoadRecord, PredictionRecord, RoutingDecisionRecord};

pub use sqlite::SqliteCacheStore;

pub type GenerationId = u64;

/// The three row sets for one scenario.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenarioRows {
    pub corridor_loads: Vec<CorridorLoadRecord>,
    pub predictions: Vec<PredictionRecord>,
    pub routing_decisions: Vec<RoutingDecisionRecord>,
}

impl ScenarioRows {
    pub fn is_empty(&self) -> bool {
        self.corridor_loads.is_empty() && self.predictions.is_empty() && self.routing_decisions.is_empty()
    }

    /// Rows in key order: (minute, corridor) / minute / minute.
    pub fn canonicalize(&mut self) {
        self.corridor_loads
            .sort_by(|a, b| (a.minute, &a.corridor_id).cmp(&(b.minute, &b.corridor_id)));
        self.predictions.sort_by_key(|p| p.minute);
        self.routing_decisions.sort_by_key(|r| r.minute);
    }

    /// SHA-256 over the canonical JSON encoding.
    pub fn checksum(&self) -> Result<String, CacheError> {
        let mut canonical = self.clone();
        canonical.canonicalize();
        let bytes = serde_json::to_vec(&canonical)?;
        Ok(sha256_hex(&bytes))
    }

    /// Enforce scenario ownership and per-table key uniqueness.
    pub fn check_keys(&self, scenario_id: &str) -> Result<(), CacheError> {
        let owner = |found: &str| -> Result<(), CacheError> {
            if found == scenario_id {
                Ok(())
            } else {
                Err(CacheError::ScenarioMismatch {
                    expected: scenario_id.to_string(),
                    found: found.to_string(),
                })
            }
        };

        let mut corridor_keys = HashSet::new();
        for r in &self.corridor_loads {
            owner(&r.scenario_id)?;
            if !corridor_keys.insert((r.minute, r.corridor_id.as_str())) {
                return Err(CacheError::DuplicateKey(format!(
                    "transit_cache({scenario_id}, {}, {})",
                    r.minute, r.corridor_id
                )));
            }
        }
        let mut minutes = HashSet::new();
        for r in &self.predictions {
            owner(&r.scenario_id)?;
            if !minutes.insert(r.minute) {
                return Err(CacheError::DuplicateKey(format!("predictions({scenario_id}, {})", r.minute)));
            }
        }
        minutes.clear();
        for r in &self.routing_decisions {
            owner(&r.scenario_id)?;
            if !minutes.insert(r.minute) {
                return Err(CacheError::DuplicateKey(format!(
                    "routing_decisions({scenario_id}, {})",
                    r.minute
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Generation-based keyed storage for scenario rows.
pub trait CacheStore {
    /// Open a new, empty generation for writing.
    fn stage(&self) -> Result<GenerationId, CacheError>;

    /// Write (or replace) one scenario's rows in a staged generation.
    fn write_scenario(&self, generation: GenerationId, scenario_id: &str, rows: &ScenarioRows) -> Result<(), CacheError>;

    /// Make a staged generation the one readers see.
    fn publish(&self, generation: GenerationId) -> Result<(), CacheError>;

    /// Drop a staged generation without publishing it.
    fn discard(&self, generation: GenerationId) -> Result<(), CacheError>;

    fn active_generation(&self) -> Result<Option<GenerationId>, CacheError>;

    /// Rows for a scenario in the active generation; empty if none.
    fn load_scenario(&self, scenario_id: &str) -> Result<ScenarioRows, CacheError>;

    /// Scenario ids present in the active generation.
    fn scenario_ids(&self) -> Result<Vec<String>, CacheError>;
}

#[derive(Debug, Default)]
struct Generation {
    id: GenerationId,
    scenarios: BTreeMap<String, ScenarioRows>,
}

/// In-process store. The active generation is an `Arc` swapped under a
/// write lock; readers clone the `Arc` and never block the publisher for
/// longer than the swap.
#[derive(Debug)]
pub struct MemoryCacheStore {
    active: RwLock<Option<Arc<Generation>>>,
    staged: Mutex<BTreeMap<GenerationId, Generation>>,
    next_id: AtomicU64,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(None),
            staged: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn snapshot(&self) -> Result<Option<Arc<Generation>>, CacheError> {
        let guard = self.active.read().map_err(|_| CacheError::Poisoned)?;
        Ok(guard.clone())
    }
}

impl CacheStore for MemoryCacheStore {
    fn stage(&self) -> Result<GenerationId, CacheError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut staged = self.staged.lock().map_err(|_| CacheError::Poisoned)?;
        staged.insert(id, Generation { id, scenarios: BTreeMap::new() });
        Ok(id)
    }

    fn write_scenario(&self, generation: GenerationId, scenario_id: &str, rows: &ScenarioRows) -> Result<(), CacheError> {
        rows.check_keys(scenario_id)?;
        let mut staged = self.staged.lock().map_err(|_| CacheError::Poisoned)?;
        let gen = staged
            .get_mut(&generation)
            .ok_or(CacheError::UnknownGeneration(generation))?;
        let mut rows = rows.clone();
        rows.canonicalize();
        gen.scenarios.insert(scenario_id.to_string(), rows);
        Ok(())
    }

    fn publish(&self, generation: GenerationId) -> Result<(), CacheError> {
        let gen = {
            let mut staged = self.staged.lock().map_err(|_| CacheError::Poisoned)?;
            let gen = staged
                .remove(&generation)
                .ok_or(CacheError::UnknownGeneration(generation))?;
            // Anything still staged was abandoned by an earlier run.
            staged.clear();
            gen
        };
        let mut active = self.active.write().map_err(|_| CacheError::Poisoned)?;
        *active = Some(Arc::new(gen));
        Ok(())
    }

    fn discard(&self, generation: GenerationId) -> Result<(), CacheError> {
        let mut staged = self.staged.lock().map_err(|_| CacheError::Poisoned)?;
        staged
            .remove(&generation)
            .map(|_| ())
            .ok_or(CacheError::UnknownGeneration(generation))
    }

    fn active_generation(&self) -> Result<Option<GenerationId>, CacheError> {
        Ok(self.snapshot()?.map(|g| g.id))
    }

    fn load_scenario(&self, scenario_id: &str) -> Result<ScenarioRows, CacheError> {
        Ok(self
            .snapshot()?
            .and_then(|g| g.scenarios.get(scenario_id).cloned())
            .unwrap_or_default())
    }

    fn scenario_ids(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .snapshot()?
            .map(|g| g.scenarios.keys().cloned().collect())
            .unwrap_or_default())
    }
}
