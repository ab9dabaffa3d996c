//! Placement data model.

use std::collections::{BTreeMap, BTreeSet};

use colmeta_core::Instance;
use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, PlacementResult};

pub type ShardId = u32;

/// Lifecycle state of one shard replica on one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaState {
    Initializing,
    Available,
    Leaving,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardReplica {
    pub state: ReplicaState,
    /// For `Initializing` replicas that take over from another instance:
    /// the instance holding the matching `Leaving` replica.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl ShardReplica {
    pub fn initializing(source_id: Option<String>) -> Self {
        Self {
            state: ReplicaState::Initializing,
            source_id,
        }
    }

    pub fn leaving() -> Self {
        Self {
            state: ReplicaState::Leaving,
            source_id: None,
        }
    }

    /// Available or initializing.
    pub fn is_active(&self) -> bool {
        self.state != ReplicaState::Leaving
    }
}

/// An instance as seen by the placement, with its replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementInstance {
    pub id: String,
    pub endpoint: String,
    #[serde(default)]
    pub zone: String,
    pub weight: u32,
    pub shards: BTreeMap<ShardId, ShardReplica>,
}

impl PlacementInstance {
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            id: instance.id.clone(),
            endpoint: instance.endpoint.clone(),
            zone: instance.zone.clone(),
            weight: instance.weight,
            shards: BTreeMap::new(),
        }
    }

    /// Number of available or initializing replicas.
    pub fn active_load(&self) -> usize {
        self.shards.values().filter(|r| r.is_active()).count()
    }

    /// Active shard ids, ascending.
    pub fn active_shards(&self) -> Vec<ShardId> {
        self.shards
            .iter()
            .filter(|(_, r)| r.is_active())
            .map(|(&s, _)| s)
            .collect()
    }

    /// Holds only `Leaving` replicas: on its way out, never a move target.
    pub fn is_draining(&self) -> bool {
        !self.shards.is_empty() && self.active_load() == 0
    }
}

/// Shard-to-instance assignment for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub num_shards: u32,
    pub replica_factor: u32,
    pub instances: BTreeMap<String, PlacementInstance>,
}

impl Placement {
    pub fn instance(&self, id: &str) -> Option<&PlacementInstance> {
        self.instances.get(id)
    }

    /// Every replica, leaving ones included.
    pub fn replica_count(&self) -> usize {
        self.instances.values().map(|i| i.shards.len()).sum()
    }

    pub fn active_replica_count(&self) -> usize {
        self.instances.values().map(|i| i.active_load()).sum()
    }

    /// `(instance id, replica)` pairs for a shard, ascending by instance.
    pub fn replicas_of(&self, shard: ShardId) -> Vec<(&str, &ShardReplica)> {
        self.instances
            .values()
            .filter_map(|i| i.shards.get(&shard).map(|r| (i.id.as_str(), r)))
            .collect()
    }

    pub fn active_count(&self, shard: ShardId) -> usize {
        self.replicas_of(shard)
            .into_iter()
            .filter(|(_, r)| r.is_active())
            .count()
    }

    /// Active load per instance.
    pub fn loads(&self) -> BTreeMap<&str, usize> {
        self.instances
            .values()
            .map(|i| (i.id.as_str(), i.active_load()))
            .collect()
    }

    /// No transition in flight: every replica is `Available`.
    pub fn is_stable(&self) -> bool {
        self.instances
            .values()
            .flat_map(|i| i.shards.values())
            .all(|r| r.state == ReplicaState::Available)
    }

    /// Checks the structural invariants every transition must preserve:
    ///
    /// - shard ids are in `[0, num_shards)`;
    /// - each shard has exactly `replica_factor` active replicas;
    /// - every `Leaving` replica is the recorded source of exactly one
    ///   `Initializing` replica of the same shard, and every recorded
    ///   source holds that shard as `Leaving`.
    pub fn validate(&self) -> PlacementResult<()> {
        let mut handed_off: BTreeSet<(ShardId, &str)> = BTreeSet::new();
        for inst in self.instances.values() {
            for (&shard, replica) in &inst.shards {
                if shard >= self.num_shards {
                    return Err(PlacementError::Validation(format!(
                        "instance {} holds shard {shard} outside [0, {})",
                        inst.id, self.num_shards
                    )));
                }
                let Some(source) = replica.source_id.as_deref() else {
                    continue;
                };
                if replica.state != ReplicaState::Initializing {
                    return Err(PlacementError::Validation(format!(
                        "shard {shard} on {} records a source but is {:?}",
                        inst.id, replica.state
                    )));
                }
                let source_state = self
                    .instances
                    .get(source)
                    .and_then(|s| s.shards.get(&shard))
                    .map(|r| r.state);
                if source_state != Some(ReplicaState::Leaving) {
                    return Err(PlacementError::Validation(format!(
                        "shard {shard} on {} names source {source} which is not leaving it",
                        inst.id
                    )));
                }
                if !handed_off.insert((shard, source)) {
                    return Err(PlacementError::Validation(format!(
                        "shard {shard} on {source} is handed off twice"
                    )));
                }
            }
        }
        for inst in self.instances.values() {
            for (&shard, replica) in &inst.shards {
                if replica.state == ReplicaState::Leaving
                    && !handed_off.contains(&(shard, inst.id.as_str()))
                {
                    return Err(PlacementError::Validation(format!(
                        "shard {shard} is leaving {} with no replacement",
                        inst.id
                    )));
                }
            }
        }
        for shard in 0..self.num_shards {
            let active = self.active_count(shard);
            if active != self.replica_factor as usize {
                return Err(PlacementError::Validation(format!(
                    "shard {shard} has {active} active replicas, want {}",
                    self.replica_factor
                )));
            }
        }
        Ok(())
    }
}
