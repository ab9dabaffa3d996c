//! Placement engine — computes the next placement for each transition.
//!
//! Every function is deterministic: candidate instances are ranked by
//! active load and then by ascending id, shards by ascending id. The same
//! input placement and request always produce the same output, which keeps
//! retries after a version conflict reproducible.

use std::collections::{BTreeMap, BTreeSet};

use colmeta_core::Instance;
use tracing::{debug, info};

use crate::error::{PlacementError, PlacementResult};
use crate::types::{Placement, PlacementInstance, ReplicaState, ShardId, ShardReplica};

/// Build the first placement for a namespace.
///
/// Replica `k` of shard `s` goes to instance `(s * replica_factor + k) mod n`
/// over instances sorted by id. Consecutive slots are distinct while
/// `replica_factor <= n`, and the round-robin keeps per-instance counts
/// within one of each other.
pub fn build_initial(
    num_shards: u32,
    replica_factor: u32,
    instances: &[Instance],
) -> PlacementResult<Placement> {
    if instances.is_empty() {
        return Err(PlacementError::Validation(
            "at least one instance is required".to_string(),
        ));
    }
    if replica_factor < 1 {
        return Err(PlacementError::Validation(
            "replica factor must be at least 1".to_string(),
        ));
    }
    if num_shards < 1 {
        return Err(PlacementError::Validation(
            "shard count must be at least 1".to_string(),
        ));
    }
    if replica_factor as usize > instances.len() {
        return Err(PlacementError::Validation(format!(
            "replica factor {replica_factor} exceeds instance count {}",
            instances.len()
        )));
    }
    let members = new_members(instances)?;

    let mut slots: Vec<PlacementInstance> = members.into_values().collect();
    let n = slots.len();
    for shard in 0..num_shards {
        for k in 0..replica_factor {
            let slot = (shard as usize * replica_factor as usize + k as usize) % n;
            slots[slot]
                .shards
                .insert(shard, ShardReplica::initializing(None));
        }
    }

    let placement = Placement {
        num_shards,
        replica_factor,
        instances: slots.into_iter().map(|i| (i.id.clone(), i)).collect(),
    };
    placement.validate()?;
    info!(
        shards = num_shards,
        replicas = replica_factor,
        instances = n,
        "built initial placement"
    );
    Ok(placement)
}

/// Add instances and move just enough replicas onto them to rebalance.
///
/// Targets are `total / n` with the remainder going to the most loaded
/// instances first, so existing instances keep as much as possible.
/// Initializing replicas move before available ones.
pub fn add_instances(current: &Placement, new: &[Instance]) -> PlacementResult<Placement> {
    if new.is_empty() {
        return Err(PlacementError::Validation(
            "no instances to add".to_string(),
        ));
    }
    let members = new_members(new)?;
    for id in members.keys() {
        if current.instances.contains_key(id) {
            return Err(PlacementError::AlreadyExists(format!(
                "instance {id} is already in the placement"
            )));
        }
    }

    let mut next = current.clone();
    next.instances.extend(members);
    let moved = rebalance(&mut next);
    next.validate()?;
    info!(added = new.len(), moved, "added instances to placement");
    Ok(next)
}

/// Hand every active replica of `leaving` over to the new instances.
///
/// Each shard goes to the least loaded new instance that does not hold it
/// yet. A leaving instance left without replicas is dropped.
pub fn replace_instances(
    current: &Placement,
    leaving: &[String],
    new: &[Instance],
) -> PlacementResult<Placement> {
    let leaving = leaving_set(current, leaving)?;
    for id in &leaving {
        let holds = current.instances[id.as_str()].active_load();
        if holds == 0 {
            return Err(PlacementError::NotFound(format!(
                "instance {id} holds no replicas to replace"
            )));
        }
    }
    if new.is_empty() {
        return Err(PlacementError::Validation(
            "no replacement instances given".to_string(),
        ));
    }
    let members = new_members(new)?;
    for id in members.keys() {
        if current.instances.contains_key(id) {
            return Err(PlacementError::AlreadyExists(format!(
                "instance {id} is already in the placement"
            )));
        }
    }
    let replacements: Vec<String> = members.keys().cloned().collect();

    let mut next = current.clone();
    next.instances.extend(members);

    for from in &leaving {
        let shards = next.instances[from.as_str()].active_shards();
        for shard in shards {
            let Some(to) = least_loaded(&next, &replacements, shard) else {
                return Err(PlacementError::Validation(format!(
                    "no replacement instance can take shard {shard} from {from}"
                )));
            };
            move_replica(&mut next, shard, from, &to);
        }
    }
    // Initializing replicas leave nothing behind; an emptied instance is gone.
    next.instances
        .retain(|id, inst| !(leaving.contains(id) && inst.shards.is_empty()));

    next.validate()?;
    info!(
        leaving = ?leaving,
        added = replacements.len(),
        "replaced instances in placement"
    );
    Ok(next)
}

/// Drop instances whose active replicas are already covered elsewhere.
///
/// Fails if any shard would fall below the replica factor. Leaving
/// replicas go with their instance, and initializing replicas that named
/// a removed instance as source forget it.
pub fn remove_instances(current: &Placement, leaving: &[String]) -> PlacementResult<Placement> {
    let leaving = leaving_set(current, leaving)?;

    let mut short = Vec::new();
    for shard in 0..current.num_shards {
        let remaining = current
            .replicas_of(shard)
            .into_iter()
            .filter(|(id, r)| r.is_active() && !leaving.contains(*id))
            .count();
        if remaining < current.replica_factor as usize {
            short.push(shard);
        }
    }
    if !short.is_empty() {
        return Err(PlacementError::Validation(format!(
            "removing {leaving:?} would leave shards {short:?} below replica factor {}",
            current.replica_factor
        )));
    }

    let mut next = current.clone();
    next.instances.retain(|id, _| !leaving.contains(id));
    for inst in next.instances.values_mut() {
        for replica in inst.shards.values_mut() {
            if replica
                .source_id
                .as_ref()
                .is_some_and(|src| leaving.contains(src))
            {
                replica.source_id = None;
            }
        }
    }

    next.validate()?;
    info!(removed = ?leaving, "removed instances from placement");
    Ok(next)
}

/// Mark the given initializing shards on `instance` available.
///
/// Already-available shards are skipped. A leaving shard cannot be marked.
pub fn mark_shards_available(
    current: &Placement,
    instance: &str,
    shards: &[ShardId],
) -> PlacementResult<Placement> {
    let inst = current
        .instance(instance)
        .ok_or_else(|| PlacementError::NotFound(format!("instance {instance}")))?;
    for shard in shards {
        match inst.shards.get(shard).map(|r| r.state) {
            None => {
                return Err(PlacementError::NotFound(format!(
                    "shard {shard} on instance {instance}"
                )));
            }
            Some(ReplicaState::Leaving) => {
                return Err(PlacementError::Validation(format!(
                    "shard {shard} on instance {instance} is leaving"
                )));
            }
            Some(_) => {}
        }
    }

    let mut next = current.clone();
    for &shard in shards {
        mark_available(&mut next, instance, shard);
    }
    next.validate()?;
    Ok(next)
}

/// Mark every initializing shard on `instance` available.
pub fn mark_instance_available(current: &Placement, instance: &str) -> PlacementResult<Placement> {
    let inst = current
        .instance(instance)
        .ok_or_else(|| PlacementError::NotFound(format!("instance {instance}")))?;
    let pending = initializing_shards(inst);
    let mut next = current.clone();
    for shard in pending {
        mark_available(&mut next, instance, shard);
    }
    next.validate()?;
    Ok(next)
}

/// Mark every initializing replica in the placement available.
pub fn mark_namespace_available(current: &Placement) -> PlacementResult<Placement> {
    let pending: Vec<(String, ShardId)> = current
        .instances
        .values()
        .flat_map(|i| initializing_shards(i).into_iter().map(|s| (i.id.clone(), s)))
        .collect();
    let mut next = current.clone();
    for (instance, shard) in pending {
        mark_available(&mut next, &instance, shard);
    }
    next.validate()?;
    Ok(next)
}

// ── Internals ──────────────────────────────────────────────────────

fn new_members(instances: &[Instance]) -> PlacementResult<BTreeMap<String, PlacementInstance>> {
    let mut members = BTreeMap::new();
    for instance in instances {
        instance
            .validate()
            .map_err(|e| PlacementError::Validation(e.to_string()))?;
        if members
            .insert(instance.id.clone(), PlacementInstance::from_instance(instance))
            .is_some()
        {
            return Err(PlacementError::Validation(format!(
                "instance {} listed twice",
                instance.id
            )));
        }
    }
    Ok(members)
}

fn leaving_set(current: &Placement, leaving: &[String]) -> PlacementResult<BTreeSet<String>> {
    if leaving.is_empty() {
        return Err(PlacementError::Validation(
            "no leaving instances given".to_string(),
        ));
    }
    let mut set = BTreeSet::new();
    for id in leaving {
        if !current.instances.contains_key(id) {
            return Err(PlacementError::NotFound(format!(
                "instance {id} is not in the placement"
            )));
        }
        set.insert(id.clone());
    }
    Ok(set)
}

fn initializing_shards(inst: &PlacementInstance) -> Vec<ShardId> {
    inst.shards
        .iter()
        .filter(|(_, r)| r.state == ReplicaState::Initializing)
        .map(|(&s, _)| s)
        .collect()
}

/// Least loaded candidate not holding `shard` in any state; ties by id.
fn least_loaded(placement: &Placement, candidates: &[String], shard: ShardId) -> Option<String> {
    candidates
        .iter()
        .filter_map(|id| placement.instances.get(id))
        .filter(|i| !i.shards.contains_key(&shard))
        .min_by(|a, b| a.active_load().cmp(&b.active_load()).then(a.id.cmp(&b.id)))
        .map(|i| i.id.clone())
}

/// Move one active replica of `shard` from `from` to `to`.
///
/// An available replica stays behind as `Leaving` and the destination
/// records it as source. An initializing replica has nothing to copy yet,
/// so it is dropped and its own source (if any) passes to the destination.
fn move_replica(placement: &mut Placement, shard: ShardId, from: &str, to: &str) {
    let Some(source) = placement.instances.get_mut(from) else {
        return;
    };
    let Some(replica) = source.shards.remove(&shard) else {
        return;
    };
    let handed = match replica.state {
        ReplicaState::Available => {
            source.shards.insert(shard, ShardReplica::leaving());
            ShardReplica::initializing(Some(from.to_string()))
        }
        ReplicaState::Initializing => ShardReplica::initializing(replica.source_id),
        ReplicaState::Leaving => {
            source.shards.insert(shard, replica);
            return;
        }
    };
    if let Some(dest) = placement.instances.get_mut(to) {
        dest.shards.insert(shard, handed);
    }
    debug!(shard, from, to, "moved replica");
}

fn mark_available(placement: &mut Placement, instance: &str, shard: ShardId) {
    let Some(replica) = placement
        .instances
        .get_mut(instance)
        .and_then(|i| i.shards.get_mut(&shard))
    else {
        return;
    };
    if replica.state != ReplicaState::Initializing {
        return;
    }
    replica.state = ReplicaState::Available;
    let Some(source) = replica.source_id.take() else {
        debug!(instance, shard, "replica available");
        return;
    };

    let drained = match placement.instances.get_mut(&source) {
        Some(src) => {
            if src.shards.get(&shard).map(|r| r.state) == Some(ReplicaState::Leaving) {
                src.shards.remove(&shard);
            }
            src.shards.is_empty()
        }
        None => false,
    };
    if drained {
        placement.instances.remove(&source);
        info!(instance = %source, "instance fully handed off; dropped from placement");
    }
    debug!(instance, shard, %source, "replica available; source released");
}

/// Move replicas from instances above their target to instances below it.
/// Returns the number of replicas moved.
fn rebalance(placement: &mut Placement) -> usize {
    let mut members: Vec<(String, usize)> = placement
        .instances
        .values()
        .filter(|i| !i.is_draining())
        .map(|i| (i.id.clone(), i.active_load()))
        .collect();
    if members.is_empty() {
        return 0;
    }
    let total: usize = members.iter().map(|(_, load)| load).sum();
    let base = total / members.len();
    let extra = total % members.len();

    members.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let targets: BTreeMap<String, usize> = members
        .iter()
        .enumerate()
        .map(|(rank, (id, _))| (id.clone(), base + usize::from(rank < extra)))
        .collect();

    let mut moved = 0;
    for (donor, &target) in &targets {
        loop {
            let load = placement.instances[donor.as_str()].active_load();
            if load <= target {
                break;
            }
            let receivers: Vec<String> = targets
                .iter()
                .filter(|(id, t)| placement.instances[id.as_str()].active_load() < **t)
                .map(|(id, _)| id.clone())
                .collect();
            let Some((shard, to)) = pick_move(placement, donor, &receivers) else {
                debug!(instance = %donor, load, target, "no legal move left");
                break;
            };
            move_replica(placement, shard, donor, &to);
            moved += 1;
        }
    }
    moved
}

/// Choose the next shard to move off `donor`: initializing replicas first,
/// then ascending shard id, each paired with its least loaded receiver.
fn pick_move(placement: &Placement, donor: &str, receivers: &[String]) -> Option<(ShardId, String)> {
    let inst = &placement.instances[donor];
    let mut candidates: Vec<(ShardId, ReplicaState)> = inst
        .shards
        .iter()
        .filter(|(_, r)| r.is_active())
        .map(|(&s, r)| (s, r.state))
        .collect();
    candidates.sort_by_key(|&(shard, state)| (state != ReplicaState::Initializing, shard));
    candidates
        .into_iter()
        .find_map(|(shard, _)| least_loaded(placement, receivers, shard).map(|to| (shard, to)))
}
