//! colmeta shard placement — replica assignment across instances.
//!
//! This crate is pure computation: it takes a [`Placement`] and returns
//! the next one. Persisting placements and retrying on concurrent writes
//! is the controller's job.
//!
//! # Components
//!
//! - **`types`** — Placement, per-instance replica sets, replica states
//! - **`placer`** — Initial build, add/replace/remove instance, and the
//!   `Initializing -> Available` transitions
//!
//! # Replica lifecycle
//!
//! ```text
//! (unassigned) -> Initializing -> Available
//!                                     |
//!                                  Leaving -> (removed)
//! ```
//!
//! A replica that is moved or replaced exists twice for a while: `Leaving`
//! on its source and `Initializing` on its destination, which records the
//! source. Marking the destination available drops the source copy.
//!
//! Balancing counts replicas only. Instance `weight` and `zone` are carried
//! through but not consulted.

pub mod error;
pub mod placer;
pub mod types;

pub use error::{PlacementError, PlacementResult};
pub use placer::{
    add_instances, build_initial, mark_instance_available, mark_namespace_available,
    mark_shards_available, remove_instances, replace_instances,
};
pub use types::{Placement, PlacementInstance, ReplicaState, ShardId, ShardReplica};
