//! Subcommand definitions and handlers.

use clap::{Subcommand, ValueEnum};
use colmeta_core::Namespace;
use colmeta_placement::ShardId;
use serde::Serialize;

pub mod enums;
pub mod hash;
pub mod instance;
pub mod namespace;
pub mod placement;

#[derive(Subcommand)]
pub enum NamespaceAction {
    /// Register a namespace
    Create { namespace: Namespace },
    /// List registered namespaces
    List,
}

#[derive(Subcommand)]
pub enum PlacementAction {
    /// Build the initial placement from joined instances
    Build {
        #[arg(short, long)]
        namespace: Namespace,
        #[arg(long)]
        shards: u32,
        #[arg(long)]
        replicas: u32,
        /// Instance ids to place on. Defaults to every joined instance.
        #[arg(long)]
        instance: Vec<String>,
    },
    /// Print the current placement
    Show {
        #[arg(short, long)]
        namespace: Namespace,
    },
    /// Add joined instances and rebalance onto them
    Add {
        #[arg(short, long)]
        namespace: Namespace,
        #[arg(long, required = true)]
        instance: Vec<String>,
    },
    /// Hand the shards of leaving instances to new ones
    Replace {
        #[arg(short, long)]
        namespace: Namespace,
        #[arg(long, required = true)]
        leaving: Vec<String>,
        #[arg(long, required = true)]
        instance: Vec<String>,
    },
    /// Drop instances whose shards are fully replicated elsewhere
    Remove {
        #[arg(short, long)]
        namespace: Namespace,
        #[arg(long, required = true)]
        leaving: Vec<String>,
    },
    /// Mark initializing replicas available.
    ///
    /// Without --instance every replica in the namespace is marked; with
    /// --shards only those shards of the instance are.
    MarkAvailable {
        #[arg(short, long)]
        namespace: Namespace,
        #[arg(long)]
        instance: Option<String>,
        #[arg(long, value_delimiter = ',', requires = "instance")]
        shards: Vec<ShardId>,
    },
}

#[derive(Subcommand)]
pub enum EnumAction {
    /// Print the cases of an enum column in code order
    Get {
        #[arg(short, long)]
        namespace: Namespace,
        #[arg(long)]
        table: String,
        #[arg(long)]
        column: String,
    },
    /// Assign codes to cases, adding unknown ones
    Extend {
        #[arg(short, long)]
        namespace: Namespace,
        #[arg(long)]
        table: String,
        #[arg(long)]
        column: String,
        #[arg(required = true)]
        cases: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum InstanceAction {
    /// Register an instance with the cluster
    Join {
        #[arg(short, long)]
        namespace: Namespace,
        #[arg(long)]
        id: String,
        #[arg(long)]
        endpoint: String,
        #[arg(long, default_value = "")]
        zone: String,
        #[arg(long, default_value_t = 1)]
        weight: u32,
    },
    /// Remove an instance from the cluster
    Leave {
        #[arg(short, long)]
        namespace: Namespace,
        #[arg(long)]
        id: String,
    },
    /// List joined instances
    List {
        #[arg(short, long)]
        namespace: Namespace,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum HashTarget {
    Schema,
    Jobs,
    Subscribers,
    Assignment,
    Instances,
    Placement,
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
