//! colmetactl — operator CLI for the colmeta metadata store.
//!
//! Opens the embedded redb store named by the configuration and drives
//! the controller mutators directly. Results are printed as pretty JSON.
//!
//! # Usage
//!
//! ```text
//! colmetactl --store /tmp/meta.redb namespace create ns1
//! colmetactl --store /tmp/meta.redb instance join -n ns1 --id i1 --endpoint 10.0.0.1:9374
//! colmetactl --store /tmp/meta.redb placement build -n ns1 --shards 6 --replicas 2
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use colmeta_controller::{Controller, RetryPolicy};
use colmeta_core::config::LogConfig;
use colmeta_core::{ControllerConfig, Namespace};
use colmeta_store::RedbStore;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{EnumAction, HashTarget, InstanceAction, NamespaceAction, PlacementAction};

#[derive(Parser)]
#[command(
    name = "colmetactl",
    about = "colmeta — column-store cluster metadata",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to colmeta.toml. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override [store].path from the configuration.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Give up on a mutation after this many milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and list namespaces
    Namespace {
        #[command(subcommand)]
        action: NamespaceAction,
    },
    /// Build and evolve shard placements
    Placement {
        #[command(subcommand)]
        action: PlacementAction,
    },
    /// Read and extend enum dictionaries
    Enum {
        #[command(subcommand)]
        action: EnumAction,
    },
    /// Print the digest of a collection
    Hash {
        #[arg(value_enum)]
        target: HashTarget,
        #[arg(short, long)]
        namespace: Namespace,
        /// Subscriber whose assignment to hash (assignment only).
        #[arg(long, required_if_eq("target", "assignment"))]
        subscriber: Option<String>,
    },
    /// Manage cluster membership
    Instance {
        #[command(subcommand)]
        action: InstanceAction,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ControllerConfig::from_file(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(path) = cli.store {
        config.store.path = path;
    }
    init_tracing(&config.log)?;

    let store = RedbStore::open(&config.store.path)?;
    debug!(path = %config.store.path.display(), "opened store");

    let mut controller = Controller::new(Arc::new(store), RetryPolicy::from(&config.retry));
    if let Some(ms) = cli.timeout_ms {
        controller = controller.with_deadline(Instant::now() + Duration::from_millis(ms));
    }

    match cli.command {
        Commands::Namespace { action } => commands::namespace::run(&controller, action),
        Commands::Placement { action } => commands::placement::run(&controller, action),
        Commands::Enum { action } => commands::enums::run(&controller, action),
        Commands::Hash {
            target,
            namespace,
            subscriber,
        } => commands::hash::run(&controller, target, &namespace, subscriber.as_deref()),
        Commands::Instance { action } => commands::instance::run(&controller, action),
    }
}

/// `RUST_LOG` wins over `[log].filter`. Logs go to stderr so stdout stays
/// machine-readable.
fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&log.filter)?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_placement_build() {
        let cli = Cli::try_parse_from([
            "colmetactl",
            "--store",
            "/tmp/x.redb",
            "placement",
            "build",
            "-n",
            "ns1",
            "--shards",
            "6",
            "--replicas",
            "2",
            "--instance",
            "i1",
            "--instance",
            "i2",
        ])
        .unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/x.redb")));
        match cli.command {
            Commands::Placement {
                action:
                    PlacementAction::Build {
                        namespace,
                        shards,
                        replicas,
                        instance,
                    },
            } => {
                assert_eq!(namespace.as_str(), "ns1");
                assert_eq!((shards, replicas), (6, 2));
                assert_eq!(instance, vec!["i1", "i2"]);
            }
            _ => panic!("expected placement build"),
        }
    }

    #[test]
    fn rejects_reserved_namespace() {
        assert!(
            Cli::try_parse_from(["colmetactl", "namespace", "create", "_root"]).is_err()
        );
    }

    #[test]
    fn assignment_hash_needs_subscriber() {
        assert!(
            Cli::try_parse_from(["colmetactl", "hash", "assignment", "-n", "ns1"]).is_err()
        );
        assert!(
            Cli::try_parse_from([
                "colmetactl",
                "hash",
                "assignment",
                "-n",
                "ns1",
                "--subscriber",
                "s1"
            ])
            .is_ok()
        );
    }
}
