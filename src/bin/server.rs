//! tablesync Server Binary
//!
//! Serves a table on TCP and keeps persistent entries on disk.

use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tablesync::{Config, DisconnectPolicy, Instance, TypePolicy};
use tracing_subscriber::{fmt, EnvFilter};

/// tablesync Server
#[derive(Parser, Debug)]
#[command(name = "tablesync-server")]
#[command(about = "Synchronized hierarchical key-value table server")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "0.0.0.0:1735")]
    listen: String,

    /// Name announced to clients
    #[arg(short, long, default_value = "tablesync-server")]
    name: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "64")]
    max_connections: usize,

    /// Snapshot file for persistent entries
    #[arg(short, long)]
    persist: Option<String>,

    /// Seconds between persistent-entry saves
    #[arg(short = 'i', long, default_value = "10")]
    save_interval: u64,

    /// What a set with a different value type does
    #[arg(short, long, value_enum, default_value = "retype")]
    type_policy: TypePolicyArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TypePolicyArg {
    Retype,
    Reject,
}

impl From<TypePolicyArg> for TypePolicy {
    fn from(arg: TypePolicyArg) -> Self {
        match arg {
            TypePolicyArg::Retype => TypePolicy::Retype,
            TypePolicyArg::Reject => TypePolicy::Reject,
        }
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tablesync=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("tablesync Server v{}", tablesync::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let mut builder = Config::builder()
        .node_name(&args.name)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .disconnect_policy(DisconnectPolicy::Retain)
        .type_policy(args.type_policy.into());
    if let Some(persist) = &args.persist {
        tracing::info!("Persistent entries: {}", persist);
        builder = builder.persist_path(persist);
    }
    let config = builder.build();

    let instance = Instance::new(config);
    instance.add_connection_listener(
        |event| {
            let peer = event
                .peer
                .as_ref()
                .map(|p| format!("{} @ {}", p.name, p.addr))
                .unwrap_or_default();
            if event.joined {
                tracing::info!("Client attached: {}", peer);
            } else if event.peer.is_some() {
                tracing::info!("Client detached: {}", peer);
            }
        },
        false,
    );

    let addr = match instance.start_server() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Serving on {}", addr);

    // Runs until the process is killed; persistent entries are saved
    // periodically so at most one interval of changes is lost.
    let interval = Duration::from_secs(args.save_interval.max(1));
    loop {
        thread::sleep(interval);
        if let Some(persist) = &instance.config().persist_path {
            if let Err(e) = instance.save_persistent(persist) {
                tracing::warn!("Failed to save persistent entries: {}", e);
            }
        }
    }
}
