//! tablesync CLI Client
//!
//! Command-line interface for reading and writing a served table.

use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tablesync::{Config, DisconnectPolicy, EventKind, EventMask, Instance, TreeNode, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// tablesync CLI
#[derive(Parser, Debug)]
#[command(name = "tablesync-cli")]
#[command(about = "CLI for a synchronized key-value table")]
#[command(version)]
struct Args {
    /// Server address (port defaults to 1735)
    #[arg(short, long, default_value = "127.0.0.1:1735")]
    server: String,

    /// Seconds to wait for the initial sync
    #[arg(short, long, default_value = "5")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the value of an entry
    Get {
        /// Full entry path
        path: String,
    },

    /// Set an entry
    Set {
        /// Full entry path
        path: String,

        /// The value to set (arrays are comma separated)
        value: String,

        /// Value type
        #[arg(short = 'y', long = "type", value_enum, default_value = "double")]
        kind: KindArg,

        /// Flag the entry persistent
        #[arg(short, long)]
        persistent: bool,
    },

    /// Delete an entry
    Delete {
        /// Full entry path
        path: String,
    },

    /// Print every entry at or below a prefix as a tree
    List {
        /// Sub-table path (empty for everything)
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Print changes at or below a prefix until interrupted
    Watch {
        /// Sub-table path (empty for everything)
        #[arg(default_value = "")]
        prefix: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Boolean,
    Double,
    String,
    BooleanArray,
    DoubleArray,
    StringArray,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    // A one-shot CLI never reconnects, so there is nothing to clear
    let config = Config::builder()
        .node_name("tablesync-cli")
        .disconnect_policy(DisconnectPolicy::Retain)
        .build();
    let instance = Instance::new(config);

    if let Err(e) = instance.connect_as_client(&args.server) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
    if !instance.wait_for_sync(Duration::from_secs(args.timeout)) {
        eprintln!("error: no sync with {} within {}s", args.server, args.timeout);
        std::process::exit(1);
    }

    let code = run(&instance, args.command);
    instance.disconnect();
    std::process::exit(code);
}

fn run(instance: &Instance, command: Commands) -> i32 {
    match command {
        Commands::Get { path } => match instance.entry(&path).value() {
            Some(value) => {
                println!("{}", value);
                0
            }
            None => {
                eprintln!("(not found)");
                1
            }
        },

        Commands::Set {
            path,
            value,
            kind,
            persistent,
        } => {
            let value = match parse_value(&value, kind) {
                Ok(value) => value,
                Err(e) => {
                    eprintln!("error: {}", e);
                    return 2;
                }
            };
            let entry = instance.entry(&path);
            let result = entry.set(value).and_then(|version| {
                if persistent {
                    entry.set_persistent(true)?;
                }
                Ok(version)
            });
            match result {
                Ok(version) => {
                    if !instance.flush(Duration::from_secs(2)) {
                        eprintln!("warning: update may not have reached the server");
                    }
                    println!("OK (version {})", version);
                    0
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    1
                }
            }
        }

        Commands::Delete { path } => {
            if instance.entry(&path).delete() {
                instance.flush(Duration::from_secs(2));
                println!("OK");
                0
            } else {
                eprintln!("(not found)");
                1
            }
        }

        Commands::List { prefix } => {
            let tree = instance.build_tree(&prefix);
            print_tree(instance, &tree, 0);
            0
        }

        Commands::Watch { prefix } => {
            instance.add_entry_listener(
                &prefix,
                EventMask::ALL | EventMask::IMMEDIATE,
                |event| match (event.kind, &event.value) {
                    (EventKind::Delete, _) => println!("- {}", event.path),
                    (_, Some(value)) => {
                        println!("{} = {} (v{})", event.path, value, event.version)
                    }
                    (_, None) => {}
                },
            );
            loop {
                thread::sleep(Duration::from_secs(1));
                if !instance.is_connected() {
                    eprintln!("connection lost");
                    return 1;
                }
            }
        }
    }
}

fn parse_value(raw: &str, kind: KindArg) -> Result<Value, String> {
    let items = || raw.split(',').map(str::trim).filter(|s| !s.is_empty());
    match kind {
        KindArg::Boolean => parse_bool(raw).map(Value::Boolean),
        KindArg::Double => parse_double(raw).map(Value::Double),
        KindArg::String => Ok(Value::String(raw.to_string())),
        KindArg::BooleanArray => items()
            .map(parse_bool)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::BooleanArray),
        KindArg::DoubleArray => items()
            .map(parse_double)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::DoubleArray),
        KindArg::StringArray => Ok(Value::StringArray(items().map(String::from).collect())),
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        other => Err(format!("'{}' is not a boolean", other)),
    }
}

fn parse_double(raw: &str) -> Result<f64, String> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| format!("'{}' is not a number", raw.trim()))
}

fn print_tree(instance: &Instance, node: &TreeNode, depth: usize) {
    let indent = "  ".repeat(depth);
    for child in node.children.values() {
        if child.is_entry {
            if let Some(value) = instance.entry(&child.path).value() {
                println!("{}{} = {}", indent, child.name, value);
            }
        }
        // A key can be both an entry and a sub-table
        if child.is_table() {
            println!("{}{}/", indent, child.name);
            print_tree(instance, child, depth + 1);
        }
    }
}
