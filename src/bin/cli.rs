//! MiniKV operator CLI
//!
//! Runs single operations directly against a data directory. Useful for
//! inspecting a store after a crash or forcing a checkpoint.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use minikv::wal::WalRecovery;
use minikv::{Config, PersistenceBackend, SnapshotFile, Store, SyncMode, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// MiniKV CLI
#[derive(Parser, Debug)]
#[command(name = "minikv")]
#[command(about = "Inspect and modify a MiniKV data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./minikv_data")]
    data_dir: PathBuf,

    /// Use fsync instead of fdatasync for WAL appends
    #[arg(long)]
    full_sync: bool,

    /// Skip the checkpoint normally taken on exit
    #[arg(long)]
    no_checkpoint: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair (null/true/false/numbers are typed, the rest are strings)
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Check whether a key exists
    Exists {
        /// The key to check
        key: String,
    },

    /// List all keys
    Keys,

    /// List all entries
    Items,

    /// Count entries
    Size,

    /// Remove every entry
    Clear,

    /// Write a snapshot and prune the WAL
    Checkpoint,

    /// Show store counters
    Stats,

    /// Check the WAL for torn or corrupt records without opening the store
    VerifyWal,

    /// Read one key from the last snapshot, ignoring the WAL
    SnapshotGet {
        /// The key to look up
        key: String,
    },
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,minikv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> minikv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .wal_sync(if args.full_sync {
            SyncMode::Full
        } else {
            SyncMode::Data
        })
        .checkpoint_on_close(!args.no_checkpoint)
        .build();

    if let Commands::VerifyWal = args.command {
        let result = WalRecovery::verify(&config.wal_file())?;
        println!("records:   {}", result.records_recovered);
        println!("last_seq:  {}", result.last_seq);
        println!("valid_len: {}", result.valid_len);
        match result.corrupted_tail {
            Some(reason) => println!("tail:      corrupt ({})", reason),
            None => println!("tail:      clean"),
        }
        return Ok(());
    }

    if let Commands::SnapshotGet { key } = &args.command {
        let mut snapshot = SnapshotFile::new(config.snapshot_file());
        snapshot.load_all()?;
        println!("checkpoint_seq: {}", snapshot.checkpoint_seq());
        match snapshot.load(key)? {
            Some(value) => println!("{}", value),
            None => println!("(not found)"),
        }
        return Ok(());
    }

    tracing::debug!("Opening {}", config.data_dir.display());
    let store = Store::open(config)?;

    match args.command {
        Commands::Get { key } => match store.get(&key)? {
            Some(value) => println!("{}", value),
            None => println!("(not found)"),
        },
        Commands::Set { key, value } => {
            store.set(key, Value::infer(&value))?;
            println!("OK");
        }
        Commands::Del { key } => {
            if store.delete(&key)? {
                println!("OK");
            } else {
                println!("(not found)");
            }
        }
        Commands::Exists { key } => println!("{}", store.exists(&key)),
        Commands::Keys => {
            let mut keys = store.keys();
            keys.sort();
            for key in keys {
                println!("{}", key);
            }
        }
        Commands::Items => {
            let mut items = store.items();
            items.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        Commands::Size => println!("{}", store.size()),
        Commands::Clear => {
            store.clear()?;
            println!("OK");
        }
        Commands::Checkpoint => {
            let stats = store.checkpoint()?;
            println!(
                "checkpoint seq={} entries={} staged={} written={}",
                stats.seq, stats.entries, stats.keys_staged, stats.written
            );
        }
        Commands::Stats => {
            let stats = store.stats();
            println!("entries:        {}", stats.entries);
            println!("wal_last_seq:   {}", stats.wal_last_seq);
            println!("wal_records:    {}", stats.wal_records);
            println!("checkpoint_seq: {}", stats.checkpoint_seq);
            println!("dirty_keys:     {}", stats.dirty_keys);
        }
        Commands::VerifyWal | Commands::SnapshotGet { .. } => {}
    }

    store.close()
}
