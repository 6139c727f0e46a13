//! # docsync CLI
//!
//! The `docsync` binary keeps an embedding search index consistent with a
//! markdown/MDX documentation tree.
//!
//! ## Usage
//!
//! ```bash
//! docsync --config ./docsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsync init` | Create the SQLite database and run schema migrations |
//! | `docsync sync` | Run an incremental sync pass |
//! | `docsync sync --mode full` | Destructive full refresh (recovery path) |
//! | `docsync sync --dry-run` | Show discovery counts without writing |
//! | `docsync status` | Show document/section counts |

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use docsync::config;
use docsync::migrate;
use docsync::reconcile::SyncMode;
use docsync::stats;
use docsync::store::Store;
use docsync::sync;

/// docsync keeps an embedding index consistent with a markdown/MDX
/// documentation tree.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with the database path, source root, and embedding provider.
#[derive(Parser)]
#[command(
    name = "docsync",
    about = "Sync a markdown/MDX documentation tree into an embedding search index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./docsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents/sections tables.
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Run a sync pass against the source tree.
    ///
    /// Walks the configured root, sections every matching document, and
    /// reconciles the result against the store, embedding new or changed
    /// sections. Exits non-zero if any document failed.
    Sync {
        /// Incremental reuses unchanged rows; full deletes everything first
        /// and re-inserts from scratch, bypassing checksum comparison.
        #[arg(long, value_enum, default_value = "incremental")]
        mode: Mode,

        /// Walk, parse, and section without touching the store or gateway.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what's currently indexed.
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Incremental,
    Full,
}

impl From<Mode> for SyncMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Incremental => SyncMode::Incremental,
            Mode::Full => SyncMode::Full,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docsync=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = Store::open(&cfg.db.path).await?;
            migrate::run_migrations(store.pool()).await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sync { mode, dry_run } => {
            sync::run_sync(&cfg, mode.into(), dry_run).await?;
        }
        Commands::Status => {
            stats::run_status(&cfg).await?;
        }
    }

    Ok(())
}
