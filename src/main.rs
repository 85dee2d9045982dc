//! # Feed Sync CLI (`feedsync`)
//!
//! ## Usage
//!
//! ```bash
//! feedsync --config ./config/feedsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `feedsync init` | Create the SQLite database and run schema migrations |
//! | `feedsync sources` | List the source catalog |
//! | `feedsync sync` | Run the pipeline once and print the summary |
//! | `feedsync serve` | Start the HTTP trigger (`POST /sync`) |
//!
//! Logs go to stderr and are filtered with `RUST_LOG`
//! (default `feed_sync=info`). The run summary goes to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use feed_sync::config;
use feed_sync::migrate;
use feed_sync::pipeline::{Pipeline, PipelineOptions};
use feed_sync::server;
use feed_sync::sources;

/// Feed Sync: pulls articles from RSS/Atom feeds into a store, once per URL,
/// with an embedding for each new article.
#[derive(Parser)]
#[command(name = "feedsync", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/feedsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// List catalog sources in processing order.
    Sources,

    /// Run the pipeline once over the catalog.
    ///
    /// Exits non-zero only when the catalog cannot be read. Feed, entry and
    /// embedding failures are listed in the summary.
    Sync {
        /// Only process the source with this id.
        #[arg(long)]
        source: Option<String>,

        /// Fetch, parse and dedup, but store no articles or embeddings.
        ///
        /// The database schema is still created if missing, and no
        /// embedding API key is needed.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the HTTP trigger.
    ///
    /// Binds to `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feed_sync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Sync { source, dry_run } => {
            let options = PipelineOptions {
                dry_run,
                only_source: source,
                ..PipelineOptions::from_config(&cfg)
            };
            let pipeline = Pipeline::from_config(&cfg, options).await?;
            let summary = pipeline.run().await?;
            print!("{}", summary);
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
