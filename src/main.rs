//! # Docpilot server binary
//!
//! ## Usage
//!
//! ```bash
//! docpilot --config ./config/docpilot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docpilot init` | Create the SQLite database and run schema migrations |
//! | `docpilot reindex` | One-shot document scan and index rebuild check |
//! | `docpilot serve` | Start the chat HTTP server |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docpilot::auth::UserStore;
use docpilot::config::{load_config, Config};
use docpilot::embedding::OllamaEmbeddings;
use docpilot::generation::{ChatPipeline, OllamaGenerator};
use docpilot::history::MessageStore;
use docpilot::index::IndexManager;
use docpilot::server::{run_server, AppState};
use docpilot::{db, migrate};

/// Docpilot, a retrieval-augmented chat backend over a local document
/// directory.
#[derive(Parser)]
#[command(
    name = "docpilot",
    about = "A retrieval-augmented chat backend over a local document directory",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docpilot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the users and messages tables.
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Scan the document directory once and rebuild the index if changed.
    Reindex,

    /// Start the chat HTTP server.
    Serve,
}

fn build_index_manager(config: &Config) -> Result<Arc<IndexManager>> {
    let embedder = Arc::new(OllamaEmbeddings::new(&config.ollama)?);
    Ok(Arc::new(IndexManager::new(
        config.docs.dir.clone(),
        config.chunking.clone(),
        config.retrieval.clone(),
        embedder,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("initialized {}", config.db.path.display());
        }
        Commands::Reindex => {
            let index = build_index_manager(&config)?;
            let updated = index.check_and_update().await?;
            println!(
                "{}",
                if updated {
                    "Documents updated"
                } else {
                    "No updates needed"
                }
            );
        }
        Commands::Serve => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;

            let index = build_index_manager(&config)?;
            let generator = Arc::new(OllamaGenerator::new(&config.ollama)?);
            let messages = MessageStore::new(pool.clone());
            let pipeline = Arc::new(ChatPipeline::new(
                messages.clone(),
                index.clone(),
                generator,
            ));

            let state = AppState::new(
                Arc::new(config),
                UserStore::new(pool),
                messages,
                index,
                pipeline,
            );
            run_server(state).await?;
        }
    }

    Ok(())
}
