//! # drivechat CLI
//!
//! The `drivechat` binary indexes Google Drive folders, answers questions
//! against them, and runs the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! drivechat --config ./config/drivechat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `drivechat init` | Create the record database and run schema migrations |
//! | `drivechat index <url> --owner <id>` | Index a Drive folder for an owner |
//! | `drivechat ask <owner> "<question>"` | Stream an answer from the owner's index |
//! | `drivechat status <owner>` | Show whether the owner has an index |
//! | `drivechat remove <owner>` | Delete the owner's index and record |
//! | `drivechat serve` | Start the HTTP server |
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` to change the
//! filter (default `drivechat=info`).

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tracing_subscriber::EnvFilter;

use drivechat::config;
use drivechat::drive_client::Credentials;
use drivechat::service::DriveChat;
use drivechat::{db, migrate, server};

/// Chat with the contents of a Google Drive folder.
#[derive(Parser)]
#[command(name = "drivechat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/drivechat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the record database schema. Safe to run repeatedly.
    Init,

    /// Index a Drive folder, replacing the owner's previous index.
    Index {
        /// Folder share URL (`https://drive.google.com/drive/folders/<id>`).
        url: String,

        /// Owner the index is stored under.
        #[arg(long)]
        owner: String,

        /// Display name for the index.
        #[arg(long)]
        name: Option<String>,

        /// OAuth access token with Drive read scope.
        #[arg(long, env = "DRIVE_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,

        #[arg(long, env = "DRIVE_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: Option<String>,
    },

    /// Ask a question against an owner's index.
    Ask {
        owner: String,
        question: String,
    },

    /// Show whether an owner has a usable index.
    Status { owner: String },

    /// Delete an owner's index and its record.
    Remove { owner: String },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drivechat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            std::fs::create_dir_all(&cfg.storage.index_dir).with_context(|| {
                format!("Failed to create {}", cfg.storage.index_dir.display())
            })?;
            println!("Database initialized successfully.");
        }
        Commands::Index {
            url,
            owner,
            name,
            access_token,
            refresh_token,
        } => {
            let app = DriveChat::open(cfg).await?;
            let creds = Credentials::new(access_token, refresh_token);
            let report = app
                .ingest_and_index(&url, &owner, &creds, name.as_deref())
                .await?;
            println!("index {}", owner);
            println!("  files found: {}", report.files_found);
            println!("  documents with text: {}", report.documents_with_text);
            println!("  failed: {}", report.failed);
            println!("  unsupported: {}", report.unsupported);
            println!("ok");
        }
        Commands::Ask { owner, question } => {
            let app = DriveChat::open(cfg).await?;
            let mut tokens = app.query_index(&owner, &question).await?;
            let mut stdout = std::io::stdout();
            while let Some(token) = tokens.next().await {
                stdout.write_all(token.as_bytes())?;
                stdout.flush()?;
            }
            println!();
        }
        Commands::Status { owner } => {
            let app = DriveChat::open(cfg).await?;
            let status = app.is_indexed(&owner).await?;
            if status.found {
                println!("indexed: yes");
                println!("  name: {}", status.display_name.unwrap_or_default());
                println!("  source: {}", status.source_url.unwrap_or_default());
            } else {
                println!("indexed: no");
            }
        }
        Commands::Remove { owner } => {
            let app = DriveChat::open(cfg).await?;
            if app.remove_index(&owner).await? {
                println!("removed index for {}", owner);
            } else {
                println!("no index for {}", owner);
            }
        }
        Commands::Serve => {
            let app = Arc::new(DriveChat::open(cfg).await?);
            server::run_server(app).await?;
        }
    }

    Ok(())
}
