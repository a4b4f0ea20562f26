//! notegraph: concept extraction and note associations for a markdown vault.
//!
//! Environment variables:
//!   DATABASE_URL  - use the PostgreSQL concept registry (optional)
//!   OLLAMA_BASE   - Ollama server URL
//!   LOG_FORMAT    - "json" or "text" (default: "text")
//!   LOG_ANSI      - "true"/"false" override ANSI colors (auto-detected by default)
//!   RUST_LOG      - standard env filter (default: "warn,notegraph=info")
//!   NOTEGRAPH_*   - configuration overrides when no config file is given

mod app;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notegraph_core::StopFlag;

use crate::app::{load_config, App};

#[derive(Parser)]
#[command(name = "notegraph")]
#[command(author, version, about = "Concept graph for a markdown vault")]
#[command(propagate_version = true)]
struct Cli {
    /// Vault root directory
    #[arg(short, long, env = "NOTEGRAPH_VAULT", default_value = ".")]
    vault: PathBuf,

    /// YAML config file (default: NOTEGRAPH_* environment variables)
    #[arg(short, long, env = "NOTEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract concepts for every note (or one note) and update the index
    Sync {
        /// Sync a single note by vault-relative path
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Rebuild the index from stored note metadata without calling the model
    Rebuild,

    /// List discovered associations
    Associations {
        /// Only associations touching this note
        #[arg(short, long)]
        note: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics
    Stats {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Hide the association between two notes
    Ignore { a: String, b: String },

    /// Show a previously ignored association again
    Unignore { a: String, b: String },

    /// Remove a shared concept from the association between two notes
    Forget {
        a: String,
        b: String,
        concept: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn,notegraph=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    // stdout carries command output, logs go to stderr
    if log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        if let Some(ansi) = log_ansi {
            layer = layer.with_ansi(ansi);
        }
        registry.with(layer).init();
    }
}

/// Stop flag that fires on Ctrl-C. The current note finishes or is
/// abandoned, then the batch ends.
fn stop_on_ctrl_c() -> StopFlag {
    let stop = StopFlag::new();
    let handle = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(subsystem = "cli", "Stop requested, finishing up");
            handle.stop();
        }
    });
    stop
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if !cli.vault.is_dir() {
        bail!("vault directory {} does not exist", cli.vault.display());
    }
    let config = load_config(cli.config.as_deref())?;
    let app = App::open(&cli.vault, config).await?;
    let stop = stop_on_ctrl_c();

    match cli.command {
        Commands::Sync { note: Some(note) } => {
            app.load_index(&stop).await?;
            let analysis = app.graph.sync_note(&note, &stop).await?;
            app.save_index().await?;
            if !analysis.is_skipped() {
                println!("{}: {} ({})", note, analysis.resolved_concepts().0.join(", "), analysis.outcome.source);
            }
        }
        Commands::Sync { note: None } => {
            app.load_index(&stop).await?;
            let report = app.graph.sync_all(&stop).await?;
            app.save_index().await?;
            println!("{}", output::format_report("Sync", &report));
        }
        Commands::Rebuild => {
            let report = app.graph.rebuild_index(&stop).await?;
            if !report.stopped {
                app.save_index().await?;
            }
            println!("{}", output::format_report("Rebuild", &report));
        }
        Commands::Associations { note, json } => {
            app.load_index(&stop).await?;
            let associations = match note {
                Some(note) => app.graph.associations_for_note(&note).await,
                None => app.graph.associations().await,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&associations)?);
            } else {
                println!("{}", output::format_associations(&associations));
            }
        }
        Commands::Stats { json } => {
            app.load_index(&stop).await?;
            let stats = app.graph.stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", output::format_stats(&stats));
            }
        }
        Commands::Ignore { a, b } => {
            app.graph.ignore_association(&a, &b).await?;
            println!("Ignoring {} <-> {}", a, b);
        }
        Commands::Unignore { a, b } => {
            if app.graph.unignore_association(&a, &b).await? {
                println!("Restored {} <-> {}", a, b);
            } else {
                println!("{} <-> {} was not ignored", a, b);
            }
        }
        Commands::Forget { a, b, concept } => {
            app.graph.delete_shared_concept(&a, &b, &concept).await?;
            println!("Removed '{}' from {} <-> {}", concept, a, b);
        }
    }
    Ok(())
}
