// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strata - layered memory for conversational agents.
//!
//! Binary entry point: ingest conversation exports, query the layered
//! index, and maintain the store from the command line.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};
use strata_core::UserId;

mod engine;
mod export;
mod tasks;

use engine::MemoryEngine;

/// Strata - layered memory for conversational agents.
#[derive(Parser, Debug)]
#[command(name = "strata", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest a conversation export file for a user.
    Ingest {
        /// Owner of the ingested history.
        #[arg(long)]
        user: String,
        /// Path to the export JSON file.
        #[arg(long)]
        file: std::path::PathBuf,
        /// Also run a fact-learning pass over each conversation.
        #[arg(long)]
        learn: bool,
    },
    /// Retrieve context for a query.
    Query {
        #[arg(long)]
        user: String,
        /// The query text.
        query: String,
        /// Maximum chunks to return.
        #[arg(long, default_value_t = 8)]
        top_k: usize,
    },
    /// Embed chunks whose embedding batches failed during ingestion.
    Reembed {
        #[arg(long)]
        user: String,
    },
    /// Retract a learned fact by id.
    Retract {
        #[arg(long)]
        user: String,
        #[arg(long)]
        fact_id: String,
    },
    /// Show stored chunk and fact counts for a user.
    Status {
        #[arg(long)]
        user: String,
    },
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("strata={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match strata_config::load_and_validate() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("strata: {err}");
            std::process::exit(1);
        }
    };
    init_tracing(&config.engine.log_level);

    if let Err(err) = run(cli.command, config).await {
        eprintln!("strata: {err}");
        std::process::exit(1);
    }
}

async fn run(
    command: Commands,
    config: strata_config::StrataConfig,
) -> Result<(), strata_core::StrataError> {
    let engine = MemoryEngine::from_config(config).await?;

    match command {
        Commands::Ingest { user, file, learn } => {
            let user_id = UserId(user);
            let raw = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| strata_core::StrataError::Config(format!(
                    "cannot read export file {}: {e}",
                    file.display()
                )))?;

            let report = engine.ingest(&user_id, &raw).await?;
            if learn {
                let parsed = export::parse_export(&raw)?;
                for conversation in &parsed.conversations {
                    let text: Vec<String> = conversation
                        .messages
                        .iter()
                        .map(|m| format!("{}: {}", m.role, m.text))
                        .collect();
                    engine.schedule_learning(&user_id, text.join("\n"));
                }
            }
            engine.shutdown().await;
            println!("{}", render_json(&report));
        }
        Commands::Query { user, query, top_k } => {
            let context = engine.retrieve_context(&UserId(user), &query, top_k).await;
            println!("{}", render_json(&context));
        }
        Commands::Reembed { user } => {
            let updated = engine.reembed_pending(&UserId(user)).await?;
            println!("{}", render_json(&serde_json::json!({ "reembedded": updated })));
        }
        Commands::Retract { user, fact_id } => {
            let retracted = engine.retract_fact(&UserId(user), &fact_id).await?;
            println!("{}", render_json(&serde_json::json!({ "retracted": retracted })));
        }
        Commands::Status { user } => {
            let (chunks, facts) = engine.counts(&UserId(user)).await?;
            println!(
                "{}",
                render_json(&serde_json::json!({
                    "chunks": chunks,
                    "active_facts": facts,
                    "cost": engine.cost_summary(),
                }))
            );
        }
    }
    Ok(())
}

fn render_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
