use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{json, Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pairup::{
    config::{RunArgs, ServeConfig},
    db::Database,
    web, HistoryIndex, HistoryRecord, Participant,
};

#[derive(Parser)]
#[command(name = "pairup", version, about = "Pair up people who have not met yet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Serve the review service over HTTP
    Serve(ServeConfig),
    /// Run one round from JSON files and print the result
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pairup=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Commands::Serve(config) => serve(config).await,
        Commands::Run(args) => run_once(&args),
    }
}

async fn serve(config: ServeConfig) -> Result<()> {
    let db = Database::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    if config.webhook_url.is_none() {
        tracing::warn!("no webhook URL configured, pushing rounds is disabled");
    }
    let app = web::router(web::AppState::from_config(db, &config));

    tracing::info!("Starting server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .context("Failed to bind to address")?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn run_once(args: &RunArgs) -> Result<()> {
    let rows: Vec<Map<String, Value>> = read_json(&args.participants)?;
    let total = rows.len();
    let participants: Vec<Participant> = rows
        .into_iter()
        .filter_map(Participant::from_record)
        .collect();
    tracing::info!(included = participants.len(), total, "loaded participants");

    let history = match &args.history {
        Some(path) => load_history(path)?,
        None => HistoryIndex::default(),
    };

    if participants.len() < 2 {
        anyhow::bail!(
            "Include at least 2 participants to generate matches, found {}",
            participants.len()
        );
    }

    let outcome = pairup::run(&participants, &history).context("Matching failed")?;

    let mut output = json!({
        "matches": outcome.records,
        "unmatched": outcome.unmatched,
        "triad_fallback": outcome.triad_fallback,
    });
    match &args.write_history {
        Some(path) => {
            let history = serde_json::to_string_pretty(&outcome.updated_history)?;
            std::fs::write(path, history)
                .with_context(|| format!("Failed to write history to {}", path.display()))?;
        }
        None => output["updated_history"] = serde_json::to_value(&outcome.updated_history)?,
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// History files come either as a list of pair records or as the
/// `updated_history` map written by an earlier run.
fn load_history(path: &Path) -> Result<HistoryIndex> {
    let value: Value = read_json(path)?;
    if value.is_array() {
        let records: Vec<HistoryRecord> =
            serde_json::from_value(value).context("History records are malformed")?;
        Ok(HistoryIndex::from_records(&records))
    } else {
        serde_json::from_value(value).context("History map is malformed")
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
