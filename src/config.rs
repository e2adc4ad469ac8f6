//! Runtime configuration for the `pairup` binary.
//!
//! Every flag can also come from the environment (a `.env` file is loaded
//! first); flags win over environment values.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// SQLite database holding people, history and past rounds
    #[arg(long, env = "PAIRUP_DATABASE", default_value = "pairup.sqlite")]
    pub database: PathBuf,

    /// Address the review service listens on
    #[arg(long, env = "PAIRUP_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Webhook that receives approved rounds. Pushing is disabled without it.
    #[arg(long, env = "PAIRUP_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Timeout for a single webhook push
    #[arg(long, env = "PAIRUP_WEBHOOK_TIMEOUT_SECS", default_value_t = 30)]
    pub webhook_timeout_secs: u64,
}

impl ServeConfig {
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON array of participant rows (sheet-style columns are accepted)
    #[arg(long)]
    pub participants: PathBuf,

    /// JSON history: either an array of pair records or the `updated_history`
    /// map from a previous run
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Write the updated history map here instead of including it in stdout
    #[arg(long)]
    pub write_history: Option<PathBuf>,
}
