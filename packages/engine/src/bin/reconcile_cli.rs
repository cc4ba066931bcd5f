//! CLI for running assignment consistency audits and repairs
//!
//! Connects to the platform database and drives the reconciliation engine.
//! Output is JSON so operator tooling can parse it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engine_core::common::ApUserId;
use engine_core::domains::reconciliation::{
    EngineSettings, ReconcileOptions, ReconciliationEngine,
};
use engine_core::kernel::PgEntityStore;
use engine_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "reconcile_cli")]
#[command(about = "Assignment consistency audits and repairs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the system health report
    Report,

    /// Repair fixable assignment drift
    Reconcile {
        /// Report the writes a run would perform without executing them
        #[arg(long)]
        dry_run: bool,

        /// Stop scheduling new entity fixes after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Print one AP user's unified assignment status
    Status { ap_user_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,engine_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgEntityStore::new(pool));
    let settings: EngineSettings = config.engine_settings();
    let engine = ReconciliationEngine::new(store, settings);

    match cli.command {
        Commands::Report => {
            let report = engine.get_system_health_report().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Reconcile {
            dry_run,
            deadline_secs,
        } => {
            let options = ReconcileOptions {
                dry_run,
                deadline: deadline_secs.map(|secs| Instant::now() + Duration::from_secs(secs)),
            };
            let result = engine
                .reconcile(options)
                .await
                .context("Reconciliation aborted: store unreachable")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Status { ap_user_id } => {
            let id = ApUserId::parse(&ap_user_id)
                .with_context(|| format!("Invalid AP user id: {}", ap_user_id))?;
            let status = engine
                .get_unified_status(id)
                .await
                .context("Failed to read unified status")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
