//! CLI struct definitions and dispatch for the driftgate binary.
//!
//! All clap-derived types live here. Each subcommand prints exactly one
//! JSON object on stdout and returns its exit code; aborted runs print a
//! `{"error": ...}` object on stderr instead.

use clap::{Parser, Subcommand};
use serde_json::json;
use uuid::Uuid;

use crate::core::config::{GateConfig, ReconcileConfig};
use crate::core::drift::run_reconciliation;
use crate::core::error::DriftgateError;
use crate::core::gate::run_gate;
use crate::core::index::{QdrantIndex, SearchIndex};
use crate::core::primary::PgPrimaryStore;

#[derive(Parser, Debug)]
#[clap(
    name = "driftgate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep the Postgres decision store and its derived Qdrant index convergent, and gate releases on durability exit criteria."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compare current Postgres decisions against Qdrant point ids.
    ///
    /// Requires DATABASE_URL and QDRANT_URL. Exits 0 when the two stores
    /// agree, 1 when drift remains unresolved, 2 on configuration or
    /// runtime errors.
    Reconcile {
        /// Enqueue missing decisions into search_outbox for the consumer.
        #[clap(long)]
        repair: bool,
        /// Limit reconciliation to one organization.
        #[clap(long = "org-id")]
        org_id: Option<Uuid>,
    },
    /// Run the durability exit-criteria battery.
    ///
    /// Requires DATABASE_URL; QDRANT_URL additionally enables the drift
    /// check. Exits 0 when all required checks pass, 1 when at least one
    /// fails, 2 on configuration or runtime errors.
    Verify,
}

pub async fn run(cli: Cli) -> i32 {
    let result = match cli.command {
        Command::Reconcile { repair, org_id } => run_reconcile(repair, org_id).await,
        Command::Verify => run_verify().await,
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", json!({ "error": err.to_string() }));
            err.exit_code()
        }
    }
}

async fn run_reconcile(repair: bool, org_id: Option<Uuid>) -> Result<i32, DriftgateError> {
    let cfg = ReconcileConfig::from_env()?;
    let primary = PgPrimaryStore::connect(&cfg.database_url).await?;
    let index = QdrantIndex::new(&cfg.qdrant)?;

    let outcome = run_reconciliation(&primary, &index, org_id, repair).await?;
    println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    if let Some(queued) = outcome.queued_repairs {
        println!("queued_repairs={queued}");
    }
    Ok(outcome.exit_code())
}

async fn run_verify() -> Result<i32, DriftgateError> {
    let cfg = GateConfig::from_env()?;
    let primary = PgPrimaryStore::connect(&cfg.database_url).await?;
    let index = match &cfg.qdrant {
        Some(qdrant) => Some(QdrantIndex::new(qdrant)?),
        None => None,
    };

    let report = run_gate(
        &primary,
        index.as_ref().map(|i| i as &dyn SearchIndex),
        &cfg.thresholds,
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.exit_code())
}
