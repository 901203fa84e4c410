//! CROUPIER: roulette round settlement engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the rule tables, connects to the settlement database, replays
//! any journaled settlements and then polls for resolved rounds until
//! shut down.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use croupier::config;
use croupier::engine::{RoundController, RoundOutcome};
use croupier::projection::LiveTable;
use croupier::storage::{Journal, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    info!(
        table = %cfg.engine.name,
        poll_interval_secs = cfg.engine.poll_interval_secs,
        currency = %cfg.engine.currency,
        "CROUPIER starting up"
    );

    // -- Initialise components -------------------------------------------

    let rules = Arc::new(cfg.rule_tables()?);
    info!(bet_types = rules.len(), "Rule tables ready");

    let store = Arc::new(SqliteStore::connect(&cfg.database_url()).await?);
    store.migrate().await?;

    let table = Arc::new(LiveTable::new());

    let mut controller = RoundController::new(store.clone(), store.clone(), table.clone(), rules)
        .with_retry(cfg.retry.policy());
    if let Some(dir) = &cfg.storage.journal_dir {
        controller = controller.with_journal(Journal::open(dir)?);
    }

    let recovered = controller.recover().await?;
    if recovered > 0 {
        warn!(rounds = recovered, "Resuming persistence of journaled settlements");
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.engine.poll_interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.engine.poll_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match controller.settle_ready().await {
                    Ok(results) => log_results(&results),
                    Err(e) => error!(error = %e, "Failed to list rounds awaiting settlement"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let pending = controller.pending_rounds().await;
    if !pending.is_empty() {
        warn!(rounds = ?pending, "Shutting down with settlements awaiting persistence");
    }
    info!(
        net_position_change = format!("${:.2}", table.net_position_change().await),
        "CROUPIER shut down cleanly."
    );

    Ok(())
}

/// Log a one-line summary per settled round.
fn log_results(results: &[(String, Result<RoundOutcome, croupier::types::RoundError>)]) {
    for (round_id, result) in results {
        if let Ok(RoundOutcome::Settled(report)) = result {
            info!(
                round_id = %round_id,
                winning_number = report.winning_number.value(),
                won = report.summary.bets_won,
                lost = report.summary.bets_lost,
                paid_out = format!("${:.2}", report.summary.total_paid_out),
                house_net = format!("${:.2}", report.summary.house_net()),
                "Round settled"
            );
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("croupier=info"));

    let json_logging = std::env::var("CROUPIER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
