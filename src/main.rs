use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use eqis::db::config::{change_log, snapshot_history};
use eqis::db::Database;
use eqis::logging::configure_logging;
use eqis::worker;

#[derive(Parser)]
#[command(name = "eqis", about = "Event clustering and quality scoring worker", version)]
struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, env = "DATABASE_PATH", default_value = "eqis.db")]
    database: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one batch of pending articles and exit.
    Run,
    /// Process batches continuously until interrupted.
    Loop {
        /// Seconds between batches; idle batches back off from here.
        #[arg(long, default_value_t = 300)]
        interval: u64,
    },
    /// Recompute the EQIS record for every active event.
    RecomputeMetrics,
    /// Clear canonical assignments in the window and re-cluster from scratch.
    Recluster {
        #[arg(long, default_value_t = worker::PROCESSING_WINDOW_HOURS)]
        window_hours: i64,
    },
    /// Show recent configuration generations and parameter changes.
    ConfigHistory {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();

    let cli = Cli::parse();
    let db = Database::new(&cli.database).await?;

    match cli.command {
        Command::Run => {
            let report = worker::run_batch(&db).await?;
            info!(
                "Batch complete: {} articles, {} new events, score {}",
                report.stats.articles_processed,
                report.stats.events_created,
                report
                    .evaluation
                    .map(|e| format!("{:.1}", e.score.overall))
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }
        Command::Loop { interval } => {
            worker::run_loop(&db, interval).await?;
        }
        Command::RecomputeMetrics => {
            let count = worker::recompute_all_metrics(&db).await?;
            info!("Recomputed metrics for {} events", count);
        }
        Command::Recluster { window_hours } => {
            let report = worker::recluster(&db, window_hours).await?;
            info!(
                "Re-clustered {} articles into {} events",
                report.stats.articles_processed, report.stats.events_touched
            );
        }
        Command::ConfigHistory { limit } => {
            for snapshot in snapshot_history(&db, limit).await? {
                println!(
                    "#{:<4} gen {:<3} {:<10} {:<25} score {:<6} {}",
                    snapshot.id,
                    snapshot.generation,
                    snapshot.source,
                    snapshot.created_at,
                    snapshot
                        .performance_score
                        .map(|s| format!("{:.1}", s))
                        .unwrap_or_else(|| "-".to_string()),
                    snapshot.notes.unwrap_or_default()
                );
            }
            println!();
            for change in change_log(&db, limit).await? {
                println!(
                    "{} {}: {} -> {} ({})",
                    change.changed_at,
                    change.parameter,
                    change.old_value.unwrap_or_else(|| "-".to_string()),
                    change.new_value.unwrap_or_else(|| "-".to_string()),
                    change.reason
                );
            }
        }
    }

    Ok(())
}
