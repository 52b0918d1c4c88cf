use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;

use super::core::Database;
use crate::adaptive::scorer::PerformanceScore;
use crate::clustering::config::ClusteringConfig;
use crate::clustering::stats::RunStats;
use crate::TARGET_ADAPTIVE;

/// Named reference point the controller judges run scores against.
#[derive(Debug, Clone)]
pub struct PerformanceBaseline {
    pub name: String,
    pub acceptable_score: f64,
    pub target_score: f64,
    pub optimal_score: f64,
}

/// Summary row for the configuration history surface.
#[derive(Debug, Clone)]
pub struct SnapshotSummary {
    pub id: i64,
    pub generation: i64,
    pub created_at: String,
    pub source: String,
    pub performance_score: Option<f64>,
    pub notes: Option<String>,
}

/// Append-only audit record of one parameter change.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub changed_at: String,
    pub parameter: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub reason: String,
}

fn config_from_row(row: &SqliteRow) -> ClusteringConfig {
    ClusteringConfig {
        generation: row.get("generation"),
        min_shared_entities: row.get("min_shared_entities"),
        entity_overlap_threshold: row.get("entity_overlap_threshold"),
        min_title_keywords: row.get("min_title_keywords"),
        title_keyword_bonus: row.get("title_keyword_bonus"),
        max_time_diff_hours: row.get("max_time_diff_hours"),
        allow_same_outlet: row.get("allow_same_outlet"),
        min_entity_length: row.get("min_entity_length"),
        max_entity_length: row.get("max_entity_length"),
        entity_noise_threshold: row.get("entity_noise_threshold"),
    }
}

/// Insert one immutable snapshot row; run measurements and scores are
/// optional because tuning and startup snapshots precede any run.
pub async fn insert_snapshot(
    db: &Database,
    config: &ClusteringConfig,
    stats: Option<&RunStats>,
    score: Option<&PerformanceScore>,
    source: &str,
    notes: &str,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO config_snapshots (
            generation, created_at,
            min_shared_entities, entity_overlap_threshold, min_title_keywords,
            title_keyword_bonus, max_time_diff_hours, allow_same_outlet,
            min_entity_length, max_entity_length, entity_noise_threshold,
            articles_processed, events_created, singleton_events,
            coverage_percentage, avg_articles_per_event, processing_time_ms,
            effectiveness_score, efficiency_score, coverage_score,
            precision_score, performance_score, source, notes
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(config.generation)
    .bind(Utc::now().to_rfc3339())
    .bind(config.min_shared_entities)
    .bind(config.entity_overlap_threshold)
    .bind(config.min_title_keywords)
    .bind(config.title_keyword_bonus)
    .bind(config.max_time_diff_hours)
    .bind(config.allow_same_outlet)
    .bind(config.min_entity_length)
    .bind(config.max_entity_length)
    .bind(config.entity_noise_threshold)
    .bind(stats.map(|s| s.articles_processed))
    .bind(stats.map(|s| s.events_created))
    .bind(stats.map(|s| s.singleton_events))
    .bind(stats.map(|s| s.coverage_percentage()))
    .bind(stats.map(|s| s.avg_articles_per_event()))
    .bind(stats.map(|s| s.processing_time_ms))
    .bind(score.map(|s| s.effectiveness))
    .bind(score.map(|s| s.efficiency))
    .bind(score.map(|s| s.coverage))
    .bind(score.map(|s| s.precision))
    .bind(score.map(|s| s.overall))
    .bind(source)
    .bind(notes)
    .execute(db.pool())
    .await?;

    Ok(result.last_insert_rowid())
}

/// Load the configuration for the next run: the latest generation, unless
/// it scored below the acceptable threshold and a better generation exists
/// in the last 30 days, in which case that generation's parameters are
/// re-adopted as a new startup generation.
pub async fn load_startup_config(db: &Database, acceptable_score: f64) -> Result<ClusteringConfig> {
    let latest = sqlx::query("SELECT * FROM config_snapshots ORDER BY generation DESC, id DESC LIMIT 1")
        .fetch_optional(db.pool())
        .await?;

    let Some(latest) = latest else {
        let config = ClusteringConfig::conservative_defaults();
        insert_snapshot(db, &config, None, None, "startup", "No configuration history; conservative defaults").await?;
        info!(target: TARGET_ADAPTIVE, "No configuration history found, using conservative defaults");
        return Ok(config);
    };

    let latest_config = config_from_row(&latest);
    let latest_score: Option<f64> = latest.get("performance_score");

    if latest_score.map_or(false, |s| s >= acceptable_score) {
        return Ok(latest_config);
    }

    let since = (Utc::now() - Duration::days(30)).to_rfc3339();
    let best = sqlx::query(
        r#"
        SELECT * FROM config_snapshots
        WHERE created_at > ? AND performance_score >= ? AND source IN ('runtime', 'manual')
        ORDER BY performance_score DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(&since)
    .bind(acceptable_score)
    .fetch_optional(db.pool())
    .await?;

    match best {
        Some(row) if row.get::<i64, _>("generation") != latest_config.generation => {
            let mut config = config_from_row(&row);
            let best_score: Option<f64> = row.get("performance_score");
            config.generation = latest_config.generation + 1;
            insert_snapshot(
                db,
                &config,
                None,
                None,
                "startup",
                &format!(
                    "Re-adopted generation {} parameters (score {:.1})",
                    row.get::<i64, _>("generation"),
                    best_score.unwrap_or(0.0)
                ),
            )
            .await?;
            info!(
                target: TARGET_ADAPTIVE,
                "Loaded high-performing startup config (score: {:.1}) as generation {}",
                best_score.unwrap_or(0.0),
                config.generation
            );
            Ok(config)
        }
        _ => Ok(latest_config),
    }
}

/// Parameters of a specific generation (latest row wins).
pub async fn generation_config(db: &Database, generation: i64) -> Result<Option<ClusteringConfig>> {
    let row = sqlx::query(
        "SELECT * FROM config_snapshots WHERE generation = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(generation)
    .fetch_optional(db.pool())
    .await?;

    Ok(row.map(|r| config_from_row(&r)))
}

/// Best measured score for a generation, from its runtime rows.
pub async fn generation_score(db: &Database, generation: i64) -> Result<Option<f64>> {
    let score = sqlx::query_scalar::<_, Option<f64>>(
        r#"
        SELECT MAX(performance_score) FROM config_snapshots
        WHERE generation = ? AND source = 'runtime'
        "#,
    )
    .bind(generation)
    .fetch_one(db.pool())
    .await?;

    Ok(score)
}

/// Source tag of the snapshot that introduced a generation.
pub async fn generation_origin(db: &Database, generation: i64) -> Result<Option<String>> {
    let source = sqlx::query_scalar::<_, Option<String>>(
        "SELECT source FROM config_snapshots WHERE generation = ? ORDER BY id ASC LIMIT 1",
    )
    .bind(generation)
    .fetch_optional(db.pool())
    .await?;

    Ok(source.flatten())
}

pub async fn log_change_event(
    db: &Database,
    parameter: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    reason: &str,
    previous_score: Option<f64>,
    snapshot_id: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO config_change_events
            (changed_at, parameter, old_value, new_value, reason, previous_score, snapshot_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(parameter)
    .bind(old_value)
    .bind(new_value)
    .bind(reason)
    .bind(previous_score)
    .bind(snapshot_id)
    .execute(db.pool())
    .await?;

    Ok(())
}

pub async fn active_baseline(db: &Database) -> Result<PerformanceBaseline> {
    let row = sqlx::query(
        "SELECT name, acceptable_score, target_score, optimal_score FROM performance_baselines WHERE active LIMIT 1",
    )
    .fetch_optional(db.pool())
    .await?;

    Ok(match row {
        Some(row) => PerformanceBaseline {
            name: row.get("name"),
            acceptable_score: row.get("acceptable_score"),
            target_score: row.get("target_score"),
            optimal_score: row.get("optimal_score"),
        },
        // Schema seeds a default baseline; this covers a manually emptied table.
        None => PerformanceBaseline {
            name: "default".to_string(),
            acceptable_score: 60.0,
            target_score: 75.0,
            optimal_score: 90.0,
        },
    })
}

pub async fn snapshot_history(db: &Database, limit: i64) -> Result<Vec<SnapshotSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT id, generation, created_at, source, performance_score, notes
        FROM config_snapshots ORDER BY id DESC LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(db.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|row| SnapshotSummary {
            id: row.get("id"),
            generation: row.get("generation"),
            created_at: row.get("created_at"),
            source: row.get("source"),
            performance_score: row.get("performance_score"),
            notes: row.get("notes"),
        })
        .collect())
}

pub async fn change_log(db: &Database, limit: i64) -> Result<Vec<ChangeEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT changed_at, parameter, old_value, new_value, reason
        FROM config_change_events ORDER BY id DESC LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(db.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|row| ChangeEvent {
            changed_at: row.get("changed_at"),
            parameter: row.get("parameter"),
            old_value: row.get("old_value"),
            new_value: row.get("new_value"),
            reason: row.get("reason"),
        })
        .collect())
}
