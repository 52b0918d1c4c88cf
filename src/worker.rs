use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};

use crate::adaptive::controller::{evaluate_run, RunEvaluation};
use crate::clustering::config::ClusteringConfig;
use crate::clustering::engine::cluster_article;
use crate::clustering::stats::RunStats;
use crate::db::article::{
    clear_assignments_in_window, fetch_pending, store_entities, store_quality_score,
};
use crate::db::config::{active_baseline, load_startup_config};
use crate::db::event::member_counts;
use crate::db::outlet::OutletDirectory;
use crate::db::Database;
use crate::entity::extraction::extract;
use crate::eqis::aggregator::recompute_event;
use crate::eqis::components::EqisWeights;
use crate::quality::score_article;
use crate::TARGET_CLUSTERING;

/// How far back a batch looks for unprocessed articles.
pub const PROCESSING_WINDOW_HOURS: i64 = 72;

/// Upper bound on articles pulled into one batch.
pub const BATCH_LIMIT: i64 = 500;

/// Outcome of one batch: run measurements plus the controller's verdict.
/// `evaluation` is absent when the batch found nothing to process.
#[derive(Debug)]
pub struct BatchReport {
    pub config: ClusteringConfig,
    pub stats: RunStats,
    pub evaluation: Option<RunEvaluation>,
    pub events_updated: usize,
}

/// Run one processing batch: score and extract every pending article,
/// cluster each into an event inside a single transaction, then
/// recompute EQIS for every touched event and hand the run to the
/// adaptive controller.
pub async fn run_batch(db: &Database) -> Result<BatchReport> {
    let baseline = active_baseline(db).await?;
    let config = load_startup_config(db, baseline.acceptable_score).await?;
    let outlets = OutletDirectory::load(db).await?;
    let rules = config.extraction_rules();

    let articles = fetch_pending(db, PROCESSING_WINDOW_HOURS, BATCH_LIMIT).await?;
    if articles.is_empty() {
        info!(target: TARGET_CLUSTERING, "No pending articles in the processing window");
        return Ok(BatchReport {
            config,
            stats: RunStats::default(),
            evaluation: None,
            events_updated: 0,
        });
    }

    info!(
        target: TARGET_CLUSTERING,
        "Processing batch of {} articles under generation {}",
        articles.len(),
        config.generation
    );

    let started = Instant::now();
    let now = Utc::now();
    let mut stats = RunStats::default();
    let mut created_events: Vec<i64> = Vec::new();
    let mut assignments: Vec<(i64, i64)> = Vec::new();

    // All article writes for the batch commit together; a crash mid-batch
    // leaves every article fully processed or fully pending.
    let mut tx = db.pool().begin().await?;

    for article in &articles {
        let breakdown = score_article(
            outlets.authority(&article.outlet_name),
            article.text.len(),
            article.title.len(),
            article.published_at,
            now,
        );
        store_quality_score(&mut tx, article.id, breakdown.total()).await?;

        let entities = extract(&format!("{}. {}", article.title, article.text), &rules);
        store_entities(&mut tx, article.id, &entities).await?;
        stats.entities_extracted_total += entities.total_count() as i64;

        if let Some(outcome) =
            cluster_article(&mut tx, article, &entities, &config, &outlets).await?
        {
            if outcome.created_new {
                stats.events_created += 1;
                created_events.push(outcome.event_id);
            }
            if outcome.degraded {
                stats.degraded_extractions += 1;
            }
            assignments.push((article.id, outcome.event_id));
        }
        stats.articles_processed += 1;
    }

    tx.commit().await?;
    stats.processing_time_ms = started.elapsed().as_millis() as i64;

    let affected: HashSet<i64> = assignments.iter().map(|(_, event_id)| *event_id).collect();
    let affected: Vec<i64> = affected.into_iter().collect();
    stats.events_touched = affected.len() as i64;

    let counts = member_counts(db, &affected).await?;
    stats.articles_in_multi_events = assignments
        .iter()
        .filter(|(_, event_id)| counts.get(event_id).copied().unwrap_or(0) >= 2)
        .count() as i64;
    stats.singleton_events = created_events
        .iter()
        .filter(|event_id| counts.get(*event_id).copied().unwrap_or(0) == 1)
        .count() as i64;

    let weights = EqisWeights::default();
    for &event_id in &affected {
        recompute_event(db, &outlets, event_id, &weights).await?;
    }

    info!(
        target: TARGET_CLUSTERING,
        "Batch done: {} articles, {} new events, {} events updated, {:.1}% coverage, {}ms",
        stats.articles_processed,
        stats.events_created,
        affected.len(),
        stats.coverage_percentage(),
        stats.processing_time_ms
    );

    let evaluation = evaluate_run(db, &config, &stats).await?;

    Ok(BatchReport {
        config,
        stats,
        evaluation: Some(evaluation),
        events_updated: affected.len(),
    })
}

/// Run batches continuously until ctrl-c. Idle batches back the poll
/// interval off up to 8x; any batch with work resets it.
pub async fn run_loop(db: &Database, interval_secs: u64) -> Result<()> {
    let base = Duration::from_secs(interval_secs.max(1));
    let max_delay = base * 8;
    let mut delay = base;

    loop {
        match run_batch(db).await {
            Ok(report) => {
                delay = if report.stats.articles_processed == 0 {
                    (delay * 2).min(max_delay)
                } else {
                    base
                };
            }
            Err(e) => {
                error!(target: TARGET_CLUSTERING, "Batch failed: {e:#}");
                delay = base;
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(target: TARGET_CLUSTERING, "Shutdown signal received, stopping worker loop");
                return Ok(());
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Recompute the EQIS record for every active event.
pub async fn recompute_all_metrics(db: &Database) -> Result<usize> {
    let outlets = OutletDirectory::load(db).await?;
    let event_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM events WHERE active")
        .fetch_all(db.pool())
        .await?;

    let weights = EqisWeights::default();
    for &event_id in &event_ids {
        recompute_event(db, &outlets, event_id, &weights).await?;
    }

    Ok(event_ids.len())
}

/// Forced re-clustering after a configuration change: clear every
/// canonical assignment inside the window, drop the stale membership
/// rows, retire events left without members, then run a fresh batch.
pub async fn recluster(db: &Database, window_hours: i64) -> Result<BatchReport> {
    let cleared = clear_assignments_in_window(db, window_hours).await?;

    sqlx::query(
        r#"
        DELETE FROM event_articles
        WHERE article_id IN (SELECT id FROM articles WHERE computed_event_id IS NULL)
        "#,
    )
    .execute(db.pool())
    .await?;
    sqlx::query(
        "UPDATE events SET active = FALSE WHERE id NOT IN (SELECT DISTINCT event_id FROM event_articles)",
    )
    .execute(db.pool())
    .await?;

    info!(
        target: TARGET_CLUSTERING,
        "Cleared {} canonical assignments for re-clustering",
        cleared
    );

    run_batch(db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use sqlx::Row;

    async fn insert_article(
        db: &Database,
        outlet: &str,
        title: &str,
        text: &str,
        hours_ago: i64,
    ) -> i64 {
        let published = (Utc::now() - ChronoDuration::hours(hours_ago)).to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO articles (outlet_name, title, text, published_at, fetched_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(outlet)
        .bind(title)
        .bind(text)
        .bind(&published)
        .bind(Utc::now().to_rfc3339())
        .execute(db.pool())
        .await
        .unwrap();
        result.last_insert_rowid()
    }

    fn quake_text(extra: &str) -> String {
        format!(
            "A powerful earthquake struck near Santiago early on Monday, according to \
             officials in Chile. President Gabriel Boric said rescue teams were being \
             sent to the coastal region. The United Nations offered assistance as \
             aftershocks continued through the morning. {extra}"
        )
    }

    #[tokio::test]
    async fn corroborating_articles_land_in_one_event() {
        let db = Database::new_in_memory().await.unwrap();
        let first = insert_article(
            &db,
            "Reuters",
            "Earthquake strikes coastal Chile near Santiago",
            &quake_text("Power outages were reported across several provinces."),
            2,
        )
        .await;
        let second = insert_article(
            &db,
            "BBC News",
            "Coastal Chile earthquake shakes Santiago suburbs",
            &quake_text("Schools were closed while inspectors checked for damage."),
            1,
        )
        .await;

        let report = run_batch(&db).await.unwrap();

        assert_eq!(report.stats.articles_processed, 2);
        assert_eq!(report.stats.events_created, 1);
        assert_eq!(report.stats.articles_in_multi_events, 2);
        assert_eq!(report.stats.singleton_events, 0);
        assert_eq!(report.events_updated, 1);

        // Both canonical assignments point at the same event, and each
        // has a matching membership row.
        let rows = sqlx::query("SELECT id, computed_event_id, quality_score FROM articles ORDER BY id")
            .fetch_all(db.pool())
            .await
            .unwrap();
        let event_a: Option<i64> = rows[0].get("computed_event_id");
        let event_b: Option<i64> = rows[1].get("computed_event_id");
        assert!(event_a.is_some());
        assert_eq!(event_a, event_b);
        for article_id in [first, second] {
            let membership: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM event_articles WHERE article_id = ?",
            )
            .bind(article_id)
            .fetch_one(db.pool())
            .await
            .unwrap();
            assert_eq!(membership, 1);
        }

        // Quality scores were written and the event got an EQIS record.
        let score: Option<i64> = rows[0].get("quality_score");
        assert!(score.is_some());
        let eqis: Option<f64> = sqlx::query_scalar(
            "SELECT eqis_score FROM event_metrics WHERE event_id = ?",
        )
        .bind(event_a.unwrap())
        .fetch_optional(db.pool())
        .await
        .unwrap();
        assert!(eqis.is_some());
    }

    #[tokio::test]
    async fn rerunning_a_batch_is_a_no_op() {
        let db = Database::new_in_memory().await.unwrap();
        insert_article(
            &db,
            "Reuters",
            "Earthquake strikes coastal Chile near Santiago",
            &quake_text(""),
            2,
        )
        .await;
        insert_article(
            &db,
            "BBC News",
            "Coastal Chile earthquake shakes Santiago suburbs",
            &quake_text(""),
            1,
        )
        .await;

        let first = run_batch(&db).await.unwrap();
        assert_eq!(first.stats.articles_processed, 2);

        let second = run_batch(&db).await.unwrap();
        assert_eq!(second.stats.articles_processed, 0);
        assert!(second.evaluation.is_none());

        let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(events, first.stats.events_created);
    }

    #[tokio::test]
    async fn same_outlet_followup_starts_its_own_event() {
        let db = Database::new_in_memory().await.unwrap();
        insert_article(
            &db,
            "Reuters",
            "Earthquake strikes coastal Chile near Santiago",
            &quake_text(""),
            2,
        )
        .await;
        insert_article(
            &db,
            "Reuters",
            "Coastal Chile earthquake shakes Santiago suburbs",
            &quake_text("A second dispatch from the same newsroom."),
            1,
        )
        .await;

        let report = run_batch(&db).await.unwrap();

        // The second article may not corroborate an event whose only
        // member came from its own outlet.
        assert_eq!(report.stats.events_created, 2);
        assert_eq!(report.stats.articles_in_multi_events, 0);
    }

    #[tokio::test]
    async fn outlet_case_variants_count_as_the_same_outlet() {
        let db = Database::new_in_memory().await.unwrap();
        insert_article(
            &db,
            "Reuters",
            "Earthquake strikes coastal Chile near Santiago",
            &quake_text(""),
            2,
        )
        .await;
        insert_article(
            &db,
            "REUTERS",
            "Coastal Chile earthquake shakes Santiago suburbs",
            &quake_text("A second dispatch under a shouty feed name."),
            1,
        )
        .await;

        let report = run_batch(&db).await.unwrap();

        // Canonical keys match, so the second article may not corroborate
        // the first's singleton event.
        assert_eq!(report.stats.events_created, 2);
        assert_eq!(report.stats.articles_in_multi_events, 0);
    }

    #[tokio::test]
    async fn aliased_outlets_count_as_the_same_outlet() {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query("INSERT INTO outlet_aliases (alias, canonical) VALUES ('bbc', 'bbc news')")
            .execute(db.pool())
            .await
            .unwrap();
        insert_article(
            &db,
            "BBC News",
            "Earthquake strikes coastal Chile near Santiago",
            &quake_text(""),
            2,
        )
        .await;
        insert_article(
            &db,
            "BBC",
            "Coastal Chile earthquake shakes Santiago suburbs",
            &quake_text(""),
            1,
        )
        .await;

        let report = run_batch(&db).await.unwrap();
        assert_eq!(report.stats.events_created, 2);
        assert_eq!(report.stats.articles_in_multi_events, 0);
    }

    #[tokio::test]
    async fn recluster_clears_and_rebuilds_assignments() {
        let db = Database::new_in_memory().await.unwrap();
        insert_article(
            &db,
            "Reuters",
            "Earthquake strikes coastal Chile near Santiago",
            &quake_text(""),
            2,
        )
        .await;
        insert_article(
            &db,
            "BBC News",
            "Coastal Chile earthquake shakes Santiago suburbs",
            &quake_text(""),
            1,
        )
        .await;

        let first = run_batch(&db).await.unwrap();
        assert_eq!(first.stats.articles_processed, 2);

        let rebuilt = recluster(&db, PROCESSING_WINDOW_HOURS).await.unwrap();
        assert_eq!(rebuilt.stats.articles_processed, 2);

        let unassigned: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM articles WHERE computed_event_id IS NULL",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(unassigned, 0);
    }

    #[tokio::test]
    async fn stale_rules_version_triggers_reextraction_only() {
        let db = Database::new_in_memory().await.unwrap();
        insert_article(
            &db,
            "Reuters",
            "Earthquake strikes coastal Chile near Santiago",
            &quake_text(""),
            2,
        )
        .await;

        let first = run_batch(&db).await.unwrap();
        assert_eq!(first.stats.articles_processed, 1);

        // Simulate entities stored under an earlier pattern set.
        sqlx::query("UPDATE articles SET entities_rules_version = 1")
            .execute(db.pool())
            .await
            .unwrap();

        let second = run_batch(&db).await.unwrap();
        assert_eq!(second.stats.articles_processed, 1);
        // Entities were refreshed under the current version, but the
        // canonical assignment and event set are untouched.
        let version: Option<i64> =
            sqlx::query_scalar("SELECT entities_rules_version FROM articles LIMIT 1")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(
            version,
            Some(crate::entity::EXTRACTION_RULES_VERSION as i64)
        );
        assert_eq!(second.stats.events_created, 0);
        let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(events, 1);

        let third = run_batch(&db).await.unwrap();
        assert_eq!(third.stats.articles_processed, 0);
    }

    #[tokio::test]
    async fn empty_window_reports_nothing_to_do() {
        let db = Database::new_in_memory().await.unwrap();
        // Outside the 72h processing window.
        insert_article(&db, "Reuters", "Old story from last month", &quake_text(""), 24 * 30).await;

        let report = run_batch(&db).await.unwrap();
        assert_eq!(report.stats.articles_processed, 0);
        assert_eq!(report.events_updated, 0);
    }
}
