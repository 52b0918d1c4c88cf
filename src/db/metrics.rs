use anyhow::Result;
use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::TARGET_DB;

/// One event_metrics row: the six EQIS facts, the composite score, and the
/// component breakdown document. Overwritten on each recomputation.
#[derive(Debug, Clone)]
pub struct EventMetricsRecord {
    pub event_id: i64,
    pub age_days: f64,
    pub coverage_sites: i64,
    pub keyword_coherence: Option<f64>,
    pub best_source: Option<String>,
    pub corroboration_ratio: Option<f64>,
    pub contradiction_rate: f64,
    pub correction_risk: f64,
    pub eqis_score: f64,
    pub components: serde_json::Value,
}

pub async fn upsert_metrics(
    conn: &mut SqliteConnection,
    record: &EventMetricsRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO event_metrics (
            event_id, computed_at, age_days, coverage_sites, keyword_coherence,
            best_source, corroboration_ratio, contradiction_rate, correction_risk,
            eqis_score, components
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(event_id) DO UPDATE SET
            computed_at = excluded.computed_at,
            age_days = excluded.age_days,
            coverage_sites = excluded.coverage_sites,
            keyword_coherence = excluded.keyword_coherence,
            best_source = excluded.best_source,
            corroboration_ratio = excluded.corroboration_ratio,
            contradiction_rate = excluded.contradiction_rate,
            correction_risk = excluded.correction_risk,
            eqis_score = excluded.eqis_score,
            components = excluded.components
        "#,
    )
    .bind(record.event_id)
    .bind(Utc::now().to_rfc3339())
    .bind(record.age_days)
    .bind(record.coverage_sites)
    .bind(record.keyword_coherence)
    .bind(&record.best_source)
    .bind(record.corroboration_ratio)
    .bind(record.contradiction_rate)
    .bind(record.correction_risk)
    .bind(record.eqis_score)
    .bind(record.components.to_string())
    .execute(&mut *conn)
    .await?;

    debug!(
        target: TARGET_DB,
        "Upserted metrics for event {} (EQIS {:.3})", record.event_id, record.eqis_score
    );

    Ok(())
}
