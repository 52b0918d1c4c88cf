use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use super::core::Database;
use crate::entity::types::EntitySet;
use crate::entity::EXTRACTION_RULES_VERSION;
use crate::TARGET_DB;

/// An article awaiting quality scoring and event assignment. The first
/// five fields are owned by the ingestion collaborator and read-only here.
#[derive(Debug, Clone)]
pub struct PendingArticle {
    pub id: i64,
    pub outlet_name: String,
    pub title: String,
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Fetch articles from the processing window that still need scoring, a
/// canonical event assignment, or entity sets extracted under the
/// current rules version. Fully processed, current-version articles are
/// excluded, which is what makes re-running a batch a no-op.
pub async fn fetch_pending(
    db: &Database,
    window_hours: i64,
    limit: i64,
) -> Result<Vec<PendingArticle>> {
    let cutoff = (Utc::now() - Duration::hours(window_hours)).to_rfc3339();

    let rows = sqlx::query(
        r#"
        SELECT id, outlet_name, title, text, published_at
        FROM articles
        WHERE published_at > ?
            AND text IS NOT NULL
            AND LENGTH(text) > 100
            AND (quality_score IS NULL
                 OR computed_event_id IS NULL
                 OR entities_rules_version IS NOT ?)
        ORDER BY published_at DESC
        LIMIT ?
        "#,
    )
    .bind(&cutoff)
    .bind(EXTRACTION_RULES_VERSION as i64)
    .bind(limit)
    .fetch_all(db.pool())
    .await?;

    let articles = rows
        .iter()
        .map(|row| PendingArticle {
            id: row.get("id"),
            outlet_name: row.get("outlet_name"),
            title: row.get("title"),
            text: row.get("text"),
            published_at: parse_timestamp(row.get::<Option<String>, _>("published_at")),
        })
        .collect();

    Ok(articles)
}

/// Store the computed quality score for an article.
pub async fn store_quality_score(
    conn: &mut SqliteConnection,
    article_id: i64,
    score: u8,
) -> Result<()> {
    sqlx::query(
        "UPDATE articles SET quality_score = ?, quality_computed_at = ? WHERE id = ?",
    )
    .bind(score as i64)
    .bind(Utc::now().to_rfc3339())
    .bind(article_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Store the extracted entity sets for an article as JSON, stamped with
/// the rules version that produced them.
pub async fn store_entities(
    conn: &mut SqliteConnection,
    article_id: i64,
    entities: &EntitySet,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE articles
        SET entities = ?, entities_extracted_at = ?, entities_rules_version = ?
        WHERE id = ?
        "#,
    )
    .bind(serde_json::to_string(entities)?)
    .bind(Utc::now().to_rfc3339())
    .bind(EXTRACTION_RULES_VERSION as i64)
    .bind(article_id)
    .execute(&mut *conn)
    .await?;

    debug!(target: TARGET_DB, "Stored {} entities for article {}", entities.total_count(), article_id);

    Ok(())
}

/// Canonical assignment guard: sets computed_event_id only if the article
/// has none yet. Returns false when another writer won the race, in which
/// case the caller retries against the refreshed candidate set.
pub async fn claim_canonical_assignment(
    conn: &mut SqliteConnection,
    article_id: i64,
    event_id: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE articles SET computed_event_id = ?, computed_at = ?
        WHERE id = ? AND computed_event_id IS NULL
        "#,
    )
    .bind(event_id)
    .bind(Utc::now().to_rfc3339())
    .bind(article_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Clear canonical assignments inside a window, used by forced
/// re-clustering after a configuration generation change.
pub async fn clear_assignments_in_window(db: &Database, window_hours: i64) -> Result<u64> {
    let cutoff = (Utc::now() - Duration::hours(window_hours)).to_rfc3339();

    let result = sqlx::query(
        "UPDATE articles SET computed_event_id = NULL, computed_at = NULL WHERE published_at > ?",
    )
    .bind(&cutoff)
    .execute(db.pool())
    .await?;

    Ok(result.rows_affected())
}

pub fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
