use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqliteConnection};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::article::parse_timestamp;
use super::core::Database;
use crate::clustering::keywords::title_keywords;
use crate::entity::types::EntitySet;
use crate::entity::EXTRACTION_RULES_VERSION;
use crate::TARGET_DB;

/// An existing event as seen by the clustering engine: the union of its
/// members' matching entities and title keywords, plus enough membership
/// detail for the same-outlet exclusion.
#[derive(Debug, Clone)]
pub struct EventCandidate {
    pub event_id: i64,
    pub created_at: DateTime<Utc>,
    pub entities: HashSet<String>,
    pub title_keywords: HashSet<String>,
    pub member_outlets: Vec<String>,
}

impl EventCandidate {
    /// The outlet of the event's only member so far, if it has exactly
    /// one. Callers compare outlets by canonical key, not raw name.
    pub fn sole_member(&self) -> Option<&str> {
        match self.member_outlets.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

/// One member article as read by the EQIS aggregator.
#[derive(Debug, Clone)]
pub struct MemberArticle {
    pub id: i64,
    pub outlet_name: String,
    pub title: String,
    pub text: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Fetch candidate events with member activity inside the time window
/// around an article's publish time.
pub async fn fetch_candidates(
    conn: &mut SqliteConnection,
    published_at: DateTime<Utc>,
    max_time_diff_hours: i64,
) -> Result<Vec<EventCandidate>> {
    let window = Duration::hours(max_time_diff_hours);
    let from = (published_at - window).to_rfc3339();
    let to = (published_at + window).to_rfc3339();

    let rows = sqlx::query(
        r#"
        SELECT e.id AS event_id, e.created_at, a.outlet_name, a.title,
               a.entities, a.entities_rules_version
        FROM events e
        JOIN event_articles ea ON ea.event_id = e.id
        JOIN articles a ON a.id = ea.article_id
        WHERE e.active AND a.published_at BETWEEN ? AND ?
        ORDER BY e.id ASC
        "#,
    )
    .bind(&from)
    .bind(&to)
    .fetch_all(&mut *conn)
    .await?;

    let mut candidates: HashMap<i64, EventCandidate> = HashMap::new();

    for row in &rows {
        let event_id: i64 = row.get("event_id");
        let created_at = parse_timestamp(row.get::<Option<String>, _>("created_at"))
            .unwrap_or_else(Utc::now);

        let candidate = candidates.entry(event_id).or_insert_with(|| EventCandidate {
            event_id,
            created_at,
            entities: HashSet::new(),
            title_keywords: HashSet::new(),
            member_outlets: Vec::new(),
        });

        // Entity sets extracted under an older rules version are not
        // comparable to current ones; the member still contributes its
        // title keywords.
        let rules_version: Option<i64> = row.get("entities_rules_version");
        if rules_version == Some(EXTRACTION_RULES_VERSION as i64) {
            if let Some(json) = row.get::<Option<String>, _>("entities") {
                if let Ok(set) = serde_json::from_str::<EntitySet>(&json) {
                    candidate.entities.extend(set.matching_set());
                }
            }
        }
        candidate
            .title_keywords
            .extend(title_keywords(row.get::<String, _>("title").as_str()));
        candidate
            .member_outlets
            .push(row.get::<String, _>("outlet_name"));
    }

    let mut out: Vec<EventCandidate> = candidates.into_values().collect();
    out.sort_by_key(|c| c.event_id);

    debug!(
        target: TARGET_DB,
        "Found {} candidate events within {}h of {}",
        out.len(),
        max_time_diff_hours,
        published_at
    );

    Ok(out)
}

/// Create a new event seeded from an article's title.
pub async fn create_event(conn: &mut SqliteConnection, title: &str) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "INSERT INTO events (title, created_at, updated_at, active) VALUES (?, ?, ?, TRUE)",
    )
    .bind(title)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Insert or refresh the membership row backing a canonical assignment.
/// The UNIQUE(event_id, article_id) constraint makes this idempotent.
pub async fn upsert_membership(
    conn: &mut SqliteConnection,
    event_id: i64,
    article_id: i64,
    relevance: f64,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO event_articles (event_id, article_id, relevance, added_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(event_id, article_id) DO UPDATE SET relevance = excluded.relevance
        "#,
    )
    .bind(event_id)
    .bind(article_id)
    .bind(relevance)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE events SET updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(event_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// All member articles of an event, publish order.
pub async fn fetch_members(db: &Database, event_id: i64) -> Result<Vec<MemberArticle>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, a.outlet_name, a.title, a.text, a.published_at
        FROM articles a
        JOIN event_articles ea ON ea.article_id = a.id
        WHERE ea.event_id = ?
        ORDER BY a.published_at ASC, a.id ASC
        "#,
    )
    .bind(event_id)
    .fetch_all(db.pool())
    .await?;

    let members = rows
        .iter()
        .map(|row| MemberArticle {
            id: row.get("id"),
            outlet_name: row.get("outlet_name"),
            title: row.get("title"),
            text: row.get::<Option<String>, _>("text").unwrap_or_default(),
            published_at: parse_timestamp(row.get::<Option<String>, _>("published_at")),
        })
        .collect();

    Ok(members)
}

/// Member count per event for a set of events, used for coverage stats.
pub async fn member_counts(db: &Database, event_ids: &[i64]) -> Result<HashMap<i64, i64>> {
    let mut counts = HashMap::new();
    for &event_id in event_ids {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM event_articles WHERE event_id = ?")
                .bind(event_id)
                .fetch_one(db.pool())
                .await?;
        counts.insert(event_id, count);
    }
    Ok(counts)
}
