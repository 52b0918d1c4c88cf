use anyhow::Result;
use sqlx::Row;

use super::core::Database;

/// Verification state assigned by the claim-extraction collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedState {
    Verified,
    Contested,
    Unverified,
}

impl From<&str> for VerifiedState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "verified" => VerifiedState::Verified,
            "contested" => VerifiedState::Contested,
            _ => VerifiedState::Unverified,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Claim {
    pub article_id: i64,
    pub state: VerifiedState,
}

/// All claims extracted from an event's member articles.
pub async fn fetch_event_claims(db: &Database, event_id: i64) -> Result<Vec<Claim>> {
    let rows = sqlx::query(
        r#"
        SELECT c.article_id, c.verified_state
        FROM claims c
        JOIN event_articles ea ON ea.article_id = c.article_id
        WHERE ea.event_id = ?
        "#,
    )
    .bind(event_id)
    .fetch_all(db.pool())
    .await?;

    let claims = rows
        .iter()
        .map(|row| Claim {
            article_id: row.get("article_id"),
            state: VerifiedState::from(row.get::<String, _>("verified_state").as_str()),
        })
        .collect();

    Ok(claims)
}
