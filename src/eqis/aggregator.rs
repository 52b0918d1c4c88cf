use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::components::{
    best_source, composite, corroboration, correction_risk, coverage_component, days_component,
    EqisWeights, MemberProfile,
};
use super::tfidf::mean_pairwise_similarity;
use crate::db::claim::fetch_event_claims;
use crate::db::event::fetch_members;
use crate::db::metrics::{upsert_metrics, EventMetricsRecord};
use crate::db::outlet::OutletDirectory;
use crate::db::Database;
use crate::TARGET_EQIS;

// Per-event recomputation locks. The aggregation reads the full current
// membership, so two recomputations of the same event must not interleave;
// unrelated events proceed concurrently.
static EVENT_LOCKS: Lazy<DashMap<i64, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

fn event_lock(event_id: i64) -> Arc<Mutex<()>> {
    EVENT_LOCKS
        .entry(event_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Recompute the EQIS record for one event from its current membership,
/// claims, and outlet history, and upsert the event_metrics row.
pub async fn recompute_event(
    db: &Database,
    outlets: &OutletDirectory,
    event_id: i64,
    weights: &EqisWeights,
) -> Result<EventMetricsRecord> {
    let lock = event_lock(event_id);
    let _guard = lock.lock().await;

    let members = fetch_members(db, event_id).await?;
    let claims = fetch_event_claims(db, event_id).await?;
    let now = Utc::now();

    let profiles: Vec<MemberProfile> = members
        .iter()
        .map(|m| MemberProfile {
            article_id: m.id,
            group: outlets.independence_group(&m.outlet_name),
            authority_weight: outlets.authority_weight(&m.outlet_name),
            correction_rate: outlets.correction_rate(&m.outlet_name),
            published_at: m.published_at,
        })
        .collect();

    let days = days_component(&profiles, now);
    let (coverage, sites) = coverage_component(&profiles);

    let documents: Vec<String> = members
        .iter()
        .map(|m| format!("{} {}", m.title, m.text))
        .collect();
    let coherence = mean_pairwise_similarity(&documents);

    let best = best_source(&profiles);
    let claim_scores = corroboration(&claims);
    let (risk_component, raw_risk) = correction_risk(&profiles);

    let eqis_score = composite(&[
        (weights.days, days.map(|(c, _)| c)),
        (weights.coverage, Some(coverage)),
        (weights.coherence, coherence),
        (weights.best_source, best.as_ref().map(|(_, s)| *s)),
        (weights.corroboration, claim_scores.map(|(c, _, _)| c)),
        (weights.correction_risk, Some(risk_component)),
    ]);

    let record = EventMetricsRecord {
        event_id,
        age_days: days.map(|(_, age)| age).unwrap_or(0.0),
        coverage_sites: sites,
        keyword_coherence: coherence,
        best_source: best.as_ref().map(|(group, _)| group.clone()),
        corroboration_ratio: claim_scores.map(|(_, ratio, _)| ratio),
        contradiction_rate: claim_scores.map(|(_, _, rate)| rate).unwrap_or(0.0),
        correction_risk: raw_risk,
        eqis_score,
        components: json!({
            "days": days.map(|(c, _)| c),
            "coverage": coverage,
            "coherence": coherence,
            "best_source": best.as_ref().map(|(_, s)| *s),
            "corroboration": claim_scores.map(|(c, _, _)| c),
            "correction_risk": risk_component,
            "weights": {
                "days": weights.days,
                "coverage": weights.coverage,
                "coherence": weights.coherence,
                "best_source": weights.best_source,
                "corroboration": weights.corroboration,
                "correction_risk": weights.correction_risk,
            },
        }),
    };

    let mut conn = db.pool().acquire().await?;
    upsert_metrics(&mut conn, &record).await?;

    info!(
        target: TARGET_EQIS,
        "Event {}: EQIS {:.3}, {} sites, {} members",
        event_id,
        eqis_score,
        sites,
        members.len()
    );

    drop(_guard);
    // Evict the lock entry unless another task already cloned it; long
    // running loops would otherwise grow the map by one entry per event.
    EVENT_LOCKS.remove_if(&event_id, |_, entry| Arc::strong_count(entry) <= 2);

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn recompute_evicts_the_event_lock_entry() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO events (title, created_at, updated_at, active) VALUES ('Port strike', ?, ?, TRUE)")
            .bind(&now)
            .bind(&now)
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO articles (outlet_name, title, text, published_at) VALUES (?, ?, ?, ?)",
        )
        .bind("Reuters")
        .bind("Port strike halts cargo traffic")
        .bind("Dock workers walked out over pay early on Monday, halting cargo traffic.")
        .bind((Utc::now() - Duration::hours(3)).to_rfc3339())
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO event_articles (event_id, article_id, relevance, added_at) VALUES (1, 1, 1.0, ?)",
        )
        .bind(&now)
        .execute(db.pool())
        .await
        .unwrap();

        let outlets = OutletDirectory::empty();
        let record = recompute_event(&db, &outlets, 1, &EqisWeights::default())
            .await
            .unwrap();

        assert_eq!(record.event_id, 1);
        assert!(!EVENT_LOCKS.contains_key(&1));
    }
}
