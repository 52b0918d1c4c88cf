use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::collections::HashSet;
use tracing::{debug, info};

use super::config::ClusteringConfig;
use super::keywords::title_keywords;
use crate::db::article::{claim_canonical_assignment, PendingArticle};
use crate::db::event::{create_event, fetch_candidates, upsert_membership, EventCandidate};
use crate::db::outlet::OutletDirectory;
use crate::entity::types::EntitySet;
use crate::TARGET_CLUSTERING;

/// Similarity of one article against one candidate event.
#[derive(Debug, Clone)]
pub struct CandidateScore {
    pub event_id: i64,
    pub created_at: DateTime<Utc>,
    pub shared_entities: usize,
    pub overlap_ratio: f64,
    pub shared_keywords: usize,
    pub effective_overlap: f64,
}

/// Result of clustering one article.
#[derive(Debug, Clone)]
pub struct AssignmentOutcome {
    pub event_id: i64,
    pub created_new: bool,
    pub relevance: f64,
    /// True when the article had no entities and matching degraded to
    /// title keywords only.
    pub degraded: bool,
}

/// Compare an article's entity and keyword sets against a candidate
/// event. The title-keyword bonus is folded into the effective overlap so
/// near-threshold entity matches can still qualify.
pub fn evaluate_candidate(
    article_entities: &HashSet<String>,
    article_keywords: &HashSet<String>,
    candidate: &EventCandidate,
    config: &ClusteringConfig,
) -> CandidateScore {
    let shared_entities = article_entities.intersection(&candidate.entities).count();
    let union = article_entities.union(&candidate.entities).count();
    let overlap_ratio = if union == 0 {
        0.0
    } else {
        shared_entities as f64 / union as f64
    };

    let shared_keywords = article_keywords
        .intersection(&candidate.title_keywords)
        .count();

    let effective_overlap =
        (overlap_ratio + config.title_keyword_bonus * shared_keywords as f64).min(1.0);

    CandidateScore {
        event_id: candidate.event_id,
        created_at: candidate.created_at,
        shared_entities,
        overlap_ratio,
        shared_keywords,
        effective_overlap,
    }
}

/// Drop entities that recur across most of the candidate events.
/// Ubiquitous names carry no signal about which event an article belongs
/// to and inflate every overlap ratio equally. Only kicks in once there
/// are enough candidates for the frequency to mean anything.
pub fn filter_noise(
    entities: &HashSet<String>,
    candidates: &[EventCandidate],
    threshold: f64,
) -> HashSet<String> {
    if candidates.len() < 5 || threshold <= 0.0 {
        return entities.clone();
    }
    let limit = threshold * candidates.len() as f64;
    entities
        .iter()
        .filter(|entity| {
            let frequency = candidates
                .iter()
                .filter(|c| c.entities.contains(*entity))
                .count();
            frequency as f64 <= limit
        })
        .cloned()
        .collect()
}

/// Qualification gate: the entity test (shared count AND effective
/// overlap), or the title-keyword gate when it is enabled.
pub fn qualifies(score: &CandidateScore, config: &ClusteringConfig) -> bool {
    let entity_match = score.shared_entities >= config.min_shared_entities.max(0) as usize
        && score.effective_overlap >= config.entity_overlap_threshold;

    let keyword_match = config.min_title_keywords > 0
        && score.shared_keywords >= config.min_title_keywords as usize;

    entity_match || keyword_match
}

/// Pick the winning candidate: highest overlap ratio, ties broken by
/// earliest event creation time so the oldest event absorbs the article
/// and event identifiers stay stable over a story's lifetime.
pub fn select_best<'a>(
    scores: &'a [CandidateScore],
    config: &ClusteringConfig,
) -> Option<&'a CandidateScore> {
    scores
        .iter()
        .filter(|s| qualifies(s, config))
        .max_by(|a, b| {
            a.overlap_ratio
                .partial_cmp(&b.overlap_ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.event_id.cmp(&a.event_id))
        })
}

/// Cluster one article: evaluate candidates under the active
/// configuration, join the best qualifying event or create a new one, and
/// record the canonical assignment plus its membership row.
///
/// Returns `None` when the article was already assigned (re-running the
/// engine on an assigned article is a no-op). Total failure to match never
/// blocks ingestion; the article still ends up in a (possibly singleton)
/// event.
pub async fn cluster_article(
    conn: &mut SqliteConnection,
    article: &PendingArticle,
    entities: &EntitySet,
    config: &ClusteringConfig,
    outlets: &OutletDirectory,
) -> Result<Option<AssignmentOutcome>> {
    let published_at = article.published_at.unwrap_or_else(Utc::now);
    let article_entities = entities.matching_set();
    let article_keywords = title_keywords(&article.title);
    let degraded = article_entities.is_empty();

    // One retry after losing a canonical-assignment race.
    for attempt in 0..2 {
        let mut candidates =
            fetch_candidates(conn, published_at, config.max_time_diff_hours).await?;

        // Same-outlet exclusion compares canonical keys, so case and
        // alias variants of one outlet cannot corroborate themselves.
        if !config.allow_same_outlet {
            let article_group = outlets.independence_group(&article.outlet_name);
            candidates.retain(|c| {
                c.sole_member()
                    .map_or(true, |outlet| outlets.independence_group(outlet) != article_group)
            });
        }

        let matched_entities =
            filter_noise(&article_entities, &candidates, config.entity_noise_threshold);

        let scores: Vec<CandidateScore> = candidates
            .iter()
            .map(|c| evaluate_candidate(&matched_entities, &article_keywords, c, config))
            .collect();

        match select_best(&scores, config) {
            Some(best) => {
                debug!(
                    target: TARGET_CLUSTERING,
                    "Article {} matches event {}: {} shared entities, overlap {:.3}, {} shared keywords",
                    article.id, best.event_id, best.shared_entities, best.overlap_ratio, best.shared_keywords
                );

                if !claim_canonical_assignment(conn, article.id, best.event_id).await? {
                    if attempt == 0 {
                        continue; // lost the race; retry against the updated candidate set
                    }
                    return Ok(None);
                }

                upsert_membership(conn, best.event_id, article.id, best.overlap_ratio).await?;

                return Ok(Some(AssignmentOutcome {
                    event_id: best.event_id,
                    created_new: false,
                    relevance: best.overlap_ratio,
                    degraded,
                }));
            }
            None => {
                let event_id = create_event(conn, &article.title).await?;

                if !claim_canonical_assignment(conn, article.id, event_id).await? {
                    // Another writer assigned this article first; drop the
                    // event we just created, it has no members.
                    sqlx::query("DELETE FROM events WHERE id = ?")
                        .bind(event_id)
                        .execute(&mut *conn)
                        .await?;
                    if attempt == 0 {
                        continue;
                    }
                    return Ok(None);
                }

                upsert_membership(conn, event_id, article.id, 1.0).await?;

                info!(
                    target: TARGET_CLUSTERING,
                    "Created event {} for article {}: no qualifying candidate",
                    event_id, article.id
                );

                return Ok(Some(AssignmentOutcome {
                    event_id,
                    created_new: true,
                    relevance: 1.0,
                    degraded,
                }));
            }
        }
    }

    Ok(None)
}
