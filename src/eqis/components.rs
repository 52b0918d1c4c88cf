use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::db::claim::{Claim, VerifiedState};

/// Recency decay constant for the days component.
pub const RECENCY_TAU_DAYS: f64 = 5.0;

/// Distinct independence groups at which coverage saturates.
pub const COVERAGE_SATURATION: f64 = 20.0;

/// Correction-rate cap; an event whose weighted outlet correction rate
/// reaches this scores zero on the correction-risk component.
pub const HIGH_RISK_CAP: f64 = 0.05;

/// Multiplier applied to a best-source candidate whose independence group
/// is unique among the event's members.
pub const DIVERSITY_BONUS: f64 = 1.15;

/// One event member as the aggregator sees it: resolved outlet group and
/// authority, plus publish time.
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub article_id: i64,
    pub group: String,
    pub authority_weight: f64,
    pub correction_rate: f64,
    pub published_at: Option<DateTime<Utc>>,
}

/// Component weights; must sum to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct EqisWeights {
    pub days: f64,
    pub coverage: f64,
    pub coherence: f64,
    pub best_source: f64,
    pub corroboration: f64,
    pub correction_risk: f64,
}

impl Default for EqisWeights {
    fn default() -> Self {
        EqisWeights {
            days: 0.20,
            coverage: 0.25,
            coherence: 0.15,
            best_source: 0.10,
            corroboration: 0.20,
            correction_risk: 0.10,
        }
    }
}

/// Recency/persistence factor in [0,1] plus the raw event age in days.
/// Recency tracks the latest member (is the story still live); persistence
/// tracks how many distinct days the story has been covered.
pub fn days_component(
    members: &[MemberProfile],
    now: DateTime<Utc>,
) -> Option<(f64, f64)> {
    let times: Vec<DateTime<Utc>> = members.iter().filter_map(|m| m.published_at).collect();
    if times.is_empty() {
        return None;
    }

    let first = *times.iter().min().expect("non-empty");
    let last = *times.iter().max().expect("non-empty");

    let age_days = ((now - first).num_seconds() as f64 / 86_400.0).max(0.0);
    let since_last = ((now - last).num_seconds() as f64 / 86_400.0).max(0.0);

    let unique_days: HashSet<_> = times.iter().map(|t| t.date_naive()).collect();

    let recency = (-since_last / RECENCY_TAU_DAYS).exp();
    let persistence = (1.0 + unique_days.len() as f64).ln() / 15.0_f64.ln();

    let component = (0.6 * recency + 0.4 * persistence).clamp(0.0, 1.0);
    Some((component, age_days))
}

/// Distinct independence groups among members. A single outlet publishing
/// ten follow-ups counts once.
pub fn coverage_component(members: &[MemberProfile]) -> (f64, i64) {
    let groups: HashSet<&str> = members.iter().map(|m| m.group.as_str()).collect();
    let sites = groups.len() as i64;
    let component = (sites as f64 / COVERAGE_SATURATION).min(1.0);
    (component, sites)
}

/// The member maximizing authority × primacy × diversity; ties broken by
/// earliest publish time. Primacy is the inverse publish-order rank.
pub fn best_source(members: &[MemberProfile]) -> Option<(String, f64)> {
    if members.is_empty() {
        return None;
    }

    let mut ordered: Vec<&MemberProfile> = members.iter().collect();
    ordered.sort_by_key(|m| (m.published_at.is_none(), m.published_at, m.article_id));

    let mut group_counts: HashMap<&str, usize> = HashMap::new();
    for member in members {
        *group_counts.entry(member.group.as_str()).or_insert(0) += 1;
    }

    let mut best: Option<(&MemberProfile, f64)> = None;
    for (index, member) in ordered.iter().enumerate() {
        let primacy = 1.0 / (index as f64 + 1.0);
        let diversity = if group_counts[member.group.as_str()] == 1 {
            DIVERSITY_BONUS
        } else {
            1.0
        };
        let score = member.authority_weight * primacy * diversity;

        // Strictly-greater keeps the earliest-published member on ties.
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((member, score));
        }
    }

    best.map(|(member, score)| (member.group.clone(), score.clamp(0.0, 1.0)))
}

/// Claim corroboration: (component, verified ratio, contradiction rate).
/// Undefined when the event has no extracted claims.
pub fn corroboration(claims: &[Claim]) -> Option<(f64, f64, f64)> {
    if claims.is_empty() {
        return None;
    }
    let total = claims.len() as f64;
    let verified = claims
        .iter()
        .filter(|c| c.state == VerifiedState::Verified)
        .count() as f64;
    let contested = claims
        .iter()
        .filter(|c| c.state == VerifiedState::Contested)
        .count() as f64;

    let ratio = verified / total;
    let contradiction_rate = contested / total;
    let component = (ratio * (1.0 - contradiction_rate)).clamp(0.0, 1.0);

    Some((component, ratio, contradiction_rate))
}

/// Membership-share-weighted mean of outlet correction rates, inverted
/// against the cap so that lower historical correction risk scores higher.
pub fn correction_risk(members: &[MemberProfile]) -> (f64, f64) {
    if members.is_empty() {
        return (0.0, 0.0);
    }

    let mut counts: HashMap<&str, (usize, f64)> = HashMap::new();
    for member in members {
        let entry = counts.entry(member.group.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 = member.correction_rate;
    }

    let total = members.len() as f64;
    let risk: f64 = counts
        .values()
        .map(|(count, rate)| (*count as f64 / total) * rate)
        .sum();

    let component = 1.0 - (risk / HIGH_RISK_CAP).min(1.0);
    (component, risk)
}

/// Weighted composite over (weight, component) pairs. Undefined
/// components are excluded and their weight redistributed proportionally
/// across the defined ones.
pub fn composite(components: &[(f64, Option<f64>)]) -> f64 {
    let defined_weight: f64 = components
        .iter()
        .filter(|(_, v)| v.is_some())
        .map(|(w, _)| w)
        .sum();
    if defined_weight <= 0.0 {
        return 0.0;
    }

    let weighted_sum: f64 = components
        .iter()
        .filter_map(|(w, v)| v.map(|value| w * value))
        .sum();

    (weighted_sum / defined_weight).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn member(
        id: i64,
        group: &str,
        authority: f64,
        correction: f64,
        published: Option<DateTime<Utc>>,
    ) -> MemberProfile {
        MemberProfile {
            article_id: id,
            group: group.to_string(),
            authority_weight: authority,
            correction_rate: correction,
            published_at: published,
        }
    }

    fn claim(article_id: i64, state: VerifiedState) -> Claim {
        Claim { article_id, state }
    }

    #[test]
    fn coverage_counts_distinct_groups_only() {
        let now = Utc::now();
        let members = vec![
            member(1, "reuters", 0.95, 0.01, Some(now)),
            member(2, "reuters", 0.95, 0.01, Some(now)),
            member(3, "bbc news", 0.9, 0.01, Some(now)),
            member(4, "guardian", 0.85, 0.02, Some(now)),
        ];
        let (component, sites) = coverage_component(&members);
        assert_eq!(sites, 3);
        assert!(sites <= members.len() as i64);
        assert!((component - 3.0 / COVERAGE_SATURATION).abs() < 1e-9);
    }

    #[test]
    fn corroboration_scenario_two_of_three_verified() {
        let claims = vec![
            claim(1, VerifiedState::Verified),
            claim(2, VerifiedState::Verified),
            claim(3, VerifiedState::Unverified),
        ];
        let (_, ratio, contradiction) = corroboration(&claims).unwrap();
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(contradiction, 0.0);
    }

    #[test]
    fn contested_claims_raise_the_contradiction_rate() {
        let claims = vec![
            claim(1, VerifiedState::Verified),
            claim(2, VerifiedState::Contested),
        ];
        let (component, ratio, contradiction) = corroboration(&claims).unwrap();
        assert_eq!(ratio, 0.5);
        assert_eq!(contradiction, 0.5);
        assert!((component - 0.25).abs() < 1e-9);
    }

    #[test]
    fn no_claims_is_undefined_not_zero() {
        assert!(corroboration(&[]).is_none());
    }

    #[test]
    fn best_source_prefers_authority_and_primacy() {
        let now = Utc::now();
        let members = vec![
            member(1, "reuters", 0.95, 0.01, Some(now - Duration::hours(8))),
            member(2, "blogspot", 0.30, 0.04, Some(now - Duration::hours(9))),
            member(3, "bbc news", 0.90, 0.01, Some(now - Duration::hours(1))),
        ];
        // blogspot publishes first (primacy 1.0) but authority 0.3 loses to
        // reuters at rank 2 with authority 0.95 and a diversity bonus.
        let (group, score) = best_source(&members).unwrap();
        assert_eq!(group, "reuters");
        assert!(score > 0.0 && score <= 1.0);
    }

    #[test]
    fn best_source_tie_breaks_to_earliest_publish() {
        let now = Utc::now();
        let members = vec![
            member(1, "ap news", 0.9, 0.01, Some(now - Duration::hours(5))),
            member(2, "afp", 0.9, 0.01, Some(now - Duration::hours(5))),
        ];
        // Equal publish times and authority: the first in publish order
        // keeps the higher primacy and wins.
        let (group, _) = best_source(&members).unwrap();
        assert_eq!(group, "ap news");
    }

    #[test]
    fn correction_risk_inverts_weighted_rates() {
        let now = Utc::now();
        let clean = vec![member(1, "reuters", 0.95, 0.0, Some(now))];
        let (component, risk) = correction_risk(&clean);
        assert_eq!(risk, 0.0);
        assert_eq!(component, 1.0);

        let risky = vec![member(1, "tabloid", 0.3, 0.10, Some(now))];
        let (component, risk) = correction_risk(&risky);
        assert!((risk - 0.10).abs() < 1e-9);
        assert_eq!(component, 0.0); // above the cap
    }

    #[test]
    fn days_component_rewards_fresh_persistent_stories() {
        let now = Utc::now();
        let fresh = vec![
            member(1, "a", 0.9, 0.01, Some(now - Duration::days(3))),
            member(2, "b", 0.9, 0.01, Some(now - Duration::days(1))),
            member(3, "c", 0.9, 0.01, Some(now - Duration::hours(2))),
        ];
        let (component, age_days) = days_component(&fresh, now).unwrap();
        assert!(age_days >= 3.0);
        assert!(component > 0.5);

        let stale = vec![member(1, "a", 0.9, 0.01, Some(now - Duration::days(30)))];
        let (stale_component, _) = days_component(&stale, now).unwrap();
        assert!(stale_component < component);
    }

    #[test]
    fn undefined_components_redistribute_weight_proportionally() {
        let weights = EqisWeights::default();
        // coherence and corroboration undefined; the other four defined.
        let components = vec![
            (weights.days, Some(0.8)),
            (weights.coverage, Some(0.4)),
            (weights.coherence, None),
            (weights.best_source, Some(1.0)),
            (weights.corroboration, None),
            (weights.correction_risk, Some(1.0)),
        ];
        let score = composite(&components);
        let defined = weights.days + weights.coverage + weights.best_source + weights.correction_risk;
        let expected = (0.20 * 0.8 + 0.25 * 0.4 + 0.10 * 1.0 + 0.10 * 1.0) / defined;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn composite_is_bounded() {
        let weights = EqisWeights::default();
        let all_high: Vec<(f64, Option<f64>)> = [
            weights.days,
            weights.coverage,
            weights.coherence,
            weights.best_source,
            weights.corroboration,
            weights.correction_risk,
        ]
        .iter()
        .map(|w| (*w, Some(1.0)))
        .collect();
        assert!((composite(&all_high) - 1.0).abs() < 1e-9);
        assert_eq!(composite(&[(1.0, None)]), 0.0);
    }
}
