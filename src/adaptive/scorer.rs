use std::fmt;

use crate::clustering::stats::RunStats;

/// Component weights for the composite run-performance score; sum to 1.0.
pub const EFFECTIVENESS_WEIGHT: f64 = 0.35;
pub const EFFICIENCY_WEIGHT: f64 = 0.25;
pub const COVERAGE_WEIGHT: f64 = 0.25;
pub const PRECISION_WEIGHT: f64 = 0.15;

/// Performance targets the sub-scores are measured against.
pub const EVENT_RATE_TARGET: f64 = 0.30;
pub const COVERAGE_TARGET_PCT: f64 = 60.0;
pub const TIME_PER_ARTICLE_TARGET_MS: f64 = 100.0;
pub const ARTICLES_PER_EVENT_MIN: f64 = 2.0;
pub const ARTICLES_PER_EVENT_MAX: f64 = 4.0;
pub const ARTICLES_PER_EVENT_LIMIT: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Effectiveness,
    Efficiency,
    Coverage,
    Precision,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Effectiveness => write!(f, "effectiveness"),
            Component::Efficiency => write!(f, "efficiency"),
            Component::Coverage => write!(f, "coverage"),
            Component::Precision => write!(f, "precision"),
        }
    }
}

/// Composite performance score of one clustering run, 0-100 per
/// component.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceScore {
    pub overall: f64,
    pub effectiveness: f64,
    pub efficiency: f64,
    pub coverage: f64,
    pub precision: f64,
}

impl PerformanceScore {
    pub fn worst_component(&self) -> Component {
        let mut worst = (Component::Effectiveness, self.effectiveness);
        for (component, value) in [
            (Component::Efficiency, self.efficiency),
            (Component::Coverage, self.coverage),
            (Component::Precision, self.precision),
        ] {
            if value < worst.1 {
                worst = (component, value);
            }
        }
        worst.0
    }
}

/// Score one clustering run against the performance targets.
pub fn score_run(stats: &RunStats) -> PerformanceScore {
    let effectiveness = effectiveness_score(stats);
    let efficiency = efficiency_score(stats);
    let coverage = coverage_score(stats);
    let precision = precision_score(stats);

    let overall = EFFECTIVENESS_WEIGHT * effectiveness
        + EFFICIENCY_WEIGHT * efficiency
        + COVERAGE_WEIGHT * coverage
        + PRECISION_WEIGHT * precision;

    PerformanceScore {
        overall,
        effectiveness,
        efficiency,
        coverage,
        precision,
    }
}

/// Event-creation effectiveness: rate against target, a diversity bonus
/// for spreading articles over multiple events, and a penalty for
/// singleton-heavy runs.
fn effectiveness_score(stats: &RunStats) -> f64 {
    let rate = stats.event_creation_rate();
    let rate_score = if rate >= EVENT_RATE_TARGET {
        100.0
    } else {
        (rate / EVENT_RATE_TARGET) * 100.0
    };

    let diversity_bonus = if stats.events_created > 0 && stats.articles_processed > 0 {
        let ratio = stats.events_created as f64 / stats.articles_processed as f64;
        (ratio * 50.0).min(15.0)
    } else {
        0.0
    };

    let singleton_penalty = if stats.events_created > 0 {
        (stats.singleton_events as f64 / stats.events_created as f64) * 25.0
    } else {
        0.0
    };

    (rate_score + diversity_bonus - singleton_penalty).clamp(0.0, 100.0)
}

/// Processing speed against the per-article time target: full score at or
/// under target, linear decline to 2x target, steep decline after.
fn efficiency_score(stats: &RunStats) -> f64 {
    if stats.processing_time_ms <= 0 || stats.articles_processed <= 0 {
        return 50.0; // neutral when there is no timing data
    }

    let per_article = stats.time_per_article_ms();
    let score = if per_article <= TIME_PER_ARTICLE_TARGET_MS {
        100.0
    } else if per_article <= TIME_PER_ARTICLE_TARGET_MS * 2.0 {
        let excess = (per_article - TIME_PER_ARTICLE_TARGET_MS) / TIME_PER_ARTICLE_TARGET_MS;
        100.0 - excess * 50.0
    } else {
        let excess =
            (per_article - TIME_PER_ARTICLE_TARGET_MS * 2.0) / TIME_PER_ARTICLE_TARGET_MS;
        (50.0 - excess * 20.0).max(10.0)
    };

    score.clamp(0.0, 100.0)
}

/// Share of articles grouped into multi-article events, scaled against
/// the coverage target in two linear segments.
fn coverage_score(stats: &RunStats) -> f64 {
    let pct = stats.coverage_percentage();
    let knee = COVERAGE_TARGET_PCT * 0.67;

    let score = if pct >= COVERAGE_TARGET_PCT {
        100.0
    } else if pct >= knee {
        let progress = (pct - knee) / (COVERAGE_TARGET_PCT * 0.33);
        70.0 + progress * 30.0
    } else {
        (pct / knee) * 70.0
    };

    score.clamp(0.0, 100.0)
}

/// Grouping precision proxy from the average event size: full score in
/// the optimal band, degrading toward singletons on one side and
/// over-merged events on the other.
fn precision_score(stats: &RunStats) -> f64 {
    let avg = stats.avg_articles_per_event();

    let score = if (ARTICLES_PER_EVENT_MIN..=ARTICLES_PER_EVENT_MAX).contains(&avg) {
        100.0
    } else if avg < ARTICLES_PER_EVENT_MIN {
        if avg >= 1.5 {
            60.0 + ((avg - 1.5) / (ARTICLES_PER_EVENT_MIN - 1.5)) * 40.0
        } else {
            (avg * 40.0).max(20.0)
        }
    } else if avg <= ARTICLES_PER_EVENT_LIMIT {
        let excess = avg - ARTICLES_PER_EVENT_MAX;
        let max_excess = ARTICLES_PER_EVENT_LIMIT - ARTICLES_PER_EVENT_MAX;
        100.0 - (excess / max_excess) * 30.0
    } else {
        (70.0 - (avg - ARTICLES_PER_EVENT_LIMIT) * 10.0).max(10.0)
    };

    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(
        articles: i64,
        created: i64,
        touched: i64,
        singletons: i64,
        multi: i64,
        time_ms: i64,
    ) -> RunStats {
        RunStats {
            articles_processed: articles,
            events_created: created,
            events_touched: touched,
            singleton_events: singletons,
            degraded_extractions: 0,
            articles_in_multi_events: multi,
            entities_extracted_total: 0,
            processing_time_ms: time_ms,
        }
    }

    #[test]
    fn healthy_run_scores_well() {
        // 100 articles, 25 events, mostly grouped, 80ms per article.
        let s = score_run(&stats(100, 25, 35, 5, 55, 8_000));
        assert!(s.overall > 70.0, "overall was {}", s.overall);
        assert_eq!(s.efficiency, 100.0);
    }

    #[test]
    fn all_components_are_bounded() {
        for s in [
            stats(0, 0, 0, 0, 0, 0),
            stats(1, 1, 1, 1, 0, 1_000_000),
            stats(500, 1, 1, 1, 500, 1),
            stats(10, 10, 10, 10, 0, 100),
        ] {
            let score = score_run(&s);
            for value in [
                score.overall,
                score.effectiveness,
                score.efficiency,
                score.coverage,
                score.precision,
            ] {
                assert!((0.0..=100.0).contains(&value), "out of band: {value}");
            }
        }
    }

    #[test]
    fn singleton_heavy_runs_are_penalized() {
        let grouped = score_run(&stats(100, 20, 25, 2, 60, 5_000));
        let singletons = score_run(&stats(100, 20, 25, 18, 10, 5_000));
        assert!(singletons.effectiveness < grouped.effectiveness);
    }

    #[test]
    fn slow_runs_lose_efficiency() {
        let fast = score_run(&stats(100, 20, 25, 2, 50, 8_000));
        let slow = score_run(&stats(100, 20, 25, 2, 50, 40_000));
        assert!(slow.efficiency < fast.efficiency);
        assert_eq!(fast.efficiency, 100.0);
    }

    #[test]
    fn worst_component_is_identified() {
        // No multi-article coverage at all: coverage collapses to zero.
        let s = score_run(&stats(100, 30, 30, 2, 0, 5_000));
        assert_eq!(s.coverage, 0.0);
        assert_eq!(s.worst_component(), Component::Coverage);
    }

    #[test]
    fn missing_timing_data_is_neutral() {
        let s = score_run(&stats(100, 25, 30, 3, 55, 0));
        assert_eq!(s.efficiency, 50.0);
    }
}
