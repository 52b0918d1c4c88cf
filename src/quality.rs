use chrono::{DateTime, Utc};

/// The four independently-capped sub-scores behind an article quality
/// score. The reported score is always the plain sum; there is no
/// post-hoc renormalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityBreakdown {
    pub authority: u8,
    pub content_depth: u8,
    pub title_descriptiveness: u8,
    pub recency: u8,
}

impl QualityBreakdown {
    pub fn total(&self) -> u8 {
        self.authority + self.content_depth + self.title_descriptiveness + self.recency
    }
}

/// Score an article 0-100 from its outlet authority, text length, title
/// length, and publish recency. Deterministic and side-effect free; the
/// authority lookup happens at the caller.
pub fn score_article(
    authority: i64,
    text_len: usize,
    title_len: usize,
    published_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> QualityBreakdown {
    QualityBreakdown {
        authority: authority.clamp(0, 40) as u8,
        content_depth: content_depth_score(text_len),
        title_descriptiveness: title_score(title_len),
        recency: recency_score(published_at, now),
    }
}

/// Content depth, 0-25: monotonic step function of body length.
fn content_depth_score(text_len: usize) -> u8 {
    match text_len {
        0 => 0,
        n if n >= 2000 => 25,
        n if n >= 1000 => 18,
        n if n >= 500 => 12,
        n if n >= 200 => 6,
        _ => 2,
    }
}

/// Title descriptiveness, 0-20: monotonic step function of title length.
fn title_score(title_len: usize) -> u8 {
    match title_len {
        n if n >= 100 => 20,
        n if n >= 60 => 15,
        n if n >= 30 => 10,
        n if n >= 10 => 5,
        _ => 0,
    }
}

/// Recency, 0-15: decays in four steps over 48 hours, zero after.
fn recency_score(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u8 {
    let Some(published_at) = published_at else {
        return 0;
    };
    let hours = (now - published_at).num_seconds() as f64 / 3600.0;
    if hours < 0.0 {
        // Future-dated publish timestamps are treated as fresh.
        return 15;
    }
    if hours <= 6.0 {
        15
    } else if hours <= 12.0 {
        11
    } else if hours <= 24.0 {
        7
    } else if hours <= 48.0 {
        3
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn reuters_scenario_scores_93() {
        let now = Utc::now();
        let breakdown = score_article(38, 2200, 80, Some(now - Duration::hours(2)), now);
        assert_eq!(breakdown.authority, 38);
        assert_eq!(breakdown.content_depth, 25);
        assert_eq!(breakdown.title_descriptiveness, 15);
        assert_eq!(breakdown.recency, 15);
        assert_eq!(breakdown.total(), 93);
    }

    #[test]
    fn score_is_bounded_and_equals_sum_of_subscores() {
        let now = Utc::now();
        for (authority, text_len, title_len, hours) in [
            (0i64, 0usize, 0usize, 0i64),
            (40, 5000, 200, 1),
            (55, 5000, 200, 1), // out-of-band authority clamps to 40
            (20, 800, 45, 30),
            (38, 150, 8, 72),
        ] {
            let b = score_article(authority, text_len, title_len, Some(now - Duration::hours(hours)), now);
            assert!(b.authority <= 40);
            assert!(b.content_depth <= 25);
            assert!(b.title_descriptiveness <= 20);
            assert!(b.recency <= 15);
            assert!(b.total() <= 100);
            assert_eq!(
                b.total(),
                b.authority + b.content_depth + b.title_descriptiveness + b.recency
            );
        }
    }

    #[test]
    fn recency_decays_in_four_steps() {
        let now = Utc::now();
        let at = |h: i64| score_article(0, 0, 0, Some(now - Duration::hours(h)), now).recency;
        assert_eq!(at(2), 15);
        assert_eq!(at(10), 11);
        assert_eq!(at(20), 7);
        assert_eq!(at(40), 3);
        assert_eq!(at(60), 0);
    }

    #[test]
    fn missing_publish_time_earns_no_recency() {
        let b = score_article(30, 1200, 70, None, Utc::now());
        assert_eq!(b.recency, 0);
        assert_eq!(b.total(), 30 + 18 + 15);
    }

    #[test]
    fn scoring_is_deterministic() {
        let now = Utc::now();
        let published = Some(now - Duration::hours(5));
        assert_eq!(
            score_article(25, 1500, 45, published, now),
            score_article(25, 1500, 45, published, now)
        );
    }
}
