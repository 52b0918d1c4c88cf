use serde::Serialize;

/// Summary of one clustering run; handed to the adaptive controller and
/// embedded in the configuration snapshot for the generation that ran.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub articles_processed: i64,
    pub events_created: i64,
    pub events_touched: i64,
    pub singleton_events: i64,
    pub degraded_extractions: i64,
    pub articles_in_multi_events: i64,
    pub entities_extracted_total: i64,
    pub processing_time_ms: i64,
}

impl RunStats {
    /// Events created per processed article.
    pub fn event_creation_rate(&self) -> f64 {
        if self.articles_processed == 0 {
            return 0.0;
        }
        self.events_created as f64 / self.articles_processed as f64
    }

    /// Percentage of processed articles that ended up in a multi-article
    /// event.
    pub fn coverage_percentage(&self) -> f64 {
        if self.articles_processed == 0 {
            return 0.0;
        }
        100.0 * self.articles_in_multi_events as f64 / self.articles_processed as f64
    }

    pub fn avg_articles_per_event(&self) -> f64 {
        if self.events_touched == 0 {
            return 0.0;
        }
        self.articles_processed as f64 / self.events_touched as f64
    }

    pub fn time_per_article_ms(&self) -> f64 {
        if self.articles_processed == 0 {
            return 0.0;
        }
        self.processing_time_ms as f64 / self.articles_processed as f64
    }
}
