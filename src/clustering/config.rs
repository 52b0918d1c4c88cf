use serde::{Deserialize, Serialize};

use crate::entity::types::ExtractionRules;

/// One generation of clustering thresholds. Snapshots of this struct are
/// immutable once written; tuning always produces a new generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringConfig {
    pub generation: i64,
    pub min_shared_entities: i64,
    pub entity_overlap_threshold: f64,
    pub min_title_keywords: i64,
    pub title_keyword_bonus: f64,
    pub max_time_diff_hours: i64,
    pub allow_same_outlet: bool,
    pub min_entity_length: i64,
    pub max_entity_length: i64,
    pub entity_noise_threshold: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self::conservative_defaults()
    }
}

impl ClusteringConfig {
    /// Safe startup values used when no configuration history exists.
    pub fn conservative_defaults() -> Self {
        ClusteringConfig {
            generation: 1,
            min_shared_entities: 2,
            entity_overlap_threshold: 0.250,
            min_title_keywords: 3,
            title_keyword_bonus: 0.100,
            max_time_diff_hours: 48,
            allow_same_outlet: false,
            min_entity_length: 3,
            max_entity_length: 50,
            entity_noise_threshold: 0.200,
        }
    }

    pub fn extraction_rules(&self) -> ExtractionRules {
        ExtractionRules {
            min_entity_length: self.min_entity_length.max(1) as usize,
            max_entity_length: self.max_entity_length.max(1) as usize,
            max_per_category: 10,
        }
    }

    /// Parameter values by name, used by the audit log when diffing two
    /// generations.
    pub fn parameter_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("min_shared_entities", self.min_shared_entities.to_string()),
            (
                "entity_overlap_threshold",
                format!("{:.3}", self.entity_overlap_threshold),
            ),
            ("min_title_keywords", self.min_title_keywords.to_string()),
            (
                "title_keyword_bonus",
                format!("{:.3}", self.title_keyword_bonus),
            ),
            ("max_time_diff_hours", self.max_time_diff_hours.to_string()),
            ("allow_same_outlet", self.allow_same_outlet.to_string()),
            ("min_entity_length", self.min_entity_length.to_string()),
            ("max_entity_length", self.max_entity_length.to_string()),
            (
                "entity_noise_threshold",
                format!("{:.3}", self.entity_noise_threshold),
            ),
        ]
    }
}
