use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-article entity sets: four capped categories plus a flat lowercase
/// key-entity set used by the clustering engine as its entity universe.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntitySet {
    pub persons: Vec<String>,
    pub organizations: Vec<String>,
    pub locations: Vec<String>,
    pub dates: Vec<String>,
    pub key_entities: Vec<String>,
}

impl EntitySet {
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
            && self.organizations.is_empty()
            && self.locations.is_empty()
            && self.dates.is_empty()
            && self.key_entities.is_empty()
    }

    pub fn total_count(&self) -> usize {
        self.persons.len()
            + self.organizations.len()
            + self.locations.len()
            + self.dates.len()
            + self.key_entities.len()
    }

    /// Lowercase matching universe for clustering: key entities plus the
    /// categorized names.
    pub fn matching_set(&self) -> HashSet<String> {
        let mut set: HashSet<String> = self.key_entities.iter().cloned().collect();
        for name in self
            .persons
            .iter()
            .chain(self.organizations.iter())
            .chain(self.locations.iter())
        {
            set.insert(name.to_lowercase());
        }
        set
    }
}

/// Length bounds and caps applied during extraction, derived from the
/// active clustering configuration.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRules {
    pub min_entity_length: usize,
    pub max_entity_length: usize,
    pub max_per_category: usize,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        ExtractionRules {
            min_entity_length: 3,
            max_entity_length: 50,
            max_per_category: 10,
        }
    }
}
