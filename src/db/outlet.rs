use anyhow::Result;
use lazy_static::lazy_static;
use sqlx::Row;
use std::collections::HashMap;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use super::core::Database;
use crate::TARGET_DB;

/// Authority weight and correction history for one canonical outlet.
#[derive(Debug, Clone)]
pub struct OutletProfile {
    pub canonical: String,
    pub authority_score: i64,
    pub correction_rate: f64,
}

/// Authority score for outlets with no row in outlet_authority.
pub const DEFAULT_AUTHORITY: i64 = 15;

/// Correction rate assumed when an outlet has no history.
pub const DEFAULT_CORRECTION_RATE: f64 = 0.02;

lazy_static! {
    /// Seed authority scores (0-40 band) used when the outlet_authority
    /// table has no row for a known outlet.
    static ref SEED_AUTHORITY: HashMap<&'static str, i64> = [
        ("reuters", 38),
        ("associated press", 38),
        ("ap news", 38),
        ("bbc news", 36),
        ("bbc world", 36),
        ("the guardian", 34),
        ("the new york times", 34),
        ("the washington post", 32),
        ("cnn", 30),
        ("al jazeera", 28),
        ("pbs newshour", 28),
        ("deutsche welle", 26),
        ("abc news", 25),
        ("nbc news", 25),
        ("cbs news", 25),
        ("npr news", 24),
        ("politico", 22),
        ("voa news", 22),
        ("sky news world", 20),
    ]
    .into_iter()
    .collect();
}

/// Collapse an outlet name to its canonical lookup key: NFKC, lowercase,
/// trimmed, with mobile/web prefixes stripped.
pub fn canonical_key(name: &str) -> String {
    let mut key = name
        .nfkc()
        .collect::<String>()
        .trim()
        .to_lowercase();
    for prefix in ["www.", "m.", "mobile."] {
        if let Some(stripped) = key.strip_prefix(prefix) {
            key = stripped.to_string();
        }
    }
    key
}

/// Loads every outlet profile plus the alias table in one pass; clustering
/// and EQIS runs resolve outlets against this map rather than per-article
/// queries.
pub struct OutletDirectory {
    profiles: HashMap<String, OutletProfile>,
    aliases: HashMap<String, String>,
}

impl OutletDirectory {
    pub async fn load(db: &Database) -> Result<Self> {
        let profile_rows =
            sqlx::query("SELECT outlet_name, authority_score, correction_rate FROM outlet_authority")
                .fetch_all(db.pool())
                .await?;

        let mut profiles = HashMap::new();
        for row in &profile_rows {
            let name: String = row.get("outlet_name");
            let key = canonical_key(&name);
            profiles.insert(
                key.clone(),
                OutletProfile {
                    canonical: key,
                    authority_score: row.get("authority_score"),
                    correction_rate: row.get("correction_rate"),
                },
            );
        }

        let alias_rows = sqlx::query("SELECT alias, canonical FROM outlet_aliases")
            .fetch_all(db.pool())
            .await?;

        let aliases = alias_rows
            .iter()
            .map(|row| {
                (
                    canonical_key(row.get("alias")),
                    canonical_key(row.get("canonical")),
                )
            })
            .collect();

        debug!(
            target: TARGET_DB,
            "Loaded {} outlet profiles and {} aliases",
            profiles.len(),
            profile_rows.len()
        );

        Ok(OutletDirectory { profiles, aliases })
    }

    #[cfg(test)]
    pub fn empty() -> Self {
        OutletDirectory {
            profiles: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Resolve an outlet name (any alias or variant spelling) to its
    /// canonical key.
    pub fn resolve(&self, name: &str) -> String {
        let key = canonical_key(name);
        self.aliases.get(&key).cloned().unwrap_or(key)
    }

    /// Authority score for an outlet; unknown outlets get a low default
    /// rather than failing.
    pub fn authority(&self, name: &str) -> i64 {
        let key = self.resolve(name);
        if let Some(profile) = self.profiles.get(&key) {
            return profile.authority_score.clamp(0, 40);
        }
        SEED_AUTHORITY
            .get(key.as_str())
            .copied()
            .unwrap_or(DEFAULT_AUTHORITY)
    }

    /// Authority normalized to a 0-1 weight.
    pub fn authority_weight(&self, name: &str) -> f64 {
        self.authority(name) as f64 / 40.0
    }

    pub fn correction_rate(&self, name: &str) -> f64 {
        let key = self.resolve(name);
        self.profiles
            .get(&key)
            .map(|p| p.correction_rate)
            .unwrap_or(DEFAULT_CORRECTION_RATE)
    }

    /// Independence group for coverage counting: the alias-collapsed
    /// canonical key.
    pub fn independence_group(&self, name: &str) -> String {
        self.resolve(name)
    }
}
