use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                outlet_name TEXT NOT NULL,
                title TEXT NOT NULL,
                text TEXT,
                published_at TEXT,
                fetched_at TEXT,
                quality_score INTEGER,
                quality_computed_at TEXT,
                entities TEXT,
                entities_extracted_at TEXT,
                entities_rules_version INTEGER,
                computed_event_id INTEGER,
                computed_at TEXT,
                FOREIGN KEY (computed_event_id) REFERENCES events (id)
            );
            CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles (published_at);
            CREATE INDEX IF NOT EXISTS idx_articles_computed_event_id ON articles (computed_event_id);
            CREATE INDEX IF NOT EXISTS idx_articles_outlet ON articles (outlet_name);

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                summary TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                active BOOLEAN NOT NULL DEFAULT TRUE
            );
            CREATE INDEX IF NOT EXISTS idx_events_created_at ON events (created_at);
            CREATE INDEX IF NOT EXISTS idx_events_active ON events (active);

            -- Soft membership relation; the canonical assignment lives on
            -- articles.computed_event_id and always has a matching row here.
            CREATE TABLE IF NOT EXISTS event_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL,
                article_id INTEGER NOT NULL,
                relevance REAL NOT NULL DEFAULT 1.0,
                added_at TEXT NOT NULL,
                FOREIGN KEY (event_id) REFERENCES events (id) ON DELETE CASCADE,
                FOREIGN KEY (article_id) REFERENCES articles (id) ON DELETE CASCADE,
                UNIQUE(event_id, article_id)
            );
            CREATE INDEX IF NOT EXISTS idx_event_articles_event ON event_articles (event_id);
            CREATE INDEX IF NOT EXISTS idx_event_articles_article ON event_articles (article_id);

            CREATE TABLE IF NOT EXISTS event_metrics (
                event_id INTEGER PRIMARY KEY,
                computed_at TEXT NOT NULL,
                age_days REAL,
                coverage_sites INTEGER,
                keyword_coherence REAL,
                best_source TEXT,
                corroboration_ratio REAL,
                contradiction_rate REAL,
                correction_risk REAL,
                eqis_score REAL,
                components TEXT,
                FOREIGN KEY (event_id) REFERENCES events (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS outlet_authority (
                outlet_name TEXT PRIMARY KEY,
                authority_score INTEGER NOT NULL,
                correction_rate REAL NOT NULL DEFAULT 0.02
            );

            -- Alias -> canonical outlet key, maintained as data rather than
            -- as branching conditionals in code.
            CREATE TABLE IF NOT EXISTS outlet_aliases (
                alias TEXT PRIMARY KEY,
                canonical TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS claims (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                article_id INTEGER NOT NULL,
                claim_text TEXT NOT NULL,
                verified_state TEXT NOT NULL DEFAULT 'unverified',
                FOREIGN KEY (article_id) REFERENCES articles (id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_claims_article ON claims (article_id);

            -- Immutable, generation-numbered clustering configuration
            -- snapshots; a new generation is a new row, never an update.
            CREATE TABLE IF NOT EXISTS config_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                generation INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                min_shared_entities INTEGER NOT NULL,
                entity_overlap_threshold REAL NOT NULL,
                min_title_keywords INTEGER NOT NULL,
                title_keyword_bonus REAL NOT NULL,
                max_time_diff_hours INTEGER NOT NULL,
                allow_same_outlet BOOLEAN NOT NULL,
                min_entity_length INTEGER NOT NULL,
                max_entity_length INTEGER NOT NULL,
                entity_noise_threshold REAL NOT NULL,
                articles_processed INTEGER,
                events_created INTEGER,
                singleton_events INTEGER,
                coverage_percentage REAL,
                avg_articles_per_event REAL,
                processing_time_ms INTEGER,
                effectiveness_score REAL,
                efficiency_score REAL,
                coverage_score REAL,
                precision_score REAL,
                performance_score REAL,
                source TEXT NOT NULL,
                notes TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_config_snapshots_generation ON config_snapshots (generation);

            -- Append-only audit log of parameter changes.
            CREATE TABLE IF NOT EXISTS config_change_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                changed_at TEXT NOT NULL,
                parameter TEXT NOT NULL,
                old_value TEXT,
                new_value TEXT,
                reason TEXT NOT NULL,
                previous_score REAL,
                snapshot_id INTEGER,
                FOREIGN KEY (snapshot_id) REFERENCES config_snapshots (id)
            );

            CREATE TABLE IF NOT EXISTS performance_baselines (
                name TEXT PRIMARY KEY,
                acceptable_score REAL NOT NULL,
                target_score REAL NOT NULL,
                optimal_score REAL NOT NULL,
                active BOOLEAN NOT NULL DEFAULT FALSE
            );

            INSERT OR IGNORE INTO performance_baselines
                (name, acceptable_score, target_score, optimal_score, active)
            VALUES ('default', 60.0, 75.0, 90.0, TRUE);
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!(target: TARGET_DB, "Database schema initialized");
        Ok(())
    }
}
