use anyhow::Result;
use tracing::{info, warn};

use super::scorer::{score_run, Component, PerformanceScore};
use crate::clustering::config::ClusteringConfig;
use crate::clustering::stats::RunStats;
use crate::db::config::{
    active_baseline, generation_config, generation_origin, generation_score, insert_snapshot,
    log_change_event,
};
use crate::db::Database;
use crate::TARGET_ADAPTIVE;

/// What the controller decided after one run.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlAction {
    /// Score was acceptable (or no useful adjustment existed).
    Retained,
    /// A new tuned generation was written, targeting the named component.
    Tuned(Component),
    /// The run regressed against the pre-tuning generation; its
    /// parameters were restored as a new generation.
    RolledBack { restored_generation: i64 },
}

#[derive(Debug, Clone)]
pub struct RunEvaluation {
    pub score: PerformanceScore,
    pub action: ControlAction,
    pub next_config: ClusteringConfig,
}

/// Score one finished run, record it, and decide the configuration for
/// the next run. Every parameter change lands as a new snapshot
/// generation plus per-parameter audit rows; existing snapshots are
/// never modified.
pub async fn evaluate_run(
    db: &Database,
    config: &ClusteringConfig,
    stats: &RunStats,
) -> Result<RunEvaluation> {
    let score = score_run(stats);
    let baseline = active_baseline(db).await?;

    insert_snapshot(
        db,
        config,
        Some(stats),
        Some(&score),
        "runtime",
        &format!(
            "Run scored {:.1} against '{}' baseline (acceptable {:.0})",
            score.overall, baseline.name, baseline.acceptable_score
        ),
    )
    .await?;

    // A generation introduced by auto-tuning is on probation: if it
    // measures below the generation it replaced, restore the old
    // parameters instead of tuning further.
    if generation_origin(db, config.generation).await?.as_deref() == Some("auto_tune") {
        let previous_generation = config.generation - 1;
        if let (Some(previous), Some(previous_score)) = (
            generation_config(db, previous_generation).await?,
            generation_score(db, previous_generation).await?,
        ) {
            if score.overall < previous_score {
                let restored = rollback(
                    db,
                    config,
                    &previous,
                    previous_generation,
                    score.overall,
                    previous_score,
                )
                .await?;
                return Ok(RunEvaluation {
                    score,
                    action: ControlAction::RolledBack {
                        restored_generation: previous_generation,
                    },
                    next_config: restored,
                });
            }
        }
    }

    if score.overall >= baseline.acceptable_score {
        return Ok(RunEvaluation {
            score,
            action: ControlAction::Retained,
            next_config: config.clone(),
        });
    }

    let worst = score.worst_component();
    let candidate = tune_for(worst, config, stats);
    if candidate == *config {
        info!(
            target: TARGET_ADAPTIVE,
            "Score {:.1} below acceptable {:.0} but no adjustment available for {}",
            score.overall,
            baseline.acceptable_score,
            worst
        );
        return Ok(RunEvaluation {
            score,
            action: ControlAction::Retained,
            next_config: config.clone(),
        });
    }

    let mut tuned = candidate;
    tuned.generation = config.generation + 1;
    let snapshot_id = insert_snapshot(
        db,
        &tuned,
        None,
        None,
        "auto_tune",
        &format!(
            "Tuning {} (score {:.1} below acceptable {:.0})",
            worst, score.overall, baseline.acceptable_score
        ),
    )
    .await?;
    record_parameter_diff(
        db,
        config,
        &tuned,
        &format!("auto_tune_{worst}"),
        score.overall,
        snapshot_id,
    )
    .await?;

    info!(
        target: TARGET_ADAPTIVE,
        "Auto-tuned generation {} -> {} targeting {} (score {:.1})",
        config.generation,
        tuned.generation,
        worst,
        score.overall
    );

    Ok(RunEvaluation {
        score,
        action: ControlAction::Tuned(worst),
        next_config: tuned,
    })
}

async fn rollback(
    db: &Database,
    current: &ClusteringConfig,
    previous: &ClusteringConfig,
    previous_generation: i64,
    current_score: f64,
    previous_score: f64,
) -> Result<ClusteringConfig> {
    let mut restored = previous.clone();
    restored.generation = current.generation + 1;

    let snapshot_id = insert_snapshot(
        db,
        &restored,
        None,
        None,
        "rollback",
        &format!(
            "Generation {} scored {:.1}, below generation {} at {:.1}; parameters restored",
            current.generation, current_score, previous_generation, previous_score
        ),
    )
    .await?;
    record_parameter_diff(
        db,
        current,
        &restored,
        "rollback_regression",
        current_score,
        snapshot_id,
    )
    .await?;

    warn!(
        target: TARGET_ADAPTIVE,
        "Rolled back generation {} ({:.1}) to generation {} parameters ({:.1}) as generation {}",
        current.generation,
        current_score,
        previous_generation,
        previous_score,
        restored.generation
    );

    Ok(restored)
}

async fn record_parameter_diff(
    db: &Database,
    old: &ClusteringConfig,
    new: &ClusteringConfig,
    reason: &str,
    previous_score: f64,
    snapshot_id: i64,
) -> Result<()> {
    let old_values = old.parameter_values();
    for ((name, old_value), (_, new_value)) in old_values.iter().zip(new.parameter_values()) {
        if *old_value != new_value {
            log_change_event(
                db,
                name,
                Some(old_value),
                Some(&new_value),
                reason,
                Some(previous_score),
                snapshot_id,
            )
            .await?;
        }
    }
    Ok(())
}

/// Bounded single-step adjustment for the weakest scoring component.
/// Each branch moves at most a few parameters, and never past its
/// floor or ceiling, so repeated tuning converges instead of thrashing.
fn tune_for(component: Component, config: &ClusteringConfig, stats: &RunStats) -> ClusteringConfig {
    let mut tuned = config.clone();
    match component {
        Component::Effectiveness => {
            if stats.event_creation_rate() < 0.15 {
                tuned.min_shared_entities = (config.min_shared_entities - 1).max(1);
                tuned.entity_overlap_threshold =
                    (config.entity_overlap_threshold - 0.05).max(0.15);
                tuned.max_time_diff_hours = (config.max_time_diff_hours + 12).min(72);
            }
        }
        Component::Efficiency => {
            if config.max_entity_length > 30 {
                tuned.max_entity_length = 30;
            }
            if config.entity_noise_threshold < 0.30 {
                tuned.entity_noise_threshold = 0.30;
            }
        }
        Component::Coverage => relax_grouping(&mut tuned),
        Component::Precision => {
            let avg = stats.avg_articles_per_event();
            if avg < 1.8 {
                relax_grouping(&mut tuned);
            } else if avg > 4.5 {
                if config.min_shared_entities < 3 {
                    tuned.min_shared_entities = config.min_shared_entities + 1;
                }
                tuned.entity_overlap_threshold =
                    (config.entity_overlap_threshold + 0.05).min(0.35);
            }
        }
    }
    tuned
}

fn relax_grouping(config: &mut ClusteringConfig) {
    if config.min_shared_entities > 1 {
        config.min_shared_entities -= 1;
    }
    config.entity_overlap_threshold = (config.entity_overlap_threshold - 0.03).max(0.20);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::config::{change_log, load_startup_config, snapshot_history};

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

    fn poor_stats() -> RunStats {
        // Almost no grouping: two singleton events out of 100 articles.
        stats(100, 2, 2, 2, 0, 20_000)
    }

    fn worse_stats() -> RunStats {
        stats(100, 2, 2, 2, 0, 100_000)
    }

    fn good_stats() -> RunStats {
        stats(100, 25, 35, 3, 62, 7_000)
    }

    #[tokio::test]
    async fn acceptable_run_retains_configuration() {
        let db = Database::new_in_memory().await.unwrap();
        let config = load_startup_config(&db, 60.0).await.unwrap();

        let evaluation = evaluate_run(&db, &config, &good_stats()).await.unwrap();

        assert_eq!(evaluation.action, ControlAction::Retained);
        assert_eq!(evaluation.next_config, config);
        assert!(evaluation.score.overall >= 60.0);
    }

    #[tokio::test]
    async fn poor_run_emits_tuned_generation_with_audit_rows() {
        let db = Database::new_in_memory().await.unwrap();
        let config = load_startup_config(&db, 60.0).await.unwrap();

        let evaluation = evaluate_run(&db, &config, &poor_stats()).await.unwrap();

        assert!(matches!(evaluation.action, ControlAction::Tuned(_)));
        assert_eq!(evaluation.next_config.generation, config.generation + 1);
        // Relaxed grouping thresholds, never past their floors.
        assert_eq!(evaluation.next_config.min_shared_entities, 1);
        assert!(evaluation.next_config.entity_overlap_threshold >= 0.15);

        let changes = change_log(&db, 20).await.unwrap();
        assert!(!changes.is_empty());
        assert!(changes.iter().all(|c| c.reason.starts_with("auto_tune_")));

        let history = snapshot_history(&db, 10).await.unwrap();
        assert_eq!(history[0].source, "auto_tune");
        assert_eq!(history[1].source, "runtime");
    }

    #[tokio::test]
    async fn regression_after_tuning_rolls_back_to_previous_parameters() {
        let db = Database::new_in_memory().await.unwrap();
        let original = load_startup_config(&db, 60.0).await.unwrap();

        let tuned = evaluate_run(&db, &original, &poor_stats()).await.unwrap();
        assert!(matches!(tuned.action, ControlAction::Tuned(_)));

        let rolled = evaluate_run(&db, &tuned.next_config, &worse_stats())
            .await
            .unwrap();

        assert_eq!(
            rolled.action,
            ControlAction::RolledBack {
                restored_generation: original.generation
            }
        );
        // Same parameters as the original generation under a new number.
        assert_eq!(
            rolled.next_config.parameter_values(),
            original.parameter_values()
        );
        assert_eq!(rolled.next_config.generation, tuned.next_config.generation + 1);

        let history = snapshot_history(&db, 10).await.unwrap();
        assert_eq!(history[0].source, "rollback");

        let changes = change_log(&db, 20).await.unwrap();
        assert!(changes.iter().any(|c| c.reason == "rollback_regression"));
    }

    #[tokio::test]
    async fn rollback_generation_is_not_rolled_back_again() {
        let db = Database::new_in_memory().await.unwrap();
        let original = load_startup_config(&db, 60.0).await.unwrap();

        let tuned = evaluate_run(&db, &original, &poor_stats()).await.unwrap();
        let rolled = evaluate_run(&db, &tuned.next_config, &worse_stats())
            .await
            .unwrap();

        // Another poor run on the restored generation tunes forward
        // instead of bouncing between the same two parameter sets.
        let next = evaluate_run(&db, &rolled.next_config, &poor_stats())
            .await
            .unwrap();
        assert!(!matches!(next.action, ControlAction::RolledBack { .. }));
    }

    #[test]
    fn tuning_respects_parameter_floors() {
        let mut config = ClusteringConfig::conservative_defaults();
        config.min_shared_entities = 1;
        config.entity_overlap_threshold = 0.15;
        config.max_time_diff_hours = 72;

        let tuned = tune_for(Component::Effectiveness, &config, &poor_stats());
        assert_eq!(tuned.min_shared_entities, 1);
        assert_eq!(tuned.entity_overlap_threshold, 0.15);
        assert_eq!(tuned.max_time_diff_hours, 72);
    }
}
