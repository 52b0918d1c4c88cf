pub mod config;
pub mod engine;
pub mod keywords;
pub mod stats;

pub use config::ClusteringConfig;
pub use engine::{cluster_article, AssignmentOutcome};
pub use stats::RunStats;
