pub mod aggregator;
pub mod components;
pub mod tfidf;

pub use aggregator::recompute_event;
pub use components::EqisWeights;
