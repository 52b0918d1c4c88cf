pub mod controller;
pub mod scorer;

pub use controller::{evaluate_run, ControlAction, RunEvaluation};
pub use scorer::{score_run, PerformanceScore};
