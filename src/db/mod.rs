pub mod article;
pub mod claim;
pub mod config;
pub mod core;
pub mod event;
pub mod metrics;
pub mod outlet;
mod schema;

pub use self::core::Database;
