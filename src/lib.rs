pub mod adaptive;
pub mod clustering;
pub mod db;
pub mod entity;
pub mod eqis;
pub mod logging;
pub mod quality;
pub mod worker;

pub const TARGET_DB: &str = "db_query";
pub const TARGET_ENTITY: &str = "entity";
pub const TARGET_CLUSTERING: &str = "clustering";
pub const TARGET_EQIS: &str = "eqis";
pub const TARGET_ADAPTIVE: &str = "adaptive";
