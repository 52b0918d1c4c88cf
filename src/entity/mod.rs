pub mod extraction;
pub mod types;

pub use types::*;

// Extraction rules version; bump when patterns change so stored entity
// sets can be recomputed.
pub const EXTRACTION_RULES_VERSION: u32 = 2;
