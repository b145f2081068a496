pub mod builder;
pub mod columns;
pub mod indicators;

pub use builder::build_features;
pub use columns::{FEATURE_COLUMNS, FeatureRow};
