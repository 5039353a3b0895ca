//! Scoring worker process.
//!
//! Speaks the line protocol from [`edvance_scoring::worker`] on
//! stdin/stdout and scores plans with a tiered rubric loaded at startup.

pub mod model;
pub mod scorer;

pub use model::{ModelError, PlanFeatures, RubricModel, Tier};
pub use scorer::{ModelSource, RubricScorer};
