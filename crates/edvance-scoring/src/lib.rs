//! edvance-scoring: lesson plan health scoring through a supervised worker.
//!
//! The worker is a long-lived child process speaking newline-delimited JSON
//! over stdio. [`ScoringSupervisor`] owns it; [`ScoringClient`] wraps the
//! supervisor with the heuristic fallback so callers always get a score.

mod health;
mod version;

pub mod bridge;
pub mod fallback;
pub mod lesson;
pub mod logging;
pub mod predictor;
pub mod service;
pub mod supervisor;
pub mod transport;
pub mod worker;

pub use bridge::protocol::{ScoreRequest, ScoreResponse, ScoreResult};
pub use fallback::fallback_score;
pub use health::WorkerState;
pub use lesson::{LessonPlan, StructuralCounts};
pub use predictor::{HealthScore, ScoreSource, ScoringClient};
pub use service::{HealthSnapshot, ScoreRecord, ScoringService};
pub use supervisor::{
    CommandSpawner, ScoreBackend, ScoringError, ScoringSupervisor, SpawnError, SupervisorConfig,
    WorkerSpawner,
};
pub use version::{SCORING_VERSION, VersionInfo};
pub use worker::{ScoreError, ScoreHandler, SetupError, WorkerError, run_stdio_worker, run_worker};
