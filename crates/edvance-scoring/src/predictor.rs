//! Caller integration: try the worker, degrade to the heuristic.
//!
//! [`ScoringClient::predict_score`] never fails. Every result says where it
//! came from, so a real score and an approximation can always be told apart.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::bridge::protocol::ScoreResult;
use crate::fallback::{MAX_SCORE, MIN_SCORE, fallback_score};
use crate::health::WorkerState;
use crate::lesson::LessonPlan;
use crate::supervisor::{ScoreBackend, ScoringError};

/// Which path produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    /// The scoring worker.
    Primary,
    /// The structural heuristic, after the worker path failed.
    Fallback,
}

/// What callers get back for a lesson plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub score: f64,
    pub features: BTreeMap<String, f64>,
    pub reasoning: Vec<String>,
    pub source: ScoreSource,
    pub elapsed_ms: u64,
}

impl HealthScore {
    fn new(result: ScoreResult, source: ScoreSource, started: Instant) -> Self {
        Self {
            score: result.score,
            features: result.features,
            reasoning: result.reasoning,
            source,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ScoreSource::Fallback
    }
}

#[derive(Clone)]
pub struct ScoringClient {
    backend: Option<Arc<dyn ScoreBackend>>,
}

impl ScoringClient {
    pub fn new(backend: Arc<dyn ScoreBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Client that never contacts a worker.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.backend
            .as_ref()
            .map(|b| b.state())
            .unwrap_or_default()
    }

    pub async fn predict_score(&self, plan: &LessonPlan) -> HealthScore {
        let started = Instant::now();
        let Some(backend) = &self.backend else {
            return HealthScore::new(fallback_score(plan), ScoreSource::Fallback, started);
        };

        match backend.score(plan).await.and_then(check_bounds) {
            Ok(result) => HealthScore::new(result, ScoreSource::Primary, started),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    title = %plan.title,
                    "Scoring worker failed, using fallback score"
                );
                HealthScore::new(fallback_score(plan), ScoreSource::Fallback, started)
            }
        }
    }

    /// Score many plans concurrently. Output order matches input order.
    pub async fn predict_score_batch(&self, plans: &[LessonPlan]) -> Vec<HealthScore> {
        let scored = futures::future::join_all(plans.iter().map(|p| self.predict_score(p))).await;
        let fallbacks = scored.iter().filter(|s| s.is_fallback()).count();
        tracing::debug!(total = scored.len(), fallbacks, "Scored batch");
        scored
    }
}

/// Clamp a primary score into range. A non-numeric score is treated as a
/// worker error.
fn check_bounds(mut result: ScoreResult) -> Result<ScoreResult, ScoringError> {
    if !result.score.is_finite() {
        return Err(ScoringError::Protocol(format!(
            "worker returned non-finite score {}",
            result.score
        )));
    }
    if !(MIN_SCORE..=MAX_SCORE).contains(&result.score) {
        tracing::warn!(score = result.score, "Primary score out of range, clamping");
        result.score = result.score.clamp(MIN_SCORE, MAX_SCORE);
    }
    Ok(result)
}
