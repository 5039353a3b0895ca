//! ScoringService: transport-agnostic health score management.
//!
//! Owns the scoring client, the in-memory score store and shutdown
//! coordination. Transports delegate to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::health::WorkerState;
use crate::lesson::LessonPlan;
use crate::predictor::{HealthScore, ScoreSource, ScoringClient};
use crate::supervisor::ScoringSupervisor;
use crate::version::VersionInfo;

/// Persisted health score of one lesson plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub plan_id: String,
    pub score: f64,
    pub features: BTreeMap<String, f64>,
    pub reasoning: Vec<String>,
    pub source: ScoreSource,
    pub calculated_at: DateTime<Utc>,
}

impl ScoreRecord {
    fn new(plan_id: String, scored: HealthScore) -> Self {
        Self {
            plan_id,
            score: scored.score,
            features: scored.features,
            reasoning: scored.reasoning,
            source: scored.source,
            calculated_at: Utc::now(),
        }
    }
}

/// Snapshot of service health for transports.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: WorkerState,
    pub worker_enabled: bool,
    pub scores: usize,
    pub version: VersionInfo,
}

impl HealthSnapshot {
    pub fn is_ready(&self) -> bool {
        self.status.is_serving()
    }
}

pub struct ScoringService {
    client: ScoringClient,
    supervisor: Option<Arc<ScoringSupervisor>>,
    scores: DashMap<String, ScoreRecord>,
    version: VersionInfo,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ScoringService {
    pub fn new(client: ScoringClient) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            client,
            supervisor: None,
            scores: DashMap::new(),
            version: VersionInfo::new(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Service backed by a supervised worker. The worker is stopped on
    /// [`ScoringService::shutdown`].
    pub fn with_supervisor(supervisor: Arc<ScoringSupervisor>) -> Self {
        let mut svc = Self::new(ScoringClient::new(supervisor.clone()));
        svc.supervisor = Some(supervisor);
        svc
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    pub fn client(&self) -> &ScoringClient {
        &self.client
    }

    /// Score a plan and store the result under `plan_id`, replacing any
    /// earlier score.
    pub async fn calculate(&self, plan_id: &str, plan: &LessonPlan) -> ScoreRecord {
        let scored = self.client.predict_score(plan).await;
        tracing::info!(
            plan_id,
            score = scored.score,
            source = ?scored.source,
            elapsed_ms = scored.elapsed_ms,
            "Calculated health score"
        );
        let record = ScoreRecord::new(plan_id.to_string(), scored);
        self.scores.insert(plan_id.to_string(), record.clone());
        record
    }

    pub fn get(&self, plan_id: &str) -> Option<ScoreRecord> {
        self.scores.get(plan_id).map(|entry| entry.value().clone())
    }

    pub async fn calculate_batch(&self, plans: &[LessonPlan]) -> Vec<HealthScore> {
        self.client.predict_score_batch(plans).await
    }

    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: self.client.worker_state(),
            worker_enabled: self.client.is_enabled(),
            scores: self.scores.len(),
            version: self.version.clone(),
        }
    }

    /// Stop the worker, if there is one.
    pub async fn shutdown(&self) {
        if let Some(supervisor) = &self.supervisor {
            supervisor.shutdown().await;
        }
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}
