//! HTTP route handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::WorkerState;
use crate::lesson::LessonPlan;
use crate::predictor::{HealthScore, ScoreSource};
use crate::service::{ScoreRecord, ScoringService};
use crate::version::VersionInfo;

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: WorkerState,
    pub worker_enabled: bool,
    pub version: VersionInfo,
}

#[derive(Debug, Serialize)]
pub struct CalculateResponse {
    pub success: bool,
    pub plan_id: String,
    pub health_score: f64,
    pub source: ScoreSource,
    pub features: BTreeMap<String, f64>,
    pub reasoning: Vec<String>,
    pub calculated_at: DateTime<Utc>,
}

impl From<ScoreRecord> for CalculateResponse {
    fn from(record: ScoreRecord) -> Self {
        Self {
            success: true,
            plan_id: record.plan_id,
            health_score: record.score,
            source: record.source,
            features: record.features,
            reasoning: record.reasoning,
            calculated_at: record.calculated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StoredScoreResponse {
    pub health_score: f64,
    pub details: ScoreRecord,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub lesson_plans: Vec<LessonPlan>,
}

async fn health_check(State(service): State<Arc<ScoringService>>) -> Json<HealthCheckResponse> {
    let snapshot = service.health();
    Json(HealthCheckResponse {
        status: snapshot.status,
        worker_enabled: snapshot.worker_enabled,
        version: snapshot.version,
    })
}

async fn calculate(
    State(service): State<Arc<ScoringService>>,
    Path(plan_id): Path<String>,
    Json(plan): Json<LessonPlan>,
) -> Json<CalculateResponse> {
    let record = service.calculate(&plan_id, &plan).await;
    Json(record.into())
}

async fn get_score(
    State(service): State<Arc<ScoringService>>,
    Path(plan_id): Path<String>,
) -> impl IntoResponse {
    match service.get(&plan_id) {
        Some(record) => Json(StoredScoreResponse {
            health_score: record.score,
            details: record,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Lesson plan not found" })),
        )
            .into_response(),
    }
}

async fn batch(
    State(service): State<Arc<ScoringService>>,
    Json(request): Json<BatchRequest>,
) -> Json<Vec<HealthScore>> {
    Json(service.calculate_batch(&request.lesson_plans).await)
}

async fn shutdown(State(service): State<Arc<ScoringService>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    service.trigger_shutdown();
    (StatusCode::OK, Json(serde_json::json!({})))
}

pub fn routes(service: Arc<ScoringService>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/shutdown", post(shutdown))
        .route("/health-score/batch", post(batch))
        .route("/health-score/calculate/{plan_id}", post(calculate))
        .route("/health-score/{plan_id}", get(get_score))
        .with_state(service)
}
