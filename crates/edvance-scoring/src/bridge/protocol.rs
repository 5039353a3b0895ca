//! Wire protocol types for server-worker communication.
//!
//! One JSON object per line in both directions:
//! - **stdin** (server -> worker): [`ScoreRequest`]
//! - **stdout** (worker -> server): the [`READY_SENTINEL`] line once, then one
//!   [`ScoreResponse`] per request
//!
//! stderr is free-form diagnostics and never parsed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::lesson::LessonPlan;

/// Literal line the worker prints once its model is loaded.
pub const READY_SENTINEL: &str = "READY";

/// Correlation id assigned by the supervisor.
pub type RequestId = u64;

/// Server -> worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub id: RequestId,
    pub lesson_plan: LessonPlan,
}

/// Score plus the signals and explanations behind it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: f64,
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
    #[serde(default)]
    pub reasoning: Vec<String>,
}

/// Worker -> server.
///
/// `id` is `None` only when the worker could not recover an id from a
/// malformed request line; such responses cannot be correlated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ScoreResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScoreResponse {
    pub fn success(id: RequestId, result: ScoreResult) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<RequestId>, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Collapse into the per-request outcome. An explicit error wins over a
    /// result.
    pub fn into_outcome(self) -> Result<ScoreResult, String> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err("response carried neither result nor error".to_string()),
        }
    }
}

/// One decoded line of worker stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutput {
    Ready,
    Response(ScoreResponse),
    /// Line that is neither the sentinel nor a valid response. Logged and
    /// dropped by the supervisor.
    Malformed { line: String, reason: String },
}

/// One decoded line of worker stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestLine {
    Request(ScoreRequest),
    /// Unparsable request. `id` is recovered when the line was JSON with a
    /// numeric `id` field.
    Invalid {
        id: Option<RequestId>,
        reason: String,
    },
}
