//! Worker runtime - the child side of the scoring protocol.
//!
//! The parent side (spawning, routing responses) is in supervisor.rs.
//!
//! Lifecycle:
//! 1. `setup()` loads whatever the handler needs (the expensive part)
//! 2. `READY` is written to stdout
//! 3. Requests are read from stdin and scored strictly in arrival order,
//!    one response line per request line
//! 4. EOF on stdin ends the loop
//!
//! stdout carries only protocol lines; diagnostics go to stderr via tracing.

use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use async_trait::async_trait;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::{RequestLineCodec, WorkerOutputCodec};
use crate::bridge::protocol::{RequestLine, ScoreRequest, ScoreResponse, ScoreResult, WorkerOutput};
use crate::lesson::LessonPlan;

/// Setup phase errors. The worker exits without signalling readiness.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Model or other resource could not be loaded.
    #[error("failed to load model: {message}")]
    Load { message: String },

    #[error("setup failed: {message}")]
    Setup { message: String },
}

impl SetupError {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
        }
    }

    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }
}

/// Per-request scoring failure, reported back on the response line.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("invalid lesson plan: {0}")]
    InvalidPlan(String),
    #[error("scoring failed: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("worker i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// The scoring method plugged into the worker runtime.
#[async_trait]
pub trait ScoreHandler: Send + Sync {
    /// One-time initialization, run before `READY` is written.
    async fn setup(&self) -> Result<(), SetupError>;

    async fn score(&self, plan: &LessonPlan) -> Result<ScoreResult, ScoreError>;
}

/// Run the worker protocol over the given streams until input ends.
pub async fn run_worker<H, R, W>(handler: &H, reader: R, writer: W) -> Result<(), WorkerError>
where
    H: ScoreHandler + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tracing::info!("Worker starting setup");
    let setup_started = Instant::now();
    if let Err(e) = handler.setup().await {
        tracing::error!(error = %e, "Setup failed");
        return Err(e.into());
    }

    let mut writer = FramedWrite::new(writer, WorkerOutputCodec::new());
    writer.send(WorkerOutput::Ready).await?;
    tracing::info!(
        setup_ms = setup_started.elapsed().as_millis() as u64,
        "Worker ready"
    );

    let mut reader = FramedRead::new(reader, RequestLineCodec::new());
    let mut handled: u64 = 0;
    while let Some(line) = reader.next().await {
        let response = match line? {
            RequestLine::Request(request) => handle_request(handler, request).await,
            RequestLine::Invalid { id, reason } => {
                tracing::warn!(request_id = ?id, %reason, "Rejecting malformed request");
                ScoreResponse::failure(id, reason)
            }
        };
        writer.send(WorkerOutput::Response(response)).await?;
        handled += 1;
    }

    tracing::info!(handled, "Input closed, worker exiting");
    Ok(())
}

/// [`run_worker`] bound to the process stdin/stdout.
pub async fn run_stdio_worker<H>(handler: &H) -> Result<(), WorkerError>
where
    H: ScoreHandler + ?Sized,
{
    run_worker(handler, tokio::io::stdin(), tokio::io::stdout()).await
}

async fn handle_request<H>(handler: &H, request: ScoreRequest) -> ScoreResponse
where
    H: ScoreHandler + ?Sized,
{
    let id = request.id;
    let started = Instant::now();
    let outcome = AssertUnwindSafe(handler.score(&request.lesson_plan))
        .catch_unwind()
        .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(result)) => {
            tracing::debug!(request_id = id, score = result.score, elapsed_ms, "Scored lesson plan");
            ScoreResponse::success(id, result)
        }
        Ok(Err(e)) => {
            tracing::warn!(request_id = id, error = %e, "Scoring failed");
            ScoreResponse::failure(Some(id), e.to_string())
        }
        Err(panic) => {
            let message = panic_message(&*panic);
            tracing::error!(request_id = id, panic = %message, "Scoring panicked");
            ScoreResponse::failure(Some(id), format!("scoring panicked: {}", message))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
