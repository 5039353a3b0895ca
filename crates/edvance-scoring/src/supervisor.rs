//! Supervisor - owns the scoring worker process and multiplexes calls over it.
//!
//! Flow:
//! 1. First call spawns the worker and waits for the `READY` sentinel
//! 2. Calls issued while starting are queued, then flushed in order
//! 3. Requests are written with a fresh id; responses are routed back by id
//! 4. Each dispatched call carries its own deadline
//! 5. On worker exit: fail everything in flight, respawn on the next call
//!
//! One event-loop task per worker process owns the child, its stdin writer,
//! the pending map and the deadline queue. Callers only talk to it through
//! the command channel.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::time::{DelayQueue, delay_queue};

use crate::bridge::codec::{
    DEFAULT_MAX_LINE_LENGTH, RequestLineCodec, WorkerOutputCodec, check_line_length,
};
use crate::bridge::protocol::{RequestId, ScoreRequest, ScoreResponse, ScoreResult, WorkerOutput};
use crate::health::WorkerState;
use crate::lesson::LessonPlan;

pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Errors surfaced to callers of [`ScoringSupervisor::score`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("worker did not become ready within {0:?}")]
    StartupTimeout(Duration),
    #[error("no response from worker within {0:?}")]
    PredictionTimeout(Duration),
    #[error("worker crashed")]
    WorkerCrashed,
    #[error("scoring supervisor is shutting down")]
    Shutdown,
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
    #[error("worker reported an error: {0}")]
    Worker(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Extension point for how the worker process is launched.
///
/// The returned child must have piped stdin and stdout. A piped stderr is
/// forwarded to the log; anything else is left alone.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self) -> Result<Child, SpawnError>;
}

/// Launches a worker executable with piped stdio.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl WorkerSpawner for CommandSpawner {
    fn spawn(&self) -> Result<Child, SpawnError> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd.spawn()?)
    }
}

pub struct SupervisorConfig {
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub max_line_length: usize,
    pub spawner: Arc<dyn WorkerSpawner>,
}

impl SupervisorConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self::with_command(CommandSpawner::new(program))
    }

    pub fn with_command(spawner: CommandSpawner) -> Self {
        Self {
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            spawner: Arc::new(spawner),
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.spawner = spawner;
        self
    }
}

/// Anything that can produce a primary score for a plan.
///
/// Lets the caller integration run without a real worker in tests.
#[async_trait]
pub trait ScoreBackend: Send + Sync {
    async fn score(&self, plan: &LessonPlan) -> Result<ScoreResult, ScoringError>;

    fn state(&self) -> WorkerState;
}

type ScoreReply = oneshot::Sender<Result<ScoreResult, ScoringError>>;
type ReadyReply = oneshot::Sender<Result<(), ScoringError>>;

enum Control {
    Score {
        id: RequestId,
        plan: LessonPlan,
        reply: ScoreReply,
    },
    WhenReady(ReadyReply),
    Shutdown(oneshot::Sender<()>),
}

impl Control {
    fn reject(self, err: ScoringError) {
        match self {
            Control::Score { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Control::WhenReady(reply) => {
                let _ = reply.send(Err(err));
            }
            Control::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }
}

struct WorkerLink {
    generation: u64,
    cmd_tx: mpsc::UnboundedSender<Control>,
}

/// Single owner of the scoring worker.
///
/// Construct once per application and share behind an `Arc`.
pub struct ScoringSupervisor {
    config: SupervisorConfig,
    link: tokio::sync::Mutex<Option<WorkerLink>>,
    next_id: AtomicU64,
    spawned: AtomicU64,
    shutting_down: AtomicBool,
    state_tx: Arc<watch::Sender<WorkerState>>,
}

impl ScoringSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (state_tx, _) = watch::channel(WorkerState::Uninitialized);
        Self {
            config,
            link: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(1),
            spawned: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            state_tx: Arc::new(state_tx),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    /// Number of worker processes spawned so far.
    pub fn spawn_count(&self) -> u64 {
        self.spawned.load(Ordering::Acquire)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Spawn the worker if none is alive and wait for it to become ready.
    pub async fn ensure_started(&self) -> Result<(), ScoringError> {
        let cmd_tx = self.acquire().await?;
        let (reply, rx) = oneshot::channel();
        cmd_tx
            .send(Control::WhenReady(reply))
            .map_err(|_| self.lost_worker())?;
        rx.await.unwrap_or_else(|_| Err(self.lost_worker()))
    }

    /// Score one plan on the worker.
    pub async fn score(&self, plan: &LessonPlan) -> Result<ScoreResult, ScoringError> {
        let cmd_tx = self.acquire().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        cmd_tx
            .send(Control::Score {
                id,
                plan: plan.clone(),
                reply,
            })
            .map_err(|_| self.lost_worker())?;
        rx.await.unwrap_or_else(|_| Err(self.lost_worker()))
    }

    /// Stop the worker and reject everything still in flight. Idempotent.
    pub async fn shutdown(&self) {
        let mut link = self.link.lock().await;
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state_tx.send_replace(WorkerState::ShuttingDown);
        tracing::info!("Shutting down scoring supervisor");

        if let Some(live) = link.take() {
            let (done_tx, done_rx) = oneshot::channel();
            if live.cmd_tx.send(Control::Shutdown(done_tx)).is_ok() {
                let _ = done_rx.await;
            }
            tracing::debug!(generation = live.generation, "Worker stopped");
        }

        self.state_tx.send_replace(WorkerState::Stopped);
    }

    fn lost_worker(&self) -> ScoringError {
        if self.is_shutting_down() {
            ScoringError::Shutdown
        } else {
            ScoringError::WorkerCrashed
        }
    }

    /// Command channel of the live worker, spawning one if needed.
    async fn acquire(&self) -> Result<mpsc::UnboundedSender<Control>, ScoringError> {
        if self.is_shutting_down() {
            return Err(ScoringError::Shutdown);
        }
        let mut link = self.link.lock().await;
        if self.is_shutting_down() {
            return Err(ScoringError::Shutdown);
        }
        if let Some(live) = link.as_ref()
            && !live.cmd_tx.is_closed()
        {
            return Ok(live.cmd_tx.clone());
        }

        let (generation, cmd_tx) = self.spawn_worker()?;
        *link = Some(WorkerLink {
            generation,
            cmd_tx: cmd_tx.clone(),
        });
        Ok(cmd_tx)
    }

    fn spawn_worker(&self) -> Result<(u64, mpsc::UnboundedSender<Control>), ScoringError> {
        publish(&self.state_tx, WorkerState::Starting);

        let mut child = self.config.spawner.spawn().map_err(|e| {
            tracing::error!(error = %e, "Failed to spawn scoring worker");
            publish(&self.state_tx, WorkerState::Crashed);
            ScoringError::Spawn(e.to_string())
        })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                publish(&self.state_tx, WorkerState::Crashed);
                return Err(ScoringError::Spawn(
                    "worker stdin/stdout not captured".to_string(),
                ));
            }
        };

        let generation = self.spawned.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(generation, pid = ?child.id(), "Spawned scoring worker");

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, generation));
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let writer_tx = spawn_writer(stdin, self.config.max_line_length, generation);

        let event_loop = EventLoop {
            generation,
            child,
            reader: FramedRead::new(
                stdout,
                WorkerOutputCodec::with_max_length(self.config.max_line_length),
            ),
            writer_tx: Some(writer_tx),
            cmd_rx,
            state_tx: Arc::clone(&self.state_tx),
            phase: Phase::Starting,
            pending: HashMap::new(),
            deadlines: DelayQueue::new(),
            queued: VecDeque::new(),
            ready_waiters: Vec::new(),
            startup_timeout: self.config.startup_timeout,
            request_timeout: self.config.request_timeout,
            shutdown_grace: self.config.shutdown_grace,
            max_line_length: self.config.max_line_length,
        };
        tokio::spawn(event_loop.run());

        Ok((generation, cmd_tx))
    }
}

#[async_trait]
impl ScoreBackend for ScoringSupervisor {
    async fn score(&self, plan: &LessonPlan) -> Result<ScoreResult, ScoringError> {
        ScoringSupervisor::score(self, plan).await
    }

    fn state(&self) -> WorkerState {
        ScoringSupervisor::state(self)
    }
}

/// Loop-side state update. Never overrides a shutdown in progress.
fn publish(state_tx: &watch::Sender<WorkerState>, next: WorkerState) {
    state_tx.send_if_modified(|current| {
        if current.is_terminal() || *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

async fn forward_stderr(stderr: ChildStderr, generation: u64) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::info!(target: "edvance::worker", generation, "{}", line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(generation, error = %e, "Stopped reading worker stderr");
                break;
            }
        }
    }
}

/// Requests go through a dedicated task so a full stdin pipe never stalls
/// the event loop. Dropping the sender closes the worker's stdin.
fn spawn_writer(
    stdin: ChildStdin,
    max_line_length: usize,
    generation: u64,
) -> mpsc::UnboundedSender<ScoreRequest> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ScoreRequest>();
    let mut writer = FramedWrite::new(stdin, RequestLineCodec::with_max_length(max_line_length));
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let id = request.id;
            if let Err(e) = writer.send(request).await {
                tracing::warn!(generation, request_id = id, error = %e, "Failed to write request to worker");
                break;
            }
        }
        tracing::trace!(generation, "Worker stdin writer exiting");
    });
    tx
}

/// Close the command channel and fail whatever raced into it after the
/// event loop decided to exit.
fn reject_remaining(cmd_rx: &mut mpsc::UnboundedReceiver<Control>, err: ScoringError) {
    cmd_rx.close();
    while let Ok(cmd) = cmd_rx.try_recv() {
        cmd.reject(err.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Ready,
}

struct PendingCall {
    reply: ScoreReply,
    deadline: delay_queue::Key,
}

struct EventLoop {
    generation: u64,
    child: Child,
    reader: FramedRead<ChildStdout, WorkerOutputCodec>,
    writer_tx: Option<mpsc::UnboundedSender<ScoreRequest>>,
    cmd_rx: mpsc::UnboundedReceiver<Control>,
    state_tx: Arc<watch::Sender<WorkerState>>,
    phase: Phase,
    pending: HashMap<RequestId, PendingCall>,
    deadlines: DelayQueue<RequestId>,
    queued: VecDeque<(RequestId, LessonPlan, ScoreReply)>,
    ready_waiters: Vec<ReadyReply>,
    startup_timeout: Duration,
    request_timeout: Duration,
    shutdown_grace: Duration,
    max_line_length: usize,
}

impl EventLoop {
    async fn run(mut self) {
        let started = Instant::now();
        let startup = tokio::time::sleep(self.startup_timeout);
        tokio::pin!(startup);
        let mut exit = ScoringError::WorkerCrashed;

        loop {
            tokio::select! {
                biased;

                output = self.reader.next() => {
                    match output {
                        Some(Ok(WorkerOutput::Ready)) => self.on_ready(started),
                        Some(Ok(WorkerOutput::Response(response))) => self.on_response(response),
                        Some(Ok(WorkerOutput::Malformed { line, reason })) => {
                            tracing::warn!(
                                generation = self.generation,
                                %reason,
                                %line,
                                "Malformed worker output, dropping"
                            );
                        }
                        Some(Err(e)) => {
                            tracing::error!(generation = self.generation, error = %e, "Worker stdout read failed");
                            self.crashed().await;
                            break;
                        }
                        None => {
                            tracing::warn!(generation = self.generation, "Worker closed stdout (crashed?)");
                            self.crashed().await;
                            break;
                        }
                    }
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Control::Score { id, plan, reply }) => self.on_score(id, plan, reply),
                        Some(Control::WhenReady(reply)) => {
                            if self.phase == Phase::Ready {
                                let _ = reply.send(Ok(()));
                            } else {
                                self.ready_waiters.push(reply);
                            }
                        }
                        Some(Control::Shutdown(done)) => {
                            exit = ScoringError::Shutdown;
                            self.stop().await;
                            let _ = done.send(());
                            break;
                        }
                        None => {
                            tracing::debug!(generation = self.generation, "Supervisor dropped, killing worker");
                            let _ = self.child.kill().await;
                            break;
                        }
                    }
                }

                Some(expired) = self.deadlines.next(), if !self.deadlines.is_empty() => {
                    self.on_deadline(expired.into_inner());
                }

                () = &mut startup, if self.phase == Phase::Starting => {
                    tracing::error!(
                        generation = self.generation,
                        timeout = ?self.startup_timeout,
                        "Worker did not become ready in time, killing it"
                    );
                    let _ = self.child.kill().await;
                    self.fail_all(ScoringError::StartupTimeout(self.startup_timeout));
                    publish(&self.state_tx, WorkerState::Crashed);
                    break;
                }

                status = self.child.wait() => {
                    match status {
                        Ok(status) => tracing::warn!(generation = self.generation, %status, "Worker exited"),
                        Err(e) => tracing::error!(generation = self.generation, error = %e, "Failed to wait for worker"),
                    }
                    self.fail_all(ScoringError::WorkerCrashed);
                    publish(&self.state_tx, WorkerState::Crashed);
                    break;
                }
            }
        }

        reject_remaining(&mut self.cmd_rx, exit);
        tracing::debug!(generation = self.generation, "Worker event loop exiting");
    }

    fn on_ready(&mut self, started: Instant) {
        if self.phase == Phase::Ready {
            tracing::warn!(generation = self.generation, "Duplicate READY from worker");
            return;
        }
        self.phase = Phase::Ready;
        tracing::info!(
            generation = self.generation,
            startup_ms = started.elapsed().as_millis() as u64,
            queued = self.queued.len(),
            "Scoring worker ready"
        );

        for waiter in self.ready_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        while let Some((id, plan, reply)) = self.queued.pop_front() {
            self.dispatch(id, plan, reply);
        }
        self.publish_load();
    }

    fn on_score(&mut self, id: RequestId, plan: LessonPlan, reply: ScoreReply) {
        match self.phase {
            Phase::Starting => {
                tracing::debug!(generation = self.generation, request_id = id, "Queueing request until worker is ready");
                self.queued.push_back((id, plan, reply));
            }
            Phase::Ready => {
                self.dispatch(id, plan, reply);
                self.publish_load();
            }
        }
    }

    fn dispatch(&mut self, id: RequestId, plan: LessonPlan, reply: ScoreReply) {
        let request = ScoreRequest {
            id,
            lesson_plan: plan,
        };
        // The worker would drop an over-long line without an id to answer with.
        if let Err(e) = check_line_length(&request, self.max_line_length) {
            tracing::warn!(generation = self.generation, request_id = id, error = %e, "Refusing request");
            let _ = reply.send(Err(ScoringError::Protocol(e.to_string())));
            return;
        }
        let sent = self
            .writer_tx
            .as_ref()
            .is_some_and(|tx| tx.send(request).is_ok());
        if !sent {
            let _ = reply.send(Err(ScoringError::Protocol(
                "worker stdin is closed".to_string(),
            )));
            return;
        }
        let deadline = self.deadlines.insert(id, self.request_timeout);
        self.pending.insert(id, PendingCall { reply, deadline });
        tracing::debug!(generation = self.generation, request_id = id, pending = self.pending.len(), "Dispatched request");
    }

    fn on_response(&mut self, response: ScoreResponse) {
        let Some(id) = response.id else {
            tracing::warn!(
                generation = self.generation,
                error = ?response.error,
                "Dropping worker response without id"
            );
            return;
        };
        match self.pending.remove(&id) {
            Some(call) => {
                self.deadlines.remove(&call.deadline);
                self.publish_load();
                let outcome = response.into_outcome().map_err(ScoringError::Worker);
                if call.reply.send(outcome).is_err() {
                    tracing::debug!(request_id = id, "Caller went away before response arrived");
                }
            }
            None => {
                tracing::warn!(
                    generation = self.generation,
                    request_id = id,
                    "Dropping response for unknown or expired request"
                );
            }
        }
    }

    fn on_deadline(&mut self, id: RequestId) {
        if let Some(call) = self.pending.remove(&id) {
            tracing::warn!(
                generation = self.generation,
                request_id = id,
                timeout = ?self.request_timeout,
                "Scoring request timed out"
            );
            let _ = call
                .reply
                .send(Err(ScoringError::PredictionTimeout(self.request_timeout)));
        }
        self.publish_load();
    }

    fn publish_load(&self) {
        if self.phase != Phase::Ready {
            return;
        }
        let state = if self.pending.is_empty() {
            WorkerState::Ready
        } else {
            WorkerState::Busy
        };
        publish(&self.state_tx, state);
    }

    fn fail_all(&mut self, err: ScoringError) {
        let affected = self.pending.len() + self.queued.len() + self.ready_waiters.len();
        if affected > 0 {
            tracing::warn!(generation = self.generation, affected, error = %err, "Failing in-flight scoring calls");
        }
        for waiter in self.ready_waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
        for (_, _, reply) in self.queued.drain(..) {
            let _ = reply.send(Err(err.clone()));
        }
        for (_, call) in self.pending.drain() {
            let _ = call.reply.send(Err(err.clone()));
        }
        self.deadlines.clear();
    }

    async fn crashed(&mut self) {
        let _ = self.child.kill().await;
        self.fail_all(ScoringError::WorkerCrashed);
        publish(&self.state_tx, WorkerState::Crashed);
    }

    async fn stop(&mut self) {
        self.fail_all(ScoringError::Shutdown);

        // Closing stdin is the worker's cue to exit on its own.
        self.writer_tx = None;
        #[cfg(unix)]
        {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;
            if let Some(pid) = self.child.id()
                && let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            {
                tracing::debug!(generation = self.generation, error = %e, "Failed to SIGTERM worker");
            }
        }

        match tokio::time::timeout(self.shutdown_grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(generation = self.generation, %status, "Worker exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(generation = self.generation, error = %e, "Failed to wait for worker");
            }
            Err(_) => {
                tracing::warn!(
                    generation = self.generation,
                    grace = ?self.shutdown_grace,
                    "Worker did not exit in time, killing it"
                );
                let _ = self.child.kill().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSpawner;

    impl WorkerSpawner for FailingSpawner {
        fn spawn(&self) -> Result<Child, SpawnError> {
            Err(SpawnError::Other("no worker here".to_string()))
        }
    }

    fn failing_supervisor() -> ScoringSupervisor {
        ScoringSupervisor::new(
            SupervisorConfig::new("unused").with_spawner(Arc::new(FailingSpawner)),
        )
    }

    #[test]
    fn config_defaults() {
        let config = SupervisorConfig::new("edvance-scoring-worker");
        assert_eq!(config.startup_timeout, Duration::from_secs(15));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
        assert_eq!(config.max_line_length, 1024 * 1024);
    }

    #[test]
    fn config_builder() {
        let config = SupervisorConfig::new("w")
            .with_startup_timeout(Duration::from_millis(100))
            .with_request_timeout(Duration::from_millis(200))
            .with_shutdown_grace(Duration::from_millis(300))
            .with_max_line_length(64);
        assert_eq!(config.startup_timeout, Duration::from_millis(100));
        assert_eq!(config.request_timeout, Duration::from_millis(200));
        assert_eq!(config.shutdown_grace, Duration::from_millis(300));
        assert_eq!(config.max_line_length, 64);
    }

    #[test]
    fn command_spawner_builder() {
        let spawner = CommandSpawner::new("/bin/worker")
            .arg("model.json")
            .env("EDVANCE_LOG", "debug")
            .current_dir("/tmp");
        assert_eq!(spawner.args, vec!["model.json".to_string()]);
        assert_eq!(
            spawner.env,
            vec![("EDVANCE_LOG".to_string(), "debug".to_string())]
        );
        assert_eq!(spawner.current_dir, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn starts_uninitialized() {
        let supervisor = failing_supervisor();
        assert_eq!(supervisor.state(), WorkerState::Uninitialized);
        assert_eq!(supervisor.spawn_count(), 0);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let supervisor = failing_supervisor();
        let err = supervisor
            .score(&LessonPlan::new("t", "s"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::Spawn(ref msg) if msg.contains("no worker here")));
        assert_eq!(supervisor.state(), WorkerState::Crashed);
        assert_eq!(supervisor.spawn_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_without_worker_stops() {
        let supervisor = failing_supervisor();
        supervisor.shutdown().await;
        assert_eq!(supervisor.state(), WorkerState::Stopped);

        let err = supervisor.ensure_started().await.unwrap_err();
        assert_eq!(err, ScoringError::Shutdown);

        // second call is a no-op
        supervisor.shutdown().await;
        assert_eq!(supervisor.state(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn commands_left_after_shutdown_get_shutdown_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (score_reply, score_rx) = oneshot::channel();
        let (ready_reply, ready_rx) = oneshot::channel();
        tx.send(Control::Score {
            id: 7,
            plan: LessonPlan::new("late", "s"),
            reply: score_reply,
        })
        .unwrap_or_else(|_| panic!("channel closed"));
        tx.send(Control::WhenReady(ready_reply))
            .unwrap_or_else(|_| panic!("channel closed"));

        reject_remaining(&mut rx, ScoringError::Shutdown);

        assert_eq!(score_rx.await.unwrap().unwrap_err(), ScoringError::Shutdown);
        assert_eq!(ready_rx.await.unwrap().unwrap_err(), ScoringError::Shutdown);
        assert!(tx.is_closed());
    }

    #[test]
    fn publish_does_not_override_shutdown() {
        let (tx, rx) = watch::channel(WorkerState::ShuttingDown);
        publish(&tx, WorkerState::Crashed);
        assert_eq!(*rx.borrow(), WorkerState::ShuttingDown);

        let (tx, rx) = watch::channel(WorkerState::Ready);
        publish(&tx, WorkerState::Busy);
        assert_eq!(*rx.borrow(), WorkerState::Busy);
    }

    #[test]
    fn error_messages() {
        assert_eq!(ScoringError::WorkerCrashed.to_string(), "worker crashed");
        assert_eq!(
            ScoringError::StartupTimeout(Duration::from_secs(15)).to_string(),
            "worker did not become ready within 15s"
        );
        assert_eq!(
            ScoringError::Worker("bad plan".into()).to_string(),
            "worker reported an error: bad plan"
        );
    }
}
