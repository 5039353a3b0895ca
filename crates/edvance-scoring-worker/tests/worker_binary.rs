//! End-to-end tests of the worker binary over its stdio protocol.

use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use edvance_scoring::{
    CommandSpawner, LessonPlan, ScoreSource, ScoringClient, ScoringSupervisor, SupervisorConfig,
    WorkerState,
};

const WORKER_BIN: &str = env!("CARGO_BIN_EXE_edvance-scoring-worker");

async fn run_worker(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(WORKER_BIN)
        .args(args)
        .env_remove("EDVANCE_MODEL_PATH")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    // Setup failures close stdin early; a broken pipe here is fine.
    let _ = stdin.write_all(input.as_bytes()).await;
    drop(stdin);

    tokio::time::timeout(Duration::from_secs(10), child.wait_with_output())
        .await
        .expect("worker did not exit")
        .unwrap()
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

fn request(id: u64, plan: Value) -> String {
    format!("{}\n", json!({ "id": id, "lesson_plan": plan }))
}

#[tokio::test]
async fn scores_requests_after_ready() {
    let input = [
        request(1, json!({"title": "Empty"})),
        request(
            2,
            json!({
                "title": "Mid",
                "objectives": ["a", "b"],
                "materials": ["m", "n"],
                "activities": ["x", "y"],
                "content": vec!["word"; 450].join(" ")
            }),
        ),
    ]
    .concat();

    let output = run_worker(&[], &input).await;
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "READY");

    let first: Value = serde_json::from_str(&lines[1]).unwrap();
    assert_eq!(first["id"], 1);
    assert_eq!(first["result"]["score"], 5.2);
    assert_eq!(first["result"]["features"]["duration"], 45.0);

    let second: Value = serde_json::from_str(&lines[2]).unwrap();
    assert_eq!(second["id"], 2);
    assert_eq!(second["result"]["score"], 7.6);
    assert_eq!(
        second["result"]["reasoning"][0],
        "Adequate learning objectives (2 objectives)"
    );
}

#[tokio::test]
async fn malformed_line_gets_error_response() {
    let input = format!("not json\n{}", request(3, json!({"title": "ok"})));
    let output = run_worker(&[], &input).await;
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 3);
    let bad: Value = serde_json::from_str(&lines[1]).unwrap();
    assert!(bad["id"].is_null());
    assert!(bad["error"].as_str().unwrap().starts_with("Invalid JSON request"));
    let good: Value = serde_json::from_str(&lines[2]).unwrap();
    assert_eq!(good["id"], 3);
}

#[tokio::test]
async fn custom_model_file_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flat.json");
    std::fs::write(
        &path,
        json!({
            "version": "flat-v0",
            "base": 3.0,
            "objectives": [],
            "materials": [],
            "activities": [],
            "assessments": [],
            "differentiation": 0.0,
            "engagement_bonus": 0.0,
            "density": {"in_range": 0.0, "out_of_range": 0.0}
        })
        .to_string(),
    )
    .unwrap();

    let output = run_worker(
        &[path.to_str().unwrap()],
        &request(1, json!({"title": "x", "objectives": ["a", "b", "c", "d"]})),
    )
    .await;
    assert!(output.status.success());

    let lines = stdout_lines(&output);
    let response: Value = serde_json::from_str(&lines[1]).unwrap();
    assert_eq!(response["result"]["score"], 3.0);
}

#[tokio::test]
async fn bad_model_path_exits_without_ready() {
    let output = run_worker(&["/nonexistent/model.json"], "").await;
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn supervisor_drives_worker_binary() {
    let config = SupervisorConfig::with_command(
        CommandSpawner::new(WORKER_BIN).env("RUST_LOG", "warn"),
    )
    .with_startup_timeout(Duration::from_secs(10))
    .with_shutdown_grace(Duration::from_millis(500));
    let supervisor = Arc::new(ScoringSupervisor::new(config));
    let client = ScoringClient::new(supervisor.clone());

    let scored = client.predict_score(&LessonPlan::new("Fractions", "Math")).await;
    assert_eq!(scored.source, ScoreSource::Primary);
    assert_eq!(scored.score, 5.2);
    assert_eq!(scored.features.len(), 7);
    assert_eq!(supervisor.state(), WorkerState::Ready);

    supervisor.shutdown().await;
    assert_eq!(supervisor.state(), WorkerState::Stopped);
}
