//! Environment configuration for the server binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use edvance_scoring::transport::ServerConfig;
use edvance_scoring::{CommandSpawner, SupervisorConfig};
use edvance_scoring_worker::RubricModel;
use edvance_scoring_worker::model::BUILTIN_MODEL_VERSION;

pub const WORKER_BIN_NAME: &str = "edvance-scoring-worker";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub worker_bin: PathBuf,
    pub model_path: Option<String>,
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
    pub disable_worker: bool,
    pub eager_start: bool,
}

fn flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}

fn secs(value: Option<String>, default: u64) -> Duration {
    Duration::from_secs(
        value
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&s| s > 0)
            .unwrap_or(default),
    )
}

/// The worker binary installed alongside `exe`, or a bare name resolved
/// through `PATH` when the server location is unknown.
fn sibling_worker(exe: Option<&Path>) -> PathBuf {
    exe.and_then(Path::parent)
        .map(|dir| dir.join(WORKER_BIN_NAME))
        .unwrap_or_else(|| PathBuf::from(WORKER_BIN_NAME))
}

impl AppConfig {
    pub fn from_env() -> Self {
        let exe = std::env::current_exe().ok();
        Self::from_lookup(|key| std::env::var(key).ok(), exe.as_deref())
    }

    /// Unset or unparsable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>, exe: Option<&Path>) -> Self {
        let server = ServerConfig::default();
        Self {
            host: lookup("HOST")
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(server.host),
            port: lookup("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(server.port),
            worker_bin: lookup("EDVANCE_WORKER_BIN")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| sibling_worker(exe)),
            model_path: lookup("EDVANCE_MODEL_PATH").filter(|p| !p.trim().is_empty()),
            startup_timeout: secs(lookup("EDVANCE_STARTUP_TIMEOUT_SECS"), 15),
            request_timeout: secs(lookup("EDVANCE_REQUEST_TIMEOUT_SECS"), 30),
            disable_worker: flag(lookup("EDVANCE_DISABLE_WORKER"), false),
            eager_start: flag(lookup("EDVANCE_EAGER_START"), true),
        }
    }

    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// Version of the rubric the worker is configured to load. `None` when
    /// the model file cannot be read; the worker will then fail setup too.
    pub async fn model_version(&self) -> Option<String> {
        let Some(path) = &self.model_path else {
            return Some(BUILTIN_MODEL_VERSION.to_string());
        };
        match RubricModel::load(Path::new(path)).await {
            Ok(model) => Some(model.version),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read model version");
                None
            }
        }
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        let mut command = CommandSpawner::new(&self.worker_bin);
        if let Some(model) = &self.model_path {
            command = command.env("EDVANCE_MODEL_PATH", model);
        }
        SupervisorConfig::with_command(command)
            .with_startup_timeout(self.startup_timeout)
            .with_request_timeout(self.request_timeout)
    }
}
