mod config;

use std::sync::Arc;

use tracing::{error, info, warn};

use edvance_scoring::transport::serve;
use edvance_scoring::{ScoringClient, ScoringService, ScoringSupervisor, VersionInfo};

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    edvance_scoring::logging::init_tracing();

    info!("edvance-scoring-server {}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env();
    if config.disable_worker {
        warn!("Scoring worker disabled, all scores use the fallback rubric");
        let service = Arc::new(ScoringService::new(ScoringClient::disabled()));
        return serve(config.server(), service).await;
    }

    info!(
        worker = %config.worker_bin.display(),
        startup_timeout_secs = config.startup_timeout.as_secs(),
        request_timeout_secs = config.request_timeout.as_secs(),
        "Using subprocess scoring worker"
    );
    let version = match config.model_version().await {
        Some(model) => VersionInfo::new().with_model(model),
        None => VersionInfo::new(),
    };
    let supervisor = Arc::new(ScoringSupervisor::new(config.supervisor()));
    let service =
        Arc::new(ScoringService::with_supervisor(Arc::clone(&supervisor)).with_version(version));

    if config.eager_start {
        tokio::spawn(async move {
            match supervisor.ensure_started().await {
                Ok(()) => info!("Scoring worker ready"),
                Err(e) => error!(error = %e, "Scoring worker failed to start, serving fallback scores"),
            }
        });
    }

    serve(config.server(), service).await
}
