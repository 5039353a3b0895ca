use std::process::ExitCode;

use edvance_scoring::run_stdio_worker;
use edvance_scoring_worker::{ModelSource, RubricScorer};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    edvance_scoring::logging::init_tracing();

    let scorer = RubricScorer::new(ModelSource::from_process());
    match run_stdio_worker(&scorer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Worker exited with error");
            ExitCode::FAILURE
        }
    }
}
