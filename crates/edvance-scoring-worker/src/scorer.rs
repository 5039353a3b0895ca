//! [`ScoreHandler`] backed by a [`RubricModel`].

use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;

use edvance_scoring::worker::{ScoreError, ScoreHandler, SetupError};
use edvance_scoring::{LessonPlan, ScoreResult};

use crate::model::RubricModel;

pub const MODEL_PATH_ENV: &str = "EDVANCE_MODEL_PATH";

/// Where the rubric comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    BuiltIn,
    File(PathBuf),
}

impl ModelSource {
    /// A command line argument wins over the environment. Empty values are
    /// treated as unset.
    pub fn resolve(arg: Option<String>, env: Option<String>) -> Self {
        arg.into_iter()
            .chain(env)
            .find(|p| !p.trim().is_empty())
            .map_or(Self::BuiltIn, |p| Self::File(PathBuf::from(p)))
    }

    pub fn from_process() -> Self {
        Self::resolve(std::env::args().nth(1), std::env::var(MODEL_PATH_ENV).ok())
    }
}

pub struct RubricScorer {
    source: ModelSource,
    model: OnceLock<RubricModel>,
}

impl RubricScorer {
    pub fn new(source: ModelSource) -> Self {
        Self {
            source,
            model: OnceLock::new(),
        }
    }

    /// Scorer with a model already in place; `setup` is then a no-op.
    pub fn with_model(model: RubricModel) -> Self {
        Self {
            source: ModelSource::BuiltIn,
            model: OnceLock::from(model),
        }
    }

    pub fn model(&self) -> Option<&RubricModel> {
        self.model.get()
    }
}

#[async_trait]
impl ScoreHandler for RubricScorer {
    async fn setup(&self) -> Result<(), SetupError> {
        if self.model.get().is_some() {
            return Ok(());
        }
        let model = match &self.source {
            ModelSource::BuiltIn => RubricModel::default(),
            ModelSource::File(path) => RubricModel::load(path)
                .await
                .map_err(|e| SetupError::load(e.to_string()))?,
        };
        tracing::info!(version = %model.version, source = ?self.source, "Loaded rubric model");
        let _ = self.model.set(model);
        Ok(())
    }

    async fn score(&self, plan: &LessonPlan) -> Result<ScoreResult, ScoreError> {
        let model = self
            .model
            .get()
            .ok_or_else(|| ScoreError::Failed("model not loaded".to_string()))?;
        Ok(model.score(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_wins_over_environment() {
        assert_eq!(
            ModelSource::resolve(Some("a.json".into()), Some("b.json".into())),
            ModelSource::File("a.json".into())
        );
        assert_eq!(
            ModelSource::resolve(None, Some("b.json".into())),
            ModelSource::File("b.json".into())
        );
        assert_eq!(
            ModelSource::resolve(Some(" ".into()), Some(String::new())),
            ModelSource::BuiltIn
        );
        assert_eq!(ModelSource::resolve(None, None), ModelSource::BuiltIn);
    }

    #[tokio::test]
    async fn scoring_before_setup_fails() {
        let scorer = RubricScorer::new(ModelSource::BuiltIn);
        let err = scorer.score(&LessonPlan::new("t", "s")).await.unwrap_err();
        assert!(matches!(err, ScoreError::Failed(_)));
    }

    #[tokio::test]
    async fn setup_loads_builtin_model() {
        let scorer = RubricScorer::new(ModelSource::BuiltIn);
        scorer.setup().await.unwrap();
        assert_eq!(scorer.model(), Some(&RubricModel::default()));
        let result = scorer.score(&LessonPlan::new("t", "s")).await.unwrap();
        assert_eq!(result.score, 5.2);
        assert_eq!(result.features.len(), 7);
    }

    #[tokio::test]
    async fn missing_model_file_fails_setup() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = RubricScorer::new(ModelSource::File(dir.path().join("nope.json")));
        let err = scorer.setup().await.unwrap_err();
        assert!(matches!(err, SetupError::Load { .. }));
        assert!(scorer.model().is_none());
    }

    #[tokio::test]
    async fn preloaded_model_skips_setup() {
        let model = RubricModel {
            base: 3.0,
            ..Default::default()
        };
        let scorer = RubricScorer::with_model(model.clone());
        scorer.setup().await.unwrap();
        assert_eq!(scorer.model(), Some(&model));
    }
}
