//! Version information reported by the health endpoint.

/// Crate version from Cargo.toml
pub const SCORING_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, serde::Serialize)]
pub struct VersionInfo {
    pub service: &'static str,
    /// Version string reported by the worker model, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            service: SCORING_VERSION,
            model: None,
        }
    }
}

impl VersionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, version: impl Into<String>) -> Self {
        self.model = Some(version.into());
        self
    }
}
