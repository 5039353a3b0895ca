//! Lesson plan payload sent to the scorer.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Default lesson length in minutes when the plan does not say.
pub const DEFAULT_DURATION_MINUTES: u32 = 45;

fn default_duration() -> u32 {
    DEFAULT_DURATION_MINUTES
}

/// Plain text from any scalar. `null` is empty.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Minutes from a number or numeric string, truncated. Missing, zero,
/// negative or unreadable values mean the default length.
fn lenient_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let minutes = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(minutes
        .filter(|m| m.is_finite() && *m >= 1.0)
        .map(|m| m.trunc().min(f64::from(u32::MAX)) as u32)
        .unwrap_or(DEFAULT_DURATION_MINUTES))
}

/// A list of entries. `null` is empty, a lone string is one entry and a
/// bare flag such as `"differentiation": true` counts as one entry when set.
fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(false) => Vec::new(),
        Value::Bool(true) => vec!["true".to_string()],
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        other => vec![other.to_string()],
    })
}

/// The item being scored.
///
/// Only the fields the scorers look at are modelled. Unknown fields in
/// incoming JSON are ignored, so the full lesson plan record can be posted
/// as-is. Loosely typed records (null lists, fractional or string durations)
/// are coerced rather than rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonPlan {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub subject: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub grade: String,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "String::is_empty"
    )]
    pub topic: String,
    /// Lesson length in minutes.
    #[serde(default = "default_duration", deserialize_with = "lenient_duration")]
    pub duration: u32,
    #[serde(default, deserialize_with = "lenient_list")]
    pub objectives: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub materials: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub activities: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub assessments: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub differentiation: Vec<String>,
    /// Free-form lesson body: plain text or a structured document.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub content: serde_json::Value,
}

/// Counts of the structural elements of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuralCounts {
    pub objectives: usize,
    pub materials: usize,
    pub activities: usize,
    pub assessments: usize,
    pub differentiation: usize,
}

impl StructuralCounts {
    pub fn has_differentiation(&self) -> bool {
        self.differentiation > 0
    }
}

impl LessonPlan {
    pub fn new(title: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subject: subject.into(),
            duration: DEFAULT_DURATION_MINUTES,
            ..Default::default()
        }
    }

    pub fn structure(&self) -> StructuralCounts {
        StructuralCounts {
            objectives: self.objectives.len(),
            materials: self.materials.len(),
            activities: self.activities.len(),
            assessments: self.assessments.len(),
            differentiation: self.differentiation.len(),
        }
    }

    /// Word count of the lesson body. Structured content is counted over its
    /// JSON text.
    pub fn content_words(&self) -> usize {
        match &self.content {
            serde_json::Value::Null => 0,
            serde_json::Value::String(s) => s.split_whitespace().count(),
            other => other.to_string().split_whitespace().count(),
        }
    }
}
