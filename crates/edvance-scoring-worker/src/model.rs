//! Tiered rubric model.
//!
//! Each structural feature earns the points of the highest tier its count
//! reaches. Engagement keywords in the activities and the content density
//! (words per lesson minute) add small bonuses on top of the base score.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use edvance_scoring::fallback::bound_score;
use edvance_scoring::{LessonPlan, ScoreResult};

pub const BUILTIN_MODEL_VERSION: &str = "rubric-v1";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid model file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid model: {0}")]
    Invalid(String),
}

/// Points awarded once a count reaches `min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub min: usize,
    pub points: f64,
}

impl Tier {
    pub const fn new(min: usize, points: f64) -> Self {
        Self { min, points }
    }
}

/// Bonus for content density in words per minute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityRule {
    pub min_words_per_minute: f64,
    pub max_words_per_minute: f64,
    pub in_range: f64,
    pub out_of_range: f64,
}

impl Default for DensityRule {
    fn default() -> Self {
        Self {
            min_words_per_minute: 10.0,
            max_words_per_minute: 30.0,
            in_range: 0.5,
            out_of_range: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RubricModel {
    pub version: String,
    pub base: f64,
    pub objectives: Vec<Tier>,
    pub materials: Vec<Tier>,
    pub activities: Vec<Tier>,
    pub assessments: Vec<Tier>,
    /// Points for having any differentiation notes.
    pub differentiation: f64,
    pub engagement_keywords: Vec<String>,
    pub engagement_bonus: f64,
    pub density: DensityRule,
}

impl Default for RubricModel {
    fn default() -> Self {
        Self {
            version: BUILTIN_MODEL_VERSION.to_string(),
            base: 5.0,
            objectives: vec![Tier::new(4, 1.5), Tier::new(3, 1.2), Tier::new(2, 0.8)],
            materials: vec![Tier::new(3, 1.0), Tier::new(2, 0.6)],
            activities: vec![Tier::new(4, 1.5), Tier::new(3, 1.2), Tier::new(2, 0.7)],
            assessments: vec![Tier::new(3, 1.5), Tier::new(2, 1.0)],
            differentiation: 1.0,
            engagement_keywords: [
                "Group Discussion",
                "Hands-on Experiment",
                "Role Play",
                "Project Work",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            engagement_bonus: 0.5,
            density: DensityRule::default(),
        }
    }
}

/// Signals the rubric looks at. Lists only count non-blank entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanFeatures {
    pub objectives: usize,
    pub materials: usize,
    pub activities: usize,
    pub assessments: usize,
    pub has_differentiation: bool,
    pub duration: u32,
    pub content_words: usize,
}

fn non_blank(items: &[String]) -> usize {
    items.iter().filter(|s| !s.trim().is_empty()).count()
}

impl PlanFeatures {
    pub fn extract(plan: &LessonPlan) -> Self {
        Self {
            objectives: non_blank(&plan.objectives),
            materials: non_blank(&plan.materials),
            activities: non_blank(&plan.activities),
            assessments: non_blank(&plan.assessments),
            has_differentiation: non_blank(&plan.differentiation) > 0,
            duration: plan.duration,
            content_words: plan.content_words(),
        }
    }

    pub fn words_per_minute(&self) -> f64 {
        self.content_words as f64 / f64::from(self.duration.max(1))
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("num_objectives".to_string(), self.objectives as f64),
            ("num_materials".to_string(), self.materials as f64),
            ("num_activities".to_string(), self.activities as f64),
            ("num_assessments".to_string(), self.assessments as f64),
            (
                "has_differentiation".to_string(),
                if self.has_differentiation { 1.0 } else { 0.0 },
            ),
            ("duration".to_string(), f64::from(self.duration)),
            ("content_words".to_string(), self.content_words as f64),
        ])
    }
}

fn tier_points(tiers: &[Tier], count: usize) -> f64 {
    tiers
        .iter()
        .filter(|t| count >= t.min)
        .max_by_key(|t| t.min)
        .map_or(0.0, |t| t.points)
}

impl RubricModel {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub async fn load(path: &Path) -> Result<Self, ModelError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ModelError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let model = Self::from_json(&json).map_err(|source| ModelError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let tier_points = [
            &self.objectives,
            &self.materials,
            &self.activities,
            &self.assessments,
        ]
        .into_iter()
        .flatten()
        .map(|t| t.points);
        let weights = [
            self.base,
            self.differentiation,
            self.engagement_bonus,
            self.density.in_range,
            self.density.out_of_range,
            self.density.min_words_per_minute,
            self.density.max_words_per_minute,
        ];
        if !weights.into_iter().chain(tier_points).all(f64::is_finite) {
            return Err(ModelError::Invalid("weights must be finite numbers".to_string()));
        }
        if self.density.min_words_per_minute > self.density.max_words_per_minute {
            return Err(ModelError::Invalid(format!(
                "density range is empty: {} > {}",
                self.density.min_words_per_minute, self.density.max_words_per_minute
            )));
        }
        Ok(())
    }

    fn is_engaging(&self, plan: &LessonPlan) -> bool {
        plan.activities.iter().any(|activity| {
            self.engagement_keywords
                .iter()
                .any(|keyword| activity.contains(keyword.as_str()))
        })
    }

    pub fn raw_score(&self, plan: &LessonPlan, features: &PlanFeatures) -> f64 {
        let mut score = self.base;
        score += tier_points(&self.objectives, features.objectives);
        score += tier_points(&self.materials, features.materials);
        score += tier_points(&self.activities, features.activities);
        score += tier_points(&self.assessments, features.assessments);
        if features.has_differentiation {
            score += self.differentiation;
        }
        if self.is_engaging(plan) {
            score += self.engagement_bonus;
        }
        let density = features.words_per_minute();
        if (self.density.min_words_per_minute..=self.density.max_words_per_minute)
            .contains(&density)
        {
            score += self.density.in_range;
        } else {
            score += self.density.out_of_range;
        }
        score
    }

    pub fn score(&self, plan: &LessonPlan) -> ScoreResult {
        let features = PlanFeatures::extract(plan);
        let score = bound_score(self.raw_score(plan, &features));
        ScoreResult {
            score,
            features: features.to_map(),
            reasoning: reasoning(score, &features),
        }
    }
}

fn counted(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

/// Human-readable explanation, one line per signal plus an overall verdict.
pub fn reasoning(score: f64, f: &PlanFeatures) -> Vec<String> {
    let mut reasons = Vec::with_capacity(8);

    let objectives = counted(f.objectives, "objective", "objectives");
    reasons.push(match f.objectives {
        5.. => format!("Excellent learning objectives ({objectives})"),
        3..=4 => format!("Strong learning objectives ({objectives})"),
        2 => format!("Adequate learning objectives ({objectives})"),
        _ => format!("Limited learning objectives ({objectives})"),
    });

    let activities = counted(f.activities, "activity", "activities");
    reasons.push(match f.activities {
        4.. => format!("Diverse activities ({activities})"),
        2..=3 => format!("Multiple activities ({activities})"),
        _ => format!("Limited activities ({activities})"),
    });

    let assessments = counted(f.assessments, "assessment", "assessments");
    reasons.push(match f.assessments {
        3.. => format!("Multiple assessment methods ({assessments})"),
        1..=2 => format!("Assessment included ({assessments})"),
        0 => "No formal assessment".to_string(),
    });

    let materials = counted(f.materials, "material type", "material types");
    reasons.push(match f.materials {
        4.. => format!("Rich materials ({materials})"),
        2..=3 => format!("Adequate materials ({materials})"),
        _ => format!("Limited materials ({materials})"),
    });

    reasons.push(if f.has_differentiation {
        "Includes differentiation strategies".to_string()
    } else {
        "Could add differentiation for diverse learners".to_string()
    });

    let pace = match f.duration {
        90.. => "comprehensive",
        60..=89 => "standard",
        45..=59 => "focused",
        _ => "may be tight",
    };
    reasons.push(format!("Duration: {} minutes ({pace})", f.duration));

    reasons.push(
        match f.content_words {
            1500.. => "Rich content depth",
            800..=1499 => "Adequate content coverage",
            200..=799 => "Moderate content detail",
            _ => "Limited content detail",
        }
        .to_string(),
    );

    let verdict = if score >= 9.0 {
        "Excellent lesson plan"
    } else if score >= 7.0 {
        "Good lesson plan"
    } else if score >= 5.0 {
        "Adequate lesson plan"
    } else {
        "Needs improvement"
    };
    reasons.push(format!("{verdict} (Score: {score:.1}/10)"));

    reasons
}
