//! Heuristic scorer used when the worker path fails.
//!
//! Looks only at structural counts, so it needs no model and does no I/O.

use std::collections::BTreeMap;

use crate::bridge::protocol::ScoreResult;
use crate::lesson::{LessonPlan, StructuralCounts};

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;

const BASE_SCORE: f64 = 5.0;

pub const FALLBACK_REASONING: &str = "Fallback scoring used";

/// Clamp into the valid score range and round to one decimal.
pub fn bound_score(score: f64) -> f64 {
    if score.is_nan() {
        return MIN_SCORE;
    }
    (score.clamp(MIN_SCORE, MAX_SCORE) * 10.0).round() / 10.0
}

/// Score from structural counts alone.
pub fn score_counts(counts: &StructuralCounts) -> f64 {
    let mut score = BASE_SCORE;
    if counts.objectives >= 3 {
        score += 1.5;
    }
    if counts.materials >= 2 {
        score += 1.0;
    }
    if counts.activities >= 2 {
        score += 1.5;
    }
    if counts.assessments >= 2 {
        score += 1.0;
    }
    if counts.has_differentiation() {
        score += 1.0;
    }
    bound_score(score)
}

pub fn fallback_score(plan: &LessonPlan) -> ScoreResult {
    let counts = plan.structure();
    let features = BTreeMap::from([
        ("num_objectives".to_string(), counts.objectives as f64),
        ("num_materials".to_string(), counts.materials as f64),
        ("num_activities".to_string(), counts.activities as f64),
        ("num_assessments".to_string(), counts.assessments as f64),
        (
            "has_differentiation".to_string(),
            if counts.has_differentiation() { 1.0 } else { 0.0 },
        ),
    ]);
    ScoreResult {
        score: score_counts(&counts),
        features,
        reasoning: vec![FALLBACK_REASONING.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(o: usize, m: usize, a: usize, q: usize, d: usize) -> LessonPlan {
        LessonPlan {
            objectives: vec!["objective".into(); o],
            materials: vec!["material".into(); m],
            activities: vec!["activity".into(); a],
            assessments: vec!["assessment".into(); q],
            differentiation: vec!["support".into(); d],
            ..LessonPlan::new("Plan", "Science")
        }
    }

    #[test]
    fn full_plan_clamps_to_max() {
        let result = fallback_score(&plan_with(3, 2, 2, 2, 1));
        assert_eq!(result.score, 10.0);
        assert_eq!(result.reasoning, vec![FALLBACK_REASONING.to_string()]);
    }

    #[test]
    fn empty_plan_scores_base() {
        let result = fallback_score(&plan_with(0, 0, 0, 0, 0));
        assert_eq!(result.score, 5.0);
        assert_eq!(result.features["num_objectives"], 0.0);
        assert_eq!(result.features["has_differentiation"], 0.0);
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(fallback_score(&plan_with(2, 1, 1, 1, 0)).score, 5.0);
        assert_eq!(fallback_score(&plan_with(3, 0, 0, 0, 0)).score, 6.5);
        assert_eq!(fallback_score(&plan_with(0, 0, 2, 0, 0)).score, 6.5);
        assert_eq!(fallback_score(&plan_with(0, 2, 0, 2, 0)).score, 7.0);
    }

    #[test]
    fn deterministic() {
        let plan = plan_with(4, 1, 3, 0, 2);
        assert_eq!(fallback_score(&plan), fallback_score(&plan));
    }

    #[test]
    fn features_mirror_counts() {
        let result = fallback_score(&plan_with(1, 2, 3, 4, 5));
        assert_eq!(result.features.len(), 5);
        assert_eq!(result.features["num_materials"], 2.0);
        assert_eq!(result.features["num_assessments"], 4.0);
        assert_eq!(result.features["has_differentiation"], 1.0);
    }

    #[test]
    fn bound_score_clamps_and_rounds() {
        assert_eq!(bound_score(-3.0), MIN_SCORE);
        assert_eq!(bound_score(42.0), MAX_SCORE);
        assert_eq!(bound_score(7.26), 7.3);
        assert_eq!(bound_score(f64::NAN), MIN_SCORE);
    }
}
