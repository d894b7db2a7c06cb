use crate::calc::round_off_1_decimal;
use serde::Serialize;

const FINAL_EXAM_MARKERS: [&str; 3] = ["end of term", "final", "terminal"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightConfig {
    pub class_score_weight: f64,
    pub exam_score_weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentCategory {
    ContinuousAssessment,
    FinalExam,
}

pub fn is_final_exam_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    FINAL_EXAM_MARKERS.iter().any(|m| lower.contains(m))
}

/// Classifies an exam. When the school defines a system end-of-term exam type,
/// membership in that type decides; otherwise the exam's own name is matched.
pub fn classify_exam(
    exam_name: &str,
    exam_type_id: Option<&str>,
    final_type_id: Option<&str>,
) -> AssessmentCategory {
    let is_final = match final_type_id {
        Some(final_id) => exam_type_id == Some(final_id),
        None => is_final_exam_name(exam_name),
    };
    if is_final {
        AssessmentCategory::FinalExam
    } else {
        AssessmentCategory::ContinuousAssessment
    }
}

/// One exam's contribution for one student. Unscored exams carry `raw = 0`
/// and still count their `possible` marks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExamOutcome {
    pub category: AssessmentCategory,
    pub raw: f64,
    pub possible: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedScores {
    pub class_score: f64,
    pub exam_score: f64,
}

fn convert_category(outcomes: &[ExamOutcome], category: AssessmentCategory, weight: f64) -> f64 {
    let weight = weight.max(0.0);
    let (total_raw, total_possible) = outcomes
        .iter()
        .filter(|o| o.category == category)
        .fold((0.0_f64, 0.0_f64), |(raw, possible), o| {
            (raw + o.raw.max(0.0), possible + o.possible.max(0.0))
        });
    if total_possible <= 0.0 {
        return 0.0;
    }
    let converted = (total_raw / total_possible) * weight;
    round_off_1_decimal(converted.clamp(0.0, weight))
}

/// Scales each category's raw fraction into its weight slot.
/// Both components are clamped to `[0, weight]`.
pub fn convert_weighted_scores(outcomes: &[ExamOutcome], weights: &WeightConfig) -> WeightedScores {
    WeightedScores {
        class_score: convert_category(
            outcomes,
            AssessmentCategory::ContinuousAssessment,
            weights.class_score_weight,
        ),
        exam_score: convert_category(
            outcomes,
            AssessmentCategory::FinalExam,
            weights.exam_score_weight,
        ),
    }
}
