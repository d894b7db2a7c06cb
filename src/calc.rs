use crate::grades::{resolve_grade, GradeBand, GradeMatch};
use crate::store;
use crate::weights::{classify_exam, convert_weighted_scores, ExamOutcome, WeightConfig};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Half-up rounding to one decimal place, `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// `1st`, `2nd`, `3rd`, `4th`, `11th`, `12th`, `13th`, `21st`, ...
pub fn ordinal_rank(n: i64) -> String {
    let suffix = match (n % 100, n % 10) {
        (11..=13, _) => "th",
        (_, 1) => "st",
        (_, 2) => "nd",
        (_, 3) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn db(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new("config_missing", message)
    }
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CalcError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectQuery {
    pub student_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub academic_year_id: String,
    pub academic_term_id: String,
    pub school_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub class_score: f64,
    pub exam_score: f64,
    pub total_score: f64,
    pub grade: GradeMatch,
    pub exam_count: usize,
    pub unscored_count: usize,
}

/// Outcome for one (student, subject). `NotExamined` means the school set no
/// exams for the subject this term; callers omit it instead of recording zero.
#[derive(Debug, Clone, PartialEq)]
pub enum SubjectResult {
    NotExamined,
    Scored(SubjectScore),
}

impl SubjectResult {
    pub fn total_score(&self) -> f64 {
        match self {
            SubjectResult::NotExamined => 0.0,
            SubjectResult::Scored(s) => s.total_score,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SubjectResult::NotExamined => serde_json::json!({
                "examined": false,
                "classScore": 0.0,
                "examScore": 0.0,
                "totalScore": 0.0,
                "grade": crate::grades::NO_GRADE_LABEL,
                "interpretation": serde_json::Value::Null,
                "gradeId": serde_json::Value::Null,
            }),
            SubjectResult::Scored(s) => serde_json::json!({
                "examined": true,
                "classScore": s.class_score,
                "examScore": s.exam_score,
                "totalScore": s.total_score,
                "grade": s.grade.grade,
                "interpretation": s.grade.interpretation,
                "gradeId": s.grade.grade_id,
                "examCount": s.exam_count,
                "unscoredCount": s.unscored_count,
            }),
        }
    }
}

/// School-wide inputs shared by every (student, subject) in a run.
#[derive(Debug, Clone)]
pub struct GradingInputs {
    pub weights: WeightConfig,
    pub bands: Vec<GradeBand>,
    pub final_type_id: Option<String>,
}

impl GradingInputs {
    pub fn load(conn: &Connection, school_id: &str) -> Result<Self, CalcError> {
        let Some(weights) = store::load_weight_config(conn, school_id)? else {
            return Err(CalcError::config_missing(
                "no exam weight configuration found for this school",
            )
            .with_details(serde_json::json!({ "schoolId": school_id })));
        };
        Ok(Self {
            weights,
            bands: store::load_grade_bands(conn, school_id)?,
            final_type_id: store::load_final_exam_type_id(conn, school_id)?,
        })
    }
}

/// Pure scoring step over already-fetched exams and the student's raw scores.
pub fn score_subject(
    exams: &[store::ExamRecord],
    raw_by_exam: &HashMap<String, f64>,
    inputs: &GradingInputs,
) -> SubjectResult {
    if exams.is_empty() {
        return SubjectResult::NotExamined;
    }

    let mut unscored_count = 0;
    let outcomes: Vec<ExamOutcome> = exams
        .iter()
        .map(|e| {
            let raw = match raw_by_exam.get(&e.id) {
                Some(v) => *v,
                None => {
                    unscored_count += 1;
                    0.0
                }
            };
            ExamOutcome {
                category: classify_exam(
                    &e.name,
                    e.exam_type_id.as_deref(),
                    inputs.final_type_id.as_deref(),
                ),
                raw,
                possible: e.total_marks,
            }
        })
        .collect();

    let weighted = convert_weighted_scores(&outcomes, &inputs.weights);
    let total_score = round_off_2_decimals(weighted.class_score + weighted.exam_score);
    let grade = resolve_grade(round_off_1_decimal(total_score), &inputs.bands);

    SubjectResult::Scored(SubjectScore {
        class_score: weighted.class_score,
        exam_score: weighted.exam_score,
        total_score,
        grade,
        exam_count: exams.len(),
        unscored_count,
    })
}

pub fn calculate_subject_with(
    conn: &Connection,
    query: &SubjectQuery,
    inputs: &GradingInputs,
) -> Result<SubjectResult, CalcError> {
    let exams = store::load_subject_exams(conn, query)?;
    if exams.is_empty() {
        tracing::debug!(
            student_id = %query.student_id,
            subject_id = %query.subject_id,
            "no exams scheduled for subject"
        );
        return Ok(SubjectResult::NotExamined);
    }
    let exam_ids: Vec<String> = exams.iter().map(|e| e.id.clone()).collect();
    let raw_by_exam = store::load_student_raw_scores(conn, &exam_ids, &query.student_id)?;
    let result = score_subject(&exams, &raw_by_exam, inputs);
    if let SubjectResult::Scored(s) = &result {
        tracing::debug!(
            student_id = %query.student_id,
            subject_id = %query.subject_id,
            class_score = s.class_score,
            exam_score = s.exam_score,
            total_score = s.total_score,
            grade = %s.grade.grade,
            unscored = s.unscored_count,
            "subject scored"
        );
    }
    Ok(result)
}

/// Weighted class/exam score and grade for one student in one subject.
pub fn calculate_exam_scores(
    conn: &Connection,
    query: &SubjectQuery,
) -> Result<SubjectResult, CalcError> {
    let inputs = GradingInputs::load(conn, &query.school_id)?;
    calculate_subject_with(conn, query, &inputs)
}
