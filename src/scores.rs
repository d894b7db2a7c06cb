use crate::calc::{round_off_1_decimal, round_off_2_decimals, CalcError, GradingInputs};
use crate::grades::resolve_grade;
use crate::reports::{generate_term_reports, ReportScope};
use crate::store;
use crate::weights::{classify_exam, AssessmentCategory};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub exam_id: String,
    pub student_id: String,
    pub raw_score: f64,
    pub graded_by: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedScore {
    pub exam_id: String,
    pub student_id: String,
    pub raw_score: f64,
    pub percentage_score: f64,
    pub scaled_score: f64,
    pub category: AssessmentCategory,
    pub grade: String,
    pub remark: String,
}

/// Upserts one student's raw score for an exam and stores the exam-level
/// scaled score and grade alongside it.
pub fn record_exam_score(conn: &Connection, entry: &ScoreEntry) -> Result<RecordedScore, CalcError> {
    let Some(exam) = store::load_exam(conn, &entry.exam_id)? else {
        return Err(CalcError::new("not_found", "exam not found")
            .with_details(json!({ "examId": entry.exam_id })));
    };
    if !entry.raw_score.is_finite() || entry.raw_score < 0.0 {
        return Err(CalcError::new("bad_params", "raw score must be a non-negative number")
            .with_details(json!({ "studentId": entry.student_id, "rawScore": entry.raw_score })));
    }
    if entry.raw_score > exam.total_marks {
        return Err(CalcError::new("bad_params", "raw score exceeds the exam's total marks")
            .with_details(json!({
                "studentId": entry.student_id,
                "rawScore": entry.raw_score,
                "totalMarks": exam.total_marks,
            })));
    }

    let inputs = GradingInputs::load(conn, &exam.school_id)?;
    let category = classify_exam(
        &exam.name,
        exam.exam_type_id.as_deref(),
        inputs.final_type_id.as_deref(),
    );
    let percentage = if exam.total_marks > 0.0 {
        entry.raw_score / exam.total_marks * 100.0
    } else {
        0.0
    };
    let weight = match category {
        AssessmentCategory::ContinuousAssessment => inputs.weights.class_score_weight,
        AssessmentCategory::FinalExam => inputs.weights.exam_score_weight,
    };
    let scaled = percentage * weight / 100.0;
    let grade = resolve_grade(round_off_1_decimal(percentage), &inputs.bands);

    let graded_at = chrono::Utc::now().to_rfc3339();
    store::upsert_exam_score(
        conn,
        &store::ExamScoreWrite {
            exam_id: &exam.id,
            student_id: &entry.student_id,
            raw_score: entry.raw_score,
            scaled_score: round_off_2_decimals(scaled),
            grade_id: grade.grade_id.as_deref(),
            remarks: entry.remarks.as_deref(),
            graded_by: entry.graded_by.as_deref(),
            graded_at: &graded_at,
        },
    )?;

    Ok(RecordedScore {
        exam_id: exam.id,
        student_id: entry.student_id.clone(),
        raw_score: entry.raw_score,
        percentage_score: round_off_2_decimals(percentage),
        scaled_score: round_off_2_decimals(scaled),
        category,
        grade: grade.grade,
        remark: grade.interpretation,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreInput {
    pub student_id: Option<String>,
    pub raw_score: Option<serde_json::Value>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamScoreBatch {
    pub exam_id: Option<String>,
    #[serde(default)]
    pub scores: Vec<ScoreInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedExam {
    pub exam_id: String,
    pub exam_title: String,
    pub updated_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub total_updated: usize,
    pub total_failed: usize,
    pub exams_processed: usize,
    pub reports_regenerated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkScoreResult {
    pub success: bool,
    pub message: String,
    pub summary: BulkSummary,
    pub processed_exams: Vec<ProcessedExam>,
    pub errors: Vec<String>,
}

/// Raw scores arrive as numbers or numeric strings.
fn raw_score_from_json(v: &serde_json::Value) -> Option<f64> {
    let parsed = match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Records every valid score, then regenerates term reports once for each
/// class whose exams changed.
pub fn update_exam_scores(
    conn: &Connection,
    batches: &[ExamScoreBatch],
    graded_by: Option<&str>,
) -> BulkScoreResult {
    let mut summary = BulkSummary::default();
    let mut processed_exams = Vec::new();
    let mut errors = Vec::new();
    let mut scopes: BTreeSet<(String, String, String, String)> = BTreeSet::new();

    for batch in batches {
        let Some(exam_id) = batch.exam_id.as_deref().filter(|s| !s.trim().is_empty()) else {
            errors.push("invalid exam data: missing examId".to_string());
            continue;
        };
        let exam = match store::load_exam(conn, exam_id) {
            Ok(Some(e)) => e,
            Ok(None) => {
                errors.push(format!("Exam {} not found", exam_id));
                continue;
            }
            Err(e) => {
                errors.push(format!("Failed to process exam {}: {}", exam_id, e.message));
                continue;
            }
        };

        let mut processed = ProcessedExam {
            exam_id: exam.id.clone(),
            exam_title: exam.name.clone(),
            ..ProcessedExam::default()
        };
        for input in &batch.scores {
            let student_id = input.student_id.as_deref().filter(|s| !s.trim().is_empty());
            let raw = input.raw_score.as_ref().and_then(raw_score_from_json);
            let (Some(student_id), Some(raw_score)) = (student_id, raw) else {
                tracing::warn!(exam_id = %exam.id, "invalid score entry");
                processed.failed_count += 1;
                continue;
            };
            let entry = ScoreEntry {
                exam_id: exam.id.clone(),
                student_id: student_id.to_string(),
                raw_score,
                graded_by: graded_by.map(|s| s.to_string()),
                remarks: input.remarks.clone(),
            };
            match record_exam_score(conn, &entry) {
                Ok(_) => processed.updated_count += 1,
                Err(e) => {
                    errors.push(format!(
                        "Failed to update score for student {}: {}",
                        student_id, e.message
                    ));
                    processed.failed_count += 1;
                }
            }
        }

        if processed.updated_count > 0 {
            if let Err(e) = store::mark_exam_completed(conn, &exam.id) {
                errors.push(format!("Failed to mark exam {} completed: {}", exam.id, e.message));
            }
            scopes.insert((
                exam.school_id.clone(),
                exam.class_id.clone(),
                exam.academic_year_id.clone(),
                exam.academic_term_id.clone(),
            ));
        }
        summary.total_updated += processed.updated_count;
        summary.total_failed += processed.failed_count;
        processed_exams.push(processed);
    }

    for (school_id, class_id, academic_year_id, academic_term_id) in scopes {
        let run = generate_term_reports(
            conn,
            &ReportScope {
                school_id,
                class_id: class_id.clone(),
                academic_year_id,
                academic_term_id,
            },
        );
        if run.success {
            summary.reports_regenerated += run.reports.len();
        } else {
            errors.push(format!(
                "Failed to regenerate term reports for class {}: {}",
                class_id, run.message
            ));
        }
    }
    summary.exams_processed = processed_exams.len();

    BulkScoreResult {
        success: summary.total_updated > 0,
        message: format!(
            "Successfully updated {} exam scores. {} failed.",
            summary.total_updated, summary.total_failed
        ),
        summary,
        processed_exams,
        errors,
    }
}
