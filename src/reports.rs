use crate::calc::{
    calculate_subject_with, round_off_2_decimals, CalcError, GradingInputs, SubjectQuery,
    SubjectResult,
};
use crate::grades::validate_grade_bands;
use crate::ranking::{rank_term_reports, RankingScope, RankingSummary};
use crate::store::{self, StudentRow, SubjectRow};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportScope {
    pub school_id: String,
    pub class_id: String,
    pub academic_year_id: String,
    pub academic_term_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateOptions {
    pub student_ids: Option<Vec<String>>,
    pub rank: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReportSummary {
    pub student_id: String,
    pub student_name: String,
    pub term_report_id: String,
    pub total_score: f64,
    pub average_score: f64,
    pub subjects_processed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedStudent {
    pub student_id: String,
    pub student_name: String,
    pub code: String,
    pub reason: String,
}

/// Result of a class-level run. Entry points never fail outright; problems
/// are reported through `success`/`message` and the `skipped` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRun {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub reports: Vec<StudentReportSummary>,
    pub skipped: Vec<SkippedStudent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking: Option<RankingSummary>,
}

impl ReportRun {
    fn failed(e: CalcError) -> Self {
        tracing::warn!(error = %e, "term report run aborted");
        Self {
            success: false,
            message: e.message,
            code: Some(e.code),
            reports: Vec::new(),
            skipped: Vec::new(),
            ranking: None,
        }
    }
}

struct ClassInputs {
    students: Vec<StudentRow>,
    subjects: Vec<SubjectRow>,
    grading: GradingInputs,
}

fn load_class_inputs(
    conn: &Connection,
    scope: &ReportScope,
    students: Vec<StudentRow>,
) -> Result<ClassInputs, CalcError> {
    let subjects = store::load_subjects(conn, &scope.school_id)?;
    if subjects.is_empty() {
        return Err(CalcError::config_missing("no subjects found for this school")
            .with_details(serde_json::json!({ "schoolId": scope.school_id })));
    }
    let grading = GradingInputs::load(conn, &scope.school_id)?;
    if grading.bands.is_empty() {
        return Err(CalcError::config_missing("no grade bands defined for this school")
            .with_details(serde_json::json!({ "schoolId": scope.school_id })));
    }
    for issue in validate_grade_bands(&grading.bands) {
        tracing::warn!(school_id = %scope.school_id, ?issue, "grade band configuration issue");
    }

    Ok(ClassInputs {
        students,
        subjects,
        grading,
    })
}

/// Aggregates one student inside its own transaction.
fn aggregate_student(
    conn: &Connection,
    scope: &ReportScope,
    student: &StudentRow,
    inputs: &ClassInputs,
) -> Result<StudentReportSummary, CalcError> {
    let tx = conn.unchecked_transaction().map_err(CalcError::db)?;

    let term_report_id = store::ensure_term_report(
        &tx,
        &student.id,
        &scope.academic_year_id,
        &scope.academic_term_id,
    )?;

    let mut sum = 0.0_f64;
    let mut scored = 0_usize;
    for subject in &inputs.subjects {
        let query = SubjectQuery {
            student_id: student.id.clone(),
            subject_id: subject.id.clone(),
            class_id: scope.class_id.clone(),
            academic_year_id: scope.academic_year_id.clone(),
            academic_term_id: scope.academic_term_id.clone(),
            school_id: scope.school_id.clone(),
        };
        match calculate_subject_with(&tx, &query, &inputs.grading)? {
            SubjectResult::NotExamined => {
                store::delete_term_report_detail(&tx, &term_report_id, &subject.id)?;
            }
            SubjectResult::Scored(s) => {
                store::upsert_term_report_detail(
                    &tx,
                    &term_report_id,
                    &subject.id,
                    s.class_score,
                    s.exam_score,
                    s.total_score,
                    s.grade.grade_id.as_deref(),
                )?;
                sum += s.total_score;
                scored += 1;
            }
        }
    }

    let total_marks = round_off_2_decimals(sum);
    let average_score = if scored > 0 {
        round_off_2_decimals(sum / scored as f64)
    } else {
        0.0
    };
    store::update_term_report_totals(&tx, &term_report_id, total_marks, average_score)?;
    tx.commit().map_err(CalcError::db)?;

    tracing::debug!(
        student_id = %student.id,
        total_marks,
        average_score,
        subjects = scored,
        "term report aggregated"
    );

    Ok(StudentReportSummary {
        student_id: student.id.clone(),
        student_name: student.display_name(),
        term_report_id,
        total_score: total_marks,
        average_score,
        subjects_processed: scored,
    })
}

fn run_aggregation(
    conn: &Connection,
    scope: &ReportScope,
    school_type: &str,
    options: &UpdateOptions,
) -> Result<ReportRun, CalcError> {
    let students = store::load_active_students(conn, &scope.class_id)?;
    if students.is_empty() {
        return Ok(ReportRun {
            success: true,
            message: "No active students found in this class; nothing to report".to_string(),
            code: None,
            reports: Vec::new(),
            skipped: Vec::new(),
            ranking: None,
        });
    }
    let mut inputs = load_class_inputs(conn, scope, students)?;
    if let Some(ids) = &options.student_ids {
        let wanted: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        inputs.students.retain(|s| wanted.contains(s.id.as_str()));
    }

    let mut reports = Vec::new();
    let mut skipped = Vec::new();
    for student in &inputs.students {
        match aggregate_student(conn, scope, student, &inputs) {
            Ok(summary) => reports.push(summary),
            Err(e) => {
                tracing::warn!(
                    student_id = %student.id,
                    error = %e,
                    "skipping student; term report left unchanged"
                );
                skipped.push(SkippedStudent {
                    student_id: student.id.clone(),
                    student_name: student.display_name(),
                    code: e.code,
                    reason: e.message,
                });
            }
        }
    }

    let mut ranking_error = None;
    let ranking = if options.rank.unwrap_or(true) {
        let ranked = rank_term_reports(
            conn,
            &RankingScope {
                class_id: scope.class_id.clone(),
                academic_year_id: scope.academic_year_id.clone(),
                academic_term_id: scope.academic_term_id.clone(),
                school_type: school_type.to_string(),
            },
        );
        match ranked {
            Ok(summary) => Some(summary),
            Err(e) => {
                // Student writes are already committed; report them with the failure.
                tracing::warn!(class_id = %scope.class_id, error = %e, "ranking failed");
                ranking_error = Some(e);
                None
            }
        }
    } else {
        None
    };

    let subject_count = inputs.subjects.len();
    let message = if skipped.is_empty() {
        format!(
            "Generated term reports for {} students across {} subjects",
            reports.len(),
            subject_count
        )
    } else {
        format!(
            "Generated term reports for {} students across {} subjects; {} skipped",
            reports.len(),
            subject_count,
            skipped.len()
        )
    };
    tracing::info!(
        class_id = %scope.class_id,
        processed = reports.len(),
        skipped = skipped.len(),
        "term report run finished"
    );

    if let Some(e) = ranking_error {
        return Ok(ReportRun {
            success: false,
            message: format!("{}; ranking failed: {}", message, e.message),
            code: Some(e.code),
            reports,
            skipped,
            ranking: None,
        });
    }

    Ok(ReportRun {
        success: !reports.is_empty() || skipped.is_empty(),
        message,
        code: None,
        reports,
        skipped,
        ranking,
    })
}

/// Builds or refreshes every active student's term report for the class and
/// recomputes rankings. The school type is read from the school record.
pub fn generate_term_reports(conn: &Connection, scope: &ReportScope) -> ReportRun {
    let school_type = match store::load_school_type(conn, &scope.school_id) {
        Ok(t) => t.unwrap_or_default(),
        Err(e) => return ReportRun::failed(e),
    };
    run_aggregation(conn, scope, &school_type, &UpdateOptions::default())
        .unwrap_or_else(ReportRun::failed)
}

pub fn update_term_reports(
    conn: &Connection,
    scope: &ReportScope,
    school_type: &str,
    options: &UpdateOptions,
) -> ReportRun {
    run_aggregation(conn, scope, school_type, options).unwrap_or_else(ReportRun::failed)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetailView {
    pub subject_id: String,
    pub subject_name: String,
    pub class_score: f64,
    pub exam_score: f64,
    pub total_score: f64,
    pub grade_id: Option<String>,
    pub grade: Option<String>,
    pub interpretation: Option<String>,
    pub position: Option<i64>,
    pub class_position: i64,
    pub batch_position: Option<i64>,
    pub course_position: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermReportView {
    pub term_report_id: String,
    pub student_id: String,
    pub student_name: String,
    pub total_marks: f64,
    pub average_score: f64,
    pub rank: String,
    pub remarks: Option<String>,
    pub details: Vec<ReportDetailView>,
}

/// Persisted term reports of the class's active students, ordered by name.
pub fn list_term_reports(
    conn: &Connection,
    class_id: &str,
    academic_year_id: &str,
    academic_term_id: &str,
) -> Result<Vec<TermReportView>, CalcError> {
    let mut report_stmt = conn
        .prepare(
            "SELECT tr.id, s.id, s.first_name, s.last_name, tr.total_marks, tr.average_score,
                    tr.rank, tr.remarks
             FROM term_reports tr
             JOIN students s ON s.id = tr.student_id
             JOIN class_enrollments ce ON ce.student_id = s.id
             WHERE ce.class_id = ? AND ce.status = 'active'
               AND tr.academic_year_id = ? AND tr.academic_term_id = ?
             ORDER BY s.last_name, s.first_name, s.id",
        )
        .map_err(CalcError::db)?;
    let mut reports: Vec<TermReportView> = report_stmt
        .query_map((class_id, academic_year_id, academic_term_id), |r| {
            let first: String = r.get(2)?;
            let last: String = r.get(3)?;
            Ok(TermReportView {
                term_report_id: r.get(0)?,
                student_id: r.get(1)?,
                student_name: format!("{} {}", first, last),
                total_marks: r.get(4)?,
                average_score: r.get(5)?,
                rank: r.get(6)?,
                remarks: r.get(7)?,
                details: Vec::new(),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(CalcError::db)?;

    let mut detail_stmt = conn
        .prepare(
            "SELECT d.subject_id, sub.name, d.class_score, d.exam_score, d.total_score,
                    d.grade_id, g.grade_name, g.interpretation, d.position, d.class_position,
                    d.batch_position, d.course_position
             FROM term_report_details d
             JOIN subjects sub ON sub.id = d.subject_id
             LEFT JOIN grade_system g ON g.id = d.grade_id
             WHERE d.term_report_id = ?
             ORDER BY sub.name, d.subject_id",
        )
        .map_err(CalcError::db)?;
    for report in &mut reports {
        report.details = detail_stmt
            .query_map([&report.term_report_id], |r| {
                Ok(ReportDetailView {
                    subject_id: r.get(0)?,
                    subject_name: r.get(1)?,
                    class_score: r.get(2)?,
                    exam_score: r.get(3)?,
                    total_score: r.get(4)?,
                    grade_id: r.get(5)?,
                    grade: r.get(6)?,
                    interpretation: r.get(7)?,
                    position: r.get(8)?,
                    class_position: r.get(9)?,
                    batch_position: r.get(10)?,
                    course_position: r.get(11)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CalcError::db)?;
    }

    Ok(reports)
}
