use crate::calc::{CalcError, SubjectQuery};
use crate::grades::GradeBand;
use crate::weights::{is_final_exam_name, WeightConfig};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ExamRecord {
    pub id: String,
    pub school_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub exam_type_id: Option<String>,
    pub name: String,
    pub academic_year_id: String,
    pub academic_term_id: String,
    pub total_marks: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl StudentRow {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub id: String,
    pub student_id: String,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailRow {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub total_score: f64,
}

/// Normalizes a stored score cell. Text cells are parsed; anything else that
/// is not numeric counts as absent.
pub fn decimal_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Integer(n) => Some(*n as f64),
        Value::Real(f) if f.is_finite() => Some(*f),
        Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

fn text_values(ids: &[String]) -> Vec<Value> {
    ids.iter().map(|id| Value::Text(id.clone())).collect()
}

pub fn load_weight_config(
    conn: &Connection,
    school_id: &str,
) -> Result<Option<WeightConfig>, CalcError> {
    conn.query_row(
        "SELECT class_score_weight, exam_score_weight
         FROM exam_configurations
         WHERE school_id = ?",
        [school_id],
        |r| {
            Ok(WeightConfig {
                class_score_weight: r.get(0)?,
                exam_score_weight: r.get(1)?,
            })
        },
    )
    .optional()
    .map_err(CalcError::db)
}

pub fn load_grade_bands(conn: &Connection, school_id: &str) -> Result<Vec<GradeBand>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, grade_name, min_score, max_score, interpretation, grade_point
             FROM grade_system
             WHERE school_id = ?
             ORDER BY min_score",
        )
        .map_err(CalcError::db)?;
    stmt.query_map([school_id], |r| {
        Ok(GradeBand {
            id: r.get(0)?,
            grade_name: r.get(1)?,
            min_score: r.get(2)?,
            max_score: r.get(3)?,
            interpretation: r.get(4)?,
            grade_point: r.get(5)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(CalcError::db)
}

/// The school's system end-of-term exam type, if it defines one.
pub fn load_final_exam_type_id(
    conn: &Connection,
    school_id: &str,
) -> Result<Option<String>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name FROM exam_types
             WHERE school_id = ? AND is_system <> 0
             ORDER BY id",
        )
        .map_err(CalcError::db)?;
    let types = stmt
        .query_map([school_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(CalcError::db)?;
    Ok(types
        .into_iter()
        .find(|(_, name)| is_final_exam_name(name))
        .map(|(id, _)| id))
}

pub fn load_school_type(conn: &Connection, school_id: &str) -> Result<Option<String>, CalcError> {
    conn.query_row(
        "SELECT school_type FROM schools WHERE id = ?",
        [school_id],
        |r| r.get(0),
    )
    .optional()
    .map_err(CalcError::db)
}

pub fn load_subjects(conn: &Connection, school_id: &str) -> Result<Vec<SubjectRow>, CalcError> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM subjects WHERE school_id = ? ORDER BY name, id")
        .map_err(CalcError::db)?;
    stmt.query_map([school_id], |r| {
        Ok(SubjectRow {
            id: r.get(0)?,
            name: r.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(CalcError::db)
}

pub fn load_active_students(
    conn: &Connection,
    class_id: &str,
) -> Result<Vec<StudentRow>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.first_name, s.last_name
             FROM class_enrollments ce
             JOIN students s ON s.id = ce.student_id
             WHERE ce.class_id = ? AND ce.status = 'active'
             ORDER BY s.last_name, s.first_name, s.id",
        )
        .map_err(CalcError::db)?;
    stmt.query_map([class_id], |r| {
        Ok(StudentRow {
            id: r.get(0)?,
            first_name: r.get(1)?,
            last_name: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(CalcError::db)
}

fn exam_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ExamRecord> {
    Ok(ExamRecord {
        id: r.get(0)?,
        school_id: r.get(1)?,
        class_id: r.get(2)?,
        subject_id: r.get(3)?,
        exam_type_id: r.get(4)?,
        name: r.get(5)?,
        academic_year_id: r.get(6)?,
        academic_term_id: r.get(7)?,
        total_marks: r.get(8)?,
    })
}

pub fn load_exam(conn: &Connection, exam_id: &str) -> Result<Option<ExamRecord>, CalcError> {
    conn.query_row(
        "SELECT id, school_id, class_id, subject_id, exam_type_id, name,
                academic_year_id, academic_term_id, total_marks
         FROM exams
         WHERE id = ?",
        [exam_id],
        exam_from_row,
    )
    .optional()
    .map_err(CalcError::db)
}

pub fn load_subject_exams(
    conn: &Connection,
    query: &SubjectQuery,
) -> Result<Vec<ExamRecord>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, school_id, class_id, subject_id, exam_type_id, name,
                    academic_year_id, academic_term_id, total_marks
             FROM exams
             WHERE subject_id = ? AND class_id = ? AND academic_year_id = ?
               AND academic_term_id = ? AND school_id = ?
             ORDER BY id",
        )
        .map_err(CalcError::db)?;
    let exams = stmt
        .query_map(
            (
                &query.subject_id,
                &query.class_id,
                &query.academic_year_id,
                &query.academic_term_id,
                &query.school_id,
            ),
            exam_from_row,
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(CalcError::db)?;

    for e in &exams {
        if !(e.total_marks > 0.0) {
            return Err(CalcError::new(
                "bad_data",
                format!("exam '{}' has non-positive total marks", e.name),
            )
            .with_details(serde_json::json!({ "examId": e.id, "totalMarks": e.total_marks })));
        }
    }
    Ok(exams)
}

/// Raw scores by exam id for one student. Missing rows are simply absent.
pub fn load_student_raw_scores(
    conn: &Connection,
    exam_ids: &[String],
    student_id: &str,
) -> Result<HashMap<String, f64>, CalcError> {
    let mut out = HashMap::new();
    if exam_ids.is_empty() {
        return Ok(out);
    }
    let sql = format!(
        "SELECT exam_id, raw_score
         FROM exam_scores
         WHERE student_id = ? AND exam_id IN ({})",
        placeholders(exam_ids.len())
    );
    let mut bind_values: Vec<Value> = Vec::with_capacity(exam_ids.len() + 1);
    bind_values.push(Value::Text(student_id.to_string()));
    bind_values.extend(text_values(exam_ids));

    let mut stmt = conn.prepare(&sql).map_err(CalcError::db)?;
    let rows = stmt
        .query_map(params_from_iter(bind_values), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Value>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(CalcError::db)?;
    for (exam_id, raw) in rows {
        match decimal_from_value(&raw) {
            Some(v) => {
                out.insert(exam_id, v);
            }
            None => {
                if raw != Value::Null {
                    tracing::warn!(%exam_id, %student_id, "ignoring non-numeric raw score");
                }
            }
        }
    }
    Ok(out)
}

/// Returns the term report id for the student's period, creating the header
/// when it does not exist yet.
pub fn ensure_term_report(
    conn: &Connection,
    student_id: &str,
    academic_year_id: &str,
    academic_term_id: &str,
) -> Result<String, CalcError> {
    let new_id = Uuid::new_v4().to_string();
    conn.query_row(
        "INSERT INTO term_reports(id, student_id, academic_year_id, academic_term_id,
                                  total_marks, average_score, rank)
         VALUES(?, ?, ?, ?, 0, 0, 'N/A')
         ON CONFLICT(student_id, academic_year_id, academic_term_id) DO UPDATE SET
           student_id = excluded.student_id
         RETURNING id",
        (&new_id, student_id, academic_year_id, academic_term_id),
        |r| r.get(0),
    )
    .map_err(CalcError::db)
}

pub fn update_term_report_totals(
    conn: &Connection,
    term_report_id: &str,
    total_marks: f64,
    average_score: f64,
) -> Result<(), CalcError> {
    conn.execute(
        "UPDATE term_reports SET total_marks = ?, average_score = ? WHERE id = ?",
        (total_marks, average_score, term_report_id),
    )
    .map_err(CalcError::db)?;
    Ok(())
}

pub fn upsert_term_report_detail(
    conn: &Connection,
    term_report_id: &str,
    subject_id: &str,
    class_score: f64,
    exam_score: f64,
    total_score: f64,
    grade_id: Option<&str>,
) -> Result<(), CalcError> {
    let new_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO term_report_details(id, term_report_id, subject_id,
                                         class_score, exam_score, total_score, grade_id)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(term_report_id, subject_id) DO UPDATE SET
           class_score = excluded.class_score,
           exam_score = excluded.exam_score,
           total_score = excluded.total_score,
           grade_id = excluded.grade_id",
        (
            &new_id,
            term_report_id,
            subject_id,
            class_score,
            exam_score,
            total_score,
            grade_id,
        ),
    )
    .map_err(CalcError::db)?;
    Ok(())
}

/// Drops a detail row left over from a run when the subject still had exams.
pub fn delete_term_report_detail(
    conn: &Connection,
    term_report_id: &str,
    subject_id: &str,
) -> Result<usize, CalcError> {
    conn.execute(
        "DELETE FROM term_report_details WHERE term_report_id = ? AND subject_id = ?",
        (term_report_id, subject_id),
    )
    .map_err(CalcError::db)
}

pub fn load_period_reports(
    conn: &Connection,
    student_ids: &[String],
    academic_year_id: &str,
    academic_term_id: &str,
) -> Result<Vec<ReportRow>, CalcError> {
    if student_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, student_id, average_score
         FROM term_reports
         WHERE academic_year_id = ? AND academic_term_id = ? AND student_id IN ({})
         ORDER BY student_id",
        placeholders(student_ids.len())
    );
    let mut bind_values = vec![
        Value::Text(academic_year_id.to_string()),
        Value::Text(academic_term_id.to_string()),
    ];
    bind_values.extend(text_values(student_ids));
    let mut stmt = conn.prepare(&sql).map_err(CalcError::db)?;
    stmt.query_map(params_from_iter(bind_values), |r| {
        Ok(ReportRow {
            id: r.get(0)?,
            student_id: r.get(1)?,
            average_score: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(CalcError::db)
}

pub fn load_period_details(
    conn: &Connection,
    student_ids: &[String],
    academic_year_id: &str,
    academic_term_id: &str,
) -> Result<Vec<DetailRow>, CalcError> {
    if student_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT d.id, tr.student_id, d.subject_id, d.total_score
         FROM term_report_details d
         JOIN term_reports tr ON tr.id = d.term_report_id
         WHERE tr.academic_year_id = ? AND tr.academic_term_id = ? AND tr.student_id IN ({})
         ORDER BY d.subject_id, tr.student_id",
        placeholders(student_ids.len())
    );
    let mut bind_values = vec![
        Value::Text(academic_year_id.to_string()),
        Value::Text(academic_term_id.to_string()),
    ];
    bind_values.extend(text_values(student_ids));
    let mut stmt = conn.prepare(&sql).map_err(CalcError::db)?;
    stmt.query_map(params_from_iter(bind_values), |r| {
        Ok(DetailRow {
            id: r.get(0)?,
            student_id: r.get(1)?,
            subject_id: r.get(2)?,
            total_score: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(CalcError::db)
}

/// Each student's ranking batch: the lowest-id active batch they belong to.
pub fn load_primary_batches(
    conn: &Connection,
    student_ids: &[String],
) -> Result<HashMap<String, String>, CalcError> {
    let mut out = HashMap::new();
    if student_ids.is_empty() {
        return Ok(out);
    }
    let sql = format!(
        "SELECT student_id, MIN(batch_id)
         FROM batch_enrollments
         WHERE status = 'active' AND student_id IN ({})
         GROUP BY student_id",
        placeholders(student_ids.len())
    );
    let mut stmt = conn.prepare(&sql).map_err(CalcError::db)?;
    let rows = stmt
        .query_map(params_from_iter(text_values(student_ids)), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(CalcError::db)?;
    out.extend(rows);
    Ok(out)
}

pub fn load_active_batch_members(
    conn: &Connection,
    batch_ids: &[String],
) -> Result<Vec<String>, CalcError> {
    if batch_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT DISTINCT student_id
         FROM batch_enrollments
         WHERE status = 'active' AND batch_id IN ({})
         ORDER BY student_id",
        placeholders(batch_ids.len())
    );
    let mut stmt = conn.prepare(&sql).map_err(CalcError::db)?;
    stmt.query_map(params_from_iter(text_values(batch_ids)), |r| r.get(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(CalcError::db)
}

pub fn load_class_course_id(conn: &Connection, class_id: &str) -> Result<Option<String>, CalcError> {
    let course: Option<Option<String>> = conn
        .query_row("SELECT course_id FROM classes WHERE id = ?", [class_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(CalcError::db)?;
    Ok(course.flatten())
}

pub fn load_active_course_students(
    conn: &Connection,
    course_id: &str,
) -> Result<Vec<String>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT ce.student_id
             FROM class_enrollments ce
             JOIN classes c ON c.id = ce.class_id
             WHERE c.course_id = ? AND ce.status = 'active'
             ORDER BY ce.student_id",
        )
        .map_err(CalcError::db)?;
    stmt.query_map([course_id], |r| r.get(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(CalcError::db)
}

pub fn write_report_rank(
    conn: &Connection,
    term_report_id: &str,
    rank: &str,
    remarks: &str,
) -> Result<(), CalcError> {
    conn.execute(
        "UPDATE term_reports SET rank = ?, remarks = ? WHERE id = ?",
        (rank, remarks, term_report_id),
    )
    .map_err(CalcError::db)?;
    Ok(())
}

/// `position` mirrors the class position.
pub fn write_class_position(conn: &Connection, detail_id: &str, position: i64) -> Result<(), CalcError> {
    conn.execute(
        "UPDATE term_report_details SET class_position = ?, position = ? WHERE id = ?",
        (position, position, detail_id),
    )
    .map_err(CalcError::db)?;
    Ok(())
}

pub fn write_batch_position(
    conn: &Connection,
    detail_id: &str,
    position: Option<i64>,
) -> Result<(), CalcError> {
    conn.execute(
        "UPDATE term_report_details SET batch_position = ? WHERE id = ?",
        (position, detail_id),
    )
    .map_err(CalcError::db)?;
    Ok(())
}

pub fn write_course_position(
    conn: &Connection,
    detail_id: &str,
    position: Option<i64>,
) -> Result<(), CalcError> {
    conn.execute(
        "UPDATE term_report_details SET course_position = ? WHERE id = ?",
        (position, detail_id),
    )
    .map_err(CalcError::db)?;
    Ok(())
}

pub struct ExamScoreWrite<'a> {
    pub exam_id: &'a str,
    pub student_id: &'a str,
    pub raw_score: f64,
    pub scaled_score: f64,
    pub grade_id: Option<&'a str>,
    pub remarks: Option<&'a str>,
    pub graded_by: Option<&'a str>,
    pub graded_at: &'a str,
}

pub fn upsert_exam_score(conn: &Connection, score: &ExamScoreWrite<'_>) -> Result<(), CalcError> {
    let new_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exam_scores(id, exam_id, student_id, raw_score, scaled_score,
                                 grade_id, remarks, graded_by, graded_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(exam_id, student_id) DO UPDATE SET
           raw_score = excluded.raw_score,
           scaled_score = excluded.scaled_score,
           grade_id = excluded.grade_id,
           remarks = excluded.remarks,
           graded_by = excluded.graded_by,
           graded_at = excluded.graded_at",
        (
            &new_id,
            score.exam_id,
            score.student_id,
            score.raw_score,
            score.scaled_score,
            score.grade_id,
            score.remarks,
            score.graded_by,
            score.graded_at,
        ),
    )
    .map_err(CalcError::db)?;
    Ok(())
}

pub fn mark_exam_completed(conn: &Connection, exam_id: &str) -> Result<(), CalcError> {
    conn.execute(
        "UPDATE exams SET status = 'completed' WHERE id = ?",
        [exam_id],
    )
    .map_err(CalcError::db)?;
    Ok(())
}
