#![allow(dead_code)]

use rusqlite::{Connection, ToSql};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const SCHOOL: &str = "sch-1";
pub const YEAR: &str = "2025-2026";
pub const TERM: &str = "term-1";
pub const CLASS: &str = "jhs-1a";
pub const MATH: &str = "sub-math";
pub const ENGLISH: &str = "sub-eng";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with_env(&[])
}

pub fn spawn_sidecar_with_env(vars: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_termreportd");
    let mut cmd = Command::new(exe);
    cmd.env_remove("TERMREPORTD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    for (k, v) in vars {
        cmd.env(k, v);
    }
    let mut child = cmd.spawn().expect("spawn termreportd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

pub fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{}", value);
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Opens a fresh workspace holding one BASIC school with 30/70 weights,
/// a contiguous A-F grade table, Mathematics and English, and one class.
pub fn seeded_workspace(prefix: &str) -> (PathBuf, Connection) {
    let workspace = temp_dir(prefix);
    let conn = termreportd::db::open_db(&workspace).expect("open db");
    seed_school(&conn, SCHOOL, "BASIC");
    conn.execute(
        "INSERT INTO subjects(id, school_id, name) VALUES(?, ?, 'Mathematics'), (?, ?, 'English')",
        (MATH, SCHOOL, ENGLISH, SCHOOL),
    )
    .expect("subjects");
    add_class(&conn, CLASS, SCHOOL, None);
    (workspace, conn)
}

pub fn seed_school(conn: &Connection, school_id: &str, school_type: &str) {
    conn.execute(
        "INSERT INTO schools(id, name, school_type) VALUES(?, 'Test School', ?)",
        (school_id, school_type),
    )
    .expect("school");
    conn.execute(
        "INSERT INTO exam_configurations(school_id, class_score_weight, exam_score_weight, pass_mark)
         VALUES(?, 30, 70, 50)",
        [school_id],
    )
    .expect("weights");
    let bands: [(&str, f64, f64, &str); 6] = [
        ("A", 80.0, 100.0, "Excellent"),
        ("B", 70.0, 79.99, "Very Good"),
        ("C", 60.0, 69.99, "Good"),
        ("D", 50.0, 59.99, "Credit"),
        ("E", 40.0, 49.99, "Pass"),
        ("F", 0.0, 39.99, "Fail"),
    ];
    for (name, min, max, interp) in bands {
        conn.execute(
            "INSERT INTO grade_system(id, school_id, grade_name, min_score, max_score, interpretation)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                format!("{}-grade-{}", school_id, name),
                school_id,
                name,
                min,
                max,
                interp,
            ),
        )
        .expect("grade band");
    }
}

pub fn add_class(conn: &Connection, class_id: &str, school_id: &str, course_id: Option<&str>) {
    if let Some(course) = course_id {
        conn.execute(
            "INSERT OR IGNORE INTO courses(id, school_id, name) VALUES(?, ?, ?)",
            (course, school_id, course),
        )
        .expect("course");
    }
    conn.execute(
        "INSERT INTO classes(id, school_id, name, course_id) VALUES(?, ?, ?, ?)",
        (class_id, school_id, class_id, course_id),
    )
    .expect("class");
}

pub fn add_student(conn: &Connection, student_id: &str, first: &str, last: &str, class_id: &str) {
    conn.execute(
        "INSERT INTO students(id, first_name, last_name) VALUES(?, ?, ?)",
        (student_id, first, last),
    )
    .expect("student");
    conn.execute(
        "INSERT INTO class_enrollments(class_id, student_id, status) VALUES(?, ?, 'active')",
        (class_id, student_id),
    )
    .expect("enrollment");
}

pub fn add_to_batch(conn: &Connection, batch_id: &str, student_id: &str) {
    conn.execute(
        "INSERT INTO batch_enrollments(batch_id, student_id, status) VALUES(?, ?, 'active')",
        (batch_id, student_id),
    )
    .expect("batch enrollment");
}

pub fn add_exam(
    conn: &Connection,
    exam_id: &str,
    class_id: &str,
    subject_id: &str,
    name: &str,
    total_marks: f64,
) {
    conn.execute(
        "INSERT INTO exams(id, school_id, class_id, subject_id, name, academic_year_id,
                           academic_term_id, total_marks)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (exam_id, SCHOOL, class_id, subject_id, name, YEAR, TERM, total_marks),
    )
    .expect("exam");
}

pub fn set_score(conn: &Connection, exam_id: &str, student_id: &str, raw: &dyn ToSql) {
    conn.execute(
        "INSERT INTO exam_scores(id, exam_id, student_id, raw_score) VALUES(?, ?, ?, ?)",
        (
            format!("{}-{}", exam_id, student_id),
            exam_id,
            student_id,
            raw,
        ),
    )
    .expect("exam score");
}

/// A 10-mark quiz and a 100-mark final in `subject_id` where each student
/// scores the same percentage on both, so their subject total equals it.
pub fn add_percentage_exams(
    conn: &Connection,
    class_id: &str,
    subject_id: &str,
    percentages: &[(&str, f64)],
) {
    let quiz = format!("{}-{}-quiz", class_id, subject_id);
    let fin = format!("{}-{}-final", class_id, subject_id);
    add_exam(conn, &quiz, class_id, subject_id, "Class Test 1", 10.0);
    add_exam(conn, &fin, class_id, subject_id, "End of Term Examination", 100.0);
    for (student_id, pct) in percentages {
        set_score(conn, &quiz, student_id, &(pct / 10.0));
        set_score(conn, &fin, student_id, pct);
    }
}

pub fn report_scope(class_id: &str) -> termreportd::reports::ReportScope {
    termreportd::reports::ReportScope {
        school_id: SCHOOL.to_string(),
        class_id: class_id.to_string(),
        academic_year_id: YEAR.to_string(),
        academic_term_id: TERM.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub id: String,
    pub total_marks: f64,
    pub average_score: f64,
    pub rank: String,
    pub remarks: Option<String>,
}

pub fn stored_report(conn: &Connection, student_id: &str) -> Option<StoredReport> {
    conn.query_row(
        "SELECT id, total_marks, average_score, rank, remarks
         FROM term_reports
         WHERE student_id = ? AND academic_year_id = ? AND academic_term_id = ?",
        (student_id, YEAR, TERM),
        |r| {
            Ok(StoredReport {
                id: r.get(0)?,
                total_marks: r.get(1)?,
                average_score: r.get(2)?,
                rank: r.get(3)?,
                remarks: r.get(4)?,
            })
        },
    )
    .ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDetail {
    pub id: String,
    pub subject_id: String,
    pub class_score: f64,
    pub exam_score: f64,
    pub total_score: f64,
    pub grade_id: Option<String>,
    pub class_position: i64,
    pub batch_position: Option<i64>,
    pub course_position: Option<i64>,
}

pub fn stored_details(conn: &Connection, student_id: &str) -> Vec<StoredDetail> {
    let mut stmt = conn
        .prepare(
            "SELECT d.id, d.subject_id, d.class_score, d.exam_score, d.total_score, d.grade_id,
                    d.class_position, d.batch_position, d.course_position
             FROM term_report_details d
             JOIN term_reports tr ON tr.id = d.term_report_id
             WHERE tr.student_id = ? AND tr.academic_year_id = ? AND tr.academic_term_id = ?
             ORDER BY d.subject_id",
        )
        .expect("prepare details");
    stmt.query_map((student_id, YEAR, TERM), |r| {
        Ok(StoredDetail {
            id: r.get(0)?,
            subject_id: r.get(1)?,
            class_score: r.get(2)?,
            exam_score: r.get(3)?,
            total_score: r.get(4)?,
            grade_id: r.get(5)?,
            class_position: r.get(6)?,
            batch_position: r.get(7)?,
            course_position: r.get(8)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .expect("query details")
}

pub fn workspace_str(p: &Path) -> String {
    p.to_string_lossy().to_string()
}
