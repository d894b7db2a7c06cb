use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "termreport.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            school_type TEXT NOT NULL DEFAULT 'BASIC'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_configurations(
            school_id TEXT PRIMARY KEY,
            class_score_weight REAL NOT NULL DEFAULT 30,
            exam_score_weight REAL NOT NULL DEFAULT 70,
            pass_mark REAL NOT NULL DEFAULT 50,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_system(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            grade_name TEXT NOT NULL,
            min_score REAL NOT NULL,
            max_score REAL NOT NULL,
            interpretation TEXT,
            grade_point REAL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_system_school ON grade_system(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_school ON subjects(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            course_id TEXT,
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_course ON classes(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_enrollments(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_enrollments_student ON class_enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batch_enrollments(
            batch_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            PRIMARY KEY(batch_id, student_id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batch_enrollments_student ON batch_enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_types(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            is_system INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            exam_type_id TEXT,
            name TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            academic_term_id TEXT NOT NULL,
            total_marks REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled',
            FOREIGN KEY(school_id) REFERENCES schools(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(exam_type_id) REFERENCES exam_types(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_scope
         ON exams(subject_id, class_id, academic_year_id, academic_term_id)",
        [],
    )?;

    // raw_score has no declared affinity: imported rows may carry text values,
    // which the store normalizes on read.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_scores(
            id TEXT PRIMARY KEY,
            exam_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            raw_score,
            scaled_score REAL,
            grade_id TEXT,
            remarks TEXT,
            graded_by TEXT,
            graded_at TEXT,
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(exam_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_scores_student ON exam_scores(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS term_reports(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            academic_year_id TEXT NOT NULL,
            academic_term_id TEXT NOT NULL,
            total_marks REAL NOT NULL DEFAULT 0,
            average_score REAL NOT NULL DEFAULT 0,
            rank TEXT NOT NULL DEFAULT 'N/A',
            remarks TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, academic_year_id, academic_term_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS term_report_details(
            id TEXT PRIMARY KEY,
            term_report_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_score REAL NOT NULL DEFAULT 0,
            exam_score REAL NOT NULL DEFAULT 0,
            total_score REAL NOT NULL DEFAULT 0,
            grade_id TEXT,
            position INTEGER,
            class_position INTEGER NOT NULL DEFAULT 0,
            batch_position INTEGER,
            course_position INTEGER,
            FOREIGN KEY(term_report_id) REFERENCES term_reports(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(term_report_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_term_report_details_subject ON term_report_details(subject_id)",
        [],
    )?;

    Ok(conn)
}
