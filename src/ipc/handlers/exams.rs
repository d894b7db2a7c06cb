use super::{db_conn, required_str};
use crate::calc::{self, SubjectQuery};
use crate::ipc::error::{calc_err, ok};
use crate::ipc::types::{AppState, Request};

fn handle_calculate_scores(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let query = match subject_query(req) {
        Ok(q) => q,
        Err(e) => return e,
    };
    match calc::calculate_exam_scores(conn, &query) {
        Ok(result) => ok(&req.id, result.to_json()),
        Err(e) => calc_err(&req.id, e),
    }
}

fn subject_query(req: &Request) -> Result<SubjectQuery, serde_json::Value> {
    Ok(SubjectQuery {
        student_id: required_str(req, "studentId")?,
        subject_id: required_str(req, "subjectId")?,
        class_id: required_str(req, "classId")?,
        academic_year_id: required_str(req, "academicYearId")?,
        academic_term_id: required_str(req, "academicTermId")?,
        school_id: required_str(req, "schoolId")?,
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.calculateScores" => Some(handle_calculate_scores(state, req)),
        _ => None,
    }
}
