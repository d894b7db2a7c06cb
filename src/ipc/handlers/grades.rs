use super::{db_conn, required_str};
use crate::grades::validate_grade_bands;
use crate::ipc::error::{calc_err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;

fn handle_grades_validate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let school_id = match required_str(req, "schoolId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let bands = match store::load_grade_bands(conn, &school_id) {
        Ok(b) => b,
        Err(e) => return calc_err(&req.id, e),
    };
    let issues = validate_grade_bands(&bands);
    ok(
        &req.id,
        json!({
            "valid": !bands.is_empty() && issues.is_empty(),
            "bandCount": bands.len(),
            "issues": issues,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.validate" => Some(handle_grades_validate(state, req)),
        _ => None,
    }
}
