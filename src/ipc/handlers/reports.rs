use super::{db_conn, required_str};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ranking::{rank_term_reports, RankingScope};
use crate::reports::{self, ReportScope, UpdateOptions};
use serde_json::json;

fn report_scope(req: &Request) -> Result<ReportScope, serde_json::Value> {
    Ok(ReportScope {
        school_id: required_str(req, "schoolId")?,
        class_id: required_str(req, "classId")?,
        academic_year_id: required_str(req, "academicYearId")?,
        academic_term_id: required_str(req, "academicTermId")?,
    })
}

fn rank_scope(req: &Request) -> Result<RankingScope, serde_json::Value> {
    Ok(RankingScope {
        class_id: required_str(req, "classId")?,
        academic_year_id: required_str(req, "academicYearId")?,
        academic_term_id: required_str(req, "academicTermId")?,
        school_type: required_str(req, "schoolType")?,
    })
}

fn run_json(req: &Request, run: reports::ReportRun) -> serde_json::Value {
    match serde_json::to_value(&run) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
    }
}

fn handle_reports_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope = match report_scope(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    run_json(req, reports::generate_term_reports(conn, &scope))
}

fn handle_reports_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope = match report_scope(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let school_type = match required_str(req, "schoolType") {
        Ok(s) => s,
        Err(e) => return e,
    };
    let options = match req.params.get("options") {
        None | Some(serde_json::Value::Null) => UpdateOptions::default(),
        Some(v) => match serde_json::from_value::<UpdateOptions>(v.clone()) {
            Ok(o) => o,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    "options must be {studentIds?: string[], rank?: boolean}",
                    Some(json!({ "error": e.to_string() })),
                )
            }
        },
    };
    run_json(
        req,
        reports::update_term_reports(conn, &scope, &school_type, &options),
    )
}

fn handle_reports_rank(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let scope = match rank_scope(req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match rank_term_reports(conn, &scope) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => calc_err(&req.id, e),
    }
}

fn handle_reports_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let year_id = match required_str(req, "academicYearId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term_id = match required_str(req, "academicTermId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match reports::list_term_reports(conn, &class_id, &year_id, &term_id) {
        Ok(list) => ok(&req.id, json!({ "reports": list })),
        Err(e) => calc_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.generate" => Some(handle_reports_generate(state, req)),
        "reports.update" => Some(handle_reports_update(state, req)),
        "reports.rank" => Some(handle_reports_rank(state, req)),
        "reports.list" => Some(handle_reports_list(state, req)),
        _ => None,
    }
}
