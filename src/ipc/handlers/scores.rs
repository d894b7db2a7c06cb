use super::db_conn;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::scores::{update_exam_scores, ExamScoreBatch};
use serde_json::json;

/// Accepts either a single `{examId, scores}` payload or `{examScores: [...]}`.
fn parse_batches(req: &Request) -> Result<Vec<ExamScoreBatch>, serde_json::Value> {
    let parsed = if let Some(list) = req.params.get("examScores") {
        if !list.is_array() {
            return Err(err(&req.id, "bad_params", "examScores must be an array", None));
        }
        serde_json::from_value::<Vec<ExamScoreBatch>>(list.clone())
    } else if req.params.get("examId").is_some() {
        serde_json::from_value::<ExamScoreBatch>(req.params.clone()).map(|b| vec![b])
    } else {
        return Err(err(
            &req.id,
            "bad_params",
            "expected {examId, scores} or {examScores}",
            None,
        ));
    };
    parsed.map_err(|e| {
        err(
            &req.id,
            "bad_params",
            "invalid score payload",
            Some(json!({ "error": e.to_string() })),
        )
    })
}

fn handle_scores_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let batches = match parse_batches(req) {
        Ok(b) => b,
        Err(e) => return e,
    };
    let graded_by = req.params.get("gradedBy").and_then(|v| v.as_str());

    let result = update_exam_scores(conn, &batches, graded_by);
    match serde_json::to_value(&result) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.update" => Some(handle_scores_update(state, req)),
        _ => None,
    }
}
