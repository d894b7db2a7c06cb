mod test_support;

use serde_json::json;
use test_support::{
    add_exam, add_percentage_exams, add_student, request, request_err_code, request_ok,
    seeded_workspace, spawn_sidecar, spawn_sidecar_with_env, workspace_str, CLASS, MATH, SCHOOL,
    TERM, YEAR,
};

fn scope() -> serde_json::Value {
    json!({
        "schoolId": SCHOOL,
        "classId": CLASS,
        "academicYearId": YEAR,
        "academicTermId": TERM,
    })
}

#[test]
fn router_rejects_unknown_methods_and_requires_a_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health["workspacePath"].is_null());

    let code = request_err_code(&mut stdin, &mut reader, "2", "grades.import", json!({}));
    assert_eq!(code, "not_implemented");

    let code = request_err_code(&mut stdin, &mut reader, "3", "reports.generate", scope());
    assert_eq!(code, "no_workspace");

    let code = request_err_code(&mut stdin, &mut reader, "4", "workspace.select", json!({}));
    assert_eq!(code, "bad_params");
}

#[test]
fn full_term_pipeline_over_ipc() {
    let (workspace, conn) = seeded_workspace("termreportd-ipc-pipeline");
    add_student(&conn, "stu-ama", "Ama", "Mensah", CLASS);
    add_student(&conn, "stu-esi", "Esi", "Owusu", CLASS);
    add_exam(&conn, "ex-t1", CLASS, MATH, "Class Test 1", 20.0);
    add_exam(&conn, "ex-final", CLASS, MATH, "End of Term Exam", 100.0);
    drop(conn);

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace_str(&workspace) }),
    );
    assert_eq!(selected["workspacePath"], workspace_str(&workspace));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "scores.update",
        json!({
            "examScores": [
                { "examId": "ex-t1", "scores": [
                    { "studentId": "stu-ama", "rawScore": 18 },
                    { "studentId": "stu-esi", "rawScore": 12 }
                ]},
                { "examId": "ex-final", "scores": [
                    { "studentId": "stu-ama", "rawScore": 65 }
                ]}
            ]
        }),
    );
    assert_eq!(updated["success"], true);
    assert_eq!(updated["summary"]["totalUpdated"], 3);
    assert_eq!(updated["summary"]["reportsRegenerated"], 2);

    let single = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "scores.update",
        json!({ "examId": "ex-final", "scores": [{ "studentId": "stu-esi", "rawScore": "40" }] }),
    );
    assert_eq!(single["summary"]["totalUpdated"], 1);

    let mut calc_params = scope();
    calc_params["studentId"] = json!("stu-ama");
    calc_params["subjectId"] = json!(MATH);
    let calc = request_ok(&mut stdin, &mut reader, "4", "exams.calculateScores", calc_params);
    assert_eq!(calc["examined"], true);
    assert_eq!(calc["classScore"], 27.0);
    assert_eq!(calc["examScore"], 45.5);
    assert_eq!(calc["totalScore"], 72.5);
    assert_eq!(calc["grade"], "B");

    let run = request_ok(&mut stdin, &mut reader, "5", "reports.generate", scope());
    assert_eq!(run["success"], true);
    assert_eq!(run["reports"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(run["ranking"]["rankedReports"], 2);

    let list = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.list",
        json!({ "classId": CLASS, "academicYearId": YEAR, "academicTermId": TERM }),
    );
    let reports = list["reports"].as_array().expect("reports");
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["studentName"], "Ama Mensah");
    assert_eq!(reports[0]["rank"], "1st");
    assert_eq!(reports[1]["rank"], "2nd");
    assert_eq!(reports[0]["details"][0]["grade"], "B");

    let ranked = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "reports.rank",
        json!({
            "classId": CLASS,
            "academicYearId": YEAR,
            "academicTermId": TERM,
            "schoolType": "BASIC"
        }),
    );
    assert_eq!(ranked["rankedReports"], 2);
    assert_eq!(ranked["courseRankingApplied"], false);

    let mut update_params = scope();
    update_params["schoolType"] = json!("BASIC");
    update_params["options"] = json!({ "studentIds": ["stu-esi"], "rank": false });
    let partial = request_ok(&mut stdin, &mut reader, "8", "reports.update", update_params);
    assert_eq!(partial["reports"].as_array().map(|a| a.len()), Some(1));
    assert!(partial.get("ranking").is_none());

    let mut bad_update = scope();
    bad_update["schoolType"] = json!("BASIC");
    bad_update["options"] = json!({ "studentIds": "stu-esi" });
    let code = request_err_code(&mut stdin, &mut reader, "9", "reports.update", bad_update);
    assert_eq!(code, "bad_params");

    let validated = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "grades.validate",
        json!({ "schoolId": SCHOOL }),
    );
    assert_eq!(validated["valid"], true);
    assert_eq!(validated["bandCount"], 6);
}

#[test]
fn configuration_errors_surface_as_error_objects() {
    let (workspace, conn) = seeded_workspace("termreportd-ipc-config");
    add_student(&conn, "stu-ama", "Ama", "Mensah", CLASS);
    add_exam(&conn, "ex-final", CLASS, MATH, "End of Term Exam", 100.0);
    conn.execute("DELETE FROM exam_configurations", [])
        .expect("drop weights");
    conn.execute(
        "UPDATE grade_system SET min_score = 85 WHERE grade_name = 'A'",
        [],
    )
    .expect("open a gap");
    drop(conn);

    let (_child, mut stdin, mut reader) = spawn_sidecar_with_env(&[(
        "TERMREPORTD_WORKSPACE",
        workspace.to_str().expect("utf-8 path"),
    )]);

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["workspacePath"], workspace_str(&workspace));

    let mut calc_params = scope();
    calc_params["studentId"] = json!("stu-ama");
    calc_params["subjectId"] = json!(MATH);
    let resp = request(&mut stdin, &mut reader, "2", "exams.calculateScores", calc_params);
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "config_missing");
    assert_eq!(resp["error"]["details"]["schoolId"], SCHOOL);

    let run = request_ok(&mut stdin, &mut reader, "3", "reports.generate", scope());
    assert_eq!(run["success"], false);
    assert_eq!(run["code"], "config_missing");

    let validated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.validate",
        json!({ "schoolId": SCHOOL }),
    );
    assert_eq!(validated["valid"], false);
    assert_eq!(validated["issues"][0]["kind"], "gap");
}

#[test]
fn scores_update_needs_a_payload() {
    let (workspace, conn) = seeded_workspace("termreportd-ipc-scores");
    add_student(&conn, "stu-ama", "Ama", "Mensah", CLASS);
    add_percentage_exams(&conn, CLASS, MATH, &[("stu-ama", 50.0)]);
    drop(conn);

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace_str(&workspace) }),
    );
    let code = request_err_code(&mut stdin, &mut reader, "2", "scores.update", json!({}));
    assert_eq!(code, "bad_params");
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "scores.update",
        json!({ "examScores": { "examId": "x" } }),
    );
    assert_eq!(code, "bad_params");
}
