mod test_support;

use serde_json::json;
use test_support::{request_err_code, request_ok, spawn_sidecar, temp_dir};

#[test]
fn program_create_update_delete_cascades() {
    let workspace = temp_dir("degreetrack-program-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "programs.create",
        json!({
            "name": "BSc Computer Science",
            "institution": "University of Example",
            "targetGrade": 70.0,
            "totalCreditsRequired": 360,
            "startDate": "2023-09-18",
            "endDate": "2026-06-12"
        }),
    );
    let program = created.get("program").cloned().expect("program");
    let program_id = program
        .get("id")
        .and_then(|v| v.as_str())
        .expect("program id")
        .to_string();
    assert_eq!(
        program.get("status").and_then(|v| v.as_str()),
        Some("in_progress")
    );
    assert_eq!(program.get("targetGrade").and_then(|v| v.as_f64()), Some(70.0));

    let listed = request_ok(&mut stdin, &mut reader, "3", "programs.list", json!({}));
    let rows = listed
        .get("programs")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("programs array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("moduleCount").and_then(|v| v.as_i64()), Some(0));

    let module = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "modules.create",
        json!({
            "programId": program_id,
            "code": "CS101",
            "name": "Introduction to Programming",
            "credits": 20,
            "weighting": 25.0,
            "semester": 1,
            "academicYear": "2023/2024"
        }),
    );
    let module_id = module
        .get("module")
        .and_then(|m| m.get("id"))
        .and_then(|v| v.as_str())
        .expect("module id")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "coursework.create",
        json!({
            "moduleId": module_id,
            "name": "Midterm Exam",
            "weighting": 40.0
        }),
    );

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "programs.update",
        json!({
            "programId": program_id,
            "targetGrade": 75.0,
            "status": "completed"
        }),
    );
    assert_eq!(
        updated
            .get("program")
            .and_then(|p| p.get("targetGrade"))
            .and_then(|v| v.as_f64()),
        Some(75.0)
    );
    assert_eq!(
        updated
            .get("program")
            .and_then(|p| p.get("status"))
            .and_then(|v| v.as_str()),
        Some("completed")
    );
    // Untouched fields survive a partial update.
    assert_eq!(
        updated
            .get("program")
            .and_then(|p| p.get("institution"))
            .and_then(|v| v.as_str()),
        Some("University of Example")
    );

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "programs.get",
        json!({ "programId": program_id }),
    );
    assert_eq!(
        fetched
            .get("program")
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str()),
        Some("BSc Computer Science")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "programs.delete",
        json!({ "programId": program_id }),
    );

    let after = request_ok(&mut stdin, &mut reader, "9", "programs.list", json!({}));
    assert_eq!(
        after
            .get("programs")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    // Cascade removed the module and its coursework with it.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "10",
        "modules.get",
        json!({ "moduleId": module_id }),
    );
    assert_eq!(code, "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn program_validation_rejects_bad_input() {
    let workspace = temp_dir("degreetrack-program-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // Nothing works before a workspace is selected.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "1",
        "programs.create",
        json!({ "name": "BSc Mathematics" }),
    );
    assert_eq!(code, "no_workspace");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "programs.create",
        json!({ "institution": "No Name Given" }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "4",
        "programs.create",
        json!({ "name": "BSc Mathematics", "targetGrade": 120.0 }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "5",
        "programs.create",
        json!({
            "name": "BSc Mathematics",
            "startDate": "2026-06-12",
            "endDate": "2023-09-18"
        }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "6",
        "modules.create",
        json!({ "programId": "no-such-program", "name": "Orphan Module" }),
    );
    assert_eq!(code, "not_found");

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "7",
        "programs.get",
        json!({ "programId": "no-such-program" }),
    );
    assert_eq!(code, "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
