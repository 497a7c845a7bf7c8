mod test_support;

use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

fn f64_field(v: &serde_json::Value, key: &str) -> f64 {
    v.get(key).and_then(|x| x.as_f64()).unwrap_or_else(|| {
        panic!("missing numeric field {key} in {v}");
    })
}

#[test]
fn single_partial_item_stats_match_hand_calculation() {
    let workspace = temp_dir("degreetrack-module-stats");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let program = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "programs.create",
        json!({ "name": "BSc Computer Science" }),
    );
    let program_id = program
        .get("program")
        .and_then(|p| p.get("id"))
        .and_then(|v| v.as_str())
        .expect("program id")
        .to_string();
    let module = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "modules.create",
        json!({ "programId": program_id, "name": "Databases", "weighting": 50.0 }),
    );
    let module_id = module
        .get("module")
        .and_then(|m| m.get("id"))
        .and_then(|v| v.as_str())
        .expect("module id")
        .to_string();

    // Empty module: nothing graded, nothing known, full headroom.
    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "stats.module",
        json!({ "moduleId": module_id }),
    );
    assert!(empty
        .get("currentAverage")
        .map(|v| v.is_null())
        .unwrap_or(false));
    assert!((f64_field(&empty, "worstCaseGrade") - 0.0).abs() < 1e-9);
    assert!((f64_field(&empty, "bestCaseGrade") - 100.0).abs() < 1e-9);
    assert_eq!(empty.get("totalCoursework").and_then(|v| v.as_i64()), Some(0));

    // One 20%-weighted item at 80/100: running average 80 (normalized by the
    // 20 points graded so far), best 96, worst 16 (normalized against 100).
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "coursework.create",
        json!({
            "moduleId": module_id,
            "name": "Week 3 Lab",
            "weighting": 20.0,
            "maxMarks": 100.0,
            "achievedMarks": 80.0
        }),
    );

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "stats.module",
        json!({ "moduleId": module_id }),
    );
    assert!((f64_field(&stats, "currentAverage") - 80.0).abs() < 1e-9);
    assert!((f64_field(&stats, "completedWeighting") - 20.0).abs() < 1e-9);
    assert!((f64_field(&stats, "remainingWeighting") - 0.0).abs() < 1e-9);
    assert!((f64_field(&stats, "bestCaseGrade") - 96.0).abs() < 1e-9);
    assert!((f64_field(&stats, "worstCaseGrade") - 16.0).abs() < 1e-9);
    assert_eq!(stats.get("gradedCoursework").and_then(|v| v.as_i64()), Some(1));

    // An ungraded sibling changes the remaining pool, not the projections.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "coursework.create",
        json!({ "moduleId": module_id, "name": "Final Exam", "weighting": 70.0 }),
    );

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "stats.module",
        json!({ "moduleId": module_id }),
    );
    assert!((f64_field(&stats, "currentAverage") - 80.0).abs() < 1e-9);
    assert!((f64_field(&stats, "remainingWeighting") - 70.0).abs() < 1e-9);
    assert!((f64_field(&stats, "bestCaseGrade") - 96.0).abs() < 1e-9);
    assert!((f64_field(&stats, "worstCaseGrade") - 16.0).abs() < 1e-9);
    assert_eq!(stats.get("totalCoursework").and_then(|v| v.as_i64()), Some(2));

    // Identical input, identical output.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "stats.module",
        json!({ "moduleId": module_id }),
    );
    assert_eq!(stats, again);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn fully_graded_module_collapses_projection_spread() {
    let workspace = temp_dir("degreetrack-module-stats-full");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let program = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "programs.create",
        json!({ "name": "BSc Computer Science" }),
    );
    let program_id = program
        .get("program")
        .and_then(|p| p.get("id"))
        .and_then(|v| v.as_str())
        .expect("program id")
        .to_string();
    let module = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "modules.create",
        json!({ "programId": program_id, "name": "Networks" }),
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
        "4",
        "coursework.create",
        json!({
            "moduleId": module_id,
            "name": "Coursework 1",
            "weighting": 30.0,
            "maxMarks": 50.0,
            "achievedMarks": 50.0
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "coursework.create",
        json!({
            "moduleId": module_id,
            "name": "Coursework 2",
            "weighting": 70.0,
            "maxMarks": 200.0,
            "achievedMarks": 200.0
        }),
    );

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "stats.module",
        json!({ "moduleId": module_id }),
    );
    assert!((f64_field(&stats, "currentAverage") - 100.0).abs() < 1e-9);
    assert!((f64_field(&stats, "bestCaseGrade") - 100.0).abs() < 1e-9);
    assert!((f64_field(&stats, "worstCaseGrade") - 100.0).abs() < 1e-9);
    assert!((f64_field(&stats, "completedWeighting") - 100.0).abs() < 1e-9);
    assert!((f64_field(&stats, "remainingWeighting") - 0.0).abs() < 1e-9);

    let _ = std::fs::remove_dir_all(workspace);
}
