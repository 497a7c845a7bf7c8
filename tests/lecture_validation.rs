mod test_support;

use serde_json::json;
use test_support::{request_err_code, request_ok, spawn_sidecar, temp_dir};

fn setup_module(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    workspace: &std::path::Path,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let program = request_ok(
        stdin,
        reader,
        "s2",
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
        stdin,
        reader,
        "s3",
        "modules.create",
        json!({ "programId": program_id, "name": "Operating Systems" }),
    );
    module
        .get("module")
        .and_then(|m| m.get("id"))
        .and_then(|v| v.as_str())
        .expect("module id")
        .to_string()
}

#[test]
fn lecture_create_derives_weekly_occurrences() {
    let workspace = temp_dir("degreetrack-lecture-occurrences");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let module_id = setup_module(&mut stdin, &mut reader, &workspace);

    // Mondays from 2024-01-08 through 2024-03-25 inclusive: 12 weeks.
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "lectures.create",
        json!({
            "moduleId": module_id,
            "title": "Weekly Lecture",
            "location": "Room 101",
            "dayOfWeek": 0,
            "startTime": "09:00:00",
            "endTime": "11:00:00",
            "recurrenceStartDate": "2024-01-08",
            "recurrenceEndDate": "2024-03-25",
            "notes": "Bring laptop"
        }),
    );
    let lecture = created.get("lecture").cloned().expect("lecture");
    assert_eq!(lecture.get("occurrences").and_then(|v| v.as_i64()), Some(12));
    let lecture_id = lecture
        .get("id")
        .and_then(|v| v.as_str())
        .expect("lecture id")
        .to_string();

    // A window that never reaches the requested weekday has no occurrences.
    let friday = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "lectures.create",
        json!({
            "moduleId": module_id,
            "title": "Revision Session",
            "dayOfWeek": 4,
            "startTime": "14:00:00",
            "endTime": "15:00:00",
            "recurrenceStartDate": "2024-01-08",
            "recurrenceEndDate": "2024-01-10"
        }),
    );
    assert_eq!(
        friday
            .get("lecture")
            .and_then(|l| l.get("occurrences"))
            .and_then(|v| v.as_i64()),
        Some(0)
    );

    // Narrowing the window through update shrinks the derived count.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "lectures.update",
        json!({
            "lectureId": lecture_id,
            "recurrenceEndDate": "2024-01-22",
            "location": "Room 202"
        }),
    );
    let lecture = updated.get("lecture").cloned().expect("lecture");
    assert_eq!(lecture.get("occurrences").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(
        lecture.get("location").and_then(|v| v.as_str()),
        Some("Room 202")
    );
    // Fields not named in the update are untouched.
    assert_eq!(
        lecture.get("startTime").and_then(|v| v.as_str()),
        Some("09:00:00")
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lectures.list",
        json!({ "moduleId": module_id }),
    );
    assert_eq!(
        listed
            .get("lectures")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(2)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "lectures.delete",
        json!({ "lectureId": lecture_id }),
    );
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "6",
        "lectures.get",
        json!({ "lectureId": lecture_id }),
    );
    assert_eq!(code, "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn lecture_ordering_and_range_rejections() {
    let workspace = temp_dir("degreetrack-lecture-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let module_id = setup_module(&mut stdin, &mut reader, &workspace);

    // End before start, within the day.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "1",
        "lectures.create",
        json!({
            "moduleId": module_id,
            "title": "Backwards",
            "dayOfWeek": 1,
            "startTime": "11:00:00",
            "endTime": "09:00:00",
            "recurrenceStartDate": "2024-01-08",
            "recurrenceEndDate": "2024-03-25"
        }),
    );
    assert_eq!(code, "bad_params");

    // Day out of range.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "2",
        "lectures.create",
        json!({
            "moduleId": module_id,
            "title": "Eighth Day",
            "dayOfWeek": 7,
            "startTime": "09:00:00",
            "endTime": "11:00:00",
            "recurrenceStartDate": "2024-01-08",
            "recurrenceEndDate": "2024-03-25"
        }),
    );
    assert_eq!(code, "bad_params");

    // Recurrence window reversed.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "3",
        "lectures.create",
        json!({
            "moduleId": module_id,
            "title": "Backwards Term",
            "dayOfWeek": 1,
            "startTime": "09:00:00",
            "endTime": "11:00:00",
            "recurrenceStartDate": "2024-03-25",
            "recurrenceEndDate": "2024-01-08"
        }),
    );
    assert_eq!(code, "bad_params");

    // Unparseable time.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "4",
        "lectures.create",
        json!({
            "moduleId": module_id,
            "title": "Nine-ish",
            "dayOfWeek": 1,
            "startTime": "nine",
            "endTime": "11:00:00",
            "recurrenceStartDate": "2024-01-08",
            "recurrenceEndDate": "2024-03-25"
        }),
    );
    assert_eq!(code, "bad_params");

    // A valid update cannot leave the row with a reversed window.
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "lectures.create",
        json!({
            "moduleId": module_id,
            "title": "Seminar",
            "dayOfWeek": 2,
            "startTime": "13:00:00",
            "endTime": "14:00:00",
            "recurrenceStartDate": "2024-01-10",
            "recurrenceEndDate": "2024-03-20"
        }),
    );
    let lecture_id = created
        .get("lecture")
        .and_then(|l| l.get("id"))
        .and_then(|v| v.as_str())
        .expect("lecture id")
        .to_string();
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "6",
        "lectures.update",
        json!({ "lectureId": lecture_id, "recurrenceEndDate": "2024-01-01" }),
    );
    assert_eq!(code, "bad_params");

    let _ = std::fs::remove_dir_all(workspace);
}
