use crate::grades::GradedItem;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const COURSEWORK_STATUSES: &[&str] = &["not_started", "in_progress", "submitted", "graded"];

struct CourseworkRow {
    id: String,
    module_id: String,
    name: String,
    weighting: f64,
    max_marks: f64,
    achieved_marks: Option<f64>,
    deadline: Option<String>,
    status: String,
    submitted_at: Option<String>,
    graded_at: Option<String>,
    feedback: Option<String>,
    created_at: String,
}

fn coursework_json(c: &CourseworkRow) -> serde_json::Value {
    let percentage = GradedItem {
        weighting: c.weighting,
        max_marks: c.max_marks,
        achieved_marks: c.achieved_marks,
    }
    .percentage();
    json!({
        "id": c.id,
        "moduleId": c.module_id,
        "name": c.name,
        "weighting": c.weighting,
        "maxMarks": c.max_marks,
        "achievedMarks": c.achieved_marks,
        "percentage": percentage,
        "isGraded": c.achieved_marks.is_some(),
        "deadline": c.deadline,
        "status": c.status,
        "submittedAt": c.submitted_at,
        "gradedAt": c.graded_at,
        "feedback": c.feedback,
        "createdAt": c.created_at,
    })
}

fn load_coursework(conn: &Connection, id: &str) -> Result<Option<CourseworkRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, module_id, name, weighting, max_marks, achieved_marks, deadline,
                status, submitted_at, graded_at, feedback, created_at
         FROM coursework
         WHERE id = ?",
        [id],
        |r| {
            Ok(CourseworkRow {
                id: r.get(0)?,
                module_id: r.get(1)?,
                name: r.get(2)?,
                weighting: r.get(3)?,
                max_marks: r.get(4)?,
                achieved_marks: r.get(5)?,
                deadline: r.get(6)?,
                status: r.get(7)?,
                submitted_at: r.get(8)?,
                graded_at: r.get(9)?,
                feedback: r.get(10)?,
                created_at: r.get(11)?,
            })
        },
    )
    .optional()
}

struct CourseworkFields {
    name: Option<String>,
    weighting: Option<f64>,
    max_marks: Option<f64>,
    achieved_marks: Option<f64>,
    deadline: Option<String>,
    status: Option<String>,
    feedback: Option<String>,
}

fn parse_coursework_fields(params: &serde_json::Value) -> Result<CourseworkFields, String> {
    let fields = CourseworkFields {
        name: helpers::opt_str(params, "name")?,
        weighting: helpers::opt_f64(params, "weighting")?,
        max_marks: helpers::opt_f64(params, "maxMarks")?,
        achieved_marks: helpers::opt_f64(params, "achievedMarks")?,
        deadline: helpers::opt_str(params, "deadline")?,
        status: helpers::opt_str(params, "status")?,
        feedback: helpers::opt_str(params, "feedback")?,
    };

    if let Some(w) = fields.weighting {
        helpers::check_percent("weighting", w)?;
    }
    if let Some(m) = fields.max_marks {
        if m <= 0.0 {
            return Err("maxMarks must be greater than 0".to_string());
        }
    }
    if let Some(a) = fields.achieved_marks {
        if a < 0.0 {
            return Err("achievedMarks must be >= 0".to_string());
        }
    }
    if let Some(d) = &fields.deadline {
        check_deadline(d)?;
    }
    if let Some(s) = &fields.status {
        helpers::check_status("status", s, COURSEWORK_STATUSES)?;
    }
    Ok(fields)
}

fn check_deadline(value: &str) -> Result<(), String> {
    if DateTime::parse_from_rfc3339(value).is_ok() {
        return Ok(());
    }
    helpers::parse_date("deadline", value)
        .map(|_| ())
        .map_err(|_| "deadline must be an RFC 3339 timestamp or a YYYY-MM-DD date".to_string())
}

/// The engine never sees marks above maxMarks; they are rejected here.
fn check_marks_bound(achieved: Option<f64>, max_marks: f64) -> Result<(), String> {
    if let Some(a) = achieved {
        if a > max_marks {
            return Err("achievedMarks cannot exceed maxMarks".to_string());
        }
    }
    Ok(())
}

fn handle_coursework_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let module_id = match helpers::require_str(&req.params, "moduleId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, module_id, name, weighting, max_marks, achieved_marks, deadline,
                status, submitted_at, graded_at, feedback, created_at
         FROM coursework
         WHERE module_id = ?
         ORDER BY deadline IS NULL, deadline, name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&module_id], |r| {
            Ok(CourseworkRow {
                id: r.get(0)?,
                module_id: r.get(1)?,
                name: r.get(2)?,
                weighting: r.get(3)?,
                max_marks: r.get(4)?,
                achieved_marks: r.get(5)?,
                deadline: r.get(6)?,
                status: r.get(7)?,
                submitted_at: r.get(8)?,
                graded_at: r.get(9)?,
                feedback: r.get(10)?,
                created_at: r.get(11)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    let items = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Over-100 totals are not an engine concern; surface them for the UI.
    let total_weighting: f64 = items.iter().map(|c| c.weighting).sum();
    let coursework: Vec<serde_json::Value> = items.iter().map(coursework_json).collect();

    ok(
        &req.id,
        json!({ "coursework": coursework, "totalWeighting": total_weighting }),
    )
}

fn handle_coursework_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let module_id = match helpers::require_str(&req.params, "moduleId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let fields = match parse_coursework_fields(&req.params) {
        Ok(f) => f,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let Some(name) = fields.name else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let Some(weighting) = fields.weighting else {
        return err(&req.id, "bad_params", "missing weighting", None);
    };
    let max_marks = fields.max_marks.unwrap_or(100.0);
    if let Err(m) = check_marks_bound(fields.achieved_marks, max_marks) {
        return err(&req.id, "bad_params", m, None);
    }

    let module_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM modules WHERE id = ?", [&module_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if module_exists.is_none() {
        return err(&req.id, "not_found", "module not found", None);
    }

    let now = Utc::now().to_rfc3339();
    // Marks supplied up front mean the item arrives already graded.
    let (status, graded_at) = if fields.achieved_marks.is_some() {
        ("graded".to_string(), Some(now.clone()))
    } else {
        (
            fields.status.unwrap_or_else(|| "not_started".to_string()),
            None,
        )
    };

    let coursework_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO coursework(id, module_id, name, weighting, max_marks, achieved_marks,
                                deadline, status, submitted_at, graded_at, feedback, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)",
        (
            &coursework_id,
            &module_id,
            &name,
            weighting,
            max_marks,
            &fields.achieved_marks,
            &fields.deadline,
            &status,
            &graded_at,
            &fields.feedback,
            &now,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "coursework" })),
        );
    }

    match load_coursework(conn, &coursework_id) {
        Ok(Some(c)) => ok(&req.id, json!({ "coursework": coursework_json(&c) })),
        Ok(None) => err(
            &req.id,
            "not_found",
            "coursework not found after insert",
            None,
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_coursework_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let coursework_id = match helpers::require_str(&req.params, "courseworkId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match load_coursework(conn, &coursework_id) {
        Ok(Some(c)) => ok(&req.id, json!({ "coursework": coursework_json(&c) })),
        Ok(None) => err(&req.id, "not_found", "coursework not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_coursework_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let coursework_id = match helpers::require_str(&req.params, "courseworkId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let fields = match parse_coursework_fields(&req.params) {
        Ok(f) => f,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let current = match load_coursework(conn, &coursework_id) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "coursework not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let now = Utc::now().to_rfc3339();
    let newly_graded = fields.achieved_marks.is_some() && current.achieved_marks.is_none();

    let mut merged = CourseworkRow {
        id: current.id,
        module_id: current.module_id,
        name: fields.name.unwrap_or(current.name),
        weighting: fields.weighting.unwrap_or(current.weighting),
        max_marks: fields.max_marks.unwrap_or(current.max_marks),
        achieved_marks: fields.achieved_marks.or(current.achieved_marks),
        deadline: fields.deadline.or(current.deadline),
        status: fields.status.unwrap_or(current.status),
        submitted_at: current.submitted_at,
        graded_at: current.graded_at,
        feedback: fields.feedback.or(current.feedback),
        created_at: current.created_at,
    };
    if let Err(m) = check_marks_bound(merged.achieved_marks, merged.max_marks) {
        return err(&req.id, "bad_params", m, None);
    }

    // First marks flip the item to graded and stamp when it happened.
    if newly_graded {
        merged.status = "graded".to_string();
        merged.graded_at = Some(now.clone());
    }
    if merged.status == "submitted" && merged.submitted_at.is_none() {
        merged.submitted_at = Some(now);
    }

    if let Err(e) = conn.execute(
        "UPDATE coursework
         SET name = ?, weighting = ?, max_marks = ?, achieved_marks = ?, deadline = ?,
             status = ?, submitted_at = ?, graded_at = ?, feedback = ?
         WHERE id = ?",
        (
            &merged.name,
            merged.weighting,
            merged.max_marks,
            &merged.achieved_marks,
            &merged.deadline,
            &merged.status,
            &merged.submitted_at,
            &merged.graded_at,
            &merged.feedback,
            &merged.id,
        ),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "coursework" })),
        );
    }

    ok(&req.id, json!({ "coursework": coursework_json(&merged) }))
}

fn handle_coursework_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let coursework_id = match helpers::require_str(&req.params, "courseworkId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let affected = match conn.execute("DELETE FROM coursework WHERE id = ?", [&coursework_id]) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "coursework" })),
            )
        }
    };
    if affected == 0 {
        return err(&req.id, "not_found", "coursework not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "coursework.list" => Some(handle_coursework_list(state, req)),
        "coursework.create" => Some(handle_coursework_create(state, req)),
        "coursework.get" => Some(handle_coursework_get(state, req)),
        "coursework.update" => Some(handle_coursework_update(state, req)),
        "coursework.delete" => Some(handle_coursework_delete(state, req)),
        _ => None,
    }
}
