use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const PROGRAM_STATUSES: &[&str] = &["in_progress", "completed", "deferred"];

struct ProgramRow {
    id: String,
    name: String,
    institution: Option<String>,
    target_grade: Option<f64>,
    total_credits_required: i64,
    status: String,
    start_date: Option<String>,
    end_date: Option<String>,
    created_at: String,
}

fn program_json(p: &ProgramRow) -> serde_json::Value {
    json!({
        "id": p.id,
        "name": p.name,
        "institution": p.institution,
        "targetGrade": p.target_grade,
        "totalCreditsRequired": p.total_credits_required,
        "status": p.status,
        "startDate": p.start_date,
        "endDate": p.end_date,
        "createdAt": p.created_at,
    })
}

fn load_program(conn: &Connection, id: &str) -> Result<Option<ProgramRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, name, institution, target_grade, total_credits_required,
                status, start_date, end_date, created_at
         FROM programs
         WHERE id = ?",
        [id],
        |r| {
            Ok(ProgramRow {
                id: r.get(0)?,
                name: r.get(1)?,
                institution: r.get(2)?,
                target_grade: r.get(3)?,
                total_credits_required: r.get(4)?,
                status: r.get(5)?,
                start_date: r.get(6)?,
                end_date: r.get(7)?,
                created_at: r.get(8)?,
            })
        },
    )
    .optional()
}

struct ProgramFields {
    name: Option<String>,
    institution: Option<String>,
    target_grade: Option<f64>,
    total_credits_required: Option<i64>,
    status: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

fn parse_program_fields(params: &serde_json::Value) -> Result<ProgramFields, String> {
    let fields = ProgramFields {
        name: helpers::opt_str(params, "name")?,
        institution: helpers::opt_str(params, "institution")?,
        target_grade: helpers::opt_f64(params, "targetGrade")?,
        total_credits_required: helpers::opt_i64(params, "totalCreditsRequired")?,
        status: helpers::opt_str(params, "status")?,
        start_date: helpers::opt_str(params, "startDate")?,
        end_date: helpers::opt_str(params, "endDate")?,
    };

    if let Some(t) = fields.target_grade {
        helpers::check_percent("targetGrade", t)?;
    }
    if let Some(c) = fields.total_credits_required {
        if c < 0 {
            return Err("totalCreditsRequired must be >= 0".to_string());
        }
    }
    if let Some(s) = &fields.status {
        helpers::check_status("status", s, PROGRAM_STATUSES)?;
    }
    if let Some(d) = &fields.start_date {
        helpers::parse_date("startDate", d)?;
    }
    if let Some(d) = &fields.end_date {
        helpers::parse_date("endDate", d)?;
    }
    Ok(fields)
}

fn check_date_order(start: &Option<String>, end: &Option<String>) -> Result<(), String> {
    if let (Some(s), Some(e)) = (start, end) {
        let s = helpers::parse_date("startDate", s)?;
        let e = helpers::parse_date("endDate", e)?;
        if e < s {
            return Err("endDate must be on or after startDate".to_string());
        }
    }
    Ok(())
}

fn handle_programs_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "programs": [] }));
    };

    // Include module counts so the UI can show a useful dashboard.
    let mut stmt = match conn.prepare(
        "SELECT
           p.id,
           p.name,
           p.institution,
           p.target_grade,
           p.total_credits_required,
           p.status,
           (SELECT COUNT(*) FROM modules m WHERE m.program_id = p.id) AS module_count
         FROM programs p
         ORDER BY p.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let institution: Option<String> = row.get(2)?;
            let target_grade: Option<f64> = row.get(3)?;
            let total_credits: i64 = row.get(4)?;
            let status: String = row.get(5)?;
            let module_count: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "name": name,
                "institution": institution,
                "targetGrade": target_grade,
                "totalCreditsRequired": total_credits,
                "status": status,
                "moduleCount": module_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(programs) => ok(&req.id, json!({ "programs": programs })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_programs_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let fields = match parse_program_fields(&req.params) {
        Ok(f) => f,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let Some(name) = fields.name else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    if let Err(m) = check_date_order(&fields.start_date, &fields.end_date) {
        return err(&req.id, "bad_params", m, None);
    }

    let program_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO programs(id, name, institution, target_grade, total_credits_required,
                              status, start_date, end_date, created_at)
         VALUES(?, ?, ?, ?, ?, 'in_progress', ?, ?, ?)",
        (
            &program_id,
            &name,
            &fields.institution,
            &fields.target_grade,
            fields.total_credits_required.unwrap_or(360),
            &fields.start_date,
            &fields.end_date,
            &created_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "programs" })),
        );
    }

    match load_program(conn, &program_id) {
        Ok(Some(p)) => ok(&req.id, json!({ "program": program_json(&p) })),
        Ok(None) => err(&req.id, "not_found", "program not found after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_programs_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let program_id = match helpers::require_str(&req.params, "programId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match load_program(conn, &program_id) {
        Ok(Some(p)) => ok(&req.id, json!({ "program": program_json(&p) })),
        Ok(None) => err(&req.id, "not_found", "program not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_programs_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let program_id = match helpers::require_str(&req.params, "programId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let fields = match parse_program_fields(&req.params) {
        Ok(f) => f,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let current = match load_program(conn, &program_id) {
        Ok(Some(p)) => p,
        Ok(None) => return err(&req.id, "not_found", "program not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let merged = ProgramRow {
        id: current.id,
        name: fields.name.unwrap_or(current.name),
        institution: fields.institution.or(current.institution),
        target_grade: fields.target_grade.or(current.target_grade),
        total_credits_required: fields
            .total_credits_required
            .unwrap_or(current.total_credits_required),
        status: fields.status.unwrap_or(current.status),
        start_date: fields.start_date.or(current.start_date),
        end_date: fields.end_date.or(current.end_date),
        created_at: current.created_at,
    };
    if let Err(m) = check_date_order(&merged.start_date, &merged.end_date) {
        return err(&req.id, "bad_params", m, None);
    }

    if let Err(e) = conn.execute(
        "UPDATE programs
         SET name = ?, institution = ?, target_grade = ?, total_credits_required = ?,
             status = ?, start_date = ?, end_date = ?
         WHERE id = ?",
        (
            &merged.name,
            &merged.institution,
            &merged.target_grade,
            merged.total_credits_required,
            &merged.status,
            &merged.start_date,
            &merged.end_date,
            &merged.id,
        ),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "programs" })),
        );
    }

    ok(&req.id, json!({ "program": program_json(&merged) }))
}

fn handle_programs_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let program_id = match helpers::require_str(&req.params, "programId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM programs WHERE id = ?", [&program_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "program not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    if let Err(e) = tx.execute(
        "DELETE FROM coursework
         WHERE module_id IN (SELECT id FROM modules WHERE program_id = ?)",
        [&program_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "coursework" })),
        );
    }
    if let Err(e) = tx.execute(
        "DELETE FROM lectures
         WHERE module_id IN (SELECT id FROM modules WHERE program_id = ?)",
        [&program_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "lectures" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM modules WHERE program_id = ?", [&program_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "modules" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM programs WHERE id = ?", [&program_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "programs" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "programs.list" => Some(handle_programs_list(state, req)),
        "programs.create" => Some(handle_programs_create(state, req)),
        "programs.get" => Some(handle_programs_get(state, req)),
        "programs.update" => Some(handle_programs_update(state, req)),
        "programs.delete" => Some(handle_programs_delete(state, req)),
        _ => None,
    }
}
