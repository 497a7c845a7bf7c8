use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const MODULE_STATUSES: &[&str] = &["upcoming", "in_progress", "completed"];

struct ModuleRow {
    id: String,
    program_id: String,
    code: Option<String>,
    name: String,
    credits: i64,
    weighting: Option<f64>,
    status: String,
    semester: Option<i64>,
    academic_year: Option<String>,
    created_at: String,
}

fn module_json(m: &ModuleRow) -> serde_json::Value {
    json!({
        "id": m.id,
        "programId": m.program_id,
        "code": m.code,
        "name": m.name,
        "credits": m.credits,
        "weighting": m.weighting,
        "status": m.status,
        "semester": m.semester,
        "academicYear": m.academic_year,
        "createdAt": m.created_at,
    })
}

fn load_module(conn: &Connection, id: &str) -> Result<Option<ModuleRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, program_id, code, name, credits, weighting, status, semester,
                academic_year, created_at
         FROM modules
         WHERE id = ?",
        [id],
        |r| {
            Ok(ModuleRow {
                id: r.get(0)?,
                program_id: r.get(1)?,
                code: r.get(2)?,
                name: r.get(3)?,
                credits: r.get(4)?,
                weighting: r.get(5)?,
                status: r.get(6)?,
                semester: r.get(7)?,
                academic_year: r.get(8)?,
                created_at: r.get(9)?,
            })
        },
    )
    .optional()
}

struct ModuleFields {
    code: Option<String>,
    name: Option<String>,
    credits: Option<i64>,
    weighting: Option<f64>,
    status: Option<String>,
    semester: Option<i64>,
    academic_year: Option<String>,
}

fn parse_module_fields(params: &serde_json::Value) -> Result<ModuleFields, String> {
    let fields = ModuleFields {
        code: helpers::opt_str(params, "code")?,
        name: helpers::opt_str(params, "name")?,
        credits: helpers::opt_i64(params, "credits")?,
        weighting: helpers::opt_f64(params, "weighting")?,
        status: helpers::opt_str(params, "status")?,
        semester: helpers::opt_i64(params, "semester")?,
        academic_year: helpers::opt_str(params, "academicYear")?,
    };

    if let Some(c) = fields.credits {
        if c < 0 {
            return Err("credits must be >= 0".to_string());
        }
    }
    if let Some(w) = fields.weighting {
        helpers::check_percent("weighting", w)?;
    }
    if let Some(s) = &fields.status {
        helpers::check_status("status", s, MODULE_STATUSES)?;
    }
    if let Some(sem) = fields.semester {
        if !(1..=3).contains(&sem) {
            return Err("semester must be between 1 and 3".to_string());
        }
    }
    Ok(fields)
}

fn handle_modules_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let program_id = match helpers::require_str(&req.params, "programId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let mut stmt = match conn.prepare(
        "SELECT
           m.id, m.program_id, m.code, m.name, m.credits, m.weighting, m.status,
           m.semester, m.academic_year, m.created_at,
           (SELECT COUNT(*) FROM coursework c WHERE c.module_id = m.id) AS coursework_count,
           (SELECT COUNT(*) FROM lectures l WHERE l.module_id = m.id) AS lecture_count
         FROM modules m
         WHERE m.program_id = ?
         ORDER BY m.semester, m.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&program_id], |r| {
            let row = ModuleRow {
                id: r.get(0)?,
                program_id: r.get(1)?,
                code: r.get(2)?,
                name: r.get(3)?,
                credits: r.get(4)?,
                weighting: r.get(5)?,
                status: r.get(6)?,
                semester: r.get(7)?,
                academic_year: r.get(8)?,
                created_at: r.get(9)?,
            };
            let coursework_count: i64 = r.get(10)?;
            let lecture_count: i64 = r.get(11)?;
            let mut v = module_json(&row);
            v["courseworkCount"] = json!(coursework_count);
            v["lectureCount"] = json!(lecture_count);
            Ok(v)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    let modules = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Weighting sums over 100 are allowed; report the total so the UI can
    // warn about over-allocation.
    let total_weighting: f64 = modules
        .iter()
        .filter_map(|m| m.get("weighting").and_then(|w| w.as_f64()))
        .sum();

    ok(
        &req.id,
        json!({ "modules": modules, "totalWeighting": total_weighting }),
    )
}

fn handle_modules_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let program_id = match helpers::require_str(&req.params, "programId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let fields = match parse_module_fields(&req.params) {
        Ok(f) => f,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let Some(name) = fields.name else {
        return err(&req.id, "bad_params", "missing name", None);
    };

    let program_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM programs WHERE id = ?", [&program_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if program_exists.is_none() {
        return err(&req.id, "not_found", "program not found", None);
    }

    let module_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO modules(id, program_id, code, name, credits, weighting, status,
                             semester, academic_year, created_at)
         VALUES(?, ?, ?, ?, ?, ?, 'upcoming', ?, ?, ?)",
        (
            &module_id,
            &program_id,
            &fields.code,
            &name,
            fields.credits.unwrap_or(10),
            &fields.weighting,
            &fields.semester,
            &fields.academic_year,
            &created_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "modules" })),
        );
    }

    match load_module(conn, &module_id) {
        Ok(Some(m)) => ok(&req.id, json!({ "module": module_json(&m) })),
        Ok(None) => err(&req.id, "not_found", "module not found after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_modules_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let module_id = match helpers::require_str(&req.params, "moduleId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match load_module(conn, &module_id) {
        Ok(Some(m)) => ok(&req.id, json!({ "module": module_json(&m) })),
        Ok(None) => err(&req.id, "not_found", "module not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_modules_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let module_id = match helpers::require_str(&req.params, "moduleId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let fields = match parse_module_fields(&req.params) {
        Ok(f) => f,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let current = match load_module(conn, &module_id) {
        Ok(Some(m)) => m,
        Ok(None) => return err(&req.id, "not_found", "module not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let merged = ModuleRow {
        id: current.id,
        program_id: current.program_id,
        code: fields.code.or(current.code),
        name: fields.name.unwrap_or(current.name),
        credits: fields.credits.unwrap_or(current.credits),
        weighting: fields.weighting.or(current.weighting),
        status: fields.status.unwrap_or(current.status),
        semester: fields.semester.or(current.semester),
        academic_year: fields.academic_year.or(current.academic_year),
        created_at: current.created_at,
    };

    if let Err(e) = conn.execute(
        "UPDATE modules
         SET code = ?, name = ?, credits = ?, weighting = ?, status = ?,
             semester = ?, academic_year = ?
         WHERE id = ?",
        (
            &merged.code,
            &merged.name,
            merged.credits,
            &merged.weighting,
            &merged.status,
            &merged.semester,
            &merged.academic_year,
            &merged.id,
        ),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "modules" })),
        );
    }

    ok(&req.id, json!({ "module": module_json(&merged) }))
}

fn handle_modules_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let module_id = match helpers::require_str(&req.params, "moduleId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM modules WHERE id = ?", [&module_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "module not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute("DELETE FROM coursework WHERE module_id = ?", [&module_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "coursework" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM lectures WHERE module_id = ?", [&module_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "lectures" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM modules WHERE id = ?", [&module_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "modules" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "modules.list" => Some(handle_modules_list(state, req)),
        "modules.create" => Some(handle_modules_create(state, req)),
        "modules.get" => Some(handle_modules_get(state, req)),
        "modules.update" => Some(handle_modules_update(state, req)),
        "modules.delete" => Some(handle_modules_delete(state, req)),
        _ => None,
    }
}
