use crate::grades::{self, GradedItem};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct ModuleInfo {
    id: String,
    name: String,
    weighting: Option<f64>,
    status: String,
    credits: i64,
}

fn load_module_info(conn: &Connection, id: &str) -> Result<Option<ModuleInfo>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, name, weighting, status, credits FROM modules WHERE id = ?",
        [id],
        |r| {
            Ok(ModuleInfo {
                id: r.get(0)?,
                name: r.get(1)?,
                weighting: r.get(2)?,
                status: r.get(3)?,
                credits: r.get(4)?,
            })
        },
    )
    .optional()
}

fn load_program_modules(
    conn: &Connection,
    program_id: &str,
) -> Result<Vec<ModuleInfo>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, name, weighting, status, credits
         FROM modules
         WHERE program_id = ?
         ORDER BY semester, name",
    )?;
    let rows = stmt.query_map([program_id], |r| {
        Ok(ModuleInfo {
            id: r.get(0)?,
            name: r.get(1)?,
            weighting: r.get(2)?,
            status: r.get(3)?,
            credits: r.get(4)?,
        })
    })?;
    rows.collect()
}

/// Snapshot of a module's coursework as engine input.
fn coursework_items(conn: &Connection, module_id: &str) -> Result<Vec<GradedItem>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT weighting, max_marks, achieved_marks FROM coursework WHERE module_id = ?",
    )?;
    let rows = stmt.query_map([module_id], |r| {
        Ok(GradedItem {
            weighting: r.get(0)?,
            max_marks: r.get(1)?,
            achieved_marks: r.get(2)?,
        })
    })?;
    rows.collect()
}

struct ModuleStats {
    average: grades::WeightedAverage,
    json: serde_json::Value,
}

fn module_stats(conn: &Connection, module: &ModuleInfo) -> Result<ModuleStats, rusqlite::Error> {
    let items = coursework_items(conn, &module.id)?;
    let average = grades::weighted_average(&items);
    let projection = grades::project_grades(&items);
    let json = json!({
        "moduleId": module.id,
        "moduleName": module.name,
        "currentAverage": average.current_average,
        "completedWeighting": average.completed_weighting,
        "remainingWeighting": average.remaining_weighting,
        "totalCoursework": average.graded_count + average.remaining_count,
        "gradedCoursework": average.graded_count,
        "bestCaseGrade": projection.best_case,
        "worstCaseGrade": projection.worst_case,
    });
    Ok(ModuleStats { average, json })
}

/// Program-level rollup: each weighted module becomes a GradedItem out of
/// 100, with its own current average standing in for achieved marks. A
/// module counts as graded only once it is explicitly completed and has a
/// defined average; a partially graded module still has headroom and stays
/// in the remaining pool. Modules without a weighting are left out entirely.
fn rollup_item(module: &ModuleInfo, stats: &ModuleStats) -> Option<GradedItem> {
    let weighting = module.weighting?;
    let graded = if module.status == "completed" {
        stats.average.current_average
    } else {
        None
    };
    Some(match graded {
        Some(average) => GradedItem::graded(weighting, 100.0, average),
        None => GradedItem::pending(weighting, 100.0),
    })
}

fn handle_stats_module(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let module_id = match helpers::require_str(&req.params, "moduleId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let module = match load_module_info(conn, &module_id) {
        Ok(Some(m)) => m,
        Ok(None) => return err(&req.id, "not_found", "module not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match module_stats(conn, &module) {
        Ok(stats) => ok(&req.id, stats.json),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_stats_module_target(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let module_id = match helpers::require_str(&req.params, "moduleId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let target = match parse_target_grade(&req.params) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let module = match load_module_info(conn, &module_id) {
        Ok(Some(m)) => m,
        Ok(None) => return err(&req.id, "not_found", "module not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let items = match coursework_items(conn, &module.id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    target_response(&req.id, &items, target)
}

fn handle_stats_program(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let program_id = match helpers::require_str(&req.params, "programId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let program: Option<(String, String, Option<f64>, i64)> = match conn
        .query_row(
            "SELECT id, name, target_grade, total_credits_required FROM programs WHERE id = ?",
            [&program_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((program_id, program_name, target_grade, total_credits_required)) = program else {
        return err(&req.id, "not_found", "program not found", None);
    };

    let modules = match load_program_modules(conn, &program_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut modules_stats = Vec::with_capacity(modules.len());
    let mut rollup = Vec::new();
    let mut completed_modules = 0_i64;
    let mut completed_credits = 0_i64;
    for module in &modules {
        let stats = match module_stats(conn, module) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if module.status == "completed" {
            completed_modules += 1;
            completed_credits += module.credits;
        }
        if let Some(item) = rollup_item(module, &stats) {
            rollup.push(item);
        }
        modules_stats.push(stats.json);
    }

    let overall = grades::weighted_average(&rollup);
    let projection = grades::project_grades(&rollup);
    let on_track = match (target_grade, overall.current_average) {
        (Some(target), Some(avg)) => avg >= target,
        _ => true,
    };

    ok(
        &req.id,
        json!({
            "programId": program_id,
            "programName": program_name,
            "overallAverage": overall.current_average,
            "completedWeighting": overall.completed_weighting,
            "remainingWeighting": overall.remaining_weighting,
            "completedCredits": completed_credits,
            "remainingCredits": total_credits_required - completed_credits,
            "totalModules": modules.len(),
            "completedModules": completed_modules,
            "targetGrade": target_grade,
            "onTrack": on_track,
            "bestCaseGrade": projection.best_case,
            "worstCaseGrade": projection.worst_case,
            "modulesStats": modules_stats,
        }),
    )
}

fn handle_stats_program_target(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let program_id = match helpers::require_str(&req.params, "programId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let target = match parse_target_grade(&req.params) {
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

    let modules = match load_program_modules(conn, &program_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut rollup = Vec::new();
    for module in &modules {
        let stats = match module_stats(conn, module) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if let Some(item) = rollup_item(module, &stats) {
            rollup.push(item);
        }
    }
    target_response(&req.id, &rollup, target)
}

/// The engine is tolerant of any target; the API boundary is not.
fn parse_target_grade(params: &serde_json::Value) -> Result<f64, String> {
    let target = helpers::require_f64(params, "targetGrade")?;
    helpers::check_percent("targetGrade", target)?;
    Ok(target)
}

fn target_response(id: &str, items: &[GradedItem], target: f64) -> serde_json::Value {
    let calc = grades::required_average_on_remaining(items, target);
    ok(
        id,
        json!({
            "targetGrade": calc.target_grade,
            "currentAverage": calc.current_average,
            "requiredAverageOnRemaining": calc.required_average_on_remaining,
            "achievable": calc.achievable,
            "margin": calc.margin,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.module" => Some(handle_stats_module(state, req)),
        "stats.moduleTarget" => Some(handle_stats_module_target(state, req)),
        "stats.program" => Some(handle_stats_program(state, req)),
        "stats.programTarget" => Some(handle_stats_program_target(state, req)),
        _ => None,
    }
}
