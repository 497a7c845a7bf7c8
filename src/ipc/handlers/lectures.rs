use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct LectureRow {
    id: String,
    module_id: String,
    title: String,
    location: Option<String>,
    day_of_week: i64,
    start_time: String,
    end_time: String,
    recurrence_start_date: String,
    recurrence_end_date: String,
    notes: Option<String>,
    created_at: String,
}

/// Weekly occurrences of `day_of_week` (Monday = 0) inside the closed
/// recurrence window.
fn weekly_occurrences(day_of_week: i64, start: NaiveDate, end: NaiveDate) -> i64 {
    let start_dow = i64::from(start.weekday().num_days_from_monday());
    let offset = (day_of_week - start_dow).rem_euclid(7);
    let first = start + Duration::days(offset);
    if first > end {
        0
    } else {
        (end - first).num_days() / 7 + 1
    }
}

fn lecture_json(l: &LectureRow) -> serde_json::Value {
    let occurrences = match (
        helpers::parse_date("recurrenceStartDate", &l.recurrence_start_date),
        helpers::parse_date("recurrenceEndDate", &l.recurrence_end_date),
    ) {
        (Ok(start), Ok(end)) => Some(weekly_occurrences(l.day_of_week, start, end)),
        _ => None,
    };
    json!({
        "id": l.id,
        "moduleId": l.module_id,
        "title": l.title,
        "location": l.location,
        "dayOfWeek": l.day_of_week,
        "startTime": l.start_time,
        "endTime": l.end_time,
        "recurrenceStartDate": l.recurrence_start_date,
        "recurrenceEndDate": l.recurrence_end_date,
        "notes": l.notes,
        "occurrences": occurrences,
        "createdAt": l.created_at,
    })
}

fn load_lecture(conn: &Connection, id: &str) -> Result<Option<LectureRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, module_id, title, location, day_of_week, start_time, end_time,
                recurrence_start_date, recurrence_end_date, notes, created_at
         FROM lectures
         WHERE id = ?",
        [id],
        |r| {
            Ok(LectureRow {
                id: r.get(0)?,
                module_id: r.get(1)?,
                title: r.get(2)?,
                location: r.get(3)?,
                day_of_week: r.get(4)?,
                start_time: r.get(5)?,
                end_time: r.get(6)?,
                recurrence_start_date: r.get(7)?,
                recurrence_end_date: r.get(8)?,
                notes: r.get(9)?,
                created_at: r.get(10)?,
            })
        },
    )
    .optional()
}

struct LectureFields {
    title: Option<String>,
    location: Option<String>,
    day_of_week: Option<i64>,
    start_time: Option<String>,
    end_time: Option<String>,
    recurrence_start_date: Option<String>,
    recurrence_end_date: Option<String>,
    notes: Option<String>,
}

fn parse_lecture_fields(params: &serde_json::Value) -> Result<LectureFields, String> {
    let fields = LectureFields {
        title: helpers::opt_str(params, "title")?,
        location: helpers::opt_str(params, "location")?,
        day_of_week: helpers::opt_i64(params, "dayOfWeek")?,
        start_time: helpers::opt_str(params, "startTime")?,
        end_time: helpers::opt_str(params, "endTime")?,
        recurrence_start_date: helpers::opt_str(params, "recurrenceStartDate")?,
        recurrence_end_date: helpers::opt_str(params, "recurrenceEndDate")?,
        notes: helpers::opt_str(params, "notes")?,
    };

    if let Some(d) = fields.day_of_week {
        if !(0..=6).contains(&d) {
            return Err("dayOfWeek must be between 0 (Monday) and 6 (Sunday)".to_string());
        }
    }
    if let Some(t) = &fields.start_time {
        helpers::parse_time("startTime", t)?;
    }
    if let Some(t) = &fields.end_time {
        helpers::parse_time("endTime", t)?;
    }
    if let Some(d) = &fields.recurrence_start_date {
        helpers::parse_date("recurrenceStartDate", d)?;
    }
    if let Some(d) = &fields.recurrence_end_date {
        helpers::parse_date("recurrenceEndDate", d)?;
    }
    Ok(fields)
}

fn check_lecture_ordering(
    start_time: &str,
    end_time: &str,
    start_date: &str,
    end_date: &str,
) -> Result<(), String> {
    let st = helpers::parse_time("startTime", start_time)?;
    let et = helpers::parse_time("endTime", end_time)?;
    if et <= st {
        return Err("endTime must be after startTime".to_string());
    }
    let sd = helpers::parse_date("recurrenceStartDate", start_date)?;
    let ed = helpers::parse_date("recurrenceEndDate", end_date)?;
    if ed < sd {
        return Err("recurrenceEndDate must be on or after recurrenceStartDate".to_string());
    }
    Ok(())
}

fn handle_lectures_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let module_id = match helpers::require_str(&req.params, "moduleId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, module_id, title, location, day_of_week, start_time, end_time,
                recurrence_start_date, recurrence_end_date, notes, created_at
         FROM lectures
         WHERE module_id = ?
         ORDER BY day_of_week, start_time",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&module_id], |r| {
            Ok(LectureRow {
                id: r.get(0)?,
                module_id: r.get(1)?,
                title: r.get(2)?,
                location: r.get(3)?,
                day_of_week: r.get(4)?,
                start_time: r.get(5)?,
                end_time: r.get(6)?,
                recurrence_start_date: r.get(7)?,
                recurrence_end_date: r.get(8)?,
                notes: r.get(9)?,
                created_at: r.get(10)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(items) => {
            let lectures: Vec<serde_json::Value> = items.iter().map(lecture_json).collect();
            ok(&req.id, json!({ "lectures": lectures }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_lectures_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let module_id = match helpers::require_str(&req.params, "moduleId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let fields = match parse_lecture_fields(&req.params) {
        Ok(f) => f,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let Some(title) = fields.title else {
        return err(&req.id, "bad_params", "missing title", None);
    };
    let Some(day_of_week) = fields.day_of_week else {
        return err(&req.id, "bad_params", "missing dayOfWeek", None);
    };
    let (Some(start_time), Some(end_time)) = (fields.start_time, fields.end_time) else {
        return err(&req.id, "bad_params", "missing startTime or endTime", None);
    };
    let (Some(start_date), Some(end_date)) =
        (fields.recurrence_start_date, fields.recurrence_end_date)
    else {
        return err(
            &req.id,
            "bad_params",
            "missing recurrenceStartDate or recurrenceEndDate",
            None,
        );
    };
    if let Err(m) = check_lecture_ordering(&start_time, &end_time, &start_date, &end_date) {
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

    let lecture_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO lectures(id, module_id, title, location, day_of_week, start_time,
                              end_time, recurrence_start_date, recurrence_end_date,
                              notes, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &lecture_id,
            &module_id,
            &title,
            &fields.location,
            day_of_week,
            &start_time,
            &end_time,
            &start_date,
            &end_date,
            &fields.notes,
            &created_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "lectures" })),
        );
    }

    match load_lecture(conn, &lecture_id) {
        Ok(Some(l)) => ok(&req.id, json!({ "lecture": lecture_json(&l) })),
        Ok(None) => err(&req.id, "not_found", "lecture not found after insert", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_lectures_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let lecture_id = match helpers::require_str(&req.params, "lectureId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    match load_lecture(conn, &lecture_id) {
        Ok(Some(l)) => ok(&req.id, json!({ "lecture": lecture_json(&l) })),
        Ok(None) => err(&req.id, "not_found", "lecture not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_lectures_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let lecture_id = match helpers::require_str(&req.params, "lectureId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let fields = match parse_lecture_fields(&req.params) {
        Ok(f) => f,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let current = match load_lecture(conn, &lecture_id) {
        Ok(Some(l)) => l,
        Ok(None) => return err(&req.id, "not_found", "lecture not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let merged = LectureRow {
        id: current.id,
        module_id: current.module_id,
        title: fields.title.unwrap_or(current.title),
        location: fields.location.or(current.location),
        day_of_week: fields.day_of_week.unwrap_or(current.day_of_week),
        start_time: fields.start_time.unwrap_or(current.start_time),
        end_time: fields.end_time.unwrap_or(current.end_time),
        recurrence_start_date: fields
            .recurrence_start_date
            .unwrap_or(current.recurrence_start_date),
        recurrence_end_date: fields
            .recurrence_end_date
            .unwrap_or(current.recurrence_end_date),
        notes: fields.notes.or(current.notes),
        created_at: current.created_at,
    };
    if let Err(m) = check_lecture_ordering(
        &merged.start_time,
        &merged.end_time,
        &merged.recurrence_start_date,
        &merged.recurrence_end_date,
    ) {
        return err(&req.id, "bad_params", m, None);
    }

    if let Err(e) = conn.execute(
        "UPDATE lectures
         SET title = ?, location = ?, day_of_week = ?, start_time = ?, end_time = ?,
             recurrence_start_date = ?, recurrence_end_date = ?, notes = ?
         WHERE id = ?",
        (
            &merged.title,
            &merged.location,
            merged.day_of_week,
            &merged.start_time,
            &merged.end_time,
            &merged.recurrence_start_date,
            &merged.recurrence_end_date,
            &merged.notes,
            &merged.id,
        ),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "lectures" })),
        );
    }

    ok(&req.id, json!({ "lecture": lecture_json(&merged) }))
}

fn handle_lectures_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let lecture_id = match helpers::require_str(&req.params, "lectureId") {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };

    let affected = match conn.execute("DELETE FROM lectures WHERE id = ?", [&lecture_id]) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "lectures" })),
            )
        }
    };
    if affected == 0 {
        return err(&req.id, "not_found", "lecture not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "lectures.list" => Some(handle_lectures_list(state, req)),
        "lectures.create" => Some(handle_lectures_create(state, req)),
        "lectures.get" => Some(handle_lectures_get(state, req)),
        "lectures.update" => Some(handle_lectures_update(state, req)),
        "lectures.delete" => Some(handle_lectures_delete(state, req)),
        _ => None,
    }
}
