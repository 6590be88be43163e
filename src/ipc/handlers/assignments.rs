use crate::db::{self, AssignmentFilter};
use crate::ipc::error::{err, ok, timetable_err};
use crate::ipc::helpers::{db_conn, now_ts, parse_opt_string, required_str};
use crate::ipc::types::{AppState, Request};
use crate::timetable::{Assignment, Day, DayStructure, TimeGrid, TimetableError};
use rusqlite::{params, Connection};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

const DEFAULT_COLOR: &str = "#4a6fa5";

const PATCHABLE_KEYS: [&str; 9] = [
    "day",
    "periodId",
    "subject",
    "teacherId",
    "teacherName",
    "room",
    "classId",
    "studentCount",
    "color",
];

fn required_field(obj: &Map<String, Value>, key: &str) -> Result<String, String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing {}", key))
}

fn optional_field(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    parse_opt_string(obj.get(key)).map_err(|m| format!("{} {}", key, m))
}

/// Builds an assignment from a camelCase JSON object. A blank teacher name is
/// resolved through `roster_name`, then falls back to the teacher id.
fn assignment_from_json(
    obj: &Map<String, Value>,
    id: String,
    roster_name: &dyn Fn(&str) -> Option<String>,
) -> Result<Assignment, String> {
    let day_raw = required_field(obj, "day")?;
    let day = Day::parse(&day_raw).ok_or_else(|| format!("unknown day: {}", day_raw))?;
    let teacher_id = required_field(obj, "teacherId")?;
    let teacher_name = match optional_field(obj, "teacherName")? {
        Some(n) => n,
        None => roster_name(&teacher_id).unwrap_or_else(|| teacher_id.clone()),
    };
    let student_count = match obj.get("studentCount") {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| "studentCount must be a non-negative integer".to_string())?,
    };
    Ok(Assignment {
        id,
        day,
        period_id: required_field(obj, "periodId")?,
        subject: required_field(obj, "subject")?,
        teacher_id,
        teacher_name,
        room: optional_field(obj, "room")?.unwrap_or_default(),
        class_id: required_field(obj, "classId")?,
        student_count,
        color: optional_field(obj, "color")?.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
    })
}

/// Name of the roster teacher for the id in `obj`, if the payload names a
/// teacher but no teacher name.
fn roster_name_for(
    conn: &Connection,
    obj: &Map<String, Value>,
    req: &Request,
) -> Result<Option<String>, Value> {
    let Some(teacher_id) = obj.get("teacherId").and_then(|v| v.as_str()).map(str::trim) else {
        return Ok(None);
    };
    if teacher_id.is_empty() || matches!(optional_field(obj, "teacherName"), Ok(Some(_))) {
        return Ok(None);
    }
    db::load_teacher(conn, teacher_id)
        .map(|t| t.map(|t| t.name))
        .map_err(|e| err(&req.id, "db_query_failed", format!("{e:#}"), None))
}

/// Places the assignments on an aggregate grid, which rejects unknown days,
/// unknown periods and breaks.
fn check_placement(structure: &DayStructure, assignments: &[Assignment]) -> Result<(), TimetableError> {
    TimeGrid::aggregate(structure, assignments.iter().cloned()).map(|_| ())
}

fn upsert_assignment(conn: &Connection, a: &Assignment, ts: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO assignments(
            id, day, period_id, subject, teacher_id, teacher_name, room, class_id,
            student_count, color, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            day = excluded.day,
            period_id = excluded.period_id,
            subject = excluded.subject,
            teacher_id = excluded.teacher_id,
            teacher_name = excluded.teacher_name,
            room = excluded.room,
            class_id = excluded.class_id,
            student_count = excluded.student_count,
            color = excluded.color,
            updated_at = excluded.updated_at",
        params![
            a.id,
            a.day.name(),
            a.period_id,
            a.subject,
            a.teacher_id,
            a.teacher_name,
            a.room,
            a.class_id,
            a.student_count as i64,
            a.color,
            ts,
            ts
        ],
    )
}

fn load_structure(conn: &Connection, req: &Request) -> Result<DayStructure, Value> {
    db::load_day_structure(conn)
        .map_err(|e| err(&req.id, "db_query_failed", format!("{e:#}"), None))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match parse_opt_string(req.params.get("classId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("classId {}", m), None),
    };
    let teacher_id = match parse_opt_string(req.params.get("teacherId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("teacherId {}", m), None),
    };
    let filter = AssignmentFilter {
        class_id: class_id.as_deref(),
        teacher_id: teacher_id.as_deref(),
        ..AssignmentFilter::default()
    };
    match db::list_assignments(conn, &filter) {
        Ok(rows) => ok(&req.id, json!({ "assignments": rows })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(obj) = req.params.as_object() else {
        return err(&req.id, "bad_params", "params must be an object", None);
    };
    let roster_name = match roster_name_for(conn, obj, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lookup = |_: &str| roster_name.clone();
    let assignment = match assignment_from_json(obj, Uuid::new_v4().to_string(), &lookup) {
        Ok(a) => a,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let structure = match load_structure(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    if let Err(e) = check_placement(&structure, std::slice::from_ref(&assignment)) {
        return timetable_err(&req.id, &e);
    }
    if let Err(e) = upsert_assignment(conn, &assignment, &now_ts()) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    info!(
        assignment_id = %assignment.id,
        class_id = %assignment.class_id,
        teacher_id = %assignment.teacher_id,
        "assignment created"
    );
    ok(&req.id, json!({ "assignment": assignment }))
}

fn handle_assignments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    if let Some(k) = patch.keys().find(|k| !PATCHABLE_KEYS.contains(&k.as_str())) {
        return err(&req.id, "bad_params", format!("unknown assignment field: {}", k), None);
    }

    let existing = match db::load_assignment(conn, &assignment_id) {
        Ok(Some(a)) => a,
        Ok(None) => return err(&req.id, "not_found", "assignment not found", None),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    let mut merged = match serde_json::to_value(&existing) {
        Ok(Value::Object(m)) => m,
        _ => return err(&req.id, "bad_params", "assignment is not representable", None),
    };
    // A new teacher without an explicit name picks up the roster name.
    if patch.contains_key("teacherId") && !patch.contains_key("teacherName") {
        merged.remove("teacherName");
    }
    for (k, v) in patch {
        merged.insert(k.clone(), v.clone());
    }

    let roster_name = match roster_name_for(conn, &merged, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lookup = |_: &str| roster_name.clone();
    let updated = match assignment_from_json(&merged, existing.id.clone(), &lookup) {
        Ok(a) => a,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let structure = match load_structure(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    if let Err(e) = check_placement(&structure, std::slice::from_ref(&updated)) {
        return timetable_err(&req.id, &e);
    }
    if let Err(e) = upsert_assignment(conn, &updated, &now_ts()) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!(assignment_id = %updated.id, "assignment updated");
    ok(&req.id, json!({ "assignment": updated }))
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute("DELETE FROM assignments WHERE id = ?", [&assignment_id]) {
        Ok(0) => err(&req.id, "not_found", "assignment not found", None),
        Ok(_) => {
            info!(assignment_id = %assignment_id, "assignment deleted");
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_assignments_bulk_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(rows) = req.params.get("assignments").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "assignments must be an array", None);
    };
    let replace = req
        .params
        .get("replace")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let roster: HashMap<String, String> = match db::list_teachers(conn, None) {
        Ok(ts) => ts.into_iter().map(|t| (t.id, t.name)).collect(),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    let lookup = |teacher_id: &str| roster.get(teacher_id).cloned();

    let mut parsed = Vec::with_capacity(rows.len());
    let mut seen = HashSet::new();
    for (index, row) in rows.iter().enumerate() {
        let Some(obj) = row.as_object() else {
            return err(
                &req.id,
                "bad_params",
                "each assignment must be an object",
                Some(json!({ "index": index })),
            );
        };
        let id = match optional_field(obj, "id") {
            Ok(Some(id)) => id,
            Ok(None) => Uuid::new_v4().to_string(),
            Err(m) => return err(&req.id, "bad_params", m, Some(json!({ "index": index }))),
        };
        if !seen.insert(id.clone()) {
            return err(
                &req.id,
                "bad_params",
                format!("duplicate assignment id: {}", id),
                Some(json!({ "index": index, "id": id })),
            );
        }
        match assignment_from_json(obj, id, &lookup) {
            Ok(a) => parsed.push(a),
            Err(m) => return err(&req.id, "bad_params", m, Some(json!({ "index": index }))),
        }
    }

    let structure = match load_structure(conn, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    if let Err(e) = check_placement(&structure, &parsed) {
        return timetable_err(&req.id, &e);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut removed = 0usize;
    if replace {
        removed = match tx.execute("DELETE FROM assignments", []) {
            Ok(n) => n,
            Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
        };
    }
    let ts = now_ts();
    let mut updated = 0usize;
    for a in &parsed {
        if !replace {
            match tx.query_row("SELECT COUNT(*) FROM assignments WHERE id = ?", [&a.id], |r| {
                r.get::<_, i64>(0)
            }) {
                Ok(n) if n > 0 => updated += 1,
                Ok(_) => {}
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
        }
        if let Err(e) = upsert_assignment(&tx, a, &ts) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "assignmentId": a.id })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    info!(imported = parsed.len(), updated, removed, replace, "assignments imported");
    ok(
        &req.id,
        json!({
            "imported": parsed.len(),
            "inserted": parsed.len() - updated,
            "updated": updated,
            "removed": removed,
            "replace": replace
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.update" => Some(handle_assignments_update(state, req)),
        "assignments.delete" => Some(handle_assignments_delete(state, req)),
        "assignments.bulkImport" => Some(handle_assignments_bulk_import(state, req)),
        _ => None,
    }
}
