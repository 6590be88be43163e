use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::timetable_setup;
use crate::ipc::helpers::{db_conn, now_ts, parse_opt_string, parse_opt_u32, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::params;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let department_id = match parse_opt_string(req.params.get("departmentId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("departmentId {}", m), None),
    };
    match db::list_teachers(conn, department_id.as_deref()) {
        Ok(teachers) => ok(&req.id, json!({ "teachers": teachers })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_teachers_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match parse_opt_string(req.params.get("id")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("id {}", m), None),
    };
    let department_id = match parse_opt_string(req.params.get("departmentId")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("departmentId {}", m), None),
    };
    let max_param = req.params.get("maxPeriods");
    let max_periods = match parse_opt_u32(max_param) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("maxPeriods {}", m), None),
    };

    if let Some(d) = department_id.as_deref() {
        match db::load_department(conn, d) {
            Ok(Some(_)) => {}
            Ok(None) => return err(&req.id, "not_found", "department not found", None),
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
        }
    }

    let existing = match id.as_deref() {
        Some(id) => match db::load_teacher(conn, id) {
            Ok(t) => t,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
        },
        None => None,
    };
    // Absent keeps the current value (or the setup default for a new teacher); null clears it.
    let max_periods = match (max_param, &existing) {
        (Some(_), _) => max_periods,
        (None, Some(t)) => t.max_periods,
        (None, None) => Some(timetable_setup(Some(conn)).default_teacher_max_periods),
    };

    let teacher = db::Teacher {
        id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        name,
        department_id,
        max_periods,
    };
    let res = conn.execute(
        "INSERT INTO teachers(id, name, department_id, max_periods, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           department_id = excluded.department_id,
           max_periods = excluded.max_periods,
           updated_at = excluded.updated_at",
        params![
            teacher.id,
            teacher.name,
            teacher.department_id,
            teacher.max_periods.map(i64::from),
            now_ts()
        ],
    );
    if let Err(e) = res {
        let code = if existing.is_some() {
            "db_update_failed"
        } else {
            "db_insert_failed"
        };
        return err(&req.id, code, e.to_string(), None);
    }
    info!(
        teacher_id = %teacher.id,
        created = existing.is_none(),
        "teacher saved"
    );
    ok(&req.id, json!({ "teacher": teacher }))
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Assignments keep their teacher id and name; only the roster entry goes.
    match conn.execute("DELETE FROM teachers WHERE id = ?", [&teacher_id]) {
        Ok(0) => err(&req.id, "not_found", "teacher not found", None),
        Ok(_) => {
            info!(teacher_id = %teacher_id, "teacher deleted");
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_departments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::list_departments(conn) {
        Ok(departments) => ok(&req.id, json!({ "departments": departments })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn parse_subjects(v: Option<&serde_json::Value>) -> Result<Vec<String>, &'static str> {
    let Some(arr) = v.and_then(|v| v.as_array()) else {
        return Err("subjects must be an array of strings");
    };
    let mut set = BTreeSet::new();
    for s in arr {
        let s = s.as_str().ok_or("subjects must be an array of strings")?.trim();
        if !s.is_empty() {
            set.insert(s.to_string());
        }
    }
    Ok(set.into_iter().collect())
}

fn handle_departments_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match parse_opt_string(req.params.get("id")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("id {}", m), None),
    };
    let subjects = match parse_subjects(req.params.get("subjects")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    let subjects_json = match serde_json::to_string(&subjects) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    let department = db::Department {
        id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        name,
        subjects,
    };
    if let Err(e) = conn.execute(
        "INSERT INTO departments(id, name, subjects_json) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           subjects_json = excluded.subjects_json",
        params![department.id, department.name, subjects_json],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    info!(
        department_id = %department.id,
        subjects = department.subjects.len(),
        "department saved"
    );
    ok(&req.id, json!({ "department": department }))
}

fn handle_departments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let department_id = match required_str(req, "departmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Teachers in the department are detached by the foreign key.
    match conn.execute("DELETE FROM departments WHERE id = ?", [&department_id]) {
        Ok(0) => err(&req.id, "not_found", "department not found", None),
        Ok(_) => {
            info!(department_id = %department_id, "department deleted");
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.upsert" => Some(handle_teachers_upsert(state, req)),
        "teachers.delete" => Some(handle_teachers_delete(state, req)),
        "departments.list" => Some(handle_departments_list(state, req)),
        "departments.upsert" => Some(handle_departments_upsert(state, req)),
        "departments.delete" => Some(handle_departments_delete(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_are_trimmed_deduplicated_and_sorted() {
        let v = json!(["Physics", " Chemistry ", "", "Physics"]);
        assert_eq!(
            parse_subjects(Some(&v)).expect("valid"),
            vec!["Chemistry".to_string(), "Physics".to_string()]
        );
        assert!(parse_subjects(Some(&json!("Physics"))).is_err());
        assert!(parse_subjects(None).is_err());
    }
}
