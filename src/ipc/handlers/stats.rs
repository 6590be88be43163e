use crate::db;
use crate::ipc::error::{err, timetable_err};
use crate::ipc::helpers::{parse_opt_u32, required_str, with_target, with_view, ViewKind, ViewTarget};
use crate::ipc::types::{AppState, Request};
use crate::source::SqliteSource;
use crate::timetable::{
    department_overview, subject_counts, subject_distribution, teacher_utilization, RosterEntry,
};
use serde_json::json;

fn handle_teacher_utilization(state: &mut AppState, req: &Request) -> serde_json::Value {
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let max_periods = match req.params.get("maxPeriods") {
        Some(raw) => match parse_opt_u32(Some(raw)) {
            Ok(v) => v,
            Err(m) => return err(&req.id, "bad_params", format!("maxPeriods {}", m), None),
        },
        // Roster maximum; an unknown teacher has none and reports invalidMax.
        None => match state.db.as_ref().map(|c| db::load_teacher(c, &teacher_id)) {
            Some(Ok(t)) => t.and_then(|t| t.max_periods),
            Some(Err(e)) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
            None => None,
        },
    };

    let target = ViewTarget {
        kind: ViewKind::Teacher,
        id: teacher_id.clone(),
    };
    let source = SqliteSource::new(state.db.as_ref());
    with_target(
        &source,
        req,
        &target,
        json!({ "teacherId": teacher_id, "utilization": null }),
        |grid| {
            Ok(json!({
                "teacherId": teacher_id,
                "utilization": teacher_utilization(grid, max_periods)
            }))
        },
    )
}

fn handle_subject_distribution(state: &mut AppState, req: &Request) -> serde_json::Value {
    let source = SqliteSource::new(state.db.as_ref());
    with_view(
        &source,
        req,
        json!({ "distribution": {}, "subjects": [], "totalPeriods": 0 }),
        |grid| {
            Ok(json!({
                "distribution": subject_distribution(grid),
                "subjects": subject_counts(grid),
                "totalPeriods": grid.assignment_count()
            }))
        },
    )
}

fn handle_department_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let department_id = match required_str(req, "departmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = state.db.as_ref();
    let target = ViewTarget {
        kind: ViewKind::Department,
        id: department_id.clone(),
    };
    let source = SqliteSource::new(conn);
    with_target(
        &source,
        req,
        &target,
        json!({ "departmentId": department_id, "overview": null }),
        |grid| {
            let roster: Vec<RosterEntry> = match conn {
                Some(c) => db::list_teachers(c, Some(department_id.as_str()))
                    .map_err(|e| err(&req.id, "db_query_failed", format!("{e:#}"), None))?
                    .iter()
                    .map(db::Teacher::roster_entry)
                    .collect(),
                None => Vec::new(),
            };
            let overview =
                department_overview(grid, &roster).map_err(|e| timetable_err(&req.id, &e))?;
            Ok(json!({
                "departmentId": department_id,
                "overview": overview
            }))
        },
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.teacherUtilization" => Some(handle_teacher_utilization(state, req)),
        "stats.subjectDistribution" => Some(handle_subject_distribution(state, req)),
        "stats.departmentOverview" => Some(handle_department_overview(state, req)),
        _ => None,
    }
}
