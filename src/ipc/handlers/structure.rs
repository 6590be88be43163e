use crate::db::{self, AssignmentFilter};
use crate::ipc::error::{err, ok, timetable_err};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use crate::timetable::{Day, DayStructure, PeriodSlot};
use serde_json::json;
use tracing::info;

fn handle_structure_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match db::load_day_structure(conn) {
        Ok(s) => ok(
            &req.id,
            json!({
                "structure": s,
                "teachingPeriodsPerWeek": s.teaching_periods_per_week(),
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn parse_structure(params: &serde_json::Value) -> Result<DayStructure, String> {
    let Some(days_raw) = params.get("days").and_then(|v| v.as_array()) else {
        return Err("days must be an array of weekday names".to_string());
    };
    let mut days = Vec::with_capacity(days_raw.len());
    for v in days_raw {
        let Some(s) = v.as_str() else {
            return Err("days must be an array of weekday names".to_string());
        };
        days.push(Day::parse(s).ok_or_else(|| format!("unknown day: {}", s))?);
    }
    let periods_raw = params
        .get("periods")
        .cloned()
        .ok_or_else(|| "missing periods".to_string())?;
    let periods: Vec<PeriodSlot> =
        serde_json::from_value(periods_raw).map_err(|e| format!("periods: {}", e))?;
    Ok(DayStructure { days, periods })
}

/// Assignments that would no longer fit `next`: removed day, removed period, or now a break.
fn orphaned_assignment_ids(
    conn: &rusqlite::Connection,
    next: &DayStructure,
) -> anyhow::Result<Vec<String>> {
    let all = db::list_assignments(conn, &AssignmentFilter::default())?;
    Ok(all
        .into_iter()
        .filter(|a| {
            next.day_index(a.day).is_none()
                || next.period(&a.period_id).map(|p| p.is_break).unwrap_or(true)
        })
        .map(|a| a.id)
        .collect())
}

fn handle_structure_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let next = match parse_structure(&req.params) {
        Ok(s) => s,
        Err(m) => return err(&req.id, "bad_params", m, None),
    };
    if let Err(e) = next.validate() {
        return timetable_err(&req.id, &e);
    }

    let orphaned = match orphaned_assignment_ids(conn, &next) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    if !orphaned.is_empty() {
        return err(
            &req.id,
            "structure_in_use",
            format!(
                "{} assignment(s) would be left on a removed day, removed period, or break",
                orphaned.len()
            ),
            Some(json!({ "assignmentIds": orphaned })),
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = db::write_day_structure(&tx, &next) {
        return err(&req.id, "db_update_failed", format!("{e:#}"), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    info!(
        days = next.days.len(),
        periods = next.periods.len(),
        "day structure replaced"
    );
    ok(&req.id, json!({ "structure": next }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "structure.get" => Some(handle_structure_get(state, req)),
        "structure.update" => Some(handle_structure_update(state, req)),
        _ => None,
    }
}
