use crate::ipc::error::{err, ok, timetable_err};
use crate::ipc::handlers::setup::timetable_setup;
use crate::ipc::helpers::{parse_as_of, parse_opt_u32, required_str, with_view};
use crate::ipc::types::{AppState, Request};
use crate::source::{Scope, SqliteSource, TimetableSource};
use crate::timetable::{
    find_conflicts, next_class, next_school_day_schedule, today_schedule, upcoming_classes, Day,
    TimeGrid,
};
use chrono::Datelike;
use serde_json::json;
use tracing::warn;

fn handle_timetable_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let source = SqliteSource::new(state.db.as_ref());
    with_view(&source, req, json!({ "grid": null }), |grid| {
        Ok(json!({ "grid": grid.snapshot() }))
    })
}

fn handle_timetable_slot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let day_raw = match required_str(req, "day") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(day) = Day::parse(&day_raw) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown day: {}", day_raw),
            Some(json!({ "day": day_raw })),
        );
    };
    let period_id = match required_str(req, "periodId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let source = SqliteSource::new(state.db.as_ref());
    with_view(
        &source,
        req,
        json!({ "day": day, "periodId": period_id, "isBreak": false, "assignments": [] }),
        |grid| {
            Ok(json!({
                "day": day,
                "periodId": period_id,
                "isBreak": grid.is_break(&period_id),
                "assignments": grid.get_slot(day, &period_id)
            }))
        },
    )
}

fn handle_timetable_today(state: &mut AppState, req: &Request) -> serde_json::Value {
    let now = match parse_as_of(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let setup = timetable_setup(state.db.as_ref());
    let today = Day::from_weekday(now.weekday());
    let source = SqliteSource::new(state.db.as_ref());
    with_view(
        &source,
        req,
        json!({ "day": today, "schoolDay": false, "classes": [] }),
        |grid| {
            let school_day = grid.structure().days.contains(&today);
            if !school_day && setup.weekend_fallback {
                if let Some((day, classes)) = next_school_day_schedule(grid, now) {
                    return Ok(json!({
                        "day": day,
                        "schoolDay": false,
                        "fallback": true,
                        "classes": classes
                    }));
                }
            }
            Ok(json!({
                "day": today,
                "schoolDay": school_day,
                "classes": today_schedule(grid, now)
            }))
        },
    )
}

fn handle_timetable_upcoming(state: &mut AppState, req: &Request) -> serde_json::Value {
    let now = match parse_as_of(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let limit = match parse_opt_u32(req.params.get("limit")) {
        Ok(Some(n)) => n as usize,
        Ok(None) => timetable_setup(state.db.as_ref()).upcoming_limit,
        Err(m) => return err(&req.id, "bad_params", format!("limit {}", m), None),
    };
    let source = SqliteSource::new(state.db.as_ref());
    with_view(&source, req, json!({ "classes": [] }), |grid| {
        Ok(json!({ "classes": upcoming_classes(grid, now, limit) }))
    })
}

fn handle_timetable_next_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let now = match parse_as_of(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let source = SqliteSource::new(state.db.as_ref());
    with_view(&source, req, json!({ "next": null }), |grid| {
        Ok(json!({ "next": next_class(grid, now) }))
    })
}

fn handle_timetable_conflicts(state: &mut AppState, req: &Request) -> serde_json::Value {
    let source = SqliteSource::new(state.db.as_ref());
    let loaded = source
        .day_structure()
        .and_then(|s| Ok((source.fetch_timetable(&Scope::School)?, s)));
    let (assignments, structure) = match loaded {
        Ok(v) => v,
        Err(e) => {
            warn!(reason = e.reason(), "conflict scan skipped");
            return ok(
                &req.id,
                json!({
                    "available": false,
                    "reason": e.reason(),
                    "message": e.to_string(),
                    "conflicts": []
                }),
            );
        }
    };
    let grid = match TimeGrid::aggregate(&structure, assignments) {
        Ok(g) => g,
        Err(e) => return timetable_err(&req.id, &e),
    };
    let conflicts = find_conflicts(&grid);
    if !conflicts.is_empty() {
        warn!(count = conflicts.len(), "timetable has double-booked slots");
    }
    ok(
        &req.id,
        json!({
            "available": true,
            "count": conflicts.len(),
            "conflicts": conflicts
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.view" => Some(handle_timetable_view(state, req)),
        "timetable.slot" => Some(handle_timetable_slot(state, req)),
        "timetable.today" => Some(handle_timetable_today(state, req)),
        "timetable.upcoming" => Some(handle_timetable_upcoming(state, req)),
        "timetable.nextClass" => Some(handle_timetable_next_class(state, req)),
        "timetable.conflicts" => Some(handle_timetable_conflicts(state, req)),
        _ => None,
    }
}
