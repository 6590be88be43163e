use chrono::{Local, NaiveDateTime};
use rusqlite::Connection;
use serde_json::{json, Value as JsonValue};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::ipc::error::{err, ok, timetable_err};
use crate::ipc::types::{AppState, Request};
use crate::source::{DataUnavailable, Scope, TimetableSource};
use crate::timetable::{project, TimeGrid, Viewpoint};

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn parse_opt_string(v: Option<&JsonValue>) -> Result<Option<String>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v.as_str().ok_or("must be string or null")?.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s.to_string()))
            }
        }
    }
}

pub fn parse_opt_u32(v: Option<&JsonValue>) -> Result<Option<u32>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or("must be a non-negative integer or null"),
    }
}

pub fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

/// `params.asOf` as a local datetime; the current local time when absent.
pub fn parse_as_of(req: &Request) -> Result<NaiveDateTime, JsonValue> {
    let raw = match parse_opt_string(req.params.get("asOf")) {
        Ok(v) => v,
        Err(m) => return Err(err(&req.id, "bad_params", format!("asOf {}", m), None)),
    };
    let Some(raw) = raw else {
        return Ok(Local::now().naive_local());
    };
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&raw, fmt).ok())
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "asOf must be YYYY-MM-DDTHH:MM[:SS]",
                Some(json!({ "asOf": raw })),
            )
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Student,
    Teacher,
    Department,
}

impl ViewKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            "department" => Some(Self::Department),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Department => "department",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewTarget {
    pub kind: ViewKind,
    pub id: String,
}

pub fn parse_view_target(req: &Request) -> Result<ViewTarget, JsonValue> {
    let kind_raw = required_str(req, "kind")?;
    let Some(kind) = ViewKind::parse(&kind_raw) else {
        return Err(err(
            &req.id,
            "bad_params",
            "kind must be student, teacher or department",
            Some(json!({ "kind": kind_raw })),
        ));
    };
    let id = required_str(req, "id")?;
    Ok(ViewTarget { kind, id })
}

fn tag(mut v: JsonValue, target: &ViewTarget, available: bool) -> JsonValue {
    if let Some(obj) = v.as_object_mut() {
        obj.insert("available".into(), json!(available));
        obj.insert("kind".into(), json!(target.kind.as_str()));
        obj.insert("id".into(), json!(target.id));
    }
    v
}

fn unavailable(req: &Request, target: &ViewTarget, e: &DataUnavailable, empty: JsonValue) -> JsonValue {
    warn!(method = %req.method, reason = e.reason(), "no schedule available");
    let mut v = tag(empty, target, false);
    if let Some(obj) = v.as_object_mut() {
        obj.insert("reason".into(), json!(e.reason()));
        obj.insert("message".into(), json!(e.to_string()));
    }
    ok(&req.id, v)
}

/// Loads the source grid for `params.kind`/`params.id`, projects it, and hands
/// the projection to `render`.
///
/// A source that cannot be read answers with `empty` marked `available: false`
/// instead of an error, so dashboards can show "no schedule available".
pub fn with_view<F>(
    source: &dyn TimetableSource,
    req: &Request,
    empty: JsonValue,
    render: F,
) -> JsonValue
where
    F: FnOnce(&TimeGrid<'_>) -> Result<JsonValue, JsonValue>,
{
    match parse_view_target(req) {
        Ok(target) => with_target(source, req, &target, empty, render),
        Err(e) => e,
    }
}

/// [`with_view`] for a target the handler has already resolved.
pub fn with_target<F>(
    source: &dyn TimetableSource,
    req: &Request,
    target: &ViewTarget,
    empty: JsonValue,
    render: F,
) -> JsonValue
where
    F: FnOnce(&TimeGrid<'_>) -> Result<JsonValue, JsonValue>,
{
    let structure = match source.day_structure() {
        Ok(s) => s,
        Err(e) => return unavailable(req, target, &e, empty),
    };
    let (scope, viewpoint) = match target.kind {
        ViewKind::Student => (
            Scope::Class(target.id.clone()),
            Viewpoint::Student {
                class_id: target.id.clone(),
            },
        ),
        ViewKind::Teacher => (
            Scope::Teacher(target.id.clone()),
            Viewpoint::Teacher {
                teacher_id: target.id.clone(),
            },
        ),
        ViewKind::Department => match source.department_subjects(&target.id) {
            Ok(Some(subjects)) => (
                Scope::Department(subjects.clone()),
                Viewpoint::Department { subjects },
            ),
            Ok(None) => return err(&req.id, "not_found", "department not found", None),
            Err(e) => return unavailable(req, target, &e, empty),
        },
    };
    let assignments = match source.fetch_timetable(&scope) {
        Ok(v) => v,
        Err(e) => return unavailable(req, target, &e, empty),
    };
    let grid = match TimeGrid::aggregate(&structure, assignments) {
        Ok(g) => g,
        Err(e) => return timetable_err(&req.id, &e),
    };
    let projected = match project(&grid, &viewpoint) {
        Ok(g) => g,
        Err(e) => return timetable_err(&req.id, &e),
    };
    match render(&projected) {
        Ok(v) => ok(&req.id, tag(v, target, true)),
        Err(e) => e,
    }
}
