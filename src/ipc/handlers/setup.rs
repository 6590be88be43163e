use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Timetable,
    Roster,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [SetupSection::Timetable, SetupSection::Roster];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "timetable" => Some(Self::Timetable),
            "roster" => Some(Self::Roster),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Timetable => "timetable",
            Self::Roster => "roster",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Timetable => "setup.timetable",
            Self::Roster => "setup.roster",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Timetable => json!({
            "upcomingLimit": 3,
            "weekendFallback": false
        }),
        SetupSection::Roster => json!({
            "defaultTeacherMaxPeriods": 30
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Timetable => match k.as_str() {
                "upcomingLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 20)?));
                }
                "weekendFallback" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown timetable field: {}", k)),
            },
            SetupSection::Roster => match k.as_str() {
                "defaultTeacherMaxPeriods" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 80)?));
                }
                _ => return Err(format!("unknown roster field: {}", k)),
            },
        }
    }
    Ok(())
}

/// Stored values merged over the defaults, so new keys always have a value.
fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut merged = default_section(section);
    if let Some(Value::Object(stored)) = db::settings_get_json(conn, section.key())? {
        if let Some(obj) = merged.as_object_mut() {
            for (k, v) in stored {
                if obj.contains_key(&k) {
                    obj.insert(k, v);
                }
            }
        }
    }
    Ok(merged)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimetableSetup {
    pub upcoming_limit: usize,
    pub weekend_fallback: bool,
    pub default_teacher_max_periods: u32,
}

impl Default for TimetableSetup {
    fn default() -> Self {
        Self {
            upcoming_limit: 3,
            weekend_fallback: false,
            default_teacher_max_periods: 30,
        }
    }
}

/// Typed view of the setup sections; defaults when no workspace is open.
pub fn timetable_setup(conn: Option<&Connection>) -> TimetableSetup {
    let defaults = TimetableSetup::default();
    let Some(conn) = conn else {
        return defaults;
    };
    let timetable = load_section(conn, SetupSection::Timetable).unwrap_or_else(|_| {
        default_section(SetupSection::Timetable)
    });
    let roster =
        load_section(conn, SetupSection::Roster).unwrap_or_else(|_| default_section(SetupSection::Roster));
    TimetableSetup {
        upcoming_limit: timetable
            .get("upcomingLimit")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(defaults.upcoming_limit),
        weekend_fallback: timetable
            .get("weekendFallback")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.weekend_fallback),
        default_teacher_max_periods: roster
            .get("defaultTeacherMaxPeriods")
            .and_then(|v| v.as_u64())
            .map(|n| n as u32)
            .unwrap_or(defaults.default_teacher_max_periods),
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let sections: Vec<SetupSection> = match req.params.get("section").and_then(|v| v.as_str()) {
        Some(raw) => match SetupSection::parse(raw) {
            Some(s) => vec![s],
            None => return err(&req.id, "bad_params", "unknown section", None),
        },
        None => SetupSection::ALL.to_vec(),
    };

    let mut out = Map::new();
    for s in sections {
        match load_section(conn, s) {
            Ok(v) => {
                out.insert(s.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!(section = section.name(), "setup updated");
    ok(&req.id, json!({ "section": section.name(), "values": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
