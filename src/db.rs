use anyhow::{anyhow, Context};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::timetable::{Assignment, Day, DayStructure, PeriodSlot, RosterEntry};

pub const DB_FILE: &str = "timetable.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_days(
            day TEXT PRIMARY KEY,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS periods(
            id TEXT PRIMARY KEY,
            sort_order INTEGER NOT NULL,
            label TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            is_break INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subjects_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department_id TEXT,
            max_periods INTEGER,
            updated_at TEXT,
            FOREIGN KEY(department_id) REFERENCES departments(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_department ON teachers(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            day TEXT NOT NULL,
            period_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            teacher_name TEXT NOT NULL,
            room TEXT NOT NULL,
            class_id TEXT NOT NULL,
            student_count INTEGER NOT NULL,
            color TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class ON assignments(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_teacher ON assignments(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_slot ON assignments(day, period_id)",
        [],
    )?;

    seed_default_structure(&conn)?;
    Ok(conn)
}

fn seed_default_structure(conn: &Connection) -> anyhow::Result<()> {
    let day_count: i64 = conn.query_row("SELECT COUNT(*) FROM school_days", [], |r| r.get(0))?;
    let period_count: i64 = conn.query_row("SELECT COUNT(*) FROM periods", [], |r| r.get(0))?;
    if day_count > 0 && period_count > 0 {
        return Ok(());
    }
    info!("seeding default day structure");
    write_day_structure(conn, &DayStructure::default())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("settings {} is not JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        params![key, serde_json::to_string(value)?],
    )?;
    Ok(())
}

pub fn load_day_structure(conn: &Connection) -> anyhow::Result<DayStructure> {
    let mut stmt = conn.prepare("SELECT day FROM school_days ORDER BY sort_order")?;
    let raw_days = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut days = Vec::with_capacity(raw_days.len());
    for raw in raw_days {
        days.push(Day::parse(&raw).ok_or_else(|| anyhow!("stored day {:?} is not a weekday", raw))?);
    }

    let mut stmt = conn.prepare(
        "SELECT id, label, start_time, end_time, is_break
         FROM periods
         ORDER BY sort_order",
    )?;
    let raw_periods = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, i64>(4)? != 0,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut periods = Vec::with_capacity(raw_periods.len());
    for (id, label, start, end, is_break) in raw_periods {
        let slot = PeriodSlot::new(&id, &label, &start, &end, is_break)
            .ok_or_else(|| anyhow!("stored period {} has an unreadable time range", id))?;
        periods.push(slot);
    }

    let structure = DayStructure { days, periods };
    structure.validate().context("stored day structure is invalid")?;
    Ok(structure)
}

/// Replaces the stored days and periods. Callers wrap this in a transaction.
pub fn write_day_structure(conn: &Connection, structure: &DayStructure) -> anyhow::Result<()> {
    conn.execute("DELETE FROM school_days", [])?;
    conn.execute("DELETE FROM periods", [])?;
    for (i, d) in structure.days.iter().enumerate() {
        conn.execute(
            "INSERT INTO school_days(day, sort_order) VALUES(?, ?)",
            params![d.name(), i as i64],
        )?;
    }
    for (i, p) in structure.periods.iter().enumerate() {
        conn.execute(
            "INSERT INTO periods(id, sort_order, label, start_time, end_time, is_break)
             VALUES(?, ?, ?, ?, ?, ?)",
            params![
                p.id,
                i as i64,
                p.label,
                p.start.format("%H:%M").to_string(),
                p.end.format("%H:%M").to_string(),
                p.is_break as i64
            ],
        )?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter<'a> {
    pub id: Option<&'a str>,
    pub class_id: Option<&'a str>,
    pub teacher_id: Option<&'a str>,
    pub subjects: Option<&'a [String]>,
}

pub fn list_assignments(
    conn: &Connection,
    filter: &AssignmentFilter<'_>,
) -> anyhow::Result<Vec<Assignment>> {
    let mut sql = String::from(
        "SELECT id, day, period_id, subject, teacher_id, teacher_name, room, class_id, student_count, color
         FROM assignments
         WHERE 1 = 1",
    );
    let mut bind: Vec<String> = Vec::new();
    if let Some(id) = filter.id {
        sql.push_str(" AND id = ?");
        bind.push(id.to_string());
    }
    if let Some(c) = filter.class_id {
        sql.push_str(" AND class_id = ?");
        bind.push(c.to_string());
    }
    if let Some(t) = filter.teacher_id {
        sql.push_str(" AND teacher_id = ?");
        bind.push(t.to_string());
    }
    if let Some(subjects) = filter.subjects {
        if subjects.is_empty() {
            return Ok(Vec::new());
        }
        let marks = vec!["?"; subjects.len()].join(", ");
        sql.push_str(&format!(" AND subject IN ({})", marks));
        bind.extend(subjects.iter().cloned());
    }
    sql.push_str(" ORDER BY created_at, id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(bind.iter()), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                Assignment {
                    id: r.get(0)?,
                    day: Day::Monday,
                    period_id: r.get(2)?,
                    subject: r.get(3)?,
                    teacher_id: r.get(4)?,
                    teacher_name: r.get(5)?,
                    room: r.get(6)?,
                    class_id: r.get(7)?,
                    student_count: r.get::<_, i64>(8)?.max(0) as u32,
                    color: r.get(9)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, raw_day, mut a) in rows {
        a.day = Day::parse(&raw_day)
            .ok_or_else(|| anyhow!("assignment {} has unreadable day {:?}", id, raw_day))?;
        out.push(a);
    }
    Ok(out)
}

pub fn load_assignment(conn: &Connection, id: &str) -> anyhow::Result<Option<Assignment>> {
    let filter = AssignmentFilter {
        id: Some(id),
        ..AssignmentFilter::default()
    };
    Ok(list_assignments(conn, &filter)?.into_iter().next())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub name: String,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub department_id: Option<String>,
    pub max_periods: Option<u32>,
}

impl Teacher {
    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            teacher_id: self.id.clone(),
            name: self.name.clone(),
            max_periods: self.max_periods,
        }
    }
}

fn department_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Department> {
    let raw: String = r.get(2)?;
    let subjects = serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Department {
        id: r.get(0)?,
        name: r.get(1)?,
        subjects,
    })
}

fn teacher_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Teacher> {
    Ok(Teacher {
        id: r.get(0)?,
        name: r.get(1)?,
        department_id: r.get(2)?,
        max_periods: r.get::<_, Option<i64>>(3)?.map(|v| v.max(0) as u32),
    })
}

pub fn list_departments(conn: &Connection) -> anyhow::Result<Vec<Department>> {
    let mut stmt = conn.prepare("SELECT id, name, subjects_json FROM departments ORDER BY name, id")?;
    let rows = stmt
        .query_map([], department_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_department(conn: &Connection, id: &str) -> anyhow::Result<Option<Department>> {
    Ok(conn
        .query_row(
            "SELECT id, name, subjects_json FROM departments WHERE id = ?",
            [id],
            department_from_row,
        )
        .optional()?)
}

pub fn list_teachers(conn: &Connection, department_id: Option<&str>) -> anyhow::Result<Vec<Teacher>> {
    let rows = match department_id {
        Some(d) => {
            let mut stmt = conn.prepare(
                "SELECT id, name, department_id, max_periods FROM teachers
                 WHERE department_id = ?
                 ORDER BY name, id",
            )?;
            let rows = stmt
                .query_map([d], teacher_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, name, department_id, max_periods FROM teachers ORDER BY name, id",
            )?;
            let rows = stmt
                .query_map([], teacher_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn load_teacher(conn: &Connection, id: &str) -> anyhow::Result<Option<Teacher>> {
    Ok(conn
        .query_row(
            "SELECT id, name, department_id, max_periods FROM teachers WHERE id = ?",
            [id],
            teacher_from_row,
        )
        .optional()?)
}
