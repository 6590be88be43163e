use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeSet;

use super::error::{ConflictOwner, ScheduleConflictError, TimetableError};
use super::grid::{GridKind, TimeGrid};
use super::model::{minutes_since_midnight, Assignment, Day, PeriodSlot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewpoint {
    Student { class_id: String },
    Teacher { teacher_id: String },
    Department { subjects: BTreeSet<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledClass {
    pub day: Day,
    pub period: PeriodSlot,
    pub time_range: String,
    pub assignment: Assignment,
    /// Teacher name in a student view, class in a teacher view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingClass {
    #[serde(flatten)]
    pub scheduled: ScheduledClass,
    pub minutes_until: i64,
}

pub fn project_for_student<'a>(
    source: &TimeGrid<'a>,
    class_id: &str,
) -> Result<TimeGrid<'a>, TimetableError> {
    source.filtered(
        GridKind::Personal(ConflictOwner::Student(class_id.to_string())),
        |a| a.class_id == class_id,
    )
}

pub fn project_for_teacher<'a>(
    source: &TimeGrid<'a>,
    teacher_id: &str,
) -> Result<TimeGrid<'a>, TimetableError> {
    source.filtered(
        GridKind::Personal(ConflictOwner::Teacher(teacher_id.to_string())),
        |a| a.teacher_id == teacher_id,
    )
}

pub fn project_for_department<'a>(
    source: &TimeGrid<'a>,
    subjects: &BTreeSet<String>,
) -> TimeGrid<'a> {
    // Aggregate grids have no cardinality check, and the source cells are already validated.
    source
        .filtered(GridKind::Aggregate, |a| subjects.contains(&a.subject))
        .unwrap_or_else(|_| TimeGrid::empty(source.structure()))
}

pub fn project<'a>(
    source: &TimeGrid<'a>,
    viewpoint: &Viewpoint,
) -> Result<TimeGrid<'a>, TimetableError> {
    match viewpoint {
        Viewpoint::Student { class_id } => project_for_student(source, class_id),
        Viewpoint::Teacher { teacher_id } => project_for_teacher(source, teacher_id),
        Viewpoint::Department { subjects } => Ok(project_for_department(source, subjects)),
    }
}

fn counterpart(kind: &GridKind, a: &Assignment) -> Option<String> {
    match kind {
        GridKind::Personal(ConflictOwner::Student(_)) => Some(a.teacher_name.clone()),
        GridKind::Personal(ConflictOwner::Teacher(_)) => Some(a.class_id.clone()),
        GridKind::Aggregate => None,
    }
}

fn schedule_for_day(grid: &TimeGrid<'_>, day: Day) -> Vec<ScheduledClass> {
    let mut out = Vec::new();
    for cell in grid.day_cells(day) {
        if cell.period.is_break {
            continue;
        }
        for a in cell.assignments {
            out.push(ScheduledClass {
                day,
                period: cell.period.clone(),
                time_range: cell.period.time_range(),
                assignment: a.clone(),
                with: counterpart(grid.kind(), a),
            });
        }
    }
    out
}

/// Classes on `now`'s weekday in period order; empty on non-school days.
pub fn today_schedule(grid: &TimeGrid<'_>, now: NaiveDateTime) -> Vec<ScheduledClass> {
    schedule_for_day(grid, Day::from_weekday(now.weekday()))
}

/// First configured school day after `now`'s weekday (wrapping), with its schedule.
pub fn next_school_day_schedule(
    grid: &TimeGrid<'_>,
    now: NaiveDateTime,
) -> Option<(Day, Vec<ScheduledClass>)> {
    let days = &grid.structure().days;
    let today = Day::from_weekday(now.weekday());
    let start = Day::ALL.iter().position(|d| *d == today)?;
    (1..=7)
        .map(|offset| Day::ALL[(start + offset) % 7])
        .find(|d| days.contains(d))
        .map(|d| (d, schedule_for_day(grid, d)))
}

pub fn upcoming_classes(
    grid: &TimeGrid<'_>,
    now: NaiveDateTime,
    limit: usize,
) -> Vec<UpcomingClass> {
    let now_minutes = minutes_since_midnight(now.time());
    let mut out: Vec<UpcomingClass> = today_schedule(grid, now)
        .into_iter()
        .filter(|s| s.period.start_minutes() > now_minutes)
        .map(|s| UpcomingClass {
            minutes_until: s.period.start_minutes() - now_minutes,
            scheduled: s,
        })
        .collect();
    // Already in period order; periods are validated to be ascending in time.
    out.truncate(limit);
    out
}

pub fn next_class(grid: &TimeGrid<'_>, now: NaiveDateTime) -> Option<UpcomingClass> {
    upcoming_classes(grid, now, 1).into_iter().next()
}

/// Every personal-view conflict in a school grid, classes first, then teachers.
pub fn find_conflicts(source: &TimeGrid<'_>) -> Vec<ScheduleConflictError> {
    let classes: BTreeSet<&str> = source.assignments().map(|a| a.class_id.as_str()).collect();
    let teachers: BTreeSet<&str> = source
        .assignments()
        .map(|a| a.teacher_id.as_str())
        .collect();

    let mut out = Vec::new();
    for class_id in classes {
        if let Err(TimetableError::Conflict(c)) = project_for_student(source, class_id) {
            out.push(c);
        }
    }
    for teacher_id in teachers {
        if let Err(TimetableError::Conflict(c)) = project_for_teacher(source, teacher_id) {
            out.push(c);
        }
    }
    out
}
