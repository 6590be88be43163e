use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use super::error::TimetableError;
use super::grid::TimeGrid;
use super::query::project_for_teacher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationStat {
    pub assigned_periods: u32,
    pub max_periods: Option<u32>,
    pub percentage: u32,
    pub invalid_max: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectCount {
    pub subject: String,
    pub period_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub teacher_id: String,
    pub name: String,
    pub max_periods: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherUtilization {
    pub teacher_id: String,
    pub name: String,
    #[serde(flatten)]
    pub stat: UtilizationStat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentOverview {
    pub total_periods: u32,
    pub per_subject_counts: Vec<SubjectCount>,
    pub per_teacher_utilization: Vec<TeacherUtilization>,
    pub average_utilization: u32,
    pub invalid_teacher_count: u32,
}

fn rounded_percent(part: u32, whole: u32) -> u32 {
    ((f64::from(part) * 100.0) / f64::from(whole)).round() as u32
}

/// Share of `max_periods` that the grid's occupied teaching slots represent.
///
/// A missing or zero maximum yields `percentage: 0` with `invalid_max` set.
pub fn teacher_utilization(grid: &TimeGrid<'_>, max_periods: Option<u32>) -> UtilizationStat {
    let assigned = grid.occupied_slot_count() as u32;
    match max_periods {
        Some(max) if max > 0 => UtilizationStat {
            assigned_periods: assigned,
            max_periods: Some(max),
            percentage: rounded_percent(assigned, max),
            invalid_max: false,
        },
        other => {
            warn!(
                assigned_periods = assigned,
                max_periods = ?other,
                "utilization requested without a usable max period count"
            );
            UtilizationStat {
                assigned_periods: assigned,
                max_periods: other,
                percentage: 0,
                invalid_max: true,
            }
        }
    }
}

pub fn subject_distribution(grid: &TimeGrid<'_>) -> BTreeMap<String, u32> {
    let mut out: BTreeMap<String, u32> = BTreeMap::new();
    for a in grid.assignments() {
        *out.entry(a.subject.clone()).or_insert(0) += 1;
    }
    out
}

pub fn subject_counts(grid: &TimeGrid<'_>) -> Vec<SubjectCount> {
    subject_distribution(grid)
        .into_iter()
        .map(|(subject, period_count)| SubjectCount {
            subject,
            period_count,
        })
        .collect()
}

pub fn department_overview(
    grid: &TimeGrid<'_>,
    roster: &[RosterEntry],
) -> Result<DepartmentOverview, TimetableError> {
    let mut per_teacher = Vec::with_capacity(roster.len());
    for t in roster {
        let personal = project_for_teacher(grid, &t.teacher_id)?;
        per_teacher.push(TeacherUtilization {
            teacher_id: t.teacher_id.clone(),
            name: t.name.clone(),
            stat: teacher_utilization(&personal, t.max_periods),
        });
    }

    let valid: Vec<u32> = per_teacher
        .iter()
        .filter(|t| !t.stat.invalid_max)
        .map(|t| t.stat.percentage)
        .collect();
    let average_utilization = if valid.is_empty() {
        0
    } else {
        rounded_percent(valid.iter().sum::<u32>(), valid.len() as u32 * 100)
    };

    Ok(DepartmentOverview {
        total_periods: grid.assignment_count() as u32,
        per_subject_counts: subject_counts(grid),
        invalid_teacher_count: (per_teacher.len() - valid.len()) as u32,
        per_teacher_utilization: per_teacher,
        average_utilization,
    })
}
