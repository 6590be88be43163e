use serde::Serialize;

use super::error::{ConflictOwner, ScheduleConflictError, SlotConflict, TimetableError};
use super::model::{Assignment, Day, DayStructure, PeriodSlot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridKind {
    /// One student group's or one teacher's week: at most one assignment per cell.
    Personal(ConflictOwner),
    /// School or department week: parallel assignments allowed.
    Aggregate,
}

/// Weekly grid of (day, period) cells, each holding zero or more assignments.
///
/// Cells are addressed by the position of the day and period in the borrowed
/// [`DayStructure`], so iteration order is always the declared order.
#[derive(Debug, Clone)]
pub struct TimeGrid<'a> {
    structure: &'a DayStructure,
    kind: GridKind,
    cells: Vec<Vec<Vec<Assignment>>>,
}

#[derive(Debug, Clone, Copy)]
pub struct Cell<'g> {
    pub day: Day,
    pub period: &'g PeriodSlot,
    pub assignments: &'g [Assignment],
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCellSnapshot {
    pub day: Day,
    pub period_id: String,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSnapshot {
    pub days: Vec<Day>,
    pub periods: Vec<PeriodSlot>,
    pub cells: Vec<GridCellSnapshot>,
    pub assignment_count: usize,
}

impl<'a> TimeGrid<'a> {
    pub fn empty(structure: &'a DayStructure) -> Self {
        Self {
            structure,
            kind: GridKind::Aggregate,
            cells: empty_cells(structure),
        }
    }

    pub fn aggregate<I>(structure: &'a DayStructure, assignments: I) -> Result<Self, TimetableError>
    where
        I: IntoIterator<Item = Assignment>,
    {
        Self::build(structure, GridKind::Aggregate, assignments)
    }

    #[cfg(test)]
    pub fn personal<I>(
        structure: &'a DayStructure,
        owner: ConflictOwner,
        assignments: I,
    ) -> Result<Self, TimetableError>
    where
        I: IntoIterator<Item = Assignment>,
    {
        Self::build(structure, GridKind::Personal(owner), assignments)
    }

    fn build<I>(
        structure: &'a DayStructure,
        kind: GridKind,
        assignments: I,
    ) -> Result<Self, TimetableError>
    where
        I: IntoIterator<Item = Assignment>,
    {
        let mut cells = empty_cells(structure);
        for a in assignments {
            let Some(di) = structure.day_index(a.day) else {
                return Err(TimetableError::UnknownDay {
                    assignment_id: a.id,
                    day: a.day,
                });
            };
            let Some(pi) = structure.period_index(&a.period_id) else {
                return Err(TimetableError::UnknownPeriod {
                    assignment_id: a.id,
                    period_id: a.period_id,
                });
            };
            if structure.periods[pi].is_break {
                return Err(TimetableError::AssignmentOnBreak {
                    assignment_id: a.id,
                    period_id: a.period_id,
                });
            }
            cells[di][pi].push(a);
        }
        for day in cells.iter_mut() {
            for cell in day.iter_mut() {
                cell.sort_by(|a, b| a.cell_order_key().cmp(&b.cell_order_key()));
            }
        }

        if let GridKind::Personal(owner) = &kind {
            let mut conflicts = Vec::new();
            for (di, day) in cells.iter().enumerate() {
                for (pi, cell) in day.iter().enumerate() {
                    if cell.len() > 1 {
                        conflicts.push(SlotConflict {
                            day: structure.days[di],
                            period_id: structure.periods[pi].id.clone(),
                            assignments: cell.clone(),
                        });
                    }
                }
            }
            if !conflicts.is_empty() {
                return Err(ScheduleConflictError {
                    owner: owner.clone(),
                    conflicts,
                }
                .into());
            }
        }

        Ok(Self {
            structure,
            kind,
            cells,
        })
    }

    /// Builds a new grid of `kind` from the assignments of `self` that match `keep`.
    pub(crate) fn filtered<F>(&self, kind: GridKind, keep: F) -> Result<TimeGrid<'a>, TimetableError>
    where
        F: Fn(&Assignment) -> bool,
    {
        let picked: Vec<Assignment> = self.assignments().filter(|a| keep(a)).cloned().collect();
        Self::build(self.structure, kind, picked)
    }

    pub fn structure(&self) -> &'a DayStructure {
        self.structure
    }

    pub fn kind(&self) -> &GridKind {
        &self.kind
    }

    /// Assignments in one cell; empty for free, break, or unknown cells.
    pub fn get_slot(&self, day: Day, period_id: &str) -> &[Assignment] {
        let (Some(di), Some(pi)) = (
            self.structure.day_index(day),
            self.structure.period_index(period_id),
        ) else {
            return &[];
        };
        &self.cells[di][pi]
    }

    pub fn is_break(&self, period_id: &str) -> bool {
        self.structure.is_break(period_id)
    }

    /// Every cell, day by day, periods in declared order (breaks included).
    pub fn cells(&self) -> impl Iterator<Item = Cell<'_>> + '_ {
        self.cells.iter().enumerate().flat_map(move |(di, day)| {
            day.iter().enumerate().map(move |(pi, cell)| Cell {
                day: self.structure.days[di],
                period: &self.structure.periods[pi],
                assignments: cell.as_slice(),
            })
        })
    }

    /// Cells of a single day in declared period order; empty if `day` is not a school day.
    pub fn day_cells(&self, day: Day) -> Vec<Cell<'_>> {
        let Some(di) = self.structure.day_index(day) else {
            return Vec::new();
        };
        self.cells[di]
            .iter()
            .enumerate()
            .map(|(pi, cell)| Cell {
                day,
                period: &self.structure.periods[pi],
                assignments: cell.as_slice(),
            })
            .collect()
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> + '_ {
        self.cells.iter().flatten().flatten()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments().count()
    }

    /// Non-break cells holding at least one assignment.
    pub fn occupied_slot_count(&self) -> usize {
        self.cells()
            .filter(|c| !c.period.is_break && !c.assignments.is_empty())
            .count()
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            days: self.structure.days.clone(),
            periods: self.structure.periods.clone(),
            cells: self
                .cells()
                .filter(|c| !c.assignments.is_empty())
                .map(|c| GridCellSnapshot {
                    day: c.day,
                    period_id: c.period.id.clone(),
                    assignments: c.assignments.to_vec(),
                })
                .collect(),
            assignment_count: self.assignment_count(),
        }
    }
}

fn empty_cells(structure: &DayStructure) -> Vec<Vec<Vec<Assignment>>> {
    vec![vec![Vec::new(); structure.periods.len()]; structure.days.len()]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn assignment(
        id: &str,
        day: Day,
        period: &str,
        subject: &str,
        teacher: &str,
        class: &str,
    ) -> Assignment {
        Assignment {
            id: id.to_string(),
            day,
            period_id: period.to_string(),
            subject: subject.to_string(),
            teacher_id: teacher.to_string(),
            teacher_name: format!("Teacher {}", teacher),
            room: "R1".to_string(),
            class_id: class.to_string(),
            student_count: 28,
            color: "#3366cc".to_string(),
        }
    }

    #[test]
    fn get_slot_is_empty_for_free_break_and_unknown_cells() {
        let s = DayStructure::default();
        let g = TimeGrid::aggregate(
            &s,
            vec![assignment("a1", Day::Monday, "P1", "Mathematics", "T1", "9A")],
        )
        .expect("grid");
        assert_eq!(g.get_slot(Day::Monday, "P1").len(), 1);
        assert!(g.get_slot(Day::Monday, "P2").is_empty());
        assert!(g.get_slot(Day::Monday, "BREAK").is_empty());
        assert!(g.get_slot(Day::Saturday, "P1").is_empty());
        assert!(g.get_slot(Day::Monday, "P99").is_empty());
        assert!(g.is_break("LUNCH"));
    }

    #[test]
    fn aggregate_grid_keeps_parallel_assignments_in_stable_order() {
        let s = DayStructure::default();
        let g = TimeGrid::aggregate(
            &s,
            vec![
                assignment("a2", Day::Tuesday, "P3", "Physics", "T2", "9B"),
                assignment("a1", Day::Tuesday, "P3", "Mathematics", "T1", "9A"),
            ],
        )
        .expect("grid");
        let cell = g.get_slot(Day::Tuesday, "P3");
        assert_eq!(cell.len(), 2);
        assert_eq!(cell[0].class_id, "9A");
        assert_eq!(cell[1].class_id, "9B");
        assert_eq!(g.occupied_slot_count(), 1);
        assert_eq!(g.assignment_count(), 2);
    }

    #[test]
    fn personal_grid_reports_every_colliding_assignment() {
        let s = DayStructure::default();
        let err = TimeGrid::personal(
            &s,
            ConflictOwner::Student("9A".to_string()),
            vec![
                assignment("a1", Day::Monday, "P1", "Mathematics", "T1", "9A"),
                assignment("a2", Day::Monday, "P1", "English", "T3", "9A"),
                assignment("a3", Day::Monday, "P2", "History", "T4", "9A"),
            ],
        )
        .expect_err("conflict");
        let TimetableError::Conflict(c) = err else {
            panic!("expected conflict");
        };
        assert_eq!(c.owner, ConflictOwner::Student("9A".to_string()));
        assert_eq!(c.conflicts.len(), 1);
        let ids: Vec<&str> = c.conflicts[0]
            .assignments
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a2", "a1"]);
        assert_eq!(c.to_string(), "schedule conflict for class 9A: Monday P1 [a2, a1]");
    }

    #[test]
    fn assignment_on_break_is_rejected() {
        let s = DayStructure::default();
        let err = TimeGrid::aggregate(
            &s,
            vec![assignment("a1", Day::Monday, "BREAK", "Mathematics", "T1", "9A")],
        )
        .expect_err("break");
        assert_eq!(err.code(), "invalid_assignment");
    }

    #[test]
    fn unknown_day_and_period_are_rejected() {
        let s = DayStructure::default();
        assert!(matches!(
            TimeGrid::aggregate(
                &s,
                vec![assignment("a1", Day::Sunday, "P1", "Art", "T1", "9A")]
            ),
            Err(TimetableError::UnknownDay { .. })
        ));
        assert!(matches!(
            TimeGrid::aggregate(
                &s,
                vec![assignment("a1", Day::Monday, "P9", "Art", "T1", "9A")]
            ),
            Err(TimetableError::UnknownPeriod { .. })
        ));
    }

    #[test]
    fn cells_follow_declared_period_order() {
        let s = DayStructure::default();
        let g = TimeGrid::aggregate(
            &s,
            vec![
                assignment("late", Day::Monday, "P6", "Art", "T1", "9A"),
                assignment("early", Day::Monday, "P1", "Art", "T1", "9A"),
            ],
        )
        .expect("grid");
        let order: Vec<&str> = g.assignments().map(|a| a.id.as_str()).collect();
        assert_eq!(order, vec!["early", "late"]);
        let snap = g.snapshot();
        assert_eq!(snap.cells.len(), 2);
        assert_eq!(snap.cells[0].period_id, "P1");
    }
}
