use serde::Serialize;
use std::fmt;

use super::model::{Assignment, Day};

/// Whose personal grid a conflict was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum ConflictOwner {
    Student(String),
    Teacher(String),
}

impl fmt::Display for ConflictOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictOwner::Student(id) => write!(f, "class {}", id),
            ConflictOwner::Teacher(id) => write!(f, "teacher {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotConflict {
    pub day: Day,
    pub period_id: String,
    pub assignments: Vec<Assignment>,
}

/// A personal grid held more than one assignment in at least one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("schedule conflict for {owner}:{}", describe_slots(.conflicts))]
pub struct ScheduleConflictError {
    pub owner: ConflictOwner,
    pub conflicts: Vec<SlotConflict>,
}

fn describe_slots(conflicts: &[SlotConflict]) -> String {
    conflicts
        .iter()
        .map(|c| {
            let ids: Vec<&str> = c.assignments.iter().map(|a| a.id.as_str()).collect();
            format!(" {} {} [{}]", c.day, c.period_id, ids.join(", "))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimetableError {
    #[error(transparent)]
    Conflict(#[from] ScheduleConflictError),

    #[error("assignment {assignment_id} is on {day}, which is not a school day")]
    UnknownDay { assignment_id: String, day: Day },

    #[error("assignment {assignment_id} references unknown period {period_id}")]
    UnknownPeriod {
        assignment_id: String,
        period_id: String,
    },

    #[error("assignment {assignment_id} is placed on break period {period_id}")]
    AssignmentOnBreak {
        assignment_id: String,
        period_id: String,
    },

    #[error("invalid day structure: {0}")]
    InvalidStructure(String),
}

impl TimetableError {
    /// Stable code used in IPC error objects.
    pub fn code(&self) -> &'static str {
        match self {
            TimetableError::Conflict(_) => "schedule_conflict",
            TimetableError::UnknownDay { .. }
            | TimetableError::UnknownPeriod { .. }
            | TimetableError::AssignmentOnBreak { .. } => "invalid_assignment",
            TimetableError::InvalidStructure(_) => "invalid_structure",
        }
    }
}
