//! Timetable projection engine: the weekly grid model, role-scoped
//! projections and time queries, and statistics over projected grids.
//!
//! Everything here is pure and synchronous. Callers rebuild grids from the
//! source on every request; nothing derived is cached.

pub mod aggregate;
pub mod error;
pub mod grid;
pub mod model;
pub mod query;

pub use aggregate::{
    department_overview, subject_counts, subject_distribution, teacher_utilization, RosterEntry,
};
pub use error::TimetableError;
pub use grid::TimeGrid;
pub use model::{Assignment, Day, DayStructure, PeriodSlot};
pub use query::{
    find_conflicts, next_class, next_school_day_schedule, project, today_schedule,
    upcoming_classes, Viewpoint,
};
