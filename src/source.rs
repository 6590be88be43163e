use rusqlite::Connection;
use std::collections::BTreeSet;
use tracing::warn;

use crate::db::{self, AssignmentFilter};
use crate::timetable::{Assignment, DayStructure};

/// How much of the school's timetable a caller needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    School,
    Department(BTreeSet<String>),
    Class(String),
    Teacher(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUnavailable {
    #[error("no workspace is open")]
    NoWorkspace,
    #[error("timetable storage could not be read: {0}")]
    Storage(String),
}

impl DataUnavailable {
    pub fn reason(&self) -> &'static str {
        match self {
            DataUnavailable::NoWorkspace => "no_workspace",
            DataUnavailable::Storage(_) => "storage_unavailable",
        }
    }
}

/// Supplier of the canonical day structure and source assignments.
pub trait TimetableSource {
    fn day_structure(&self) -> Result<DayStructure, DataUnavailable>;
    fn fetch_timetable(&self, scope: &Scope) -> Result<Vec<Assignment>, DataUnavailable>;
    /// Subject set of a department, `None` if the department does not exist.
    fn department_subjects(
        &self,
        department_id: &str,
    ) -> Result<Option<BTreeSet<String>>, DataUnavailable>;
}

pub struct SqliteSource<'c> {
    conn: Option<&'c Connection>,
}

impl<'c> SqliteSource<'c> {
    pub fn new(conn: Option<&'c Connection>) -> Self {
        Self { conn }
    }

    fn conn(&self) -> Result<&'c Connection, DataUnavailable> {
        self.conn.ok_or(DataUnavailable::NoWorkspace)
    }
}

fn storage_err(e: anyhow::Error) -> DataUnavailable {
    warn!(error = %format!("{e:#}"), "timetable source read failed");
    DataUnavailable::Storage(format!("{e:#}"))
}

impl TimetableSource for SqliteSource<'_> {
    fn day_structure(&self) -> Result<DayStructure, DataUnavailable> {
        db::load_day_structure(self.conn()?).map_err(storage_err)
    }

    fn fetch_timetable(&self, scope: &Scope) -> Result<Vec<Assignment>, DataUnavailable> {
        let conn = self.conn()?;
        let subjects: Vec<String>;
        let filter = match scope {
            Scope::School => AssignmentFilter::default(),
            Scope::Class(id) => AssignmentFilter {
                class_id: Some(id),
                ..AssignmentFilter::default()
            },
            Scope::Teacher(id) => AssignmentFilter {
                teacher_id: Some(id),
                ..AssignmentFilter::default()
            },
            Scope::Department(set) => {
                subjects = set.iter().cloned().collect();
                AssignmentFilter {
                    subjects: Some(&subjects),
                    ..AssignmentFilter::default()
                }
            }
        };
        db::list_assignments(conn, &filter).map_err(storage_err)
    }

    fn department_subjects(
        &self,
        department_id: &str,
    ) -> Result<Option<BTreeSet<String>>, DataUnavailable> {
        let dept = db::load_department(self.conn()?, department_id).map_err(storage_err)?;
        Ok(dept.map(|d| d.subjects.into_iter().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn missing_workspace_is_data_unavailable() {
        let src = SqliteSource::new(None);
        assert_eq!(src.day_structure(), Err(DataUnavailable::NoWorkspace));
        assert_eq!(
            src.fetch_timetable(&Scope::School),
            Err(DataUnavailable::NoWorkspace)
        );
    }

    #[test]
    fn fresh_workspace_has_default_structure_and_no_assignments() {
        let dir = temp_dir("timetabled-source");
        let conn = db::open_db(&dir).expect("open db");
        let src = SqliteSource::new(Some(&conn));
        assert_eq!(src.day_structure().expect("structure"), DayStructure::default());
        assert!(src
            .fetch_timetable(&Scope::Department(BTreeSet::new()))
            .expect("fetch")
            .is_empty());
        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }
}
