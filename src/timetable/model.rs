use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::error::TimetableError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
        Day::Sunday,
    ];

    pub fn from_weekday(w: Weekday) -> Self {
        match w {
            Weekday::Mon => Day::Monday,
            Weekday::Tue => Day::Tuesday,
            Weekday::Wed => Day::Wednesday,
            Weekday::Thu => Day::Thursday,
            Weekday::Fri => Day::Friday,
            Weekday::Sat => Day::Saturday,
            Weekday::Sun => Day::Sunday,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
            Day::Sunday => "Sunday",
        }
    }

    /// Accepts full names and three-letter abbreviations, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim().to_ascii_lowercase();
        Day::ALL.into_iter().find(|d| {
            let full = d.name().to_ascii_lowercase();
            t == full || (t.len() == 3 && full.starts_with(&t))
        })
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `HH:MM` wall-clock time, serialized as that string.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_clock(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid time {:?}, expected HH:MM", raw))
        })
    }
}

pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
        .ok()
}

pub fn minutes_since_midnight(t: NaiveTime) -> i64 {
    i64::from(t.hour()) * 60 + i64::from(t.minute())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSlot {
    pub id: String,
    pub label: String,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    #[serde(default)]
    pub is_break: bool,
}

impl PeriodSlot {
    pub fn new(id: &str, label: &str, start: &str, end: &str, is_break: bool) -> Option<Self> {
        Some(Self {
            id: id.to_string(),
            label: label.to_string(),
            start: parse_clock(start)?,
            end: parse_clock(end)?,
            is_break,
        })
    }

    pub fn start_minutes(&self) -> i64 {
        minutes_since_midnight(self.start)
    }

    pub fn time_range(&self) -> String {
        format!("{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Ordered school days and ordered period slots of one school week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStructure {
    pub days: Vec<Day>,
    pub periods: Vec<PeriodSlot>,
}

impl Default for DayStructure {
    fn default() -> Self {
        let slot = |id: &str, label: &str, start: &str, end: &str, is_break: bool| PeriodSlot {
            id: id.to_string(),
            label: label.to_string(),
            start: parse_clock(start).unwrap_or_default(),
            end: parse_clock(end).unwrap_or_default(),
            is_break,
        };
        Self {
            days: vec![
                Day::Monday,
                Day::Tuesday,
                Day::Wednesday,
                Day::Thursday,
                Day::Friday,
            ],
            periods: vec![
                slot("P1", "Period 1", "08:30", "09:15", false),
                slot("P2", "Period 2", "09:15", "10:00", false),
                slot("BREAK", "Break", "10:00", "10:15", true),
                slot("P3", "Period 3", "10:15", "11:00", false),
                slot("P4", "Period 4", "11:00", "11:45", false),
                slot("LUNCH", "Lunch", "11:45", "12:30", true),
                slot("P5", "Period 5", "12:30", "13:15", false),
                slot("P6", "Period 6", "13:15", "14:00", false),
            ],
        }
    }
}

impl DayStructure {
    pub fn validate(&self) -> Result<(), TimetableError> {
        if self.days.is_empty() {
            return Err(TimetableError::InvalidStructure(
                "at least one school day is required".to_string(),
            ));
        }
        let mut seen_days = HashSet::new();
        for d in &self.days {
            if !seen_days.insert(*d) {
                return Err(TimetableError::InvalidStructure(format!(
                    "duplicate day {}",
                    d
                )));
            }
        }
        if self.periods.is_empty() {
            return Err(TimetableError::InvalidStructure(
                "at least one period is required".to_string(),
            ));
        }
        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut prev: Option<&PeriodSlot> = None;
        for p in &self.periods {
            if p.id.trim().is_empty() {
                return Err(TimetableError::InvalidStructure(
                    "period id must not be empty".to_string(),
                ));
            }
            if !seen_ids.insert(p.id.as_str()) {
                return Err(TimetableError::InvalidStructure(format!(
                    "duplicate period id {}",
                    p.id
                )));
            }
            if p.start >= p.end {
                return Err(TimetableError::InvalidStructure(format!(
                    "period {} must start before it ends",
                    p.id
                )));
            }
            if let Some(prev) = prev {
                if p.start < prev.end {
                    return Err(TimetableError::InvalidStructure(format!(
                        "period {} starts before period {} ends",
                        p.id, prev.id
                    )));
                }
            }
            prev = Some(p);
        }
        Ok(())
    }

    pub fn day_index(&self, day: Day) -> Option<usize> {
        self.days.iter().position(|d| *d == day)
    }

    pub fn period_index(&self, period_id: &str) -> Option<usize> {
        self.periods.iter().position(|p| p.id == period_id)
    }

    pub fn period(&self, period_id: &str) -> Option<&PeriodSlot> {
        self.periods.iter().find(|p| p.id == period_id)
    }

    pub fn is_break(&self, period_id: &str) -> bool {
        self.period(period_id).map(|p| p.is_break).unwrap_or(false)
    }

    pub fn teaching_periods_per_week(&self) -> usize {
        self.days.len() * self.periods.iter().filter(|p| !p.is_break).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub day: Day,
    pub period_id: String,
    pub subject: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub room: String,
    pub class_id: String,
    pub student_count: u32,
    pub color: String,
}

impl Assignment {
    pub(crate) fn cell_order_key(&self) -> (&str, &str, &str, &str) {
        (&self.class_id, &self.subject, &self.teacher_id, &self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_structure_is_valid() {
        let s = DayStructure::default();
        s.validate().expect("default structure");
        assert_eq!(s.days.len(), 5);
        assert!(s.is_break("BREAK"));
        assert!(!s.is_break("P1"));
        assert!(!s.is_break("NOPE"));
        assert_eq!(s.teaching_periods_per_week(), 30);
    }

    #[test]
    fn overlapping_periods_are_rejected() {
        let mut s = DayStructure::default();
        s.periods[1].start = parse_clock("09:00").expect("time");
        let e = s.validate().expect_err("overlap");
        assert!(e.to_string().contains("P2"));
    }

    #[test]
    fn duplicate_period_ids_are_rejected() {
        let mut s = DayStructure::default();
        s.periods[3].id = "P1".to_string();
        assert!(s.validate().is_err());
    }

    #[test]
    fn duplicate_days_are_rejected() {
        let mut s = DayStructure::default();
        s.days.push(Day::Monday);
        assert!(s.validate().is_err());
    }

    #[test]
    fn day_parse_accepts_abbreviations() {
        assert_eq!(Day::parse("mon"), Some(Day::Monday));
        assert_eq!(Day::parse("Thursday"), Some(Day::Thursday));
        assert_eq!(Day::parse(" FRI "), Some(Day::Friday));
        assert_eq!(Day::parse("Funday"), None);
    }

    #[test]
    fn period_slot_serializes_clock_times() {
        let p = PeriodSlot::new("P3", "Period 3", "09:45", "10:30", false).expect("slot");
        let v = serde_json::to_value(&p).expect("json");
        assert_eq!(v["start"], "09:45");
        assert_eq!(v["end"], "10:30");
        assert_eq!(v["isBreak"], false);
        let back: PeriodSlot = serde_json::from_value(v).expect("parse");
        assert_eq!(back, p);
        assert_eq!(p.start_minutes(), 585);
    }
}
