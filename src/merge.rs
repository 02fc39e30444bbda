use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::columns::{cell, ColumnResolver, Role};
use crate::error::{PipelineError, Result};
use crate::models::{Cell, RawTable, StudentKey};
use crate::normalize::{attendance_fraction, attendance_percent, normalize_grade, AbsenceCounting};

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Grades,
    Attendance,
    Absences,
}

impl Origin {
    pub fn label(&self) -> &'static str {
        match self {
            Origin::Grades => "grades",
            Origin::Attendance => "attendance",
            Origin::Absences => "absences",
        }
    }
}

/// One field as reported by each source table. The grades table wins, then
/// attendance, then absences; this is the typed form of `_g` / `_a` suffixes.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginValues<T> {
    pub grades: Option<T>,
    pub attendance: Option<T>,
    pub absences: Option<T>,
}

impl<T> Default for OriginValues<T> {
    fn default() -> Self {
        Self {
            grades: None,
            attendance: None,
            absences: None,
        }
    }
}

impl<T> OriginValues<T> {
    pub fn set(&mut self, origin: Origin, value: Option<T>) {
        match origin {
            Origin::Grades => self.grades = value,
            Origin::Attendance => self.attendance = value,
            Origin::Absences => self.absences = value,
        }
    }

    pub fn coalesce(&self) -> Option<&T> {
        self.grades
            .as_ref()
            .or(self.attendance.as_ref())
            .or(self.absences.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Grade(Option<f64>),
    Attendance(Option<f64>),
    Absences { count: u32, dates: String },
}

impl Payload {
    pub fn origin(&self) -> Origin {
        match self {
            Payload::Grade(_) => Origin::Grades,
            Payload::Attendance(_) => Origin::Attendance,
            Payload::Absences { .. } => Origin::Absences,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub key: StudentKey,
    pub name: Option<String>,
    pub program: Option<String>,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub key: StudentKey,
    pub name: OriginValues<String>,
    pub program: OriginValues<String>,
    pub grade: Option<f64>,
    pub attendance_rate: Option<f64>,
    pub absence_count: u32,
    pub absence_dates: String,
}

impl MergedRow {
    fn new(key: StudentKey) -> Self {
        Self {
            key,
            name: OriginValues::default(),
            program: OriginValues::default(),
            grade: None,
            attendance_rate: None,
            absence_count: 0,
            absence_dates: String::new(),
        }
    }

    fn apply(&mut self, source: &SourceRow) {
        let origin = source.payload.origin();
        self.name.set(origin, source.name.clone());
        self.program.set(origin, source.program.clone());

        match &source.payload {
            Payload::Grade(grade) => self.grade = *grade,
            Payload::Attendance(rate) => self.attendance_rate = *rate,
            Payload::Absences { count, dates } => {
                self.absence_count = *count;
                self.absence_dates = dates.clone();
            }
        }
    }

    pub fn student_name(&self) -> &str {
        self.name.coalesce().map_or(UNKNOWN, String::as_str)
    }

    pub fn program_name(&self) -> &str {
        self.program.coalesce().map_or(UNKNOWN, String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    rows: Vec<MergedRow>,
}

impl Roster {
    /// Folds one more source table into the roster. Existing students take
    /// the first matching row of the table; students new to the roster are
    /// appended in the table's order, duplicates included, so the
    /// materializer can keep the first.
    pub fn merge(self, source: &[SourceRow]) -> Roster {
        let mut rows = self.rows;
        let mut positions: HashMap<StudentKey, Vec<usize>> = HashMap::new();
        for (index, row) in rows.iter().enumerate() {
            positions.entry(row.key.clone()).or_default().push(index);
        }

        let mut matched: HashSet<&StudentKey> = HashSet::new();
        for incoming in source {
            match positions.get(&incoming.key) {
                Some(indices) => {
                    if matched.insert(&incoming.key) {
                        for &index in indices {
                            rows[index].apply(incoming);
                        }
                    }
                }
                None => {
                    let mut row = MergedRow::new(incoming.key.clone());
                    row.apply(incoming);
                    rows.push(row);
                }
            }
        }

        Roster { rows }
    }

    #[cfg(test)]
    pub fn rows(&self) -> &[MergedRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<MergedRow> {
        self.rows
    }
}

/// Resolves id, name and program, then builds a payload for every row with a
/// usable student id. Rows with blank ids are dropped.
fn extract<F>(table: &RawTable, resolver: &ColumnResolver, payload: F) -> Result<Vec<SourceRow>>
where
    F: Fn(&[Cell]) -> Payload,
{
    let id_column = resolver.require(table, Role::StudentId)?;
    let name_column = resolver.resolve(table, Role::StudentName);
    let program_column = resolver.resolve(table, Role::Program);
    debug!(
        table = %table.name,
        id = %id_column.label,
        name = ?name_column.as_ref().map(|c| &c.label),
        program = ?program_column.as_ref().map(|c| &c.label),
        "resolved identity columns"
    );

    let mut rows = Vec::with_capacity(table.len());
    let mut skipped = 0usize;

    for row in &table.rows {
        let Some(key) = StudentKey::from_cell(id_column.get(row)) else {
            skipped += 1;
            continue;
        };
        rows.push(SourceRow {
            key,
            name: cell(row, name_column.as_ref()).as_text(),
            program: cell(row, program_column.as_ref()).as_text(),
            payload: payload(row.as_slice()),
        });
    }

    if skipped > 0 {
        warn!(table = %table.name, skipped, "dropped rows without a student identifier");
    }

    Ok(rows)
}

pub fn extract_grades(table: &RawTable, resolver: &ColumnResolver) -> Result<Vec<SourceRow>> {
    let grade_column = resolver.require(table, Role::Grade)?;
    extract(table, resolver, |row| Payload::Grade(normalize_grade(grade_column.get(row))))
}

pub fn extract_attendance_percent(table: &RawTable, resolver: &ColumnResolver) -> Result<Vec<SourceRow>> {
    let percent = resolver.resolve(table, Role::AttendancePercent);
    let attended = resolver.resolve(table, Role::AttendedHours);
    let scheduled = resolver.resolve(table, Role::ScheduledHours);

    extract(table, resolver, |row| {
        Payload::Attendance(attendance_percent(
            cell(row, percent.as_ref()),
            cell(row, attended.as_ref()),
            cell(row, scheduled.as_ref()),
        ))
    })
}

pub fn extract_attendance_counts(table: &RawTable, resolver: &ColumnResolver) -> Result<Vec<SourceRow>> {
    let attended = resolver.require(table, Role::ClassesAttended)?;
    let total = resolver.require(table, Role::TotalClasses)?;

    extract(table, resolver, |row| {
        Payload::Attendance(Some(attendance_fraction(attended.get(row), total.get(row))))
    })
}

/// Absences table: raw date list, or a precomputed count column.
pub fn extract_absences(
    table: &RawTable,
    resolver: &ColumnResolver,
    counting: AbsenceCounting,
) -> Result<Vec<SourceRow>> {
    let dates_column = resolver.resolve(table, Role::AbsenceDates);
    let count_column = resolver.resolve(table, Role::AbsenceCount);

    if dates_column.is_none() && count_column.is_none() {
        return Err(PipelineError::ColumnNotFound {
            role: Role::AbsenceDates,
            table: table.name.clone(),
        });
    }

    extract(table, resolver, |row| match &dates_column {
        Some(column) => {
            let dates = column.get(row).as_text().unwrap_or_default();
            Payload::Absences {
                count: counting.count(&dates),
                dates,
            }
        }
        None => Payload::Absences {
            count: cell(row, count_column.as_ref())
                .as_number()
                .map_or(0, |n| n.max(0.0) as u32),
            dates: String::new(),
        },
    })
}
