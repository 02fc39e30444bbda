use std::fmt;

use crate::error::{PipelineError, Result};
use crate::models::{Cell, RawTable, EMPTY_CELL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    StudentId,
    StudentName,
    Program,
    Grade,
    AttendancePercent,
    AttendedHours,
    ScheduledHours,
    ClassesAttended,
    TotalClasses,
    AbsenceDates,
    AbsenceCount,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::StudentId => "student identifier",
            Role::StudentName => "student name",
            Role::Program => "program",
            Role::Grade => "grade",
            Role::AttendancePercent => "attendance percentage",
            Role::AttendedHours => "attended hours",
            Role::ScheduledHours => "scheduled hours",
            Role::ClassesAttended => "classes attended",
            Role::TotalClasses => "total classes",
            Role::AbsenceDates => "absence dates",
            Role::AbsenceCount => "absence count",
        };
        f.write_str(name)
    }
}

pub type Matcher = fn(&str) -> bool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub index: usize,
    pub label: String,
}

impl ColumnRef {
    pub fn get<'a>(&self, row: &'a [Cell]) -> &'a Cell {
        row.get(self.index).unwrap_or(&EMPTY_CELL)
    }
}

pub fn cell<'a>(row: &'a [Cell], column: Option<&ColumnRef>) -> &'a Cell {
    column.map_or(&EMPTY_CELL, |c| c.get(row))
}

/// Ordered `(role, matcher)` rules. Rules for the same role are tried in the
/// order they were registered; within a rule the table's own column order
/// decides, first match wins.
#[derive(Debug, Clone)]
pub struct ColumnResolver {
    rules: Vec<(Role, Matcher)>,
}

impl ColumnResolver {
    pub fn new(rules: Vec<(Role, Matcher)>) -> Self {
        Self { rules }
    }

    /// Rules for the two-worksheet registrar export (`Student#`,
    /// `Current Grade`, `Attended % to Date`, ...).
    pub fn workbook() -> Self {
        Self::new(vec![
            rule(Role::StudentId, |l| l.contains("student") && l.contains('#')),
            rule(Role::StudentName, is_person_name),
            rule(Role::Program, |l| l.contains("program")),
            rule(Role::Grade, |l| {
                l.contains("grade") && (l.contains("current") || l.contains("overall"))
            }),
            rule(Role::AttendancePercent, |l| l.contains("attend") && l.contains('%')),
            rule(Role::AttendedHours, |l| l.contains("attended") && l.contains("hour")),
            rule(Role::ScheduledHours, |l| l.contains("scheduled") && l.contains("hour")),
        ])
    }

    pub fn multi_file() -> Self {
        Self::new(vec![
            rule(Role::StudentId, |l| {
                l.contains("student") && (l.contains("id") || l.contains('#'))
            }),
            rule(Role::StudentName, is_person_name),
            rule(Role::Program, |l| l.contains("program")),
            rule(Role::Grade, |l| l.contains("grade")),
            rule(Role::ClassesAttended, |l| l.contains("attended") && !l.contains('%')),
            rule(Role::TotalClasses, |l| l.contains("total")),
            rule(Role::AbsenceDates, |l| l.contains("absence") && l.contains("date")),
            rule(Role::AbsenceCount, |l| l.contains("absence") && l.contains("count")),
        ])
    }

    pub fn resolve(&self, table: &RawTable, role: Role) -> Option<ColumnRef> {
        let labels: Vec<String> = table
            .headers
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        self.rules
            .iter()
            .filter(|(r, _)| *r == role)
            .find_map(|(_, matcher)| {
                labels
                    .iter()
                    .position(|label| matcher(label))
                    .map(|index| ColumnRef {
                        index,
                        label: table.headers[index].clone(),
                    })
            })
    }

    pub fn require(&self, table: &RawTable, role: Role) -> Result<ColumnRef> {
        self.resolve(table, role)
            .ok_or_else(|| PipelineError::ColumnNotFound {
                role,
                table: table.name.clone(),
            })
    }
}

fn rule(role: Role, matcher: Matcher) -> (Role, Matcher) {
    (role, matcher)
}

fn is_person_name(label: &str) -> bool {
    label.contains("name") && !label.contains("program")
}
