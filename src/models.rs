use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

pub static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    pub fn text(value: &str) -> Self {
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(n) => n.is_nan(),
        }
    }

    /// Numeric view of the cell. Text is parsed after trimming; non-finite
    /// values count as missing.
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Cell::Number(n) => *n,
            Cell::Text(s) => s.trim().parse::<f64>().ok()?,
            Cell::Empty => return None,
        };
        value.is_finite().then_some(value)
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(format_number(*n)),
            Cell::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            _ => None,
        }
    }
}

/// Integral floats print without a fractional part so that `5600123.0` read
/// from a workbook and `"5600123"` read from a CSV produce the same key.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            headers: headers.into_iter().map(|h| h.trim().to_string()).collect(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentKey(String);

impl StudentKey {
    pub fn from_cell(cell: &Cell) -> Option<Self> {
        cell.as_text().map(StudentKey)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StudentKey {
    fn from(value: &str) -> Self {
        StudentKey(value.trim().to_string())
    }
}

impl fmt::Display for StudentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdLabel {
    Safe,
    AtRisk,
    HighRisk,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightedLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Risk {
    Threshold(ThresholdLabel),
    Weighted { level: WeightedLevel, score: f64 },
}

impl Risk {
    pub fn label(&self) -> &'static str {
        match self {
            Risk::Threshold(ThresholdLabel::Safe) => "Safe",
            Risk::Threshold(ThresholdLabel::AtRisk) => "At Risk",
            Risk::Threshold(ThresholdLabel::HighRisk) => "High Risk",
            Risk::Threshold(ThresholdLabel::Unknown) => "Unknown",
            Risk::Weighted { level: WeightedLevel::Low, .. } => "Low",
            Risk::Weighted { level: WeightedLevel::Medium, .. } => "Medium",
            Risk::Weighted { level: WeightedLevel::High, .. } => "High",
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            Risk::Weighted { score, .. } => Some(*score),
            Risk::Threshold(_) => None,
        }
    }

    pub fn is_at_risk(&self) -> bool {
        matches!(
            self,
            Risk::Threshold(ThresholdLabel::AtRisk | ThresholdLabel::HighRisk)
                | Risk::Weighted {
                    level: WeightedLevel::Medium | WeightedLevel::High,
                    ..
                }
        )
    }

    pub fn is_safe(&self) -> bool {
        matches!(
            self,
            Risk::Threshold(ThresholdLabel::Safe)
                | Risk::Weighted {
                    level: WeightedLevel::Low,
                    ..
                }
        )
    }

    /// Lower ranks are listed first when results are queried.
    pub fn severity_rank(&self) -> u8 {
        match self {
            Risk::Threshold(ThresholdLabel::HighRisk)
            | Risk::Weighted {
                level: WeightedLevel::High,
                ..
            } => 0,
            Risk::Threshold(ThresholdLabel::AtRisk)
            | Risk::Weighted {
                level: WeightedLevel::Medium,
                ..
            } => 1,
            Risk::Threshold(ThresholdLabel::Safe)
            | Risk::Weighted {
                level: WeightedLevel::Low,
                ..
            } => 2,
            Risk::Threshold(ThresholdLabel::Unknown) => 3,
        }
    }

    pub fn from_parts(label: &str, score: Option<f64>) -> Option<Self> {
        let risk = match label {
            "Safe" => Risk::Threshold(ThresholdLabel::Safe),
            "At Risk" => Risk::Threshold(ThresholdLabel::AtRisk),
            "High Risk" => Risk::Threshold(ThresholdLabel::HighRisk),
            "Unknown" => Risk::Threshold(ThresholdLabel::Unknown),
            "Low" => Risk::Weighted {
                level: WeightedLevel::Low,
                score: score.unwrap_or(0.0),
            },
            "Medium" => Risk::Weighted {
                level: WeightedLevel::Medium,
                score: score.unwrap_or(0.0),
            },
            "High" => Risk::Weighted {
                level: WeightedLevel::High,
                score: score.unwrap_or(0.0),
            },
            _ => return None,
        };
        Some(risk)
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalStudentRecord {
    pub student_id: StudentKey,
    pub student_name: String,
    pub program: String,
    pub grade: f64,
    pub attendance_rate: f64,
    pub consecutive_absences: u32,
    pub risk: Risk,
    pub recommended_action: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub total_students: usize,
    pub at_risk_count: usize,
    pub safe_count: usize,
    pub avg_grade: f64,
    pub avg_attendance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSummary {
    pub program: String,
    pub students: usize,
    pub at_risk: usize,
    pub avg_grade: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub run_id: Uuid,
    pub message: String,
    pub students_processed: usize,
    pub at_risk_count: usize,
    pub safe_count: usize,
    pub avg_grade: f64,
    pub avg_attendance: f64,
    pub warnings: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

impl UploadSummary {
    pub fn new(run_id: Uuid, stats: &Statistics, warnings: Vec<String>) -> Self {
        Self {
            run_id,
            message: format!("Processed {} students successfully", stats.total_students),
            students_processed: stats.total_students,
            at_risk_count: stats.at_risk_count,
            safe_count: stats.safe_count,
            avg_grade: round2(stats.avg_grade),
            avg_attendance: round2(stats.avg_attendance),
            warnings,
            processed_at: Utc::now(),
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
