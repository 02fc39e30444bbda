use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::Cell;

const LETTER_GRADES: [(&str, f64); 13] = [
    ("A+", 97.0),
    ("A", 93.0),
    ("A-", 90.0),
    ("B+", 87.0),
    ("B", 83.0),
    ("B-", 80.0),
    ("C+", 77.0),
    ("C", 73.0),
    ("C-", 70.0),
    ("D+", 67.0),
    ("D", 63.0),
    ("D-", 60.0),
    ("F", 50.0),
];

const ABSENCE_DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Converts numbers, percentage strings and letter grades to 0-100.
/// Values up to 1 are read as fractions.
pub fn normalize_grade(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Empty => None,
        Cell::Number(n) if n.is_finite() => Some(scale_fraction(*n)),
        Cell::Number(_) => None,
        Cell::Text(raw) => {
            let cleaned = raw.trim().to_uppercase().replace('%', "");
            if cleaned.is_empty() {
                return None;
            }
            match cleaned.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Some(scale_fraction(n)),
                _ => letter_grade(cleaned.trim()),
            }
        }
    }
}

fn scale_fraction(value: f64) -> f64 {
    if value <= 1.0 {
        value * 100.0
    } else {
        value
    }
}

pub fn letter_grade(letter: &str) -> Option<f64> {
    LETTER_GRADES
        .iter()
        .find(|(l, _)| *l == letter)
        .map(|(_, value)| *value)
}

/// Workbook attendance on a 0-100 scale: the direct percentage when present,
/// else attended / scheduled hours. Gaps stay `None`.
pub fn attendance_percent(percent: &Cell, attended_hours: &Cell, scheduled_hours: &Cell) -> Option<f64> {
    if let Some(direct) = percent_value(percent) {
        return Some(direct);
    }

    match (attended_hours.as_number(), scheduled_hours.as_number()) {
        (Some(attended), Some(scheduled)) if scheduled > 0.0 => Some(attended / scheduled * 100.0),
        _ => None,
    }
}

fn percent_value(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Text(raw) => Cell::text(raw.trim().trim_end_matches('%')).as_number(),
        other => other.as_number(),
    }
}

/// Count-based attendance on a 0-1 scale. A missing or zero denominator
/// yields 0.
pub fn attendance_fraction(attended: &Cell, total: &Cell) -> f64 {
    let attended = attended.as_number().unwrap_or(0.0);
    let Some(total) = total.as_number() else {
        return 0.0;
    };
    if total == 0.0 {
        return 0.0;
    }
    let rate = attended / total;
    if rate.is_finite() {
        rate.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceCounting {
    /// Number of non-empty comma-separated tokens.
    #[default]
    Tokens,
    /// Longest run of consecutive calendar days among the parseable dates.
    Consecutive,
}

impl AbsenceCounting {
    pub fn count(&self, absence_dates: &str) -> u32 {
        match self {
            AbsenceCounting::Tokens => count_absence_tokens(absence_dates),
            AbsenceCounting::Consecutive => longest_consecutive_run(absence_dates),
        }
    }
}

pub fn count_absence_tokens(absence_dates: &str) -> u32 {
    absence_dates
        .split(',')
        .filter(|token| !token.trim().is_empty())
        .count() as u32
}

pub fn longest_consecutive_run(absence_dates: &str) -> u32 {
    let mut dates: Vec<NaiveDate> = absence_dates
        .split(',')
        .filter_map(|token| parse_absence_date(token.trim()))
        .collect();
    dates.sort();
    dates.dedup();

    let mut longest = 0u32;
    let mut current = 0u32;
    let mut previous: Option<NaiveDate> = None;

    for date in dates {
        current = match previous {
            Some(prev) if (date - prev).num_days() == 1 => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(date);
    }

    longest
}

fn parse_absence_date(token: &str) -> Option<NaiveDate> {
    ABSENCE_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
}
