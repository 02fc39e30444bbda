use serde::Deserialize;

use crate::models::{round2, Risk, ThresholdLabel, WeightedLevel};

pub const ACTION_HIGH_RISK: &str = "High Risk: Counseling + academic support + attendance intervention";
pub const ACTION_TUTORING: &str = "Schedule tutoring session and academic mentoring. Develop study plan.";
pub const ACTION_ATTENDANCE: &str =
    "Attendance intervention meeting. Send attendance warning. Time management support.";
pub const ACTION_CONTINUE: &str = "Continue regular progress checks. No immediate concern.";

/// Numeric fields of a canonical record that drive classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskInputs {
    pub grade: Option<f64>,
    pub attendance_rate: Option<f64>,
    pub consecutive_absences: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub risk: Risk,
    pub recommended_action: &'static str,
}

/// A deterministic classification rule.
pub trait RiskStrategy {
    fn assess(&self, inputs: &RiskInputs) -> Assessment;
}

/// Two-sheet workbook rule: independent cutoffs on grade and attendance
/// (0-100 scale). Missing values never count as low.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdRule {
    pub grade_cutoff: f64,
    pub attendance_cutoff: f64,
}

impl Default for ThresholdRule {
    fn default() -> Self {
        Self {
            grade_cutoff: 70.0,
            attendance_cutoff: 70.0,
        }
    }
}

impl RiskStrategy for ThresholdRule {
    fn assess(&self, inputs: &RiskInputs) -> Assessment {
        let grade_low = inputs.grade.is_some_and(|g| g < self.grade_cutoff);
        let attendance_low = inputs
            .attendance_rate
            .is_some_and(|a| a < self.attendance_cutoff);

        let label = if inputs.grade.is_none() && inputs.attendance_rate.is_none() {
            ThresholdLabel::Unknown
        } else if grade_low && attendance_low {
            ThresholdLabel::HighRisk
        } else if grade_low || attendance_low {
            ThresholdLabel::AtRisk
        } else {
            ThresholdLabel::Safe
        };

        Assessment {
            risk: Risk::Threshold(label),
            recommended_action: recommended_action(grade_low, attendance_low),
        }
    }
}

/// Three-file rule: weighted sum of three flags, attendance on a 0-1 scale.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeightedRule {
    pub grade_cutoff: f64,
    pub attendance_cutoff: f64,
    pub absence_limit: u32,
    pub grade_weight: f64,
    pub attendance_weight: f64,
    pub absence_weight: f64,
    pub high_threshold: f64,
    pub medium_threshold: f64,
}

impl Default for WeightedRule {
    fn default() -> Self {
        Self {
            grade_cutoff: 70.0,
            attendance_cutoff: 0.9,
            absence_limit: 2,
            grade_weight: 0.5,
            attendance_weight: 0.3,
            absence_weight: 0.2,
            high_threshold: 0.7,
            medium_threshold: 0.4,
        }
    }
}

impl WeightedRule {
    pub fn score(&self, inputs: &RiskInputs) -> f64 {
        let (grade_flag, attendance_flag, absence_flag) = self.flags(inputs);
        round2(
            self.grade_weight * flag(grade_flag)
                + self.attendance_weight * flag(attendance_flag)
                + self.absence_weight * flag(absence_flag),
        )
    }

    pub fn level_for_score(&self, score: f64) -> WeightedLevel {
        if score >= self.high_threshold {
            WeightedLevel::High
        } else if score >= self.medium_threshold {
            WeightedLevel::Medium
        } else {
            WeightedLevel::Low
        }
    }

    /// Missing grade and attendance read as zero, as the merged defaults do.
    fn flags(&self, inputs: &RiskInputs) -> (bool, bool, bool) {
        (
            inputs.grade.unwrap_or(0.0) < self.grade_cutoff,
            inputs.attendance_rate.unwrap_or(0.0) < self.attendance_cutoff,
            inputs.consecutive_absences > self.absence_limit,
        )
    }
}

impl RiskStrategy for WeightedRule {
    fn assess(&self, inputs: &RiskInputs) -> Assessment {
        let (grade_flag, attendance_flag, absence_flag) = self.flags(inputs);
        let score = self.score(inputs);

        Assessment {
            risk: Risk::Weighted {
                level: self.level_for_score(score),
                score,
            },
            recommended_action: recommended_action(grade_flag, attendance_flag || absence_flag),
        }
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

pub fn recommended_action(grade_low: bool, attendance_low: bool) -> &'static str {
    match (grade_low, attendance_low) {
        (true, true) => ACTION_HIGH_RISK,
        (true, false) => ACTION_TUTORING,
        (false, true) => ACTION_ATTENDANCE,
        (false, false) => ACTION_CONTINUE,
    }
}
