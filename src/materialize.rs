use std::collections::HashSet;

use tracing::info;

use crate::impute::mean;
use crate::merge::MergedRow;
use crate::models::{CanonicalStudentRecord, Statistics};
use crate::risk::Assessment;

/// Drops repeated student ids keeping the first row seen, then fixes every
/// remaining gap: missing grade and attendance become 0.0.
pub fn materialize(
    assessed: Vec<(MergedRow, Assessment)>,
    email_domain: &str,
) -> Vec<CanonicalStudentRecord> {
    let incoming = assessed.len();
    let mut seen = HashSet::new();

    let records: Vec<CanonicalStudentRecord> = assessed
        .into_iter()
        .filter(|(row, _)| seen.insert(row.key.clone()))
        .map(|(row, assessment)| {
            let student_name = row.student_name().to_string();
            CanonicalStudentRecord {
                email: synthetic_email(&student_name, email_domain),
                program: row.program_name().to_string(),
                student_name,
                grade: row.grade.unwrap_or(0.0),
                attendance_rate: row.attendance_rate.unwrap_or(0.0),
                consecutive_absences: row.absence_count,
                risk: assessment.risk,
                recommended_action: assessment.recommended_action.to_string(),
                student_id: row.key,
            }
        })
        .collect();

    let removed = incoming - records.len();
    if removed > 0 {
        info!(removed, "dropped duplicate student rows");
    }

    records
}

pub fn synthetic_email(student_name: &str, domain: &str) -> String {
    format!("{}@{}", student_name.trim().to_lowercase().replace(' ', "."), domain)
}

/// Aggregates over the materialized set; means of an empty set are 0.0.
pub fn statistics(records: &[CanonicalStudentRecord]) -> Statistics {
    Statistics {
        total_students: records.len(),
        at_risk_count: records.iter().filter(|r| r.risk.is_at_risk()).count(),
        safe_count: records.iter().filter(|r| r.risk.is_safe()).count(),
        avg_grade: mean(records.iter().map(|r| r.grade)).unwrap_or(0.0),
        avg_attendance: mean(records.iter().map(|r| r.attendance_rate)).unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{Payload, Roster, SourceRow};
    use crate::models::{Risk, StudentKey, ThresholdLabel, WeightedLevel};
    use crate::risk::{ACTION_CONTINUE, ACTION_TUTORING};

    fn merged(rows: &[(&str, &str, Option<f64>)]) -> Vec<MergedRow> {
        let source: Vec<SourceRow> = rows
            .iter()
            .map(|(id, name, grade)| SourceRow {
                key: StudentKey::from(*id),
                name: Some(name.to_string()),
                program: None,
                payload: Payload::Grade(*grade),
            })
            .collect();
        Roster::default().merge(&source).into_rows()
    }

    fn assessed(rows: Vec<MergedRow>, label: ThresholdLabel) -> Vec<(MergedRow, Assessment)> {
        rows.into_iter()
            .map(|row| {
                (
                    row,
                    Assessment {
                        risk: Risk::Threshold(label),
                        recommended_action: ACTION_CONTINUE,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn first_duplicate_wins() {
        let rows = merged(&[
            ("7", "First Copy", Some(90.0)),
            ("8", "Other", Some(70.0)),
            ("7", "Second Copy", Some(10.0)),
        ]);
        let records = materialize(assessed(rows, ThresholdLabel::Safe), "college.ca");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].student_id.as_str(), "7");
        assert_eq!(records[0].student_name, "First Copy");
        assert_eq!(records[0].grade, 90.0);
        assert_eq!(records[1].student_id.as_str(), "8");
    }

    #[test]
    fn gaps_are_coerced_and_email_is_derived() {
        let rows = merged(&[("1", "Mary Ann Lee", None)]);
        let records = materialize(assessed(rows, ThresholdLabel::Unknown), "example.edu");
        let record = &records[0];

        assert_eq!(record.grade, 0.0);
        assert_eq!(record.attendance_rate, 0.0);
        assert_eq!(record.program, "Unknown");
        assert_eq!(record.email, "mary.ann.lee@example.edu");
    }

    #[test]
    fn statistics_count_both_label_sets() {
        let mut records = materialize(
            assessed(merged(&[("1", "A", Some(60.0)), ("2", "B", Some(80.0))]), ThresholdLabel::AtRisk),
            "college.ca",
        );
        records[1].risk = Risk::Weighted {
            level: WeightedLevel::Low,
            score: 0.3,
        };
        records[1].recommended_action = ACTION_TUTORING.to_string();
        records[0].attendance_rate = 50.0;

        let stats = statistics(&records);
        assert_eq!(stats.total_students, 2);
        assert_eq!(stats.at_risk_count, 1);
        assert_eq!(stats.safe_count, 1);
        assert_eq!(stats.avg_grade, 70.0);
        assert_eq!(stats.avg_attendance, 25.0);
    }

    #[test]
    fn empty_result_set_has_zero_means() {
        let stats = statistics(&[]);
        assert_eq!(stats, Statistics::default());
    }
}
