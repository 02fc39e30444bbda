use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{CanonicalStudentRecord, ProgramSummary, Statistics};
use crate::store;

pub fn summarize_by_program(records: &[CanonicalStudentRecord]) -> Vec<ProgramSummary> {
    let mut map: HashMap<String, (usize, usize, f64)> = HashMap::new();

    for record in records {
        let entry = map.entry(record.program.clone()).or_insert((0, 0, 0.0));
        entry.0 += 1;
        if record.risk.is_at_risk() {
            entry.1 += 1;
        }
        entry.2 += record.grade;
    }

    let mut summaries: Vec<ProgramSummary> = map
        .into_iter()
        .map(|(program, (students, at_risk, total_grade))| ProgramSummary {
            program,
            students,
            at_risk,
            avg_grade: if students == 0 {
                0.0
            } else {
                total_grade / students as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.students.cmp(&a.students).then_with(|| a.program.cmp(&b.program)));
    summaries
}

pub fn build_report(
    records: &[CanonicalStudentRecord],
    stats: &Statistics,
    generated_at: DateTime<Utc>,
) -> String {
    let summaries = summarize_by_program(records);
    let flagged = store::query(records, true);

    let mut output = String::new();

    let _ = writeln!(output, "# Student Risk Report");
    let _ = writeln!(
        output,
        "Generated {} from {} processed students",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        stats.total_students
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- At risk: {}", stats.at_risk_count);
    let _ = writeln!(output, "- Safe: {}", stats.safe_count);
    let _ = writeln!(output, "- Average grade: {:.2}", stats.avg_grade);
    let _ = writeln!(output, "- Average attendance: {:.2}", stats.avg_attendance);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Programs");

    if summaries.is_empty() {
        let _ = writeln!(output, "No students in the current results.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students, {} at risk (avg grade {:.1})",
                summary.program, summary.students, summary.at_risk, summary.avg_grade
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");

    if flagged.is_empty() {
        let _ = writeln!(output, "No students are currently flagged.");
    } else {
        for record in flagged.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) {}: {}",
                record.student_name, record.student_id, record.program, record.risk, record.recommended_action
            );
        }
    }

    output
}
