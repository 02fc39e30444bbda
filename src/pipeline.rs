use std::path::PathBuf;

use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::columns::ColumnResolver;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::impute::impute_grades;
use crate::materialize::{materialize, statistics};
use crate::merge::{
    extract_absences, extract_attendance_counts, extract_attendance_percent, extract_grades, MergedRow,
    Origin, Roster, SourceRow,
};
use crate::models::{CanonicalStudentRecord, RawTable, Statistics, UploadSummary};
use crate::risk::{Assessment, RiskInputs, RiskStrategy};
use crate::sources::{load_table, WorkbookTables};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run_id: Uuid,
    pub records: Vec<CanonicalStudentRecord>,
    pub stats: Statistics,
    pub warnings: Vec<String>,
}

impl PipelineOutput {
    pub fn summary(&self) -> UploadSummary {
        UploadSummary::new(self.run_id, &self.stats, self.warnings.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MultiFilePaths {
    pub grades: Option<PathBuf>,
    pub attendance: Option<PathBuf>,
    pub absences: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct MultiFileInputs {
    pub grades: Option<RawTable>,
    pub attendance: Option<RawTable>,
    pub absences: Option<RawTable>,
}

/// Two-sheet workbook path: threshold rule, attendance on a 0-100 scale.
/// Both sheets must carry a student identifier and the grades sheet an
/// overall grade; anything less aborts the run.
pub fn run_workbook(tables: &WorkbookTables, config: &PipelineConfig) -> Result<PipelineOutput> {
    let run_id = Uuid::new_v4();
    let span = info_span!("workbook_run", %run_id);
    let _entered = span.enter();

    let resolver = ColumnResolver::workbook();
    let grades = extract_grades(&tables.grades, &resolver)?;
    let attendance = extract_attendance_percent(&tables.attendance, &resolver)?;

    let roster = Roster::default().merge(&grades).merge(&attendance);
    Ok(finish(run_id, roster, &config.threshold, config, Vec::new()))
}

/// Reads whichever of the three tables were supplied. Files that cannot be
/// read are reported back as rejection messages instead of failing.
pub fn load_multi_file(paths: &MultiFilePaths) -> (MultiFileInputs, Vec<String>) {
    let mut rejected = Vec::new();
    let mut load = |origin: Origin, path: &Option<PathBuf>| -> Option<RawTable> {
        let path = path.as_ref()?;
        match load_table(path, origin.label()) {
            Ok(table) => Some(table),
            Err(err) => {
                rejected.push(format!("Error processing {} file: {err}", origin.label()));
                None
            }
        }
    };

    let inputs = MultiFileInputs {
        grades: load(Origin::Grades, &paths.grades),
        attendance: load(Origin::Attendance, &paths.attendance),
        absences: load(Origin::Absences, &paths.absences),
    };
    (inputs, rejected)
}

/// Three-table path: weighted rule, attendance on a 0-1 scale. A table that
/// fails validation is excluded with a warning; the run fails only when no
/// table survives.
pub fn run_multi_file(
    inputs: &MultiFileInputs,
    rejected: Vec<String>,
    config: &PipelineConfig,
) -> Result<PipelineOutput> {
    let run_id = Uuid::new_v4();
    let span = info_span!("multi_file_run", %run_id);
    let _entered = span.enter();

    let resolver = ColumnResolver::multi_file();
    let mut warnings = rejected;
    let mut accepted: Vec<Vec<SourceRow>> = Vec::new();

    let candidates = [
        (Origin::Grades, inputs.grades.as_ref()),
        (Origin::Attendance, inputs.attendance.as_ref()),
        (Origin::Absences, inputs.absences.as_ref()),
    ];

    for (origin, table) in candidates {
        let Some(table) = table else { continue };
        let extracted = match origin {
            Origin::Grades => extract_grades(table, &resolver),
            Origin::Attendance => extract_attendance_counts(table, &resolver),
            Origin::Absences => extract_absences(table, &resolver, config.absence_counting),
        };

        match extracted {
            Ok(rows) => {
                info!(table = origin.label(), records = rows.len(), "accepted table");
                accepted.push(rows);
            }
            Err(err) => {
                warn!(table = origin.label(), error = %err, "excluded table");
                warnings.push(format!("{} file validation failed: {err}", capitalize(origin.label())));
            }
        }
    }

    if accepted.is_empty() {
        return Err(PipelineError::NoUsableInputs(warnings));
    }

    let roster = accepted
        .iter()
        .fold(Roster::default(), |roster, rows| roster.merge(rows));
    Ok(finish(run_id, roster, &config.weighted, config, warnings))
}

pub fn classify(rows: Vec<MergedRow>, strategy: &dyn RiskStrategy) -> Vec<(MergedRow, Assessment)> {
    rows.into_iter()
        .map(|row| {
            let assessment = strategy.assess(&RiskInputs {
                grade: row.grade,
                attendance_rate: row.attendance_rate,
                consecutive_absences: row.absence_count,
            });
            (row, assessment)
        })
        .collect()
}

fn finish(
    run_id: Uuid,
    roster: Roster,
    strategy: &dyn RiskStrategy,
    config: &PipelineConfig,
    warnings: Vec<String>,
) -> PipelineOutput {
    let (rows, _) = impute_grades(roster.into_rows());
    let records = materialize(classify(rows, strategy), &config.email_domain);
    let stats = statistics(&records);

    info!(
        students = stats.total_students,
        at_risk = stats.at_risk_count,
        safe = stats.safe_count,
        warnings = warnings.len(),
        "pipeline finished"
    );

    PipelineOutput {
        run_id,
        records,
        stats,
        warnings,
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::Role;
    use crate::models::{Cell, Risk, ThresholdLabel, WeightedLevel};
    use crate::risk::{ACTION_ATTENDANCE, ACTION_TUTORING};
    use crate::sources::fixtures::write_workbook;
    use crate::sources::load_workbook;

    fn table(name: &str, headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            name,
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|v| Cell::text(v)).collect())
                .collect(),
        )
    }

    fn workbook(grades: &[&[&str]], attendance: &[&[&str]]) -> WorkbookTables {
        WorkbookTables {
            grades: table("grades", &["Student#", "Student Name", "Program Name", "Current Grade"], grades),
            attendance: table(
                "attendance",
                &["Student #", "Student Name", "Attended % to Date", "Attended Hours to Date", "Scheduled Hours to Date"],
                attendance,
            ),
        }
    }

    fn record<'a>(output: &'a PipelineOutput, id: &str) -> &'a CanonicalStudentRecord {
        output
            .records
            .iter()
            .find(|r| r.student_id.as_str() == id)
            .unwrap()
    }

    #[test]
    fn workbook_scenario_flags_each_trigger_separately() {
        let tables = workbook(
            &[&["A1", "Alex Kim", "Nursing", "65"], &["B2", "Bea Ruiz", "Nursing", "85"]],
            &[&["A1", "", "95", "", ""], &["B2", "", "60", "", ""]],
        );
        let output = run_workbook(&tables, &PipelineConfig::default()).unwrap();

        let a = record(&output, "A1");
        let b = record(&output, "B2");
        assert_eq!(a.risk, Risk::Threshold(ThresholdLabel::AtRisk));
        assert_eq!(b.risk, Risk::Threshold(ThresholdLabel::AtRisk));
        assert_eq!(a.recommended_action, ACTION_TUTORING);
        assert_eq!(b.recommended_action, ACTION_ATTENDANCE);
        assert_eq!(a.email, "alex.kim@college.ca");
        assert_eq!(output.stats.at_risk_count, 2);
        assert_eq!(output.stats.safe_count, 0);
    }

    #[test]
    fn workbook_covers_students_from_either_sheet_once() {
        let tables = workbook(
            &[
                &["1", "Ana", "Nursing", "B"],
                &["2", "Ben", "Nursing", ""],
                &["1", "Ana Again", "Nursing", "F"],
            ],
            &[&["2", "Ben", "", "30", "40"], &["3", "Cy", "", "", ""]],
        );
        let output = run_workbook(&tables, &PipelineConfig::default()).unwrap();

        let ids: Vec<&str> = output.records.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        let ana = record(&output, "1");
        assert_eq!(ana.student_name, "Ana");
        assert_eq!(ana.grade, 83.0);

        // Ben has no grade: Nursing mean over both Ana rows.
        let ben = record(&output, "2");
        assert_eq!(ben.grade, (83.0 + 50.0) / 2.0);
        assert_eq!(ben.attendance_rate, 75.0);

        // Cy only appears on the attendance sheet.
        let cy = record(&output, "3");
        assert_eq!(cy.program, "Unknown");
        assert_eq!(cy.attendance_rate, 0.0);
        assert!(output.records.iter().all(|r| r.grade > 0.0));
    }

    #[test]
    fn workbook_without_grade_column_aborts() {
        let tables = WorkbookTables {
            grades: table("grades", &["Student#", "Student Name"], &[&["1", "Ana"]]),
            attendance: table("attendance", &["Student#"], &[&["1"]]),
        };
        let err = run_workbook(&tables, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ColumnNotFound { role: Role::Grade, .. }));
    }

    #[test]
    fn workbook_attendance_sheet_needs_identifier() {
        let tables = WorkbookTables {
            grades: table("grades", &["Student#", "Current Grade"], &[&["1", "90"]]),
            attendance: table("attendance", &["Learner", "Attended % to Date"], &[&["1", "90"]]),
        };
        let err = run_workbook(&tables, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ColumnNotFound { role: Role::StudentId, .. }));
    }

    #[test]
    fn repeated_runs_produce_identical_records() {
        let tables = workbook(
            &[
                &["9", "Zed", "Welding", ""],
                &["1", "Ana", "Nursing", "0.71"],
                &["5", "Moe", "Plumbing", "C-"],
            ],
            &[&["5", "", "", "10", "20"], &["9", "", "99", "", ""]],
        );
        let first = run_workbook(&tables, &PipelineConfig::default()).unwrap();
        let second = run_workbook(&tables, &PipelineConfig::default()).unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(first.stats, second.stats);
    }

    fn grades_table(rows: &[&[&str]]) -> RawTable {
        table("grades", &["Student ID", "Student Name", "Grade", "Program"], rows)
    }

    fn attendance_table(rows: &[&[&str]]) -> RawTable {
        table("attendance", &["Student ID", "Student Name", "Classes Attended", "Total Classes", "Program"], rows)
    }

    #[test]
    fn empty_absences_table_keeps_zero_absences() {
        let inputs = MultiFileInputs {
            grades: Some(grades_table(&[&["1", "Ana", "92", "Nursing"], &["2", "Ben", "64", "Nursing"]])),
            attendance: Some(attendance_table(&[&["1", "Ana", "19", "20", ""], &["2", "Ben", "12", "20", ""]])),
            absences: Some(table("absences", &["Student ID", "Student Name", "Absence Dates", "Program"], &[])),
        };
        let output = run_multi_file(&inputs, Vec::new(), &PipelineConfig::default()).unwrap();

        assert_eq!(output.records.len(), 2);
        assert!(output.records.iter().all(|r| r.consecutive_absences == 0));
        assert!(output.warnings.is_empty());

        let ana = record(&output, "1");
        assert_eq!(ana.attendance_rate, 0.95);
        assert_eq!(ana.risk, Risk::Weighted { level: WeightedLevel::Low, score: 0.0 });
        let ben = record(&output, "2");
        assert_eq!(ben.risk, Risk::Weighted { level: WeightedLevel::High, score: 0.8 });
    }

    #[test]
    fn blank_total_classes_reads_as_zero_attendance() {
        let inputs = MultiFileInputs {
            grades: Some(grades_table(&[&["1", "Ana", "92", "Nursing"]])),
            attendance: Some(attendance_table(&[&["1", "Ana", "18", "", ""]])),
            absences: None,
        };
        let output = run_multi_file(&inputs, Vec::new(), &PipelineConfig::default()).unwrap();

        let ana = record(&output, "1");
        assert_eq!(ana.attendance_rate, 0.0);
        assert_eq!(ana.risk, Risk::Weighted { level: WeightedLevel::Low, score: 0.3 });
        assert_eq!(ana.recommended_action, ACTION_ATTENDANCE);
    }

    #[test]
    fn absence_tokens_raise_weighted_score() {
        let inputs = MultiFileInputs {
            grades: Some(grades_table(&[&["1", "Ana", "92", "Nursing"]])),
            attendance: Some(attendance_table(&[&["1", "Ana", "20", "20", ""]])),
            absences: Some(table(
                "absences",
                &["Student ID", "Absence Dates"],
                &[&["1", "2024-01-02,2024-01-09,2024-01-16"]],
            )),
        };
        let output = run_multi_file(&inputs, Vec::new(), &PipelineConfig::default()).unwrap();
        let ana = record(&output, "1");
        assert_eq!(ana.consecutive_absences, 3);
        assert_eq!(ana.risk, Risk::Weighted { level: WeightedLevel::Low, score: 0.2 });
        assert_eq!(ana.recommended_action, ACTION_ATTENDANCE);
    }

    #[test]
    fn invalid_optional_table_becomes_a_warning() {
        let inputs = MultiFileInputs {
            grades: Some(grades_table(&[&["1", "Ana", "92", "Nursing"]])),
            attendance: None,
            absences: Some(table("absences", &["Student ID", "Notes"], &[&["1", "late"]])),
        };
        let output = run_multi_file(&inputs, Vec::new(), &PipelineConfig::default()).unwrap();
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].starts_with("Absences file validation failed"));
    }

    #[test]
    fn no_usable_tables_reports_every_rejection() {
        let inputs = MultiFileInputs {
            grades: Some(table("grades", &["Student ID", "Score"], &[])),
            attendance: Some(table("attendance", &["Name"], &[])),
            absences: None,
        };
        let rejected = vec!["Error processing absences file: unreadable".to_string()];
        let err = run_multi_file(&inputs, rejected, &PipelineConfig::default()).unwrap_err();

        match err {
            PipelineError::NoUsableInputs(messages) => {
                assert_eq!(messages.len(), 3);
                assert!(messages[1].starts_with("Grades file validation failed"));
                assert!(messages[2].starts_with("Attendance file validation failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn grades_default_to_zero_when_none_are_known() {
        let inputs = MultiFileInputs {
            grades: None,
            attendance: Some(attendance_table(&[&["1", "Ana", "18", "20", "Nursing"]])),
            absences: None,
        };
        let output = run_multi_file(&inputs, Vec::new(), &PipelineConfig::default()).unwrap();
        let ana = record(&output, "1");
        assert_eq!(ana.grade, 0.0);
        assert_eq!(ana.program, "Nursing");
        assert_eq!(ana.risk, Risk::Weighted { level: WeightedLevel::Medium, score: 0.5 });
    }

    #[test]
    fn duplicate_students_keep_first_payload() {
        let inputs = MultiFileInputs {
            grades: Some(grades_table(&[
                &["1", "Ana", "95", "Nursing"],
                &["1", "Ana Copy", "40", "Nursing"],
                &["2", "Ben", "80", "Nursing"],
            ])),
            attendance: None,
            absences: None,
        };
        let output = run_multi_file(&inputs, Vec::new(), &PipelineConfig::default()).unwrap();
        assert_eq!(output.records.len(), 2);
        let ana = record(&output, "1");
        assert_eq!(ana.student_name, "Ana");
        assert_eq!(ana.grade, 95.0);
        assert_eq!(output.stats.total_students, 2);
    }

    #[test]
    fn unreadable_files_are_collected_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let grades = dir.path().join("grades.csv");
        std::fs::write(&grades, "Student ID,Student Name,Grade,Program\n1,Ana,88,Nursing\n").unwrap();

        let paths = MultiFilePaths {
            grades: Some(grades),
            attendance: Some(dir.path().join("missing.csv")),
            absences: Some(dir.path().join("absences.pdf")),
        };
        let (inputs, rejected) = load_multi_file(&paths);
        assert!(inputs.grades.is_some());
        assert_eq!(rejected.len(), 2);

        let output = run_multi_file(&inputs, rejected, &PipelineConfig::default()).unwrap();
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.warnings.len(), 2);
    }

    #[test]
    fn workbook_file_runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("term.xlsx");
        write_workbook(
            &path,
            &[
                (
                    "Grades",
                    &[
                        &["Student#", "Student Name", "Program Name", "Overall Grade"],
                        &["5600001", "Ana Diaz", "Nursing", "0.58"],
                        &["5600002", "Ben Ode", "Nursing", "A-"],
                    ],
                ),
                (
                    "Attendance",
                    &[
                        &["Student#", "Student Name", "Attended % to Date"],
                        &["5600001", "Ana Diaz", "55"],
                        &["5600002", "Ben Ode", "97"],
                    ],
                ),
            ],
        );

        let tables = load_workbook(&path).unwrap();
        let output = run_workbook(&tables, &PipelineConfig::default()).unwrap();
        assert_eq!(output.records.len(), 2);

        let ana = record(&output, "5600001");
        assert_eq!(ana.risk, Risk::Threshold(ThresholdLabel::HighRisk));
        assert_eq!(ana.program, "Nursing");
        let ben = record(&output, "5600002");
        assert_eq!(ben.risk, Risk::Threshold(ThresholdLabel::Safe));
        assert_eq!(ben.grade, 90.0);

        let summary = output.summary();
        assert_eq!(summary.students_processed, 2);
        assert_eq!(summary.avg_attendance, 76.0);
    }
}
