use std::collections::BTreeMap;

use tracing::info;

use crate::merge::MergedRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImputationReport {
    pub from_program_mean: usize,
    pub from_overall_mean: usize,
    pub still_missing: usize,
}

/// Fills missing grades with the program mean, then with the mean of the whole
/// column as it stands after the program pass. Attendance is never imputed.
pub fn impute_grades(rows: Vec<MergedRow>) -> (Vec<MergedRow>, ImputationReport) {
    let mut report = ImputationReport::default();

    let program_means: BTreeMap<String, f64> = {
        let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for row in &rows {
            if let Some(grade) = row.grade {
                let entry = sums.entry(row.program_name()).or_insert((0.0, 0));
                entry.0 += grade;
                entry.1 += 1;
            }
        }
        sums.into_iter()
            .map(|(program, (total, count))| (program.to_string(), total / count as f64))
            .collect()
    };

    let rows: Vec<MergedRow> = rows
        .into_iter()
        .map(|mut row| {
            if row.grade.is_none() {
                if let Some(mean) = program_means.get(row.program_name()) {
                    row.grade = Some(*mean);
                    report.from_program_mean += 1;
                }
            }
            row
        })
        .collect();

    let overall_mean = mean(rows.iter().filter_map(|row| row.grade));

    let rows: Vec<MergedRow> = rows
        .into_iter()
        .map(|mut row| {
            if row.grade.is_none() {
                match overall_mean {
                    Some(mean) => {
                        row.grade = Some(mean);
                        report.from_overall_mean += 1;
                    }
                    None => report.still_missing += 1,
                }
            }
            row
        })
        .collect();

    if report.from_program_mean + report.from_overall_mean + report.still_missing > 0 {
        info!(
            program_mean = report.from_program_mean,
            overall_mean = report.from_overall_mean,
            still_missing = report.still_missing,
            "imputed missing grades"
        );
    }

    (rows, report)
}

/// Arithmetic mean, `None` for an empty sequence.
pub fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (total, count) = values.fold((0.0, 0usize), |(total, count), value| (total + value, count + 1));
    (count > 0).then(|| total / count as f64)
}
