use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::{CanonicalStudentRecord, Risk, StudentKey};
use crate::pipeline::PipelineOutput;

const SNAPSHOT_COLUMNS: [&str; 10] = [
    "student_id",
    "student_name",
    "program",
    "grade",
    "attendance_rate",
    "consecutive_absences",
    "risk_score",
    "risk_label",
    "recommended_action",
    "email",
];

/// One snapshot line; field order matches `SNAPSHOT_COLUMNS`.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRow {
    student_id: StudentKey,
    student_name: String,
    program: String,
    grade: f64,
    attendance_rate: f64,
    consecutive_absences: u32,
    risk_score: Option<f64>,
    risk_label: String,
    recommended_action: String,
    email: String,
}

impl From<&CanonicalStudentRecord> for SnapshotRow {
    fn from(record: &CanonicalStudentRecord) -> Self {
        Self {
            student_id: record.student_id.clone(),
            student_name: record.student_name.clone(),
            program: record.program.clone(),
            grade: record.grade,
            attendance_rate: record.attendance_rate,
            consecutive_absences: record.consecutive_absences,
            risk_score: record.risk.score(),
            risk_label: record.risk.label().to_string(),
            recommended_action: record.recommended_action.clone(),
            email: record.email.clone(),
        }
    }
}

impl TryFrom<SnapshotRow> for CanonicalStudentRecord {
    type Error = PipelineError;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        let risk = Risk::from_parts(&row.risk_label, row.risk_score).ok_or_else(|| {
            PipelineError::InvalidSnapshot(format!(
                "student {} has unknown risk label '{}'",
                row.student_id, row.risk_label
            ))
        })?;

        Ok(CanonicalStudentRecord {
            student_id: row.student_id,
            student_name: row.student_name,
            program: row.program,
            grade: row.grade,
            attendance_rate: row.attendance_rate,
            consecutive_absences: row.consecutive_absences,
            risk,
            recommended_action: row.recommended_action,
            email: row.email,
        })
    }
}

/// Replaces the snapshot with `records`. Rows go to a sibling temporary file
/// first so a failed write never clobbers the previous snapshot.
pub fn write_snapshot(path: &Path, records: &[CanonicalStudentRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let staging = staging_path(path);
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&staging)?;
        writer.write_record(SNAPSHOT_COLUMNS)?;
        for record in records {
            writer.serialize(SnapshotRow::from(record))?;
        }
        writer.flush()?;
    }
    std::fs::rename(&staging, path)?;

    info!(path = %path.display(), records = records.len(), "wrote snapshot");
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn read_snapshot(path: &Path) -> Result<Vec<CanonicalStudentRecord>> {
    if !path.exists() {
        return Err(PipelineError::MissingSnapshot(path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize::<SnapshotRow>() {
        records.push(CanonicalStudentRecord::try_from(row?)?);
    }
    Ok(records)
}

/// Optionally keeps only at-risk students, then orders most severe first.
/// The sort is stable, so ties keep snapshot order.
pub fn query(records: &[CanonicalStudentRecord], at_risk_only: bool) -> Vec<CanonicalStudentRecord> {
    let mut selected: Vec<CanonicalStudentRecord> = records
        .iter()
        .filter(|r| !at_risk_only || r.risk.is_at_risk())
        .cloned()
        .collect();
    selected.sort_by_key(|r| r.risk.severity_rank());
    selected
}

/// Owner of the snapshot file. Processing runs are serialized so that two
/// concurrent uploads cannot interleave their writes.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `job` off the async runtime and writes its records only if it
    /// succeeded.
    pub async fn publish<F>(&self, job: F) -> Result<PipelineOutput>
    where
        F: FnOnce() -> Result<PipelineOutput> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let output = tokio::task::spawn_blocking(job).await??;

        let path = self.path.clone();
        let records = output.records.clone();
        tokio::task::spawn_blocking(move || write_snapshot(&path, &records)).await??;
        Ok(output)
    }

    pub fn load(&self) -> Result<Vec<CanonicalStudentRecord>> {
        read_snapshot(&self.path)
    }
}
