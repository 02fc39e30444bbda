use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::normalize::AbsenceCounting;
use crate::risk::{ThresholdRule, WeightedRule};

pub const CONFIG_ENV: &str = "STUDENT_RISK_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Flat file holding the latest successful run.
    pub snapshot_path: PathBuf,
    pub email_domain: String,
    pub absence_counting: AbsenceCounting,
    pub threshold: ThresholdRule,
    pub weighted: WeightedRule,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/processed_students.csv"),
            email_domain: "college.ca".to_string(),
            absence_counting: AbsenceCounting::Tokens,
            threshold: ThresholdRule::default(),
            weighted: WeightedRule::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Explicit path first, then the environment variable, then defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(value) => Self::load_from_file(Path::new(&value)),
                None => Ok(Self::default()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
email_domain = "school.example"
absence_counting = "consecutive"

[weighted]
attendance_cutoff = 0.85
"#
        )
        .unwrap();

        let config = PipelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.email_domain, "school.example");
        assert_eq!(config.absence_counting, AbsenceCounting::Consecutive);
        assert_eq!(config.weighted.attendance_cutoff, 0.85);
        assert_eq!(config.weighted.grade_weight, 0.5);
        assert_eq!(config.threshold, ThresholdRule::default());
        assert_eq!(config.snapshot_path, PathBuf::from("data/processed_students.csv"));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "email_domain = [").unwrap();
        let err = PipelineConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().starts_with("configuration error"));
    }
}
