use std::path::PathBuf;

use thiserror::Error;

use crate::columns::Role;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("required {role} column not found in {table} table")]
    ColumnNotFound { role: Role, table: String },

    #[error("no valid input tables were processed: {}", .0.join("; "))]
    NoUsableInputs(Vec<String>),

    #[error("workbook {} contains no worksheets", .0.display())]
    EmptyWorkbook(PathBuf),

    #[error("unsupported input file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("failed to read spreadsheet: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("snapshot is malformed: {0}")]
    InvalidSnapshot(String),

    #[error("no processed results at {}; run a processing command first", .0.display())]
    MissingSnapshot(PathBuf),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
