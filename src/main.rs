use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};

mod columns;
mod config;
mod error;
mod impute;
mod logging;
mod materialize;
mod merge;
mod models;
mod normalize;
mod pipeline;
mod report;
mod risk;
mod sources;
mod store;

use config::PipelineConfig;
use models::{format_number, CanonicalStudentRecord, UploadSummary};
use pipeline::MultiFilePaths;
use store::SnapshotStore;

#[derive(Parser)]
#[command(name = "student-risk-reconciler")]
#[command(about = "Reconciles registrar exports into one at-risk student roster", long_about = None)]
struct Cli {
    /// TOML configuration file (falls back to $STUDENT_RISK_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a two-sheet grades + attendance workbook
    ProcessWorkbook {
        #[arg(long)]
        file: PathBuf,
        /// Snapshot destination, overriding the configured path
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Merge separate grades, attendance and absence files
    #[command(group(
        ArgGroup::new("inputs")
            .args(["grades", "attendance", "absences"])
            .required(true)
            .multiple(true)
    ))]
    Merge {
        #[arg(long)]
        grades: Option<PathBuf>,
        #[arg(long)]
        attendance: Option<PathBuf>,
        #[arg(long)]
        absences: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show the latest processed results, most severe first
    Results {
        #[arg(long)]
        at_risk_only: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report from the latest results
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::ProcessWorkbook { file, out, json } => {
            let store = SnapshotStore::new(out.unwrap_or_else(|| config.snapshot_path.clone()));
            let output = store
                .publish(move || {
                    let tables = sources::load_workbook(&file)?;
                    pipeline::run_workbook(&tables, &config)
                })
                .await
                .context("workbook processing failed")?;
            print_summary(&output.summary(), json)?;
            if !json {
                println!("Results saved to {}.", store.path().display());
            }
        }
        Commands::Merge {
            grades,
            attendance,
            absences,
            out,
            json,
        } => {
            let store = SnapshotStore::new(out.unwrap_or_else(|| config.snapshot_path.clone()));
            let paths = MultiFilePaths {
                grades,
                attendance,
                absences,
            };
            let output = store
                .publish(move || {
                    let (inputs, rejected) = pipeline::load_multi_file(&paths);
                    pipeline::run_multi_file(&inputs, rejected, &config)
                })
                .await
                .context("multi-file processing failed")?;
            print_summary(&output.summary(), json)?;
            if !json {
                println!("Results saved to {}.", store.path().display());
            }
        }
        Commands::Results {
            at_risk_only,
            limit,
            json,
        } => {
            let records = SnapshotStore::new(&config.snapshot_path).load()?;
            let mut selected = store::query(&records, at_risk_only);
            if let Some(limit) = limit {
                selected.truncate(limit);
            }

            if json {
                let rows: Vec<serde_json::Value> = selected.iter().map(result_json).collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if selected.is_empty() {
                println!("No students match.");
            } else {
                for record in &selected {
                    println!(
                        "- {} ({}, {}) {} grade {} attendance {} absences {}: {}",
                        record.student_name,
                        record.student_id,
                        record.program,
                        record.risk,
                        format_number(record.grade),
                        format_number(record.attendance_rate),
                        record.consecutive_absences,
                        record.recommended_action
                    );
                }
            }
        }
        Commands::Report { out } => {
            let records = SnapshotStore::new(&config.snapshot_path).load()?;
            let stats = materialize::statistics(&records);
            let report = report::build_report(&records, &stats, Utc::now());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn print_summary(summary: &UploadSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} (run {}).", summary.message, summary.run_id);
    println!(
        "At risk: {}, safe: {}, avg grade {:.2}, avg attendance {:.2}",
        summary.at_risk_count, summary.safe_count, summary.avg_grade, summary.avg_attendance
    );
    for warning in &summary.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}

fn result_json(record: &CanonicalStudentRecord) -> serde_json::Value {
    serde_json::json!({
        "student_id": record.student_id,
        "student_name": record.student_name,
        "program": record.program,
        "grade": record.grade,
        "attendance_rate": record.attendance_rate,
        "consecutive_absences": record.consecutive_absences,
        "risk_label": record.risk.label(),
        "risk_score": record.risk.score(),
        "recommended_action": record.recommended_action,
        "email": record.email,
    })
}
