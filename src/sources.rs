use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{Cell, RawTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Spreadsheet,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("csv") | Some("txt") => Ok(FileKind::Csv),
            Some("xlsx") | Some("xlsm") | Some("xlsb") | Some("xls") | Some("ods") => Ok(FileKind::Spreadsheet),
            _ => Err(PipelineError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// The two worksheets of a registrar workbook.
#[derive(Debug, Clone)]
pub struct WorkbookTables {
    pub grades: RawTable,
    pub attendance: RawTable,
}

/// Loads a standalone table. Spreadsheets contribute their first worksheet.
pub fn load_table(path: &Path, name: &str) -> Result<RawTable> {
    let table = match FileKind::from_path(path)? {
        FileKind::Csv => load_csv(path, name)?,
        FileKind::Spreadsheet => {
            let mut workbook = open_workbook_auto(path)?;
            let first = workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| PipelineError::EmptyWorkbook(path.to_path_buf()))?;
            let range = workbook.worksheet_range(&first)?;
            range_to_table(name, &range)
        }
    };
    info!(table = name, rows = table.len(), path = %path.display(), "loaded table");
    Ok(table)
}

pub fn load_csv(path: &Path, name: &str) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<Cell> = record.iter().map(Cell::text).collect();
        if row.iter().any(|c| !c.is_empty()) {
            rows.push(row);
        }
    }

    Ok(RawTable::new(name, headers, rows))
}

/// Opens a two-sheet workbook and picks the grades and attendance sheets by
/// name, falling back to the first and second sheet.
pub fn load_workbook(path: &Path) -> Result<WorkbookTables> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names().to_vec();
    debug!(sheets = ?sheet_names, "available worksheets");

    let (grades_index, attendance_index) =
        select_sheets(&sheet_names).ok_or_else(|| PipelineError::EmptyWorkbook(path.to_path_buf()))?;

    let grades_range = workbook.worksheet_range(&sheet_names[grades_index])?;
    let attendance_range = workbook.worksheet_range(&sheet_names[attendance_index])?;

    let tables = WorkbookTables {
        grades: range_to_table("grades", &grades_range),
        attendance: range_to_table("attendance", &attendance_range),
    };
    info!(
        grades_sheet = %sheet_names[grades_index],
        attendance_sheet = %sheet_names[attendance_index],
        grades_rows = tables.grades.len(),
        attendance_rows = tables.attendance.len(),
        "loaded workbook"
    );
    Ok(tables)
}

/// Case-insensitive name match on "grade" / "attendance"; a later matching
/// sheet replaces an earlier one. A sheet named like a grades sheet is never
/// picked as attendance by name.
pub fn select_sheets(names: &[String]) -> Option<(usize, usize)> {
    if names.is_empty() {
        return None;
    }

    let mut grades = None;
    let mut attendance = None;
    for (index, name) in names.iter().enumerate() {
        let lower = name.to_lowercase();
        if lower.contains("grade") {
            grades = Some(index);
        } else if lower.contains("attendance") {
            attendance = Some(index);
        }
    }

    let grades = grades.unwrap_or(0);
    let attendance = attendance.unwrap_or(if names.len() > 1 { 1 } else { 0 });
    Some((grades, attendance))
}

fn range_to_table(name: &str, range: &Range<Data>) -> RawTable {
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .enumerate()
            .map(|(index, value)| {
                data_to_cell(value)
                    .as_text()
                    .unwrap_or_else(|| format!("Unnamed: {index}"))
            })
            .collect(),
        None => Vec::new(),
    };

    let body: Vec<Vec<Cell>> = rows
        .map(|row| row.iter().map(data_to_cell).collect::<Vec<Cell>>())
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect();

    RawTable::new(name, headers, body)
}

fn data_to_cell(value: &Data) -> Cell {
    match value {
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Float(n) => Cell::Number(*n),
        Data::String(s) => Cell::text(s),
        Data::Bool(b) => Cell::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}
