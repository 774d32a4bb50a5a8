//! Per-era workbook ingestion.
//!
//! The four source workbooks share no schema: sheet names, header offsets
//! and column sets all drifted between publication eras. One reader handles
//! them all, parameterized by an `EraSchema` descriptor, and returns a typed
//! outcome so the caller can tell a missing file from a renamed sheet from a
//! corrupt workbook.

use anyhow::{anyhow, Result};
use calamine::{open_workbook, Data, DataType as CellTrait, Range, Reader, Xls, Xlsx};
use polars::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Spreadsheet parser engine, selected purely by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookEngine {
    /// Pre-OOXML `.xls` binary format.
    Legacy,
    /// `.xlsx` and everything else.
    Modern,
}

pub fn engine_for(path: &Path) -> WorkbookEngine {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xls") => WorkbookEngine::Legacy,
        _ => WorkbookEngine::Modern,
    }
}

/// Fixed per-era source descriptor: which file, which sheet, how many junk
/// rows sit above the header.
#[derive(Debug, Clone, Copy)]
pub struct EraSchema {
    pub label: &'static str,
    pub file_name: &'static str,
    pub sheet_name: &'static str,
    pub skip_rows: usize,
}

pub const ERA_SCHEMAS: [EraSchema; 4] = [
    EraSchema {
        label: "2011",
        file_name: "Hourly-load-by-area-and-region-2011-to-2017.xlsx",
        sheet_name: "Load by AESO Planning Area",
        skip_rows: 1,
    },
    EraSchema {
        label: "2017",
        file_name: "Hourly-load-by-area-and-region-2017-2020.xlsx",
        sheet_name: "Load by Area and Region",
        skip_rows: 0,
    },
    EraSchema {
        label: "2020",
        file_name: "Hourly-load-by-area-and-region-May-2020-to-Oct-2023.xlsx",
        sheet_name: "Sheet1",
        skip_rows: 0,
    },
    EraSchema {
        label: "2023",
        file_name: "Hourly-load-by-area-and-region-Nov-2023-to-Dec-2024.xlsx",
        sheet_name: "Sheet1",
        skip_rows: 0,
    },
];

/// Why a source was left out of the merge.
#[derive(Debug)]
pub enum SkipReason {
    MissingFile(PathBuf),
    SheetNotFound { file: PathBuf, sheet: String },
    Unreadable { file: PathBuf, detail: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingFile(p) => write!(f, "file not found: {}", p.display()),
            SkipReason::SheetNotFound { file, sheet } => {
                write!(f, "sheet {:?} not found in {}", sheet, file.display())
            }
            SkipReason::Unreadable { file, detail } => {
                write!(f, "could not read {}: {}", file.display(), detail)
            }
        }
    }
}

/// Result of attempting one era's workbook.
pub enum SourceOutcome {
    Loaded { era: &'static str, frame: DataFrame },
    Skipped { era: &'static str, reason: SkipReason },
}

/// Read one era's workbook from `raw_dir`, never failing the overall build.
pub fn read_era(raw_dir: &Path, era: &EraSchema) -> SourceOutcome {
    let path = raw_dir.join(era.file_name);
    if !path.exists() {
        return SourceOutcome::Skipped {
            era: era.label,
            reason: SkipReason::MissingFile(path),
        };
    }

    let range = match load_sheet(&path, era.sheet_name) {
        Ok(range) => range,
        Err(reason) => {
            return SourceOutcome::Skipped {
                era: era.label,
                reason,
            }
        }
    };

    match range_to_frame(&range, era.skip_rows) {
        Ok(frame) => SourceOutcome::Loaded {
            era: era.label,
            frame,
        },
        Err(e) => SourceOutcome::Skipped {
            era: era.label,
            reason: SkipReason::Unreadable {
                file: path,
                detail: e.to_string(),
            },
        },
    }
}

fn load_sheet(path: &Path, sheet: &str) -> std::result::Result<Range<Data>, SkipReason> {
    let unreadable = |detail: String| SkipReason::Unreadable {
        file: path.to_path_buf(),
        detail,
    };

    match engine_for(path) {
        WorkbookEngine::Legacy => {
            let mut wb: Xls<std::io::BufReader<std::fs::File>> =
                open_workbook(path).map_err(|e: calamine::XlsError| unreadable(e.to_string()))?;
            if !wb.sheet_names().iter().any(|s| s == sheet) {
                return Err(SkipReason::SheetNotFound {
                    file: path.to_path_buf(),
                    sheet: sheet.to_string(),
                });
            }
            wb.worksheet_range(sheet)
                .map_err(|e| unreadable(e.to_string()))
        }
        WorkbookEngine::Modern => {
            let mut wb: Xlsx<std::io::BufReader<std::fs::File>> =
                open_workbook(path).map_err(|e: calamine::XlsxError| unreadable(e.to_string()))?;
            if !wb.sheet_names().iter().any(|s| s == sheet) {
                return Err(SkipReason::SheetNotFound {
                    file: path.to_path_buf(),
                    sheet: sheet.to_string(),
                });
            }
            wb.worksheet_range(sheet)
                .map_err(|e| unreadable(e.to_string()))
        }
    }
}

/// Convert a sheet range to a DataFrame: the first row after `skip_rows` is
/// the header, and each column is typed from its cells (datetime if any cell
/// is a date, numeric when anything parses, text otherwise).
pub fn range_to_frame(range: &Range<Data>, skip_rows: usize) -> Result<DataFrame> {
    let mut rows = range.rows().skip(skip_rows);
    let header_row = rows.next().ok_or_else(|| anyhow!("sheet has no header row"))?;
    let data_rows: Vec<&[Data]> = rows.collect();

    let headers = mangle_headers(header_row);

    let mut columns = Vec::with_capacity(headers.len());
    for (idx, name) in headers.iter().enumerate() {
        let cells: Vec<&Data> = data_rows.iter().map(|r| &r[idx]).collect();
        columns.push(build_column(name, &cells)?);
    }

    Ok(DataFrame::new(columns)?)
}

/// Header cells become trimmed strings; blanks get their column index as a
/// name (the purely-numeric drop removes them later), duplicates a suffix.
fn mangle_headers(header_row: &[Data]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    header_row
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let base = cell.to_string().trim().to_string();
            let base = if base.is_empty() { i.to_string() } else { base };
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{}_{}", base, count)
            }
        })
        .collect()
}

fn build_column(name: &str, cells: &[&Data]) -> Result<Series> {
    let has_datetime = cells
        .iter()
        .any(|c| matches!(c, Data::DateTime(_) | Data::DateTimeIso(_)));
    if has_datetime {
        let values: Vec<Option<i64>> = cells
            .iter()
            .map(|c| c.as_datetime().map(|dt| dt.and_utc().timestamp_millis()))
            .collect();
        return Ok(Series::new(name, values)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?);
    }

    let has_numeric = cells.iter().any(|c| cell_to_f64(c).is_some());
    if has_numeric || cells.is_empty() {
        let values: Vec<Option<f64>> = cells.iter().map(|c| cell_to_f64(c)).collect();
        return Ok(Series::new(name, values));
    }

    let values: Vec<Option<String>> = cells
        .iter()
        .map(|c| match c {
            Data::Empty => None,
            other => Some(other.to_string().trim().to_string()),
        })
        .collect();
    Ok(Series::new(name, values))
}

fn cell_to_f64(cell: &Data) -> Option<f64> {
    match cell {
        Data::String(s) => s.trim().parse::<f64>().ok(),
        other => other.as_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_is_a_pure_function_of_extension() {
        assert_eq!(engine_for(Path::new("test.xls")), WorkbookEngine::Legacy);
        assert_eq!(engine_for(Path::new("test.xlsx")), WorkbookEngine::Modern);
        assert_eq!(engine_for(Path::new("test.csv")), WorkbookEngine::Modern);
        assert_eq!(engine_for(Path::new("test")), WorkbookEngine::Modern);
        assert_eq!(
            engine_for(Path::new("dir.xls/test.xlsx")),
            WorkbookEngine::Modern
        );
    }

    fn sample_range() -> Range<Data> {
        let mut range = Range::new((0, 0), (3, 2));
        // Junk banner row that skip_rows must jump over.
        range.set_value((0, 0), Data::String("Hourly load report".into()));
        range.set_value((1, 0), Data::String("DATE".into()));
        range.set_value((1, 1), Data::String("HOUR ENDING".into()));
        range.set_value((1, 2), Data::String("Calgary".into()));
        range.set_value((2, 0), Data::String("2011-01-01".into()));
        range.set_value((2, 1), Data::Int(1));
        range.set_value((2, 2), Data::Float(1034.5));
        range.set_value((3, 0), Data::String("2011-01-01".into()));
        range.set_value((3, 1), Data::Int(2));
        range.set_value((3, 2), Data::String("n/a".into()));
        range
    }

    #[test]
    fn header_offset_is_honored() {
        let df = range_to_frame(&sample_range(), 1).unwrap();
        assert_eq!(df.get_column_names(), &["DATE", "HOUR ENDING", "Calgary"]);
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn numeric_columns_coerce_bad_cells_to_null() {
        let df = range_to_frame(&sample_range(), 1).unwrap();
        let calgary = df.column("Calgary").unwrap().f64().unwrap();
        assert_eq!(calgary.get(0), Some(1034.5));
        assert_eq!(calgary.get(1), None);
    }

    #[test]
    fn text_date_column_stays_text() {
        let df = range_to_frame(&sample_range(), 1).unwrap();
        assert_eq!(df.column("DATE").unwrap().dtype(), &DataType::Utf8);
    }

    #[test]
    fn datetime_cells_make_a_datetime_column() {
        let mut range = Range::new((0, 0), (1, 1));
        range.set_value((0, 0), Data::String("DT_MST".into()));
        range.set_value((0, 1), Data::String("Edmonton".into()));
        range.set_value((1, 0), Data::DateTimeIso("2011-01-01T00:00:00".into()));
        range.set_value((1, 1), Data::Float(700.0));

        let df = range_to_frame(&range, 0).unwrap();
        assert!(matches!(
            df.column("DT_MST").unwrap().dtype(),
            DataType::Datetime(_, _)
        ));
    }

    #[test]
    fn blank_and_duplicate_headers_get_stable_names() {
        let mut range = Range::new((0, 0), (1, 2));
        range.set_value((0, 0), Data::String("Calgary".into()));
        range.set_value((0, 1), Data::Empty);
        range.set_value((0, 2), Data::String("Calgary".into()));
        range.set_value((1, 0), Data::Float(1.0));
        range.set_value((1, 1), Data::Float(2.0));
        range.set_value((1, 2), Data::Float(3.0));

        let df = range_to_frame(&range, 0).unwrap();
        assert_eq!(df.get_column_names(), &["Calgary", "1", "Calgary_2"]);
    }

    #[test]
    fn missing_file_is_a_typed_skip() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = read_era(dir.path(), &ERA_SCHEMAS[0]);
        match outcome {
            SourceOutcome::Skipped { era, reason } => {
                assert_eq!(era, "2011");
                assert!(matches!(reason, SkipReason::MissingFile(_)));
            }
            SourceOutcome::Loaded { .. } => panic!("expected skip"),
        }
    }
}
