//! Spreadsheet writer in constant-memory mode
//!
//! Only the row being written is held in memory; earlier rows are flushed to a
//! temporary file by rust_xlsxwriter. Rows must therefore arrive in order,
//! which the orchestrator guarantees.

use crate::core::formula::render_number;
use crate::error::{ConvertError, ConvertResult};
use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook, XlsxError};
use std::path::{Path, PathBuf};

/// Rows per worksheet in the xlsx format
pub const MAX_ROWS: u32 = 1_048_576;
/// Columns per worksheet in the xlsx format
pub const MAX_COLUMNS: usize = 16_384;

pub struct XlsxSink {
    workbook: Workbook,
    path: PathBuf,
    next_row: RowNum,
    bold: Format,
}

impl XlsxSink {
    pub fn open(path: &Path) -> ConvertResult<Self> {
        let mut workbook = Workbook::new();
        workbook.add_worksheet_with_constant_memory();
        Ok(Self {
            workbook,
            path: path.to_path_buf(),
            next_row: 0,
            bold: Format::new().set_bold(),
        })
    }

    pub fn write_header(&mut self, columns: &[String]) -> ConvertResult<()> {
        let row = self.claim_row(columns.len())?;
        let bold = self.bold.clone();
        let sheet = self.workbook.worksheet_from_index(0).map_err(xlsx_error)?;
        for (col, name) in columns.iter().enumerate() {
            sheet
                .write_string_with_format(row, col as ColNum, name, &bold)
                .map_err(xlsx_error)?;
        }
        Ok(())
    }

    pub fn write_row(&mut self, values: &[String]) -> ConvertResult<()> {
        let row = self.claim_row(values.len())?;
        let sheet = self.workbook.worksheet_from_index(0).map_err(xlsx_error)?;
        for (col, value) in values.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let col = col as ColNum;
            match lossless_number(value) {
                Some(n) => sheet.write_number(row, col, n),
                None => sheet.write_string(row, col, value),
            }
            .map_err(xlsx_error)?;
        }
        Ok(())
    }

    pub fn close(mut self) -> ConvertResult<()> {
        self.workbook.save(&self.path).map_err(|e| {
            ConvertError::Write(format!(
                "Failed to save Excel file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn claim_row(&mut self, width: usize) -> ConvertResult<RowNum> {
        if self.next_row >= MAX_ROWS {
            return Err(ConvertError::Write(format!(
                "Excel row limit of {} rows exceeded",
                MAX_ROWS
            )));
        }
        if width > MAX_COLUMNS {
            return Err(ConvertError::Write(format!(
                "Excel column limit of {} columns exceeded",
                MAX_COLUMNS
            )));
        }
        let row = self.next_row;
        self.next_row += 1;
        Ok(row)
    }
}

/// The value as a number, if storing it numerically loses nothing.
///
/// `"007"` and `"1.50"` stay text because rendering the number back would
/// change the cell.
pub fn lossless_number(value: &str) -> Option<f64> {
    let n: f64 = value.parse().ok()?;
    if n.is_finite() && render_number(n) == value {
        Some(n)
    } else {
        None
    }
}

fn xlsx_error(e: XlsxError) -> ConvertError {
    ConvertError::Write(format!("Excel write error: {}", e))
}
