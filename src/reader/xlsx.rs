//! Spreadsheet reader: first worksheet only, streamed cell by cell
//!
//! Uses calamine's cell reader so the sheet is never materialized as a range.
//! Row 1 is the header. Date-formatted numbers become `yyyy-MM-dd`.

use super::{RowEmitter, RowHandler};
use crate::core::formula::render_number;
use crate::error::{ConvertError, ConvertResult};
use crate::types::OutputOptions;
use calamine::{open_workbook, DataRef, Reader, Xlsx};
use chrono::{Duration, NaiveDate};
use std::path::Path;

pub fn read(path: &Path, options: &OutputOptions, handler: &mut dyn RowHandler) -> ConvertResult<u64> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| {
        ConvertError::Read(format!("Failed to open Excel file {}: {}", path.display(), e))
    })?;

    let Some(sheet) = workbook.sheet_names().first().cloned() else {
        return Ok(0);
    };

    let mut cells = workbook.worksheet_cells_reader(&sheet).map_err(|e| {
        ConvertError::Read(format!("Failed to read sheet '{}': {}", sheet, e))
    })?;

    let mut emitter = RowEmitter::new(options, handler);
    let mut current: Option<(u32, Vec<String>)> = None;

    loop {
        let cell = cells.next_cell().map_err(|e| {
            ConvertError::Read(format!("Failed to read cell in '{}': {}", sheet, e))
        })?;
        let Some(cell) = cell else {
            break;
        };

        let (row, col) = cell.get_position();
        let text = cell_text(cell.get_value());

        if let Some((current_row, values)) = current.as_mut() {
            if *current_row == row {
                place(values, col, text);
                continue;
            }
        }

        if let Some((finished_row, values)) = current.take() {
            if flush(&mut emitter, finished_row, values)? {
                return Ok(emitter.emitted());
            }
        }
        if row > 0 && !emitter.seen_header() {
            // Nothing on row 1: the header is empty
            if flush(&mut emitter, 0, Vec::new())? {
                return Ok(emitter.emitted());
            }
        }
        let mut values = Vec::new();
        place(&mut values, col, text);
        current = Some((row, values));
    }

    if let Some((finished_row, values)) = current.take() {
        flush(&mut emitter, finished_row, values)?;
    }

    Ok(emitter.emitted())
}

/// Hand a completed row to the emitter. Returns true when reading should stop.
fn flush(emitter: &mut RowEmitter<'_>, row: u32, values: Vec<String>) -> ConvertResult<bool> {
    if row == 0 {
        emitter.header(values)?;
        return Ok(emitter.stopped());
    }
    emitter.row(values)?;
    Ok(false)
}

/// Store `text` at column `col`, padding gaps with empty strings
fn place(values: &mut Vec<String>, col: u32, text: String) {
    let col = col as usize;
    if values.len() <= col {
        values.resize(col + 1, String::new());
    }
    values[col] = text;
}

/// Text shown for one cell
fn cell_text(value: &DataRef<'_>) -> String {
    match value {
        DataRef::Int(i) => i.to_string(),
        DataRef::Float(f) => render_number(*f),
        DataRef::String(s) => s.clone(),
        DataRef::SharedString(s) => s.to_string(),
        DataRef::Bool(b) => b.to_string(),
        DataRef::DateTime(dt) if dt.is_datetime() => {
            serial_to_date(dt.as_f64()).unwrap_or_else(|| render_number(dt.as_f64()))
        }
        DataRef::DateTime(dt) => render_number(dt.as_f64()),
        DataRef::DateTimeIso(s) | DataRef::DurationIso(s) => s.clone(),
        DataRef::Error(e) => e.to_string(),
        DataRef::Empty => String::new(),
    }
}

/// Excel 1900-system serial to `yyyy-MM-dd`, ignoring the time of day.
///
/// Serials below 60 predate the fictitious 1900-02-29.
pub fn serial_to_date(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let days = serial.floor() as i64;
    let epoch = if days < 60 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let date = epoch.checked_add_signed(Duration::days(days))?;
    Some(date.format("%Y-%m-%d").to_string())
}
