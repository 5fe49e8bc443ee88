//! Streaming source readers
//!
//! Readers push a header event and then one event per row into a
//! [`RowHandler`]. Nothing is buffered beyond the current row, so memory use
//! does not grow with file size.

pub mod csv;
pub mod xlsx;

use crate::error::ConvertResult;
use crate::types::{OutputOptions, RowMap};
use std::ops::ControlFlow;
use std::path::Path;
use tracing::debug;

/// Rows between progress notifications
pub const PROGRESS_INTERVAL: u64 = 10_000;

/// Receives the events produced while reading one source file
pub trait RowHandler {
    /// Called once with the trimmed header labels. `Break` stops the read.
    fn on_header(&mut self, header: &[String]) -> ConvertResult<ControlFlow<()>>;

    /// Called for every emitted data row
    fn on_row(&mut self, row: RowMap) -> ConvertResult<()>;

    /// Called for a blank row dropped because `skipEmptyRows` is set
    fn on_empty_row(&mut self) {}

    /// Called every [`PROGRESS_INTERVAL`] emitted rows
    fn on_progress(&mut self, _rows: u64) {}
}

/// Source file format, selected by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    DelimitedText,
    Spreadsheet,
}

impl SourceFormat {
    /// Pick a reader for `path`, or `None` when the extension is unsupported
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(SourceFormat::DelimitedText),
            "xlsx" => Some(SourceFormat::Spreadsheet),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SourceFormat::DelimitedText => "CSV",
            SourceFormat::Spreadsheet => "Excel",
        }
    }

    /// Stream `path` into `handler`. Returns the number of emitted rows.
    pub fn read(
        self,
        path: &Path,
        options: &OutputOptions,
        handler: &mut dyn RowHandler,
    ) -> ConvertResult<u64> {
        debug!(file = %path.display(), format = self.name(), "reading source");
        match self {
            SourceFormat::DelimitedText => csv::read(path, options, handler),
            SourceFormat::Spreadsheet => xlsx::read(path, options, handler),
        }
    }
}

/// Turns raw cell vectors into header and row events
pub(crate) struct RowEmitter<'h> {
    handler: &'h mut dyn RowHandler,
    header: Vec<String>,
    trim: bool,
    skip_empty: bool,
    seen_header: bool,
    emitted: u64,
    stopped: bool,
}

impl<'h> RowEmitter<'h> {
    pub(crate) fn new(options: &OutputOptions, handler: &'h mut dyn RowHandler) -> Self {
        Self {
            handler,
            header: Vec::new(),
            trim: options.trim_whitespace,
            skip_empty: options.skip_empty_rows,
            seen_header: false,
            emitted: 0,
            stopped: false,
        }
    }

    /// True once the handler declined the header
    pub(crate) fn stopped(&self) -> bool {
        self.stopped
    }

    pub(crate) fn seen_header(&self) -> bool {
        self.seen_header
    }

    pub(crate) fn emitted(&self) -> u64 {
        self.emitted
    }

    pub(crate) fn header(&mut self, cells: Vec<String>) -> ConvertResult<()> {
        let mut header: Vec<String> = cells.into_iter().map(|c| c.trim().to_string()).collect();
        if let Some(first) = header.first_mut() {
            if let Some(stripped) = first.strip_prefix('\u{feff}') {
                *first = stripped.trim().to_string();
            }
        }
        self.header = header;
        self.seen_header = true;
        if self.handler.on_header(&self.header)?.is_break() {
            self.stopped = true;
        }
        Ok(())
    }

    pub(crate) fn row(&mut self, cells: Vec<String>) -> ConvertResult<()> {
        if self.skip_empty && cells.iter().all(|c| c.trim().is_empty()) {
            self.handler.on_empty_row();
            return Ok(());
        }

        let mut cells = cells.into_iter();
        let row: RowMap = self
            .header
            .iter()
            .map(|label| {
                let value = cells.next().unwrap_or_default();
                let value = if self.trim {
                    value.trim().to_string()
                } else {
                    value
                };
                (label.clone(), value)
            })
            .collect();

        self.handler.on_row(row)?;
        self.emitted += 1;
        if self.emitted % PROGRESS_INTERVAL == 0 {
            self.handler.on_progress(self.emitted);
        }
        Ok(())
    }
}
