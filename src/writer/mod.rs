//! Streaming sink writers
//!
//! A writer is opened, receives exactly one header, then any number of rows
//! aligned to that header, and is closed once. Closing consumes it.

pub mod csv;
pub mod xlsx;

use crate::error::{ConvertError, ConvertResult};
use crate::types::{OutputFormat, OutputOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

enum Sink {
    Csv(csv::CsvSink),
    Xlsx(xlsx::XlsxSink),
}

/// Destination file being written
pub struct SinkWriter {
    sink: Sink,
    format: OutputFormat,
    path: PathBuf,
    header_written: bool,
}

impl SinkWriter {
    /// Create the destination (and its parent directories)
    pub fn open(format: OutputFormat, path: &Path, options: &OutputOptions) -> ConvertResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                ConvertError::Write(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        debug!(file = %path.display(), format = format.name(), "opening output");
        let sink = match format {
            OutputFormat::Csv => Sink::Csv(csv::CsvSink::open(path, options)?),
            OutputFormat::Xlsx => Sink::Xlsx(xlsx::XlsxSink::open(path)?),
        };

        Ok(Self {
            sink,
            format,
            path: path.to_path_buf(),
            header_written: false,
        })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_header(&mut self, columns: &[String]) -> ConvertResult<()> {
        if self.header_written {
            return Err(ConvertError::Write("Header already written".to_string()));
        }
        self.header_written = true;
        match &mut self.sink {
            Sink::Csv(sink) => sink.write_header(columns),
            Sink::Xlsx(sink) => sink.write_header(columns),
        }
    }

    pub fn write_row(&mut self, values: &[String]) -> ConvertResult<()> {
        if !self.header_written {
            return Err(ConvertError::Write("Row written before header".to_string()));
        }
        match &mut self.sink {
            Sink::Csv(sink) => sink.write_row(values),
            Sink::Xlsx(sink) => sink.write_row(values),
        }
    }

    /// Flush and release the destination
    pub fn close(self) -> ConvertResult<()> {
        debug!(file = %self.path.display(), "closing output");
        match self.sink {
            Sink::Csv(sink) => sink.close(),
            Sink::Xlsx(sink) => sink.close(),
        }
    }
}
