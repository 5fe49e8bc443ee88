//! Run summary shown to the user once a run ends

use crate::types::{ConversionResult, ConversionStatus, RowCounters};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total_files: usize,
    pub succeeded: usize,
    pub cancelled: usize,
    pub rows: RowCounters,
    /// (file name, error text) for each failed result
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    pub fn from_results(results: &[ConversionResult]) -> Self {
        let mut summary = RunSummary {
            total_files: results.len(),
            ..Default::default()
        };

        for result in results {
            summary.rows.absorb(&RowCounters {
                input: result.input_rows,
                output: result.output_rows,
                duplicate: result.duplicate_rows,
                empty: result.empty_rows,
            });
            match result.status {
                ConversionStatus::Success => summary.succeeded += 1,
                ConversionStatus::Cancelled => summary.cancelled += 1,
                ConversionStatus::Failed => summary.failures.push((
                    result.file_name(),
                    result.error_message.clone().unwrap_or_default(),
                )),
            }
        }

        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total_files
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Succeeded: {}/{} files", self.succeeded, self.total_files)?;
        if self.cancelled > 0 {
            writeln!(f, "Cancelled: {}", self.cancelled)?;
        }
        writeln!(f, "Input rows: {}", self.rows.input)?;
        writeln!(f, "Output rows: {}", self.rows.output)?;
        writeln!(f, "Duplicates removed: {}", self.rows.duplicate)?;
        write!(f, "Empty rows skipped: {}", self.rows.empty)?;
        if !self.failures.is_empty() {
            write!(f, "\nFailed files:")?;
            for (file, message) in &self.failures {
                write!(f, "\n  {}: {}", file, message)?;
            }
        }
        Ok(())
    }
}
