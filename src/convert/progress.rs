//! Collaborators a conversion run reports to

use crate::types::ConversionResult;
use std::path::PathBuf;
use std::sync::mpsc::Sender;

/// Notification emitted while a run is in flight. Indexes are 1-based.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    FileStart {
        index: usize,
        total: usize,
        file: PathBuf,
    },
    Progress {
        index: usize,
        total: usize,
        rows: u64,
        file_name: String,
    },
    FileComplete {
        index: usize,
        total: usize,
        result: ConversionResult,
    },
    Error {
        message: String,
    },
    AllComplete {
        results: Vec<ConversionResult>,
    },
}

/// Receives [`ProgressEvent`]s
pub trait ProgressSink {
    fn emit(&mut self, event: ProgressEvent);
}

impl<F: FnMut(ProgressEvent)> ProgressSink for F {
    fn emit(&mut self, event: ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for Sender<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) {
        // A receiver that hung up just stops listening
        let _ = self.send(event);
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&mut self, _event: ProgressEvent) {}
}

/// Decides whether to go on when mapped columns are absent from a header
pub trait ConfirmMissingColumns {
    /// `true` continues without the missing columns
    fn confirm(&mut self, file_name: &str, missing: &[String]) -> bool;
}

impl<F: FnMut(&str, &[String]) -> bool> ConfirmMissingColumns for F {
    fn confirm(&mut self, file_name: &str, missing: &[String]) -> bool {
        self(file_name, missing)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysContinue;

impl ConfirmMissingColumns for AlwaysContinue {
    fn confirm(&mut self, _file_name: &str, _missing: &[String]) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverContinue;

impl ConfirmMissingColumns for NeverContinue {
    fn confirm(&mut self, _file_name: &str, _missing: &[String]) -> bool {
        false
    }
}
