//! Conversion orchestrator
//!
//! A [`Converter`] drives one profile over a list of input files, either
//! producing one output per input or merging every input into a single
//! output. Each source file is streamed through a [`Session`], which resolves
//! the output layout from the first header, drops duplicate rows, evaluates
//! calculated columns and writes the result row by row.
//!
//! Cancellation is cooperative and only checked between files.

pub mod layout;
pub mod naming;
pub mod progress;
pub mod summary;
pub mod worker;

pub use layout::ColumnLayout;
pub use progress::{
    AlwaysContinue, ConfirmMissingColumns, NeverContinue, NoProgress, ProgressEvent, ProgressSink,
};
pub use summary::RunSummary;
pub use worker::{ConfirmRequest, WorkerHandle, WorkerMessage};

use crate::error::{ConvertError, ConvertResult};
use crate::reader::{RowHandler, SourceFormat, PROGRESS_INTERVAL};
use crate::types::{
    display_name, ConversionResult, ConversionStatus, Profile, RowCounters, RowMap,
};
use crate::writer::SinkWriter;
use chrono::Local;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Every result succeeded
    Completed,
    /// Stopped at a file boundary after cancellation was requested
    Cancelled,
    /// Ran to the end, but at least one result failed
    Failed,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    pub results: Vec<ConversionResult>,
}

impl RunReport {
    fn new(results: Vec<ConversionResult>, cancelled: bool) -> Self {
        let state = if cancelled {
            RunState::Cancelled
        } else if results
            .iter()
            .any(|r| r.status == ConversionStatus::Failed)
        {
            RunState::Failed
        } else {
            RunState::Completed
        };
        Self { state, results }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }
}

/// Cloneable handle that requests cancellation of a running conversion
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Applies one profile to batches of input files
#[derive(Debug, Clone)]
pub struct Converter {
    profile: Profile,
    output_dir: Option<PathBuf>,
    cancel: CancelHandle,
}

impl Converter {
    /// Outputs go next to each input unless an output directory is set
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            output_dir: None,
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Convert `files`, merging them into one output when `merge` is set and
    /// there is more than one file.
    ///
    /// Clears any earlier cancellation request before starting.
    pub fn run(
        &self,
        files: &[PathBuf],
        merge: bool,
        progress: &mut dyn ProgressSink,
        confirm: &mut dyn ConfirmMissingColumns,
    ) -> RunReport {
        self.cancel.reset();
        self.run_batch(files, merge, progress, confirm)
    }

    pub(crate) fn run_batch(
        &self,
        files: &[PathBuf],
        merge: bool,
        progress: &mut dyn ProgressSink,
        confirm: &mut dyn ConfirmMissingColumns,
    ) -> RunReport {
        info!(
            profile = %self.profile.profile_name,
            files = files.len(),
            merge,
            format = self.profile.options.output_format.name(),
            "starting conversion"
        );

        let (results, cancelled) = if merge && files.len() > 1 {
            self.merge_files(files, progress, confirm)
        } else {
            self.convert_files(files, progress, confirm)
        };

        progress.emit(ProgressEvent::AllComplete {
            results: results.clone(),
        });

        let report = RunReport::new(results, cancelled);
        info!(state = ?report.state, results = report.results.len(), "conversion finished");
        report
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PER-FILE MODE
    // ═══════════════════════════════════════════════════════════════════════

    fn convert_files(
        &self,
        files: &[PathBuf],
        progress: &mut dyn ProgressSink,
        confirm: &mut dyn ConfirmMissingColumns,
    ) -> (Vec<ConversionResult>, bool) {
        let total = files.len();
        let mut results = Vec::with_capacity(total);

        for (i, input) in files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(remaining = total - i, "conversion cancelled");
                return (results, true);
            }

            let index = i + 1;
            progress.emit(ProgressEvent::FileStart {
                index,
                total,
                file: input.clone(),
            });

            let result = self.convert_one(input, index, total, progress, confirm);
            if let Some(message) = &result.error_message {
                progress.emit(ProgressEvent::Error {
                    message: format!("{}: {}", result.file_name(), message),
                });
            }

            progress.emit(ProgressEvent::FileComplete {
                index,
                total,
                result: result.clone(),
            });
            results.push(result);
        }

        (results, false)
    }

    fn convert_one(
        &self,
        input: &Path,
        index: usize,
        total: usize,
        progress: &mut dyn ProgressSink,
        confirm: &mut dyn ConfirmMissingColumns,
    ) -> ConversionResult {
        let mut pending = ConversionResult::start(input);
        let mut counters = RowCounters::default();
        let file_name = display_name(input);

        let Some(format) = SourceFormat::from_path(input) else {
            warn!(file = %file_name, "unsupported file format");
            return pending.fail(
                &counters,
                ConvertError::UnsupportedFormat(file_name).to_string(),
            );
        };

        let options = &self.profile.options;
        let output = self.output_dir_for(input).join(naming::per_file_output_name(
            input,
            &self.profile,
            options.output_format.extension(),
        ));
        if is_same_file(input, &output) {
            return pending.fail(
                &counters,
                format!(
                    "Output file {} would overwrite the input file",
                    output.display()
                ),
            );
        }

        let mut writer = match SinkWriter::open(options.output_format, &output, options) {
            Ok(writer) => writer,
            Err(e) => {
                error!(file = %file_name, error = %e, "failed to open output");
                return pending.fail(&counters, e.to_string());
            }
        };

        let mut layout = None;
        let mut seen = HashSet::new();
        let (read, declined) = {
            let mut session = Session {
                profile: &self.profile,
                writer: &mut writer,
                layout: &mut layout,
                seen: &mut seen,
                counters: &mut counters,
                confirm,
                progress,
                file_name: file_name.clone(),
                index,
                total,
                declined: None,
            };
            let read = format.read(input, options, &mut session);
            (read, session.declined)
        };

        if let Some(missing) = declined {
            if let Err(e) = writer.close() {
                debug!(file = %file_name, error = %e, "closing aborted output failed");
            }
            remove_output(&output);
            info!(file = %file_name, "skipped after missing columns were declined");
            return pending.fail(
                &counters,
                ConvertError::MissingColumnsAbort(missing).to_string(),
            );
        }

        pending.set_output(&output);
        let closed = writer.close();
        if let Err(e) = read {
            error!(file = %file_name, error = %e, "conversion failed");
            if let Err(close_err) = closed {
                warn!(file = %file_name, error = %close_err, "failed to close partial output");
            }
            return pending.fail(&counters, e.to_string());
        }
        if let Err(e) = closed {
            error!(file = %file_name, error = %e, "failed to finish output");
            return pending.fail(&counters, e.to_string());
        }

        info!(
            file = %file_name,
            input = counters.input,
            output = counters.output,
            duplicates = counters.duplicate,
            "file converted"
        );
        pending.succeed(&counters)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MERGE MODE
    // ═══════════════════════════════════════════════════════════════════════

    fn merge_files(
        &self,
        files: &[PathBuf],
        progress: &mut dyn ProgressSink,
        confirm: &mut dyn ConfirmMissingColumns,
    ) -> (Vec<ConversionResult>, bool) {
        let total = files.len();
        let options = &self.profile.options;
        let mut pending = ConversionResult::start(&files[0]);
        let mut merged = RowCounters::default();

        let output = self
            .output_dir_for(&files[0])
            .join(naming::merged_output_name(
                &self.profile,
                options.output_format.extension(),
                Local::now().timestamp_millis(),
            ));

        if let Some(input) = files.iter().find(|input| is_same_file(input, &output)) {
            let message = format!(
                "Output file {} would overwrite the input file {}",
                output.display(),
                display_name(input)
            );
            error!(file = %output.display(), "merged output would overwrite an input");
            progress.emit(ProgressEvent::Error {
                message: message.clone(),
            });
            return (vec![pending.fail(&merged, message)], false);
        }

        let mut writer = match SinkWriter::open(options.output_format, &output, options) {
            Ok(writer) => writer,
            Err(e) => {
                error!(file = %output.display(), error = %e, "failed to open merged output");
                progress.emit(ProgressEvent::Error {
                    message: e.to_string(),
                });
                return (vec![pending.fail(&merged, e.to_string())], false);
            }
        };

        let mut layout: Option<ColumnLayout> = None;
        let mut seen = HashSet::new();
        let mut declined: Option<Vec<String>> = None;
        let mut fatal: Option<ConvertError> = None;
        let mut cancelled = false;

        for (i, input) in files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(remaining = total - i, "merge cancelled");
                cancelled = true;
                break;
            }

            let index = i + 1;
            progress.emit(ProgressEvent::FileStart {
                index,
                total,
                file: input.clone(),
            });

            let file_pending = ConversionResult::start(input);
            let mut counters = RowCounters::default();
            let file_name = display_name(input);

            let (outcome, file_declined) = match SourceFormat::from_path(input) {
                None => (
                    Err(ConvertError::UnsupportedFormat(file_name.clone())),
                    None,
                ),
                Some(format) => {
                    let mut session = Session {
                        profile: &self.profile,
                        writer: &mut writer,
                        layout: &mut layout,
                        seen: &mut seen,
                        counters: &mut counters,
                        confirm: &mut *confirm,
                        progress: &mut *progress,
                        file_name: file_name.clone(),
                        index,
                        total,
                        declined: None,
                    };
                    let read = format.read(input, options, &mut session);
                    (read, session.declined)
                }
            };
            merged.absorb(&counters);

            let file_result = match outcome {
                Ok(_) => match file_declined {
                    Some(missing) => {
                        info!(file = %file_name, "skipped after missing columns were declined");
                        let message = ConvertError::MissingColumnsAbort(missing.clone()).to_string();
                        declined = Some(missing);
                        file_pending.fail(&counters, message)
                    }
                    None => file_pending.succeed(&counters),
                },
                Err(e) if e.is_write_failure() => {
                    error!(file = %file_name, error = %e, "merged output failed");
                    let result = file_pending.fail(&counters, e.to_string());
                    fatal = Some(e);
                    result
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "skipping unreadable file");
                    progress.emit(ProgressEvent::Error {
                        message: format!("{}: {}", file_name, e),
                    });
                    file_pending.fail(&counters, e.to_string())
                }
            };

            progress.emit(ProgressEvent::FileComplete {
                index,
                total,
                result: file_result,
            });
            if fatal.is_some() {
                break;
            }
        }

        let closed = writer.close();
        let result = if let Some(e) = fatal {
            remove_output(&output);
            pending.fail(&merged, e.to_string())
        } else if let Err(e) = closed {
            error!(file = %output.display(), error = %e, "failed to finish merged output");
            remove_output(&output);
            pending.fail(&merged, e.to_string())
        } else if layout.is_none() {
            remove_output(&output);
            if cancelled {
                pending.cancel(&merged)
            } else {
                let message = match declined {
                    Some(missing) => ConvertError::MissingColumnsAbort(missing).to_string(),
                    None => "no input file produced a header".to_string(),
                };
                pending.fail(&merged, message)
            }
        } else {
            pending.set_output(&output);
            if cancelled {
                pending.cancel(&merged)
            } else {
                info!(
                    file = %output.display(),
                    input = merged.input,
                    output = merged.output,
                    duplicates = merged.duplicate,
                    "merge complete"
                );
                pending.succeed(&merged)
            }
        };

        (vec![result], cancelled)
    }

    fn output_dir_for(&self, input: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

/// Per-file row pipeline fed by a source reader
struct Session<'a> {
    profile: &'a Profile,
    writer: &'a mut SinkWriter,
    layout: &'a mut Option<ColumnLayout>,
    seen: &'a mut HashSet<String>,
    counters: &'a mut RowCounters,
    confirm: &'a mut dyn ConfirmMissingColumns,
    progress: &'a mut dyn ProgressSink,
    file_name: String,
    index: usize,
    total: usize,
    /// Set when the missing-columns prompt was answered with "stop"
    declined: Option<Vec<String>>,
}

impl Session<'_> {
    fn resolve_header(&mut self, header: &[String]) -> ConvertResult<ControlFlow<()>> {
        if let Some(layout) = &*self.layout {
            let missing = layout.missing_from(header);
            if !missing.is_empty() {
                warn!(
                    file = %self.file_name,
                    missing = %missing.join(", "),
                    "mapped columns absent, writing empty values"
                );
            }
            return Ok(ControlFlow::Continue(()));
        }

        let layout = ColumnLayout::resolve(self.profile, header);
        if !layout.missing.is_empty() {
            warn!(
                file = %self.file_name,
                missing = %layout.missing.join(", "),
                "mapped columns absent from header"
            );
            if !self.confirm.confirm(&self.file_name, &layout.missing) {
                self.declined = Some(layout.missing);
                return Ok(ControlFlow::Break(()));
            }
        }

        debug!(file = %self.file_name, columns = ?layout.header, "output header resolved");
        self.writer.write_header(&layout.header)?;
        *self.layout = Some(layout);
        Ok(ControlFlow::Continue(()))
    }

    fn process_row(&mut self, mut row: RowMap) -> ConvertResult<()> {
        self.counters.input += 1;
        let Some(layout) = &*self.layout else {
            return Ok(());
        };

        if let Some(key) = layout.dedup_key(&row) {
            if !self.seen.insert(key) {
                self.counters.duplicate += 1;
                return Ok(());
            }
        }

        let values = layout.assemble(self.profile, &mut row);
        self.writer.write_row(&values)?;
        self.counters.output += 1;

        if self.counters.output % PROGRESS_INTERVAL == 0 {
            self.progress.emit(ProgressEvent::Progress {
                index: self.index,
                total: self.total,
                rows: self.counters.output,
                file_name: self.file_name.clone(),
            });
        }
        Ok(())
    }
}

impl RowHandler for Session<'_> {
    fn on_header(&mut self, header: &[String]) -> ConvertResult<ControlFlow<()>> {
        self.resolve_header(header)
            .map_err(|e| ConvertError::processing("header processing error", e))
    }

    fn on_row(&mut self, row: RowMap) -> ConvertResult<()> {
        self.process_row(row)
            .map_err(|e| ConvertError::processing("row processing error", e))
    }

    fn on_empty_row(&mut self) {
        self.counters.input += 1;
        self.counters.empty += 1;
    }

    fn on_progress(&mut self, rows: u64) {
        debug!(file = %self.file_name, rows, "rows read");
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn remove_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(file = %path.display(), "removed output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %path.display(), error = %e, "failed to remove output"),
    }
}
