//! Background worker running a conversion off the calling thread
//!
//! The worker owns the [`Converter`] and all run state. It talks to the
//! foreground only through a channel of [`WorkerMessage`]s. A missing-columns
//! prompt travels as a [`ConfirmRequest`] carrying its own reply channel, and
//! the worker blocks until that reply arrives.

use super::progress::{ConfirmMissingColumns, ProgressEvent, ProgressSink};
use super::{CancelHandle, Converter, RunReport};
use crate::error::{ConvertError, ConvertResult};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Message sent from the worker to the foreground
#[derive(Debug)]
pub enum WorkerMessage {
    Event(ProgressEvent),
    Confirm(ConfirmRequest),
    /// Always the last message of a run
    Finished(RunReport),
}

/// Pending question about mapped columns missing from a header
#[derive(Debug)]
pub struct ConfirmRequest {
    pub file_name: String,
    pub missing: Vec<String>,
    reply: Sender<bool>,
}

impl ConfirmRequest {
    /// Unblock the worker. Dropping the request unanswered counts as `false`.
    pub fn answer(self, proceed: bool) {
        let _ = self.reply.send(proceed);
    }
}

struct ChannelProgress(Sender<WorkerMessage>);

impl ProgressSink for ChannelProgress {
    fn emit(&mut self, event: ProgressEvent) {
        let _ = self.0.send(WorkerMessage::Event(event));
    }
}

struct ChannelConfirm(Sender<WorkerMessage>);

impl ConfirmMissingColumns for ChannelConfirm {
    fn confirm(&mut self, file_name: &str, missing: &[String]) -> bool {
        let (reply, answer) = mpsc::channel();
        let request = ConfirmRequest {
            file_name: file_name.to_string(),
            missing: missing.to_vec(),
            reply,
        };
        if self.0.send(WorkerMessage::Confirm(request)).is_err() {
            return false;
        }
        answer.recv().unwrap_or(false)
    }
}

/// Start `converter` on a background thread.
///
/// Any earlier cancellation request is cleared before the thread starts, so
/// a cancel issued through the returned handle is never lost.
pub fn spawn(converter: Converter, files: Vec<PathBuf>, merge: bool) -> ConvertResult<WorkerHandle> {
    let (tx, rx) = mpsc::channel();
    let cancel = converter.cancel_handle();
    cancel.reset();

    let thread = thread::Builder::new()
        .name("tabular-worker".to_string())
        .spawn(move || {
            debug!(files = files.len(), "worker started");
            let mut progress = ChannelProgress(tx.clone());
            let mut confirm = ChannelConfirm(tx.clone());
            let report = converter.run_batch(&files, merge, &mut progress, &mut confirm);
            let _ = tx.send(WorkerMessage::Finished(report));
        })
        .map_err(|e| ConvertError::Worker(format!("Failed to start worker thread: {}", e)))?;

    Ok(WorkerHandle {
        receiver: rx,
        cancel,
        thread,
    })
}

/// Foreground side of a running worker
pub struct WorkerHandle {
    receiver: Receiver<WorkerMessage>,
    cancel: CancelHandle,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Next message, or `None` once the worker has exited
    pub fn recv(&self) -> Option<WorkerMessage> {
        self.receiver.recv().ok()
    }

    /// Pump messages into `progress` and `confirm` until the worker finishes
    pub fn wait_with(
        self,
        progress: &mut dyn ProgressSink,
        confirm: &mut dyn ConfirmMissingColumns,
    ) -> ConvertResult<RunReport> {
        let mut report = None;
        for message in self.receiver.iter() {
            match message {
                WorkerMessage::Event(event) => progress.emit(event),
                WorkerMessage::Confirm(request) => {
                    let proceed = confirm.confirm(&request.file_name, &request.missing);
                    request.answer(proceed);
                }
                WorkerMessage::Finished(finished) => report = Some(finished),
            }
        }

        self.thread
            .join()
            .map_err(|_| ConvertError::Worker("Worker thread panicked".to_string()))?;
        report.ok_or_else(|| ConvertError::Worker("Worker exited without a report".to_string()))
    }
}
