//! In-memory log of a recording session.

use super::types::{MessageType, RecordedLogEntry};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct RecorderState {
    recording: bool,
    entries: Vec<RecordedLogEntry>,
}

/// Append-only exchange log shared by every plugin and the pipeline.
///
/// Appends from concurrent connections are serialized by one lock, so entries
/// from a single caller keep their order. Entries are only retained while a
/// recording session is active; every entry is still emitted as a tracing event.
#[derive(Default)]
pub struct ExchangeRecorder {
    state: Mutex<RecorderState>,
}

impl ExchangeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session, discarding the previous session's log.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recording = true;
        info!("Recording started");
    }

    /// Stop the session and hand back its full log.
    ///
    /// Returns `None` when no session was active. Entries appended after this
    /// call belong to no session.
    pub fn stop(&self) -> Option<Arc<[RecordedLogEntry]>> {
        let mut state = self.state.lock();
        if !state.recording {
            return None;
        }
        state.recording = false;
        let entries: Arc<[RecordedLogEntry]> = std::mem::take(&mut state.entries).into();
        info!(entries = entries.len(), "Recording stopped");
        Some(entries)
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    /// Append an entry. Returns true if it was retained by an active session.
    pub fn record(&self, entry: RecordedLogEntry) -> bool {
        emit(&entry);
        let mut state = self.state.lock();
        if !state.recording {
            return false;
        }
        state.entries.push(entry);
        true
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the log so far, without stopping the session.
    pub fn entries(&self) -> Vec<RecordedLogEntry> {
        self.state.lock().entries.clone()
    }
}

fn emit(entry: &RecordedLogEntry) {
    let plugin = entry.plugin.as_deref().unwrap_or("pipeline");
    let text = entry.text();
    match entry.category {
        MessageType::Failed => error!(plugin, category = entry.category.label(), "{text}"),
        MessageType::Warning => warn!(plugin, category = entry.category.label(), "{text}"),
        _ => debug!(plugin, category = entry.category.label(), "{text}"),
    }
}
