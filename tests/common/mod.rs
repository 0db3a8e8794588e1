//! Common test utilities for syncdub-client integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;
use syncdub_client::{
    ClientConfig, DownloadReference, Error, ErrorDetail, NotificationSink, SyncDubClient,
    TaskHandle,
};
use wiremock::MockServer;

/// Poll interval short enough to keep real-time tests fast
pub const FAST_POLL: Duration = Duration::from_millis(20);

/// Client pointed at a mock backend with a fast poll cadence
#[allow(clippy::unwrap_used)]
pub fn client_for(server: &MockServer) -> SyncDubClient {
    let config = ClientConfig {
        poll_interval: FAST_POLL,
        ..ClientConfig::new(server.uri())
    };
    SyncDubClient::new(config).unwrap()
}

/// Notification kinds in arrival order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Note {
    Submitted(String),
    Progress(u8),
    Transient,
    Completed(String),
    Failed(String),
}

/// Sink that records every notification
#[derive(Clone, Default)]
pub struct RecordingSink {
    notes: Arc<Mutex<Vec<Note>>>,
}

#[allow(clippy::unwrap_used)]
impl RecordingSink {
    pub fn notes(&self) -> Vec<Note> {
        self.notes.lock().unwrap().clone()
    }

    fn push(&self, note: Note) {
        self.notes.lock().unwrap().push(note);
    }
}

impl NotificationSink for RecordingSink {
    fn submitted(&self, handle: &TaskHandle) {
        self.push(Note::Submitted(handle.to_string()));
    }

    fn progress(&self, _handle: &TaskHandle, percent: u8, _message: Option<&str>) {
        self.push(Note::Progress(percent));
    }

    fn transient_error(&self, _handle: &TaskHandle, _error: &Error) {
        self.push(Note::Transient);
    }

    fn completed(&self, _handle: &TaskHandle, reference: &DownloadReference) {
        self.push(Note::Completed(reference.path.clone()));
    }

    fn failed(&self, _handle: Option<&TaskHandle>, error: &ErrorDetail) {
        self.push(Note::Failed(error.message.clone()));
    }
}
