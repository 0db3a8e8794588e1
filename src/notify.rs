//! Presentation hooks
//!
//! The client never renders anything. A [`NotificationSink`] receives the
//! life-cycle of a job (submitted, progress, transient errors, terminal
//! outcome) and turns it into whatever the UI needs: a progress bar, a toast,
//! a log line.

use tracing::{info, warn};

use crate::error::{Error, ErrorDetail};
use crate::types::{DownloadReference, TaskHandle};

/// Receiver of job life-cycle notifications
///
/// Every method has an empty default so sinks implement only what they show.
pub trait NotificationSink: Send + Sync {
    /// The backend accepted the job
    fn submitted(&self, _handle: &TaskHandle) {}

    /// A status read arrived; `percent` never goes backwards within one job
    fn progress(&self, _handle: &TaskHandle, _percent: u8, _message: Option<&str>) {}

    /// A status read failed; polling continues
    fn transient_error(&self, _handle: &TaskHandle, _error: &Error) {}

    /// The artifact is ready
    fn completed(&self, _handle: &TaskHandle, _reference: &DownloadReference) {}

    /// The job failed, or could not be submitted at all (`handle` is None)
    fn failed(&self, _handle: Option<&TaskHandle>, _error: &ErrorDetail) {}
}

/// Sink that writes every notification to `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn submitted(&self, handle: &TaskHandle) {
        info!(task_id = %handle, "job submitted");
    }

    fn progress(&self, handle: &TaskHandle, percent: u8, message: Option<&str>) {
        info!(task_id = %handle, percent, message = message.unwrap_or(""), "job progress");
    }

    fn transient_error(&self, handle: &TaskHandle, error: &Error) {
        warn!(task_id = %handle, error = %error, "status check failed");
    }

    fn completed(&self, handle: &TaskHandle, reference: &DownloadReference) {
        info!(task_id = %handle, url = %reference.url, "job completed");
    }

    fn failed(&self, handle: Option<&TaskHandle>, error: &ErrorDetail) {
        match handle {
            Some(handle) => warn!(task_id = %handle, code = %error.code, message = %error.message, "job failed"),
            None => warn!(code = %error.code, message = %error.message, "job could not be submitted"),
        }
    }
}

/// UI-facing progress value that never regresses
///
/// Snapshots carry the backend's raw percentage, which can move backwards
/// (for example when the backend falls back to a slower path). A progress bar
/// should not, so sinks feed raw values through a gauge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressGauge {
    percent: u8,
}

impl ProgressGauge {
    /// Start at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw value and return the value to display
    pub fn update(&mut self, raw: u8) -> u8 {
        self.percent = self.percent.max(raw.min(100));
        self.percent
    }

    /// Jump to 100 (terminal success)
    pub fn complete(&mut self) -> u8 {
        self.percent = 100;
        self.percent
    }

    /// Current displayed value
    pub fn percent(&self) -> u8 {
        self.percent
    }
}
