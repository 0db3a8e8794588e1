//! Core value types for the task protocol

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

use crate::error::{Error, Result, TaskError};

/// Opaque identifier issued by the backend when it accepts a job
///
/// Equality is by value only; a handle cannot be derived from request
/// contents and is never parsed or inspected by the client.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(String);

impl TaskHandle {
    /// Restore a handle the caller persisted earlier
    ///
    /// Returns a protocol error for an empty or whitespace-only identifier.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::Protocol("task identifier is empty".into()));
        }
        Ok(Self(id))
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TaskHandle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known slot holding the original-language video
pub const SLOT_ORIGINAL: &str = "original";
/// Well-known slot holding the dubbed video
pub const SLOT_DUBBED: &str = "dubbed";

/// Processing mode, selecting which payload slots are required
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Synchronize dubbed audio onto the original video
    #[default]
    Sync,
    /// Convert a single video
    Convert,
}

impl Mode {
    /// Slots that must be populated for this mode
    pub fn required_slots(&self) -> &'static [&'static str] {
        match self {
            Mode::Sync => &[SLOT_ORIGINAL, SLOT_DUBBED],
            Mode::Convert => &[SLOT_ORIGINAL],
        }
    }

    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sync => "sync",
            Mode::Convert => "convert",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory binary payload
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    /// File name reported to the backend
    pub file_name: String,
    /// MIME type of the content (application/octet-stream when None)
    pub content_type: Option<String>,
    /// The file contents
    pub bytes: Vec<u8>,
}

impl Blob {
    /// Create a blob from bytes
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    /// Set the MIME type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a local file into a blob, named after the file
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::validation(format!("cannot derive a file name from {}", path.display()))
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(file_name, bytes))
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the blob has no content
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Contents are elided; a multi-gigabyte video in a debug log is never useful.
impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Content of one payload slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadSource {
    /// Binary data uploaded with the request
    Blob(Blob),
    /// A file that already exists on the backend's media volume
    ServerPath(String),
}

impl PayloadSource {
    fn is_empty(&self) -> bool {
        match self {
            PayloadSource::Blob(blob) => blob.is_empty(),
            PayloadSource::ServerPath(path) => path.trim().is_empty(),
        }
    }
}

/// Description of the work to submit
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionRequest {
    mode: Mode,
    slots: BTreeMap<String, PayloadSource>,
    output_name: Option<String>,
}

impl SubmissionRequest {
    /// Create an empty request for the given mode
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Populate a slot, replacing whatever it held before
    pub fn with_slot(mut self, slot: impl Into<String>, source: PayloadSource) -> Self {
        self.slots.insert(slot.into(), source);
        self
    }

    /// Populate a slot with in-memory data
    pub fn with_blob(self, slot: impl Into<String>, blob: Blob) -> Self {
        self.with_slot(slot, PayloadSource::Blob(blob))
    }

    /// Populate a slot with a path on the backend's media volume
    pub fn with_server_path(self, slot: impl Into<String>, path: impl Into<String>) -> Self {
        self.with_slot(slot, PayloadSource::ServerPath(path.into()))
    }

    /// Override the output file name
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    /// The selected mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Populated slots in name order
    pub fn slots(&self) -> &BTreeMap<String, PayloadSource> {
        &self.slots
    }

    /// The output name override, if one was given and is not blank
    pub fn output_name(&self) -> Option<&str> {
        self.output_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Whether any slot carries binary data
    pub fn has_blobs(&self) -> bool {
        self.slots
            .values()
            .any(|source| matches!(source, PayloadSource::Blob(_)))
    }

    pub(crate) fn into_parts(self) -> (Mode, BTreeMap<String, PayloadSource>, Option<String>) {
        let output_name = self.output_name().map(str::to_string);
        (self.mode, self.slots, output_name)
    }

    /// Check the request is complete enough to send
    pub fn validate(&self) -> Result<()> {
        if self.slots.is_empty() {
            return Err(Error::validation(
                "at least one payload slot must be populated",
            ));
        }

        for (name, source) in &self.slots {
            if !is_valid_slot_name(name) {
                return Err(Error::Validation {
                    message: format!(
                        "slot name '{name}' must be non-empty lowercase ASCII letters, digits or '_'"
                    ),
                    slot: Some(name.clone()),
                });
            }
            if source.is_empty() {
                return Err(Error::Validation {
                    message: format!("slot '{name}' is empty"),
                    slot: Some(name.clone()),
                });
            }
        }

        if let Some(missing) = self
            .mode
            .required_slots()
            .iter()
            .find(|slot| !self.slots.contains_key(**slot))
        {
            return Err(Error::Validation {
                message: format!("mode '{}' requires the '{missing}' slot", self.mode),
                slot: Some((*missing).to_string()),
            });
        }

        Ok(())
    }
}

fn is_valid_slot_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Life-cycle bucket of a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Submitted, no status read yet
    Pending,
    /// Any non-terminal backend state
    Running,
    /// Finished successfully; an artifact is available
    Completed,
    /// Finished with an error
    Failed,
}

impl TaskState {
    /// Map a backend state string onto a bucket
    ///
    /// `completed` is success, `failed` and `error` are both failure, and
    /// anything else (including unknown strings) counts as still running.
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("completed") {
            TaskState::Completed
        } else if raw.eq_ignore_ascii_case("failed") || raw.eq_ignore_ascii_case("error") {
            TaskState::Failed
        } else {
            TaskState::Running
        }
    }

    /// Whether polling stops at this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// One status read
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// State string exactly as the backend reported it
    pub raw_state: String,
    /// Classified bucket
    pub state: TaskState,
    /// Progress as reported (0-100); may regress between reads
    pub progress: u8,
    /// Human-readable status message
    pub message: Option<String>,
    /// Error text for failed tasks
    pub error: Option<String>,
    /// Machine-readable failure reason, if the backend sent one
    pub code: Option<String>,
    /// When the read completed
    pub observed_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct StatusBody {
    status: Option<String>,
    #[serde(default, deserialize_with = "deserialize_progress")]
    progress: u8,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl StatusSnapshot {
    /// Parse a `GET /api/status/{task_id}` body
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let body: StatusBody = serde_json::from_slice(body)
            .map_err(|e| Error::Protocol(format!("malformed status body: {e}")))?;
        let raw_state = body
            .status
            .ok_or_else(|| Error::Protocol("status body has no 'status' field".into()))?;

        Ok(Self {
            state: TaskState::classify(&raw_state),
            raw_state,
            progress: body.progress,
            message: non_blank(body.message),
            error: non_blank(body.error),
            code: non_blank(body.code),
            observed_at: Utc::now(),
        })
    }

    /// Build a snapshot directly, mostly useful for tests and replay
    pub fn new(raw_state: impl Into<String>, progress: u8, message: Option<&str>) -> Self {
        let raw_state = raw_state.into();
        Self {
            state: TaskState::classify(&raw_state),
            raw_state,
            progress: progress.min(100),
            message: message.map(str::to_string),
            error: None,
            code: None,
            observed_at: Utc::now(),
        }
    }

    /// Message to show the user
    ///
    /// Failed snapshots prefer the error text; others prefer the status message.
    pub fn display_message(&self) -> Option<&str> {
        match self.state {
            TaskState::Failed => self.error.as_deref().or(self.message.as_deref()),
            _ => self.message.as_deref().or(self.error.as_deref()),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Clamp a wire progress number into 0..=100
pub(crate) fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

fn deserialize_progress<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(clamp_progress).unwrap_or(0))
}

/// Locator for a finished task's artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReference {
    /// Backend-relative path, e.g. `/api/download/abc123`
    pub path: String,
    /// Absolute URL on the configured backend
    pub url: Url,
}

impl DownloadReference {
    /// Address the download endpoint for a task
    pub fn for_task(base_url: &Url, handle: &TaskHandle) -> Result<Self> {
        let path = format!(
            "{}{}",
            crate::transport::DOWNLOAD_PATH,
            urlencoding::encode(handle.as_str())
        );
        let url = base_url.join(path.trim_start_matches('/'))?;
        Ok(Self { path, url })
    }
}

/// Terminal outcome of a task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskResult {
    /// The artifact can be fetched from this reference
    Completed(DownloadReference),
    /// The backend reported a failure
    Failed(TaskError),
}

/// Event delivered to a status observer
#[derive(Debug)]
pub enum WatchEvent {
    /// A successful status read
    Snapshot(StatusSnapshot),
    /// A failed status read ([`Error::TransientPoll`]); polling continues
    TransientError(Error),
}

impl WatchEvent {
    /// The snapshot, if this event carries one
    pub fn snapshot(&self) -> Option<&StatusSnapshot> {
        match self {
            WatchEvent::Snapshot(snapshot) => Some(snapshot),
            WatchEvent::TransientError(_) => None,
        }
    }

    /// Whether this is the final event of a watch
    pub fn is_terminal(&self) -> bool {
        self.snapshot().is_some_and(|s| s.state.is_terminal())
    }
}

/// One entry of the backend's task listing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Task identifier
    pub task_id: TaskHandle,
    /// Raw backend state string
    pub status: String,
    /// Progress (0-100)
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: u8,
    /// Last status message
    #[serde(default)]
    pub message: Option<String>,
    /// Creation timestamp as the backend formats it
    #[serde(default)]
    pub created_at: Option<String>,
}

impl TaskSummary {
    /// Classified state of this task
    pub fn state(&self) -> TaskState {
        TaskState::classify(&self.status)
    }
}
