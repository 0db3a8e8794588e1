//! Terminal outcome resolution

use url::Url;

use crate::error::{Error, Result, TaskError};
use crate::types::{DownloadReference, StatusSnapshot, TaskHandle, TaskResult, TaskState};

/// Turns a terminal snapshot into a [`TaskResult`]
///
/// Needs no network access: the download endpoint is addressed by task id.
#[derive(Clone, Debug)]
pub struct ResultResolver {
    base_url: Url,
}

impl ResultResolver {
    /// Create a resolver for the backend rooted at `base_url`
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Resolve the outcome of a finished task
    ///
    /// Returns [`Error::Precondition`] for a snapshot that is not terminal.
    pub fn resolve(&self, snapshot: &StatusSnapshot, handle: &TaskHandle) -> Result<TaskResult> {
        match snapshot.state {
            TaskState::Completed => Ok(TaskResult::Completed(DownloadReference::for_task(
                &self.base_url,
                handle,
            )?)),
            TaskState::Failed => {
                let message = snapshot
                    .display_message()
                    .unwrap_or(TaskError::GENERIC_MESSAGE)
                    .to_string();
                Ok(TaskResult::Failed(TaskError {
                    message,
                    code: snapshot.code.clone(),
                }))
            }
            TaskState::Pending | TaskState::Running => Err(Error::Precondition(format!(
                "task {handle} is still '{}'; only completed or failed snapshots can be resolved",
                snapshot.raw_state
            ))),
        }
    }
}
