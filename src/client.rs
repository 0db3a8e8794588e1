//! High-level client
//!
//! [`SyncDubClient`] bundles the submitter, poller and resolver over one
//! transport. Callers create and own as many instances as they need; there is
//! no process-wide client.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientConfig, FileCollisionAction};
use crate::error::{Error, ErrorDetail, Result};
use crate::notify::{NotificationSink, ProgressGauge};
use crate::poller::{PollingClient, StatusObserver, WatchHandle};
use crate::resolver::ResultResolver;
use crate::retry::with_retry;
use crate::submitter::TaskSubmitter;
use crate::transport::{HttpTransport, TASKS_PATH, Transport};
use crate::types::{
    DownloadReference, StatusSnapshot, SubmissionRequest, TaskHandle, TaskResult, TaskSummary,
    WatchEvent,
};
use crate::utils::{get_unique_path, sanitize_output_name};

/// Extension given to artifacts saved into a directory
const ARTIFACT_EXTENSION: &str = "mkv";

/// Client for one SyncDub backend
#[derive(Clone)]
pub struct SyncDubClient {
    config: ClientConfig,
    base_url: Url,
    transport: Arc<dyn Transport>,
    submitter: TaskSubmitter,
    poller: PollingClient,
    resolver: ResultResolver,
}

impl std::fmt::Debug for SyncDubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDubClient")
            .field("base_url", &self.base_url.as_str())
            .field("poll_interval", &self.config.poll_interval)
            .finish_non_exhaustive()
    }
}

impl SyncDubClient {
    /// Create a client talking HTTP to `config.base_url`
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Create a client over a custom transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let base_url = config.validate()?;
        Ok(Self {
            submitter: TaskSubmitter::new(transport.clone()),
            poller: PollingClient::new(transport.clone(), config.poll_interval),
            resolver: ResultResolver::new(base_url.clone()),
            transport,
            base_url,
            config,
        })
    }

    /// The configuration this client was built from
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The normalized backend root
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Submit a job; see [`TaskSubmitter::submit`]
    pub async fn submit(&self, request: SubmissionRequest) -> Result<TaskHandle> {
        self.submitter.submit(request).await
    }

    /// Watch a task at the configured cadence; see [`PollingClient::watch`]
    pub fn watch(&self, handle: TaskHandle, observer: impl StatusObserver) -> WatchHandle {
        self.poller.watch(handle, observer)
    }

    /// Watch a task at an explicit cadence
    pub fn watch_with_interval(
        &self,
        handle: TaskHandle,
        observer: impl StatusObserver,
        interval: Duration,
    ) -> WatchHandle {
        self.poller.watch_with_interval(handle, observer, interval)
    }

    /// Watch a task, receiving events as a stream
    pub fn watch_stream(
        &self,
        handle: TaskHandle,
    ) -> (WatchHandle, UnboundedReceiverStream<WatchEvent>) {
        self.poller.watch_stream(handle)
    }

    /// Resolve a terminal snapshot; see [`ResultResolver::resolve`]
    pub fn resolve(&self, snapshot: &StatusSnapshot, handle: &TaskHandle) -> Result<TaskResult> {
        self.resolver.resolve(snapshot, handle)
    }

    /// Submit a job and follow it to its terminal outcome
    ///
    /// Drives `sink` through the whole life-cycle. A job the backend reports
    /// as failed is `Ok(TaskResult::Failed)`; `Err` means the outcome is
    /// unknown: the submission failed, or `max_consecutive_poll_failures`
    /// status reads failed in a row (the last [`Error::TransientPoll`] is
    /// returned).
    ///
    /// Dropping the returned future cancels polling.
    pub async fn run(
        &self,
        request: SubmissionRequest,
        sink: &dyn NotificationSink,
    ) -> Result<TaskResult> {
        let handle = match self.submit(request).await {
            Ok(handle) => handle,
            Err(e) => {
                sink.failed(None, &ErrorDetail::from(&e));
                return Err(e);
            }
        };
        sink.submitted(&handle);

        let (watch, mut events) = self.watch_stream(handle.clone());
        let watch = CancelOnDrop(watch);
        let mut gauge = ProgressGauge::new();

        while let Some(event) = events.next().await {
            match event {
                WatchEvent::Snapshot(snapshot) if snapshot.state.is_terminal() => {
                    let result = self.resolve(&snapshot, &handle)?;
                    match &result {
                        TaskResult::Completed(reference) => {
                            sink.progress(&handle, gauge.complete(), snapshot.message.as_deref());
                            sink.completed(&handle, reference);
                        }
                        TaskResult::Failed(task_error) => {
                            let error = Error::Task(task_error.clone());
                            sink.failed(Some(&handle), &ErrorDetail::from(&error));
                        }
                    }
                    return Ok(result);
                }
                WatchEvent::Snapshot(snapshot) => {
                    let percent = gauge.update(snapshot.progress);
                    sink.progress(&handle, percent, snapshot.message.as_deref());
                }
                WatchEvent::TransientError(error) => {
                    sink.transient_error(&handle, &error);
                    if self.failure_limit_reached(&error) {
                        warn!(task_id = %handle, error = %error, "giving up on status polling");
                        watch.0.cancel();
                        sink.failed(Some(&handle), &ErrorDetail::from(&error));
                        return Err(error);
                    }
                }
            }
        }

        Err(Error::Cancelled)
    }

    fn failure_limit_reached(&self, error: &Error) -> bool {
        match (self.config.max_consecutive_poll_failures, error) {
            (Some(limit), Error::TransientPoll { consecutive, .. }) => *consecutive >= limit,
            _ => false,
        }
    }

    /// List every task the backend knows about
    pub async fn list_tasks(&self) -> Result<Vec<TaskSummary>> {
        #[derive(Deserialize)]
        struct TaskListing {
            tasks: Vec<TaskSummary>,
            #[serde(default)]
            total: Option<usize>,
        }

        let response = self.transport.list_tasks().await?;
        if !response.is_success() {
            return Err(Error::HttpStatus {
                status: response.status,
                endpoint: TASKS_PATH.to_string(),
            });
        }

        let listing: TaskListing = serde_json::from_slice(&response.body)
            .map_err(|e| Error::Protocol(format!("malformed task listing: {e}")))?;
        if let Some(total) = listing.total
            && total != listing.tasks.len()
        {
            debug!(total, listed = listing.tasks.len(), "task listing total disagrees with entries");
        }
        Ok(listing.tasks)
    }

    /// Save a finished task's artifact to disk
    ///
    /// `dest` is either an existing directory, in which case the file is named
    /// after the task, or a file path. `action` decides what happens when the
    /// target already exists. Transient failures are retried per
    /// `config.retry`.
    ///
    /// Bytes are written to a `.part` file next to the target and renamed into
    /// place once complete, so a failed download leaves any existing file
    /// untouched.
    pub async fn download_artifact(
        &self,
        reference: &DownloadReference,
        dest: &Path,
        action: FileCollisionAction,
    ) -> Result<PathBuf> {
        let requested = if tokio::fs::metadata(dest).await.is_ok_and(|m| m.is_dir()) {
            dest.join(artifact_file_name(reference)?)
        } else {
            dest.to_path_buf()
        };
        let target = get_unique_path(&requested, action)?;
        let partial = partial_path(&target)?;

        let downloaded = with_retry(&self.config.retry, || {
            let transport = self.transport.clone();
            let partial = partial.clone();
            async move {
                let mut file = tokio::fs::File::create(&partial).await?;
                transport.download(&reference.path, &mut file).await
            }
        })
        .await;
        let result = match downloaded {
            Ok(bytes) => tokio::fs::rename(&partial, &target)
                .await
                .map(|()| bytes)
                .map_err(Error::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(bytes) => {
                info!(path = %target.display(), bytes, "artifact saved");
                Ok(target)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&partial).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %partial.display(), error = %remove_err, "failed to remove partial download");
                }
                Err(e)
            }
        }
    }
}

/// Cancels the watch when `run` returns or is dropped
struct CancelOnDrop(WatchHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// `<target>.part`, the file a download is written to before completion
fn partial_path(target: &Path) -> Result<PathBuf> {
    let mut name = target
        .file_name()
        .ok_or_else(|| Error::FileCollision {
            path: target.to_path_buf(),
            reason: "destination has no file name".to_string(),
        })?
        .to_os_string();
    name.push(".part");
    Ok(target.with_file_name(name))
}

fn artifact_file_name(reference: &DownloadReference) -> Result<String> {
    let segment = reference
        .url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let decoded = urlencoding::decode(segment)
        .map_err(|e| Error::Protocol(format!("download path is not UTF-8: {e}")))?;
    let stem = sanitize_output_name(&decoded).ok_or_else(|| {
        Error::Protocol(format!("download path '{}' has no task id", reference.path))
    })?;
    Ok(format!("{stem}.{ARTIFACT_EXTENSION}"))
}
