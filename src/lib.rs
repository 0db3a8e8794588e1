//! # syncdub-client
//!
//! Async client for a SyncDub backend: submit an audio/video synchronization
//! job, follow its progress and fetch the result.
//!
//! ## Protocol
//!
//! A job goes through three steps, each with its own component:
//! - **Submit** ([`TaskSubmitter`]): `POST /api/upload` with the job's media
//!   (uploaded files or server-side paths). The backend answers with a task id.
//! - **Watch** ([`PollingClient`]): `GET /api/status/{task_id}` on a fixed
//!   cadence until the task completes or fails. Failed reads are reported and
//!   polling continues.
//! - **Resolve** ([`ResultResolver`]): a completed task maps to its
//!   `GET /api/download/{task_id}` reference, a failed one to a [`TaskError`].
//!
//! [`SyncDubClient`] bundles the three and adds task listing and artifact
//! download.
//!
//! ## Quick Start
//!
//! ```no_run
//! use syncdub_client::{
//!     Blob, ClientConfig, FileCollisionAction, Mode, SubmissionRequest, SyncDubClient,
//!     TaskResult, TracingSink, SLOT_DUBBED, SLOT_ORIGINAL,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SyncDubClient::new(ClientConfig::new("http://localhost:5000"))?;
//!
//!     let request = SubmissionRequest::new(Mode::Sync)
//!         .with_blob(SLOT_ORIGINAL, Blob::from_path("movie.mkv").await?)
//!         .with_server_path(SLOT_DUBBED, "dubs/movie_es.mkv")
//!         .with_output_name("movie_dual");
//!
//!     match client.run(request, &TracingSink).await? {
//!         TaskResult::Completed(reference) => {
//!             let path = client
//!                 .download_artifact(&reference, std::path::Path::new("downloads"), FileCollisionAction::Rename)
//!                 .await?;
//!             println!("saved to {}", path.display());
//!         }
//!         TaskResult::Failed(error) => eprintln!("job failed: {error}"),
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// High-level client facade
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Presentation hooks
pub mod notify;
/// Status polling
pub mod poller;
/// Terminal outcome resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Job submission
pub mod submitter;
/// Backend transport
pub mod transport;
/// Core value types
pub mod types;
/// Output name and file path helpers
pub mod utils;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use client::SyncDubClient;
pub use config::{ClientConfig, FileCollisionAction, RetryConfig};
pub use error::{Error, ErrorDetail, ErrorKind, Result, TaskError};
pub use notify::{NotificationSink, ProgressGauge, TracingSink};
pub use poller::{DEFAULT_POLL_INTERVAL, PollingClient, StatusObserver, WatchHandle};
pub use resolver::ResultResolver;
pub use submitter::TaskSubmitter;
pub use transport::{HttpTransport, Transport};
pub use types::{
    Blob, DownloadReference, Mode, PayloadSource, SLOT_DUBBED, SLOT_ORIGINAL, StatusSnapshot,
    SubmissionRequest, TaskHandle, TaskResult, TaskState, TaskSummary, WatchEvent,
};
