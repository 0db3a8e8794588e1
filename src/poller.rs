//! Status polling
//!
//! [`PollingClient::watch`] spawns one polling loop per task. Each loop reads
//! `GET /api/status/{task_id}`, hands every result to a [`StatusObserver`] and
//! stops after the first terminal snapshot or when its [`WatchHandle`] is
//! cancelled.
//!
//! # Cadence
//!
//! The next read is scheduled `interval` after the previous read *began*, and
//! only once that read has finished, so a slow backend never sees overlapping
//! requests for the same task.
//!
//! # Failures
//!
//! A read that fails (no reply, non-2xx status, unparseable body) is delivered
//! as [`WatchEvent::TransientError`] and polling carries on. There is no retry
//! limit here; callers that want one cancel the watch.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transport::{STATUS_PATH, Transport};
use crate::types::{StatusSnapshot, TaskHandle, WatchEvent};

/// Default delay between status reads
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Receiver of watch events
///
/// Called from the polling task, one event at a time. Implementations should
/// return quickly; the next read is not scheduled until `on_event` returns.
/// Cancelling the watch from inside `on_event` is allowed.
pub trait StatusObserver: Send + Sync + 'static {
    /// Handle one event
    fn on_event(&self, event: WatchEvent);

    /// Whether nobody is listening any more; polling stops once this is true
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> StatusObserver for F
where
    F: Fn(WatchEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: WatchEvent) {
        self(event)
    }
}

impl StatusObserver for mpsc::UnboundedSender<WatchEvent> {
    fn on_event(&self, event: WatchEvent) {
        // A dropped receiver is picked up by is_closed before the next read
        let _ = self.send(event);
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

/// Control handle for one running watch
///
/// Dropping the handle does not stop polling; call [`cancel`](Self::cancel).
#[derive(Clone, Debug)]
pub struct WatchHandle {
    handle: TaskHandle,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl WatchHandle {
    /// The task being watched
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    /// Stop all future reads
    ///
    /// A read already in flight completes but its result is discarded.
    /// Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(task_id = %self.handle, "watch cancelled");
        }
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the polling loop has exited
    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Wait until the polling loop has exited (terminal state or cancellation)
    pub async fn finished(&self) {
        self.done.cancelled().await
    }
}

/// Polls task status on a fixed cadence
#[derive(Clone)]
pub struct PollingClient {
    transport: Arc<dyn Transport>,
    interval: Duration,
}

impl PollingClient {
    /// Create a polling client reading every `interval`
    pub fn new(transport: Arc<dyn Transport>, interval: Duration) -> Self {
        Self {
            transport,
            interval,
        }
    }

    /// The default cadence for [`watch`](Self::watch)
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start watching a task at the default cadence
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(&self, handle: TaskHandle, observer: impl StatusObserver) -> WatchHandle {
        self.watch_with_interval(handle, observer, self.interval)
    }

    /// Start watching a task at an explicit cadence
    pub fn watch_with_interval(
        &self,
        handle: TaskHandle,
        observer: impl StatusObserver,
        interval: Duration,
    ) -> WatchHandle {
        let watch = WatchHandle {
            handle,
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        };

        let session = PollSession {
            transport: self.transport.clone(),
            handle: watch.handle.clone(),
            observer: Box::new(observer),
            interval,
            cancel: watch.cancel.clone(),
        };
        let done = watch.done.clone();
        tokio::spawn(async move {
            let _done = done.drop_guard();
            session.run().await;
        });

        watch
    }

    /// Start watching a task, receiving events as a stream
    ///
    /// The stream ends after the terminal snapshot or on cancellation.
    /// Dropping the stream stops polling before the next read.
    pub fn watch_stream(
        &self,
        handle: TaskHandle,
    ) -> (WatchHandle, UnboundedReceiverStream<WatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel::<WatchEvent>();
        let watch = self.watch(handle, tx);
        (watch, UnboundedReceiverStream::new(rx))
    }
}

struct PollSession {
    transport: Arc<dyn Transport>,
    handle: TaskHandle,
    observer: Box<dyn StatusObserver>,
    interval: Duration,
    cancel: CancellationToken,
}

impl PollSession {
    async fn run(self) {
        let mut consecutive_failures = 0u32;
        let mut high_water: Option<u8> = None;

        debug!(task_id = %self.handle, interval_ms = self.interval.as_millis(), "watch started");

        while !self.cancel.is_cancelled() {
            if self.observer.is_closed() {
                debug!(task_id = %self.handle, "observer closed, stopping watch");
                break;
            }

            let read_started = Instant::now();
            let outcome = self.read_status().await;

            if self.cancel.is_cancelled() {
                debug!(task_id = %self.handle, "discarding status read completed after cancel");
                break;
            }

            match outcome {
                Ok(snapshot) => {
                    consecutive_failures = 0;
                    if high_water.is_some_and(|p| snapshot.progress < p) {
                        debug!(
                            task_id = %self.handle,
                            progress = snapshot.progress,
                            previous = high_water,
                            "backend progress went backwards"
                        );
                    }
                    high_water = high_water.max(Some(snapshot.progress));

                    let terminal = snapshot.state.is_terminal();
                    if terminal {
                        info!(
                            task_id = %self.handle,
                            state = %snapshot.raw_state,
                            "task reached terminal state"
                        );
                    } else {
                        debug!(
                            task_id = %self.handle,
                            state = %snapshot.raw_state,
                            progress = snapshot.progress,
                            "status read"
                        );
                    }

                    self.observer.on_event(WatchEvent::Snapshot(snapshot));
                    if terminal {
                        break;
                    }
                }
                Err(source) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!(
                        task_id = %self.handle,
                        error = %source,
                        consecutive_failures,
                        "status read failed, will retry on next tick"
                    );
                    self.observer.on_event(WatchEvent::TransientError(Error::TransientPoll {
                        consecutive: consecutive_failures,
                        source: Box::new(source),
                    }));
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep_until(read_started + self.interval) => {}
            }
        }

        debug!(task_id = %self.handle, "watch stopped");
    }

    async fn read_status(&self) -> Result<StatusSnapshot> {
        let response = self.transport.fetch_status(&self.handle).await?;
        if !response.is_success() {
            return Err(Error::HttpStatus {
                status: response.status,
                endpoint: format!("{STATUS_PATH}{}", urlencoding::encode(self.handle.as_str())),
            });
        }
        StatusSnapshot::from_json(&response.body)
    }
}
