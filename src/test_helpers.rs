//! Shared test helpers: a scripted [`Transport`] with call counters.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::transport::{SubmissionBody, Transport, WireResponse};
use crate::types::TaskHandle;

/// Transport that replays queued replies in order.
///
/// An exhausted status script answers with a transport error so that an
/// unexpected extra read shows up as an event in assertions.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    submits: Mutex<VecDeque<Result<WireResponse>>>,
    statuses: Mutex<VecDeque<Result<WireResponse>>>,
    downloads: Mutex<VecDeque<Result<Vec<u8>>>>,
    tasks: Mutex<Option<WireResponse>>,
    status_delay: Mutex<Option<Duration>>,
    submit_calls: AtomicUsize,
    status_calls: AtomicUsize,
    download_calls: AtomicUsize,
    last_body: Mutex<Option<SubmissionBody>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Transport whose status script is `steps`
    pub(crate) fn with_statuses(steps: Vec<Result<WireResponse>>) -> Self {
        let transport = Self::new();
        transport.statuses.lock().unwrap().extend(steps);
        transport
    }

    pub(crate) fn push_submit(&self, reply: Result<WireResponse>) {
        self.submits.lock().unwrap().push_back(reply);
    }

    pub(crate) fn push_download(&self, reply: Result<Vec<u8>>) {
        self.downloads.lock().unwrap().push_back(reply);
    }

    pub(crate) fn set_tasks(&self, reply: WireResponse) {
        *self.tasks.lock().unwrap() = Some(reply);
    }

    /// Make every status read take `delay` of (virtual) time
    pub(crate) fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_body(&self) -> Option<SubmissionBody> {
        self.last_body.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit(&self, body: SubmissionBody) -> Result<WireResponse> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_body.lock().unwrap() = Some(body);
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Io(std::io::Error::other("submit script exhausted"))))
    }

    async fn fetch_status(&self, _handle: &TaskHandle) -> Result<WireResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Io(std::io::Error::other("status script exhausted"))))
    }

    async fn list_tasks(&self) -> Result<WireResponse> {
        self.tasks
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Io(std::io::Error::other("no task listing scripted")))
    }

    async fn download(
        &self,
        _path: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .downloads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Io(std::io::Error::other("download script exhausted"))));
        let bytes = reply?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(bytes.len() as u64)
    }
}

pub(crate) fn running(progress: u8) -> Result<WireResponse> {
    Ok(WireResponse::json(
        200,
        &json!({"status": "processing", "progress": progress, "message": "Procesando..."}),
    ))
}

pub(crate) fn completed() -> Result<WireResponse> {
    Ok(WireResponse::json(
        200,
        &json!({"status": "completed", "progress": 100, "message": "Procesamiento completado"}),
    ))
}

pub(crate) fn failed(error: &str) -> Result<WireResponse> {
    Ok(WireResponse::json(
        200,
        &json!({"status": "failed", "progress": 60, "error": error}),
    ))
}

/// A request that never reached the backend
pub(crate) fn connection_reset() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset by peer",
    ))
}

/// A status read that never reached the backend
pub(crate) fn transport_error() -> Result<WireResponse> {
    Err(connection_reset())
}

pub(crate) fn handle(id: &str) -> TaskHandle {
    TaskHandle::new(id).unwrap()
}
