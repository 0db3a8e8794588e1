//! Job submission
//!
//! Validates a [`SubmissionRequest`], encodes it for the upload endpoint and
//! exchanges it for a [`TaskHandle`]. Submission is a single attempt; whether
//! to retry a rejected upload is left to the caller.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::transport::{FormPart, SubmissionBody, Transport, WireResponse};
use crate::types::{PayloadSource, SubmissionRequest, TaskHandle};

/// Exchanges submission requests for task handles
#[derive(Clone)]
pub struct TaskSubmitter {
    transport: Arc<dyn Transport>,
}

impl TaskSubmitter {
    /// Create a submitter over the given transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Submit a job and return its handle
    ///
    /// Fails with [`Error::Validation`] before touching the network when a
    /// required slot is missing, with [`Error::Submission`] when the backend
    /// rejects the upload and with [`Error::Protocol`] when an accepted upload
    /// does not carry a usable `task_id`. Does not start polling.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<TaskHandle> {
        request.validate()?;

        let mode = request.mode();
        let body = encode(request);
        let multipart = matches!(body, SubmissionBody::Multipart(_));

        let response = self.transport.submit(body).await?;
        match parse_submission_response(&response) {
            Ok(handle) => {
                info!(task_id = %handle, %mode, multipart, "task submitted");
                Ok(handle)
            }
            Err(e) => {
                warn!(%mode, status = response.status, error = %e, "submission failed");
                Err(e)
            }
        }
    }
}

/// Encode a validated request into the wire body
///
/// Any binary slot forces multipart encoding; path slots then travel as text
/// fields alongside the files. A request of only server paths becomes JSON.
pub fn encode(request: SubmissionRequest) -> SubmissionBody {
    let has_blobs = request.has_blobs();
    let (mode, slots, output_name) = request.into_parts();

    if has_blobs {
        let mut parts = Vec::with_capacity(slots.len() + 2);
        parts.push(FormPart::Text {
            name: "mode".into(),
            value: mode.as_str().into(),
        });
        for (slot, source) in slots {
            parts.push(match source {
                PayloadSource::Blob(blob) => FormPart::File {
                    name: format!("{slot}_video"),
                    blob,
                },
                PayloadSource::ServerPath(path) => FormPart::Text {
                    name: format!("{slot}_path"),
                    value: path,
                },
            });
        }
        if let Some(name) = output_name {
            parts.push(FormPart::Text {
                name: "output_name".into(),
                value: name,
            });
        }
        SubmissionBody::Multipart(parts)
    } else {
        let mut body = Map::new();
        body.insert("mode".into(), Value::String(mode.as_str().into()));
        for (slot, source) in slots {
            if let PayloadSource::ServerPath(path) = source {
                body.insert(format!("{slot}_path"), Value::String(path));
            }
        }
        if let Some(name) = output_name {
            body.insert("custom_name".into(), Value::String(name));
        }
        SubmissionBody::Json(Value::Object(body))
    }
}

/// Extract the task handle from an upload reply
fn parse_submission_response(response: &WireResponse) -> Result<TaskHandle> {
    let body: Option<Value> = serde_json::from_slice(&response.body).ok();

    if !response.is_success() {
        let message = body
            .as_ref()
            .and_then(|b| b.get("error"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| generic_rejection(response.status));
        return Err(Error::Submission {
            status: response.status,
            message,
        });
    }

    let body = body.ok_or_else(|| Error::Protocol("upload reply is not valid JSON".into()))?;
    match body.get("task_id") {
        Some(Value::String(id)) => TaskHandle::new(id.clone()),
        Some(other) => Err(Error::Protocol(format!(
            "upload reply has a non-string task_id: {other}"
        ))),
        None => Err(Error::Protocol("upload reply has no task_id".into())),
    }
}

fn generic_rejection(status: u16) -> String {
    match reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => format!("upload failed with status {status} ({reason})"),
        None => format!("upload failed with status {status}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedTransport;
    use crate::types::{Blob, Mode, SLOT_DUBBED, SLOT_ORIGINAL};
    use serde_json::json;

    fn submitter(transport: &Arc<ScriptedTransport>) -> TaskSubmitter {
        TaskSubmitter::new(transport.clone())
    }

    #[tokio::test]
    async fn incomplete_request_makes_no_network_call() {
        let transport = Arc::new(ScriptedTransport::new());
        let request = SubmissionRequest::new(Mode::Sync)
            .with_blob(SLOT_ORIGINAL, Blob::new("a.mp4", b"x".to_vec()));

        let err = submitter(&transport).submit(request).await.unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(transport.submit_calls(), 0);
    }

    #[tokio::test]
    async fn accepted_upload_returns_backend_handle() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_submit(Ok(WireResponse::json(
            200,
            &json!({"task_id": "9f1c-77", "message": "ok", "status": "processing"}),
        )));
        let request = SubmissionRequest::new(Mode::Sync)
            .with_server_path(SLOT_ORIGINAL, "movies/a.mkv")
            .with_server_path(SLOT_DUBBED, "movies/a_es.mkv");

        let handle = submitter(&transport).submit(request).await.unwrap();

        assert_eq!(handle.as_str(), "9f1c-77");
        assert_eq!(transport.submit_calls(), 1);
        assert_eq!(
            transport.last_body(),
            Some(SubmissionBody::Json(json!({
                "mode": "sync",
                "original_path": "movies/a.mkv",
                "dubbed_path": "movies/a_es.mkv",
            })))
        );
    }

    #[tokio::test]
    async fn blob_upload_is_sent_as_multipart() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_submit(Ok(WireResponse::json(200, &json!({"task_id": "mp-2"}))));
        let request = SubmissionRequest::new(Mode::Convert)
            .with_blob(SLOT_ORIGINAL, Blob::new("a.avi", b"video".to_vec()));

        submitter(&transport).submit(request).await.unwrap();

        let Some(SubmissionBody::Multipart(parts)) = transport.last_body() else {
            panic!("expected a multipart body to be sent");
        };
        let names: Vec<&str> = parts.iter().map(FormPart::name).collect();
        assert_eq!(names, ["mode", "original_video"]);
    }

    #[tokio::test]
    async fn rejection_carries_backend_message() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_submit(Ok(WireResponse::json(
            400,
            &json!({"error": "Formato de archivo no soportado"}),
        )));
        let request = SubmissionRequest::new(Mode::Convert)
            .with_server_path(SLOT_ORIGINAL, "movies/a.txt");

        match submitter(&transport).submit(request).await.unwrap_err() {
            Error::Submission { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Formato de archivo no soportado");
            }
            other => panic!("expected submission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejection_without_message_uses_status() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_submit(Ok(WireResponse {
            status: 502,
            body: b"<html>Bad Gateway</html>".to_vec(),
        }));
        let request = SubmissionRequest::new(Mode::Convert)
            .with_server_path(SLOT_ORIGINAL, "movies/a.mkv");

        match submitter(&transport).submit(request).await.unwrap_err() {
            Error::Submission { status, message } => {
                assert_eq!(status, 502);
                assert!(message.contains("502"), "got: {message}");
                assert!(message.contains("Bad Gateway"), "got: {message}");
            }
            other => panic!("expected submission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn accepted_upload_without_task_id_is_protocol_error() {
        for body in [json!({"message": "ok"}), json!({"task_id": 42}), json!({"task_id": ""})] {
            let transport = Arc::new(ScriptedTransport::new());
            transport.push_submit(Ok(WireResponse::json(200, &body)));
            let request = SubmissionRequest::new(Mode::Convert)
                .with_server_path(SLOT_ORIGINAL, "movies/a.mkv");

            let err = submitter(&transport).submit(request).await.unwrap_err();
            assert!(matches!(err, Error::Protocol(_)), "body {body}: got {err:?}");
        }
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_submit(Err(Error::Io(std::io::Error::other("connection reset"))));
        let request = SubmissionRequest::new(Mode::Convert)
            .with_server_path(SLOT_ORIGINAL, "movies/a.mkv");

        let err = submitter(&transport).submit(request).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn path_only_request_encodes_as_json() {
        let request = SubmissionRequest::new(Mode::Sync)
            .with_server_path(SLOT_ORIGINAL, "movies/a.mkv")
            .with_server_path(SLOT_DUBBED, "movies/a_es.mkv")
            .with_output_name(" final ");

        match encode(request) {
            SubmissionBody::Json(value) => assert_eq!(
                value,
                json!({
                    "mode": "sync",
                    "original_path": "movies/a.mkv",
                    "dubbed_path": "movies/a_es.mkv",
                    "custom_name": "final",
                })
            ),
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[test]
    fn mixed_request_encodes_as_multipart() {
        let request = SubmissionRequest::new(Mode::Sync)
            .with_blob(SLOT_ORIGINAL, Blob::new("a.mp4", b"video".to_vec()))
            .with_server_path(SLOT_DUBBED, "movies/a_es.mkv")
            .with_output_name("final");

        let SubmissionBody::Multipart(parts) = encode(request) else {
            panic!("expected multipart body");
        };
        let names: Vec<&str> = parts.iter().map(FormPart::name).collect();
        assert_eq!(
            names,
            ["mode", "dubbed_path", "original_video", "output_name"]
        );
        assert!(matches!(&parts[2], FormPart::File { blob, .. } if blob.file_name == "a.mp4"));
    }

    #[test]
    fn blank_output_name_is_not_sent() {
        let request = SubmissionRequest::new(Mode::Convert)
            .with_server_path(SLOT_ORIGINAL, "movies/a.mkv")
            .with_output_name("   ");
        let SubmissionBody::Json(value) = encode(request) else {
            panic!("expected JSON body");
        };
        assert!(value.get("custom_name").is_none());
    }
}
