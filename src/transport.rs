//! Backend transport
//!
//! The [`Transport`] trait is the only place the client touches the network.
//! [`HttpTransport`] implements it over `reqwest`; tests substitute scripted
//! implementations to drive the submitter and poller without a server.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::types::{Blob, TaskHandle};

/// Job submission endpoint
pub const UPLOAD_PATH: &str = "/api/upload";
/// Status endpoint prefix; the task id is appended
pub const STATUS_PATH: &str = "/api/status/";
/// Artifact endpoint prefix; the task id is appended
pub const DOWNLOAD_PATH: &str = "/api/download/";
/// Task listing endpoint
pub const TASKS_PATH: &str = "/api/tasks";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Raw backend reply: HTTP status plus the full body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body bytes
    pub body: Vec<u8>,
}

impl WireResponse {
    /// Build a response with a JSON body
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string().into_bytes(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One field of a multipart body
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormPart {
    /// Plain text field
    Text {
        /// Field name
        name: String,
        /// Field value
        value: String,
    },
    /// File field
    File {
        /// Field name
        name: String,
        /// File content and metadata
        blob: Blob,
    },
}

impl FormPart {
    /// Field name of this part
    pub fn name(&self) -> &str {
        match self {
            FormPart::Text { name, .. } | FormPart::File { name, .. } => name,
        }
    }
}

/// Encoded submission body
#[derive(Clone, Debug, PartialEq)]
pub enum SubmissionBody {
    /// multipart/form-data, used when any slot carries binary data
    Multipart(Vec<FormPart>),
    /// application/json, used when every slot is a server-side path
    Json(serde_json::Value),
}

/// Network seam between the client and the backend
///
/// Implementations return `Ok` for any HTTP reply, successful or not; `Err`
/// is reserved for failures where no reply was received. The exception is
/// [`download`](Transport::download), which must not write an error body into
/// the destination and therefore fails on non-success statuses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `POST /api/upload`
    async fn submit(&self, body: SubmissionBody) -> Result<WireResponse>;

    /// `GET /api/status/{task_id}`
    async fn fetch_status(&self, handle: &TaskHandle) -> Result<WireResponse>;

    /// `GET /api/tasks`
    async fn list_tasks(&self) -> Result<WireResponse>;

    /// Stream the artifact at `path` into `writer`, returning bytes written
    async fn download(
        &self,
        path: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64>;
}

/// [`Transport`] over HTTP
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Build a transport from validated configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = config.validate()?;

        let mut headers = HeaderMap::new();
        if let Some(auth) = &config.auth_header {
            let mut value = HeaderValue::from_str(auth)
                .map_err(|_| Error::config("auth_header", "contains invalid header characters"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// The normalized backend root
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn read(response: reqwest::Response) -> Result<WireResponse> {
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(WireResponse { status, body })
    }
}

fn build_form(parts: Vec<FormPart>) -> Result<Form> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name, value),
            FormPart::File { name, blob } => {
                let content_type = blob
                    .content_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
                let file = Part::bytes(blob.bytes)
                    .file_name(blob.file_name)
                    .mime_str(&content_type)?;
                form.part(name, file)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, body: SubmissionBody) -> Result<WireResponse> {
        let url = self.endpoint(UPLOAD_PATH)?;
        let request = match body {
            SubmissionBody::Multipart(parts) => {
                self.client.post(url).multipart(build_form(parts)?)
            }
            SubmissionBody::Json(value) => self.client.post(url).json(&value),
        };
        Self::read(request.send().await?).await
    }

    async fn fetch_status(&self, handle: &TaskHandle) -> Result<WireResponse> {
        let path = format!("{STATUS_PATH}{}", urlencoding::encode(handle.as_str()));
        let url = self.endpoint(&path)?;
        Self::read(self.client.get(url).send().await?).await
    }

    async fn list_tasks(&self) -> Result<WireResponse> {
        let url = self.endpoint(TASKS_PATH)?;
        Self::read(self.client.get(url).send().await?).await
    }

    async fn download(
        &self,
        path: &str,
        writer: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let url = self.endpoint(path)?;
        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::HttpStatus {
                status: response.status().as_u16(),
                endpoint: path.to_string(),
            });
        }

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        tracing::debug!(path, bytes = written, "artifact downloaded");
        Ok(written)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer) -> HttpTransport {
        HttpTransport::new(&ClientConfig::new(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn multipart_submission_carries_file_and_text_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload"))
            .and(header_regex("content-type", "^multipart/form-data"))
            .and(body_string_contains("name=\"original_video\""))
            .and(body_string_contains("filename=\"movie.mp4\""))
            .and(body_string_contains("name=\"mode\""))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"task_id":"t1"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let body = SubmissionBody::Multipart(vec![
            FormPart::File {
                name: "original_video".into(),
                blob: Blob::new("movie.mp4", b"fake video".to_vec()),
            },
            FormPart::Text {
                name: "mode".into(),
                value: "convert".into(),
            },
        ]);
        let response = transport_for(&server).submit(body).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.body, br#"{"task_id":"t1"}"#);
    }

    #[tokio::test]
    async fn non_success_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/status/t1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let handle = TaskHandle::new("t1").unwrap();
        let response = transport_for(&server).fetch_status(&handle).await.unwrap();
        assert_eq!(response.status, 500);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn auth_header_is_sent_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"tasks":[],"total":0}"#))
            .expect(1)
            .mount(&server)
            .await;

        let config = ClientConfig {
            auth_header: Some("Bearer s3cret".into()),
            ..ClientConfig::new(server.uri())
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.list_tasks().await.unwrap().status, 200);
    }

    #[tokio::test]
    async fn download_streams_body_into_writer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let mut sink = Vec::new();
        let written = transport_for(&server)
            .download("/api/download/t1", &mut sink)
            .await
            .unwrap();
        assert_eq!(written, 4096);
        assert_eq!(sink.len(), 4096);
    }

    #[tokio::test]
    async fn download_refuses_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/download/t1"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(r#"{"error":"Archivo no encontrado"}"#),
            )
            .mount(&server)
            .await;

        let mut sink = Vec::new();
        let err = transport_for(&server)
            .download("/api/download/t1", &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn invalid_auth_header_is_a_config_error() {
        let config = ClientConfig {
            auth_header: Some("bad\nvalue".into()),
            ..Default::default()
        };
        assert!(matches!(
            HttpTransport::new(&config).unwrap_err(),
            Error::Config { .. }
        ));
    }

    #[test]
    fn connection_refused_surfaces_as_network_error() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            // Port 9 (discard) is closed on test hosts
            let transport = HttpTransport::new(&ClientConfig::new("http://127.0.0.1:9/")).unwrap();
            let handle = TaskHandle::new("t1").unwrap();
            let err = transport.fetch_status(&handle).await.unwrap_err();
            assert!(matches!(err, Error::Network(_)));
        });
    }
}
