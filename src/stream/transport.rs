//! Cancelable streaming transport.
//!
//! The [`StreamTransport`] trait decouples the orchestrator from HTTP so the
//! read loop can be driven by any byte source. [`HttpTransport`] is the
//! production implementation: one `POST` per phase with a streaming-accept
//! header and a JSON body, returning the response body as a chunk stream.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::{AppError, Result};

/// Raw response body as an ordered stream of chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Streaming content type requested from the server.
pub const EVENT_STREAM: &str = "text/event-stream";

/// Which streaming endpoint to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointKind {
    /// Phase 1: idea submission.
    SubmitIdea,
    /// Phase 2: answer submission for an existing session.
    SubmitAnswers {
        /// Session id obtained from phase 1.
        session_id: String,
    },
}

/// One request to open a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// Target endpoint.
    pub endpoint: EndpointKind,
    /// JSON body.
    pub payload: Value,
}

/// An open stream whose status line and headers have been accepted.
pub struct OpenedStream {
    /// Session id from the response header, when the server sent one.
    pub session_id: Option<String>,
    /// Body chunks.
    pub body: ByteStream,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Source of the bearer credential attached to each request.
pub trait CredentialProvider: Send + Sync {
    /// Current token, or `None` to send the request unauthenticated.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token, typically loaded once from config.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    /// Wrap an optional token.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Opens byte streams for the two pipeline endpoints.
pub trait StreamTransport: Send + Sync {
    /// Send `request` and wait for the response headers.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] on connection failure or a
    /// non-success status, carrying the server-supplied message.
    fn open(
        &self,
        request: StreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<OpenedStream>> + Send + '_>>;
}

/// Cancellation handle for one stream.
///
/// Cancelling is silent: the read loop stops at its next suspension point
/// and reports [`ReadOutcome::Cancelled`](crate::stream::reader::ReadOutcome::Cancelled)
/// instead of an error.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    run_id: String,
    cancel: CancellationToken,
}

impl TransportHandle {
    /// A fresh handle with a random run id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
        }
    }

    /// Request cancellation; idempotent.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(run_id = %self.run_id, "transport cancelled");
        }
        self.cancel.cancel();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by the read loop.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Correlation id for logs.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Default for TransportHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// `reqwest`-backed [`StreamTransport`].
pub struct HttpTransport {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpTransport {
    /// Build a transport for `config`.
    ///
    /// No overall request timeout is set: a healthy run streams for minutes.
    /// Stalls are handled by the read loop's idle timeout instead.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the HTTP client cannot be built.
    pub fn new(config: Arc<ClientConfig>, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.stream.connect_timeout())
            .build()
            .map_err(|err| AppError::Transport(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    fn url_for(&self, endpoint: &EndpointKind) -> String {
        match endpoint {
            EndpointKind::SubmitIdea => self.config.generate_url(),
            EndpointKind::SubmitAnswers { session_id } => self.config.answers_url(session_id),
        }
    }

    async fn open_inner(&self, request: StreamRequest) -> Result<OpenedStream> {
        let url = self.url_for(&request.endpoint);
        info!(%url, "opening event stream");

        let mut builder = self
            .client
            .post(&url)
            .header(ACCEPT, EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache")
            .json(&request.payload);
        if let Some(token) = self.credentials.bearer_token() {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| AppError::Transport(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Transport(server_message(status.as_u16(), &body)));
        }

        let session_id = response
            .headers()
            .get(self.config.session_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .filter(|value| !value.is_empty());

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| AppError::Transport(format!("stream read failed: {err}"))))
            .boxed();

        Ok(OpenedStream { session_id, body })
    }
}

impl StreamTransport for HttpTransport {
    fn open(
        &self,
        request: StreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<OpenedStream>> + Send + '_>> {
        Box::pin(self.open_inner(request))
    }
}

/// Extract the most useful message from an error response body.
///
/// Prefers a JSON `detail`, `message` or `error` string; falls back to the
/// raw body, then to the bare status code.
#[must_use]
pub fn server_message(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        ["detail", "message", "error"]
            .iter()
            .find_map(|key| json.get(*key).and_then(Value::as_str).map(str::to_owned))
    });

    match detail {
        Some(detail) => format!("server returned {status}: {detail}"),
        None if !body.trim().is_empty() => format!("server returned {status}: {}", body.trim()),
        None => format!("server returned {status}"),
    }
}
