use std::fmt::Debug;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, header::CONTENT_TYPE};
use tokio_util::sync::CancellationToken;

use crate::error::IpcError;
use crate::message::{Params, Payload, Reply};

/// How the caller expects the reply body to be shaped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    #[default]
    Json,
    ArrayBuffer,
}

/// Per-request knobs.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub signal: Option<CancellationToken>,
    pub timeout: Option<Duration>,
    pub response_type: ResponseType,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(|s| s.is_cancelled())
    }
}

/// Outcome of a round-trip as handed back to the caller.
#[derive(Debug, Clone)]
pub struct Response {
    pub result: Result<Payload, IpcError>,
    pub headers: HeaderMap,
}

impl Response {
    pub fn ok(payload: impl Into<Payload>) -> Self {
        Self {
            result: Ok(payload.into()),
            headers: HeaderMap::new(),
        }
    }

    pub fn err(err: impl Into<IpcError>) -> Self {
        Self {
            result: Err(err.into()),
            headers: HeaderMap::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn into_result(self) -> Result<Payload, IpcError> {
        self.result
    }
}

impl From<Reply> for Response {
    fn from(reply: Reply) -> Self {
        Self {
            result: reply.result.map_err(IpcError::from),
            headers: reply.headers,
        }
    }
}

/// The request primitive handles call into.
///
/// Implementations correlate each call with exactly one reply; both
/// methods must be safe to call concurrently.
#[async_trait::async_trait]
pub trait Boundary: Debug + Send + Sync {
    async fn request(&self, command: &str, params: Params, options: RequestOptions) -> Response;

    /// Like [`Boundary::request`] with a raw binary body attached.
    async fn write(
        &self,
        command: &str,
        params: Params,
        bytes: Bytes,
        options: RequestOptions,
    ) -> Response;
}
