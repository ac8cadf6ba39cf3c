use std::mem;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use parking_lot::Mutex;

use crate::error::SchemeError;
use crate::pipe::{PipeReader, PipeWriter, pipe};
use crate::semaphore::Semaphore;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug)]
struct ResponseState {
    status: StatusCode,
    status_text: String,
    headers: HeaderMap,
    mime_type: String,
    chunks: Vec<Bytes>,
    finished: bool,
    handed_off: bool,
}

#[derive(Debug)]
struct Exchange {
    state: Mutex<ResponseState>,
    finished: Semaphore,
    pipe_capacity: usize,
}

/// The response application logic fills in for one resource load.
///
/// Clones share the same response. Nothing reaches the loader until
/// [`finish`](Self::finish) is called, and a response that is never
/// finished blocks its loading thread forever.
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    exchange: Arc<Exchange>,
}

impl ResourceResponse {
    pub fn new(pipe_capacity: usize) -> Self {
        Self {
            exchange: Arc::new(Exchange {
                state: Mutex::new(ResponseState {
                    status: StatusCode::OK,
                    status_text: "OK".to_string(),
                    headers: HeaderMap::new(),
                    mime_type: DEFAULT_MIME_TYPE.to_string(),
                    chunks: Vec::new(),
                    finished: false,
                    handed_off: false,
                }),
                finished: Semaphore::new(0),
                pipe_capacity,
            }),
        }
    }

    pub fn set_status(&self, code: u16, text: impl Into<String>) -> Result<(), SchemeError> {
        let status = StatusCode::from_u16(code).map_err(|_| SchemeError::InvalidStatus(code))?;
        let mut state = self.exchange.state.lock();
        state.status = status;
        state.status_text = text.into();
        Ok(())
    }

    /// Sets a response header, replacing earlier values of the same name.
    ///
    /// `content-type` sets the mime type instead, and `content-length` is
    /// dropped since the body is streamed.
    pub fn set_header(&self, name: &str, value: &str) -> Result<(), SchemeError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| SchemeError::InvalidHeader(name.to_string()))?;
        let mut state = self.exchange.state.lock();
        if name == CONTENT_TYPE {
            state.mime_type = value.to_string();
        } else if name != CONTENT_LENGTH {
            let value = HeaderValue::from_str(value)
                .map_err(|_| SchemeError::InvalidHeader(name.to_string()))?;
            state.headers.insert(name, value);
        }
        Ok(())
    }

    /// Buffers a body chunk.
    pub fn write(&self, chunk: impl Into<Bytes>) {
        let mut state = self.exchange.state.lock();
        if state.finished {
            tracing::trace!("ignoring write after finish");
            return;
        }
        state.chunks.push(chunk.into());
    }

    pub fn write_str(&self, s: &str) {
        self.write(Bytes::copy_from_slice(s.as_bytes()));
    }

    /// Marks the response complete and wakes the loading thread. Later calls
    /// do nothing.
    pub fn finish(&self) {
        let mut state = self.exchange.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        drop(state);
        self.exchange.finished.release();
    }

    pub fn is_finished(&self) -> bool {
        self.exchange.state.lock().finished
    }

    /// Blocks until the response is finished, then returns its descriptor
    /// with the body streaming in from a writer thread.
    ///
    /// The wake is passed on to any other thread waiting on the same
    /// response; only the first one receives the descriptor.
    pub fn wait_for_finish(&self) -> Option<ResponseDescriptor> {
        self.exchange.finished.acquire();
        self.exchange.finished.release();

        let mut state = self.exchange.state.lock();
        if !state.finished || state.handed_off {
            return None;
        }
        state.handed_off = true;

        let (writer, reader) = pipe(self.exchange.pipe_capacity);
        let chunks = mem::take(&mut state.chunks);
        let descriptor = ResponseDescriptor {
            status: state.status,
            status_text: state.status_text.clone(),
            headers: state.headers.clone(),
            mime_type: state.mime_type.clone(),
            body: reader,
        };
        drop(state);

        stream_body(chunks, writer);
        Some(descriptor)
    }
}

/// Pushes the buffered chunks into the pipe on a dedicated thread. The
/// status and headers are already committed, so failures only cut the body
/// short.
fn stream_body(chunks: Vec<Bytes>, writer: PipeWriter) {
    let spawned = thread::Builder::new()
        .name("scheme-body".to_string())
        .spawn(move || {
            for chunk in chunks {
                if let Err(err) = writer.send(chunk) {
                    tracing::debug!(error = %err, "response body truncated");
                    return;
                }
            }
            tracing::trace!("response body complete");
        });
    if let Err(err) = spawned {
        tracing::debug!(error = %err, "failed to spawn the response body writer");
    }
}

/// What the loader hands back to the UI toolkit.
#[derive(Debug)]
pub struct ResponseDescriptor {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub mime_type: String,
    pub body: PipeReader,
}

impl ResponseDescriptor {
    /// Converts into an [`http::Response`], with the mime type as the
    /// `content-type` header.
    pub fn into_http(self) -> http::Response<PipeReader> {
        let mut res = http::Response::new(self.body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        match HeaderValue::from_str(&self.mime_type) {
            Ok(mime) => {
                res.headers_mut().insert(CONTENT_TYPE, mime);
            }
            Err(_) => tracing::debug!(mime = %self.mime_type, "invalid mime type"),
        }
        res
    }
}
