//! Serves custom-scheme resource loads from asynchronous application logic.
//!
//! UI toolkits ask for a complete response synchronously, while the logic
//! producing it runs elsewhere. [`SchemeHandlers::handle_request`] blocks the
//! loading thread on a [`Semaphore`] until the handler calls
//! [`ResourceResponse::finish`], then streams the buffered body through a
//! bounded [`pipe`].

mod config;
mod error;
mod handlers;
mod pipe;
mod request;
mod response;
mod semaphore;

pub use crate::config::{BridgeConfig, DEFAULT_SCHEME};
pub use crate::error::SchemeError;
pub use crate::handlers::{AsyncSchemeHandler, SchemeHandler, SchemeHandlers};
pub use crate::pipe::{PipeReader, PipeWriter, pipe};
pub use crate::request::{ResourceRequest, SEQ_HEADER};
pub use crate::response::{DEFAULT_MIME_TYPE, ResourceResponse, ResponseDescriptor};
pub use crate::semaphore::Semaphore;
