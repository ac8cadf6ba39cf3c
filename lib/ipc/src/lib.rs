//! The request/response boundary between the webview and the native host.
//!
//! Every privileged operation the UI surface performs is a [`Message`]
//! carrying a command name, [`Params`] and an optional binary body. The
//! [`RemoteBoundary`] assigns each message a sequence number and correlates
//! the host's [`Reply`] back to the caller, while a [`Router`] on the host
//! side dispatches messages to registered command handlers.

mod boundary;
mod buffers;
mod client;
mod config;
mod error;
mod message;
mod router;

pub use crate::boundary::{Boundary, RequestOptions, Response, ResponseType};
pub use crate::buffers::BufferStore;
pub use crate::client::{BoundaryDriver, RemoteBoundary};
pub use crate::config::{BoundaryConfig, ERROR, OK, TIMEOUT};
pub use crate::error::{HostError, IpcError};
pub use crate::message::{Message, Params, Payload, Reply, Seq};
pub use crate::router::{CommandHandler, Router, connect};

pub type Result<T, E = IpcError> = std::result::Result<T, E>;
