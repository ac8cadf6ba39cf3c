use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error reported by the native host, surfaced verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<io::Error> for HostError {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::NotFound => "ENOENT",
            io::ErrorKind::PermissionDenied => "EACCES",
            io::ErrorKind::AlreadyExists => "EEXIST",
            io::ErrorKind::InvalidInput => "EINVAL",
            io::ErrorKind::Unsupported => "ENOTSUP",
            io::ErrorKind::NotADirectory => "ENOTDIR",
            io::ErrorKind::IsADirectory => "EISDIR",
            io::ErrorKind::DirectoryNotEmpty => "ENOTEMPTY",
            _ => "EIO",
        };
        HostError::with_code(code, err.to_string())
    }
}

/// Failure of a round-trip, as seen by the requesting side.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IpcError {
    /// The host answered with an error
    #[error(transparent)]
    Host(#[from] HostError),
    /// No reply arrived within the request timeout
    #[error("request timed out")]
    Timeout,
    /// The abort signal was raised before or while waiting
    #[error("the operation was aborted")]
    Aborted,
    /// The channel to the host went away before a reply arrived
    #[error("connection aborted")]
    ConnectionAborted,
}

impl IpcError {
    /// Host-reported error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            IpcError::Host(e) => e.code(),
            _ => None,
        }
    }
}
