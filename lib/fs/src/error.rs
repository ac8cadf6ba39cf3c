use std::io;

use thiserror::Error;
use webview_ipc::{HostError, IpcError};

/// Errors surfaced by file and directory handles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// The handle is closing, closed, still opening or was never opened
    #[error("handle is not opened")]
    NotOpened,
    /// `open` was called while a close is in flight
    #[error("handle is closing")]
    AlreadyClosing,
    /// `open` was called on a handle that has been closed
    #[error("handle is closed")]
    AlreadyClosed,
    /// The abort signal was raised
    #[error("the operation was aborted")]
    Aborted,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An offset, length or position is out of bounds
    #[error("range error: {0}")]
    Range(String),
    /// The host answered with a payload of the wrong shape
    #[error("invalid response: {0}")]
    InvalidResponseType(String),
    /// No descriptor is bound to the given id
    #[error("invalid file descriptor")]
    NotFound,
    /// The operation needs a writable handle but this one is a read-only
    /// view over a platform handle
    #[error("underlying platform handle is not writable")]
    ReadOnly,
    /// The round-trip itself failed
    #[error(transparent)]
    Ipc(IpcError),
}

impl FsError {
    /// Host-reported error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            FsError::Ipc(err) => err.code(),
            _ => None,
        }
    }
}

impl From<IpcError> for FsError {
    fn from(err: IpcError) -> Self {
        match err {
            IpcError::Aborted => FsError::Aborted,
            err => FsError::Ipc(err),
        }
    }
}

impl From<HostError> for FsError {
    fn from(err: HostError) -> Self {
        FsError::Ipc(IpcError::Host(err))
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        HostError::from(err).into()
    }
}
