//! File and directory handles for the webview side of the boundary.
//!
//! A [`FileHandle`] or [`DirectoryHandle`] names a resource opened on the
//! native host by a random [`HandleId`]. Successful opens bind that id to a
//! [`Descriptor`] in the [`DescriptorTable`]; every later operation is a
//! round-trip keyed by the id, gated on that binding still being live.
//!
//! ```no_run
//! # async fn run(boundary: std::sync::Arc<dyn webview_ipc::Boundary>) -> Result<(), webview_fs::FsError> {
//! use webview_fs::{DescriptorTable, FileHandle, FsContext, OpenFlags, Position, DEFAULT_OPEN_MODE};
//! use webview_ipc::RequestOptions;
//!
//! let (ctx, reclaimer) = FsContext::new(boundary, DescriptorTable::global());
//! tokio::spawn(reclaimer.run());
//!
//! let handle = FileHandle::open_path(&ctx, "/tmp/a.txt", OpenFlags::parse("w+")?, DEFAULT_OPEN_MODE, RequestOptions::new()).await?;
//! handle.write(b"hi", 0, None, Position::At(0), RequestOptions::new()).await?;
//! handle.close(RequestOptions::new()).await?;
//! # Ok(())
//! # }
//! ```

mod context;
mod dir;
mod error;
mod file;
mod finalizer;
mod flags;
mod host;
mod id;
mod lifecycle;
mod platform;
mod stats;
mod table;

pub use crate::context::FsContext;
pub use crate::dir::{
    DEFAULT_BUFFER_SIZE, DirEntry, DirectoryHandle, EntryType, MAX_BUFFER_SIZE, MAX_ENTRIES,
};
pub use crate::error::FsError;
pub use crate::file::{FileHandle, Position};
pub use crate::finalizer::{Finalize, Reclaimer, ReclaimerDriver};
pub use crate::flags::{
    DEFAULT_ACCESS_MODE, DEFAULT_OPEN_FLAGS, DEFAULT_OPEN_MODE, F_OK, HIGH_WATER_MARK, OpenFlags,
    R_OK, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG, W_OK, X_OK,
};
pub use crate::host::HostFs;
pub use crate::id::{Descriptor, HandleId};
pub use crate::lifecycle::{HandleEvent, HandleState};
pub use crate::platform::{Backing, MemoryDirectory, MemoryFile, PlatformDirectory, PlatformFile};
pub use crate::stats::{Stats, Timespec};
pub use crate::table::{DescriptorTable, Entry, Kind};
