use std::collections::VecDeque;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use webview_ipc::{Params, Payload, RequestOptions};

use crate::context::FsContext;
use crate::error::FsError;
use crate::finalizer::Registration;
use crate::id::{Descriptor, HandleId};
use crate::lifecycle::{HandleCore, HandleEvent, HandleState};
use crate::platform::{Backing, PlatformDirectory};
use crate::table::Kind;

/// Upper bound of the entries buffered per read.
pub const MAX_BUFFER_SIZE: usize = 256;
pub const MAX_ENTRIES: usize = MAX_BUFFER_SIZE;
/// Entries read per call when the caller does not ask for a count.
pub const DEFAULT_BUFFER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
    Symlink,
    #[serde(other)]
    Unknown,
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryType,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, kind: EntryType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryType::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryType::Directory
    }
}

/// A directory opened on the native host.
///
/// Directory descriptors are never exposed, so the bound descriptor is
/// always the id itself.
#[derive(Debug, Clone)]
pub struct DirectoryHandle {
    core: Arc<HandleCore>,
    backing: Backing<dyn PlatformDirectory>,
    buffer_size: usize,
    listing: Arc<Mutex<Option<VecDeque<DirEntry>>>>,
    _registration: Arc<Registration>,
}

impl DirectoryHandle {
    /// A handle for `path`, not yet opened. `buffer_size` is the default
    /// number of entries per [`read`](Self::read), capped at
    /// [`MAX_BUFFER_SIZE`].
    pub fn new(ctx: &FsContext, path: impl Into<String>, buffer_size: Option<usize>) -> Self {
        Self::build(
            ctx,
            HandleId::random(),
            Backing::Remote,
            Some(path.into()),
            buffer_size,
            None,
        )
    }

    pub fn from_platform(ctx: &FsContext, dir: Arc<dyn PlatformDirectory>) -> Self {
        Self::build(ctx, HandleId::random(), Backing::Native(dir), None, None, None)
    }

    /// Another handle object for a directory id that is already open.
    pub fn from_id(ctx: &FsContext, id: HandleId) -> Result<Self, FsError> {
        if ctx.table().get(id) != Some(Descriptor::Id(id)) {
            return Err(FsError::NotFound);
        }
        Ok(Self::build(
            ctx,
            id,
            Backing::Remote,
            None,
            None,
            Some(Descriptor::Id(id)),
        ))
    }

    pub async fn open_path(
        ctx: &FsContext,
        path: impl Into<String>,
        options: RequestOptions,
    ) -> Result<Self, FsError> {
        let handle = Self::new(ctx, path, None);
        handle.open(options).await?;
        Ok(handle)
    }

    fn build(
        ctx: &FsContext,
        id: HandleId,
        backing: Backing<dyn PlatformDirectory>,
        path: Option<String>,
        buffer_size: Option<usize>,
        fd: Option<Descriptor>,
    ) -> Self {
        let (core, registration) =
            HandleCore::attach(ctx, id, Kind::Directory, !backing.is_native(), path, fd);
        let buffer_size = buffer_size
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BUFFER_SIZE)
            .min(MAX_BUFFER_SIZE);
        Self {
            core,
            backing,
            buffer_size,
            listing: Default::default(),
            _registration: registration,
        }
    }

    pub fn id(&self) -> HandleId {
        self.core.id
    }

    pub fn fd(&self) -> Descriptor {
        Descriptor::Id(self.core.id)
    }

    pub fn path(&self) -> Option<&str> {
        self.core.path.as_deref()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn state(&self) -> HandleState {
        self.core.state()
    }

    pub fn is_opened(&self) -> bool {
        self.core.is_opened()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == HandleState::Closed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HandleEvent> {
        self.core.subscribe()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %self.core.id), err)]
    pub async fn open(&self, options: RequestOptions) -> Result<bool, FsError> {
        let round_trip = || -> BoxFuture<'static, Result<Descriptor, FsError>> {
            let id = self.core.id;
            if self.backing.is_native() {
                return future::ready(Ok(Descriptor::Id(id))).boxed();
            }

            let mut params = Params::new().set("id", id);
            if let Some(path) = self.path() {
                params.insert("path", path);
            }
            let boundary = self.core.ctx.boundary().clone();
            let options = options.clone();
            async move {
                boundary
                    .request("fs.opendir", params, options)
                    .await
                    .into_result()?;
                Ok(Descriptor::Id(id))
            }
            .boxed()
        };
        self.core.open(&options, round_trip).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %self.core.id), err)]
    pub async fn close(&self, options: RequestOptions) -> Result<bool, FsError> {
        let round_trip = || -> Option<BoxFuture<'static, Result<(), FsError>>> {
            if self.backing.is_native() {
                return None;
            }
            let boundary = self.core.ctx.boundary().clone();
            let params = Params::new().set("id", self.core.id);
            let options = options.clone();
            Some(
                async move {
                    boundary
                        .request("fs.closedir", params, options)
                        .await
                        .into_result()?;
                    Ok(())
                }
                .boxed(),
            )
        };
        self.core.close(&options, round_trip).await
    }

    /// Reads the next batch of at most `entries` entries (default: the
    /// buffer size), clamped to `1..=MAX_ENTRIES`. A short or empty batch
    /// means the listing is exhausted.
    pub async fn read(
        &self,
        entries: Option<usize>,
        options: RequestOptions,
    ) -> Result<Vec<DirEntry>, FsError> {
        self.core.ensure_opened()?;
        if options.is_aborted() {
            return Err(FsError::Aborted);
        }

        let count = entries.unwrap_or(self.buffer_size).clamp(1, MAX_ENTRIES);

        if let Backing::Native(dir) = &self.backing {
            let loaded = self.listing.lock().is_some();
            if !loaded {
                let all = dir.entries().await?;
                self.listing.lock().get_or_insert_with(|| all.into());
            }
            let mut listing = self.listing.lock();
            let batch = match listing.as_mut() {
                Some(listing) => {
                    let n = count.min(listing.len());
                    listing.drain(..n).collect()
                }
                None => Vec::new(),
            };
            return Ok(batch);
        }

        let params = Params::new().set("id", self.core.id).set("entries", count);
        let payload = self
            .core
            .ctx
            .boundary()
            .request("fs.readdir", params, options)
            .await
            .into_result()?;

        let raw: Vec<DirEntry> = match payload {
            payload if payload.is_empty() => Vec::new(),
            Payload::Json(value) => serde_json::from_value(value).map_err(|e| {
                FsError::InvalidResponseType(format!("malformed 'fs.readdir' entries: {e}"))
            })?,
            Payload::Binary(_) => {
                return Err(FsError::InvalidResponseType(
                    "'fs.readdir' answered with a buffer".to_string(),
                ));
            }
        };

        raw.into_iter()
            .map(|entry| {
                let name = urlencoding::decode(&entry.name)
                    .map_err(|e| FsError::InvalidResponseType(format!("bad entry name: {e}")))?
                    .into_owned();
                Ok(DirEntry::new(name, entry.kind))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_types_deserialize() {
        let entries: Vec<DirEntry> = serde_json::from_value(json!([
            { "name": "a", "type": "file" },
            { "name": "b", "type": "directory" },
            { "name": "c", "type": "socket" },
        ]))
        .unwrap();
        assert!(entries[0].is_file());
        assert!(entries[1].is_directory());
        assert_eq!(entries[2].kind, EntryType::Unknown);
    }
}
