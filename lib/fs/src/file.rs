use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use futures::future::{self, BoxFuture};
use futures::{FutureExt, Stream, TryStreamExt};
use tokio::sync::{broadcast, mpsc};
use webview_ipc::{Params, Payload, RequestOptions, ResponseType};

use crate::context::FsContext;
use crate::error::FsError;
use crate::finalizer::Registration;
use crate::flags::{DEFAULT_OPEN_MODE, F_OK, HIGH_WATER_MARK, OpenFlags};
use crate::id::{Descriptor, HandleId};
use crate::lifecycle::{HandleCore, HandleEvent, HandleState};
use crate::platform::{Backing, PlatformFile};
use crate::stats::Stats;
use crate::table::Kind;

const OCTET_STREAM: &str = "application/octet-stream";

/// Where a read or write starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// The cursor the host keeps for the descriptor.
    Current,
    At(u64),
}

impl Position {
    /// `-1` means the current cursor.
    pub fn from_i64(position: i64) -> Result<Self, FsError> {
        match position {
            -1 => Ok(Position::Current),
            p if p >= 0 => Ok(Position::At(p as u64)),
            p => Err(FsError::InvalidArgument(format!("invalid position: {p}"))),
        }
    }

    fn as_param(self) -> i64 {
        match self {
            Position::Current => -1,
            Position::At(p) => p as i64,
        }
    }
}

impl From<u64> for Position {
    fn from(position: u64) -> Self {
        Position::At(position)
    }
}

/// A file opened on the native host, addressed by a random [`HandleId`].
///
/// Clones refer to the same handle. When the last clone of a handle that
/// was never closed is dropped, the descriptor is closed in the background
/// by the context's [`ReclaimerDriver`](crate::ReclaimerDriver).
#[derive(Debug, Clone)]
pub struct FileHandle {
    core: Arc<HandleCore>,
    backing: Backing<dyn PlatformFile>,
    flags: OpenFlags,
    mode: u32,
    cursor: Arc<AtomicU64>,
    _registration: Arc<Registration>,
}

impl FileHandle {
    /// A handle for `path`, not yet opened.
    pub fn new(ctx: &FsContext, path: impl Into<String>, flags: OpenFlags, mode: u32) -> Self {
        Self::build(
            ctx,
            HandleId::random(),
            Backing::Remote,
            Some(path.into()),
            flags,
            mode,
            None,
        )
    }

    /// A read-only handle over a platform file; opening it never round-trips.
    pub fn from_platform(ctx: &FsContext, file: Arc<dyn PlatformFile>) -> Self {
        Self::build(
            ctx,
            HandleId::random(),
            Backing::Native(file),
            None,
            OpenFlags::RDONLY,
            DEFAULT_OPEN_MODE,
            None,
        )
    }

    /// Another handle object for an id that is already open.
    ///
    /// The value may also be a descriptor the host returned for some id.
    pub fn from_id(ctx: &FsContext, id: HandleId) -> Result<Self, FsError> {
        let table = ctx.table();
        let id = match table.entry(id) {
            Some(_) => id,
            None => table
                .id(Descriptor::Fd(id.as_u64()))
                .ok_or(FsError::NotFound)?,
        };
        match table.entry(id) {
            Some(entry) if entry.kind == Kind::File => Ok(Self::build(
                ctx,
                id,
                Backing::Remote,
                None,
                OpenFlags::default(),
                DEFAULT_OPEN_MODE,
                Some(entry.descriptor),
            )),
            _ => Err(FsError::NotFound),
        }
    }

    /// Looks up the handle bound to a host descriptor.
    pub fn from_fd(ctx: &FsContext, fd: u64) -> Result<Self, FsError> {
        let id = ctx.table().id(Descriptor::Fd(fd)).ok_or(FsError::NotFound)?;
        Self::from_id(ctx, id)
    }

    /// Creates a handle for `path` and opens it.
    pub async fn open_path(
        ctx: &FsContext,
        path: impl Into<String>,
        flags: OpenFlags,
        mode: u32,
        options: RequestOptions,
    ) -> Result<Self, FsError> {
        let handle = Self::new(ctx, path, flags, mode);
        handle.open(options).await?;
        Ok(handle)
    }

    /// Checks whether `path` is accessible for `mode`.
    pub async fn access(
        ctx: &FsContext,
        path: &str,
        mode: u32,
        options: RequestOptions,
    ) -> Result<bool, FsError> {
        let params = Params::new().set("path", path).set("mode", mode);
        let payload = ctx
            .boundary()
            .request("fs.access", params, options)
            .await
            .into_result()?;
        if mode == F_OK {
            return Ok(true);
        }
        let granted = payload
            .field_str("mode")
            .and_then(|m| m.parse::<u32>().ok())
            .unwrap_or_default();
        Ok(granted & mode != 0)
    }

    fn build(
        ctx: &FsContext,
        id: HandleId,
        backing: Backing<dyn PlatformFile>,
        path: Option<String>,
        flags: OpenFlags,
        mode: u32,
        fd: Option<Descriptor>,
    ) -> Self {
        let (core, registration) =
            HandleCore::attach(ctx, id, Kind::File, !backing.is_native(), path, fd);
        Self {
            core,
            backing,
            flags,
            mode,
            cursor: Default::default(),
            _registration: registration,
        }
    }

    pub fn id(&self) -> HandleId {
        self.core.id
    }

    /// The descriptor bound while the handle is open.
    pub fn fd(&self) -> Option<Descriptor> {
        self.core.fd()
    }

    pub fn path(&self) -> Option<&str> {
        self.core.path.as_deref()
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn state(&self) -> HandleState {
        self.core.state()
    }

    pub fn is_opened(&self) -> bool {
        self.core.is_opened()
    }

    pub fn is_opening(&self) -> bool {
        self.state() == HandleState::Opening
    }

    pub fn is_closing(&self) -> bool {
        self.state() == HandleState::Closing
    }

    pub fn is_closed(&self) -> bool {
        self.state() == HandleState::Closed
    }

    pub fn is_native(&self) -> bool {
        self.backing.is_native()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HandleEvent> {
        self.core.subscribe()
    }

    /// Opens the descriptor. Concurrent calls share a single round-trip;
    /// calling it on an open handle is a no-op.
    #[tracing::instrument(level = "debug", skip_all, fields(id = %self.core.id), err)]
    pub async fn open(&self, options: RequestOptions) -> Result<bool, FsError> {
        let round_trip = || -> BoxFuture<'static, Result<Descriptor, FsError>> {
            let id = self.core.id;
            if self.backing.is_native() {
                return future::ready(Ok(Descriptor::Id(id))).boxed();
            }

            let mut params = Params::new()
                .set("id", id)
                .set("flags", self.flags.bits())
                .set("mode", self.mode);
            if let Some(path) = self.path() {
                params.insert("path", path);
            }
            let boundary = self.core.ctx.boundary().clone();
            let options = options.clone();
            async move {
                let payload = boundary
                    .request("fs.open", params, options)
                    .await
                    .into_result()?;
                // hosts without distinct descriptors alias the id
                let descriptor = match payload.field_str("fd").and_then(|fd| fd.parse().ok()) {
                    Some(fd) => Descriptor::Fd(fd),
                    None => Descriptor::Id(id),
                };
                Ok(descriptor)
            }
            .boxed()
        };
        self.core.open(&options, round_trip).await
    }

    /// Closes the descriptor, waiting for an in-flight open first.
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
                        .request("fs.close", params, options)
                        .await
                        .into_result()?;
                    Ok(())
                }
                .boxed(),
            )
        };
        self.core.close(&options, round_trip).await
    }

    /// Reads up to `length` bytes (default: the rest of `buffer`) from
    /// `position` into `buffer[offset..]`, returning how many were read.
    pub async fn read(
        &self,
        buffer: &mut [u8],
        offset: usize,
        length: Option<usize>,
        position: Position,
        options: RequestOptions,
    ) -> Result<usize, FsError> {
        if offset > buffer.len() {
            return Err(FsError::Range(format!(
                "offset {offset} is larger than buffer length {}",
                buffer.len()
            )));
        }
        let length = length.unwrap_or(buffer.len() - offset);
        if offset
            .checked_add(length)
            .is_none_or(|end| end > buffer.len())
        {
            return Err(FsError::Range(
                "offset + length cannot be larger than buffer length".to_string(),
            ));
        }

        self.core.ensure_opened()?;
        if options.is_aborted() {
            return Err(FsError::Aborted);
        }

        let bytes_read = match &self.backing {
            Backing::Native(file) => {
                let start = match position {
                    Position::At(p) => p,
                    Position::Current => self.cursor.load(Ordering::SeqCst),
                };
                let data = file.read_at(start, length).await?;
                let n = data.len().min(length);
                buffer[offset..offset + n].copy_from_slice(&data[..n]);
                if position == Position::Current {
                    self.cursor.fetch_add(n as u64, Ordering::SeqCst);
                }
                n
            }
            Backing::Remote => {
                let params = Params::new()
                    .set("id", self.core.id)
                    .set("size", length)
                    .set("offset", position.as_param());
                let res = self
                    .core
                    .ctx
                    .boundary()
                    .request(
                        "fs.read",
                        params,
                        options.with_response_type(ResponseType::ArrayBuffer),
                    )
                    .await;
                let content_type = res.content_type().map(str::to_owned);
                let payload = res.into_result()?;

                if let Some(content_type) = content_type {
                    if content_type != OCTET_STREAM {
                        return Err(FsError::InvalidResponseType(format!(
                            "content type from 'fs.read' is {content_type}"
                        )));
                    }
                }

                match payload {
                    Payload::Binary(data) => {
                        let n = data.len().min(length);
                        buffer[offset..offset + n].copy_from_slice(&data[..n]);
                        n
                    }
                    // some hosts answer an empty read with an empty object
                    payload if payload.is_empty() => 0,
                    Payload::Json(_) => {
                        return Err(FsError::InvalidResponseType(
                            "'fs.read' did not answer with a buffer".to_string(),
                        ));
                    }
                }
            }
        };

        tracing::trace!(id = %self.core.id, bytes_read, "read");
        Ok(bytes_read)
    }

    /// Writes `buffer[offset..offset + length]` at `position`, returning the
    /// byte count the host reports.
    pub async fn write(
        &self,
        buffer: &[u8],
        offset: usize,
        length: Option<usize>,
        position: Position,
        options: RequestOptions,
    ) -> Result<usize, FsError> {
        if self.backing.is_native() {
            return Err(FsError::ReadOnly);
        }

        let len = buffer.len();
        if offset > len {
            return Err(FsError::Range(
                "offset cannot be larger than buffer length".to_string(),
            ));
        }
        let length = length.unwrap_or(len - offset);
        if length > len {
            return Err(FsError::Range(
                "length cannot be larger than buffer length".to_string(),
            ));
        }
        if offset + length > len {
            return Err(FsError::Range(
                "offset + length cannot be larger than buffer length".to_string(),
            ));
        }

        self.core.ensure_opened()?;
        if options.is_aborted() {
            return Err(FsError::Aborted);
        }

        let data = &buffer[offset..offset + length];
        if data.is_empty() {
            return Ok(0);
        }

        let params = Params::new()
            .set("id", self.core.id)
            .set("offset", position.as_param());
        let payload = self
            .core
            .ctx
            .boundary()
            .write("fs.write", params, Bytes::copy_from_slice(data), options)
            .await
            .into_result()?;
        let bytes_written = payload
            .field_str("result")
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or_default();

        tracing::trace!(id = %self.core.id, bytes_written, "write");
        Ok(bytes_written)
    }

    /// Appends at the end of file for handles opened in append mode, and
    /// replaces the file contents otherwise.
    pub async fn append_file(&self, data: &[u8], options: RequestOptions) -> Result<(), FsError> {
        if self.backing.is_native() {
            return Err(FsError::ReadOnly);
        }
        self.core.ensure_opened()?;

        if !self.flags.is_append() {
            return self.write_file(data, options).await;
        }
        self.write(data, 0, None, Position::Current, options)
            .await
            .map(|_| ())
    }

    /// The file contents as a stream of chunks of at most
    /// [`HIGH_WATER_MARK`] bytes, read from the start of the file.
    pub fn read_stream(
        &self,
        options: RequestOptions,
    ) -> impl Stream<Item = Result<Bytes, FsError>> + Send + 'static {
        futures::stream::try_unfold(
            (self.clone(), 0u64, options),
            |(handle, position, options)| async move {
                if options.is_aborted() {
                    return Err(FsError::Aborted);
                }
                let mut buf = vec![0u8; HIGH_WATER_MARK];
                let n = handle
                    .read(&mut buf, 0, None, Position::At(position), options.clone())
                    .await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some((Bytes::from(buf), (handle, position + n as u64, options))))
            },
        )
    }

    #[tracing::instrument(level = "debug", skip_all, fields(id = %self.core.id), err)]
    pub async fn read_file(&self, options: RequestOptions) -> Result<Bytes, FsError> {
        self.core.ensure_opened()?;
        if options.is_aborted() {
            return Err(FsError::Aborted);
        }

        let contents = self
            .read_stream(options)
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(contents.freeze())
    }

    pub async fn read_file_to_string(&self, options: RequestOptions) -> Result<String, FsError> {
        let contents = self.read_file(options).await?;
        Ok(String::from_utf8_lossy(&contents).into_owned())
    }

    /// Writes `data` from the start of the file in [`HIGH_WATER_MARK`]
    /// chunks. The producer waits whenever the writer has a chunk pending.
    #[tracing::instrument(level = "debug", skip_all, fields(id = %self.core.id, len = data.len()), err)]
    pub async fn write_file(&self, data: &[u8], options: RequestOptions) -> Result<(), FsError> {
        if self.backing.is_native() {
            return Err(FsError::ReadOnly);
        }
        self.core.ensure_opened()?;
        if options.is_aborted() {
            return Err(FsError::Aborted);
        }

        let mut data = Bytes::copy_from_slice(data);
        let (tx, mut rx) = mpsc::channel::<Bytes>(1);

        let produce = async move {
            while !data.is_empty() {
                let chunk = data.split_to(HIGH_WATER_MARK.min(data.len()));
                if tx.send(chunk).await.is_err() {
                    // the writer gave up
                    break;
                }
            }
        };

        let consume = async {
            let mut position = 0u64;
            while let Some(chunk) = rx.recv().await {
                if options.is_aborted() {
                    return Err(FsError::Aborted);
                }
                let mut written = 0;
                while written < chunk.len() {
                    let n = self
                        .write(
                            &chunk,
                            written,
                            None,
                            Position::At(position),
                            options.clone(),
                        )
                        .await?;
                    if n == 0 {
                        return Err(io::Error::from(io::ErrorKind::WriteZero).into());
                    }
                    let n = n.min(chunk.len() - written);
                    written += n;
                    position += n as u64;
                }
            }
            Ok(())
        };

        let ((), ret) = futures::join!(produce, consume);
        ret
    }

    pub async fn stat(&self, options: RequestOptions) -> Result<Stats, FsError> {
        self.core.ensure_opened()?;
        if let Backing::Native(file) = &self.backing {
            return Ok(Stats::regular(file.size().await?));
        }
        let payload = self.request("fs.fstat", self.params(), options).await?;
        parse_stats(payload)
    }

    /// Stats of the path itself, without following a final symlink.
    pub async fn lstat(&self, options: RequestOptions) -> Result<Stats, FsError> {
        if self.backing.is_native() {
            return self.stat(options).await;
        }
        self.core.ensure_opened()?;
        let path = self
            .path()
            .ok_or_else(|| FsError::InvalidArgument("handle has no path".to_string()))?;
        let payload = self
            .request("fs.lstat", Params::new().set("path", path), options)
            .await?;
        parse_stats(payload)
    }

    pub async fn sync(&self, options: RequestOptions) -> Result<(), FsError> {
        self.writable_op("fs.fsync", self.params(), options).await
    }

    pub async fn datasync(&self, options: RequestOptions) -> Result<(), FsError> {
        self.writable_op("fs.fdatasync", self.params(), options).await
    }

    pub async fn truncate(&self, len: u64, options: RequestOptions) -> Result<(), FsError> {
        let params = self.params().set("offset", len);
        self.writable_op("fs.ftruncate", params, options).await
    }

    pub async fn chmod(&self, mode: u32, options: RequestOptions) -> Result<(), FsError> {
        let params = self.params().set("mode", mode);
        self.writable_op("fs.fchmod", params, options).await
    }

    pub async fn chown(&self, uid: u32, gid: u32, options: RequestOptions) -> Result<(), FsError> {
        let params = self.params().set("uid", uid).set("gid", gid);
        self.writable_op("fs.fchown", params, options).await
    }

    fn params(&self) -> Params {
        Params::new().set("id", self.core.id)
    }

    async fn writable_op(
        &self,
        command: &str,
        params: Params,
        options: RequestOptions,
    ) -> Result<(), FsError> {
        if self.backing.is_native() {
            return Err(FsError::ReadOnly);
        }
        self.core.ensure_opened()?;
        self.request(command, params, options).await?;
        Ok(())
    }

    async fn request(
        &self,
        command: &str,
        params: Params,
        options: RequestOptions,
    ) -> Result<Payload, FsError> {
        let payload = self
            .core
            .ctx
            .boundary()
            .request(command, params, options)
            .await
            .into_result()?;
        Ok(payload)
    }
}

fn parse_stats(payload: Payload) -> Result<Stats, FsError> {
    match payload {
        Payload::Json(value) => serde_json::from_value(value)
            .map_err(|e| FsError::InvalidResponseType(format!("malformed stats: {e}"))),
        Payload::Binary(_) => Err(FsError::InvalidResponseType(
            "stats must be a JSON object".to_string(),
        )),
    }
}
