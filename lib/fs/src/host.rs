//! The native side of the `fs.*` commands.

use std::collections::HashMap;
use std::fs::{File, OpenOptions, ReadDir};
use std::future::Future;
use std::io::{self, Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use webview_ipc::{HostError, Message, Payload, Router};

use crate::dir::{DirEntry, EntryType};
use crate::flags::{OpenFlags, W_OK};
use crate::stats::Stats;

#[derive(Debug)]
struct HostFile {
    file: File,
    append: bool,
}

#[derive(Debug, Default)]
struct HostState {
    files: Mutex<HashMap<String, Arc<HostFile>>>,
    dirs: Mutex<HashMap<String, Arc<Mutex<ReadDir>>>>,
}

/// Serves the filesystem commands against the real filesystem, keeping
/// the host's own table of open descriptors keyed by handle id.
#[derive(Debug, Clone, Default)]
pub struct HostFs {
    state: Arc<HostState>,
}

impl HostFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps every `fs.*` command onto `router`.
    pub fn register(&self, router: &Router) {
        self.map(router, "fs.access", HostFs::access);
        self.map(router, "fs.open", HostFs::open);
        self.map(router, "fs.close", HostFs::close);
        self.map(router, "fs.read", HostFs::read);
        self.map(router, "fs.write", HostFs::write);
        self.map(router, "fs.fstat", HostFs::fstat);
        self.map(router, "fs.lstat", HostFs::lstat);
        self.map(router, "fs.fsync", HostFs::fsync);
        self.map(router, "fs.fdatasync", HostFs::fdatasync);
        self.map(router, "fs.ftruncate", HostFs::ftruncate);
        self.map(router, "fs.fchmod", HostFs::fchmod);
        self.map(router, "fs.fchown", HostFs::fchown);
        self.map(router, "fs.opendir", HostFs::opendir);
        self.map(router, "fs.readdir", HostFs::readdir);
        self.map(router, "fs.closedir", HostFs::closedir);
    }

    /// Number of files and directories currently open.
    pub fn open_count(&self) -> usize {
        self.state.files.lock().len() + self.state.dirs.lock().len()
    }

    fn map<F, Fut>(&self, router: &Router, command: &str, f: F)
    where
        F: Fn(HostFs, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload, HostError>> + Send + 'static,
    {
        let fs = self.clone();
        router.map(command, move |msg: Message| f(fs.clone(), msg));
    }

    fn file(&self, id: &str) -> Result<Arc<HostFile>, HostError> {
        self.state
            .files
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(not_open)
    }

    fn dir(&self, id: &str) -> Result<Arc<Mutex<ReadDir>>, HostError> {
        self.state
            .dirs
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(not_open)
    }

    async fn access(self, msg: Message) -> Result<Payload, HostError> {
        let path = param::<String>(&msg, "path")?;
        let mode = param_or::<u32>(&msg, "mode", 0)?;
        blocking(move || {
            let meta = std::fs::metadata(&path)?;
            if mode & W_OK != 0 && meta.permissions().readonly() {
                return Err(HostError::with_code("EACCES", "permission denied"));
            }
            Ok(json!({ "mode": mode }).into())
        })
        .await
    }

    async fn open(self, msg: Message) -> Result<Payload, HostError> {
        let id = param::<String>(&msg, "id")?;
        let path = param::<String>(&msg, "path")?;
        let flags = OpenFlags::from_bits_truncate(param_or::<u32>(&msg, "flags", 0)?);
        let mode = param_or::<u32>(&msg, "mode", 0o666)?;

        let file = blocking(move || {
            let mut options = OpenOptions::new();
            options
                .read(flags.is_readable())
                .write(flags.is_writable())
                .append(flags.is_append())
                .truncate(flags.contains(OpenFlags::TRUNC))
                .create(flags.contains(OpenFlags::CREAT));
            if flags.contains(OpenFlags::CREAT | OpenFlags::EXCL) {
                options.create_new(true);
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(mode);
            }
            #[cfg(not(unix))]
            let _ = mode;
            Ok(options.open(&path)?)
        })
        .await?;

        let mut data = json!({ "id": id });
        if let Some(fd) = raw_fd(&file) {
            data["fd"] = json!(fd);
        }
        tracing::debug!(%id, fd = raw_fd(&file), "opened file");
        self.state.files.lock().insert(
            id,
            Arc::new(HostFile {
                file,
                append: flags.is_append(),
            }),
        );
        Ok(data.into())
    }

    async fn close(self, msg: Message) -> Result<Payload, HostError> {
        let id = param::<String>(&msg, "id")?;
        let file = self.state.files.lock().remove(&id).ok_or_else(not_open)?;
        let fd = raw_fd(&file.file);
        tracing::debug!(%id, fd, "closed file");
        Ok(json!({ "id": id, "fd": fd }).into())
    }

    async fn read(self, msg: Message) -> Result<Payload, HostError> {
        let file = self.file(&param::<String>(&msg, "id")?)?;
        let size = param::<usize>(&msg, "size")?;
        let offset = param_or::<i64>(&msg, "offset", -1)?;

        blocking(move || {
            let mut buf = vec![0u8; size];
            let mut filled = 0;
            while filled < size {
                let n = if offset < 0 {
                    (&file.file).read(&mut buf[filled..])?
                } else {
                    read_at(&file.file, &mut buf[filled..], offset as u64 + filled as u64)?
                };
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);
            Ok(Payload::Binary(Bytes::from(buf)))
        })
        .await
    }

    async fn write(self, msg: Message) -> Result<Payload, HostError> {
        let id = param::<String>(&msg, "id")?;
        let file = self.file(&id)?;
        let offset = param_or::<i64>(&msg, "offset", -1)?;
        let bytes = msg.bytes.unwrap_or_default();

        let written = blocking(move || {
            if offset < 0 || file.append {
                (&file.file).write_all(&bytes)?;
            } else {
                write_all_at(&file.file, &bytes, offset as u64)?;
            }
            Ok(bytes.len())
        })
        .await?;
        Ok(json!({ "id": id, "result": written.to_string() }).into())
    }

    async fn fstat(self, msg: Message) -> Result<Payload, HostError> {
        let file = self.file(&param::<String>(&msg, "id")?)?;
        blocking(move || stats_payload(&file.file.metadata()?)).await
    }

    async fn lstat(self, msg: Message) -> Result<Payload, HostError> {
        let path = param::<String>(&msg, "path")?;
        blocking(move || stats_payload(&std::fs::symlink_metadata(&path)?)).await
    }

    async fn fsync(self, msg: Message) -> Result<Payload, HostError> {
        let file = self.file(&param::<String>(&msg, "id")?)?;
        blocking(move || {
            file.file.sync_all()?;
            Ok(Payload::empty())
        })
        .await
    }

    async fn fdatasync(self, msg: Message) -> Result<Payload, HostError> {
        let file = self.file(&param::<String>(&msg, "id")?)?;
        blocking(move || {
            file.file.sync_data()?;
            Ok(Payload::empty())
        })
        .await
    }

    async fn ftruncate(self, msg: Message) -> Result<Payload, HostError> {
        let file = self.file(&param::<String>(&msg, "id")?)?;
        let len = param_or::<u64>(&msg, "offset", 0)?;
        blocking(move || {
            file.file.set_len(len)?;
            Ok(Payload::empty())
        })
        .await
    }

    async fn fchmod(self, msg: Message) -> Result<Payload, HostError> {
        let file = self.file(&param::<String>(&msg, "id")?)?;
        let mode = param::<u32>(&msg, "mode")?;
        blocking(move || {
            set_mode(&file.file, mode)?;
            Ok(Payload::empty())
        })
        .await
    }

    async fn fchown(self, msg: Message) -> Result<Payload, HostError> {
        let file = self.file(&param::<String>(&msg, "id")?)?;
        let uid = param::<u32>(&msg, "uid")?;
        let gid = param::<u32>(&msg, "gid")?;
        blocking(move || {
            set_owner(&file.file, uid, gid)?;
            Ok(Payload::empty())
        })
        .await
    }

    async fn opendir(self, msg: Message) -> Result<Payload, HostError> {
        let id = param::<String>(&msg, "id")?;
        let path = param::<String>(&msg, "path")?;
        let dir = blocking(move || Ok(std::fs::read_dir(&path)?)).await?;
        self.state
            .dirs
            .lock()
            .insert(id.clone(), Arc::new(Mutex::new(dir)));
        Ok(json!({ "id": id }).into())
    }

    async fn readdir(self, msg: Message) -> Result<Payload, HostError> {
        let dir = self.dir(&param::<String>(&msg, "id")?)?;
        let entries = param_or::<usize>(&msg, "entries", crate::dir::DEFAULT_BUFFER_SIZE)?;

        blocking(move || {
            let mut dir = dir.lock();
            let mut batch = Vec::with_capacity(entries);
            for entry in dir.by_ref().take(entries) {
                let entry = entry?;
                let kind = match entry.file_type() {
                    Ok(t) if t.is_symlink() => EntryType::Symlink,
                    Ok(t) if t.is_dir() => EntryType::Directory,
                    Ok(t) if t.is_file() => EntryType::File,
                    _ => EntryType::Unknown,
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                batch.push(DirEntry::new(urlencoding::encode(&name).into_owned(), kind));
            }
            serde_json::to_value(batch)
                .map(Payload::Json)
                .map_err(|e| HostError::with_code("EIO", e.to_string()))
        })
        .await
    }

    async fn closedir(self, msg: Message) -> Result<Payload, HostError> {
        let id = param::<String>(&msg, "id")?;
        self.state.dirs.lock().remove(&id).ok_or_else(not_open)?;
        Ok(json!({ "id": id }).into())
    }
}

fn not_open() -> HostError {
    HostError::with_code("ENOTOPEN", "No file descriptor found with that id")
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> Result<(), HostError> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> Result<(), HostError> {
    Err(unsupported())
}

#[cfg(unix)]
fn set_owner(file: &File, uid: u32, gid: u32) -> Result<(), HostError> {
    std::os::unix::fs::fchown(file, Some(uid), Some(gid))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner(_file: &File, _uid: u32, _gid: u32) -> Result<(), HostError> {
    Err(unsupported())
}

#[cfg(not(unix))]
fn unsupported() -> HostError {
    HostError::with_code("ENOTSUP", "operation not supported on this platform")
}

fn param<T: FromStr>(msg: &Message, key: &str) -> Result<T, HostError> {
    let value = msg
        .get(key)
        .ok_or_else(|| HostError::with_code("EINVAL", format!("missing parameter: {key}")))?;
    value
        .parse()
        .map_err(|_| HostError::with_code("EINVAL", format!("invalid parameter: {key}")))
}

fn param_or<T: FromStr>(msg: &Message, key: &str, default: T) -> Result<T, HostError> {
    match msg.get(key) {
        Some(_) => param(msg, key),
        None => Ok(default),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, HostError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, HostError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HostError::with_code("EIO", e.to_string()))?
}

fn stats_payload(meta: &std::fs::Metadata) -> Result<Payload, HostError> {
    serde_json::to_value(Stats::from_metadata(meta))
        .map(Payload::Json)
        .map_err(|e| HostError::with_code("EIO", e.to_string()))
}

#[cfg(unix)]
fn raw_fd(file: &File) -> Option<u64> {
    use std::os::unix::io::AsRawFd;
    Some(file.as_raw_fd() as u64)
}

#[cfg(not(unix))]
fn raw_fd(_file: &File) -> Option<u64> {
    None
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(not(unix))]
fn read_at(mut file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::io::{Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(not(unix))]
fn write_all_at(mut file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::io::{Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)
}
