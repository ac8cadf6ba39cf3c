//! Handles supplied by the embedding platform instead of the host.
//!
//! A handle backed by one of these never round-trips for open, close or
//! reads; it is a read-only view, so mutating operations fail with
//! [`FsError::ReadOnly`](crate::FsError::ReadOnly).

use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use bytes::Bytes;

use crate::dir::DirEntry;

/// How a handle reaches its resource.
#[derive(Debug)]
pub enum Backing<T: ?Sized> {
    /// Through host round-trips keyed by the handle id.
    Remote,
    /// Through a platform handle the caller passed in.
    Native(Arc<T>),
}

impl<T: ?Sized> Clone for Backing<T> {
    fn clone(&self) -> Self {
        match self {
            Backing::Remote => Backing::Remote,
            Backing::Native(inner) => Backing::Native(inner.clone()),
        }
    }
}

impl<T: ?Sized> Backing<T> {
    pub fn is_native(&self) -> bool {
        matches!(self, Backing::Native(_))
    }
}

#[async_trait::async_trait]
pub trait PlatformFile: Debug + Send + Sync {
    async fn size(&self) -> io::Result<u64>;

    /// Reads up to `len` bytes at `position`; a short result means EOF.
    async fn read_at(&self, position: u64, len: usize) -> io::Result<Bytes>;
}

#[async_trait::async_trait]
pub trait PlatformDirectory: Debug + Send + Sync {
    async fn entries(&self) -> io::Result<Vec<DirEntry>>;
}

/// A platform file held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    data: Bytes,
}

impl MemoryFile {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait::async_trait]
impl PlatformFile for MemoryFile {
    async fn size(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    async fn read_at(&self, position: u64, len: usize) -> io::Result<Bytes> {
        let start = (position as usize).min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        Ok(self.data.slice(start..end))
    }
}

/// A platform directory listing held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    entries: Vec<DirEntry>,
}

impl MemoryDirectory {
    pub fn new(entries: Vec<DirEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait::async_trait]
impl PlatformDirectory for MemoryDirectory {
    async fn entries(&self) -> io::Result<Vec<DirEntry>> {
        Ok(self.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_file_reads_are_clamped() {
        let file = MemoryFile::new(&b"hello"[..]);
        assert_eq!(file.size().await.unwrap(), 5);
        assert_eq!(file.read_at(1, 3).await.unwrap(), "ell");
        assert_eq!(file.read_at(3, 10).await.unwrap(), "lo");
        assert!(file.read_at(9, 1).await.unwrap().is_empty());
    }
}
