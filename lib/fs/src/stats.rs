use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::flags::{S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

impl From<SystemTime> for Timespec {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                tv_sec: d.as_secs() as i64,
                tv_nsec: d.subsec_nanos() as i64,
            },
            Err(err) => {
                let d = err.duration();
                Self {
                    tv_sec: -(d.as_secs() as i64),
                    tv_nsec: d.subsec_nanos() as i64,
                }
            }
        }
    }
}

/// Status of a file as reported by `fs.fstat` and `fs.lstat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub st_dev: u64,
    pub st_ino: u64,
    pub st_mode: u32,
    pub st_nlink: u64,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_rdev: u64,
    pub st_size: u64,
    pub st_blksize: u64,
    pub st_blocks: u64,
    pub st_atim: Timespec,
    pub st_mtim: Timespec,
    pub st_ctim: Timespec,
    pub st_birthtim: Timespec,
}

impl Stats {
    /// Stats of a regular file known only by its size.
    pub fn regular(size: u64) -> Self {
        Self {
            st_mode: S_IFREG,
            st_size: size,
            ..Default::default()
        }
    }

    pub fn is_file(&self) -> bool {
        self.st_mode & S_IFMT == S_IFREG
    }

    pub fn is_directory(&self) -> bool {
        self.st_mode & S_IFMT == S_IFDIR
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.st_mode & S_IFMT == S_IFLNK
    }

    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            st_dev: meta.dev(),
            st_ino: meta.ino(),
            st_mode: meta.mode(),
            st_nlink: meta.nlink(),
            st_uid: meta.uid(),
            st_gid: meta.gid(),
            st_rdev: meta.rdev(),
            st_size: meta.size(),
            st_blksize: meta.blksize(),
            st_blocks: meta.blocks(),
            st_atim: Timespec {
                tv_sec: meta.atime(),
                tv_nsec: meta.atime_nsec(),
            },
            st_mtim: Timespec {
                tv_sec: meta.mtime(),
                tv_nsec: meta.mtime_nsec(),
            },
            st_ctim: Timespec {
                tv_sec: meta.ctime(),
                tv_nsec: meta.ctime_nsec(),
            },
            st_birthtim: meta.created().map(Timespec::from).unwrap_or_default(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            S_IFLNK
        } else if file_type.is_dir() {
            S_IFDIR
        } else {
            S_IFREG
        };
        let perm = if meta.permissions().readonly() {
            0o444
        } else {
            0o666
        };
        let time = |t: std::io::Result<SystemTime>| t.map(Timespec::from).unwrap_or_default();

        Self {
            st_mode: kind | perm,
            st_nlink: 1,
            st_size: meta.len(),
            st_atim: time(meta.accessed()),
            st_mtim: time(meta.modified()),
            st_ctim: time(meta.modified()),
            st_birthtim: time(meta.created()),
            ..Default::default()
        }
    }
}
