use std::str::FromStr;

use bitflags::bitflags;

use crate::error::FsError;

pub const F_OK: u32 = 0;
pub const X_OK: u32 = 1;
pub const W_OK: u32 = 2;
pub const R_OK: u32 = 4;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFLNK: u32 = 0o120000;

pub const DEFAULT_OPEN_FLAGS: &str = "r";
pub const DEFAULT_OPEN_MODE: u32 = 0o666;
pub const DEFAULT_ACCESS_MODE: u32 = F_OK;
/// Chunk size of whole-file reads and writes.
pub const HIGH_WATER_MARK: usize = 64 * 1024;

bitflags! {
    /// Open flags, with the Linux bit values the host understands.
    #[derive(Default)]
    pub struct OpenFlags: u32 {
        const RDONLY = 0;
        const WRONLY = 0o1;
        const RDWR = 0o2;
        const CREAT = 0o100;
        const EXCL = 0o200;
        const TRUNC = 0o1000;
        const APPEND = 0o2000;
        const SYNC = 0o4010000;
    }
}

impl OpenFlags {
    pub const DEFAULT: OpenFlags = OpenFlags::RDONLY;

    /// Parses a flag string such as `"r"`, `"wx+"` or `"as"`, or a raw
    /// numeric bit set.
    pub fn parse(flags: &str) -> Result<Self, FsError> {
        if let Ok(bits) = flags.parse::<u32>() {
            return Ok(Self::from_bits_truncate(bits));
        }

        let ret = match flags {
            "r" => Self::RDONLY,
            "rs" | "sr" => Self::RDONLY | Self::SYNC,
            "r+" => Self::RDWR,
            "rs+" | "sr+" => Self::RDWR | Self::SYNC,
            "w" => Self::TRUNC | Self::CREAT | Self::WRONLY,
            "wx" | "xw" => Self::TRUNC | Self::CREAT | Self::WRONLY | Self::EXCL,
            "w+" => Self::TRUNC | Self::CREAT | Self::RDWR,
            "wx+" | "xw+" => Self::TRUNC | Self::CREAT | Self::RDWR | Self::EXCL,
            "a" => Self::APPEND | Self::CREAT | Self::WRONLY,
            "ax" | "xa" => Self::APPEND | Self::CREAT | Self::WRONLY | Self::EXCL,
            "as" | "sa" => Self::APPEND | Self::CREAT | Self::WRONLY | Self::SYNC,
            "a+" => Self::APPEND | Self::CREAT | Self::RDWR,
            "ax+" | "xa+" => Self::APPEND | Self::CREAT | Self::RDWR | Self::EXCL,
            "as+" | "sa+" => Self::APPEND | Self::CREAT | Self::RDWR | Self::SYNC,
            other => {
                return Err(FsError::InvalidArgument(format!(
                    "invalid open flags: {other}"
                )));
            }
        };
        Ok(ret)
    }

    pub fn is_readable(&self) -> bool {
        !self.contains(Self::WRONLY)
    }

    pub fn is_writable(&self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }

    pub fn is_append(&self) -> bool {
        self.contains(Self::APPEND)
    }
}

impl FromStr for OpenFlags {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
