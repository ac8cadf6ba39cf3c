use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque 64-bit key naming a handle on both sides of the boundary.
///
/// Crosses the boundary in its decimal string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(u64);

impl HandleId {
    pub fn random() -> Self {
        // zero never names a handle
        Self(rand::random::<u64>().max(1))
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for HandleId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for HandleId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The value a [`HandleId`] is bound to in the descriptor table.
///
/// Hosts that expose OS descriptors hand back an [`Descriptor::Fd`]; hosts
/// that do not (and every directory handle) alias the id itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Descriptor {
    Fd(u64),
    Id(HandleId),
}

impl Descriptor {
    pub fn as_u64(self) -> u64 {
        match self {
            Descriptor::Fd(fd) => fd,
            Descriptor::Id(id) => id.as_u64(),
        }
    }
}

impl From<HandleId> for Descriptor {
    fn from(id: HandleId) -> Self {
        Descriptor::Id(id)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_as_strings() {
        let id = HandleId::random();
        assert_ne!(id.as_u64(), 0);
        assert_eq!(id.to_string().parse::<HandleId>().unwrap(), id);
        assert!("abc".parse::<HandleId>().is_err());
    }

    #[test]
    fn aliased_descriptor_differs_from_fd() {
        let id = HandleId::from(7);
        assert_ne!(Descriptor::Id(id), Descriptor::Fd(7));
        assert_eq!(Descriptor::Id(id).to_string(), "7");
    }
}
