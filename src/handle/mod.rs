//! Opaque 64-bit handles standing in for object references.
//!
//! Neither side of the boundary ever holds the other's raw pointers. Objects are
//! kept in a [`HandleMap`] owned by the side that declared their type, and only
//! the integer handle crosses.

mod map;

use std::fmt;

use thiserror::Error;

pub use map::HandleMap;

/// Opaque identity of an object stored in a [`HandleMap`].
///
/// Handles are issued from 1 upwards, so a zero-initialized handle is always
/// detectably invalid. Values above `i64::MAX` are reserved as well, since hosts
/// with only signed 64-bit integers see them as negative.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// The reserved, never-issued handle.
    pub const NULL: Self = Self(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Returns `true` if this value could have been issued by a [`HandleMap`].
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 <= i64::MAX as u64
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<Handle> for u64 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

/// Errors from handle lookups.
///
/// Both mean the caller holds a handle it should not: a use-after-free, or a
/// handle from a different table or library instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    #[error("{table}.{op}: invalid handle {handle}")]
    InvalidHandle {
        table: &'static str,
        op: &'static str,
        handle: Handle,
    },

    #[error("{table}: handle space exhausted")]
    Exhausted { table: &'static str },
}
