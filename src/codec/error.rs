//! Error types for byte codec operations.

use thiserror::Error;

/// Errors that can occur while lowering values into or lifting values out of a buffer.
///
/// Only the bounds variants ([`CodecError::BufferTooSmall`] on read) are expected at
/// runtime; everything else means the two sides disagree about the wire format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    #[error("Invalid discriminant {discriminant} for {type_name} with {num_cases} cases")]
    InvalidDiscriminant {
        type_name: String,
        discriminant: i32,
        num_cases: usize,
    },

    #[error("Invalid bool value: {0}")]
    InvalidBool(u8),

    #[error("Invalid option tag: {0}")]
    InvalidOptionTag(u8),

    #[error("Negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("Length {0} does not fit in an i32 prefix")]
    LengthOverflow(usize),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Unknown {kind} '{name}' in {type_name}")]
    UnknownMember {
        kind: &'static str,
        name: String,
        type_name: String,
    },

    #[error("Allocation size mismatch: computed {computed} bytes, wrote {written}")]
    SizeMismatch { computed: u64, written: u64 },

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

impl CodecError {
    /// Returns `true` for a read past the end of the buffer.
    ///
    /// This is the only codec failure a caller can meaningfully recover from.
    pub fn is_bounds(&self) -> bool {
        matches!(self, Self::BufferTooSmall { .. })
    }
}
