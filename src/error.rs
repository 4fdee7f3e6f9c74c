//! Unified error type for the ffi-contract library.
//!
//! Every module reports its own error enum; [`Error`] wraps them all so
//! application code can use a single type. Declared errors of individual calls
//! are not in here: they surface through [`CallError`](crate::call::CallError).

use thiserror::Error;

use crate::buffer::BufferError;
use crate::codec::CodecError;
#[cfg(feature = "config")]
use crate::config::ConfigError;
use crate::contract::IntegrityError;
use crate::handle::HandleError;
#[cfg(feature = "subscriber")]
use crate::subscriber::LoggingError;

/// Unified error type for all ffi-contract operations.
///
/// # Example
///
/// ```ignore
/// use ffi_contract::{Caller, Result};
///
/// fn greeting(caller: &Caller, buffer: CoreBuffer) -> Result<String> {
///     caller.lift(buffer)
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Error from encoding or decoding a value.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Buffer ownership or layout violation.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// Unknown or exhausted handle.
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// Caller and native core were built from different contracts.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Error loading configuration.
    #[cfg(feature = "config")]
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Error installing the log subscriber.
    #[cfg(feature = "subscriber")]
    #[error(transparent)]
    Logging(#[from] LoggingError),

    /// A lifecycle entry point failed unexpectedly.
    #[error("Native core panicked: {0}")]
    Panic(String),

    /// A call status with a code outside the known set.
    #[error("Unknown call status code {0}")]
    UnknownStatus(i8),

    /// The other side broke the calling convention.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// A core object proxy was used after it was destroyed.
    #[error("{0} object has already been destroyed")]
    ObjectDestroyed(&'static str),

    /// A callback interface was used before its vtable was registered.
    #[error("No vtable registered for callback interface '{0}'")]
    VTableMissing(&'static str),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this is a codec error.
    pub fn is_codec(&self) -> bool {
        matches!(self, Self::Codec(_))
    }

    /// Returns `true` if this is a buffer error.
    pub fn is_buffer(&self) -> bool {
        matches!(self, Self::Buffer(_))
    }

    /// Returns `true` if this is a handle error.
    pub fn is_handle(&self) -> bool {
        matches!(self, Self::Handle(_))
    }

    /// Returns `true` if this is an integrity error.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }

    /// Returns `true` unless the failure is a recoverable one: a short read,
    /// or a configuration or logging setup problem.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Codec(e) => !e.is_bounds(),
            #[cfg(feature = "config")]
            Self::Config(_) => false,
            #[cfg(feature = "subscriber")]
            Self::Logging(_) => false,
            _ => true,
        }
    }
}
