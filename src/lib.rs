//! Marshaling and lifecycle runtime for a native core called across a C ABI.
//!
//! A native core exposes functions through `extern "C"` symbols; a host calls
//! them, passing scalars directly and everything else as big-endian byte
//! buffers. This crate provides both halves of that contract: the wire codec,
//! the buffer the bytes travel in, handle tables for objects that cross the
//! boundary, the call envelope that turns panics and declared errors into a
//! status code, and a polling bridge for async functions.
//!
//! # Quick Start
//!
//! ```ignore
//! use ffi_contract::prelude::*;
//!
//! // Core side: an exported function. A malformed argument reports PANIC.
//! #[unsafe(no_mangle)]
//! pub extern "C" fn demo_greet(name: CoreBuffer, status: &mut CallStatus) -> CoreBuffer {
//!     call_with_internal(status, || {
//!         let name: String = name.lift()?;
//!         Ok(format!("hello, {name}"))
//!     })
//! }
//!
//! // Host side.
//! let caller = Caller::in_process();
//! let name = caller.lower(&"world".to_string())?;
//! let greeting = caller.call::<_, String>(|status| demo_greet(name, status))?;
//! let greeting: String = caller.lift(greeting)?;
//! ```
//!
//! # Modules
//!
//! - [`codec`] - Big-endian wire format for scalars and compound values
//! - [`buffer`] - Growable buffers whose memory is owned by the core
//! - [`handle`] - Tables mapping opaque 64-bit handles to shared objects
//! - [`call`] - Call status envelope, scaffolding for exports, host-side checks
//! - [`contract`] - Contract version and per-function checksum verification
//! - [`callback`] - Host objects invoked by the core through vtables
//! - [`future`] - Async functions driven by host polling
//!
//! # Feature Flags
//!
//! - `async` - Host-side awaiting and foreign futures, backed by tokio (enabled by default)
//! - `config` - TOML runtime configuration (enabled by default)
//! - `logging` - Enable library-level tracing (consumers provide their own subscriber)
//! - `subscriber` - Helper to install a `tracing-subscriber` from configuration
//! - `full` - Enable all features

pub mod buffer;
pub mod call;
pub mod callback;
pub mod codec;
#[cfg(feature = "config")]
pub mod config;
pub mod contract;
pub mod future;
pub mod handle;
mod logging;
pub mod prelude;
#[cfg(feature = "subscriber")]
pub mod subscriber;

mod error;

// Re-export the unified error type
pub use error::{Error, Result};

pub use buffer::{BufferError, CoreBuffer, ForeignBytes};
pub use call::{CallError, CallStatus, CallStatusCode, Caller, NativeObject, ObjectSymbols};
pub use codec::{CodecError, Lift, Lower, TypeDesc, Value};
pub use contract::{BindingContract, FunctionSignature, IntegrityError, LibraryGuard};
pub use handle::{Handle, HandleError, HandleMap};

#[cfg(feature = "config")]
pub use config::{ConfigError, RuntimeConfig};
