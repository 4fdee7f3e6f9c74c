//! The async bridge.
//!
//! An async native call returns a future handle immediately. The host then
//! drives it with the poll/complete/cancel/free entry points for the call's
//! return type:
//!
//! 1. `poll(handle, callback, data)`: the core invokes `callback(data, code)`
//!    with [`PollCode::Ready`] once the result is available, or with
//!    [`PollCode::Wake`] when the host should poll again. Callbacks may arrive
//!    on any thread.
//! 2. `complete(handle, status)`: fetch the result through the usual call
//!    envelope. A cancelled future completes with `CANCELLED`.
//! 3. `free(handle)`: always, exactly once, after completing or cancelling.
//!
//! After `cancel(handle)` the core never invokes a continuation again.
//!
//! The reverse direction, host async work awaited by the core, is in
//! [`foreign`].

mod abi;
mod native;
#[cfg(feature = "async")]
pub mod foreign;
#[cfg(feature = "async")]
mod host;
mod scheduler;

use std::future::Future;

pub use abi::{FutureReturn, FutureSymbols};
pub use native::FutureRegistry;
#[cfg(feature = "async")]
pub use host::{await_future, wait_future};

use crate::call::LowerReturn;
use crate::codec::Lower;
use crate::handle::Handle;
use crate::logging::error;

/// `callback(data, poll_code)`, supplied by the host on each poll.
pub type ContinuationCallback = extern "C" fn(data: u64, poll_code: i8);

/// Codes passed to a [`ContinuationCallback`].
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCode {
    /// The result is ready; call `complete`.
    Ready = 0,
    /// Maybe ready; poll again.
    Wake = 1,
}

impl TryFrom<i8> for PollCode {
    type Error = i8;

    fn try_from(code: i8) -> Result<Self, i8> {
        match code {
            0 => Ok(Self::Ready),
            1 => Ok(Self::Wake),
            other => Err(other),
        }
    }
}

/// Start an async call and return its raw future handle.
///
/// This is the body of an exported async entry point. Returns the null
/// handle if no handle could be issued.
pub fn start<F, T, E>(future: F) -> u64
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: LowerReturn + Send + 'static,
    T::ReturnType: FutureReturn,
    E: Lower + Send + 'static,
{
    match T::ReturnType::registry().spawn(future) {
        Ok(handle) => handle.as_raw(),
        Err(e) => {
            error!(error = %e, "could not start future");
            Handle::NULL.as_raw()
        }
    }
}
