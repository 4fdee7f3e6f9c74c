//! Convenient re-exports for common usage patterns.
//!
//! This module provides a single import to bring the types used by both core
//! exports and host bindings into scope.
//!
//! # Example
//!
//! ```ignore
//! use ffi_contract::prelude::*;
//!
//! let caller = Caller::in_process();
//! let buffer = caller.lower(&vec![1u32, 2, 3])?;
//! let values: Vec<u32> = caller.lift(buffer)?;
//! ```

// Unified error handling
pub use crate::error::{Error, Result};

// Wire format
pub use crate::codec::{Lift, Lower, TypeDesc, Value, ValueCodec};

// Buffers and handles
pub use crate::buffer::{CoreBuffer, ForeignBytes};
pub use crate::handle::{Handle, HandleMap};

// Call envelope
pub use crate::call::{
    Buffered, CallError, CallStatus, CallStatusCode, Caller, LowerReturn, NativeObject,
    ObjectSymbols, call_with_internal, call_with_output, call_with_result,
};

// Integrity
pub use crate::contract::{
    BindingContract, FunctionSignature, IntegrityConfig, LibraryGuard, NativeContract,
};

// Callback interfaces
pub use crate::callback::{CallbackRegistry, CallbackVTable, ForeignObject, VTableSlot};

// Async functions
pub use crate::future::{ContinuationCallback, FutureReturn, PollCode};
#[cfg(feature = "async")]
pub use crate::future::{await_future, wait_future};
