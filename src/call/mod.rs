//! The call envelope: how every fallible call reports its outcome.
//!
//! Each call takes a [`CallStatus`] out-parameter. The callee side wraps its
//! body in [`call_with_result`], which guarantees the status is always set and
//! nothing unwinds across the boundary. The caller side uses [`Caller`] to turn
//! the status back into a `Result<T, CallError<E>>`.
//!
//! | code | meaning   | error buffer                     |
//! |------|-----------|----------------------------------|
//! | 0    | OK        | empty                            |
//! | 1    | ERROR     | serialized declared error        |
//! | 2    | PANIC     | serialized diagnostic string     |
//! | 3    | CANCELLED | empty                            |

mod error;
mod host;
mod object;
mod returns;
mod scaffold;
mod status;

pub use error::CallError;
pub use host::Caller;
pub use object::{NativeObject, ObjectSymbols};
pub use returns::{Buffered, LowerReturn};
pub use scaffold::{call_with_internal, call_with_output, call_with_result, panic_message};
pub use status::{CallStatus, CallStatusCode};
