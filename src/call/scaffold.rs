//! Callee side of the call envelope.
//!
//! Every exported entry point runs its body through [`call_with_result`] (or
//! [`call_with_output`]). Whatever happens inside, the status is set exactly
//! once: a declared error is lowered into the error buffer, and a panic or an
//! internal failure is reported as `PANIC` with a message. Nothing unwinds
//! across the boundary.

use std::any::Any;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};

use super::returns::LowerReturn;
use super::status::CallStatus;
use crate::buffer::CoreBuffer;
use crate::codec::Lower;
use crate::logging::{debug, error};

/// Run a fallible body, fold its outcome into `status`, and return the value
/// to hand back across the boundary.
///
/// On anything but success the returned value is a placeholder the caller
/// must ignore.
pub fn call_with_result<R, E, F>(status: &mut CallStatus, body: F) -> R::ReturnType
where
    R: LowerReturn,
    E: Lower,
    F: FnOnce() -> Result<R, E>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match body() {
        Ok(value) => value.lower_return().map(Ok),
        Err(declared) => CoreBuffer::lower(&declared).map(Err),
    }));
    fold_outcome::<R>(status, outcome)
}

/// Like [`call_with_result`] for bodies whose only failures are internal.
///
/// An `Err` is reported as `PANIC`: the caller has no declared error type to
/// lift it as.
pub fn call_with_internal<R, F>(status: &mut CallStatus, body: F) -> R::ReturnType
where
    R: LowerReturn,
    F: FnOnce() -> Result<R, crate::Error>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        body().and_then(LowerReturn::lower_return).map(Ok)
    }));
    fold_outcome::<R>(status, outcome)
}

type Outcome<T> = std::thread::Result<Result<Result<T, CoreBuffer>, crate::Error>>;

fn fold_outcome<R: LowerReturn>(
    status: &mut CallStatus,
    outcome: Outcome<R::ReturnType>,
) -> R::ReturnType {
    match outcome {
        Ok(Ok(Ok(value))) => {
            status.set_success();
            value
        }
        Ok(Ok(Err(error_buf))) => {
            debug!(len = error_buf.len(), "call returned a declared error");
            status.set_error(error_buf);
            R::ffi_default()
        }
        Ok(Err(internal)) => {
            error!(error = %internal, "call failed internally");
            status.set_panic(&internal.to_string());
            R::ffi_default()
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            error!(message = %message, "call panicked");
            status.set_panic(&message);
            R::ffi_default()
        }
    }
}

/// Like [`call_with_result`] for bodies with no declared error.
pub fn call_with_output<R, F>(status: &mut CallStatus, body: F) -> R::ReturnType
where
    R: LowerReturn,
    F: FnOnce() -> R,
{
    call_with_result(status, || Ok::<R, Infallible>(body()))
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        String::from("panic with a non-string payload")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::status::CallStatusCode;
    use crate::codec::{CodecError, Writer};

    #[derive(Debug)]
    struct NotFound(u32);

    impl Lower for NotFound {
        fn allocation_size(&self) -> u64 {
            8
        }

        fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
            crate::codec::write_discriminant(writer, 0)?;
            writer.write_u32(self.0)
        }
    }

    #[test]
    fn test_success_returns_value() {
        let mut status = CallStatus::new();
        let value = call_with_result(&mut status, || Ok::<u32, NotFound>(7));
        assert_eq!(value, 7);
        assert_eq!(status.status_code(), Ok(CallStatusCode::Success));
        assert!(status.error_buf.is_empty());
    }

    #[test]
    fn test_declared_error_is_lowered() {
        let mut status = CallStatus::new();
        let value = call_with_result(&mut status, || Err::<u32, _>(NotFound(42)));
        assert_eq!(value, 0);
        assert_eq!(status.status_code(), Ok(CallStatusCode::Error));
        let buf = status.take_error_buf();
        assert_eq!(buf.as_slice().unwrap(), &[0, 0, 0, 1, 0, 0, 0, 42]);
        buf.free().unwrap();
    }

    #[test]
    fn test_panic_is_caught() {
        let mut status = CallStatus::new();
        let value = call_with_output::<bool, _>(&mut status, || panic!("kaboom"));
        assert_eq!(value, 0);
        assert_eq!(status.status_code(), Ok(CallStatusCode::Panic));
        let message: String = status.take_error_buf().lift().unwrap();
        assert_eq!(message, "kaboom");
    }

    #[test]
    fn test_formatted_panic_message() {
        let mut status = CallStatus::new();
        call_with_output::<(), _>(&mut status, || panic!("index {} out of range", 3));
        let message: String = status.take_error_buf().lift().unwrap();
        assert_eq!(message, "index 3 out of range");
    }

    #[test]
    fn test_internal_failure_is_panic() {
        let mut status = CallStatus::new();
        let value = call_with_internal(&mut status, || {
            Err::<u64, _>(crate::Error::Protocol("bad envelope".into()))
        });
        assert_eq!(value, 0);
        assert_eq!(status.status_code(), Ok(CallStatusCode::Panic));
        let message: String = status.take_error_buf().lift().unwrap();
        assert!(message.contains("bad envelope"));
    }

    #[test]
    fn test_buffer_return_default_is_empty() {
        let mut status = CallStatus::new();
        let buf = call_with_result(&mut status, || Err::<String, _>(NotFound(1)));
        assert!(buf.is_empty());
        status.take_error_buf().free().unwrap();
    }
}
