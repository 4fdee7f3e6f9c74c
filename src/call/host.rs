//! Caller side of the call envelope.
//!
//! A [`Caller`] wraps the buffer entry points of one loaded core. It lowers
//! arguments into core-allocated buffers, invokes a call with a fresh status,
//! and turns the status back into a `Result`, freeing every buffer it was handed
//! through the core's free entry point.

use super::error::CallError;
use super::status::{CallStatus, CallStatusCode};
use crate::buffer::abi::BufferSymbols;
use crate::buffer::{CoreBuffer, ForeignBytes};
use crate::codec::{Lift, Lower, TypeDesc, Value, ValueCodec, lift_from_slice, lower_to_vec};
use crate::error::{Error, Result};
use crate::logging::{debug, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct Caller {
    symbols: BufferSymbols,
}

impl Caller {
    pub fn new(symbols: BufferSymbols) -> Self {
        Self { symbols }
    }

    /// A caller for the core linked into this process.
    pub fn in_process() -> Self {
        Self::new(BufferSymbols::in_process())
    }

    pub fn symbols(&self) -> &BufferSymbols {
        &self.symbols
    }

    /// Invoke `f` with a zeroed status and interpret the status it leaves.
    ///
    /// On a non-OK status the raw return value is discarded; it is a
    /// placeholder and must not be interpreted.
    pub fn call<R, E: Lift>(
        &self,
        f: impl FnOnce(&mut CallStatus) -> R,
    ) -> std::result::Result<R, CallError<E>> {
        let mut status = CallStatus::new();
        let value = f(&mut status);
        self.check_status(status)?;
        Ok(value)
    }

    /// Turn a status set by the callee into a `Result`, consuming its error buffer.
    pub fn check_status<E: Lift>(&self, mut status: CallStatus) -> std::result::Result<(), CallError<E>> {
        match status.status_code() {
            Ok(CallStatusCode::Success) => {
                let stray = status.take_error_buf();
                if stray.is_empty() {
                    Ok(())
                } else {
                    warn!(len = stray.len(), "OK status carried an error buffer");
                    self.free(stray)?;
                    Err(Error::Protocol("OK status carried a non-empty error buffer".into()).into())
                }
            }
            Ok(CallStatusCode::Error) => {
                let declared = self.lift::<E>(status.take_error_buf())?;
                debug!("call returned a declared error");
                Err(CallError::Declared(declared))
            }
            Ok(CallStatusCode::Panic) => {
                let message = self.lift::<String>(status.take_error_buf())?;
                Err(CallError::Panic(message))
            }
            Ok(CallStatusCode::Cancelled) => {
                self.free(status.take_error_buf())?;
                Err(CallError::Cancelled)
            }
            Err(code) => {
                self.free(status.take_error_buf())?;
                Err(Error::UnknownStatus(code).into())
            }
        }
    }

    /// Copy host bytes into a fresh core buffer.
    pub fn buffer_from_bytes(&self, bytes: &[u8]) -> Result<CoreBuffer> {
        let bytes = ForeignBytes::from_slice(bytes)?;
        self.internal(|status| (self.symbols.from_bytes)(bytes, status))
    }

    /// Serialize an argument into a core buffer the callee will consume.
    pub fn lower<T: Lower + ?Sized>(&self, value: &T) -> Result<CoreBuffer> {
        self.buffer_from_bytes(&lower_to_vec(value)?)
    }

    pub fn lower_value(&self, value: &Value, ty: &TypeDesc) -> Result<CoreBuffer> {
        self.buffer_from_bytes(&ValueCodec.lower(value, ty)?)
    }

    /// Deserialize a returned buffer and free it. The buffer is freed even when
    /// lifting fails.
    pub fn lift<T: Lift>(&self, buffer: CoreBuffer) -> Result<T> {
        // SAFETY: the buffer came from the core and has not been freed; it is
        // only freed below, after the borrow ends.
        let lifted = unsafe { buffer.as_slice_unchecked() }
            .map_err(Error::from)
            .and_then(|bytes| Ok(lift_from_slice::<T>(bytes)?));
        self.free(buffer)?;
        lifted
    }

    pub fn lift_value(&self, buffer: CoreBuffer, ty: &TypeDesc) -> Result<Value> {
        // SAFETY: as in `lift`.
        let lifted = unsafe { buffer.as_slice_unchecked() }
            .map_err(Error::from)
            .and_then(|bytes| Ok(ValueCodec.lift_exact(bytes, ty)?));
        self.free(buffer)?;
        lifted
    }

    /// Release a buffer through the core's free entry point.
    pub fn free(&self, buffer: CoreBuffer) -> Result<()> {
        if buffer.capacity() == 0 {
            return Ok(());
        }
        self.internal(|status| (self.symbols.free)(buffer, status))
    }

    /// Run one of the buffer entry points, which have no declared errors.
    fn internal<R>(&self, f: impl FnOnce(&mut CallStatus) -> R) -> Result<R> {
        let mut status = CallStatus::new();
        let value = f(&mut status);
        match status.status_code() {
            Ok(CallStatusCode::Success) => Ok(value),
            Ok(CallStatusCode::Panic) => {
                let buffer = status.take_error_buf();
                // SAFETY: as in `lift`.
                let message = unsafe { buffer.as_slice_unchecked() }
                    .ok()
                    .and_then(|bytes| lift_from_slice::<String>(bytes).ok())
                    .unwrap_or_else(|| String::from("unreadable panic message"));
                // One attempt only; a second failure here is not reported.
                (self.symbols.free)(buffer, &mut CallStatus::new());
                Err(Error::Panic(message))
            }
            Ok(other) => {
                (self.symbols.free)(status.take_error_buf(), &mut CallStatus::new());
                Err(Error::Protocol(format!(
                    "buffer entry point returned status {other}"
                )))
            }
            Err(code) => Err(Error::UnknownStatus(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::call_with_result;
    use crate::codec::{CodecError, Reader, Writer, read_discriminant, write_discriminant};

    #[derive(Debug, PartialEq)]
    enum LookupError {
        Missing(String),
        Locked,
    }

    impl Lower for LookupError {
        fn allocation_size(&self) -> u64 {
            4 + match self {
                Self::Missing(key) => key.allocation_size(),
                Self::Locked => 0,
            }
        }

        fn write(&self, writer: &mut Writer<'_>) -> std::result::Result<(), CodecError> {
            match self {
                Self::Missing(key) => {
                    write_discriminant(writer, 0)?;
                    key.write(writer)
                }
                Self::Locked => write_discriminant(writer, 1),
            }
        }
    }

    impl Lift for LookupError {
        fn read(reader: &mut Reader<'_>) -> std::result::Result<Self, CodecError> {
            match read_discriminant(reader, "LookupError", 2)? {
                0 => Ok(Self::Missing(String::read(reader)?)),
                _ => Ok(Self::Locked),
            }
        }
    }

    #[test]
    fn test_declared_error_round_trip() {
        let caller = Caller::in_process();
        let result = caller.call::<u32, LookupError>(|status| {
            call_with_result(status, || Err::<u32, _>(LookupError::Missing("k".into())))
        });
        match result {
            Err(CallError::Declared(error)) => assert_eq!(error, LookupError::Missing("k".into())),
            other => panic!("expected declared error, got {other:?}"),
        }
    }

    #[test]
    fn test_panic_surfaces_message() {
        let caller = Caller::in_process();
        let result = caller.call::<(), LookupError>(|status| {
            call_with_result::<(), LookupError, _>(status, || panic!("core exploded"))
        });
        assert!(matches!(result, Err(CallError::Panic(ref m)) if m == "core exploded"));
    }

    #[test]
    fn test_unknown_status_is_internal() {
        let caller = Caller::in_process();
        let result = caller.call::<(), LookupError>(|status| status.code = 42);
        assert!(matches!(
            result,
            Err(CallError::Internal(Error::UnknownStatus(42)))
        ));
    }

    #[test]
    fn test_ok_with_error_buffer_is_rejected() {
        let caller = Caller::in_process();
        let result = caller.call::<(), LookupError>(|status| {
            status.error_buf = CoreBuffer::from_vec(vec![1]);
        });
        assert!(matches!(result, Err(CallError::Internal(Error::Protocol(_)))));
    }

    #[test]
    fn test_lower_and_lift_through_symbols() {
        let caller = Caller::in_process();
        let buffer = caller.lower(&vec![1i32, 2, 3]).unwrap();
        assert_eq!(buffer.len(), 16);
        let back: Vec<i32> = caller.lift(buffer).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn test_double_free_is_reported() {
        let caller = Caller::in_process();
        let buffer = caller.lower("abc").unwrap();
        let alias = unsafe { std::ptr::read(&buffer) };
        caller.free(buffer).unwrap();
        assert!(matches!(caller.free(alias), Err(Error::Panic(_))));
    }
}
