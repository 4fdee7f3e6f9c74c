//! Exported buffer lifecycle entry points.
//!
//! These are the only way a host may obtain or release a [`CoreBuffer`]. Misuse
//! (double free, foreign memory, oversized requests) has no declared error type
//! and is reported as `PANIC` through the [`CallStatus`].

use super::{CoreBuffer, ForeignBytes};
use crate::call::{CallStatus, call_with_internal};

/// Allocate a zeroed buffer of `size` bytes.
#[unsafe(no_mangle)]
pub extern "C" fn ffi_contract_buffer_alloc(size: u64, status: &mut CallStatus) -> CoreBuffer {
    call_with_internal(status, || Ok(CoreBuffer::allocate(size)?))
}

/// Copy host bytes into a new buffer.
#[unsafe(no_mangle)]
pub extern "C" fn ffi_contract_buffer_from_bytes(
    bytes: ForeignBytes<'_>,
    status: &mut CallStatus,
) -> CoreBuffer {
    call_with_internal(status, || Ok(CoreBuffer::from_foreign_bytes(bytes)?))
}

/// Release a buffer. Freeing an empty buffer is a no-op.
#[unsafe(no_mangle)]
pub extern "C" fn ffi_contract_buffer_free(buffer: CoreBuffer, status: &mut CallStatus) {
    call_with_internal(status, || Ok(buffer.free()?))
}

/// Grow a buffer so `additional` more bytes fit after its current contents.
#[unsafe(no_mangle)]
pub extern "C" fn ffi_contract_buffer_reserve(
    buffer: CoreBuffer,
    additional: u64,
    status: &mut CallStatus,
) -> CoreBuffer {
    call_with_internal(status, || Ok(buffer.reserve(additional)?))
}

/// The buffer entry points as function pointers.
///
/// A host resolves these from the loaded library; in-process callers use
/// [`BufferSymbols::in_process`].
#[derive(Debug, Clone, Copy)]
pub struct BufferSymbols {
    pub alloc: extern "C" fn(u64, &mut CallStatus) -> CoreBuffer,
    pub from_bytes: extern "C" fn(ForeignBytes<'_>, &mut CallStatus) -> CoreBuffer,
    pub free: extern "C" fn(CoreBuffer, &mut CallStatus),
    pub reserve: extern "C" fn(CoreBuffer, u64, &mut CallStatus) -> CoreBuffer,
}

impl BufferSymbols {
    pub const fn in_process() -> Self {
        Self {
            alloc: ffi_contract_buffer_alloc,
            from_bytes: ffi_contract_buffer_from_bytes,
            free: ffi_contract_buffer_free,
            reserve: ffi_contract_buffer_reserve,
        }
    }
}

impl Default for BufferSymbols {
    fn default() -> Self {
        Self::in_process()
    }
}
