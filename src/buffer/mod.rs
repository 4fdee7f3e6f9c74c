//! Core-allocated byte buffers carrying serialized values across the boundary.
//!
//! A [`CoreBuffer`] is always allocated and freed by the core's allocator. The
//! side holding it owns it exclusively; ownership moves at these hand-off points:
//!
//! - **return values**: the core allocates and writes, returns the buffer by
//!   value, and the host reads it fully before passing it back to the core's
//!   free entry point.
//! - **arguments**: the host obtains the buffer from the core's alloc (or
//!   from-bytes) entry point, writes into it, and passes it by value into the
//!   call, which consumes it.
//!
//! The host never frees this memory with its own allocator.

pub mod abi;
mod ledger;

use std::marker::PhantomData;
use std::ptr;

use thiserror::Error;

use crate::codec::{self, CodecError, Lift, Lower, Reader, TypeDesc, Value, ValueCodec, Writer};
use crate::logging::trace;

pub use ledger::outstanding;

/// Errors from buffer ownership and layout checks. All of them are usage bugs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Buffer at {address:#x} is not owned by the caller (double free or foreign memory)")]
    NotOwned { address: usize },

    #[error("Buffer capacity mismatch: allocated {recorded}, claimed {claimed}")]
    CapacityMismatch { recorded: u64, claimed: u64 },

    #[error("Invalid buffer layout: len {len}, capacity {capacity}, null data: {null}")]
    InvalidLayout { len: u64, capacity: u64, null: bool },

    #[error("Buffer length {0} exceeds the maximum of i32::MAX")]
    LengthOverflow(u64),

    #[error("Cannot allocate {0} bytes")]
    TooLarge(u64),
}

/// A growable, core-owned byte region: `{capacity, len, data}`.
///
/// Invariants: `len <= capacity`, and `data` is null iff `capacity == 0`.
/// Reading past `len` or writing past `capacity` is rejected.
#[repr(C)]
#[derive(Debug)]
pub struct CoreBuffer {
    capacity: u64,
    len: u64,
    data: *mut u8,
}

// The buffer owns its allocation and is never shared, only handed off.
unsafe impl Send for CoreBuffer {}

impl Default for CoreBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreBuffer {
    /// An empty buffer. Holds no allocation, so freeing it is a no-op.
    pub const fn new() -> Self {
        Self {
            capacity: 0,
            len: 0,
            data: ptr::null_mut(),
        }
    }

    /// Allocate a buffer of `size` bytes with `len == size`.
    ///
    /// The contents happen to be zeroed, but callers must overwrite every byte
    /// they intend to hand over.
    pub fn allocate(size: u64) -> Result<Self, BufferError> {
        let len = usize::try_from(size).map_err(|_| BufferError::TooLarge(size))?;
        if size > i32::MAX as u64 {
            return Err(BufferError::TooLarge(size));
        }
        Ok(Self::from_vec(vec![0u8; len]))
    }

    /// Take ownership of a vector's allocation.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let mut bytes = std::mem::ManuallyDrop::new(bytes);
        let capacity = bytes.capacity() as u64;
        if capacity == 0 {
            return Self::new();
        }
        let data = bytes.as_mut_ptr();
        ledger::register(data, capacity);
        trace!(capacity, len = bytes.len(), "buffer allocated");
        Self {
            capacity,
            len: bytes.len() as u64,
            data,
        }
    }

    /// Copy a borrowed host byte view into a new core buffer.
    pub fn from_foreign_bytes(bytes: ForeignBytes<'_>) -> Result<Self, BufferError> {
        Ok(Self::from_vec(bytes.as_slice()?.to_vec()))
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` while this buffer's allocation is still checked out.
    pub fn is_live(&self) -> bool {
        self.data.is_null() || ledger::is_live(self.data, self.capacity)
    }

    fn check_layout(&self) -> Result<(), BufferError> {
        let null = self.data.is_null();
        if self.len > self.capacity || null != (self.capacity == 0) {
            return Err(BufferError::InvalidLayout {
                len: self.len,
                capacity: self.capacity,
                null,
            });
        }
        if self.len > i32::MAX as u64 {
            return Err(BufferError::LengthOverflow(self.len));
        }
        Ok(())
    }

    fn check_owned(&self) -> Result<(), BufferError> {
        self.check_layout()?;
        if self.is_live() {
            Ok(())
        } else {
            Err(BufferError::NotOwned {
                address: self.data as usize,
            })
        }
    }

    /// The `len` initialized bytes.
    pub fn as_slice(&self) -> Result<&[u8], BufferError> {
        self.check_owned()?;
        if self.data.is_null() {
            return Ok(&[]);
        }
        // SAFETY: the ledger confirms this allocation is live with this capacity,
        // and `len <= capacity` was checked above.
        Ok(unsafe { std::slice::from_raw_parts(self.data, self.len as usize) })
    }

    /// The `len` initialized bytes, checking only the layout.
    ///
    /// This is the host's view of a buffer the core handed over: the host cannot
    /// consult the core's ownership records, only the buffer's own fields.
    ///
    /// # Safety
    ///
    /// `data` must point at an allocation of at least `len` bytes that stays
    /// alive and unmodified for the returned lifetime.
    pub unsafe fn as_slice_unchecked(&self) -> Result<&[u8], BufferError> {
        self.check_layout()?;
        if self.data.is_null() {
            return Ok(&[]);
        }
        // SAFETY: upheld by the caller.
        Ok(unsafe { std::slice::from_raw_parts(self.data, self.len as usize) })
    }

    /// The `len` initialized bytes, for writing in place.
    fn as_mut_slice(&mut self) -> Result<&mut [u8], BufferError> {
        self.check_owned()?;
        if self.data.is_null() {
            return Ok(&mut []);
        }
        // SAFETY: as in `as_slice`, and `&mut self` makes this the only view.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.data, self.len as usize) })
    }

    /// Release the allocation back to the core allocator and recover the bytes.
    pub fn destroy_into_vec(self) -> Result<Vec<u8>, BufferError> {
        self.check_layout()?;
        if self.data.is_null() {
            return Ok(Vec::new());
        }
        ledger::release(self.data, self.capacity)?;
        trace!(capacity = self.capacity, "buffer released");
        // SAFETY: the ledger entry proves this pointer came from `from_vec` with
        // this capacity and has not been released before.
        Ok(unsafe {
            Vec::from_raw_parts(self.data, self.len as usize, self.capacity as usize)
        })
    }

    /// Free the buffer. Empty buffers are a no-op; a second free is an error.
    pub fn free(self) -> Result<(), BufferError> {
        self.destroy_into_vec().map(drop)
    }

    /// Grow the buffer so at least `additional` more bytes fit after `len`.
    ///
    /// The grown size is capped at `i32::MAX`. On failure the buffer is freed.
    pub fn reserve(self, additional: u64) -> Result<Self, BufferError> {
        let total = self.len.saturating_add(additional);
        let mut bytes = self.destroy_into_vec()?;
        if total > i32::MAX as u64 {
            return Err(BufferError::TooLarge(total));
        }
        bytes
            .try_reserve(additional as usize)
            .map_err(|_| BufferError::TooLarge(total))?;
        Ok(Self::from_vec(bytes))
    }

    /// Serialize a value into an exactly-sized buffer.
    pub fn lower<T: Lower + ?Sized>(value: &T) -> Result<Self, crate::Error> {
        let mut buffer = Self::allocate(value.allocation_size())?;
        let result = buffer.as_mut_slice().map_err(crate::Error::from).and_then(|bytes| {
            let mut writer = Writer::new(bytes);
            value.write(&mut writer)?;
            codec::check_written(value.allocation_size(), writer.position())?;
            Ok(())
        });
        match result {
            Ok(()) => Ok(buffer),
            Err(e) => {
                buffer.free()?;
                Err(e)
            }
        }
    }

    /// Serialize a dynamic value according to its descriptor.
    pub fn lower_value(value: &Value, ty: &TypeDesc) -> Result<Self, crate::Error> {
        Ok(Self::from_vec(ValueCodec.lower(value, ty)?))
    }

    /// Deserialize the buffer's whole contents, then free it.
    ///
    /// The buffer is freed even when lifting fails.
    pub fn lift<T: Lift>(self) -> Result<T, crate::Error> {
        let lifted = self.read_with(|reader| {
            let value = T::read(reader)?;
            reader.finish()?;
            Ok(value)
        });
        self.free()?;
        lifted
    }

    /// Deserialize a dynamic value occupying the whole buffer, then free it.
    pub fn lift_value(self, ty: &TypeDesc) -> Result<Value, crate::Error> {
        let lifted = self
            .as_slice()
            .map_err(crate::Error::from)
            .and_then(|bytes| Ok(ValueCodec.lift_exact(bytes, ty)?));
        self.free()?;
        lifted
    }

    fn read_with<T>(
        &self,
        f: impl FnOnce(&mut Reader<'_>) -> Result<T, CodecError>,
    ) -> Result<T, crate::Error> {
        let bytes = self.as_slice()?;
        let mut reader = Reader::new(bytes);
        Ok(f(&mut reader)?)
    }
}

/// A borrowed view of host-owned bytes: `{len, data}`.
///
/// Used to pass bytes into the core without allocating on the core side first;
/// the core copies them out before the call returns.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForeignBytes<'a> {
    len: i32,
    data: *const u8,
    _marker: PhantomData<&'a [u8]>,
}

impl<'a> ForeignBytes<'a> {
    pub fn from_slice(bytes: &'a [u8]) -> Result<Self, BufferError> {
        let len =
            i32::try_from(bytes.len()).map_err(|_| BufferError::LengthOverflow(bytes.len() as u64))?;
        Ok(Self {
            len,
            data: bytes.as_ptr(),
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        usize::try_from(self.len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> Result<&'a [u8], BufferError> {
        if self.len < 0 || (self.data.is_null() && self.len != 0) {
            return Err(BufferError::InvalidLayout {
                len: self.len.unsigned_abs() as u64,
                capacity: self.len.unsigned_abs() as u64,
                null: self.data.is_null(),
            });
        }
        if self.len == 0 {
            return Ok(&[]);
        }
        // SAFETY: the host guarantees `data` points at `len` readable bytes for `'a`.
        Ok(unsafe { std::slice::from_raw_parts(self.data, self.len()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer_invariants() {
        let buffer = CoreBuffer::new();
        assert_eq!(buffer.capacity(), 0);
        assert!(buffer.as_slice().unwrap().is_empty());
        assert!(buffer.free().is_ok());
        assert!(CoreBuffer::allocate(0).unwrap().free().is_ok());
    }

    #[test]
    fn test_double_free_is_rejected() {
        let buffer = CoreBuffer::from_vec(vec![1, 2, 3]);
        // Forge a second owner of the same allocation.
        let alias = CoreBuffer {
            capacity: buffer.capacity,
            len: buffer.len,
            data: buffer.data,
        };
        buffer.free().unwrap();
        assert!(!alias.is_live());
        assert!(matches!(alias.free(), Err(BufferError::NotOwned { .. })));
    }

    #[test]
    fn test_foreign_memory_is_rejected() {
        let mut local = vec![0u8; 4];
        let forged = CoreBuffer {
            capacity: 4,
            len: 4,
            data: local.as_mut_ptr(),
        };
        assert!(matches!(forged.as_slice(), Err(BufferError::NotOwned { .. })));
        assert!(matches!(forged.free(), Err(BufferError::NotOwned { .. })));
    }

    #[test]
    fn test_invalid_layout() {
        let bad = CoreBuffer {
            capacity: 0,
            len: 1,
            data: ptr::null_mut(),
        };
        assert!(matches!(bad.as_slice(), Err(BufferError::InvalidLayout { .. })));
    }

    #[test]
    fn test_lower_is_exactly_sized() {
        let buffer = CoreBuffer::lower(&vec![1i32, 2, 3]).unwrap();
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.capacity(), 16);
        let lifted: Vec<i32> = buffer.lift().unwrap();
        assert_eq!(lifted, vec![1, 2, 3]);
    }

    #[test]
    fn test_lift_frees_on_error() {
        let buffer = CoreBuffer::from_vec(vec![0, 0, 0, 9]);
        let alias = CoreBuffer {
            capacity: buffer.capacity,
            len: buffer.len,
            data: buffer.data,
        };
        assert!(buffer.lift::<String>().is_err());
        assert!(!alias.is_live());
    }

    #[test]
    fn test_reserve_preserves_contents() {
        let buffer = CoreBuffer::from_vec(b"abc".to_vec());
        let grown = buffer.reserve(100).unwrap();
        assert!(grown.capacity() >= 103);
        assert_eq!(grown.as_slice().unwrap(), b"abc");
        grown.free().unwrap();
    }

    #[test]
    fn test_foreign_bytes_copy() {
        let source = b"hello".to_vec();
        let bytes = ForeignBytes::from_slice(&source).unwrap();
        assert_eq!(bytes.len(), 5);
        let buffer = CoreBuffer::from_foreign_bytes(bytes).unwrap();
        assert_eq!(buffer.as_slice().unwrap(), b"hello");
        buffer.free().unwrap();
    }
}
