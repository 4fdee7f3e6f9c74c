//! Byte codec for values crossing the boundary.
//!
//! Every buffer-typed value is serialized in a fixed big-endian format that does
//! not depend on either side's memory layout:
//!
//! | Type | Encoding |
//! |------|----------|
//! | integers, floats | big-endian, natural width |
//! | `bool` | one byte, `0` or `1` |
//! | string, bytes | i32 byte length + bytes |
//! | optional | presence byte + payload |
//! | sequence | i32 count + elements |
//! | map | i32 count + key/value pairs |
//! | record | fields in declaration order |
//! | enum / tagged union | i32 one-based discriminant + variant fields |
//! | timestamp | i64 seconds from the Unix epoch + u32 nanoseconds |
//! | duration | u64 seconds + u32 nanoseconds |
//! | object | u64 handle |
//!
//! # Module Organization
//!
//! - [`error`]: Error types for codec operations
//! - [`buffer`]: Bounds-checked read/write cursors
//! - [`traits`]: [`Lower`]/[`Lift`] for Rust types (generated call sites)
//! - [`value`]: [`Value`] and [`TypeDesc`] for descriptor-driven encoding
//! - `lower` / `lift`: [`ValueCodec`] over [`Value`] trees

pub mod buffer;
mod error;
mod lift;
mod lower;
pub mod traits;
pub mod value;

pub use buffer::{Reader, Writer};
pub use error::CodecError;
pub use traits::{read_discriminant, write_discriminant, Lift, Lower};
pub use value::{EnumDesc, FieldDesc, RecordDesc, TypeDesc, Value, VariantDesc};

/// Lowering and lifting of [`Value`] trees according to a [`TypeDesc`].
///
/// # Example
///
/// ```ignore
/// use ffi_contract::codec::{TypeDesc, Value, ValueCodec};
///
/// let ty = TypeDesc::sequence(TypeDesc::I32);
/// let value = Value::Sequence(vec![Value::I32(1), Value::I32(2), Value::I32(3)]);
///
/// let bytes = ValueCodec.lower(&value, &ty)?;
/// let (lifted, consumed) = ValueCodec.lift(&bytes, &ty)?;
/// assert_eq!(consumed, 16);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueCodec;

/// Lower a value into an exactly-sized byte vector.
pub fn lower_to_vec<T: Lower + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    let size = value.allocation_size();
    let len = usize::try_from(size).map_err(|_| CodecError::LengthOverflow(usize::MAX))?;
    let mut bytes = vec![0u8; len];
    let mut writer = Writer::new(&mut bytes);
    value.write(&mut writer)?;
    check_written(size, writer.position())?;
    Ok(bytes)
}

/// Lift a value that must occupy the whole slice.
pub fn lift_from_slice<T: Lift>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut reader = Reader::new(bytes);
    let value = T::read(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

/// Compare the bytes a writer produced against the precomputed allocation size.
pub(crate) fn check_written(computed: u64, written: usize) -> Result<(), CodecError> {
    let written = written as u64;
    if computed == written {
        Ok(())
    } else {
        Err(CodecError::SizeMismatch { computed, written })
    }
}
