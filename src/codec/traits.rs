//! Static lowering and lifting for Rust types.
//!
//! This is the path generated call sites use: each argument, return value and
//! declared error type implements [`Lower`] and [`Lift`] directly, with no schema
//! lookup at runtime.

use std::collections::HashMap;
use std::convert::Infallible;
use std::hash::Hash;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::buffer::{Reader, Writer};
use super::CodecError;
use crate::handle::Handle;

/// A value that can be serialized into the wire format.
pub trait Lower {
    /// Exact number of bytes [`Lower::write`] will produce for this value.
    fn allocation_size(&self) -> u64;

    /// Serialize this value at the writer's cursor.
    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError>;
}

/// A value that can be deserialized from the wire format.
pub trait Lift: Sized {
    /// Deserialize a value starting at the reader's cursor.
    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError>;
}

macro_rules! scalar_codec {
    ($($ty:ty => $write:ident, $read:ident);* $(;)?) => {
        $(
            impl Lower for $ty {
                fn allocation_size(&self) -> u64 {
                    size_of::<$ty>() as u64
                }

                fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
                    writer.$write(*self)
                }
            }

            impl Lift for $ty {
                fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
                    reader.$read()
                }
            }
        )*
    };
}

scalar_codec! {
    u8 => write_u8, read_u8;
    i8 => write_i8, read_i8;
    u16 => write_u16, read_u16;
    i16 => write_i16, read_i16;
    u32 => write_u32, read_u32;
    i32 => write_i32, read_i32;
    u64 => write_u64, read_u64;
    i64 => write_i64, read_i64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

impl Lower for bool {
    fn allocation_size(&self) -> u64 {
        1
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        writer.write_u8(u8::from(*self))
    }
}

impl Lift for bool {
    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }
}

impl Lower for str {
    fn allocation_size(&self) -> u64 {
        4 + self.len() as u64
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        writer.write_len(self.len())?;
        writer.write_bytes(self.as_bytes())
    }
}

impl Lower for String {
    fn allocation_size(&self) -> u64 {
        self.as_str().allocation_size()
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        self.as_str().write(writer)
    }
}

impl Lift for String {
    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let len = reader.read_len()?;
        let bytes = reader.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }
}

impl<T: Lower + ?Sized> Lower for &T {
    fn allocation_size(&self) -> u64 {
        (**self).allocation_size()
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        (**self).write(writer)
    }
}

impl<T: Lower> Lower for Option<T> {
    fn allocation_size(&self) -> u64 {
        1 + self.as_ref().map_or(0, Lower::allocation_size)
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        match self {
            None => writer.write_u8(0),
            Some(inner) => {
                writer.write_u8(1)?;
                inner.write(writer)
            }
        }
    }
}

impl<T: Lift> Lift for Option<T> {
    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        match reader.read_u8()? {
            0 => Ok(None),
            1 => T::read(reader).map(Some),
            other => Err(CodecError::InvalidOptionTag(other)),
        }
    }
}

impl<T: Lower> Lower for [T] {
    fn allocation_size(&self) -> u64 {
        4 + self.iter().map(Lower::allocation_size).sum::<u64>()
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        writer.write_len(self.len())?;
        self.iter().try_for_each(|item| item.write(writer))
    }
}

impl<T: Lower> Lower for Vec<T> {
    fn allocation_size(&self) -> u64 {
        self.as_slice().allocation_size()
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        self.as_slice().write(writer)
    }
}

impl<T: Lift> Lift for Vec<T> {
    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let count = reader.read_len()?;
        // Each element takes at least one byte, so a count larger than what is
        // left cannot be honest; don't let it drive the allocation.
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }
}

impl<K: Lower, V: Lower, S> Lower for HashMap<K, V, S> {
    fn allocation_size(&self) -> u64 {
        4 + self
            .iter()
            .map(|(k, v)| k.allocation_size() + v.allocation_size())
            .sum::<u64>()
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        writer.write_len(self.len())?;
        for (k, v) in self {
            k.write(writer)?;
            v.write(writer)?;
        }
        Ok(())
    }
}

impl<K: Lift + Eq + Hash, V: Lift> Lift for HashMap<K, V> {
    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let count = reader.read_len()?;
        let mut map = HashMap::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let key = K::read(reader)?;
            let value = V::read(reader)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl Lower for Duration {
    fn allocation_size(&self) -> u64 {
        12
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        writer.write_u64(self.as_secs())?;
        writer.write_u32(self.subsec_nanos())
    }
}

impl Lift for Duration {
    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let secs = reader.read_u64()?;
        let nanos = reader.read_u32()?;
        Ok(Duration::new(secs, nanos))
    }
}

/// Timestamps are seconds relative to the Unix epoch (negative before it) plus
/// a non-negative nanosecond part.
impl Lower for SystemTime {
    fn allocation_size(&self) -> u64 {
        12
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        let (sign, offset) = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => (1i64, after),
            Err(before) => (-1i64, before.duration()),
        };
        let secs = i64::try_from(offset.as_secs())
            .map_err(|_| CodecError::InvalidTimestamp(format!("{:?}", self)))?;
        writer.write_i64(sign * secs)?;
        writer.write_u32(offset.subsec_nanos())
    }
}

impl Lift for SystemTime {
    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        let secs = reader.read_i64()?;
        let nanos = reader.read_u32()?;
        let offset = Duration::new(secs.unsigned_abs(), nanos);
        let time = if secs >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        };
        time.ok_or_else(|| CodecError::InvalidTimestamp(format!("{}s {}ns", secs, nanos)))
    }
}

impl Lower for Handle {
    fn allocation_size(&self) -> u64 {
        8
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<(), CodecError> {
        writer.write_u64(self.as_raw())
    }
}

impl Lift for Handle {
    fn read(reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        reader.read_u64().map(Handle::from_raw)
    }
}

// Error type of calls that declare none. Never lowered; lifting one always fails.
impl Lower for Infallible {
    fn allocation_size(&self) -> u64 {
        match *self {}
    }

    fn write(&self, _writer: &mut Writer<'_>) -> Result<(), CodecError> {
        match *self {}
    }
}

impl Lift for Infallible {
    fn read(_reader: &mut Reader<'_>) -> Result<Self, CodecError> {
        Err(CodecError::TypeMismatch {
            expected: "no declared error".to_string(),
            got: "error payload".to_string(),
        })
    }
}

/// Write the discriminant of a tagged union. Variant indices are zero-based in
/// Rust and one-based on the wire.
pub fn write_discriminant(writer: &mut Writer<'_>, index: usize) -> Result<(), CodecError> {
    let tag = index
        .checked_add(1)
        .and_then(|tag| i32::try_from(tag).ok())
        .ok_or(CodecError::LengthOverflow(index))?;
    writer.write_i32(tag)
}

/// Read the discriminant of a tagged union and return the zero-based variant index.
pub fn read_discriminant(
    reader: &mut Reader<'_>,
    type_name: &str,
    num_cases: usize,
) -> Result<usize, CodecError> {
    let discriminant = reader.read_i32()?;
    usize::try_from(discriminant)
        .ok()
        .and_then(|tag| tag.checked_sub(1))
        .filter(|index| *index < num_cases)
        .ok_or_else(|| CodecError::InvalidDiscriminant {
            type_name: type_name.to_string(),
            discriminant,
            num_cases,
        })
}
