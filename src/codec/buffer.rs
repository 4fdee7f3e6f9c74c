//! Cursor-based read/write helpers for the big-endian wire format.

use super::CodecError;

/// Safe buffer slice read helper - returns error instead of panicking.
#[inline]
pub fn read_slice(buffer: &[u8], start: usize, len: usize) -> Result<&[u8], CodecError> {
    let buf_len = buffer.len();
    let end = start.checked_add(len).ok_or(CodecError::BufferTooSmall {
        needed: usize::MAX,
        available: buf_len,
    })?;
    buffer.get(start..end).ok_or(CodecError::BufferTooSmall {
        needed: end,
        available: buf_len,
    })
}

/// Safe buffer slice write helper.
#[inline]
pub fn write_slice(buffer: &mut [u8], start: usize, data: &[u8]) -> Result<(), CodecError> {
    let end = start + data.len();
    let len = buffer.len();
    buffer
        .get_mut(start..end)
        .ok_or(CodecError::BufferTooSmall {
            needed: end,
            available: len,
        })?
        .copy_from_slice(data);
    Ok(())
}

/// Read cursor over a serialized value.
///
/// Every read is bounds-checked against the slice it was created from, which is the
/// `len` prefix of a buffer, never its capacity.
#[derive(Debug)]
pub struct Reader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

macro_rules! read_be {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Read a big-endian `", stringify!($ty), "`.")]
            pub fn $name(&mut self) -> Result<$ty, CodecError> {
                let bytes = self.read_array::<{ size_of::<$ty>() }>()?;
                Ok(<$ty>::from_be_bytes(bytes))
            }
        )*
    };
}

impl<'a> Reader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Number of bytes left before the end of the value buffer.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    /// Read `len` raw bytes and advance the cursor.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let slice = read_slice(self.buffer, self.offset, len)?;
        self.offset += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    read_be! {
        read_u8 => u8,
        read_i8 => i8,
        read_u16 => u16,
        read_i16 => i16,
        read_u32 => u32,
        read_i32 => i32,
        read_u64 => u64,
        read_i64 => i64,
        read_f32 => f32,
        read_f64 => f64,
    }

    /// Read an i32 length/count prefix, rejecting negative values.
    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| CodecError::NegativeLength(len))
    }

    /// Fail unless every byte of the buffer was consumed.
    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

/// Write cursor over a pre-sized buffer.
///
/// The buffer is sized from `allocation_size` before writing; running out of room
/// means the size computation and the writer disagree.
#[derive(Debug)]
pub struct Writer<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

macro_rules! write_be {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Write a big-endian `", stringify!($ty), "`.")]
            pub fn $name(&mut self, value: $ty) -> Result<(), CodecError> {
                self.write_bytes(&value.to_be_bytes())
            }
        )*
    };
}

impl<'a> Writer<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), CodecError> {
        write_slice(self.buffer, self.offset, data)?;
        self.offset += data.len();
        Ok(())
    }

    write_be! {
        write_u8 => u8,
        write_i8 => i8,
        write_u16 => u16,
        write_i16 => i16,
        write_u32 => u32,
        write_i32 => i32,
        write_u64 => u64,
        write_i64 => i64,
        write_f32 => f32,
        write_f64 => f64,
    }

    /// Write an i32 length/count prefix.
    pub fn write_len(&mut self, len: usize) -> Result<(), CodecError> {
        let prefix = i32::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
        self.write_i32(prefix)
    }
}
