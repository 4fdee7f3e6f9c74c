//! How Rust return values cross the boundary.
//!
//! Scalars travel in registers as themselves, `bool` as `i8`, object handles as
//! `u64`; everything compound is lowered into a [`CoreBuffer`].

use std::collections::HashMap;

use crate::buffer::CoreBuffer;
use crate::codec::Lower;
use crate::handle::Handle;

/// A Rust value that can be returned across the boundary.
pub trait LowerReturn: Sized {
    /// The type actually returned by the exported function.
    type ReturnType;

    fn lower_return(self) -> Result<Self::ReturnType, crate::Error>;

    /// Placeholder returned alongside a non-OK status. Never interpreted.
    fn ffi_default() -> Self::ReturnType;
}

macro_rules! scalar_return {
    ($($ty:ty => $default:expr),* $(,)?) => {
        $(
            impl LowerReturn for $ty {
                type ReturnType = $ty;

                fn lower_return(self) -> Result<$ty, crate::Error> {
                    Ok(self)
                }

                fn ffi_default() -> $ty {
                    $default
                }
            }
        )*
    };
}

scalar_return! {
    u8 => 0, i8 => 0, u16 => 0, i16 => 0, u32 => 0, i32 => 0,
    u64 => 0, i64 => 0, f32 => 0.0, f64 => 0.0,
}

impl LowerReturn for () {
    type ReturnType = ();

    fn lower_return(self) -> Result<(), crate::Error> {
        Ok(())
    }

    fn ffi_default() {}
}

impl LowerReturn for bool {
    type ReturnType = i8;

    fn lower_return(self) -> Result<i8, crate::Error> {
        Ok(i8::from(self))
    }

    fn ffi_default() -> i8 {
        0
    }
}

impl LowerReturn for Handle {
    type ReturnType = u64;

    fn lower_return(self) -> Result<u64, crate::Error> {
        Ok(self.as_raw())
    }

    fn ffi_default() -> u64 {
        Handle::NULL.as_raw()
    }
}

// Already lowered.
impl LowerReturn for CoreBuffer {
    type ReturnType = CoreBuffer;

    fn lower_return(self) -> Result<CoreBuffer, crate::Error> {
        Ok(self)
    }

    fn ffi_default() -> CoreBuffer {
        CoreBuffer::new()
    }
}

/// Return any [`Lower`] value (records, enums, user types) in a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffered<T>(pub T);

macro_rules! buffered_return {
    ($([$($generics:tt)*] $ty:ty),* $(,)?) => {
        $(
            impl<$($generics)*> LowerReturn for $ty {
                type ReturnType = CoreBuffer;

                fn lower_return(self) -> Result<CoreBuffer, crate::Error> {
                    CoreBuffer::lower(&self)
                }

                fn ffi_default() -> CoreBuffer {
                    CoreBuffer::new()
                }
            }
        )*
    };
}

buffered_return! {
    [] String,
    [T: Lower] Vec<T>,
    [T: Lower] Option<T>,
    [K: Lower, V: Lower, S] HashMap<K, V, S>,
    [] std::time::Duration,
    [] std::time::SystemTime,
}

impl<T: Lower> LowerReturn for Buffered<T> {
    type ReturnType = CoreBuffer;

    fn lower_return(self) -> Result<CoreBuffer, crate::Error> {
        CoreBuffer::lower(&self.0)
    }

    fn ffi_default() -> CoreBuffer {
        CoreBuffer::new()
    }
}
