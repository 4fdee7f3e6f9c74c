//! Exported poll/complete/cancel/free entry points, one set per FFI return type.

use once_cell::sync::Lazy;

use super::ContinuationCallback;
use super::native::FutureRegistry;
use crate::buffer::CoreBuffer;
use crate::call::CallStatus;
use crate::handle::Handle;

/// The four async entry points for one return type, as function pointers.
#[derive(Debug)]
pub struct FutureSymbols<R> {
    pub poll: extern "C" fn(u64, ContinuationCallback, u64),
    pub complete: extern "C" fn(u64, &mut CallStatus) -> R,
    pub cancel: extern "C" fn(u64),
    pub free: extern "C" fn(u64),
}

impl<R> Clone for FutureSymbols<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for FutureSymbols<R> {}

/// An FFI return type that async calls can complete with.
pub trait FutureReturn: Default + Sized + 'static {
    /// The registry holding futures that complete with this type.
    fn registry() -> &'static FutureRegistry<Self>;

    /// The exported entry points for this type.
    fn symbols() -> FutureSymbols<Self>;
}

macro_rules! future_entry_points {
    ($($ty:ty => $registry:ident, $poll:ident, $complete:ident, $cancel:ident, $free:ident;)*) => {
        $(
            static $registry: Lazy<FutureRegistry<$ty>> =
                Lazy::new(|| FutureRegistry::new(stringify!($registry)));

            #[unsafe(no_mangle)]
            pub extern "C" fn $poll(handle: u64, callback: ContinuationCallback, data: u64) {
                $registry.poll(Handle::from_raw(handle), callback, data)
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn $complete(handle: u64, status: &mut CallStatus) -> $ty {
                $registry.complete(Handle::from_raw(handle), status)
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn $cancel(handle: u64) {
                $registry.cancel(Handle::from_raw(handle))
            }

            #[unsafe(no_mangle)]
            pub extern "C" fn $free(handle: u64) {
                $registry.free(Handle::from_raw(handle))
            }

            impl FutureReturn for $ty {
                fn registry() -> &'static FutureRegistry<Self> {
                    &$registry
                }

                fn symbols() -> FutureSymbols<Self> {
                    FutureSymbols {
                        poll: $poll,
                        complete: $complete,
                        cancel: $cancel,
                        free: $free,
                    }
                }
            }
        )*
    };
}

future_entry_points! {
    u8 => FUTURES_U8, ffi_contract_future_poll_u8, ffi_contract_future_complete_u8,
        ffi_contract_future_cancel_u8, ffi_contract_future_free_u8;
    i8 => FUTURES_I8, ffi_contract_future_poll_i8, ffi_contract_future_complete_i8,
        ffi_contract_future_cancel_i8, ffi_contract_future_free_i8;
    u16 => FUTURES_U16, ffi_contract_future_poll_u16, ffi_contract_future_complete_u16,
        ffi_contract_future_cancel_u16, ffi_contract_future_free_u16;
    i16 => FUTURES_I16, ffi_contract_future_poll_i16, ffi_contract_future_complete_i16,
        ffi_contract_future_cancel_i16, ffi_contract_future_free_i16;
    u32 => FUTURES_U32, ffi_contract_future_poll_u32, ffi_contract_future_complete_u32,
        ffi_contract_future_cancel_u32, ffi_contract_future_free_u32;
    i32 => FUTURES_I32, ffi_contract_future_poll_i32, ffi_contract_future_complete_i32,
        ffi_contract_future_cancel_i32, ffi_contract_future_free_i32;
    u64 => FUTURES_U64, ffi_contract_future_poll_u64, ffi_contract_future_complete_u64,
        ffi_contract_future_cancel_u64, ffi_contract_future_free_u64;
    i64 => FUTURES_I64, ffi_contract_future_poll_i64, ffi_contract_future_complete_i64,
        ffi_contract_future_cancel_i64, ffi_contract_future_free_i64;
    f32 => FUTURES_F32, ffi_contract_future_poll_f32, ffi_contract_future_complete_f32,
        ffi_contract_future_cancel_f32, ffi_contract_future_free_f32;
    f64 => FUTURES_F64, ffi_contract_future_poll_f64, ffi_contract_future_complete_f64,
        ffi_contract_future_cancel_f64, ffi_contract_future_free_f64;
    CoreBuffer => FUTURES_BUFFER, ffi_contract_future_poll_buffer,
        ffi_contract_future_complete_buffer, ffi_contract_future_cancel_buffer,
        ffi_contract_future_free_buffer;
    () => FUTURES_VOID, ffi_contract_future_poll_void, ffi_contract_future_complete_void,
        ffi_contract_future_cancel_void, ffi_contract_future_free_void;
}
