//! Library-level logging.
//!
//! With the `logging` feature the macros below forward to `tracing`. Without it
//! they expand to an `if false` block that only borrows the field values, so
//! nothing is evaluated and bindings used only for logging stay "used". The
//! library never installs a subscriber itself (see `subscriber` for a helper).
//!
//! ```rust,ignore
//! use crate::logging::{debug, trace};
//!
//! trace!(table = self.name, handle = raw, "handle inserted");
//! debug!(code = status.code, "call returned an error");
//! ```

/// Borrows every value in a `tracing` field list, message arguments included.
#[cfg(not(feature = "logging"))]
macro_rules! ffi_discard {
    () => {};
    ($message:literal $(, $arg:expr)* $(,)?) => {
        $(let _ = &$arg;)*
    };
    ($field:ident = % $value:expr $(, $($rest:tt)*)?) => {
        let _ = &$value;
        $($crate::logging::ffi_discard!($($rest)*);)?
    };
    ($field:ident = ? $value:expr $(, $($rest:tt)*)?) => {
        let _ = &$value;
        $($crate::logging::ffi_discard!($($rest)*);)?
    };
    ($field:ident = $value:expr $(, $($rest:tt)*)?) => {
        let _ = &$value;
        $($crate::logging::ffi_discard!($($rest)*);)?
    };
    (% $field:ident $(, $($rest:tt)*)?) => {
        let _ = &$field;
        $($crate::logging::ffi_discard!($($rest)*);)?
    };
    (? $field:ident $(, $($rest:tt)*)?) => {
        let _ = &$field;
        $($crate::logging::ffi_discard!($($rest)*);)?
    };
    ($field:ident $(, $($rest:tt)*)?) => {
        let _ = &$field;
        $($crate::logging::ffi_discard!($($rest)*);)?
    };
}

#[cfg(feature = "logging")]
macro_rules! ffi_trace {
    ($($arg:tt)*) => { tracing::trace!(target: "ffi_contract", $($arg)*) }
}
#[cfg(not(feature = "logging"))]
macro_rules! ffi_trace {
    ($($arg:tt)*) => {
        if false {
            $crate::logging::ffi_discard!($($arg)*);
        }
    };
}

#[cfg(feature = "logging")]
macro_rules! ffi_debug {
    ($($arg:tt)*) => { tracing::debug!(target: "ffi_contract", $($arg)*) }
}
#[cfg(not(feature = "logging"))]
macro_rules! ffi_debug {
    ($($arg:tt)*) => {
        if false {
            $crate::logging::ffi_discard!($($arg)*);
        }
    };
}

#[cfg(feature = "logging")]
macro_rules! ffi_info {
    ($($arg:tt)*) => { tracing::info!(target: "ffi_contract", $($arg)*) }
}
#[cfg(not(feature = "logging"))]
macro_rules! ffi_info {
    ($($arg:tt)*) => {
        if false {
            $crate::logging::ffi_discard!($($arg)*);
        }
    };
}

#[cfg(feature = "logging")]
macro_rules! ffi_warn {
    ($($arg:tt)*) => { tracing::warn!(target: "ffi_contract", $($arg)*) }
}
#[cfg(not(feature = "logging"))]
macro_rules! ffi_warn {
    ($($arg:tt)*) => {
        if false {
            $crate::logging::ffi_discard!($($arg)*);
        }
    };
}

// Panics and integrity failures always go here before being folded into a status.
#[cfg(feature = "logging")]
macro_rules! ffi_error {
    ($($arg:tt)*) => { tracing::error!(target: "ffi_contract", $($arg)*) }
}
#[cfg(not(feature = "logging"))]
macro_rules! ffi_error {
    ($($arg:tt)*) => {
        if false {
            $crate::logging::ffi_discard!($($arg)*);
        }
    };
}

#[cfg(not(feature = "logging"))]
pub(crate) use ffi_discard;
pub(crate) use ffi_debug as debug;
pub(crate) use ffi_error as error;
pub(crate) use ffi_info as info;
pub(crate) use ffi_trace as trace;
pub(crate) use ffi_warn as warn;

#[cfg(test)]
mod tests {
    use super::{debug, error, info, trace, warn};

    #[test]
    fn test_macros_accept_field_forms() {
        let handle = 3u64;
        let result: Result<u8, std::fmt::Error> = Err(std::fmt::Error);
        match result {
            Ok(value) => trace!(value, "ok"),
            Err(e) => error!(error = %e, "failed"),
        }
        debug!(handle, detail = ?handle, "with {} args", handle);
        info!("plain");
        warn!(count = 2, "counted");
    }
}
