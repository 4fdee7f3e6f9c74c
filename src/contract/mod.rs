//! Load-time integrity between generated callers and the native core.
//!
//! The core exports a contract-version query and one checksum query per
//! function. A caller compares them against the constants it was generated
//! with, once, before its first functional call (see [`LibraryGuard`]). Any
//! mismatch is fatal.

mod integrity;
mod signature;

pub use integrity::{
    BindingContract, DeclaredContract, ExportedContract, IntegrityConfig, IntegrityError,
    LibraryGuard, NativeContract,
};
pub use signature::FunctionSignature;

/// 16-bit checksum of a canonical signature text: CRC-32 folded in half.
pub fn checksum(canonical: &str) -> u16 {
    let crc = crc32fast::hash(canonical.as_bytes());
    (crc ^ (crc >> 16)) as u16
}

/// Export the integrity queries of a native core as C symbols.
///
/// ```ignore
/// ffi_contract::export_integrity! {
///     version mylib_contract_version = 3;
///     checksum mylib_checksum_add = FunctionSignature::new("add").arg("a", TypeDesc::I32);
/// }
/// ```
#[macro_export]
macro_rules! export_integrity {
    (
        version $version_symbol:ident = $version:expr;
        $(checksum $checksum_symbol:ident = $signature:expr;)*
    ) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn $version_symbol() -> u32 {
            $version
        }

        $(
            #[unsafe(no_mangle)]
            pub extern "C" fn $checksum_symbol() -> u16 {
                $crate::contract::FunctionSignature::checksum(&$signature)
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable() {
        // Pinned: changing the fold breaks every deployed binding.
        assert_eq!(checksum("fn ping()"), 49433);
        assert_eq!(checksum("fn add(a: i32, b: i32) -> i32"), 3700);
        assert_ne!(checksum("fn ping()"), checksum("fn pong()"));
    }
}
