//! Load-time integrity checks against the exported contract symbols.

mod common;

use common::*;
use ffi_contract::contract::{
    BindingContract, DeclaredContract, ExportedContract, IntegrityConfig, IntegrityError,
    LibraryGuard,
};

fn exported() -> ExportedContract {
    ExportedContract::new(demo_contract_version)
        .with_checksum("demo_add", demo_checksum_add)
        .with_checksum("demo_lookup", demo_checksum_lookup)
        .with_checksum("demo_delayed_echo", demo_checksum_delayed_echo)
}

#[test]
fn test_matching_contract_passes() -> Result<(), anyhow::Error> {
    bindings().verify(&exported(), &IntegrityConfig::default())?;
    Ok(())
}

#[test]
fn test_exported_and_declared_agree() {
    let declared = DeclaredContract::new(CONTRACT_VERSION, signatures());
    assert!(bindings().verify(&declared, &IntegrityConfig::default()).is_ok());
    assert_eq!(
        declared.signature("demo_lookup").map(|s| s.checksum()),
        Some(demo_checksum_lookup())
    );
    assert_eq!(
        add_signature().to_string(),
        "fn demo_add(a: i32, b: i32) -> i32"
    );
}

#[test]
fn test_newer_bindings_against_older_core_fail() {
    let bindings = BindingContract::from_signatures(CONTRACT_VERSION + 1, &signatures());
    let err = bindings
        .verify(&exported(), &IntegrityConfig::default())
        .unwrap_err();
    assert_eq!(
        err,
        IntegrityError::VersionMismatch {
            expected: CONTRACT_VERSION + 1,
            found: CONTRACT_VERSION,
        }
    );
}

#[test]
fn test_changed_signature_fails_checksum() {
    let changed = add_signature().arg("c", ffi_contract::TypeDesc::I32);
    let bindings = BindingContract::from_signatures(
        CONTRACT_VERSION,
        [&changed, &lookup_signature(), &delayed_echo_signature()],
    );
    match bindings.verify(&exported(), &IntegrityConfig::default()) {
        Err(IntegrityError::ChecksumMismatch {
            function,
            expected,
            found,
        }) => {
            assert_eq!(function, "demo_add");
            assert_eq!(expected, changed.checksum());
            assert_eq!(found, add_signature().checksum());
        }
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
}

#[test]
fn test_omit_checksums_still_checks_version() {
    let changed = add_signature().returns(ffi_contract::TypeDesc::I64);
    let skip = IntegrityConfig {
        omit_checksums: true,
    };

    let same_version = BindingContract::from_signatures(CONTRACT_VERSION, [&changed]);
    assert!(same_version.verify(&exported(), &skip).is_ok());

    let other_version = BindingContract::from_signatures(CONTRACT_VERSION + 1, [&changed]);
    assert!(matches!(
        other_version.verify(&exported(), &skip),
        Err(IntegrityError::VersionMismatch { .. })
    ));
}

#[test]
fn test_missing_symbol_fails() {
    let bindings = bindings().with_checksum("demo_removed", 1234);
    assert_eq!(
        bindings.verify(&exported(), &IntegrityConfig::default()),
        Err(IntegrityError::MissingChecksum {
            function: "demo_removed".to_string(),
        })
    );
}

#[test]
fn test_guard_caches_failure() {
    let guard = LibraryGuard::new(
        BindingContract::new(CONTRACT_VERSION + 1),
        IntegrityConfig::default(),
    );
    assert_eq!(guard.checked(), None);
    assert!(guard.ensure(&exported()).is_err());
    assert_eq!(guard.checked(), Some(false));

    // Even a matching core is not re-checked once the library failed.
    let declared = DeclaredContract::new(CONTRACT_VERSION + 1, Vec::new());
    assert!(guard.ensure(&declared).is_err());
}

#[test]
fn test_guard_passes_once() {
    let guard = LibraryGuard::new(bindings(), IntegrityConfig::default());
    assert!(guard.ensure(&exported()).is_ok());
    assert!(guard.ensure(&exported()).is_ok());
    assert_eq!(guard.checked(), Some(true));
}
