//! The integrity preamble run once per loaded library.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use thiserror::Error;

use super::FunctionSignature;
use crate::logging::{error, info, warn};

/// Build or configuration skew between the caller and the native core.
///
/// Always fatal: the library must not be used after one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Contract version mismatch: bindings expect {expected}, native core reports {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Checksum mismatch for '{function}': bindings expect {expected:#06x}, native core reports {found:#06x}")]
    ChecksumMismatch {
        function: String,
        expected: u16,
        found: u16,
    },

    #[error("Native core does not export a checksum for '{function}'")]
    MissingChecksum { function: String },
}

/// Integrity settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct IntegrityConfig {
    /// Skip the per-function checksum comparison for a faster cold start. The
    /// contract version is still checked.
    pub omit_checksums: bool,
}

/// The integrity scalars a native core reports at runtime.
pub trait NativeContract {
    fn contract_version(&self) -> u32;

    /// Checksum the core computed for `function`, if it exports one.
    fn checksum(&self, function: &str) -> Option<u16>;
}

/// What the caller was generated against: a contract version and one checksum
/// per exposed function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingContract {
    version: u32,
    checksums: BTreeMap<String, u16>,
}

impl BindingContract {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            checksums: BTreeMap::new(),
        }
    }

    pub fn from_signatures<'a>(
        version: u32,
        signatures: impl IntoIterator<Item = &'a FunctionSignature>,
    ) -> Self {
        signatures
            .into_iter()
            .fold(Self::new(version), |contract, signature| {
                contract.with_checksum(&signature.name, signature.checksum())
            })
    }

    pub fn with_checksum(mut self, function: impl Into<String>, checksum: u16) -> Self {
        self.checksums.insert(function.into(), checksum);
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn checksums(&self) -> impl Iterator<Item = (&str, u16)> {
        self.checksums.iter().map(|(name, sum)| (name.as_str(), *sum))
    }

    /// Compare against the values a native core reports.
    pub fn verify(
        &self,
        native: &dyn NativeContract,
        config: &IntegrityConfig,
    ) -> Result<(), IntegrityError> {
        let found = native.contract_version();
        if found != self.version {
            error!(expected = self.version, found, "contract version mismatch");
            return Err(IntegrityError::VersionMismatch {
                expected: self.version,
                found,
            });
        }

        if config.omit_checksums {
            warn!("checksum verification skipped by configuration");
            return Ok(());
        }

        for (function, &expected) in &self.checksums {
            match native.checksum(function) {
                Some(found) if found == expected => {}
                Some(found) => {
                    error!(function = %function, expected, found, "checksum mismatch");
                    return Err(IntegrityError::ChecksumMismatch {
                        function: function.clone(),
                        expected,
                        found,
                    });
                }
                None => {
                    return Err(IntegrityError::MissingChecksum {
                        function: function.clone(),
                    });
                }
            }
        }

        info!(
            version = self.version,
            functions = self.checksums.len(),
            "native core passed integrity checks"
        );
        Ok(())
    }
}

/// The core's own view of its contract, built from its declared signatures.
#[derive(Debug, Clone, Default)]
pub struct DeclaredContract {
    version: u32,
    signatures: BTreeMap<String, FunctionSignature>,
}

impl DeclaredContract {
    pub fn new(version: u32, signatures: impl IntoIterator<Item = FunctionSignature>) -> Self {
        Self {
            version,
            signatures: signatures
                .into_iter()
                .map(|signature| (signature.name.clone(), signature))
                .collect(),
        }
    }

    pub fn signature(&self, function: &str) -> Option<&FunctionSignature> {
        self.signatures.get(function)
    }
}

impl NativeContract for DeclaredContract {
    fn contract_version(&self) -> u32 {
        self.version
    }

    fn checksum(&self, function: &str) -> Option<u16> {
        self.signatures.get(function).map(FunctionSignature::checksum)
    }
}

/// Integrity queries resolved as exported symbols of a loaded library.
#[derive(Debug, Clone)]
pub struct ExportedContract {
    version: extern "C" fn() -> u32,
    checksums: BTreeMap<String, extern "C" fn() -> u16>,
}

impl ExportedContract {
    pub fn new(version: extern "C" fn() -> u32) -> Self {
        Self {
            version,
            checksums: BTreeMap::new(),
        }
    }

    pub fn with_checksum(mut self, function: impl Into<String>, query: extern "C" fn() -> u16) -> Self {
        self.checksums.insert(function.into(), query);
        self
    }
}

impl NativeContract for ExportedContract {
    fn contract_version(&self) -> u32 {
        (self.version)()
    }

    fn checksum(&self, function: &str) -> Option<u16> {
        self.checksums.get(function).map(|query| query())
    }
}

/// Runs the integrity preamble at most once and remembers the outcome.
///
/// One guard belongs to one loaded library. Every functional call goes through
/// [`LibraryGuard::ensure`] first; after the first check, later calls observe
/// the cached result, including a cached failure.
#[derive(Debug)]
pub struct LibraryGuard {
    bindings: BindingContract,
    config: IntegrityConfig,
    outcome: OnceCell<Result<(), IntegrityError>>,
}

impl LibraryGuard {
    pub fn new(bindings: BindingContract, config: IntegrityConfig) -> Self {
        Self {
            bindings,
            config,
            outcome: OnceCell::new(),
        }
    }

    /// Verify `native` on first use; return the cached outcome afterwards.
    pub fn ensure(&self, native: &dyn NativeContract) -> Result<(), IntegrityError> {
        self.outcome
            .get_or_init(|| self.bindings.verify(native, &self.config))
            .clone()
    }

    /// Whether the check has run, and if so whether it passed.
    pub fn checked(&self) -> Option<bool> {
        self.outcome.get().map(Result::is_ok)
    }
}
