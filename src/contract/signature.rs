//! Canonical function signatures.

use std::fmt;

use crate::codec::TypeDesc;

/// A declared native function as both sides of the boundary see it.
///
/// The [`Display`](fmt::Display) form is canonical: it is what the checksum is
/// computed over, so any change to a name, a type, the error type, or the
/// async flag changes the checksum.
///
/// ```
/// use ffi_contract::codec::TypeDesc;
/// use ffi_contract::contract::FunctionSignature;
///
/// let add = FunctionSignature::new("add")
///     .arg("a", TypeDesc::I32)
///     .arg("b", TypeDesc::I32)
///     .returns(TypeDesc::I32);
/// assert_eq!(add.to_string(), "fn add(a: i32, b: i32) -> i32");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub args: Vec<(String, TypeDesc)>,
    pub returns: Option<TypeDesc>,
    pub throws: Option<TypeDesc>,
    pub is_async: bool,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            returns: None,
            throws: None,
            is_async: false,
        }
    }

    pub fn arg(mut self, name: impl Into<String>, ty: TypeDesc) -> Self {
        self.args.push((name.into(), ty));
        self
    }

    pub fn returns(mut self, ty: TypeDesc) -> Self {
        self.returns = Some(ty);
        self
    }

    pub fn throws(mut self, ty: TypeDesc) -> Self {
        self.throws = Some(ty);
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Checksum of the canonical text.
    pub fn checksum(&self) -> u16 {
        super::checksum(&self.to_string())
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_async {
            f.write_str("async ")?;
        }
        write!(f, "fn {}(", self.name)?;
        for (i, (name, ty)) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {ty}")?;
        }
        f.write_str(")")?;
        if let Some(ty) = &self.returns {
            write!(f, " -> {ty}")?;
        }
        if let Some(ty) = &self.throws {
            write!(f, " throws {ty}")?;
        }
        Ok(())
    }
}
