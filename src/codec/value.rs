//! Dynamic values and the type descriptors that drive their encoding.
//!
//! The interface compiler hands the runtime its type layouts as [`TypeDesc`]
//! trees; [`Value`] is the matching schema-less value representation.

use std::fmt;
use std::time::{Duration, SystemTime};

use crate::handle::Handle;

/// Type descriptor for any value that can cross the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Timestamp,
    Duration,
    /// Handle to an object of the named type.
    Object(String),
    Optional(Box<TypeDesc>),
    Sequence(Box<TypeDesc>),
    Map(Box<TypeDesc>, Box<TypeDesc>),
    Record(RecordDesc),
    Enum(EnumDesc),
}

/// A fixed-field record. Fields are encoded in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordDesc {
    pub name: String,
    pub fields: Vec<FieldDesc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDesc {
    pub name: String,
    pub ty: TypeDesc,
}

/// A tagged union. Plain enums are the case where no variant has fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumDesc {
    pub name: String,
    pub variants: Vec<VariantDesc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantDesc {
    pub name: String,
    pub fields: Vec<FieldDesc>,
}

impl TypeDesc {
    pub fn optional(inner: TypeDesc) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn sequence(inner: TypeDesc) -> Self {
        Self::Sequence(Box::new(inner))
    }

    pub fn map(key: TypeDesc, value: TypeDesc) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// Returns `true` if values of this type pass as a scalar rather than in a buffer.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::U8
                | Self::I8
                | Self::U16
                | Self::I16
                | Self::U32
                | Self::I32
                | Self::U64
                | Self::I64
                | Self::F32
                | Self::F64
                | Self::Object(_)
        )
    }
}

impl FieldDesc {
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl RecordDesc {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDesc>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

impl VariantDesc {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDesc>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// A variant without payload.
    pub fn unit(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }
}

impl EnumDesc {
    pub fn new(name: impl Into<String>, variants: Vec<VariantDesc>) -> Self {
        Self {
            name: name.into(),
            variants,
        }
    }

    /// Index and descriptor of the variant with the given name.
    pub fn variant(&self, name: &str) -> Option<(usize, &VariantDesc)> {
        self.variants.iter().enumerate().find(|(_, v)| v.name == name)
    }
}

/// Canonical text of a type, used for signatures and checksums.
impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::U8 => f.write_str("u8"),
            Self::I8 => f.write_str("i8"),
            Self::U16 => f.write_str("u16"),
            Self::I16 => f.write_str("i16"),
            Self::U32 => f.write_str("u32"),
            Self::I32 => f.write_str("i32"),
            Self::U64 => f.write_str("u64"),
            Self::I64 => f.write_str("i64"),
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
            Self::String => f.write_str("string"),
            Self::Bytes => f.write_str("bytes"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Duration => f.write_str("duration"),
            Self::Object(name) => write!(f, "object<{}>", name),
            Self::Optional(inner) => write!(f, "option<{}>", inner),
            Self::Sequence(inner) => write!(f, "sequence<{}>", inner),
            Self::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            Self::Record(r) => {
                write!(f, "record {} {{", r.name)?;
                write_fields(f, &r.fields)?;
                f.write_str("}")
            }
            Self::Enum(e) => {
                write!(f, "enum {} {{", e.name)?;
                for (i, variant) in e.variants.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&variant.name)?;
                    if !variant.fields.is_empty() {
                        f.write_str("(")?;
                        write_fields(f, &variant.fields)?;
                        f.write_str(")")?;
                    }
                }
                f.write_str("}")
            }
        }
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[FieldDesc]) -> fmt::Result {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}: {}", field.name, field.ty)?;
    }
    Ok(())
}

/// A dynamically typed value matching some [`TypeDesc`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(SystemTime),
    Duration(Duration),
    Object(Handle),
    Optional(Option<Box<Value>>),
    Sequence(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// Field values in declaration order, paired with their names.
    Record(Vec<(String, Value)>),
    Enum {
        variant: String,
        fields: Vec<(String, Value)>,
    },
}

impl Value {
    /// Build a record value from `(name, value)` pairs.
    pub fn record<N: Into<String>>(fields: impl IntoIterator<Item = (N, Value)>) -> Self {
        Self::Record(fields.into_iter().map(|(n, v)| (n.into(), v)).collect())
    }

    /// A payload-free enum variant.
    pub fn unit_variant(variant: impl Into<String>) -> Self {
        Self::Enum {
            variant: variant.into(),
            fields: Vec::new(),
        }
    }

    pub fn some(inner: Value) -> Self {
        Self::Optional(Some(Box::new(inner)))
    }

    pub fn none() -> Self {
        Self::Optional(None)
    }

    /// Short name of the value's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::U8(_) => "u8",
            Self::I8(_) => "i8",
            Self::U16(_) => "u16",
            Self::I16(_) => "i16",
            Self::U32(_) => "u32",
            Self::I32(_) => "i32",
            Self::U64(_) => "u64",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Duration(_) => "duration",
            Self::Object(_) => "object",
            Self::Optional(_) => "option",
            Self::Sequence(_) => "sequence",
            Self::Map(_) => "map",
            Self::Record(_) => "record",
            Self::Enum { .. } => "enum",
        }
    }
}
