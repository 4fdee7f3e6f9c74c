//! Descriptor-driven lifting of [`Value`] trees.

use std::time::{Duration, SystemTime};

use super::buffer::Reader;
use super::traits::{read_discriminant, Lift};
use super::value::{FieldDesc, TypeDesc, Value};
use super::{CodecError, ValueCodec};
use crate::handle::Handle;

impl ValueCodec {
    /// Lift a value from the start of `buffer`.
    ///
    /// Returns the value and the number of bytes consumed. Use
    /// [`ValueCodec::lift_exact`] when the buffer holds exactly one value.
    pub fn lift(&self, buffer: &[u8], ty: &TypeDesc) -> Result<(Value, usize), CodecError> {
        let mut reader = Reader::new(buffer);
        let value = self.read_value(ty, &mut reader)?;
        Ok((value, reader.position()))
    }

    /// Lift a value that must occupy the whole buffer.
    pub fn lift_exact(&self, buffer: &[u8], ty: &TypeDesc) -> Result<Value, CodecError> {
        let mut reader = Reader::new(buffer);
        let value = self.read_value(ty, &mut reader)?;
        reader.finish()?;
        Ok(value)
    }

    /// Read a value at the reader's cursor.
    pub(crate) fn read_value(
        &self,
        ty: &TypeDesc,
        reader: &mut Reader<'_>,
    ) -> Result<Value, CodecError> {
        let value = match ty {
            TypeDesc::Bool => Value::Bool(bool::read(reader)?),
            TypeDesc::U8 => Value::U8(reader.read_u8()?),
            TypeDesc::I8 => Value::I8(reader.read_i8()?),
            TypeDesc::U16 => Value::U16(reader.read_u16()?),
            TypeDesc::I16 => Value::I16(reader.read_i16()?),
            TypeDesc::U32 => Value::U32(reader.read_u32()?),
            TypeDesc::I32 => Value::I32(reader.read_i32()?),
            TypeDesc::U64 => Value::U64(reader.read_u64()?),
            TypeDesc::I64 => Value::I64(reader.read_i64()?),
            TypeDesc::F32 => Value::F32(reader.read_f32()?),
            TypeDesc::F64 => Value::F64(reader.read_f64()?),
            TypeDesc::String => Value::String(String::read(reader)?),
            TypeDesc::Bytes => {
                let len = reader.read_len()?;
                Value::Bytes(reader.read_bytes(len)?.to_vec())
            }
            TypeDesc::Timestamp => Value::Timestamp(SystemTime::read(reader)?),
            TypeDesc::Duration => Value::Duration(Duration::read(reader)?),
            TypeDesc::Object(_) => Value::Object(Handle::read(reader)?),
            TypeDesc::Optional(inner) => match reader.read_u8()? {
                0 => Value::Optional(None),
                1 => Value::some(self.read_value(inner, reader)?),
                other => return Err(CodecError::InvalidOptionTag(other)),
            },
            TypeDesc::Sequence(inner) => {
                let count = reader.read_len()?;
                let mut items = Vec::with_capacity(count.min(reader.remaining()));
                for _ in 0..count {
                    items.push(self.read_value(inner, reader)?);
                }
                Value::Sequence(items)
            }
            TypeDesc::Map(key_ty, value_ty) => {
                let count = reader.read_len()?;
                let mut entries = Vec::with_capacity(count.min(reader.remaining()));
                for _ in 0..count {
                    let key = self.read_value(key_ty, reader)?;
                    let value = self.read_value(value_ty, reader)?;
                    entries.push((key, value));
                }
                Value::Map(entries)
            }
            TypeDesc::Record(desc) => Value::Record(self.read_fields(&desc.fields, reader)?),
            TypeDesc::Enum(desc) => {
                let index = read_discriminant(reader, &desc.name, desc.variants.len())?;
                let variant = desc.variants.get(index).ok_or_else(|| {
                    CodecError::InvalidDiscriminant {
                        type_name: desc.name.clone(),
                        discriminant: i32::try_from(index).unwrap_or(i32::MAX),
                        num_cases: desc.variants.len(),
                    }
                })?;
                Value::Enum {
                    variant: variant.name.clone(),
                    fields: self.read_fields(&variant.fields, reader)?,
                }
            }
        };
        Ok(value)
    }

    fn read_fields(
        &self,
        decls: &[FieldDesc],
        reader: &mut Reader<'_>,
    ) -> Result<Vec<(String, Value)>, CodecError> {
        decls
            .iter()
            .map(|decl| Ok((decl.name.clone(), self.read_value(&decl.ty, reader)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::{EnumDesc, RecordDesc, VariantDesc};

    fn shape() -> TypeDesc {
        TypeDesc::Enum(EnumDesc::new(
            "shape",
            vec![
                VariantDesc::unit("empty"),
                VariantDesc::new(
                    "rect",
                    vec![
                        FieldDesc::new("w", TypeDesc::U16),
                        FieldDesc::new("h", TypeDesc::U16),
                    ],
                ),
            ],
        ))
    }

    #[test]
    fn test_lift_enum_with_payload() {
        let bytes = [0, 0, 0, 2, 0, 3, 0, 4];
        let (value, size) = ValueCodec.lift(&bytes, &shape()).unwrap();
        assert_eq!(size, 8);
        assert_eq!(
            value,
            Value::Enum {
                variant: "rect".to_string(),
                fields: vec![
                    ("w".to_string(), Value::U16(3)),
                    ("h".to_string(), Value::U16(4)),
                ],
            }
        );
    }

    #[test]
    fn test_lift_enum_bad_discriminant() {
        let bytes = [0, 0, 0, 3];
        assert!(matches!(
            ValueCodec.lift(&bytes, &shape()),
            Err(CodecError::InvalidDiscriminant { discriminant: 3, num_cases: 2, .. })
        ));
    }

    #[test]
    fn test_lift_exact_rejects_trailing_bytes() {
        let bytes = [0, 0, 0, 7, 0xff];
        assert_eq!(
            ValueCodec.lift_exact(&bytes, &TypeDesc::U32).unwrap_err(),
            CodecError::TrailingBytes(1)
        );
        let (value, size) = ValueCodec.lift(&bytes, &TypeDesc::U32).unwrap();
        assert_eq!((value, size), (Value::U32(7), 4));
    }

    #[test]
    fn test_lift_truncated_record() {
        let ty = TypeDesc::Record(RecordDesc::new(
            "pair",
            vec![
                FieldDesc::new("a", TypeDesc::U32),
                FieldDesc::new("b", TypeDesc::String),
            ],
        ));
        let bytes = [0, 0, 0, 1, 0, 0, 0, 5, b'h', b'i'];
        let err = ValueCodec.lift(&bytes, &ty).unwrap_err();
        assert!(err.is_bounds());
    }
}
