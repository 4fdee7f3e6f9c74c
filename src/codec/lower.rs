//! Descriptor-driven lowering of [`Value`] trees.

use super::buffer::Writer;
use super::traits::{write_discriminant, Lower};
use super::value::{EnumDesc, FieldDesc, RecordDesc, TypeDesc, Value, VariantDesc};
use super::{check_written, CodecError, ValueCodec};

fn mismatch(expected: &TypeDesc, got: &Value) -> CodecError {
    CodecError::TypeMismatch {
        expected: expected.to_string(),
        got: got.kind().to_string(),
    }
}

impl ValueCodec {
    /// Lower a value to bytes according to its type descriptor.
    ///
    /// The output is sized with [`ValueCodec::allocation_size`] up front and
    /// written in place; a size disagreement is reported as
    /// [`CodecError::SizeMismatch`].
    pub fn lower(&self, value: &Value, ty: &TypeDesc) -> Result<Vec<u8>, CodecError> {
        let size = self.allocation_size(value, ty)?;
        let len = usize::try_from(size).map_err(|_| CodecError::LengthOverflow(usize::MAX))?;
        let mut buffer = vec![0u8; len];
        let mut writer = Writer::new(&mut buffer);
        self.write_value(value, ty, &mut writer)?;
        check_written(size, writer.position())?;
        Ok(buffer)
    }

    /// Exact encoded size of `value`, also validating it against `ty`.
    pub fn allocation_size(&self, value: &Value, ty: &TypeDesc) -> Result<u64, CodecError> {
        let size = match (ty, value) {
            (TypeDesc::Bool, Value::Bool(_)) => 1,
            (TypeDesc::U8, Value::U8(_)) | (TypeDesc::I8, Value::I8(_)) => 1,
            (TypeDesc::U16, Value::U16(_)) | (TypeDesc::I16, Value::I16(_)) => 2,
            (TypeDesc::U32, Value::U32(_))
            | (TypeDesc::I32, Value::I32(_))
            | (TypeDesc::F32, Value::F32(_)) => 4,
            (TypeDesc::U64, Value::U64(_))
            | (TypeDesc::I64, Value::I64(_))
            | (TypeDesc::F64, Value::F64(_))
            | (TypeDesc::Object(_), Value::Object(_)) => 8,
            (TypeDesc::String, Value::String(s)) => s.allocation_size(),
            (TypeDesc::Bytes, Value::Bytes(b)) => b.allocation_size(),
            (TypeDesc::Timestamp, Value::Timestamp(t)) => t.allocation_size(),
            (TypeDesc::Duration, Value::Duration(d)) => d.allocation_size(),
            (TypeDesc::Optional(inner), Value::Optional(v)) => match v {
                None => 1,
                Some(v) => 1 + self.allocation_size(v, inner)?,
            },
            (TypeDesc::Sequence(inner), Value::Sequence(items)) => {
                let mut size = 4;
                for item in items {
                    size += self.allocation_size(item, inner)?;
                }
                size
            }
            (TypeDesc::Map(key_ty, value_ty), Value::Map(entries)) => {
                let mut size = 4;
                for (k, v) in entries {
                    size += self.allocation_size(k, key_ty)?;
                    size += self.allocation_size(v, value_ty)?;
                }
                size
            }
            (TypeDesc::Record(desc), Value::Record(fields)) => {
                self.fields_size(&desc.name, &desc.fields, fields)?
            }
            (TypeDesc::Enum(desc), Value::Enum { variant, fields }) => {
                let (_, variant_desc) = find_variant(desc, variant)?;
                4 + self.fields_size(&desc.name, &variant_desc.fields, fields)?
            }
            _ => return Err(mismatch(ty, value)),
        };
        Ok(size)
    }

    fn fields_size(
        &self,
        type_name: &str,
        decls: &[FieldDesc],
        fields: &[(String, Value)],
    ) -> Result<u64, CodecError> {
        check_field_names(type_name, decls, fields)?;
        let mut size = 0;
        for (decl, (_, value)) in decls.iter().zip(fields) {
            size += self.allocation_size(value, &decl.ty)?;
        }
        Ok(size)
    }

    /// Write a value at the writer's cursor.
    pub(crate) fn write_value(
        &self,
        value: &Value,
        ty: &TypeDesc,
        writer: &mut Writer<'_>,
    ) -> Result<(), CodecError> {
        match (ty, value) {
            (TypeDesc::Bool, Value::Bool(v)) => v.write(writer),
            (TypeDesc::U8, Value::U8(v)) => v.write(writer),
            (TypeDesc::I8, Value::I8(v)) => v.write(writer),
            (TypeDesc::U16, Value::U16(v)) => v.write(writer),
            (TypeDesc::I16, Value::I16(v)) => v.write(writer),
            (TypeDesc::U32, Value::U32(v)) => v.write(writer),
            (TypeDesc::I32, Value::I32(v)) => v.write(writer),
            (TypeDesc::U64, Value::U64(v)) => v.write(writer),
            (TypeDesc::I64, Value::I64(v)) => v.write(writer),
            (TypeDesc::F32, Value::F32(v)) => v.write(writer),
            (TypeDesc::F64, Value::F64(v)) => v.write(writer),
            (TypeDesc::String, Value::String(v)) => v.write(writer),
            (TypeDesc::Bytes, Value::Bytes(v)) => v.write(writer),
            (TypeDesc::Timestamp, Value::Timestamp(v)) => v.write(writer),
            (TypeDesc::Duration, Value::Duration(v)) => v.write(writer),
            (TypeDesc::Object(_), Value::Object(v)) => v.write(writer),
            (TypeDesc::Optional(inner), Value::Optional(v)) => match v {
                None => writer.write_u8(0),
                Some(v) => {
                    writer.write_u8(1)?;
                    self.write_value(v, inner, writer)
                }
            },
            (TypeDesc::Sequence(inner), Value::Sequence(items)) => {
                writer.write_len(items.len())?;
                items
                    .iter()
                    .try_for_each(|item| self.write_value(item, inner, writer))
            }
            (TypeDesc::Map(key_ty, value_ty), Value::Map(entries)) => {
                writer.write_len(entries.len())?;
                for (k, v) in entries {
                    self.write_value(k, key_ty, writer)?;
                    self.write_value(v, value_ty, writer)?;
                }
                Ok(())
            }
            (TypeDesc::Record(desc), Value::Record(fields)) => self.write_record(desc, fields, writer),
            (TypeDesc::Enum(desc), Value::Enum { variant, fields }) => {
                let (index, variant_desc) = find_variant(desc, variant)?;
                write_discriminant(writer, index)?;
                check_field_names(&desc.name, &variant_desc.fields, fields)?;
                for (decl, (_, value)) in variant_desc.fields.iter().zip(fields) {
                    self.write_value(value, &decl.ty, writer)?;
                }
                Ok(())
            }
            _ => Err(mismatch(ty, value)),
        }
    }

    fn write_record(
        &self,
        desc: &RecordDesc,
        fields: &[(String, Value)],
        writer: &mut Writer<'_>,
    ) -> Result<(), CodecError> {
        check_field_names(&desc.name, &desc.fields, fields)?;
        for (decl, (_, value)) in desc.fields.iter().zip(fields) {
            self.write_value(value, &decl.ty, writer)?;
        }
        Ok(())
    }
}

fn find_variant<'d>(
    desc: &'d EnumDesc,
    name: &str,
) -> Result<(usize, &'d VariantDesc), CodecError> {
    desc.variant(name).ok_or_else(|| CodecError::UnknownMember {
        kind: "variant",
        name: name.to_string(),
        type_name: desc.name.clone(),
    })
}

/// Field values must be given in declaration order, one per declared field.
fn check_field_names(
    type_name: &str,
    decls: &[FieldDesc],
    fields: &[(String, Value)],
) -> Result<(), CodecError> {
    if decls.len() != fields.len() {
        return Err(CodecError::TypeMismatch {
            expected: format!("{} fields in {}", decls.len(), type_name),
            got: format!("{} fields", fields.len()),
        });
    }
    for (decl, (name, _)) in decls.iter().zip(fields) {
        if decl.name != *name {
            return Err(CodecError::UnknownMember {
                kind: "field",
                name: name.clone(),
                type_name: type_name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_record() {
        let ty = TypeDesc::Record(RecordDesc::new(
            "point",
            vec![
                FieldDesc::new("x", TypeDesc::U32),
                FieldDesc::new("y", TypeDesc::U32),
            ],
        ));
        let value = Value::record([("x", Value::U32(42)), ("y", Value::U32(100))]);
        let bytes = ValueCodec.lower(&value, &ty).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 42, 0, 0, 0, 100]);
    }

    #[test]
    fn test_lower_rejects_wrong_field_order() {
        let ty = TypeDesc::Record(RecordDesc::new(
            "point",
            vec![
                FieldDesc::new("x", TypeDesc::U32),
                FieldDesc::new("y", TypeDesc::U32),
            ],
        ));
        let value = Value::record([("y", Value::U32(1)), ("x", Value::U32(2))]);
        assert!(matches!(
            ValueCodec.lower(&value, &ty),
            Err(CodecError::UnknownMember { kind: "field", .. })
        ));
    }

    #[test]
    fn test_lower_type_mismatch() {
        let err = ValueCodec.lower(&Value::U8(1), &TypeDesc::String).unwrap_err();
        assert_eq!(
            err,
            CodecError::TypeMismatch {
                expected: "string".to_string(),
                got: "u8".to_string()
            }
        );
    }

    #[test]
    fn test_lower_enum_unknown_variant() {
        let ty = TypeDesc::Enum(EnumDesc::new(
            "color",
            vec![
                VariantDesc::unit("red"),
                VariantDesc::unit("green"),
            ],
        ));
        let err = ValueCodec
            .lower(&Value::unit_variant("blue"), &ty)
            .unwrap_err();
        assert!(matches!(err, CodecError::UnknownMember { kind: "variant", .. }));

        let bytes = ValueCodec.lower(&Value::unit_variant("green"), &ty).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 2]);
    }
}
