//! Primitive type mappers: scalar hosts and `String`.
//!
//! Every scalar host writes its natural wire width and accepts *any*
//! bool/integer/char/float tag on read, coercing through a [`Scalar`]
//! intermediate with the obvious narrowing/widening rules: integers
//! truncate when narrowing (128-bit wire values contribute their low bits),
//! floats cast, booleans are zero/non-zero. Fixed-point values decode
//! through their 16.16 form; plain `Fixed16_16` wraps into integer hosts
//! like any other narrowing read, only `Fixed16_16Sat` clamps to the host
//! range. `Float16/128/256` and the decimal widths have no host scalar;
//! fields carrying them stay skippable but unreadable.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::blob::BinaryBlob;
use crate::descriptor::{TypeDescriptor, TypeDescriptorContext, TypeDescriptorRc};
use crate::error::{CoalError, Result};
use crate::format::TypeDescriptorKind;
use crate::mapper::{mapper_singleton, CoalType, TypeMapper, TypeMapperRc};
use crate::stream::{ReadStream, WriteStream};

/// A decoded wire scalar, before coercion into the host type.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Scalar {
    Unsigned(u128),
    Signed(i128),
    Float(f64),
    Bool(bool),
    /// A 16.16 fixed-point value. `saturating` records which of the two
    /// fixed tags carried it; the conversion into integer hosts differs.
    Fixed { raw: i32, saturating: bool },
}

/// Whether a wire kind can be coerced into a scalar host at all.
pub(crate) fn is_scalar_readable(kind: TypeDescriptorKind) -> bool {
    use TypeDescriptorKind::*;
    matches!(
        kind,
        Boolean8
            | Boolean16
            | Boolean32
            | Boolean64
            | UInt8
            | UInt16
            | UInt32
            | UInt64
            | UInt128
            | Int8
            | Int16
            | Int32
            | Int64
            | Int128
            | Float32
            | Float64
            | Char8
            | Char16
            | Char32
            | Fixed16_16
            | Fixed16_16Sat
    )
}

/// Reads one wire scalar at the width selected by `kind`.
pub(crate) fn read_scalar(kind: TypeDescriptorKind, input: &mut ReadStream<'_>) -> Result<Scalar> {
    use TypeDescriptorKind::*;
    Ok(match kind {
        Boolean8 => Scalar::Bool(input.read_u8()? != 0),
        Boolean16 => Scalar::Bool(input.read_u16()? != 0),
        Boolean32 => Scalar::Bool(input.read_u32()? != 0),
        Boolean64 => Scalar::Bool(input.read_u64()? != 0),
        UInt8 => Scalar::Unsigned(input.read_u8()? as u128),
        UInt16 => Scalar::Unsigned(input.read_u16()? as u128),
        UInt32 => Scalar::Unsigned(input.read_u32()? as u128),
        UInt64 => Scalar::Unsigned(input.read_u64()? as u128),
        UInt128 => Scalar::Unsigned(input.read_u128()?),
        Int8 => Scalar::Signed(input.read_i8()? as i128),
        Int16 => Scalar::Signed(input.read_i16()? as i128),
        Int32 => Scalar::Signed(input.read_i32()? as i128),
        Int64 => Scalar::Signed(input.read_i64()? as i128),
        Int128 => Scalar::Signed(input.read_i128()?),
        Float32 => Scalar::Float(input.read_f32()? as f64),
        Float64 => Scalar::Float(input.read_f64()?),
        Char8 => Scalar::Unsigned(input.read_u8()? as u128),
        Char16 => Scalar::Unsigned(input.read_u16()? as u128),
        Char32 => Scalar::Unsigned(input.read_u32()? as u128),
        Fixed16_16 => Scalar::Fixed {
            raw: input.read_i32()?,
            saturating: false,
        },
        Fixed16_16Sat => Scalar::Fixed {
            raw: input.read_i32()?,
            saturating: true,
        },
        other => {
            return Err(CoalError::Internal(format!(
                "{} is not a scalar encoding",
                other.name()
            )))
        }
    })
}

/// A host scalar with a natural wire kind.
pub(crate) trait PrimitiveValue: Copy + Default + 'static {
    const KIND: TypeDescriptorKind;

    fn write_value(self, out: &mut WriteStream);
    fn from_scalar(scalar: Scalar) -> Self;
}

macro_rules! impl_integer_primitive {
    ($($ty:ty => $kind:ident, $writer:ident;)*) => {
        $(
            impl PrimitiveValue for $ty {
                const KIND: TypeDescriptorKind = TypeDescriptorKind::$kind;

                #[inline]
                fn write_value(self, out: &mut WriteStream) {
                    out.$writer(self);
                }

                #[inline]
                fn from_scalar(scalar: Scalar) -> Self {
                    match scalar {
                        Scalar::Unsigned(v) => v as $ty,
                        Scalar::Signed(v) => v as $ty,
                        Scalar::Float(v) => (v as i128) as $ty,
                        Scalar::Bool(b) => b as $ty,
                        // Plain fixed point truncates its fraction and
                        // wraps like any other narrowing integer read.
                        Scalar::Fixed {
                            raw,
                            saturating: false,
                        } => (raw >> 16) as $ty,
                        // Float-to-integer `as` clamps at the host bounds,
                        // which is the Sat contract.
                        Scalar::Fixed {
                            raw,
                            saturating: true,
                        } => ((raw >> 16) as f64) as $ty,
                    }
                }
            }
        )*
    };
}

impl_integer_primitive! {
    u8 => UInt8, write_u8;
    u16 => UInt16, write_u16;
    u32 => UInt32, write_u32;
    u64 => UInt64, write_u64;
    u128 => UInt128, write_u128;
    i8 => Int8, write_i8;
    i16 => Int16, write_i16;
    i32 => Int32, write_i32;
    i64 => Int64, write_i64;
    i128 => Int128, write_i128;
}

impl PrimitiveValue for bool {
    const KIND: TypeDescriptorKind = TypeDescriptorKind::Boolean8;

    #[inline]
    fn write_value(self, out: &mut WriteStream) {
        out.write_u8(self as u8);
    }

    #[inline]
    fn from_scalar(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Unsigned(v) => v != 0,
            Scalar::Signed(v) => v != 0,
            Scalar::Float(v) => v != 0.0,
            Scalar::Bool(b) => b,
            Scalar::Fixed { raw, .. } => raw != 0,
        }
    }
}

impl PrimitiveValue for f32 {
    const KIND: TypeDescriptorKind = TypeDescriptorKind::Float32;

    #[inline]
    fn write_value(self, out: &mut WriteStream) {
        out.write_f32(self);
    }

    #[inline]
    fn from_scalar(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Unsigned(v) => v as f32,
            Scalar::Signed(v) => v as f32,
            Scalar::Float(v) => v as f32,
            Scalar::Bool(b) => b as u8 as f32,
            Scalar::Fixed { raw, .. } => (raw as f64 / 65536.0) as f32,
        }
    }
}

impl PrimitiveValue for f64 {
    const KIND: TypeDescriptorKind = TypeDescriptorKind::Float64;

    #[inline]
    fn write_value(self, out: &mut WriteStream) {
        out.write_f64(self);
    }

    #[inline]
    fn from_scalar(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Unsigned(v) => v as f64,
            Scalar::Signed(v) => v as f64,
            Scalar::Float(v) => v,
            Scalar::Bool(b) => b as u8 as f64,
            Scalar::Fixed { raw, .. } => raw as f64 / 65536.0,
        }
    }
}

impl PrimitiveValue for char {
    const KIND: TypeDescriptorKind = TypeDescriptorKind::Char32;

    #[inline]
    fn write_value(self, out: &mut WriteStream) {
        out.write_u32(self as u32);
    }

    #[inline]
    fn from_scalar(scalar: Scalar) -> Self {
        let code = match scalar {
            Scalar::Unsigned(v) => v as u32,
            Scalar::Signed(v) => v as u32,
            Scalar::Float(v) => (v as i128) as u32,
            Scalar::Bool(b) => b as u32,
            Scalar::Fixed {
                raw,
                saturating: false,
            } => (raw >> 16) as u32,
            Scalar::Fixed {
                raw,
                saturating: true,
            } => ((raw >> 16) as f64) as u32,
        };
        char::from_u32(code).unwrap_or('\u{0}')
    }
}

/// The mapper of one scalar host type.
pub(crate) struct PrimitiveTypeMapper<T: PrimitiveValue> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: PrimitiveValue> PrimitiveTypeMapper<T> {
    fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    fn field<'a>(&self, field: &'a dyn Any) -> Result<&'a T> {
        field.downcast_ref::<T>().ok_or_else(|| {
            CoalError::Internal(format!("field is not a {}", T::KIND.name()))
        })
    }
}

impl<T: PrimitiveValue> TypeMapper for PrimitiveTypeMapper<T> {
    fn name(&self) -> &str {
        T::KIND.name()
    }

    fn write_field(&self, field: &dyn Any, out: &mut WriteStream) -> Result<()> {
        self.field(field)?.write_value(out);
        Ok(())
    }

    fn descriptor_for(&self, ctx: &mut TypeDescriptorContext) -> Result<TypeDescriptorRc> {
        Ok(ctx.primitive(T::KIND))
    }

    fn can_read_field_with(&self, encoding: &TypeDescriptor) -> bool {
        is_scalar_readable(encoding.kind())
    }

    fn read_field(
        &self,
        field: &mut dyn Any,
        encoding: &TypeDescriptorRc,
        input: &mut ReadStream<'_>,
    ) -> Result<()> {
        let scalar = read_scalar(encoding.kind(), input)?;
        let destination = field.downcast_mut::<T>().ok_or_else(|| {
            CoalError::Internal(format!("field is not a {}", T::KIND.name()))
        })?;
        *destination = T::from_scalar(scalar);
        Ok(())
    }
}

macro_rules! impl_primitive_coal_type {
    ($($ty:ty),*) => {
        $(
            impl CoalType for $ty {
                fn type_mapper() -> TypeMapperRc {
                    mapper_singleton::<PrimitiveTypeMapper<$ty>>(|| {
                        Rc::new(PrimitiveTypeMapper::<$ty>::new())
                    })
                }
            }
        )*
    };
}

impl_primitive_coal_type!(bool, u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64, char);

/// The `String` mapper: a primitive in wire terms, keyed to `UTF8_32_32`.
///
/// The full string is interned during priming; the field site only carries
/// the `(offset, size)` pair. Reads accept any `UTF8_32_k` width.
pub(crate) struct StringTypeMapper;

impl StringTypeMapper {
    fn string<'a>(&self, field: &'a dyn Any) -> Result<&'a String> {
        field
            .downcast_ref::<String>()
            .ok_or_else(|| CoalError::Internal("field is not a String".into()))
    }
}

impl TypeMapper for StringTypeMapper {
    fn name(&self) -> &str {
        TypeDescriptorKind::Utf8_32_32.name()
    }

    fn push_field_data_into_blob(&self, field: &dyn Any, blob: &mut BinaryBlob) -> Result<()> {
        blob.intern_str_32(self.string(field)?);
        Ok(())
    }

    fn write_field(&self, field: &dyn Any, out: &mut WriteStream) -> Result<()> {
        out.write_utf8_32_32(self.string(field)?)
    }

    fn descriptor_for(&self, ctx: &mut TypeDescriptorContext) -> Result<TypeDescriptorRc> {
        Ok(ctx.primitive(TypeDescriptorKind::Utf8_32_32))
    }

    fn can_read_field_with(&self, encoding: &TypeDescriptor) -> bool {
        use TypeDescriptorKind::*;
        matches!(encoding.kind(), Utf8_32_8 | Utf8_32_16 | Utf8_32_32)
    }

    fn read_field(
        &self,
        field: &mut dyn Any,
        encoding: &TypeDescriptorRc,
        input: &mut ReadStream<'_>,
    ) -> Result<()> {
        use TypeDescriptorKind::*;
        let value = match encoding.kind() {
            Utf8_32_8 => input.read_utf8_32_8()?,
            Utf8_32_16 => input.read_utf8_32_16()?,
            Utf8_32_32 => input.read_utf8_32_32()?,
            other => {
                return Err(CoalError::Internal(format!(
                    "string field stored as {}",
                    other.name()
                )))
            }
        };
        let destination = field
            .downcast_mut::<String>()
            .ok_or_else(|| CoalError::Internal("field is not a String".into()))?;
        *destination = value;
        Ok(())
    }
}

impl CoalType for String {
    fn type_mapper() -> TypeMapperRc {
        mapper_singleton::<StringTypeMapper>(|| Rc::new(StringTypeMapper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_truncate_when_narrowing() {
        assert_eq!(u8::from_scalar(Scalar::Unsigned(0x1FF)), 0xFF);
        assert_eq!(i16::from_scalar(Scalar::Signed(-42)), -42);
        assert_eq!(u64::from_scalar(Scalar::Unsigned(u128::MAX)), u64::MAX);
    }

    #[test]
    fn booleans_are_zero_or_not() {
        assert!(bool::from_scalar(Scalar::Unsigned(7)));
        assert!(!bool::from_scalar(Scalar::Float(0.0)));
    }

    #[test]
    fn fixed_point_decodes_through_its_form() {
        let bytes = (3i32 * 65536 + 32768).to_le_bytes();
        let mut input = ReadStream::new(&bytes);
        let scalar = read_scalar(TypeDescriptorKind::Fixed16_16, &mut input).expect("scalar");
        assert_eq!(f32::from_scalar(scalar), 3.5);

        let mut input = ReadStream::new(&bytes);
        let scalar = read_scalar(TypeDescriptorKind::Fixed16_16Sat, &mut input).expect("scalar");
        assert_eq!(f64::from_scalar(scalar), 3.5);
    }

    #[test]
    fn plain_fixed_point_wraps_into_integer_hosts() {
        let positive = Scalar::Fixed {
            raw: 300 << 16,
            saturating: false,
        };
        assert_eq!(u8::from_scalar(positive), 44);
        assert_eq!(i8::from_scalar(positive), 44);
        assert_eq!(i32::from_scalar(positive), 300);

        let negative = Scalar::Fixed {
            raw: -(5 << 16),
            saturating: false,
        };
        assert_eq!(u8::from_scalar(negative), 251);
        assert_eq!(i64::from_scalar(negative), -5);
    }

    #[test]
    fn saturating_fixed_point_clamps_into_integer_hosts() {
        let positive = Scalar::Fixed {
            raw: 300 << 16,
            saturating: true,
        };
        assert_eq!(u8::from_scalar(positive), u8::MAX);
        assert_eq!(i8::from_scalar(positive), i8::MAX);
        assert_eq!(i32::from_scalar(positive), 300);

        let negative = Scalar::Fixed {
            raw: -(5 << 16),
            saturating: true,
        };
        assert_eq!(u8::from_scalar(negative), 0);
        assert_eq!(i64::from_scalar(negative), -5);
    }

    #[test]
    fn unreadable_widths_are_rejected_up_front() {
        assert!(!is_scalar_readable(TypeDescriptorKind::Float16));
        assert!(!is_scalar_readable(TypeDescriptorKind::Decimal64));
        assert!(!is_scalar_readable(TypeDescriptorKind::Utf8_32_32));
    }
}
