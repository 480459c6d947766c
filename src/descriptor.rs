//! The type-descriptor algebra.
//!
//! A [`TypeDescriptor`] is the wire-level description of how a field's bytes
//! are laid out. Primitives are a single tag byte; composites carry indices
//! into the frame's value-type or cluster tables, or nested descriptors.
//!
//! Three operations matter: writing a description into a frame, parsing one
//! back out (validated against the tables known so far), and *skipping* the
//! data of an unresolved field without losing stream alignment. Skipping is
//! what makes schema evolution cheap: a receiver that cannot bind a wire
//! field still knows exactly how many bytes it occupies.
//!
//! The [`TypeDescriptorContext`] deduplicates descriptors: primitives are
//! cached by kind, composites by `(kind, component identity)`, so identical
//! encodings collapse to one shared descriptor and identity comparison is
//! meaningful during field resolution.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{CoalError, Result};
use crate::format::TypeDescriptorKind;
use crate::mapper::{rc_mapper_id, TypeMapperRc};
use crate::stream::{ReadStream, WriteStream};

/// Shared handle to a deduplicated descriptor.
pub type TypeDescriptorRc = Rc<TypeDescriptor>;

/// The wire encoding of one field.
pub enum TypeDescriptor {
    /// A single-tag primitive encoding.
    Primitive(TypeDescriptorKind),
    /// A value-structure layout, by index into the frame's value-type table.
    Struct {
        /// Index into the value-type table.
        index: u32,
        /// The value-type mapper behind the index (live on write,
        /// materialization on read).
        mapper: TypeMapperRc,
    },
    /// A typed object reference, by index into the cluster table.
    TypedObject {
        /// Index into the cluster table.
        index: u32,
        /// The cluster's type mapper behind the index.
        mapper: TypeMapperRc,
    },
    /// A fixed-size array of `size` elements.
    FixedArray {
        /// Element count.
        size: u32,
        /// Element encoding.
        element: TypeDescriptorRc,
    },
    /// A counted sequence; `kind` selects the count width.
    Array {
        /// `Array8`, `Array16` or `Array32`.
        kind: TypeDescriptorKind,
        /// Element encoding.
        element: TypeDescriptorRc,
    },
    /// A counted set; `kind` selects the count width.
    Set {
        /// `Set8`, `Set16` or `Set32`.
        kind: TypeDescriptorKind,
        /// Element encoding.
        element: TypeDescriptorRc,
    },
    /// A counted map; `kind` selects the count width.
    Map {
        /// `Map8`, `Map16` or `Map32`.
        kind: TypeDescriptorKind,
        /// Key encoding.
        key: TypeDescriptorRc,
        /// Value encoding.
        value: TypeDescriptorRc,
    },
}

impl TypeDescriptor {
    /// The tag this descriptor writes.
    pub fn kind(&self) -> TypeDescriptorKind {
        match self {
            Self::Primitive(kind) => *kind,
            Self::Struct { .. } => TypeDescriptorKind::Struct,
            Self::TypedObject { .. } => TypeDescriptorKind::TypedObject,
            Self::FixedArray { .. } => TypeDescriptorKind::FixedArray,
            Self::Array { kind, .. } | Self::Set { kind, .. } | Self::Map { kind, .. } => *kind,
        }
    }

    /// Writes the descriptor, recursing into composites.
    pub fn write_description(&self, out: &mut WriteStream) -> Result<()> {
        out.write_u8(self.kind().tag());
        match self {
            Self::Primitive(_) => {}
            Self::Struct { index, .. } | Self::TypedObject { index, .. } => {
                out.write_u32(*index);
            }
            Self::FixedArray { size, element } => {
                out.write_u32(*size);
                element.write_description(out)?;
            }
            Self::Array { element, .. } | Self::Set { element, .. } => {
                element.write_description(out)?;
            }
            Self::Map { key, value, .. } => {
                key.write_description(out)?;
                value.write_description(out)?;
            }
        }
        Ok(())
    }

    /// Consumes exactly the bytes an instance of this encoding occupies.
    pub fn skip_data(&self, input: &mut ReadStream<'_>) -> Result<()> {
        match self {
            Self::Primitive(kind) => match kind.fixed_skip_size() {
                Some(size) => input.skip_bytes(size),
                None => Err(CoalError::Internal(format!(
                    "primitive kind {} has no fixed size",
                    kind.name()
                ))),
            },
            Self::Struct { mapper, .. } => mapper.skip_field(input),
            Self::TypedObject { .. } => input.skip_bytes(4),
            Self::FixedArray { size, element } => {
                for _ in 0..*size {
                    element.skip_data(input)?;
                }
                Ok(())
            }
            Self::Array { kind, element } | Self::Set { kind, element } => {
                let count = read_count(*kind, input)?;
                for _ in 0..count {
                    element.skip_data(input)?;
                }
                Ok(())
            }
            Self::Map { kind, key, value } => {
                let count = read_count(*kind, input)?;
                for _ in 0..count {
                    key.skip_data(input)?;
                    value.skip_data(input)?;
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primitive(kind) => write!(f, "{}", kind.name()),
            Self::Struct { index, .. } => write!(f, "Struct({index})"),
            Self::TypedObject { index, .. } => write!(f, "TypedObject({index})"),
            Self::FixedArray { size, element } => write!(f, "FixedArray({size}, {element:?})"),
            Self::Array { kind, element } => write!(f, "{}({element:?})", kind.name()),
            Self::Set { kind, element } => write!(f, "{}({element:?})", kind.name()),
            Self::Map { kind, key, value } => {
                write!(f, "{}({key:?}, {value:?})", kind.name())
            }
        }
    }
}

/// Reads a collection count at the width selected by `kind`.
pub(crate) fn read_count(kind: TypeDescriptorKind, input: &mut ReadStream<'_>) -> Result<usize> {
    use TypeDescriptorKind::*;
    match kind {
        Array8 | Set8 | Map8 => Ok(input.read_u8()? as usize),
        Array16 | Set16 | Map16 => Ok(input.read_u16()? as usize),
        Array32 | Set32 | Map32 => Ok(input.read_u32()? as usize),
        other => Err(CoalError::Internal(format!(
            "{} is not a counted collection kind",
            other.name()
        ))),
    }
}

type CompositeKey = (u8, usize);
type MapKey = (u8, usize, usize);

fn descriptor_identity(descriptor: &TypeDescriptorRc) -> usize {
    Rc::as_ptr(descriptor) as usize
}

/// Deduplicating store of descriptors plus the per-frame value-type and
/// cluster tables they index into.
#[derive(Default)]
pub struct TypeDescriptorContext {
    primitives: HashMap<u8, TypeDescriptorRc>,
    value_types: Vec<TypeMapperRc>,
    value_type_descriptors: Vec<TypeDescriptorRc>,
    cluster_types: Vec<TypeMapperRc>,
    cluster_index_by_mapper: HashMap<*const (), u32>,
    descriptor_by_mapper: HashMap<*const (), TypeDescriptorRc>,
    typed_object_references: HashMap<*const (), TypeDescriptorRc>,
    array_descriptors: HashMap<CompositeKey, TypeDescriptorRc>,
    set_descriptors: HashMap<CompositeKey, TypeDescriptorRc>,
    map_descriptors: HashMap<MapKey, TypeDescriptorRc>,
    fixed_array_descriptors: HashMap<(u32, usize), TypeDescriptorRc>,
}

impl TypeDescriptorContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached single-tag descriptor for a primitive kind.
    pub fn primitive(&mut self, kind: TypeDescriptorKind) -> TypeDescriptorRc {
        self.primitives
            .entry(kind.tag())
            .or_insert_with(|| Rc::new(TypeDescriptor::Primitive(kind)))
            .clone()
    }

    /// The field encoding of a mapper, cached by mapper identity.
    pub fn descriptor_for_mapper(&mut self, mapper: &TypeMapperRc) -> Result<TypeDescriptorRc> {
        if let Some(descriptor) = self.descriptor_by_mapper.get(&rc_mapper_id(mapper)) {
            return Ok(descriptor.clone());
        }
        let descriptor = mapper.descriptor_for(self)?;
        self.descriptor_by_mapper
            .insert(rc_mapper_id(mapper), descriptor.clone());
        Ok(descriptor)
    }

    /// Registers a value-structure mapper as the next value-type layout and
    /// returns its `Struct(index)` descriptor.
    pub fn add_value_type(&mut self, mapper: TypeMapperRc) -> TypeDescriptorRc {
        let index = self.value_types.len() as u32;
        let descriptor = Rc::new(TypeDescriptor::Struct {
            index,
            mapper: mapper.clone(),
        });
        self.descriptor_by_mapper
            .insert(rc_mapper_id(&mapper), descriptor.clone());
        self.value_types.push(mapper);
        self.value_type_descriptors.push(descriptor.clone());
        descriptor
    }

    /// Number of registered value-type layouts.
    pub fn value_type_count(&self) -> u32 {
        self.value_types.len() as u32
    }

    /// The registered value-type mappers, in table order.
    pub fn value_types(&self) -> &[TypeMapperRc] {
        &self.value_types
    }

    /// Registers the type mapper of the next cluster, making
    /// `TypedObject(index)` encodings for it resolvable.
    pub fn add_cluster_type(&mut self, mapper: TypeMapperRc) {
        let index = self.cluster_types.len() as u32;
        self.cluster_index_by_mapper
            .insert(rc_mapper_id(&mapper), index);
        self.cluster_types.push(mapper);
    }

    /// The `TypedObject` descriptor for an object type already registered
    /// as a cluster.
    pub fn typed_object_reference(&mut self, mapper: &TypeMapperRc) -> Result<TypeDescriptorRc> {
        if let Some(descriptor) = self.typed_object_references.get(&rc_mapper_id(mapper)) {
            return Ok(descriptor.clone());
        }
        let index = *self
            .cluster_index_by_mapper
            .get(&rc_mapper_id(mapper))
            .ok_or_else(|| {
                CoalError::Internal(format!(
                    "object type '{}' was never registered as a cluster",
                    mapper.name()
                ))
            })?;
        let descriptor = Rc::new(TypeDescriptor::TypedObject {
            index,
            mapper: mapper.clone(),
        });
        self.typed_object_references
            .insert(rc_mapper_id(mapper), descriptor.clone());
        Ok(descriptor)
    }

    /// The deduplicated array descriptor for `(kind, element)`.
    pub fn array_descriptor(
        &mut self,
        kind: TypeDescriptorKind,
        element: TypeDescriptorRc,
    ) -> TypeDescriptorRc {
        self.array_descriptors
            .entry((kind.tag(), descriptor_identity(&element)))
            .or_insert_with(|| Rc::new(TypeDescriptor::Array { kind, element }))
            .clone()
    }

    /// The deduplicated set descriptor for `(kind, element)`.
    pub fn set_descriptor(
        &mut self,
        kind: TypeDescriptorKind,
        element: TypeDescriptorRc,
    ) -> TypeDescriptorRc {
        self.set_descriptors
            .entry((kind.tag(), descriptor_identity(&element)))
            .or_insert_with(|| Rc::new(TypeDescriptor::Set { kind, element }))
            .clone()
    }

    /// The deduplicated map descriptor for `(kind, key, value)`.
    pub fn map_descriptor(
        &mut self,
        kind: TypeDescriptorKind,
        key: TypeDescriptorRc,
        value: TypeDescriptorRc,
    ) -> TypeDescriptorRc {
        self.map_descriptors
            .entry((
                kind.tag(),
                descriptor_identity(&key),
                descriptor_identity(&value),
            ))
            .or_insert_with(|| Rc::new(TypeDescriptor::Map { kind, key, value }))
            .clone()
    }

    /// The deduplicated fixed-array descriptor for `(size, element)`.
    pub fn fixed_array_descriptor(
        &mut self,
        size: u32,
        element: TypeDescriptorRc,
    ) -> TypeDescriptorRc {
        self.fixed_array_descriptors
            .entry((size, descriptor_identity(&element)))
            .or_insert_with(|| Rc::new(TypeDescriptor::FixedArray { size, element }))
            .clone()
    }

    /// Parses one descriptor from the stream, validating table indices
    /// against what this context knows so far.
    pub fn read_descriptor(&mut self, input: &mut ReadStream<'_>) -> Result<TypeDescriptorRc> {
        let tag = input.read_u8()?;
        let kind = TypeDescriptorKind::from_tag(tag)?;
        if kind.is_primitive() {
            return Ok(self.primitive(kind));
        }

        use TypeDescriptorKind::*;
        match kind {
            Struct => {
                let index = input.read_u32()?;
                self.value_type_descriptors
                    .get(index as usize)
                    .cloned()
                    .ok_or_else(|| {
                        CoalError::Format(format!(
                            "struct encoding references value type {index} of {}",
                            self.value_types.len()
                        ))
                    })
            }
            TypedObject => {
                let index = input.read_u32()?;
                let mapper = self
                    .cluster_types
                    .get(index as usize)
                    .cloned()
                    .ok_or_else(|| {
                        CoalError::Format(format!(
                            "object encoding references cluster {index} of {}",
                            self.cluster_types.len()
                        ))
                    })?;
                self.typed_object_reference(&mapper)
            }
            FixedArray => {
                let size = input.read_u32()?;
                let element = self.read_descriptor(input)?;
                Ok(self.fixed_array_descriptor(size, element))
            }
            Array8 | Array16 | Array32 => {
                let element = self.read_descriptor(input)?;
                Ok(self.array_descriptor(kind, element))
            }
            Set8 | Set16 | Set32 => {
                let element = self.read_descriptor(input)?;
                Ok(self.set_descriptor(kind, element))
            }
            Map8 | Map16 | Map32 => {
                let key = self.read_descriptor(input)?;
                let value = self.read_descriptor(input)?;
                Ok(self.map_descriptor(kind, key, value))
            }
            _ => Err(CoalError::UnknownEncoding(tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_descriptors_are_cached() {
        let mut ctx = TypeDescriptorContext::new();
        let a = ctx.primitive(TypeDescriptorKind::UInt16);
        let b = ctx.primitive(TypeDescriptorKind::UInt16);
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn identical_composites_collapse() {
        let mut ctx = TypeDescriptorContext::new();
        let element = ctx.primitive(TypeDescriptorKind::Int32);
        let a = ctx.array_descriptor(TypeDescriptorKind::Array32, element.clone());
        let b = ctx.array_descriptor(TypeDescriptorKind::Array32, element);
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn descriptor_round_trip() {
        let mut ctx = TypeDescriptorContext::new();
        let element = ctx.primitive(TypeDescriptorKind::UInt8);
        let descriptor = ctx.array_descriptor(TypeDescriptorKind::Array32, element);

        let mut out = WriteStream::new();
        descriptor.write_description(&mut out).expect("write");
        let bytes = out.into_bytes();
        assert_eq!(bytes, vec![0x85, 0x05]);

        let mut input = ReadStream::new(&bytes);
        let parsed = ctx.read_descriptor(&mut input).expect("parse");
        assert!(Rc::ptr_eq(&parsed, &descriptor));
    }

    #[test]
    fn skip_consumes_exact_sizes() {
        let mut ctx = TypeDescriptorContext::new();
        let descriptor = ctx.primitive(TypeDescriptorKind::Float64);
        let bytes = [0u8; 9];
        let mut input = ReadStream::new(&bytes);
        descriptor.skip_data(&mut input).expect("skip");
        assert_eq!(input.position(), 8);
    }

    #[test]
    fn skip_walks_counted_collections() {
        let mut ctx = TypeDescriptorContext::new();
        let element = ctx.primitive(TypeDescriptorKind::UInt16);
        let descriptor = ctx.array_descriptor(TypeDescriptorKind::Array8, element);
        // count = 3, then 3 × u16
        let bytes = [3u8, 1, 0, 2, 0, 3, 0, 0xFF];
        let mut input = ReadStream::new(&bytes);
        descriptor.skip_data(&mut input).expect("skip");
        assert_eq!(input.position(), 7);
    }

    #[test]
    fn struct_encoding_with_bad_index_is_rejected() {
        let mut ctx = TypeDescriptorContext::new();
        let bytes = [0x80, 0, 0, 0, 0];
        let mut input = ReadStream::new(&bytes);
        assert!(ctx.read_descriptor(&mut input).is_err());
    }
}
