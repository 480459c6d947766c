//! Defines the physical binary layout of Coal frames.
//!
//! A frame is fully self-describing and always little-endian:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (24 bytes)                                        │
//! │   magic "COAL" | major | minor | reserved u16            │
//! │   blobSize u32 | valueTypeCount u32                      │
//! │   clusterCount u32 | objectCount u32                     │
//! ├──────────────────────────────────────────────────────────┤
//! │ Binary blob (blobSize bytes, content-addressed)          │
//! ├──────────────────────────────────────────────────────────┤
//! │ Value-type layouts × valueTypeCount                      │
//! │   name UTF8_32_16 | fieldCount u16                       │
//! │   fieldCount × (name UTF8_32_16 | TypeDescriptor)        │
//! ├──────────────────────────────────────────────────────────┤
//! │ Cluster descriptions × clusterCount                      │
//! │   name UTF8_32_16 | supertypeIndex u32 (1-based, 0=none) │
//! │   fieldCount u16 | instanceCount u32                     │
//! │   fieldCount × (name UTF8_32_16 | TypeDescriptor)        │
//! ├──────────────────────────────────────────────────────────┤
//! │ Cluster instances, cluster by cluster, field by field    │
//! ├──────────────────────────────────────────────────────────┤
//! │ Trailer: rootObjectIndex u32 (1-based, 0 = null)         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Strings and variable-length payloads never appear inline: a string field
//! is a `(u32 offset, uK size)` pair into the blob, so identical payloads
//! are stored once per frame.
//!
//! ## Type descriptors
//!
//! A [`TypeDescriptorKind`] is a single-byte tag. Tags below
//! [`PRIMITIVE_TYPE_DESCRIPTOR_COUNT`] are complete descriptors on their
//! own; tags at `0x80` and above introduce composite descriptors that carry
//! indices or nested descriptors (see the descriptor module).

use crate::error::{CoalError, Result};

/// Frame magic number: `"COAL"` when written little-endian.
pub const MAGIC: u32 = 0x4C41_4F43;

/// Supported major format version.
pub const VERSION_MAJOR: u8 = 1;

/// Supported minor format version.
pub const VERSION_MINOR: u8 = 0;

/// Size in bytes of the fixed frame header.
pub const HEADER_SIZE: usize = 24;

/// First tag value that is not a primitive descriptor.
pub const PRIMITIVE_TYPE_DESCRIPTOR_COUNT: u8 = 0x2B;

/// The kind of a Coal type descriptor.
///
/// The discriminants are the wire tags and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum TypeDescriptorKind {
    Object = 0x00,
    Boolean8 = 0x01,
    Boolean16 = 0x02,
    Boolean32 = 0x03,
    Boolean64 = 0x04,
    UInt8 = 0x05,
    UInt16 = 0x06,
    UInt32 = 0x07,
    UInt64 = 0x08,
    UInt128 = 0x09,
    Int8 = 0x0A,
    Int16 = 0x0B,
    Int32 = 0x0C,
    Int64 = 0x0D,
    Int128 = 0x0E,
    Float16 = 0x0F,
    Float32 = 0x10,
    Float64 = 0x11,
    Float128 = 0x12,
    Float256 = 0x13,
    Decimal32 = 0x14,
    Decimal64 = 0x15,
    Decimal128 = 0x16,
    Binary32_8 = 0x17,
    Binary32_16 = 0x18,
    Binary32_32 = 0x19,
    Utf8_32_8 = 0x1A,
    Utf8_32_16 = 0x1B,
    Utf8_32_32 = 0x1C,
    Utf16_32_8 = 0x1D,
    Utf16_32_16 = 0x1E,
    Utf16_32_32 = 0x1F,
    Utf32_32_8 = 0x20,
    Utf32_32_16 = 0x21,
    Utf32_32_32 = 0x22,
    BigInt32_8 = 0x23,
    BigInt32_16 = 0x24,
    BigInt32_32 = 0x25,
    Char8 = 0x26,
    Char16 = 0x27,
    Char32 = 0x28,
    Fixed16_16 = 0x29,
    Fixed16_16Sat = 0x2A,

    Struct = 0x80,
    TypedObject = 0x81,
    FixedArray = 0x82,
    Array8 = 0x83,
    Array16 = 0x84,
    Array32 = 0x85,
    Set8 = 0x86,
    Set16 = 0x87,
    Set32 = 0x88,
    Map8 = 0x89,
    Map16 = 0x8A,
    Map32 = 0x8B,
}

impl TypeDescriptorKind {
    /// Decodes a wire tag, rejecting values outside the known set.
    pub fn from_tag(tag: u8) -> Result<Self> {
        use TypeDescriptorKind::*;
        Ok(match tag {
            0x00 => Object,
            0x01 => Boolean8,
            0x02 => Boolean16,
            0x03 => Boolean32,
            0x04 => Boolean64,
            0x05 => UInt8,
            0x06 => UInt16,
            0x07 => UInt32,
            0x08 => UInt64,
            0x09 => UInt128,
            0x0A => Int8,
            0x0B => Int16,
            0x0C => Int32,
            0x0D => Int64,
            0x0E => Int128,
            0x0F => Float16,
            0x10 => Float32,
            0x11 => Float64,
            0x12 => Float128,
            0x13 => Float256,
            0x14 => Decimal32,
            0x15 => Decimal64,
            0x16 => Decimal128,
            0x17 => Binary32_8,
            0x18 => Binary32_16,
            0x19 => Binary32_32,
            0x1A => Utf8_32_8,
            0x1B => Utf8_32_16,
            0x1C => Utf8_32_32,
            0x1D => Utf16_32_8,
            0x1E => Utf16_32_16,
            0x1F => Utf16_32_32,
            0x20 => Utf32_32_8,
            0x21 => Utf32_32_16,
            0x22 => Utf32_32_32,
            0x23 => BigInt32_8,
            0x24 => BigInt32_16,
            0x25 => BigInt32_32,
            0x26 => Char8,
            0x27 => Char16,
            0x28 => Char32,
            0x29 => Fixed16_16,
            0x2A => Fixed16_16Sat,
            0x80 => Struct,
            0x81 => TypedObject,
            0x82 => FixedArray,
            0x83 => Array8,
            0x84 => Array16,
            0x85 => Array32,
            0x86 => Set8,
            0x87 => Set16,
            0x88 => Set32,
            0x89 => Map8,
            0x8A => Map16,
            0x8B => Map32,
            other => return Err(CoalError::UnknownEncoding(other)),
        })
    }

    /// The wire tag of this kind.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Whether the tag sits in the single-byte primitive range.
    #[inline]
    pub fn is_primitive(self) -> bool {
        self.tag() < PRIMITIVE_TYPE_DESCRIPTOR_COUNT
    }

    /// Stable wire-facing name. Collection mappers use these strings as
    /// their type names, so renaming one is a wire break.
    pub fn name(self) -> &'static str {
        use TypeDescriptorKind::*;
        match self {
            Object => "Object",
            Boolean8 => "Boolean8",
            Boolean16 => "Boolean16",
            Boolean32 => "Boolean32",
            Boolean64 => "Boolean64",
            UInt8 => "UInt8",
            UInt16 => "UInt16",
            UInt32 => "UInt32",
            UInt64 => "UInt64",
            UInt128 => "UInt128",
            Int8 => "Int8",
            Int16 => "Int16",
            Int32 => "Int32",
            Int64 => "Int64",
            Int128 => "Int128",
            Float16 => "Float16",
            Float32 => "Float32",
            Float64 => "Float64",
            Float128 => "Float128",
            Float256 => "Float256",
            Decimal32 => "Decimal32",
            Decimal64 => "Decimal64",
            Decimal128 => "Decimal128",
            Binary32_8 => "Binary_32_8",
            Binary32_16 => "Binary_32_16",
            Binary32_32 => "Binary_32_32",
            Utf8_32_8 => "UTF8_32_8",
            Utf8_32_16 => "UTF8_32_16",
            Utf8_32_32 => "UTF8_32_32",
            Utf16_32_8 => "UTF16_32_8",
            Utf16_32_16 => "UTF16_32_16",
            Utf16_32_32 => "UTF16_32_32",
            Utf32_32_8 => "UTF32_32_8",
            Utf32_32_16 => "UTF32_32_16",
            Utf32_32_32 => "UTF32_32_32",
            BigInt32_8 => "BigInt_32_8",
            BigInt32_16 => "BigInt_32_16",
            BigInt32_32 => "BigInt_32_32",
            Char8 => "Char8",
            Char16 => "Char16",
            Char32 => "Char32",
            Fixed16_16 => "Fixed16_16",
            Fixed16_16Sat => "Fixed16_16_Sat",
            Struct => "Struct",
            TypedObject => "TypedObject",
            FixedArray => "FixedArray",
            Array8 => "Array8",
            Array16 => "Array16",
            Array32 => "Array32",
            Set8 => "Set8",
            Set16 => "Set16",
            Set32 => "Set32",
            Map8 => "Map8",
            Map16 => "Map16",
            Map32 => "Map32",
        }
    }

    /// Fixed encoded size in bytes for kinds whose instances occupy a
    /// constant number of stream bytes. Variable-length kinds (collections,
    /// structs, fixed arrays) return `None` and are skipped recursively.
    ///
    /// Blob-backed kinds count only the inline `(offset, size)` pair; the
    /// payload lives in the blob and costs nothing to skip.
    pub fn fixed_skip_size(self) -> Option<usize> {
        use TypeDescriptorKind::*;
        Some(match self {
            Object | TypedObject => 4,
            Boolean8 | UInt8 | Int8 | Char8 => 1,
            Boolean16 | UInt16 | Int16 | Float16 | Char16 => 2,
            Boolean32 | UInt32 | Int32 | Float32 | Decimal32 | Char32 | Fixed16_16
            | Fixed16_16Sat => 4,
            Boolean64 | UInt64 | Int64 | Float64 | Decimal64 => 8,
            UInt128 | Int128 | Float128 | Decimal128 => 16,
            Float256 => 32,
            Binary32_8 | Utf8_32_8 | Utf16_32_8 | Utf32_32_8 | BigInt32_8 => 5,
            Binary32_16 | Utf8_32_16 | Utf16_32_16 | Utf32_32_16 | BigInt32_16 => 6,
            Binary32_32 | Utf8_32_32 | Utf16_32_32 | Utf32_32_32 | BigInt32_32 => 8,
            Struct | FixedArray | Array8 | Array16 | Array32 | Set8 | Set16 | Set32 | Map8
            | Map16 | Map32 => return None,
        })
    }
}

/// Parsed fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Size of the binary blob section in bytes.
    pub blob_size: u32,
    /// Number of value-type layout entries.
    pub value_type_count: u32,
    /// Number of clusters.
    pub cluster_count: u32,
    /// Total instance count across all clusters.
    pub object_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_spells_coal() {
        assert_eq!(&MAGIC.to_le_bytes(), b"COAL");
    }

    #[test]
    fn tags_round_trip() {
        for tag in 0x00..=0x2A {
            let kind = TypeDescriptorKind::from_tag(tag).expect("primitive tag");
            assert_eq!(kind.tag(), tag);
            assert!(kind.is_primitive());
        }
        for tag in 0x80..=0x8B {
            let kind = TypeDescriptorKind::from_tag(tag).expect("composite tag");
            assert_eq!(kind.tag(), tag);
            assert!(!kind.is_primitive());
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert!(matches!(
            TypeDescriptorKind::from_tag(0x2B),
            Err(CoalError::UnknownEncoding(0x2B))
        ));
        assert!(matches!(
            TypeDescriptorKind::from_tag(0xFF),
            Err(CoalError::UnknownEncoding(0xFF))
        ));
    }

    #[test]
    fn blob_backed_kinds_skip_only_the_reference() {
        assert_eq!(TypeDescriptorKind::Utf8_32_8.fixed_skip_size(), Some(5));
        assert_eq!(TypeDescriptorKind::Utf8_32_16.fixed_skip_size(), Some(6));
        assert_eq!(TypeDescriptorKind::Utf8_32_32.fixed_skip_size(), Some(8));
        assert_eq!(TypeDescriptorKind::Float256.fixed_skip_size(), Some(32));
        assert_eq!(TypeDescriptorKind::Array32.fixed_skip_size(), None);
    }
}
