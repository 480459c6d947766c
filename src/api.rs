//! The convenience surface: one-call serialize/deserialize plus file
//! helpers.
//!
//! [`serialize`] accepts any [`CoalType`] value. Reference roots hand their
//! pointee graph to the serializer directly; everything else is boxed in a
//! synthetic [`RootValueBox`] object whose single `value` field carries the
//! root scalar, string, structure or collection. [`deserialize`] inverts
//! both shapes, using the cached transitive-closure registry of the
//! requested root type.

use std::fs;
use std::path::Path;

use crate::deserializer::Deserializer;
use crate::error::Result;
use crate::mapper::{CoalObject, CoalType, FieldDescription};
use crate::registry::registry_for_root;
use crate::serializer::Serializer;

/// Boxes a non-reference root value so it can occupy a cluster slot.
///
/// The box is an ordinary object class named `RootValueBox` with one field,
/// `value`. Every value-rooted frame contains exactly one instance of it,
/// and the trailer points there.
#[derive(Debug, Clone, Default)]
pub struct RootValueBox<T: CoalType> {
    /// The boxed root value.
    pub value: T,
}

impl<T: CoalType> CoalObject for RootValueBox<T> {
    fn type_name() -> &'static str {
        "RootValueBox"
    }

    fn fields() -> Vec<FieldDescription> {
        vec![FieldDescription::new::<Self, T>(
            "value",
            |boxed| &boxed.value,
            |boxed| &mut boxed.value,
        )]
    }
}

/// Serializes `value` into a self-describing frame.
pub fn serialize<T: CoalType>(value: &T) -> Result<Vec<u8>> {
    let root = value.wrap_root()?;
    Serializer::new().serialize_root(root)
}

/// Deserializes a frame produced by [`serialize`], rebinding the wire
/// types to `T`'s in-memory shape.
pub fn deserialize<T: CoalType>(bytes: &[u8]) -> Result<T> {
    let root_mapper = T::root_type_mapper();
    let registry = registry_for_root(&root_mapper);
    let mut deserializer = Deserializer::new(bytes, registry);
    let root = deserializer.deserialize_root()?;
    T::unwrap_root(root)
}

/// Facade bundling the byte-level and file-level entry points.
///
/// ```rust
/// use coal::Coal;
///
/// let bytes = Coal::to_bytes(&42u16)?;
/// let value: u16 = Coal::from_bytes(&bytes)?;
/// assert_eq!(value, 42);
/// # Ok::<(), coal::CoalError>(())
/// ```
#[derive(Debug, Default)]
pub struct Coal;

impl Coal {
    /// Serializes `value` into frame bytes.
    pub fn to_bytes<T: CoalType>(value: &T) -> Result<Vec<u8>> {
        serialize(value)
    }

    /// Deserializes frame bytes into a `T`.
    pub fn from_bytes<T: CoalType>(bytes: &[u8]) -> Result<T> {
        deserialize(bytes)
    }

    /// Serializes `value` and writes the frame to `path`.
    pub fn save<T: CoalType, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
        let bytes = serialize(value)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Reads a frame from `path` and deserializes it into a `T`.
    pub fn load<T: CoalType, P: AsRef<Path>>(path: P) -> Result<T> {
        let bytes = fs::read(path)?;
        deserialize(&bytes)
    }
}
