//! Framed little-endian byte streams.
//!
//! [`WriteStream`] accumulates a frame into memory. String-valued fields are
//! written as `(offset, size)` pairs against the attached [`BinaryBlob`];
//! reference-valued fields are written as 1-based instance indices against
//! the attached pointer→index table. Both attachments happen once the
//! serializer has finished priming, which is what makes the blob offsets
//! stable by the time anything refers to them.
//!
//! [`ReadStream`] is the exact inverse: a cursor over the frame bytes with a
//! copy of the blob and, once the deserializer has allocated them, the
//! global instance array for resolving reference fields.

use std::collections::HashMap;
use std::rc::Rc;

use crate::blob::BinaryBlob;
use crate::error::{CoalError, Result};
use crate::mapper::InstanceRc;

/// An in-memory frame writer.
#[derive(Debug, Default)]
pub struct WriteStream {
    output: Vec<u8>,
    blob: Option<BinaryBlob>,
    object_index: Option<HashMap<*const (), u32>>,
}

impl WriteStream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.output.extend_from_slice(bytes);
    }

    /// Writes one byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.output.push(value);
    }

    /// Writes a `u16` little-endian.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a `u32` little-endian.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a `u64` little-endian.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a `u128` little-endian.
    #[inline]
    pub fn write_u128(&mut self, value: u128) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes an `i8`.
    #[inline]
    pub fn write_i8(&mut self, value: i8) {
        self.write_u8(value as u8);
    }

    /// Writes an `i16` little-endian.
    #[inline]
    pub fn write_i16(&mut self, value: i16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes an `i32` little-endian.
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes an `i64` little-endian.
    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes an `i128` little-endian.
    #[inline]
    pub fn write_i128(&mut self, value: i128) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes an `f32` as IEEE-754 little-endian.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes an `f64` as IEEE-754 little-endian.
    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Emits the blob bytes and keeps the blob attached so that subsequent
    /// string-field writes can resolve their offsets.
    pub fn write_blob(&mut self, blob: BinaryBlob) {
        self.write_bytes(blob.bytes());
        self.blob = Some(blob);
    }

    /// Attaches the base-pointer → dense-index table used by
    /// [`write_object_reference`](Self::write_object_reference).
    pub fn set_object_index(&mut self, index: HashMap<*const (), u32>) {
        self.object_index = Some(index);
    }

    fn blob(&self) -> Result<&BinaryBlob> {
        self.blob
            .as_ref()
            .ok_or_else(|| CoalError::Internal("string write before blob attachment".into()))
    }

    /// Writes a `UTF8_32_8` field: `u32` blob offset plus `u8` size.
    pub fn write_utf8_32_8(&mut self, s: &str) -> Result<()> {
        let size = s.len().min(0xFF);
        let offset = self.blob()?.offset_of(&s.as_bytes()[..size])?;
        self.write_u32(offset);
        self.write_u8(size as u8);
        Ok(())
    }

    /// Writes a `UTF8_32_16` field: `u32` blob offset plus `u16` size.
    pub fn write_utf8_32_16(&mut self, s: &str) -> Result<()> {
        let size = s.len().min(0xFFFF);
        let offset = self.blob()?.offset_of(&s.as_bytes()[..size])?;
        self.write_u32(offset);
        self.write_u16(size as u16);
        Ok(())
    }

    /// Writes a `UTF8_32_32` field: `u32` blob offset plus `u32` size.
    pub fn write_utf8_32_32(&mut self, s: &str) -> Result<()> {
        let size = s.len().min(0xFFFF_FFFF);
        let offset = self.blob()?.offset_of(&s.as_bytes()[..size])?;
        self.write_u32(offset);
        self.write_u32(size as u32);
        Ok(())
    }

    /// Encodes a live base pointer as a 1-based instance index.
    ///
    /// Pointers absent from the table encode as `0` (null). That is the
    /// correct semantics for references the caller intentionally nulled; it
    /// is never reached for traced pointers because tracing and indexing
    /// cover the same reachable set.
    pub fn write_object_reference(&mut self, pointer: *const ()) -> Result<()> {
        let table = self
            .object_index
            .as_ref()
            .ok_or_else(|| CoalError::Internal("reference write before index attachment".into()))?;
        match table.get(&pointer) {
            Some(index) => self.write_u32(index + 1),
            None => self.write_u32(0),
        }
        Ok(())
    }

    /// Consumes the stream, returning the frame bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.output
    }

    /// Current length of the emitted frame.
    pub fn len(&self) -> usize {
        self.output.len()
    }

    /// True when nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }
}

/// A bounds-checked cursor over frame bytes.
pub struct ReadStream<'a> {
    data: &'a [u8],
    position: usize,
    blob: Vec<u8>,
    instances: Vec<Option<InstanceRc>>,
}

impl<'a> ReadStream<'a> {
    /// Creates a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            blob: Vec::new(),
            instances: Vec::new(),
        }
    }

    /// Reads exactly `count` bytes, advancing the cursor.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(count)
            .ok_or(CoalError::Truncated)?;
        if end > self.data.len() {
            return Err(CoalError::Truncated);
        }
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Advances the cursor without interpreting the bytes.
    pub fn skip_bytes(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count).map(|_| ())
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a little-endian `u128`.
    pub fn read_u128(&mut self) -> Result<u128> {
        let bytes = self.read_bytes(16)?;
        let mut buf = [0u8; 16];
        buf.copy_from_slice(bytes);
        Ok(u128::from_le_bytes(buf))
    }

    /// Reads an `i8`.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a little-endian `i16`.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads a little-endian `i128`.
    pub fn read_i128(&mut self) -> Result<i128> {
        Ok(self.read_u128()? as i128)
    }

    /// Reads a little-endian IEEE-754 `f32`.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads a little-endian IEEE-754 `f64`.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Attaches the frame's binary blob for string-field decoding.
    pub fn set_blob(&mut self, blob: Vec<u8>) {
        self.blob = blob;
    }

    /// Installs the materialized instance array for reference decoding.
    pub fn set_instances(&mut self, instances: Vec<Option<InstanceRc>>) {
        self.instances = instances;
    }

    /// The already-materialized instance at a 0-based index.
    pub fn instance(&self, index: usize) -> Option<InstanceRc> {
        self.instances.get(index).and_then(Clone::clone)
    }

    fn read_blob_slice(&mut self, offset: u32, size: u32) -> Result<String> {
        let start = offset as usize;
        let end = start.checked_add(size as usize).ok_or_else(|| {
            CoalError::OffsetOutOfRange {
                offset,
                size,
                blob_size: self.blob.len(),
            }
        })?;
        if end > self.blob.len() {
            return Err(CoalError::OffsetOutOfRange {
                offset,
                size,
                blob_size: self.blob.len(),
            });
        }
        Ok(String::from_utf8_lossy(&self.blob[start..end]).into_owned())
    }

    /// Reads a `UTF8_32_8` field from the blob.
    pub fn read_utf8_32_8(&mut self) -> Result<String> {
        let offset = self.read_u32()?;
        let size = self.read_u8()? as u32;
        self.read_blob_slice(offset, size)
    }

    /// Reads a `UTF8_32_16` field from the blob.
    pub fn read_utf8_32_16(&mut self) -> Result<String> {
        let offset = self.read_u32()?;
        let size = self.read_u16()? as u32;
        self.read_blob_slice(offset, size)
    }

    /// Reads a `UTF8_32_32` field from the blob.
    pub fn read_utf8_32_32(&mut self) -> Result<String> {
        let offset = self.read_u32()?;
        let size = self.read_u32()?;
        self.read_blob_slice(offset, size)
    }

    /// Decodes a 1-based instance reference. `0` is null. Indices beyond
    /// the installed instance array reject the frame.
    pub fn read_instance_reference(&mut self) -> Result<Option<InstanceRc>> {
        let index = self.read_u32()?;
        if index as usize > self.instances.len() {
            return Err(CoalError::Format(format!(
                "instance reference {index} exceeds object count {}",
                self.instances.len()
            )));
        }
        if index == 0 {
            return Ok(None);
        }
        Ok(self.instances[index as usize - 1].as_ref().map(Rc::clone))
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes remaining after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_round_trip() {
        let mut out = WriteStream::new();
        out.write_u8(0xAB);
        out.write_u16(0x1234);
        out.write_u32(0xDEAD_BEEF);
        out.write_i64(-77);
        out.write_f32(42.5);
        let bytes = out.into_bytes();

        let mut input = ReadStream::new(&bytes);
        assert_eq!(input.read_u8().expect("u8"), 0xAB);
        assert_eq!(input.read_u16().expect("u16"), 0x1234);
        assert_eq!(input.read_u32().expect("u32"), 0xDEAD_BEEF);
        assert_eq!(input.read_i64().expect("i64"), -77);
        assert_eq!(input.read_f32().expect("f32"), 42.5);
        assert!(matches!(input.read_u8(), Err(CoalError::Truncated)));
    }

    #[test]
    fn string_fields_resolve_through_the_blob() {
        let mut blob = BinaryBlob::new();
        blob.intern_str_16("field");
        let mut out = WriteStream::new();
        out.write_blob(blob);
        out.write_utf8_32_16("field").expect("interned");
        let bytes = out.into_bytes();

        let mut input = ReadStream::new(&bytes);
        let blob_bytes = input.read_bytes(5).expect("blob section").to_vec();
        input.set_blob(blob_bytes);
        assert_eq!(input.read_utf8_32_16().expect("string"), "field");
    }

    #[test]
    fn out_of_range_blob_reference_is_rejected() {
        let mut out = WriteStream::new();
        out.write_u32(2);
        out.write_u16(10);
        let bytes = out.into_bytes();

        let mut input = ReadStream::new(&bytes);
        input.set_blob(vec![b'a', b'b', b'c']);
        assert!(matches!(
            input.read_utf8_32_16(),
            Err(CoalError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn unknown_pointers_encode_as_null() {
        let mut out = WriteStream::new();
        out.set_object_index(HashMap::new());
        out.write_object_reference(8usize as *const ())
            .expect("table attached");
        assert_eq!(out.into_bytes(), vec![0, 0, 0, 0]);
    }
}
