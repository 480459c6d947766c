//! The content-addressed binary blob.
//!
//! Every string and variable-length primitive payload referenced by a frame
//! lives in one shared byte arena. Identical byte sequences are stored once;
//! a field only carries the `(offset, size)` pair. The blob is filled during
//! the serializer's priming pass and frozen before the header is emitted, so
//! `offset_of` during emission is guaranteed to find its entry.

use std::hash::Hasher;

use twox_hash::XxHash64;

use crate::error::{CoalError, Result};

const BUCKET_COUNT: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct BlobEntry {
    offset: u32,
    len: u32,
}

/// A growing, deduplicating byte arena.
///
/// Lookup is a bucketed hash index; the hash only selects the bucket, the
/// `(len, bytes)` comparison is authoritative. Pushing the same bytes any
/// number of times leaves the arena byte-identical and reports the same
/// offset.
#[derive(Debug)]
pub struct BinaryBlob {
    data: Vec<u8>,
    buckets: Vec<Vec<BlobEntry>>,
}

impl BinaryBlob {
    /// Creates an empty blob.
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            buckets: (0..BUCKET_COUNT).map(|_| Vec::new()).collect(),
        }
    }

    fn bucket_for(&self, bytes: &[u8]) -> usize {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(bytes);
        (hasher.finish() as usize) % BUCKET_COUNT
    }

    /// Appends `bytes` unless an identical sequence is already stored.
    pub fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        let bucket_index = self.bucket_for(bytes);
        for entry in &self.buckets[bucket_index] {
            if entry.len as usize == bytes.len()
                && &self.data[entry.offset as usize..entry.offset as usize + bytes.len()] == bytes
            {
                return;
            }
        }

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        self.buckets[bucket_index].push(BlobEntry {
            offset,
            len: bytes.len() as u32,
        });
    }

    /// Returns the offset of a previously pushed sequence.
    ///
    /// The caller guarantees a prior [`push`](Self::push); a miss means the
    /// priming pass did not cover these bytes and is reported as
    /// [`CoalError::MissingBlobEntry`].
    pub fn offset_of(&self, bytes: &[u8]) -> Result<u32> {
        if bytes.is_empty() {
            return Ok(0);
        }

        let bucket_index = self.bucket_for(bytes);
        for entry in &self.buckets[bucket_index] {
            if entry.len as usize == bytes.len()
                && &self.data[entry.offset as usize..entry.offset as usize + bytes.len()] == bytes
            {
                return Ok(entry.offset);
            }
        }

        Err(CoalError::MissingBlobEntry)
    }

    /// Interns up to the first 255 bytes of `s` (the `UTF8_32_8` clamp).
    pub fn intern_str_8(&mut self, s: &str) {
        let clamp = s.len().min(0xFF);
        self.push(&s.as_bytes()[..clamp]);
    }

    /// Interns up to the first 65535 bytes of `s` (the `UTF8_32_16` clamp).
    pub fn intern_str_16(&mut self, s: &str) {
        let clamp = s.len().min(0xFFFF);
        self.push(&s.as_bytes()[..clamp]);
    }

    /// Interns up to the first 2^32-1 bytes of `s` (the `UTF8_32_32` clamp).
    pub fn intern_str_32(&mut self, s: &str) {
        let clamp = s.len().min(0xFFFF_FFFF);
        self.push(&s.as_bytes()[..clamp]);
    }

    /// The arena contents.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Total arena size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for BinaryBlob {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut blob = BinaryBlob::new();
        blob.push(b"Hello World\r\n");
        let first = blob.offset_of(b"Hello World\r\n").expect("present");
        blob.push(b"Hello World\r\n");
        blob.push(b"Hello World\r\n");
        assert_eq!(blob.len(), 13);
        assert_eq!(blob.offset_of(b"Hello World\r\n").expect("present"), first);
    }

    #[test]
    fn distinct_sequences_get_distinct_offsets() {
        let mut blob = BinaryBlob::new();
        blob.push(b"alpha");
        blob.push(b"beta");
        let a = blob.offset_of(b"alpha").expect("alpha");
        let b = blob.offset_of(b"beta").expect("beta");
        assert_ne!(a, b);
        assert_eq!(&blob.bytes()[a as usize..a as usize + 5], b"alpha");
    }

    #[test]
    fn same_prefix_different_length_are_separate_entries() {
        let mut blob = BinaryBlob::new();
        blob.push(b"value");
        blob.push(b"val");
        assert_eq!(blob.offset_of(b"value").expect("long"), 0);
        assert_eq!(blob.offset_of(b"val").expect("short"), 5);
    }

    #[test]
    fn empty_bytes_are_never_stored() {
        let mut blob = BinaryBlob::new();
        blob.push(b"");
        blob.intern_str_16("");
        assert!(blob.is_empty());
        assert_eq!(blob.offset_of(b"").expect("empty is offset zero"), 0);
    }

    #[test]
    fn missing_entry_is_a_hard_error() {
        let blob = BinaryBlob::new();
        assert!(matches!(
            blob.offset_of(b"never pushed"),
            Err(CoalError::MissingBlobEntry)
        ));
    }
}
