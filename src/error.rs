//! Centralized error handling for Coal.
//!
//! All failure conditions are propagated through the [`Result`] type; the
//! library contains no panicking paths. Decode-side errors distinguish the
//! structural failure that caused the frame to be rejected, because callers
//! routinely need to tell "this is not a Coal frame" apart from "this frame
//! is corrupt" and "this frame disagrees with my types".
//!
//! ## Error Categories
//!
//! - **I/O errors** ([`CoalError::Io`]): file-level convenience API failures.
//! - **Frame errors** (`BadMagic`, `BadVersion`, `Truncated`,
//!   `OffsetOutOfRange`, `BadClusterOrder`, `InstanceCountMismatch`,
//!   `UnknownEncoding`, `Format`): the byte stream violates the frame layout.
//! - **Serialization-time errors** (`RecursiveValueType`,
//!   `MissingBlobEntry`): programmer errors detected while emitting a frame.
//! - **Internal errors** ([`CoalError::Internal`]): logic errors inside the
//!   library. These should not occur in production.
//!
//! Recoverable schema mismatches (a field the receiver cannot read, a type
//! name missing from the registry) are *not* errors: the deserializer skips
//! the affected data and keeps the in-memory default, as described in the
//! mapper resolution layer.

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for Coal operations.
pub type Result<T> = std::result::Result<T, CoalError>;

/// The master error enum covering all failure domains in Coal.
///
/// The type is `Clone` so errors can be stored and re-reported; the wrapped
/// `io::Error` is held in an `Arc` to keep cloning cheap.
#[derive(Debug, Clone)]
pub enum CoalError {
    /// Low-level I/O failure from the file convenience API.
    Io(Arc<io::Error>),

    /// The frame does not start with the `COAL` magic number.
    BadMagic(u32),

    /// The frame's major/minor version is not the supported pair.
    BadVersion {
        /// Major version found in the header.
        major: u8,
        /// Minor version found in the header.
        minor: u8,
    },

    /// A read ran past the end of the frame or of the binary blob.
    Truncated,

    /// A blob reference points outside the binary blob.
    OffsetOutOfRange {
        /// Byte offset of the reference.
        offset: u32,
        /// Byte size of the reference.
        size: u32,
        /// Total blob size the reference was validated against.
        blob_size: usize,
    },

    /// A cluster names a supertype that appears later in the cluster table.
    BadClusterOrder {
        /// Index of the offending cluster.
        cluster_index: u32,
        /// 1-based supertype index found on the wire.
        supertype_index: u32,
    },

    /// The per-cluster instance counts do not add up to the header's
    /// object count.
    InstanceCountMismatch {
        /// Object count declared in the header.
        expected: u32,
        /// Sum of the cluster instance counts.
        found: u32,
    },

    /// A type-descriptor tag is not in the known encoding set.
    UnknownEncoding(u8),

    /// A value-structure layout is recursive. Detected at serialization
    /// time by the tri-color dependency scan; this is a programmer error in
    /// the type definitions, not a wire condition.
    RecursiveValueType(String),

    /// `offset_of` was asked for bytes that were never pushed into the
    /// blob. Serialization-time programmer error: priming must cover every
    /// byte sequence that is later referenced.
    MissingBlobEntry,

    /// The frame is structurally invalid in a way not covered by a more
    /// specific variant.
    Format(String),

    /// Logic error inside the library. Please report these.
    Internal(String),
}

impl fmt::Display for CoalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::BadMagic(found) => {
                write!(f, "bad magic number {found:#010X}, expected 0x4C414F43")
            }
            Self::BadVersion { major, minor } => {
                write!(f, "unsupported format version {major}.{minor}")
            }
            Self::Truncated => write!(f, "unexpected end of frame"),
            Self::OffsetOutOfRange {
                offset,
                size,
                blob_size,
            } => write!(
                f,
                "blob reference {offset}+{size} exceeds blob size {blob_size}"
            ),
            Self::BadClusterOrder {
                cluster_index,
                supertype_index,
            } => write!(
                f,
                "cluster {cluster_index} references later supertype {supertype_index}"
            ),
            Self::InstanceCountMismatch { expected, found } => write!(
                f,
                "cluster instance counts sum to {found}, header declares {expected}"
            ),
            Self::UnknownEncoding(tag) => write!(f, "unknown type descriptor tag {tag:#04X}"),
            Self::RecursiveValueType(name) => {
                write!(f, "recursive value type through '{name}'")
            }
            Self::MissingBlobEntry => {
                write!(f, "blob lookup for bytes that were never interned")
            }
            Self::Format(s) => write!(f, "format error: {s}"),
            Self::Internal(s) => write!(f, "internal logic error: {s}"),
        }
    }
}

impl std::error::Error for CoalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for CoalError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_magic() {
        let msg = CoalError::BadMagic(0xDEADBEEF).to_string();
        assert!(msg.contains("0xDEADBEEF"));
    }

    #[test]
    fn io_errors_keep_their_source() {
        use std::error::Error;
        let err = CoalError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
        let cloned = err.clone();
        assert!(cloned.to_string().contains("gone"));
    }
}
