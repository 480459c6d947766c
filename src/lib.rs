//! # Coal
//!
//! A binary serialization framework for rich, typed value-and-object
//! graphs. Coal preserves object identity through cycles, shares interned
//! byte payloads across fields, and tolerates schema evolution: a receiver
//! may reorder, add, or drop fields and substitute compatible numeric or
//! string widths without the writer knowing the receiver's shape.
//!
//! ## Overview
//!
//! Coal does not treat data as an opaque byte soup. The serializer walks
//! the reachable object graph first, groups every live object into a
//! per-type *cluster*, interns all strings and variable-length payloads
//! into one content-addressed *blob*, and only then emits a fully
//! self-describing frame: header, blob, value-type layouts, cluster
//! descriptions, instance bodies, root trailer. References between objects
//! are 1-based indices into the frame's global instance list, which is what
//! makes shared targets and cycles round-trip exactly.
//!
//! ### Key properties
//!
//! * **Identity preservation:** two fields referencing the same object
//!   decode to two handles of one decoded object.
//! * **Cycle safety:** tracing is iterative with a seen-set; reading
//!   allocates every instance before wiring any reference, so forward and
//!   backward references cost the same.
//! * **Schema evolution:** decoded field descriptions are rebound to the
//!   receiver's types by name, field by field; unknown fields are skipped
//!   through their wire encodings, missing ones keep their defaults, and
//!   numeric/string widths coerce.
//! * **Payload sharing:** identical strings are stored once per frame and
//!   referenced by `(offset, size)`.
//!
//! ## Basic usage
//!
//! ```rust
//! use coal::{deserialize, serialize};
//!
//! let bytes = serialize(&vec![1u32, 2, 3])?;
//! let decoded: Vec<u32> = deserialize(&bytes)?;
//! assert_eq!(decoded, vec![1, 2, 3]);
//! # Ok::<(), coal::CoalError>(())
//! ```
//!
//! ## Object graphs
//!
//! ```rust
//! use coal::{deserialize, serialize, CoalObject, Ref};
//!
//! #[derive(Default, CoalObject)]
//! struct Node {
//!     label: String,
//!     next: Ref<Node>,
//! }
//!
//! let first = Ref::new(Node { label: "a".into(), next: Ref::null() });
//! let second = Ref::new(Node { label: "b".into(), next: first.clone() });
//! first.borrow_mut().unwrap().next = second.clone(); // a cycle
//!
//! let bytes = serialize(&first)?;
//! let decoded: Ref<Node> = deserialize(&bytes)?;
//! let next = decoded.borrow().unwrap().next.clone();
//! assert!(next.borrow().unwrap().next.same(&decoded));
//! # Ok::<(), coal::CoalError>(())
//! ```
//!
//! ## Architecture
//!
//! * [`mapper`]: type mappers, per-host-type singletons driving encode,
//!   decode, skip, and blob priming; the `CoalType` / `CoalStructure` /
//!   `CoalObject` registration traits and the [`Ref`] handle.
//! * [`serializer`]: trace, dependency scan, blob priming, emission.
//! * [`deserializer`]: parse, materialize, resolve, allocate, read.
//! * [`registry`]: name resolution via transitive-closure registries.
//! * [`inspector`]: registry-free structural frame reports.
//!
//! ### Safety and error handling
//!
//! * No `unsafe` anywhere (enforced at the crate level).
//! * No panics in library code: every failure travels through
//!   [`CoalError`], and decode-side corruption is reported with the
//!   specific structural violation.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod error;
pub mod format;
pub mod inspector;
pub mod mapper;
pub mod registry;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod blob;
#[doc(hidden)]
pub mod cluster;
#[doc(hidden)]
pub mod descriptor;
#[doc(hidden)]
pub mod deserializer;
#[doc(hidden)]
pub mod serializer;
#[doc(hidden)]
pub mod stream;

// --- RE-EXPORTS ---

pub use api::{deserialize, serialize, Coal, RootValueBox};
pub use deserializer::Deserializer;
pub use error::{CoalError, Result};
pub use inspector::{inspect, FrameReport};
pub use mapper::object::Ref;
pub use mapper::{
    object_type_mapper, structure_type_mapper, CoalObject, CoalStructure, CoalType,
    FieldAccessor, FieldDescription, InstanceRc, ObjectInstance, SupertypeBinding, TypeMapper,
    TypeMapperRc,
};
pub use registry::{registry_for_root, TransitiveClosureRegistry, TypeMapperRegistry};
pub use serializer::Serializer;

// Re-export the derive macros so they are accessible as
// `coal::CoalStructure` / `coal::CoalObject` next to the traits.
pub use coal_derive::{CoalObject, CoalStructure};
