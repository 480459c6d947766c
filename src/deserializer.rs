//! The deserializer: frame parsing, materialization, and instance wiring.
//!
//! Seven phases, exactly inverting the serializer's emission order:
//!
//! 1. Header and blob: validate the magic and version byte-for-byte, read
//!    the four counts, copy the blob into the stream.
//! 2. Value-type descriptors: one structure-materialization mapper per
//!    entry, resolved against the registry as it is parsed so later
//!    `Struct(index)` encodings can delegate to it.
//! 3. Cluster descriptors: the object-materialization mappers are all
//!    pre-allocated first, so `TypedObject(index)` encodings inside field
//!    descriptions can reference any cluster, including later ones.
//!    Supertype links must point backwards; instance counts must sum to
//!    the header's object count.
//! 4. Type resolution: every cluster mapper is resolved by name, then all
//!    field lists are bound. Unknown names stay unresolved.
//! 5. Instance allocation: factories run cluster by cluster into the
//!    global instance array, which is installed into the stream so that
//!    inter-cluster references decode by index, forward references
//!    included, because every instance exists before any field is read.
//! 6. Instance reads: resolved instances read supertype-first, bound field
//!    by bound field; unresolved ones are structurally skipped.
//! 7. Trailer: the 1-based root index picks the result instance.

use std::rc::Rc;

use tracing::debug;

use crate::descriptor::TypeDescriptorContext;
use crate::error::{CoalError, Result};
use crate::format::{FrameHeader, MAGIC, VERSION_MAJOR, VERSION_MINOR};
use crate::mapper::materialization::{
    MaterializationField, ObjectMaterializationTypeMapper, StructureMaterializationTypeMapper,
};
use crate::mapper::{InstanceRc, TypeMapper};
use crate::registry::RegistryRc;
use crate::stream::ReadStream;

/// Deserializes one frame against a type-mapper registry.
pub struct Deserializer<'a> {
    input: ReadStream<'a>,
    ctx: TypeDescriptorContext,
    registry: RegistryRc,
    cluster_types: Vec<Rc<ObjectMaterializationTypeMapper>>,
    cluster_instance_counts: Vec<u32>,
}

impl<'a> Deserializer<'a> {
    /// Creates a deserializer over `bytes`, resolving names through
    /// `registry`.
    pub fn new(bytes: &'a [u8], registry: RegistryRc) -> Self {
        Self {
            input: ReadStream::new(bytes),
            ctx: TypeDescriptorContext::new(),
            registry,
            cluster_types: Vec::new(),
            cluster_instance_counts: Vec::new(),
        }
    }

    /// Parses the frame and returns the root instance (`None` for a null
    /// root or a root whose type could not be materialized).
    pub fn deserialize_root(&mut self) -> Result<Option<InstanceRc>> {
        let header = self.parse_header_and_blob()?;
        debug!(
            blob_bytes = header.blob_size,
            value_types = header.value_type_count,
            clusters = header.cluster_count,
            objects = header.object_count,
            "frame header parsed"
        );

        self.parse_value_type_descriptors(&header)?;
        self.parse_cluster_descriptors(&header)?;
        self.resolve_types();
        self.allocate_instances()?;
        self.read_instances()?;
        self.parse_trailer(&header)
    }

    fn parse_header_and_blob(&mut self) -> Result<FrameHeader> {
        let magic = self.input.read_u32()?;
        if magic != MAGIC {
            return Err(CoalError::BadMagic(magic));
        }
        let major = self.input.read_u8()?;
        let minor = self.input.read_u8()?;
        if major != VERSION_MAJOR || minor != VERSION_MINOR {
            return Err(CoalError::BadVersion { major, minor });
        }
        let _reserved = self.input.read_u16()?;

        let header = FrameHeader {
            blob_size: self.input.read_u32()?,
            value_type_count: self.input.read_u32()?,
            cluster_count: self.input.read_u32()?,
            object_count: self.input.read_u32()?,
        };

        let blob = self.input.read_bytes(header.blob_size as usize)?.to_vec();
        self.input.set_blob(blob);

        // A value-type entry occupies at least 8 bytes and a cluster entry
        // at least 16, so counts beyond these bounds cannot be satisfied by
        // the remaining bytes and are rejected before any allocation.
        let remaining = self.input.remaining();
        if (header.value_type_count as usize).saturating_mul(8) > remaining
            || (header.cluster_count as usize).saturating_mul(16) > remaining
        {
            return Err(CoalError::Truncated);
        }
        Ok(header)
    }

    fn parse_value_type_descriptors(&mut self, header: &FrameHeader) -> Result<()> {
        for _ in 0..header.value_type_count {
            let name = self.input.read_utf8_32_16()?;
            let field_count = self.input.read_u16()?;
            let mut fields = Vec::with_capacity(field_count as usize);
            for _ in 0..field_count {
                fields.push(MaterializationField::read_description(
                    &mut self.ctx,
                    &mut self.input,
                )?);
            }

            let mapper = Rc::new(StructureMaterializationTypeMapper::new(name, fields));
            mapper.resolve_type_using(self.registry.lookup(mapper.name()));
            mapper.resolve_type_fields();
            self.ctx.add_value_type(mapper);
        }
        Ok(())
    }

    fn parse_cluster_descriptors(&mut self, header: &FrameHeader) -> Result<()> {
        // Pre-allocate every cluster's mapper before parsing any body.
        self.cluster_types.reserve(header.cluster_count as usize);
        for _ in 0..header.cluster_count {
            let mapper = Rc::new(ObjectMaterializationTypeMapper::new());
            self.ctx.add_cluster_type(mapper.clone());
            self.cluster_types.push(mapper);
        }

        let mut total_instance_count: u32 = 0;
        for cluster_index in 0..header.cluster_count {
            let name = self.input.read_utf8_32_16()?;
            let supertype_index = self.input.read_u32()?;
            if supertype_index > cluster_index {
                return Err(CoalError::BadClusterOrder {
                    cluster_index,
                    supertype_index,
                });
            }
            let field_count = self.input.read_u16()?;
            let instance_count = self.input.read_u32()?;

            let mapper = self.cluster_types[cluster_index as usize].clone();
            mapper.set_name(name);
            if supertype_index > 0 {
                mapper.set_supertype(self.cluster_types[supertype_index as usize - 1].clone());
            }

            let mut fields = Vec::with_capacity(field_count as usize);
            for _ in 0..field_count {
                fields.push(MaterializationField::read_description(
                    &mut self.ctx,
                    &mut self.input,
                )?);
            }
            mapper.set_fields(fields);

            self.cluster_instance_counts.push(instance_count);
            total_instance_count = total_instance_count
                .checked_add(instance_count)
                .ok_or_else(|| CoalError::InstanceCountMismatch {
                    expected: header.object_count,
                    found: u32::MAX,
                })?;
        }

        if total_instance_count != header.object_count {
            return Err(CoalError::InstanceCountMismatch {
                expected: header.object_count,
                found: total_instance_count,
            });
        }
        Ok(())
    }

    /// Resolves every cluster type by name first, then binds all field
    /// lists. Two passes: field binding may consult other clusters'
    /// resolved types through `TypedObject` encodings.
    fn resolve_types(&mut self) {
        for mapper in &self.cluster_types {
            mapper.resolve_type_using(self.registry.lookup(mapper.name()));
        }
        for mapper in &self.cluster_types {
            mapper.resolve_type_fields();
            if mapper.resolved_type().is_none() && !mapper.name().is_empty() {
                debug!(cluster = mapper.name(), "no live type for cluster; instances will be skipped");
            }
        }
    }

    fn allocate_instances(&mut self) -> Result<()> {
        let mut instances = Vec::new();
        for (index, mapper) in self.cluster_types.iter().enumerate() {
            for _ in 0..self.cluster_instance_counts[index] {
                instances.push(mapper.make_instance());
            }
        }
        self.input.set_instances(instances);
        Ok(())
    }

    fn read_instances(&mut self) -> Result<()> {
        let mut next_instance = 0usize;
        for (index, mapper) in self.cluster_types.iter().enumerate() {
            for _ in 0..self.cluster_instance_counts[index] {
                let instance = self.input.instance(next_instance);
                next_instance += 1;
                match instance {
                    Some(instance) => {
                        let input = &mut self.input;
                        instance
                            .with_instance_mut(&mut |state| mapper.read_instance(state, input))?;
                    }
                    None => mapper.skip_instance(&mut self.input)?,
                }
            }
        }
        Ok(())
    }

    fn parse_trailer(&mut self, header: &FrameHeader) -> Result<Option<InstanceRc>> {
        let root_index = self.input.read_u32()?;
        if root_index > header.object_count {
            return Err(CoalError::Format(format!(
                "root index {root_index} exceeds object count {}",
                header.object_count
            )));
        }
        if root_index == 0 {
            return Ok(None);
        }
        Ok(self.input.instance(root_index as usize - 1))
    }
}
