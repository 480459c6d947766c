//! Serialization clusters: the per-type instance groups of a frame.
//!
//! A cluster owns every traced instance of one resolved object type,
//! carries that type's wire metadata, and knows its own position in the
//! cluster table. Supertypes are recorded as back-references; the
//! serializer synthesizes parent clusters before their children, so a
//! cluster's supertype index is always smaller than its own, which is the
//! parent-before-child wire invariant the reader checks.

use crate::blob::BinaryBlob;
use crate::descriptor::TypeDescriptorContext;
use crate::error::Result;
use crate::mapper::{InstanceRc, TypeMapperRc};
use crate::stream::WriteStream;

/// One cluster: `(index, name, supertype?, type mapper, instances)`.
pub struct SerializationCluster {
    index: u32,
    name: String,
    supertype: Option<u32>,
    type_mapper: TypeMapperRc,
    instances: Vec<InstanceRc>,
}

impl SerializationCluster {
    /// Creates an empty cluster for `type_mapper` at position `index`.
    pub fn new(index: u32, type_mapper: TypeMapperRc, supertype: Option<u32>) -> Self {
        Self {
            index,
            name: type_mapper.name().to_string(),
            supertype,
            type_mapper,
            instances: Vec::new(),
        }
    }

    /// This cluster's 0-based table index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The cluster's wire name (its type mapper's name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 0-based index of the supertype cluster, when there is one.
    pub fn supertype(&self) -> Option<u32> {
        self.supertype
    }

    /// The resolved type mapper all member instances share.
    pub fn type_mapper(&self) -> &TypeMapperRc {
        &self.type_mapper
    }

    /// The traced member instances, in discovery order.
    pub fn instances(&self) -> &[InstanceRc] {
        &self.instances
    }

    /// Appends a traced instance.
    pub fn add_instance(&mut self, instance: InstanceRc) {
        self.instances.push(instance);
    }

    /// Interns the cluster's strings and every member's payload data.
    pub fn push_data_into_blob(&self, blob: &mut BinaryBlob) -> Result<()> {
        blob.intern_str_16(&self.name);
        self.type_mapper.push_type_data_into_blob(blob);
        for instance in &self.instances {
            instance.with_instance(&mut |state| {
                self.type_mapper.push_instance_data_into_blob(state, blob)
            })?;
        }
        Ok(())
    }

    /// Emits the cluster description section entry.
    pub fn write_description(
        &self,
        ctx: &mut TypeDescriptorContext,
        out: &mut WriteStream,
    ) -> Result<()> {
        out.write_utf8_32_16(&self.name)?;
        out.write_u32(self.supertype.map(|index| index + 1).unwrap_or(0));
        out.write_u16(self.type_mapper.field_count());
        out.write_u32(self.instances.len() as u32);
        self.type_mapper.write_field_descriptions(ctx, out)
    }

    /// Emits every member instance, fields in declared order.
    pub fn write_instances(&self, out: &mut WriteStream) -> Result<()> {
        for instance in &self.instances {
            instance.with_instance(&mut |state| self.type_mapper.write_instance(state, out))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SerializationCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializationCluster")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("supertype", &self.supertype)
            .field("instances", &self.instances.len())
            .finish()
    }
}
