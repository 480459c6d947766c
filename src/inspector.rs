//! Registry-free structural inspection of frames.
//!
//! The inspector parses everything a frame says about itself (header
//! counts, value-type layouts, cluster table, field encodings) without
//! resolving any type against live code, then structurally skips the
//! instance section to verify framing end to end. Useful for debugging
//! frames whose producing types are unavailable.

use std::rc::Rc;

use crate::descriptor::TypeDescriptorContext;
use crate::error::{CoalError, Result};
use crate::format::{FrameHeader, MAGIC, VERSION_MAJOR, VERSION_MINOR};
use crate::mapper::materialization::{
    MaterializationField, ObjectMaterializationTypeMapper, StructureMaterializationTypeMapper,
};
use crate::mapper::TypeMapper;
use crate::stream::ReadStream;

/// One described field: wire name and a rendered encoding.
#[derive(Debug, Clone)]
pub struct FieldReport {
    /// Wire name of the field.
    pub name: String,
    /// Human-readable rendering of the field's encoding.
    pub encoding: String,
}

/// One value-type layout entry.
#[derive(Debug, Clone)]
pub struct ValueTypeReport {
    /// Wire name of the value type.
    pub name: String,
    /// Declared fields, in wire order.
    pub fields: Vec<FieldReport>,
}

/// One cluster table entry.
#[derive(Debug, Clone)]
pub struct ClusterReport {
    /// Wire name of the cluster's type.
    pub name: String,
    /// 1-based supertype index, `None` for root classes.
    pub supertype_index: Option<u32>,
    /// Number of instances stored in this cluster.
    pub instance_count: u32,
    /// Declared fields, in wire order.
    pub fields: Vec<FieldReport>,
}

/// Structural report over one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// The parsed header counts.
    pub header: FrameHeader,
    /// Value-type layouts, in table order.
    pub value_types: Vec<ValueTypeReport>,
    /// Clusters, in table order.
    pub clusters: Vec<ClusterReport>,
    /// 1-based root instance index, `None` for a null root.
    pub root_index: Option<u32>,
    /// Total frame size in bytes.
    pub frame_size: usize,
}

fn field_reports(fields: &[MaterializationField]) -> Vec<FieldReport> {
    fields
        .iter()
        .map(|field| FieldReport {
            name: field.name.clone(),
            encoding: format!("{:?}", field.encoding),
        })
        .collect()
}

/// Parses the structure of `bytes` without resolving any live type.
pub fn inspect(bytes: &[u8]) -> Result<FrameReport> {
    let mut input = ReadStream::new(bytes);
    let mut ctx = TypeDescriptorContext::new();

    let magic = input.read_u32()?;
    if magic != MAGIC {
        return Err(CoalError::BadMagic(magic));
    }
    let major = input.read_u8()?;
    let minor = input.read_u8()?;
    if major != VERSION_MAJOR || minor != VERSION_MINOR {
        return Err(CoalError::BadVersion { major, minor });
    }
    let _reserved = input.read_u16()?;
    let header = FrameHeader {
        blob_size: input.read_u32()?,
        value_type_count: input.read_u32()?,
        cluster_count: input.read_u32()?,
        object_count: input.read_u32()?,
    };
    let blob = input.read_bytes(header.blob_size as usize)?.to_vec();
    input.set_blob(blob);

    let remaining = input.remaining();
    if (header.value_type_count as usize).saturating_mul(8) > remaining
        || (header.cluster_count as usize).saturating_mul(16) > remaining
    {
        return Err(CoalError::Truncated);
    }

    let mut value_type_reports = Vec::with_capacity(header.value_type_count as usize);
    for _ in 0..header.value_type_count {
        let name = input.read_utf8_32_16()?;
        let field_count = input.read_u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(MaterializationField::read_description(&mut ctx, &mut input)?);
        }
        value_type_reports.push(ValueTypeReport {
            name: name.clone(),
            fields: field_reports(&fields),
        });
        ctx.add_value_type(Rc::new(StructureMaterializationTypeMapper::new(name, fields)));
    }

    let mut cluster_mappers = Vec::with_capacity(header.cluster_count as usize);
    for _ in 0..header.cluster_count {
        let mapper = Rc::new(ObjectMaterializationTypeMapper::new());
        ctx.add_cluster_type(mapper.clone());
        cluster_mappers.push(mapper);
    }

    let mut cluster_reports = Vec::with_capacity(header.cluster_count as usize);
    let mut instance_counts = Vec::with_capacity(header.cluster_count as usize);
    for cluster_index in 0..header.cluster_count {
        let name = input.read_utf8_32_16()?;
        let supertype_index = input.read_u32()?;
        if supertype_index > cluster_index {
            return Err(CoalError::BadClusterOrder {
                cluster_index,
                supertype_index,
            });
        }
        let field_count = input.read_u16()?;
        let instance_count = input.read_u32()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(MaterializationField::read_description(&mut ctx, &mut input)?);
        }

        let mapper = &cluster_mappers[cluster_index as usize];
        mapper.set_name(name.clone());
        if supertype_index > 0 {
            mapper.set_supertype(cluster_mappers[supertype_index as usize - 1].clone());
        }

        cluster_reports.push(ClusterReport {
            name,
            supertype_index: (supertype_index > 0).then_some(supertype_index),
            instance_count,
            fields: field_reports(&fields),
        });
        instance_counts.push(instance_count);
        mapper.set_fields(fields);
    }

    // No resolution happened, so every instance skips structurally. This
    // also validates that the instance section is well-framed.
    for (index, mapper) in cluster_mappers.iter().enumerate() {
        for _ in 0..instance_counts[index] {
            mapper.skip_instance(&mut input)?;
        }
    }

    let root = input.read_u32()?;
    Ok(FrameReport {
        header,
        value_types: value_type_reports,
        clusters: cluster_reports,
        root_index: (root > 0).then_some(root),
        frame_size: bytes.len(),
    })
}
