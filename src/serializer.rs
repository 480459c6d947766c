//! The two-phase serializer: trace the reachable graph, then emit.
//!
//! Phases, in order:
//!
//! 1. **Trace.** Starting from the root wrapper, pop objects off a stack,
//!    file each into its type's cluster (creating clusters lazily, parents
//!    before children), and push every reference the instance reports.
//!    The by-pointer seen-set makes tracing terminate and guarantees each
//!    live object lands in exactly one cluster slot.
//! 2. **Scan dependencies.** Walk each cluster type's dependency graph with
//!    a tri-color marking. Value-structure dependencies are registered as
//!    value-type layouts in post-order; meeting a gray node means a
//!    recursive value type, which is a programmer error and fails the
//!    serialization. Object-type dependencies get (possibly empty)
//!    clusters; reference types are walked once through a guard set.
//! 3. **Prime the blob.** Intern every name the descriptor sections will
//!    write and every variable-length payload the instance section will
//!    reference, then assign dense 0-based global indices in cluster order.
//! 4. **Header.** Magic, version, counts.
//! 5. **Sections.** Blob, value-type layouts, cluster descriptions, cluster
//!    instances, root-index trailer.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::blob::BinaryBlob;
use crate::cluster::SerializationCluster;
use crate::descriptor::TypeDescriptorContext;
use crate::error::{CoalError, Result};
use crate::format::{MAGIC, VERSION_MAJOR, VERSION_MINOR};
use crate::mapper::{rc_mapper_id, InstanceRc, TypeMapperRc, WrapperCache};
use crate::stream::WriteStream;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanColor {
    Gray,
    Black,
}

/// Serializes one object graph into a frame.
pub struct Serializer {
    ctx: TypeDescriptorContext,
    blob: BinaryBlob,
    clusters: Vec<SerializationCluster>,
    cluster_index_by_mapper: HashMap<*const (), usize>,
    tracing_stack: Vec<InstanceRc>,
    seen: HashSet<*const ()>,
    wrapper_cache: WrapperCache,
    object_index: HashMap<*const (), u32>,
    value_scan_colors: HashMap<*const (), ScanColor>,
    scanned_reference_types: HashSet<*const ()>,
}

impl Serializer {
    /// Creates a serializer with empty state.
    pub fn new() -> Self {
        Self {
            ctx: TypeDescriptorContext::new(),
            blob: BinaryBlob::new(),
            clusters: Vec::new(),
            cluster_index_by_mapper: HashMap::new(),
            tracing_stack: Vec::new(),
            seen: HashSet::new(),
            wrapper_cache: WrapperCache::new(),
            object_index: HashMap::new(),
            value_scan_colors: HashMap::new(),
            scanned_reference_types: HashSet::new(),
        }
    }

    /// Serializes the graph reachable from `root` into a frame.
    ///
    /// `None` encodes the null root: an empty frame whose trailer is `0`.
    pub fn serialize_root(mut self, root: Option<InstanceRc>) -> Result<Vec<u8>> {
        if let Some(root) = &root {
            self.wrapper_cache.insert(root.base_pointer(), root.clone());
            self.add_pending(root.clone());
        }
        self.trace_pending()?;
        self.scan_cluster_dependencies()?;
        let object_count = self.prepare_for_writing()?;

        debug!(
            clusters = self.clusters.len(),
            value_types = self.ctx.value_type_count(),
            objects = object_count,
            blob_bytes = self.blob.len(),
            "frame prepared"
        );

        let mut out = WriteStream::new();
        out.write_u32(MAGIC);
        out.write_u8(VERSION_MAJOR);
        out.write_u8(VERSION_MINOR);
        out.write_u16(0);
        out.write_u32(self.blob.len() as u32);
        out.write_u32(self.ctx.value_type_count());
        out.write_u32(self.clusters.len() as u32);
        out.write_u32(object_count);

        let blob = std::mem::take(&mut self.blob);
        out.write_blob(blob);
        out.set_object_index(std::mem::take(&mut self.object_index));

        let value_types: Vec<TypeMapperRc> = self.ctx.value_types().to_vec();
        for mapper in &value_types {
            out.write_utf8_32_16(mapper.name())?;
            out.write_u16(mapper.field_count());
            mapper.write_field_descriptions(&mut self.ctx, &mut out)?;
        }

        for index in 0..self.clusters.len() {
            let cluster = &self.clusters[index];
            cluster.write_description(&mut self.ctx, &mut out)?;
        }
        for cluster in &self.clusters {
            cluster.write_instances(&mut out)?;
        }

        match &root {
            Some(root) => out.write_object_reference(root.base_pointer())?,
            None => out.write_u32(0),
        }

        Ok(out.into_bytes())
    }

    fn add_pending(&mut self, instance: InstanceRc) {
        if !self.seen.insert(instance.base_pointer()) {
            return;
        }
        self.tracing_stack.push(instance);
    }

    fn trace_pending(&mut self) -> Result<()> {
        while let Some(instance) = self.tracing_stack.pop() {
            let mapper = instance.type_mapper();
            let cluster_index = self.cluster_for(&mapper)?;
            self.clusters[cluster_index].add_instance(instance.clone());

            let mut discovered = Vec::new();
            let cache = &mut self.wrapper_cache;
            instance.with_instance(&mut |state| {
                mapper.object_references_in_instance(state, cache, &mut |reference| {
                    discovered.push(reference);
                })
            })?;
            for reference in discovered {
                self.add_pending(reference);
            }
        }
        Ok(())
    }

    /// Returns the cluster index for an object type, creating the cluster
    /// (and, first, its whole supertype chain) on demand.
    fn cluster_for(&mut self, mapper: &TypeMapperRc) -> Result<usize> {
        if let Some(&index) = self.cluster_index_by_mapper.get(&rc_mapper_id(mapper)) {
            return Ok(index);
        }
        if !mapper.is_object_type() {
            return Err(CoalError::Internal(format!(
                "'{}' is not an object type and cannot own a cluster",
                mapper.name()
            )));
        }

        let supertype = match mapper.supertype_binding() {
            Some(binding) => {
                let parent_mapper = binding.mapper().clone();
                Some(self.cluster_for(&parent_mapper)? as u32)
            }
            None => None,
        };

        let index = self.clusters.len();
        self.clusters
            .push(SerializationCluster::new(index as u32, mapper.clone(), supertype));
        self.cluster_index_by_mapper
            .insert(rc_mapper_id(mapper), index);
        Ok(index)
    }

    fn scan_cluster_dependencies(&mut self) -> Result<()> {
        let mut index = 0;
        while index < self.clusters.len() {
            let mapper = self.clusters[index].type_mapper().clone();
            let mut dependencies = Vec::new();
            mapper.type_mapper_dependencies(&mut |dependency| {
                dependencies.push(dependency.clone());
            });
            for dependency in dependencies {
                self.scan_dependency(&dependency)?;
            }
            index += 1;
        }
        Ok(())
    }

    fn scan_dependency(&mut self, mapper: &TypeMapperRc) -> Result<()> {
        if mapper.is_object_type() {
            self.cluster_for(mapper)?;
            Ok(())
        } else if mapper.is_aggregate_type() {
            self.register_value_type(mapper)
        } else if mapper.is_reference_type() {
            self.scan_reference_dependencies(mapper)
        } else {
            Ok(())
        }
    }

    /// Tri-color walk over a value structure's dependencies; the structure
    /// itself is registered after them, so the value-type table comes out
    /// in post-order and never needs forward references.
    fn register_value_type(&mut self, mapper: &TypeMapperRc) -> Result<()> {
        match self.value_scan_colors.get(&rc_mapper_id(mapper)) {
            Some(ScanColor::Gray) => {
                return Err(CoalError::RecursiveValueType(mapper.name().to_string()));
            }
            Some(ScanColor::Black) => return Ok(()),
            None => {}
        }

        self.value_scan_colors
            .insert(rc_mapper_id(mapper), ScanColor::Gray);
        let mut dependencies = Vec::new();
        mapper.type_mapper_dependencies(&mut |dependency| {
            dependencies.push(dependency.clone());
        });
        for dependency in dependencies {
            self.scan_dependency(&dependency)?;
        }
        self.value_scan_colors
            .insert(rc_mapper_id(mapper), ScanColor::Black);

        self.ctx.add_value_type(mapper.clone());
        Ok(())
    }

    fn scan_reference_dependencies(&mut self, mapper: &TypeMapperRc) -> Result<()> {
        if !self.scanned_reference_types.insert(rc_mapper_id(mapper)) {
            return Ok(());
        }
        let mut dependencies = Vec::new();
        mapper.type_mapper_dependencies(&mut |dependency| {
            dependencies.push(dependency.clone());
        });
        for dependency in dependencies {
            self.scan_dependency(&dependency)?;
        }
        Ok(())
    }

    /// Primes the blob and assigns the dense global instance indices.
    fn prepare_for_writing(&mut self) -> Result<u32> {
        let value_types: Vec<TypeMapperRc> = self.ctx.value_types().to_vec();
        for mapper in &value_types {
            self.blob.intern_str_16(mapper.name());
            mapper.push_type_data_into_blob(&mut self.blob);
        }

        let mut object_count: u32 = 0;
        for index in 0..self.clusters.len() {
            self.clusters[index].push_data_into_blob(&mut self.blob)?;
            self.ctx
                .add_cluster_type(self.clusters[index].type_mapper().clone());
            for instance in self.clusters[index].instances() {
                self.object_index
                    .insert(instance.base_pointer(), object_count);
                object_count += 1;
            }
        }
        Ok(object_count)
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}
