//! The value-structure mapper: a named aggregate that is copied by value.
//!
//! Structures are serialization dependencies (their layout is emitted into
//! the frame's value-type table) but not reference targets: a structure
//! field is stored inline, field by field in declared order. On read, a
//! `Struct(index)` encoding is only acceptable when the indexed
//! materialization layout resolved back to this very mapper, and the actual
//! decoding is delegated to that materialization mapper so that wire order
//! drives the coercion.

use std::any::Any;
use std::collections::HashMap;

use crate::blob::BinaryBlob;
use crate::descriptor::{TypeDescriptor, TypeDescriptorContext, TypeDescriptorRc};
use crate::error::{CoalError, Result};
use crate::mapper::{
    mapper_id, rc_mapper_id, with_dependencies, FieldDescription, InstanceRc, TypeMapper,
    TypeMapperRc, WrapperCache,
};
use crate::stream::{ReadStream, WriteStream};

/// Live mapper of a user value structure.
pub(crate) struct StructureTypeMapper {
    name: String,
    fields: Vec<FieldDescription>,
    field_index_by_name: HashMap<String, usize>,
}

impl StructureTypeMapper {
    pub(crate) fn new(name: &str, fields: Vec<FieldDescription>) -> Self {
        let field_index_by_name = fields
            .iter()
            .enumerate()
            .map(|(index, field)| (field.name().to_string(), index))
            .collect();
        Self {
            name: name.to_string(),
            fields,
            field_index_by_name,
        }
    }
}

impl TypeMapper for StructureTypeMapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_aggregate_type(&self) -> bool {
        true
    }

    fn is_serialization_dependency(&self) -> bool {
        true
    }

    fn field_count(&self) -> u16 {
        self.fields.len() as u16
    }

    fn field_named(&self, name: &str) -> Option<&FieldDescription> {
        self.field_index_by_name
            .get(name)
            .map(|&index| &self.fields[index])
    }

    fn push_type_data_into_blob(&self, blob: &mut BinaryBlob) {
        blob.intern_str_16(&self.name);
        for field in &self.fields {
            field.push_type_data_into_blob(blob);
        }
    }

    fn push_field_data_into_blob(&self, field: &dyn Any, blob: &mut BinaryBlob) -> Result<()> {
        self.push_instance_data_into_blob(field, blob)
    }

    fn push_instance_data_into_blob(&self, instance: &dyn Any, blob: &mut BinaryBlob) -> Result<()> {
        for field in &self.fields {
            let field_value = field.accessor().get(instance)?;
            field.type_mapper().push_field_data_into_blob(field_value, blob)?;
        }
        Ok(())
    }

    fn write_field_descriptions(
        &self,
        ctx: &mut TypeDescriptorContext,
        out: &mut WriteStream,
    ) -> Result<()> {
        for field in &self.fields {
            field.write_description(ctx, out)?;
        }
        Ok(())
    }

    fn write_instance(&self, instance: &dyn Any, out: &mut WriteStream) -> Result<()> {
        for field in &self.fields {
            let field_value = field.accessor().get(instance)?;
            field.type_mapper().write_field(field_value, out)?;
        }
        Ok(())
    }

    fn write_field(&self, field: &dyn Any, out: &mut WriteStream) -> Result<()> {
        self.write_instance(field, out)
    }

    fn descriptor_for(&self, _ctx: &mut TypeDescriptorContext) -> Result<TypeDescriptorRc> {
        // Registered by the serializer's dependency scan; reaching this
        // means a structure field was never scanned.
        Err(CoalError::Internal(format!(
            "value type '{}' was not registered before use",
            self.name
        )))
    }

    fn can_read_field_with(&self, encoding: &TypeDescriptor) -> bool {
        let TypeDescriptor::Struct { mapper, .. } = encoding else {
            return false;
        };
        if !mapper.is_materialization_adaptation()
            || !mapper.is_aggregate_type()
            || mapper.is_object_type()
        {
            return false;
        }
        mapper
            .resolved_type()
            .map(|resolved| rc_mapper_id(&resolved) == mapper_id(self))
            .unwrap_or(false)
    }

    fn read_field(
        &self,
        field: &mut dyn Any,
        encoding: &TypeDescriptorRc,
        input: &mut ReadStream<'_>,
    ) -> Result<()> {
        if !self.can_read_field_with(encoding) {
            return Err(CoalError::Internal(format!(
                "structure '{}' bound to an incompatible encoding",
                self.name
            )));
        }
        let TypeDescriptor::Struct { mapper, .. } = encoding.as_ref() else {
            return Err(CoalError::Internal("structure encoding vanished".into()));
        };
        mapper.read_field(field, encoding, input)
    }

    fn type_mapper_dependencies(&self, each: &mut dyn FnMut(&TypeMapperRc)) {
        for field in &self.fields {
            with_dependencies(field.type_mapper(), each);
        }
    }

    fn object_references_in_field(
        &self,
        field: &dyn Any,
        cache: &mut WrapperCache,
        each: &mut dyn FnMut(InstanceRc),
    ) -> Result<()> {
        for child in &self.fields {
            let field_value = child.accessor().get(field)?;
            child
                .type_mapper()
                .object_references_in_field(field_value, cache, each)?;
        }
        Ok(())
    }
}
