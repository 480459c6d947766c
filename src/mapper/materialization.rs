//! Materialization mappers: the wire side of schema evolution.
//!
//! When a frame is parsed, every value-type layout and every cluster
//! description becomes a *materialization* mapper, a mapper built from wire
//! metadata instead of live type information. Resolution then rebinds it to
//! the receiver's in-memory types: first the type itself (by wire name,
//! object-ness must match), then field by field (same name, and the live
//! field's mapper must accept the wire encoding).
//!
//! Unresolved pieces degrade locally, never fatally: an unbound wire field
//! is skipped through its descriptor, an unbound live field keeps its
//! default, and a cluster whose type name is unknown has its instances
//! null-allocated and skipped wholesale.

use std::any::Any;
use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use crate::descriptor::{TypeDescriptor, TypeDescriptorContext, TypeDescriptorRc};
use crate::error::{CoalError, Result};
use crate::mapper::{
    mapper_id, rc_mapper_id, FieldDescription, InstanceRc, TypeMapper, TypeMapperRc,
};
use crate::stream::ReadStream;

/// One wire-side field: name, encoding, and (after resolution) the live
/// field it binds to.
pub(crate) struct MaterializationField {
    pub(crate) name: String,
    pub(crate) encoding: TypeDescriptorRc,
    pub(crate) target_field: Option<FieldDescription>,
    pub(crate) target_type_mapper: Option<TypeMapperRc>,
}

impl MaterializationField {
    /// Parses one `(name, encoding)` pair.
    pub(crate) fn read_description(
        ctx: &mut TypeDescriptorContext,
        input: &mut ReadStream<'_>,
    ) -> Result<Self> {
        let name = input.read_utf8_32_16()?;
        let encoding = ctx.read_descriptor(input)?;
        Ok(Self {
            name,
            encoding,
            target_field: None,
            target_type_mapper: None,
        })
    }
}

/// Binds wire fields to same-named live fields that accept their encodings.
fn resolve_fields(fields: &mut [MaterializationField], resolved: &TypeMapperRc) {
    for field in fields.iter_mut() {
        let Some(target) = resolved.field_named(&field.name) else {
            continue;
        };
        let target_mapper = target.type_mapper().clone();
        if !target_mapper.can_read_field_with(&field.encoding) {
            continue;
        }
        field.target_field = Some(target.clone());
        field.target_type_mapper = Some(target_mapper);
    }
}

fn read_or_skip_fields(
    fields: &[MaterializationField],
    instance: &mut dyn Any,
    input: &mut ReadStream<'_>,
) -> Result<()> {
    for field in fields {
        match (&field.target_field, &field.target_type_mapper) {
            (Some(target), Some(mapper)) => {
                let field_value = target.accessor().get_mut(instance)?;
                mapper.read_field(field_value, &field.encoding, input)?;
            }
            _ => field.encoding.skip_data(input)?,
        }
    }
    Ok(())
}

/// Wire-side mapper of one value-type layout.
pub(crate) struct StructureMaterializationTypeMapper {
    name: String,
    fields: RefCell<Vec<MaterializationField>>,
    resolved: RefCell<Option<TypeMapperRc>>,
}

impl StructureMaterializationTypeMapper {
    pub(crate) fn new(name: String, fields: Vec<MaterializationField>) -> Self {
        Self {
            name,
            fields: RefCell::new(fields),
            resolved: RefCell::new(None),
        }
    }

    /// Accepts a live mapper of matching kind as the resolution target.
    pub(crate) fn resolve_type_using(&self, candidate: Option<TypeMapperRc>) {
        let Some(candidate) = candidate else {
            return;
        };
        if candidate.is_object_type() {
            return;
        }
        *self.resolved.borrow_mut() = Some(candidate);
    }

    /// Binds wire fields against the resolved live type.
    pub(crate) fn resolve_type_fields(&self) {
        let resolved = self.resolved.borrow().clone();
        if let Some(resolved) = resolved {
            resolve_fields(&mut self.fields.borrow_mut(), &resolved);
        }
    }
}

impl TypeMapper for StructureMaterializationTypeMapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_aggregate_type(&self) -> bool {
        true
    }

    fn is_materialization_adaptation(&self) -> bool {
        true
    }

    fn resolved_type(&self) -> Option<TypeMapperRc> {
        self.resolved.borrow().clone()
    }

    fn field_count(&self) -> u16 {
        self.fields.borrow().len() as u16
    }

    fn can_read_field_with(&self, encoding: &TypeDescriptor) -> bool {
        match encoding {
            TypeDescriptor::Struct { mapper, .. } => rc_mapper_id(mapper) == mapper_id(self),
            _ => false,
        }
    }

    fn read_field(
        &self,
        field: &mut dyn Any,
        _encoding: &TypeDescriptorRc,
        input: &mut ReadStream<'_>,
    ) -> Result<()> {
        read_or_skip_fields(&self.fields.borrow(), field, input)
    }

    fn skip_field(&self, input: &mut ReadStream<'_>) -> Result<()> {
        for field in self.fields.borrow().iter() {
            field.encoding.skip_data(input)?;
        }
        Ok(())
    }
}

/// Wire-side mapper of one cluster.
///
/// Pre-allocated empty before any cluster body is parsed, so that
/// `TypedObject(index)` encodings inside field descriptions can already
/// reference it; filled in as its description is read.
pub(crate) struct ObjectMaterializationTypeMapper {
    name: OnceCell<String>,
    supertype: OnceCell<Rc<ObjectMaterializationTypeMapper>>,
    fields: RefCell<Vec<MaterializationField>>,
    resolved: RefCell<Option<TypeMapperRc>>,
}

impl ObjectMaterializationTypeMapper {
    pub(crate) fn new() -> Self {
        Self {
            name: OnceCell::new(),
            supertype: OnceCell::new(),
            fields: RefCell::new(Vec::new()),
            resolved: RefCell::new(None),
        }
    }

    pub(crate) fn set_name(&self, name: String) {
        let _ = self.name.set(name);
    }

    pub(crate) fn set_supertype(&self, supertype: Rc<ObjectMaterializationTypeMapper>) {
        let _ = self.supertype.set(supertype);
    }

    pub(crate) fn set_fields(&self, fields: Vec<MaterializationField>) {
        *self.fields.borrow_mut() = fields;
    }

    /// Accepts a live object mapper as the resolution target.
    pub(crate) fn resolve_type_using(&self, candidate: Option<TypeMapperRc>) {
        let Some(candidate) = candidate else {
            return;
        };
        if !candidate.is_object_type() {
            return;
        }
        *self.resolved.borrow_mut() = Some(candidate);
    }

    /// Binds wire fields against the resolved live class.
    pub(crate) fn resolve_type_fields(&self) {
        let resolved = self.resolved.borrow().clone();
        if let Some(resolved) = resolved {
            resolve_fields(&mut self.fields.borrow_mut(), &resolved);
        }
    }

    /// Reads supertype state into the projected parent sub-state when both
    /// sides agree on the parent class; otherwise the parent bytes are
    /// structurally skipped.
    fn read_supertype_state(
        &self,
        instance: &mut dyn Any,
        input: &mut ReadStream<'_>,
    ) -> Result<()> {
        let Some(supertype) = self.supertype.get() else {
            return Ok(());
        };

        let binding = self
            .resolved
            .borrow()
            .as_ref()
            .and_then(|live| live.supertype_binding().cloned());
        if let Some(binding) = binding {
            let parent_matches = supertype
                .resolved_type()
                .map(|resolved| rc_mapper_id(&resolved) == rc_mapper_id(binding.mapper()))
                .unwrap_or(false);
            if parent_matches {
                let parent_state = binding.accessor().get_mut(instance)?;
                return supertype.read_instance(parent_state, input);
            }
        }
        supertype.skip_instance(input)
    }
}

impl TypeMapper for ObjectMaterializationTypeMapper {
    fn name(&self) -> &str {
        self.name.get().map(String::as_str).unwrap_or("")
    }

    fn is_object_type(&self) -> bool {
        true
    }

    fn is_aggregate_type(&self) -> bool {
        true
    }

    fn is_materialization_adaptation(&self) -> bool {
        true
    }

    fn resolved_type(&self) -> Option<TypeMapperRc> {
        self.resolved.borrow().clone()
    }

    fn field_count(&self) -> u16 {
        self.fields.borrow().len() as u16
    }

    fn make_instance(&self) -> Option<InstanceRc> {
        self.resolved
            .borrow()
            .as_ref()
            .and_then(|resolved| resolved.make_instance())
    }

    fn read_instance(&self, instance: &mut dyn Any, input: &mut ReadStream<'_>) -> Result<()> {
        self.read_supertype_state(instance, input)?;
        read_or_skip_fields(&self.fields.borrow(), instance, input)
    }

    fn skip_instance(&self, input: &mut ReadStream<'_>) -> Result<()> {
        if let Some(supertype) = self.supertype.get() {
            supertype.skip_instance(input)?;
        }
        for field in self.fields.borrow().iter() {
            field.encoding.skip_data(input)?;
        }
        Ok(())
    }

    fn skip_field(&self, _input: &mut ReadStream<'_>) -> Result<()> {
        Err(CoalError::Internal(
            "object types are referenced, never stored inline".into(),
        ))
    }
}
