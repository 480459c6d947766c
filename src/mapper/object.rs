//! Object classes, reference handles, and their mappers.
//!
//! An *object* is a reference target: it lives behind a shared [`Ref<T>`]
//! handle, has identity, may be part of cycles, and is serialized into a
//! cluster rather than inline. Three pieces cooperate:
//!
//! - [`Ref<T>`]: the nullable smart handle users put in fields. Equality,
//!   hashing and ordering are by identity (the shared allocation), exactly
//!   the semantics reference graphs need.
//! - [`ObjectTypeMapper`]: the live mapper of an object class: own fields,
//!   optional supertype binding, and the factory the deserializer uses to
//!   allocate instances. Instance writes, blob priming and reference
//!   enumeration all recurse into the supertype state first, matching the
//!   reader's supertype-first order.
//! - [`ReferenceTypeMapper<T>`]: the mapper of `Ref<T>` fields. On the
//!   wire a reference is a 1-based index into the frame's global instance
//!   list; `0` is null.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::blob::BinaryBlob;
use crate::descriptor::{TypeDescriptor, TypeDescriptorContext, TypeDescriptorRc};
use crate::error::{CoalError, Result};
use crate::format::TypeDescriptorKind;
use crate::mapper::{
    mapper_singleton, object_type_mapper, rc_mapper_id, with_dependencies, CoalObject, CoalType,
    FieldDescription, InstanceRc, ObjectInstance, SupertypeBinding, TypeMapper, TypeMapperRc,
    WrapperCache,
};
use crate::stream::{ReadStream, WriteStream};

/// A nullable, shared, identity-bearing handle to an object of class `T`.
pub struct Ref<T>(Option<Rc<RefCell<T>>>);

impl<T> Ref<T> {
    /// Allocates a fresh object and returns its handle.
    pub fn new(value: T) -> Self {
        Self(Some(Rc::new(RefCell::new(value))))
    }

    /// The null handle.
    pub fn null() -> Self {
        Self(None)
    }

    /// Wraps an existing shared cell.
    pub fn from_rc(rc: Rc<RefCell<T>>) -> Self {
        Self(Some(rc))
    }

    /// True for the null handle.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// The underlying shared cell, if any.
    pub fn as_rc(&self) -> Option<&Rc<RefCell<T>>> {
        self.0.as_ref()
    }

    /// Shared borrow of the pointee. `None` when null or already mutably
    /// borrowed.
    pub fn borrow(&self) -> Option<std::cell::Ref<'_, T>> {
        self.0.as_ref().and_then(|cell| cell.try_borrow().ok())
    }

    /// Mutable borrow of the pointee. `None` when null or already borrowed.
    pub fn borrow_mut(&self) -> Option<std::cell::RefMut<'_, T>> {
        self.0.as_ref().and_then(|cell| cell.try_borrow_mut().ok())
    }

    /// Identity comparison: both null, or both the same allocation.
    pub fn same(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }

    fn identity(&self) -> usize {
        self.0
            .as_ref()
            .map(|rc| Rc::as_ptr(rc) as usize)
            .unwrap_or(0)
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Ref<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<T> Eq for Ref<T> {}

impl<T> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl<T> PartialOrd for Ref<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Ref<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl<T> std::fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(rc) => write!(f, "Ref({:p})", Rc::as_ptr(rc)),
            None => f.write_str("Ref(null)"),
        }
    }
}

/// Wraps one live `Rc<RefCell<T>>` for the serializer and deserializer.
pub struct SharedInstance<T> {
    reference: Rc<RefCell<T>>,
    mapper: TypeMapperRc,
}

impl<T> SharedInstance<T> {
    /// Wraps `reference` with its class mapper.
    pub fn new(reference: Rc<RefCell<T>>, mapper: TypeMapperRc) -> Self {
        Self { reference, mapper }
    }
}

impl<T: 'static> ObjectInstance for SharedInstance<T> {
    fn type_mapper(&self) -> TypeMapperRc {
        self.mapper.clone()
    }

    fn base_pointer(&self) -> *const () {
        Rc::as_ptr(&self.reference) as *const ()
    }

    fn shared_handle(&self) -> Rc<dyn Any> {
        self.reference.clone()
    }

    fn with_instance(&self, action: &mut dyn FnMut(&dyn Any) -> Result<()>) -> Result<()> {
        let borrowed = self
            .reference
            .try_borrow()
            .map_err(|_| CoalError::Internal("instance already mutably borrowed".into()))?;
        action(&*borrowed)
    }

    fn with_instance_mut(&self, action: &mut dyn FnMut(&mut dyn Any) -> Result<()>) -> Result<()> {
        let mut borrowed = self
            .reference
            .try_borrow_mut()
            .map_err(|_| CoalError::Internal("instance already borrowed".into()))?;
        action(&mut *borrowed)
    }
}

/// Wraps the pointee of a non-null `Ref`, reusing the cached wrapper when
/// the same allocation was already seen through another field.
fn wrap_reference<T: CoalObject>(rc: &Rc<RefCell<T>>, cache: &mut WrapperCache) -> InstanceRc {
    let pointer = Rc::as_ptr(rc) as *const ();
    if let Some(existing) = cache.get(&pointer) {
        return existing.clone();
    }
    let wrapper: InstanceRc = Rc::new(SharedInstance::new(rc.clone(), object_type_mapper::<T>()));
    cache.insert(pointer, wrapper.clone());
    wrapper
}

type InstanceFactory = Box<dyn Fn() -> InstanceRc>;

/// Live mapper of a user object class.
pub(crate) struct ObjectTypeMapper {
    name: String,
    supertype: Option<SupertypeBinding>,
    fields: Vec<FieldDescription>,
    field_index_by_name: HashMap<String, usize>,
    factory: InstanceFactory,
}

impl ObjectTypeMapper {
    pub(crate) fn new(
        name: &str,
        supertype: Option<SupertypeBinding>,
        fields: Vec<FieldDescription>,
        factory: InstanceFactory,
    ) -> Self {
        let field_index_by_name = fields
            .iter()
            .enumerate()
            .map(|(index, field)| (field.name().to_string(), index))
            .collect();
        Self {
            name: name.to_string(),
            supertype,
            fields,
            field_index_by_name,
            factory,
        }
    }
}

impl TypeMapper for ObjectTypeMapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_object_type(&self) -> bool {
        true
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

    fn supertype_binding(&self) -> Option<&SupertypeBinding> {
        self.supertype.as_ref()
    }

    fn push_type_data_into_blob(&self, blob: &mut BinaryBlob) {
        blob.intern_str_16(&self.name);
        for field in &self.fields {
            field.push_type_data_into_blob(blob);
        }
    }

    fn push_instance_data_into_blob(&self, instance: &dyn Any, blob: &mut BinaryBlob) -> Result<()> {
        if let Some(supertype) = &self.supertype {
            let parent_state = supertype.accessor().get(instance)?;
            supertype
                .mapper()
                .push_instance_data_into_blob(parent_state, blob)?;
        }
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
        if let Some(supertype) = &self.supertype {
            let parent_state = supertype.accessor().get(instance)?;
            supertype.mapper().write_instance(parent_state, out)?;
        }
        for field in &self.fields {
            let field_value = field.accessor().get(instance)?;
            field.type_mapper().write_field(field_value, out)?;
        }
        Ok(())
    }

    fn make_instance(&self) -> Option<InstanceRc> {
        Some((self.factory)())
    }

    fn type_mapper_dependencies(&self, each: &mut dyn FnMut(&TypeMapperRc)) {
        if let Some(supertype) = &self.supertype {
            with_dependencies(supertype.mapper(), each);
        }
        for field in &self.fields {
            with_dependencies(field.type_mapper(), each);
        }
    }

    fn object_references_in_instance(
        &self,
        instance: &dyn Any,
        cache: &mut WrapperCache,
        each: &mut dyn FnMut(InstanceRc),
    ) -> Result<()> {
        if let Some(supertype) = &self.supertype {
            let parent_state = supertype.accessor().get(instance)?;
            supertype
                .mapper()
                .object_references_in_instance(parent_state, cache, each)?;
        }
        for field in &self.fields {
            let field_value = field.accessor().get(instance)?;
            field
                .type_mapper()
                .object_references_in_field(field_value, cache, each)?;
        }
        Ok(())
    }
}

/// Mapper of `Ref<T>` fields: typed references into the cluster table.
pub(crate) struct ReferenceTypeMapper<T: CoalObject> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: CoalObject> ReferenceTypeMapper<T> {
    fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    fn reference<'a>(&self, field: &'a dyn Any) -> Result<&'a Ref<T>> {
        field
            .downcast_ref::<Ref<T>>()
            .ok_or_else(|| CoalError::Internal("field is not a reference handle".into()))
    }
}

impl<T: CoalObject> TypeMapper for ReferenceTypeMapper<T> {
    fn name(&self) -> &str {
        TypeDescriptorKind::TypedObject.name()
    }

    fn is_reference_type(&self) -> bool {
        true
    }

    fn is_serialization_dependency(&self) -> bool {
        true
    }

    fn write_field(&self, field: &dyn Any, out: &mut WriteStream) -> Result<()> {
        match self.reference(field)?.as_rc() {
            Some(rc) => out.write_object_reference(Rc::as_ptr(rc) as *const ()),
            None => {
                out.write_u32(0);
                Ok(())
            }
        }
    }

    fn descriptor_for(&self, ctx: &mut TypeDescriptorContext) -> Result<TypeDescriptorRc> {
        ctx.typed_object_reference(&object_type_mapper::<T>())
    }

    fn can_read_field_with(&self, encoding: &TypeDescriptor) -> bool {
        match encoding {
            // An untyped reference carries no cluster, so any handle may
            // attempt the read; the instance's class is checked then.
            TypeDescriptor::Primitive(TypeDescriptorKind::Object) => true,
            TypeDescriptor::TypedObject { mapper, .. } => mapper
                .resolved_type()
                .map(|resolved| rc_mapper_id(&resolved) == rc_mapper_id(&object_type_mapper::<T>()))
                .unwrap_or(false),
            _ => false,
        }
    }

    fn read_field(
        &self,
        field: &mut dyn Any,
        encoding: &TypeDescriptorRc,
        input: &mut ReadStream<'_>,
    ) -> Result<()> {
        let instance = input.read_instance_reference()?;
        let destination = field
            .downcast_mut::<Ref<T>>()
            .ok_or_else(|| CoalError::Internal("field is not a reference handle".into()))?;
        *destination = Ref::null();

        let Some(instance) = instance else {
            return Ok(());
        };

        // Untyped wire references may point at any class; a class mismatch
        // leaves the handle null rather than failing the decode.
        if matches!(
            encoding.as_ref(),
            TypeDescriptor::Primitive(TypeDescriptorKind::Object)
        ) && rc_mapper_id(&instance.type_mapper()) != rc_mapper_id(&object_type_mapper::<T>())
        {
            return Ok(());
        }

        let cell = instance
            .shared_handle()
            .downcast::<RefCell<T>>()
            .map_err(|_| CoalError::Internal("instance class does not match reference".into()))?;
        *destination = Ref::from_rc(cell);
        Ok(())
    }

    fn type_mapper_dependencies(&self, each: &mut dyn FnMut(&TypeMapperRc)) {
        each(&object_type_mapper::<T>());
    }

    fn object_references_in_field(
        &self,
        field: &dyn Any,
        cache: &mut WrapperCache,
        each: &mut dyn FnMut(InstanceRc),
    ) -> Result<()> {
        if let Some(rc) = self.reference(field)?.as_rc() {
            each(wrap_reference::<T>(rc, cache));
        }
        Ok(())
    }
}

impl<T: CoalObject> CoalType for Ref<T> {
    fn type_mapper() -> TypeMapperRc {
        mapper_singleton::<ReferenceTypeMapper<T>>(|| Rc::new(ReferenceTypeMapper::<T>::new()))
    }

    fn wrap_root(&self) -> Result<Option<InstanceRc>> {
        Ok(self.as_rc().map(|rc| {
            Rc::new(SharedInstance::new(rc.clone(), object_type_mapper::<T>())) as InstanceRc
        }))
    }

    fn root_type_mapper() -> TypeMapperRc {
        object_type_mapper::<T>()
    }

    fn unwrap_root(instance: Option<InstanceRc>) -> Result<Self> {
        let Some(instance) = instance else {
            return Ok(Ref::null());
        };
        let cell = instance
            .shared_handle()
            .downcast::<RefCell<T>>()
            .map_err(|_| CoalError::Format("root instance is not the requested class".into()))?;
        Ok(Ref::from_rc(cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_identity_semantics() {
        let a = Ref::new(5u32);
        let b = a.clone();
        let c = Ref::new(5u32);
        assert!(a.same(&b));
        assert_eq!(a, b);
        assert!(!a.same(&c));
        assert_ne!(a, c);
        assert!(Ref::<u32>::null().same(&Ref::null()));
    }

    #[test]
    fn ref_borrows_are_fallible_not_panicking() {
        let a = Ref::new(1u8);
        let held = a.borrow_mut();
        assert!(held.is_some());
        assert!(a.borrow().is_none());
        drop(held);
        assert_eq!(*a.borrow().expect("free again"), 1);
        assert!(Ref::<u8>::null().borrow().is_none());
    }
}
