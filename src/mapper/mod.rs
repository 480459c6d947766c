//! Type mappers: the in-memory description of how a host type is encoded.
//!
//! A [`TypeMapper`] owns everything the serializer and deserializer need to
//! know about one host type: its wire name, its kind (primitive, value
//! structure, object, reference, collection), its field list, and the
//! encode/decode/skip/prime quartet. Mappers are one-per-host-type
//! singletons so that identity comparisons (`Rc` data pointers) can be used
//! as map keys during tracing, cluster assignment, and field resolution.
//!
//! Field access is type-erased: a [`FieldAccessor`] projects a borrowed
//! instance (`&dyn Any`) to one of its fields, so the non-generic aggregate
//! mappers can walk arbitrary user structs without knowing their layout at
//! compile time. Accessors are built from plain fn-pointer projections; the
//! derive macros generate them, and hand-written metadata can too.
//!
//! Submodules provide the concrete mapper kinds:
//!
//! - [`primitive`]: scalar hosts and `String`
//! - [`structure`]: value aggregates
//! - [`object`]: reference aggregates, [`Ref<T>`](object::Ref) handles, and
//!   the reference mapper
//! - [`collection`]: `Vec`, sets, maps, fixed arrays
//! - [`materialization`]: wire-side mappers built during deserialization

pub mod collection;
pub mod materialization;
pub mod object;
pub mod primitive;
pub mod structure;

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::api::RootValueBox;
use crate::blob::BinaryBlob;
use crate::descriptor::{TypeDescriptor, TypeDescriptorContext, TypeDescriptorRc};
use crate::error::{CoalError, Result};
use crate::stream::{ReadStream, WriteStream};

use object::{ObjectTypeMapper, SharedInstance};
use structure::StructureTypeMapper;

/// Shared handle to a type mapper.
pub type TypeMapperRc = Rc<dyn TypeMapper>;

/// Shared handle to a wrapped live object instance.
pub type InstanceRc = Rc<dyn ObjectInstance>;

/// By-base-pointer cache of instance wrappers, so that an object reached
/// through several fields is wrapped exactly once.
pub type WrapperCache = HashMap<*const (), InstanceRc>;

/// Identity key of a mapper behind a trait object.
#[inline]
pub(crate) fn mapper_id(mapper: &dyn TypeMapper) -> *const () {
    mapper as *const dyn TypeMapper as *const ()
}

/// Identity key of a shared mapper handle. Agrees with [`mapper_id`] for
/// the same underlying allocation.
#[inline]
pub(crate) fn rc_mapper_id(mapper: &TypeMapperRc) -> *const () {
    Rc::as_ptr(mapper) as *const ()
}

/// A type-erased projection from an instance to one of its fields.
pub struct FieldAccessor {
    project: Box<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any>>,
    project_mut: Box<dyn for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any>>,
}

impl FieldAccessor {
    /// Builds an accessor from a pair of member projections.
    pub fn member<C: 'static, F: 'static>(
        get: fn(&C) -> &F,
        get_mut: fn(&mut C) -> &mut F,
    ) -> Rc<Self> {
        Rc::new(Self {
            project: Box::new(move |base| base.downcast_ref::<C>().map(|c| get(c) as &dyn Any)),
            project_mut: Box::new(move |base| {
                base.downcast_mut::<C>().map(|c| get_mut(c) as &mut dyn Any)
            }),
        })
    }

    /// Projects a shared borrow of the owning instance to the field.
    pub fn get<'a>(&self, base: &'a dyn Any) -> Result<&'a dyn Any> {
        (self.project)(base)
            .ok_or_else(|| CoalError::Internal("field accessor applied to foreign instance".into()))
    }

    /// Projects a mutable borrow of the owning instance to the field.
    pub fn get_mut<'a>(&self, base: &'a mut dyn Any) -> Result<&'a mut dyn Any> {
        (self.project_mut)(base)
            .ok_or_else(|| CoalError::Internal("field accessor applied to foreign instance".into()))
    }
}

impl std::fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldAccessor")
    }
}

/// One live-side field: wire name, child mapper, accessor.
#[derive(Clone)]
pub struct FieldDescription {
    name: String,
    type_mapper: TypeMapperRc,
    accessor: Rc<FieldAccessor>,
}

impl FieldDescription {
    /// Describes field `name` of owner `C` with host type `F`.
    pub fn new<C: 'static, F: CoalType>(
        name: &str,
        get: fn(&C) -> &F,
        get_mut: fn(&mut C) -> &mut F,
    ) -> Self {
        Self {
            name: name.to_string(),
            type_mapper: F::type_mapper(),
            accessor: FieldAccessor::member(get, get_mut),
        }
    }

    /// The wire name of the field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The mapper of the field's host type.
    pub fn type_mapper(&self) -> &TypeMapperRc {
        &self.type_mapper
    }

    /// The projection from the owning instance to this field.
    pub fn accessor(&self) -> &Rc<FieldAccessor> {
        &self.accessor
    }

    pub(crate) fn push_type_data_into_blob(&self, blob: &mut BinaryBlob) {
        blob.intern_str_16(&self.name);
    }

    pub(crate) fn write_description(
        &self,
        ctx: &mut TypeDescriptorContext,
        out: &mut WriteStream,
    ) -> Result<()> {
        out.write_utf8_32_16(&self.name)?;
        let descriptor = ctx.descriptor_for_mapper(&self.type_mapper)?;
        descriptor.write_description(out)
    }
}

impl std::fmt::Debug for FieldDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescription")
            .field("name", &self.name)
            .field("type", &self.type_mapper.name())
            .finish()
    }
}

/// Links a subclass object mapper to its supertype: the parent's mapper plus
/// the projection from the subclass instance to its embedded parent state.
#[derive(Clone)]
pub struct SupertypeBinding {
    mapper: TypeMapperRc,
    accessor: Rc<FieldAccessor>,
}

impl SupertypeBinding {
    /// Binds owner `C` to its embedded parent state of object type `P`.
    pub fn new<C: 'static, P: CoalObject>(
        get: fn(&C) -> &P,
        get_mut: fn(&mut C) -> &mut P,
    ) -> Self {
        Self {
            mapper: object_type_mapper::<P>(),
            accessor: FieldAccessor::member(get, get_mut),
        }
    }

    /// The supertype's object mapper.
    pub fn mapper(&self) -> &TypeMapperRc {
        &self.mapper
    }

    /// The projection to the embedded parent state.
    pub fn accessor(&self) -> &Rc<FieldAccessor> {
        &self.accessor
    }
}

/// Polymorphic behavior of one host type on the wire.
///
/// Defaults mirror the "not applicable for this kind" behavior: predicate
/// defaults are `false`, walk defaults are empty, and operations that a kind
/// must override report an internal error instead of panicking.
pub trait TypeMapper: 'static {
    /// Unique wire name of the type.
    fn name(&self) -> &str;

    /// True for reference aggregates (object classes).
    fn is_object_type(&self) -> bool {
        false
    }

    /// True for nullable smart-handle mappers.
    fn is_reference_type(&self) -> bool {
        false
    }

    /// True for field-list aggregates (structures and objects).
    fn is_aggregate_type(&self) -> bool {
        false
    }

    /// True when the type participates in the registry's transitive closure.
    fn is_serialization_dependency(&self) -> bool {
        false
    }

    /// True for wire-side materialization mappers.
    fn is_materialization_adaptation(&self) -> bool {
        false
    }

    /// The live mapper a materialization mapper resolved to, if any.
    fn resolved_type(&self) -> Option<TypeMapperRc> {
        None
    }

    /// Number of declared fields.
    fn field_count(&self) -> u16 {
        0
    }

    /// Looks up a declared field by wire name.
    fn field_named(&self, _name: &str) -> Option<&FieldDescription> {
        None
    }

    /// The supertype link of an object mapper.
    fn supertype_binding(&self) -> Option<&SupertypeBinding> {
        None
    }

    /// Interns the type-level strings (type name, field names).
    fn push_type_data_into_blob(&self, _blob: &mut BinaryBlob) {}

    /// Interns the variable-length payload of one field value.
    fn push_field_data_into_blob(&self, _field: &dyn Any, _blob: &mut BinaryBlob) -> Result<()> {
        Ok(())
    }

    /// Interns the variable-length payloads of one whole instance.
    fn push_instance_data_into_blob(
        &self,
        _instance: &dyn Any,
        _blob: &mut BinaryBlob,
    ) -> Result<()> {
        Ok(())
    }

    /// Writes the `(name, encoding)` pairs of the declared fields.
    fn write_field_descriptions(
        &self,
        _ctx: &mut TypeDescriptorContext,
        _out: &mut WriteStream,
    ) -> Result<()> {
        Err(CoalError::Internal(format!(
            "'{}' has no field descriptions to write",
            self.name()
        )))
    }

    /// Writes one instance, field by field in declared order.
    fn write_instance(&self, _instance: &dyn Any, _out: &mut WriteStream) -> Result<()> {
        Err(CoalError::Internal(format!(
            "'{}' cannot write instances",
            self.name()
        )))
    }

    /// Writes one field value.
    fn write_field(&self, _field: &dyn Any, _out: &mut WriteStream) -> Result<()> {
        Err(CoalError::Internal(format!(
            "'{}' cannot write fields",
            self.name()
        )))
    }

    /// Produces (or retrieves from the context) the wire encoding of this
    /// type when used as a field.
    fn descriptor_for(&self, _ctx: &mut TypeDescriptorContext) -> Result<TypeDescriptorRc> {
        Err(CoalError::Internal(format!(
            "'{}' has no field encoding",
            self.name()
        )))
    }

    /// Whether this mapper can decode a field stored with `encoding`.
    fn can_read_field_with(&self, _encoding: &TypeDescriptor) -> bool {
        false
    }

    /// Decodes one field value stored with `encoding`.
    fn read_field(
        &self,
        _field: &mut dyn Any,
        _encoding: &TypeDescriptorRc,
        _input: &mut ReadStream<'_>,
    ) -> Result<()> {
        Err(CoalError::Internal(format!(
            "'{}' cannot read fields",
            self.name()
        )))
    }

    /// Decodes one whole instance.
    fn read_instance(&self, _instance: &mut dyn Any, _input: &mut ReadStream<'_>) -> Result<()> {
        Err(CoalError::Internal(format!(
            "'{}' cannot read instances",
            self.name()
        )))
    }

    /// Consumes the bytes of one instance without materializing it.
    fn skip_instance(&self, _input: &mut ReadStream<'_>) -> Result<()> {
        Err(CoalError::Internal(format!(
            "'{}' cannot skip instances",
            self.name()
        )))
    }

    /// Consumes the bytes of one field of this type.
    ///
    /// Skipping is a wire-side concern: a `Struct` encoding delegates here
    /// so the indexed materialization layout can walk its field encodings.
    /// Live mappers never receive a skip request, because every descriptor
    /// a skip can reach was parsed from the frame and therefore carries a
    /// materialization mapper.
    fn skip_field(&self, _input: &mut ReadStream<'_>) -> Result<()> {
        Err(CoalError::Internal(format!(
            "'{}' cannot skip fields",
            self.name()
        )))
    }

    /// Allocates a fresh default instance (object types only).
    fn make_instance(&self) -> Option<InstanceRc> {
        None
    }

    /// Enumerates the mappers this one depends on (supertype first for
    /// objects, then field types; element/key/value types for collections).
    fn type_mapper_dependencies(&self, _each: &mut dyn FnMut(&TypeMapperRc)) {}

    /// Enumerates the live object references stored in one instance,
    /// supertype state first.
    fn object_references_in_instance(
        &self,
        _instance: &dyn Any,
        _cache: &mut WrapperCache,
        _each: &mut dyn FnMut(InstanceRc),
    ) -> Result<()> {
        Ok(())
    }

    /// Enumerates the live object references stored in one field value.
    fn object_references_in_field(
        &self,
        _field: &dyn Any,
        _cache: &mut WrapperCache,
        _each: &mut dyn FnMut(InstanceRc),
    ) -> Result<()> {
        Ok(())
    }
}

/// Walks a mapper and its dependency graph the way the registry builder and
/// the serializer's dependency scan expect: the mapper itself first (when it
/// participates in serialization), then its dependencies.
pub(crate) fn with_dependencies(mapper: &TypeMapperRc, each: &mut dyn FnMut(&TypeMapperRc)) {
    if mapper.is_serialization_dependency() {
        each(mapper);
    }
    mapper.type_mapper_dependencies(each);
}

/// A host-neutral wrapper around one live object.
///
/// The serializer and deserializer only ever deal in these: identity comes
/// from [`base_pointer`](Self::base_pointer), state access goes through the
/// borrow hooks, and [`shared_handle`](Self::shared_handle) recovers the
/// underlying `Rc` so reference fields can be rebuilt on read.
pub trait ObjectInstance {
    /// The mapper of the wrapped object's type.
    fn type_mapper(&self) -> TypeMapperRc;

    /// Stable identity of the wrapped object.
    fn base_pointer(&self) -> *const ();

    /// The underlying shared cell, for reference reconstruction.
    fn shared_handle(&self) -> Rc<dyn Any>;

    /// Runs `action` over a shared borrow of the object state.
    fn with_instance(&self, action: &mut dyn FnMut(&dyn Any) -> Result<()>) -> Result<()>;

    /// Runs `action` over a mutable borrow of the object state.
    fn with_instance_mut(&self, action: &mut dyn FnMut(&mut dyn Any) -> Result<()>) -> Result<()>;
}

/// A host type that can appear as a field (or root) of a serialized graph.
///
/// Implementations exist for the primitive scalars, `String`, the supported
/// collections, [`Ref<T>`](object::Ref), and (via `#[derive(CoalStructure)]`)
/// user value structures.
pub trait CoalType: Clone + Default + 'static {
    /// The singleton mapper for this host type.
    fn type_mapper() -> TypeMapperRc;

    /// Wraps a root value for serialization. Value types box themselves in
    /// a [`RootValueBox`]; reference types override this to hand over the
    /// pointee directly (or `None` for a null root).
    fn wrap_root(&self) -> Result<Option<InstanceRc>> {
        let boxed = RootValueBox {
            value: self.clone(),
        };
        let mapper = Self::root_type_mapper();
        Ok(Some(Rc::new(SharedInstance::new(
            Rc::new(RefCell::new(boxed)),
            mapper,
        ))))
    }

    /// The object mapper the deserialization registry is rooted at.
    fn root_type_mapper() -> TypeMapperRc {
        object_type_mapper::<RootValueBox<Self>>()
    }

    /// Lifts the user-facing value back out of the decoded root instance.
    fn unwrap_root(instance: Option<InstanceRc>) -> Result<Self> {
        let instance =
            instance.ok_or_else(|| CoalError::Format("frame has a null value root".into()))?;
        let cell = instance
            .shared_handle()
            .downcast::<RefCell<RootValueBox<Self>>>()
            .map_err(|_| CoalError::Format("root instance is not the expected value box".into()))?;
        let value = cell.borrow().value.clone();
        Ok(value)
    }
}

/// Metadata of a user-defined value structure.
///
/// Usually implemented through `#[derive(CoalStructure)]`.
pub trait CoalStructure: Clone + Default + 'static {
    /// Wire name of the structure.
    fn type_name() -> &'static str;

    /// Declared fields, in wire order.
    fn fields() -> Vec<FieldDescription>;
}

/// Metadata of a user-defined object class (a reference target).
///
/// Usually implemented through `#[derive(CoalObject)]`. Objects are held and
/// exchanged through [`Ref<T>`](object::Ref) handles.
pub trait CoalObject: Default + 'static {
    /// Wire name of the class.
    fn type_name() -> &'static str;

    /// Declared own fields (excluding supertype state), in wire order.
    fn fields() -> Vec<FieldDescription>;

    /// The supertype link, when this class extends another.
    fn supertype() -> Option<SupertypeBinding> {
        None
    }
}

thread_local! {
    static MAPPER_TABLE: RefCell<HashMap<TypeId, TypeMapperRc>> = RefCell::new(HashMap::new());
}

/// Returns the singleton mapper registered under key type `K`, building it
/// on first use. The build runs outside the table borrow so that building
/// one mapper may request others.
pub(crate) fn mapper_singleton<K: 'static>(build: impl FnOnce() -> TypeMapperRc) -> TypeMapperRc {
    let key = TypeId::of::<K>();
    let existing = MAPPER_TABLE.with(|table| table.borrow().get(&key).cloned());
    if let Some(mapper) = existing {
        return mapper;
    }
    let built = build();
    MAPPER_TABLE.with(|table| table.borrow_mut().entry(key).or_insert(built).clone())
}

// Table keys only; never constructed.
#[allow(dead_code)]
struct StructureKey<T>(PhantomData<T>);
#[allow(dead_code)]
struct ObjectKey<T>(PhantomData<T>);

/// The singleton mapper of a value structure `T`.
pub fn structure_type_mapper<T: CoalStructure>() -> TypeMapperRc {
    mapper_singleton::<StructureKey<T>>(|| {
        Rc::new(StructureTypeMapper::new(T::type_name(), T::fields()))
    })
}

/// The singleton mapper of an object class `T`.
pub fn object_type_mapper<T: CoalObject>() -> TypeMapperRc {
    mapper_singleton::<ObjectKey<T>>(|| {
        Rc::new(ObjectTypeMapper::new(
            T::type_name(),
            T::supertype(),
            T::fields(),
            Box::new(|| {
                let mapper = object_type_mapper::<T>();
                let instance: InstanceRc = Rc::new(SharedInstance::new(
                    Rc::new(RefCell::new(T::default())),
                    mapper,
                ));
                instance
            }),
        ))
    })
}
