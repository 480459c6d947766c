//! Collection mappers: sequences, sets, maps, and fixed arrays.
//!
//! Wire forms are `ArrayK`/`SetK`/`MapK` with a K-bit element count, plus
//! `FixedArray(size, element)` with no count at the field site. Writers
//! always emit the 32-bit count widths; readers accept any K. Ordered and
//! unordered containers of the same shape share a wire form, which is what
//! makes `BTreeSet` ↔ `HashSet` and `BTreeMap` ↔ `HashMap` interop free.
//!
//! Element behavior is fully delegated to the element mappers, so any
//! field type composes, including structures, references and nested
//! collections.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::blob::BinaryBlob;
use crate::descriptor::{read_count, TypeDescriptor, TypeDescriptorContext, TypeDescriptorRc};
use crate::error::{CoalError, Result};
use crate::format::TypeDescriptorKind;
use crate::mapper::{
    mapper_singleton, with_dependencies, CoalType, InstanceRc, TypeMapper, TypeMapperRc,
    WrapperCache,
};
use crate::stream::{ReadStream, WriteStream};

fn write_count32(len: usize, out: &mut WriteStream) -> Result<()> {
    let count = u32::try_from(len)
        .map_err(|_| CoalError::Format("collection exceeds 2^32-1 elements".into()))?;
    out.write_u32(count);
    Ok(())
}

// --- SEQUENCES ---

/// Mapper of `Vec<T>`.
pub(crate) struct ArrayTypeMapper<T: CoalType> {
    element: TypeMapperRc,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CoalType> ArrayTypeMapper<T> {
    fn new() -> Self {
        Self {
            element: T::type_mapper(),
            _marker: PhantomData,
        }
    }

    fn vector<'a>(&self, field: &'a dyn Any) -> Result<&'a Vec<T>> {
        field
            .downcast_ref::<Vec<T>>()
            .ok_or_else(|| CoalError::Internal("field is not the mapped sequence".into()))
    }
}

impl<T: CoalType> TypeMapper for ArrayTypeMapper<T> {
    fn name(&self) -> &str {
        TypeDescriptorKind::Array32.name()
    }

    fn push_field_data_into_blob(&self, field: &dyn Any, blob: &mut BinaryBlob) -> Result<()> {
        for element in self.vector(field)? {
            self.element.push_field_data_into_blob(element, blob)?;
        }
        Ok(())
    }

    fn write_field(&self, field: &dyn Any, out: &mut WriteStream) -> Result<()> {
        let vector = self.vector(field)?;
        write_count32(vector.len(), out)?;
        for element in vector {
            self.element.write_field(element, out)?;
        }
        Ok(())
    }

    fn descriptor_for(&self, ctx: &mut TypeDescriptorContext) -> Result<TypeDescriptorRc> {
        let element = ctx.descriptor_for_mapper(&self.element)?;
        Ok(ctx.array_descriptor(TypeDescriptorKind::Array32, element))
    }

    fn can_read_field_with(&self, encoding: &TypeDescriptor) -> bool {
        match encoding {
            TypeDescriptor::Array { element, .. } => self.element.can_read_field_with(element),
            _ => false,
        }
    }

    fn read_field(
        &self,
        field: &mut dyn Any,
        encoding: &TypeDescriptorRc,
        input: &mut ReadStream<'_>,
    ) -> Result<()> {
        let TypeDescriptor::Array { kind, element } = encoding.as_ref() else {
            return Err(CoalError::Internal("sequence stored as non-array".into()));
        };
        let element_encoding = element.clone();
        let count = read_count(*kind, input)?;
        let destination = field
            .downcast_mut::<Vec<T>>()
            .ok_or_else(|| CoalError::Internal("field is not the mapped sequence".into()))?;
        destination.clear();
        destination.reserve(count);
        for _ in 0..count {
            let mut slot = T::default();
            self.element
                .read_field(&mut slot, &element_encoding, input)?;
            destination.push(slot);
        }
        Ok(())
    }

    fn type_mapper_dependencies(&self, each: &mut dyn FnMut(&TypeMapperRc)) {
        with_dependencies(&self.element, each);
    }

    fn object_references_in_field(
        &self,
        field: &dyn Any,
        cache: &mut WrapperCache,
        each: &mut dyn FnMut(InstanceRc),
    ) -> Result<()> {
        for element in self.vector(field)? {
            self.element.object_references_in_field(element, cache, each)?;
        }
        Ok(())
    }
}

impl<T: CoalType> CoalType for Vec<T> {
    fn type_mapper() -> TypeMapperRc {
        mapper_singleton::<ArrayTypeMapper<T>>(|| Rc::new(ArrayTypeMapper::<T>::new()))
    }
}

// --- SETS ---

/// A set-shaped container whose elements Coal can map.
pub(crate) trait SetContainer: Clone + Default + 'static {
    type Element: CoalType;

    fn len(&self) -> usize;
    fn for_each_element(&self, each: &mut dyn FnMut(&dyn Any) -> Result<()>) -> Result<()>;
    fn insert_element(&mut self, element: Self::Element);
}

impl<T: CoalType + Ord> SetContainer for BTreeSet<T> {
    type Element = T;

    fn len(&self) -> usize {
        BTreeSet::len(self)
    }

    fn for_each_element(&self, each: &mut dyn FnMut(&dyn Any) -> Result<()>) -> Result<()> {
        for element in self {
            each(element)?;
        }
        Ok(())
    }

    fn insert_element(&mut self, element: T) {
        self.insert(element);
    }
}

impl<T: CoalType + Eq + Hash> SetContainer for HashSet<T> {
    type Element = T;

    fn len(&self) -> usize {
        HashSet::len(self)
    }

    fn for_each_element(&self, each: &mut dyn FnMut(&dyn Any) -> Result<()>) -> Result<()> {
        for element in self {
            each(element)?;
        }
        Ok(())
    }

    fn insert_element(&mut self, element: T) {
        self.insert(element);
    }
}

/// Mapper of set-shaped containers.
pub(crate) struct SetTypeMapper<C: SetContainer> {
    element: TypeMapperRc,
    _marker: PhantomData<fn() -> C>,
}

impl<C: SetContainer> SetTypeMapper<C> {
    fn new() -> Self {
        Self {
            element: C::Element::type_mapper(),
            _marker: PhantomData,
        }
    }

    fn set<'a>(&self, field: &'a dyn Any) -> Result<&'a C> {
        field
            .downcast_ref::<C>()
            .ok_or_else(|| CoalError::Internal("field is not the mapped set".into()))
    }
}

impl<C: SetContainer> TypeMapper for SetTypeMapper<C> {
    fn name(&self) -> &str {
        TypeDescriptorKind::Set32.name()
    }

    fn push_field_data_into_blob(&self, field: &dyn Any, blob: &mut BinaryBlob) -> Result<()> {
        self.set(field)?
            .for_each_element(&mut |element| self.element.push_field_data_into_blob(element, blob))
    }

    fn write_field(&self, field: &dyn Any, out: &mut WriteStream) -> Result<()> {
        let set = self.set(field)?;
        write_count32(set.len(), out)?;
        set.for_each_element(&mut |element| self.element.write_field(element, out))
    }

    fn descriptor_for(&self, ctx: &mut TypeDescriptorContext) -> Result<TypeDescriptorRc> {
        let element = ctx.descriptor_for_mapper(&self.element)?;
        Ok(ctx.set_descriptor(TypeDescriptorKind::Set32, element))
    }

    fn can_read_field_with(&self, encoding: &TypeDescriptor) -> bool {
        match encoding {
            TypeDescriptor::Set { element, .. } => self.element.can_read_field_with(element),
            _ => false,
        }
    }

    fn read_field(
        &self,
        field: &mut dyn Any,
        encoding: &TypeDescriptorRc,
        input: &mut ReadStream<'_>,
    ) -> Result<()> {
        let TypeDescriptor::Set { kind, element } = encoding.as_ref() else {
            return Err(CoalError::Internal("set stored as non-set".into()));
        };
        let element_encoding = element.clone();
        let count = read_count(*kind, input)?;
        let destination = field
            .downcast_mut::<C>()
            .ok_or_else(|| CoalError::Internal("field is not the mapped set".into()))?;
        *destination = C::default();
        for _ in 0..count {
            let mut slot = C::Element::default();
            self.element
                .read_field(&mut slot, &element_encoding, input)?;
            destination.insert_element(slot);
        }
        Ok(())
    }

    fn type_mapper_dependencies(&self, each: &mut dyn FnMut(&TypeMapperRc)) {
        with_dependencies(&self.element, each);
    }

    fn object_references_in_field(
        &self,
        field: &dyn Any,
        cache: &mut WrapperCache,
        each: &mut dyn FnMut(InstanceRc),
    ) -> Result<()> {
        self.set(field)?.for_each_element(&mut |element| {
            self.element.object_references_in_field(element, cache, each)
        })
    }
}

impl<T: CoalType + Ord> CoalType for BTreeSet<T> {
    fn type_mapper() -> TypeMapperRc {
        mapper_singleton::<SetTypeMapper<BTreeSet<T>>>(|| {
            Rc::new(SetTypeMapper::<BTreeSet<T>>::new())
        })
    }
}

impl<T: CoalType + Eq + Hash> CoalType for HashSet<T> {
    fn type_mapper() -> TypeMapperRc {
        mapper_singleton::<SetTypeMapper<HashSet<T>>>(|| {
            Rc::new(SetTypeMapper::<HashSet<T>>::new())
        })
    }
}

// --- MAPS ---

/// A map-shaped container whose keys and values Coal can map.
pub(crate) trait MapContainer: Clone + Default + 'static {
    type Key: CoalType;
    type Value: CoalType;

    fn len(&self) -> usize;
    fn for_each_pair(&self, each: &mut dyn FnMut(&dyn Any, &dyn Any) -> Result<()>) -> Result<()>;
    fn insert_pair(&mut self, key: Self::Key, value: Self::Value);
}

impl<K: CoalType + Ord, V: CoalType> MapContainer for BTreeMap<K, V> {
    type Key = K;
    type Value = V;

    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn for_each_pair(&self, each: &mut dyn FnMut(&dyn Any, &dyn Any) -> Result<()>) -> Result<()> {
        for (key, value) in self {
            each(key, value)?;
        }
        Ok(())
    }

    fn insert_pair(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

impl<K: CoalType + Eq + Hash, V: CoalType> MapContainer for HashMap<K, V> {
    type Key = K;
    type Value = V;

    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn for_each_pair(&self, each: &mut dyn FnMut(&dyn Any, &dyn Any) -> Result<()>) -> Result<()> {
        for (key, value) in self {
            each(key, value)?;
        }
        Ok(())
    }

    fn insert_pair(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

/// Mapper of map-shaped containers.
pub(crate) struct MapTypeMapper<C: MapContainer> {
    key: TypeMapperRc,
    value: TypeMapperRc,
    _marker: PhantomData<fn() -> C>,
}

impl<C: MapContainer> MapTypeMapper<C> {
    fn new() -> Self {
        Self {
            key: C::Key::type_mapper(),
            value: C::Value::type_mapper(),
            _marker: PhantomData,
        }
    }

    fn map<'a>(&self, field: &'a dyn Any) -> Result<&'a C> {
        field
            .downcast_ref::<C>()
            .ok_or_else(|| CoalError::Internal("field is not the mapped map".into()))
    }
}

impl<C: MapContainer> TypeMapper for MapTypeMapper<C> {
    fn name(&self) -> &str {
        TypeDescriptorKind::Map32.name()
    }

    fn push_field_data_into_blob(&self, field: &dyn Any, blob: &mut BinaryBlob) -> Result<()> {
        self.map(field)?.for_each_pair(&mut |key, value| {
            self.key.push_field_data_into_blob(key, blob)?;
            self.value.push_field_data_into_blob(value, blob)
        })
    }

    fn write_field(&self, field: &dyn Any, out: &mut WriteStream) -> Result<()> {
        let map = self.map(field)?;
        write_count32(map.len(), out)?;
        map.for_each_pair(&mut |key, value| {
            self.key.write_field(key, out)?;
            self.value.write_field(value, out)
        })
    }

    fn descriptor_for(&self, ctx: &mut TypeDescriptorContext) -> Result<TypeDescriptorRc> {
        let key = ctx.descriptor_for_mapper(&self.key)?;
        let value = ctx.descriptor_for_mapper(&self.value)?;
        Ok(ctx.map_descriptor(TypeDescriptorKind::Map32, key, value))
    }

    fn can_read_field_with(&self, encoding: &TypeDescriptor) -> bool {
        match encoding {
            TypeDescriptor::Map { key, value, .. } => {
                self.key.can_read_field_with(key) && self.value.can_read_field_with(value)
            }
            _ => false,
        }
    }

    fn read_field(
        &self,
        field: &mut dyn Any,
        encoding: &TypeDescriptorRc,
        input: &mut ReadStream<'_>,
    ) -> Result<()> {
        let TypeDescriptor::Map { kind, key, value } = encoding.as_ref() else {
            return Err(CoalError::Internal("map stored as non-map".into()));
        };
        let key_encoding = key.clone();
        let value_encoding = value.clone();
        let count = read_count(*kind, input)?;
        let destination = field
            .downcast_mut::<C>()
            .ok_or_else(|| CoalError::Internal("field is not the mapped map".into()))?;
        *destination = C::default();
        for _ in 0..count {
            let mut key_slot = C::Key::default();
            let mut value_slot = C::Value::default();
            self.key.read_field(&mut key_slot, &key_encoding, input)?;
            self.value
                .read_field(&mut value_slot, &value_encoding, input)?;
            destination.insert_pair(key_slot, value_slot);
        }
        Ok(())
    }

    fn type_mapper_dependencies(&self, each: &mut dyn FnMut(&TypeMapperRc)) {
        with_dependencies(&self.key, each);
        with_dependencies(&self.value, each);
    }

    fn object_references_in_field(
        &self,
        field: &dyn Any,
        cache: &mut WrapperCache,
        each: &mut dyn FnMut(InstanceRc),
    ) -> Result<()> {
        self.map(field)?.for_each_pair(&mut |key, value| {
            self.key.object_references_in_field(key, cache, each)?;
            self.value.object_references_in_field(value, cache, each)
        })
    }
}

impl<K: CoalType + Ord, V: CoalType> CoalType for BTreeMap<K, V> {
    fn type_mapper() -> TypeMapperRc {
        mapper_singleton::<MapTypeMapper<BTreeMap<K, V>>>(|| {
            Rc::new(MapTypeMapper::<BTreeMap<K, V>>::new())
        })
    }
}

impl<K: CoalType + Eq + Hash, V: CoalType> CoalType for HashMap<K, V> {
    fn type_mapper() -> TypeMapperRc {
        mapper_singleton::<MapTypeMapper<HashMap<K, V>>>(|| {
            Rc::new(MapTypeMapper::<HashMap<K, V>>::new())
        })
    }
}

// --- FIXED ARRAYS ---

/// Mapper of `[T; N]`: no count at the field site, the size lives in the
/// descriptor.
pub(crate) struct FixedArrayTypeMapper<T: CoalType, const N: usize> {
    element: TypeMapperRc,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CoalType, const N: usize> FixedArrayTypeMapper<T, N> {
    fn new() -> Self {
        Self {
            element: T::type_mapper(),
            _marker: PhantomData,
        }
    }

    fn array<'a>(&self, field: &'a dyn Any) -> Result<&'a [T; N]> {
        field
            .downcast_ref::<[T; N]>()
            .ok_or_else(|| CoalError::Internal("field is not the mapped fixed array".into()))
    }
}

impl<T: CoalType, const N: usize> TypeMapper for FixedArrayTypeMapper<T, N> {
    fn name(&self) -> &str {
        TypeDescriptorKind::FixedArray.name()
    }

    fn push_field_data_into_blob(&self, field: &dyn Any, blob: &mut BinaryBlob) -> Result<()> {
        for element in self.array(field)? {
            self.element.push_field_data_into_blob(element, blob)?;
        }
        Ok(())
    }

    fn write_field(&self, field: &dyn Any, out: &mut WriteStream) -> Result<()> {
        for element in self.array(field)? {
            self.element.write_field(element, out)?;
        }
        Ok(())
    }

    fn descriptor_for(&self, ctx: &mut TypeDescriptorContext) -> Result<TypeDescriptorRc> {
        let element = ctx.descriptor_for_mapper(&self.element)?;
        Ok(ctx.fixed_array_descriptor(N as u32, element))
    }

    fn can_read_field_with(&self, encoding: &TypeDescriptor) -> bool {
        match encoding {
            TypeDescriptor::FixedArray { size, element } => {
                *size as usize == N && self.element.can_read_field_with(element)
            }
            _ => false,
        }
    }

    fn read_field(
        &self,
        field: &mut dyn Any,
        encoding: &TypeDescriptorRc,
        input: &mut ReadStream<'_>,
    ) -> Result<()> {
        let TypeDescriptor::FixedArray { size, element } = encoding.as_ref() else {
            return Err(CoalError::Internal("fixed array stored otherwise".into()));
        };
        if *size as usize != N {
            return Err(CoalError::Internal("fixed array size mismatch".into()));
        }
        let element_encoding = element.clone();
        let destination = field
            .downcast_mut::<[T; N]>()
            .ok_or_else(|| CoalError::Internal("field is not the mapped fixed array".into()))?;
        for slot in destination.iter_mut() {
            self.element.read_field(slot, &element_encoding, input)?;
        }
        Ok(())
    }

    fn type_mapper_dependencies(&self, each: &mut dyn FnMut(&TypeMapperRc)) {
        with_dependencies(&self.element, each);
    }

    fn object_references_in_field(
        &self,
        field: &dyn Any,
        cache: &mut WrapperCache,
        each: &mut dyn FnMut(InstanceRc),
    ) -> Result<()> {
        for element in self.array(field)? {
            self.element.object_references_in_field(element, cache, each)?;
        }
        Ok(())
    }
}

impl<T: CoalType, const N: usize> CoalType for [T; N]
where
    [T; N]: Default,
{
    fn type_mapper() -> TypeMapperRc {
        mapper_singleton::<FixedArrayTypeMapper<T, N>>(|| {
            Rc::new(FixedArrayTypeMapper::<T, N>::new())
        })
    }
}
