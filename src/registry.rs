//! The type-mapper registry: how the deserializer finds live types.
//!
//! A registry answers "which in-memory mapper carries this wire name?".
//! The default implementation is the transitive closure of the
//! deserialization root: the root mapper plus everything it reports as a
//! dependency, recursively, indexed by name. Membership is by mapper
//! identity, so shared dependencies are visited once.
//!
//! Closures are cached per root mapper so repeated deserializations of the
//! same root type cost one lookup. Mapper singletons and the cache are
//! thread-local: live graphs are `Rc`-based and never cross threads, so
//! per-thread context keeps steady-state reads lock-free.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::mapper::{rc_mapper_id, TypeMapperRc};

/// Resolves wire type names to live mappers.
pub trait TypeMapperRegistry {
    /// The mapper registered under `name`, if any.
    fn lookup(&self, name: &str) -> Option<TypeMapperRc>;
}

/// Shared handle to a registry.
pub type RegistryRc = Rc<dyn TypeMapperRegistry>;

/// A registry built by walking a root mapper's dependency graph.
#[derive(Default)]
pub struct TransitiveClosureRegistry {
    names: HashMap<String, TypeMapperRc>,
    added: HashSet<*const ()>,
}

impl TransitiveClosureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mapper and, recursively, everything it depends on. The first
    /// mapper claiming a name keeps it.
    pub fn add_with_dependencies(&mut self, mapper: &TypeMapperRc) {
        if !self.added.insert(rc_mapper_id(mapper)) {
            return;
        }
        self.names
            .entry(mapper.name().to_string())
            .or_insert_with(|| mapper.clone());
        mapper.type_mapper_dependencies(&mut |dependency| {
            self.add_with_dependencies(dependency);
        });
    }

    /// Number of distinct mappers in the closure.
    pub fn len(&self) -> usize {
        self.added.len()
    }

    /// True when nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
    }
}

impl TypeMapperRegistry for TransitiveClosureRegistry {
    fn lookup(&self, name: &str) -> Option<TypeMapperRc> {
        self.names.get(name).cloned()
    }
}

thread_local! {
    static REGISTRY_CACHE: RefCell<HashMap<*const (), Rc<TransitiveClosureRegistry>>> =
        RefCell::new(HashMap::new());
}

/// The cached transitive-closure registry rooted at `root`.
pub fn registry_for_root(root: &TypeMapperRc) -> RegistryRc {
    let key = rc_mapper_id(root);
    let cached = REGISTRY_CACHE.with(|cache| cache.borrow().get(&key).cloned());
    if let Some(registry) = cached {
        return registry;
    }

    let mut registry = TransitiveClosureRegistry::new();
    registry.add_with_dependencies(root);
    let registry = Rc::new(registry);
    REGISTRY_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .entry(key)
            .or_insert_with(|| registry.clone())
            .clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::object::Ref;
    use crate::mapper::{
        object_type_mapper, CoalObject, CoalStructure, CoalType, FieldDescription,
    };

    // Hand-written metadata, the way non-derive users register types.
    #[derive(Debug, Clone, Default)]
    struct Extent {
        width: u32,
    }

    impl CoalStructure for Extent {
        fn type_name() -> &'static str {
            "Extent"
        }

        fn fields() -> Vec<FieldDescription> {
            vec![FieldDescription::new::<Self, u32>(
                "width",
                |e| &e.width,
                |e| &mut e.width,
            )]
        }
    }

    impl CoalType for Extent {
        fn type_mapper() -> crate::mapper::TypeMapperRc {
            crate::mapper::structure_type_mapper::<Extent>()
        }
    }

    #[derive(Debug, Default)]
    struct Widget {
        extent: Extent,
        next: Ref<Widget>,
    }

    impl CoalObject for Widget {
        fn type_name() -> &'static str {
            "Widget"
        }

        fn fields() -> Vec<FieldDescription> {
            vec![
                FieldDescription::new::<Self, Extent>(
                    "extent",
                    |w| &w.extent,
                    |w| &mut w.extent,
                ),
                FieldDescription::new::<Self, Ref<Widget>>(
                    "next",
                    |w| &w.next,
                    |w| &mut w.next,
                ),
            ]
        }
    }

    #[test]
    fn closure_contains_the_root_and_its_dependencies() {
        let root = object_type_mapper::<Widget>();
        let registry = registry_for_root(&root);

        let widget = registry.lookup("Widget").expect("root class");
        assert!(widget.is_object_type());
        let extent = registry.lookup("Extent").expect("value dependency");
        assert!(extent.is_aggregate_type());
        assert!(!extent.is_object_type());
        assert!(registry.lookup("Missing").is_none());
    }

    #[test]
    fn self_referential_classes_terminate() {
        let root = object_type_mapper::<Widget>();
        let mut registry = TransitiveClosureRegistry::new();
        registry.add_with_dependencies(&root);
        registry.add_with_dependencies(&root);
        assert!(!registry.is_empty());
        assert!(registry.lookup("Widget").is_some());
    }

    #[test]
    fn registries_are_cached_per_root() {
        let root = object_type_mapper::<Widget>();
        let first = registry_for_root(&root);
        let second = registry_for_root(&root);
        assert_eq!(
            Rc::as_ptr(&first) as *const (),
            Rc::as_ptr(&second) as *const ()
        );
    }
}
