//! Runtime descriptor registry.
//!
//! Descriptors are `'static` and self-describing, so most code never
//! touches the registry; it exists for callers that must resolve a type
//! from its name or [`TypeId`] at runtime, such as schema dumps or
//! archives negotiating root types with a peer.

use core::any::TypeId;
use std::sync::{OnceLock, RwLock};

use hashbrown::{HashMap, HashSet};

use crate::info::Descriptor;
use crate::serial::Described;

/// A deferred handle to a type's descriptor, submitted at link time under
/// the `auto_register` feature and resolved on first registry build.
///
/// The indirection matters: descriptors live in lazily initialized cells,
/// and `inventory` submissions run before `main`, so registrations carry
/// the accessor rather than the descriptor itself.
pub struct DescriptorRegistration {
    get: fn() -> &'static Descriptor,
}

impl DescriptorRegistration {
    #[inline]
    pub const fn of<T: Described>() -> Self {
        Self { get: T::descriptor }
    }

    #[inline]
    pub fn descriptor(&self) -> &'static Descriptor {
        (self.get)()
    }
}

#[cfg(feature = "auto_register")]
inventory::collect!(DescriptorRegistration);

/// Lookup table from [`TypeId`] and type name to descriptors.
pub struct TypeRegistry {
    table: HashMap<TypeId, &'static Descriptor>,
    name_to_id: HashMap<&'static str, TypeId>,
    ambiguous_names: HashSet<&'static str>,
}

impl TypeRegistry {
    /// An empty registry, ignoring any link-time submissions.
    #[inline]
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
            name_to_id: HashMap::new(),
            ambiguous_names: HashSet::new(),
        }
    }

    /// A registry populated from every `describe!` site in the linked
    /// program when the `auto_register` feature is enabled, empty
    /// otherwise.
    pub fn new() -> Self {
        let registry = Self::empty();

        #[cfg(feature = "auto_register")]
        let registry = {
            let mut registry = registry;
            for registration in inventory::iter::<DescriptorRegistration> {
                registry.register_descriptor(registration.descriptor());
            }
            registry
        };

        registry
    }

    /// Registers `T`'s descriptor. Returns whether anything changed.
    #[inline]
    pub fn register<T: Described>(&mut self) -> bool {
        self.register_descriptor(T::descriptor())
    }

    /// Registers a descriptor directly. Re-registering the same type is a
    /// no-op; a second distinct type with the same short name makes that
    /// name ambiguous and unresolvable by [`get_with_type_name`].
    ///
    /// [`get_with_type_name`]: TypeRegistry::get_with_type_name
    pub fn register_descriptor(&mut self, descriptor: &'static Descriptor) -> bool {
        let id = descriptor.ty_id();
        if self.table.contains_key(&id) {
            return false;
        }
        self.table.insert(id, descriptor);

        let name = descriptor.type_name();
        if self.ambiguous_names.contains(name) {
            return true;
        }
        if self.name_to_id.contains_key(name) {
            self.name_to_id.remove(name);
            self.ambiguous_names.insert(name);
        } else {
            self.name_to_id.insert(name, id);
        }
        true
    }

    #[inline]
    pub fn get(&self, id: TypeId) -> Option<&'static Descriptor> {
        self.table.get(&id).copied()
    }

    /// Resolves a descriptor by type name. Returns `None` for unknown
    /// names and for names claimed by more than one registered type.
    #[inline]
    pub fn get_with_type_name(&self, name: &str) -> Option<&'static Descriptor> {
        let id = self.name_to_id.get(name)?;
        self.table.get(id).copied()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &'static Descriptor> + '_ {
        self.table.values().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }
}

impl Default for TypeRegistry {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide registry, built on first access.
pub fn global() -> &'static RwLock<TypeRegistry> {
    static GLOBAL: OnceLock<RwLock<TypeRegistry>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(TypeRegistry::new()))
}
