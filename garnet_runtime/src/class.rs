//! Class objects and method tables.
//!
//! A `Class` owns one method table: the unit of type identity the dispatch
//! core guards on. Tables are mutated under a write lock; every mutation is
//! followed by an epoch bump (performed by the runtime, which owns the
//! registry), so readers that cached a resolution can detect the change by
//! value comparison alone.
//!
//! Singleton classes are ordinary classes flagged `SINGLETON`, spliced
//! between an object and its former class. They participate in resolution
//! through the same superclass walk.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use garnet_core::{ClassId, SymbolId};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::method::{Method, Visibility};

bitflags! {
    /// Classification flags for a class.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassFlags: u8 {
        /// Part of the bootstrap hierarchy.
        const BUILTIN = 1 << 0;
        /// One-object class created by per-object specialization.
        const SINGLETON = 1 << 1;
    }
}

/// A class: name, place in the hierarchy, and its method table.
pub struct Class {
    id: ClassId,
    name: SymbolId,
    superclass: Option<ClassId>,
    flags: ClassFlags,
    methods: RwLock<FxHashMap<SymbolId, Arc<Method>>>,
}

impl Class {
    pub fn new(id: ClassId, name: SymbolId, superclass: Option<ClassId>, flags: ClassFlags) -> Self {
        Self {
            id,
            name,
            superclass,
            flags,
            methods: RwLock::new(FxHashMap::default()),
        }
    }

    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> SymbolId {
        self.name
    }

    #[inline]
    pub fn superclass(&self) -> Option<ClassId> {
        self.superclass
    }

    #[inline]
    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.flags.contains(ClassFlags::SINGLETON)
    }

    /// Entry in this class's own table, ignoring ancestors.
    pub fn own_method(&self, name: SymbolId) -> Option<Arc<Method>> {
        self.methods.read().get(&name).cloned()
    }

    /// Install `method` under its own name, replacing any previous entry.
    ///
    /// The caller bumps the epoch afterwards.
    pub fn insert_method(&self, method: Arc<Method>) -> Option<Arc<Method>> {
        self.methods.write().insert(method.name(), method)
    }

    /// Remove the entry for `name`, if present.
    ///
    /// The caller bumps the epoch afterwards.
    pub fn remove_method(&self, name: SymbolId) -> Option<Arc<Method>> {
        self.methods.write().remove(&name)
    }

    /// Replace `name`'s entry with a visibility-changed copy.
    ///
    /// Returns false when this table has no such entry.
    pub fn change_visibility(&self, name: SymbolId, visibility: Visibility) -> bool {
        let mut table = self.methods.write();
        match table.get(&name) {
            Some(existing) if existing.visibility() == visibility => true,
            Some(existing) => {
                let replacement = Arc::new(existing.with_visibility(visibility));
                table.insert(name, replacement);
                true
            }
            None => false,
        }
    }

    /// Number of entries in this class's own table.
    pub fn method_count(&self) -> usize {
        self.methods.read().len()
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("superclass", &self.superclass)
            .field("flags", &self.flags)
            .field("methods", &self.method_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::{MethodFlags, NativeFn};
    use garnet_core::{intern, Value};

    fn method(name: &str, owner: ClassId, visibility: Visibility) -> Arc<Method> {
        let body: NativeFn = Arc::new(|_, _| Ok(Value::nil()));
        Arc::new(Method::new(
            intern(name),
            owner,
            visibility,
            MethodFlags::empty(),
            body,
        ))
    }

    fn test_class() -> Class {
        Class::new(
            ClassId::from_raw(500),
            intern("Widget"),
            Some(ClassId::OBJECT),
            ClassFlags::empty(),
        )
    }

    #[test]
    fn test_insert_and_fetch_own_method() {
        let class = test_class();
        assert!(class.own_method(intern("poke")).is_none());
        class.insert_method(method("poke", class.id(), Visibility::Public));
        let found = class.own_method(intern("poke")).unwrap();
        assert_eq!(found.name(), intern("poke"));
    }

    #[test]
    fn test_insert_replaces_previous_entry() {
        let class = test_class();
        class.insert_method(method("poke", class.id(), Visibility::Public));
        let old = class.insert_method(method("poke", class.id(), Visibility::Private));
        assert!(old.is_some());
        let current = class.own_method(intern("poke")).unwrap();
        assert_eq!(current.visibility(), Visibility::Private);
    }

    #[test]
    fn test_remove_method() {
        let class = test_class();
        class.insert_method(method("poke", class.id(), Visibility::Public));
        assert!(class.remove_method(intern("poke")).is_some());
        assert!(class.own_method(intern("poke")).is_none());
        assert!(class.remove_method(intern("poke")).is_none());
    }

    #[test]
    fn test_change_visibility_replaces_entry() {
        let class = test_class();
        class.insert_method(method("poke", class.id(), Visibility::Public));
        let before = class.own_method(intern("poke")).unwrap();

        assert!(class.change_visibility(intern("poke"), Visibility::Protected));

        let after = class.own_method(intern("poke")).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(before.visibility(), Visibility::Public);
        assert_eq!(after.visibility(), Visibility::Protected);
    }

    #[test]
    fn test_change_visibility_missing_entry() {
        let class = test_class();
        assert!(!class.change_visibility(intern("absent"), Visibility::Private));
    }

    #[test]
    fn test_singleton_flag() {
        let class = Class::new(
            ClassId::from_raw(501),
            intern("#<Class:Widget>"),
            Some(ClassId::from_raw(500)),
            ClassFlags::SINGLETON,
        );
        assert!(class.is_singleton());
    }
}
