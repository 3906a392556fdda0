//! The runtime: class table, bootstrap hierarchy, and mutation operations.
//!
//! `Runtime` owns everything the dispatch core consults: the class table,
//! the epoch registry, and the symbol identity side table. Every mutation
//! that can change what resolution would return funnels through here so the
//! matching epoch bump can never be forgotten.
//!
//! # Identity
//!
//! `identity_of` maps a value to the class whose method table governs it:
//! fixed built-in ids for primitives, the object's (atomic) class field for
//! heap objects, and the override side table for specialized symbols.
//!
//! # Thread Safety
//!
//! The class table and the symbol side table are behind `RwLock`s; epoch
//! bumps are ordered after the mutation they describe. `Runtime` is `Send +
//! Sync` and is shared by reference across dispatching threads.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use garnet_core::{intern, ClassId, GarnetError, GarnetResult, ObjectCell, SymbolId, Value};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::class::{Class, ClassFlags};
use crate::epoch::{BumpReason, EpochCell, EpochRegistry};
use crate::method::{CallEnv, Method, MethodFlags, NativeFn, Visibility};
use crate::resolve;

pub struct Runtime {
    classes: RwLock<FxHashMap<ClassId, Arc<Class>>>,
    epochs: EpochRegistry,
    next_class_id: AtomicU32,

    /// Per-symbol identity overrides installed by singleton-class creation.
    symbol_overrides: RwLock<FxHashMap<SymbolId, ClassId>>,
    /// Global epoch shared by every symbol fast-path cache.
    symbol_epoch: Arc<EpochCell>,
    /// One-way flag: true until the first symbol override ever happens.
    symbols_pristine: AtomicBool,

    method_missing: SymbolId,
}

impl Runtime {
    /// Build a runtime with the bootstrap hierarchy installed.
    pub fn new() -> Self {
        let rt = Self {
            classes: RwLock::new(FxHashMap::default()),
            epochs: EpochRegistry::new(),
            next_class_id: AtomicU32::new(ClassId::FIRST_USER.raw()),
            symbol_overrides: RwLock::new(FxHashMap::default()),
            symbol_epoch: Arc::new(EpochCell::new()),
            symbols_pristine: AtomicBool::new(true),
            method_missing: intern("method_missing"),
        };
        rt.bootstrap();
        rt
    }

    fn bootstrap(&self) {
        let builtins: [(ClassId, &str, Option<ClassId>); 7] = [
            (ClassId::OBJECT, "Object", None),
            (ClassId::NIL, "NilClass", Some(ClassId::OBJECT)),
            (ClassId::TRUE, "TrueClass", Some(ClassId::OBJECT)),
            (ClassId::FALSE, "FalseClass", Some(ClassId::OBJECT)),
            (ClassId::INTEGER, "Integer", Some(ClassId::OBJECT)),
            (ClassId::FLOAT, "Float", Some(ClassId::OBJECT)),
            (ClassId::SYMBOL, "Symbol", Some(ClassId::OBJECT)),
        ];
        let mut table = self.classes.write();
        for (id, name, superclass) in builtins {
            table.insert(
                id,
                Arc::new(Class::new(id, intern(name), superclass, ClassFlags::BUILTIN)),
            );
        }
    }

    // =========================================================================
    // Class Table
    // =========================================================================

    pub fn class(&self, id: ClassId) -> Option<Arc<Class>> {
        self.classes.read().get(&id).cloned()
    }

    /// Human-readable name for error messages and logs.
    pub fn class_name(&self, id: ClassId) -> String {
        match self.class(id) {
            Some(class) => class.name().name().to_owned(),
            None => format!("#<class {}>", id.raw()),
        }
    }

    /// Define a new class under `superclass`.
    pub fn define_class(&self, name: &str, superclass: ClassId) -> ClassId {
        let id = self.allocate_class_id();
        let class = Arc::new(Class::new(id, intern(name), Some(superclass), ClassFlags::empty()));
        self.classes.write().insert(id, class);
        id
    }

    fn allocate_class_id(&self) -> ClassId {
        ClassId::from_raw(self.next_class_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate a plain instance of `class`.
    pub fn allocate(&self, class: ClassId) -> GarnetResult<Value> {
        if self.class(class).is_none() {
            return Err(GarnetError::type_error(format!(
                "cannot instantiate unregistered class {}",
                class.raw()
            )));
        }
        Ok(Value::object(ObjectCell::new(class)))
    }

    /// Ancestor chain of `class`, nearest first, including `class` itself.
    pub fn ancestors(&self, class: ClassId) -> Vec<ClassId> {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(id) = current {
            chain.push(id);
            current = self.class(id).and_then(|c| c.superclass());
        }
        chain
    }

    /// Is `class` equal to or a descendant of `ancestor`?
    pub fn is_kind_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.class(id).and_then(|c| c.superclass());
        }
        false
    }

    // =========================================================================
    // Method Table Mutations
    // =========================================================================

    /// Define (or redefine) a public/private/protected method with a native
    /// body. Bumps the epoch of the class and every descendant.
    pub fn define_method<F>(
        &self,
        class: ClassId,
        name: SymbolId,
        visibility: Visibility,
        body: F,
    ) -> GarnetResult<()>
    where
        F: Fn(&Runtime, &CallEnv) -> GarnetResult<Value> + Send + Sync + 'static,
    {
        self.define_method_with_flags(class, name, visibility, MethodFlags::empty(), body)
    }

    /// `define_method` with explicit behavioral flags.
    pub fn define_method_with_flags<F>(
        &self,
        class: ClassId,
        name: SymbolId,
        visibility: Visibility,
        flags: MethodFlags,
        body: F,
    ) -> GarnetResult<()>
    where
        F: Fn(&Runtime, &CallEnv) -> GarnetResult<Value> + Send + Sync + 'static,
    {
        let target = self.class_or_type_error(class)?;
        let body: NativeFn = Arc::new(body);
        target.insert_method(Arc::new(Method::new(name, class, visibility, flags, body)));
        self.bump_subtree(class, BumpReason::MethodDefined);
        Ok(())
    }

    /// Remove `name` from `class`'s own table. Returns whether an entry
    /// existed; bumps epochs only when one did.
    pub fn remove_method(&self, class: ClassId, name: SymbolId) -> GarnetResult<bool> {
        let target = self.class_or_type_error(class)?;
        let removed = target.remove_method(name).is_some();
        if removed {
            self.bump_subtree(class, BumpReason::MethodRemoved);
        }
        Ok(removed)
    }

    /// Register `new_name` on `class` as an alias of the method `old_name`
    /// currently resolves to. Bumps epochs like a definition.
    pub fn alias_method(
        &self,
        class: ClassId,
        new_name: SymbolId,
        old_name: SymbolId,
    ) -> GarnetResult<()> {
        let target = self.class_or_type_error(class)?;
        let resolved = resolve::lookup(self, class, old_name)
            .ok_or_else(|| GarnetError::no_method(old_name, self.class_name(class)))?;
        target.insert_method(Arc::new(resolved.aliased(new_name, class)));
        self.bump_subtree(class, BumpReason::MethodAliased);
        Ok(())
    }

    /// Change the visibility `name` has when resolved through `class`.
    ///
    /// An inherited method is copied down into `class`'s own table with the
    /// new visibility (keeping its defining owner). Bumps epochs like a
    /// definition.
    pub fn set_method_visibility(
        &self,
        class: ClassId,
        name: SymbolId,
        visibility: Visibility,
    ) -> GarnetResult<()> {
        let target = self.class_or_type_error(class)?;
        if !target.change_visibility(name, visibility) {
            let inherited = resolve::lookup(self, class, name)
                .ok_or_else(|| GarnetError::no_method(name, self.class_name(class)))?;
            target.insert_method(Arc::new(inherited.with_visibility(visibility)));
        }
        self.bump_subtree(class, BumpReason::VisibilityChanged);
        Ok(())
    }

    fn class_or_type_error(&self, class: ClassId) -> GarnetResult<Arc<Class>> {
        self.class(class).ok_or_else(|| {
            GarnetError::type_error(format!("unregistered class {}", class.raw()))
        })
    }

    /// Bump `class` and every registered descendant. Resolution for a
    /// receiver keyed to a subclass may flow through the mutated table, so
    /// caches keyed anywhere below it are no longer trustworthy.
    fn bump_subtree(&self, class: ClassId, reason: BumpReason) {
        let parents: FxHashMap<ClassId, Option<ClassId>> = {
            let table = self.classes.read();
            table.values().map(|c| (c.id(), c.superclass())).collect()
        };
        for &id in parents.keys() {
            let mut current = Some(id);
            while let Some(step) = current {
                if step == class {
                    self.epochs.bump(id, reason);
                    break;
                }
                current = parents.get(&step).copied().flatten();
            }
        }
    }

    // =========================================================================
    // Per-Object Specialization
    // =========================================================================

    /// The class whose table governs methods of this one value, creating a
    /// singleton class when the value can carry one.
    ///
    /// - Heap objects get a fresh `SINGLETON` class spliced above their
    ///   current class; their identity changes, no epoch moves.
    /// - Symbols get an identity override in the side table; the global
    ///   symbol epoch moves (retiring every symbol fast path) and so does
    ///   the symbol class epoch.
    /// - nil/true/false already are one-element types.
    /// - Numbers cannot be specialized.
    pub fn singleton_class_of(&self, value: &Value) -> GarnetResult<ClassId> {
        match value {
            Value::Object(cell) => {
                let mut table = self.classes.write();
                let current = cell.class();
                if let Some(class) = table.get(&current) {
                    if class.is_singleton() {
                        return Ok(current);
                    }
                }
                let id = self.allocate_class_id();
                let name = intern(&format!("#<Class:{}>", self.name_under_lock(&table, current)));
                let singleton =
                    Arc::new(Class::new(id, name, Some(current), ClassFlags::SINGLETON));
                table.insert(id, singleton);
                cell.set_class(id);
                Ok(id)
            }
            Value::Symbol(sym) => {
                {
                    let overrides = self.symbol_overrides.read();
                    if let Some(&existing) = overrides.get(sym) {
                        return Ok(existing);
                    }
                }
                let id = self.allocate_class_id();
                let name = intern(&format!("#<Class::{}>", sym));
                let singleton = Arc::new(Class::new(
                    id,
                    name,
                    Some(ClassId::SYMBOL),
                    ClassFlags::SINGLETON,
                ));
                self.classes.write().insert(id, singleton);

                let mut overrides = self.symbol_overrides.write();
                if let Some(&existing) = overrides.get(sym) {
                    return Ok(existing);
                }
                overrides.insert(*sym, id);
                drop(overrides);

                // Flag first, then bump: a fast-path node minted against the
                // pre-bump epoch can never outlive the bump.
                self.symbols_pristine.store(false, Ordering::SeqCst);
                self.symbol_epoch.bump();
                self.bump_subtree(ClassId::SYMBOL, BumpReason::SymbolSpecialized);
                Ok(id)
            }
            Value::Nil => Ok(ClassId::NIL),
            Value::Bool(true) => Ok(ClassId::TRUE),
            Value::Bool(false) => Ok(ClassId::FALSE),
            Value::Int(_) | Value::Float(_) => Err(GarnetError::type_error(
                "cannot define a singleton class for a number",
            )),
            Value::Missing => Err(GarnetError::type_error(
                "cannot define a singleton class for the missing sentinel",
            )),
        }
    }

    fn name_under_lock(
        &self,
        table: &FxHashMap<ClassId, Arc<Class>>,
        id: ClassId,
    ) -> String {
        match table.get(&id) {
            Some(class) => class.name().name().to_owned(),
            None => format!("#<class {}>", id.raw()),
        }
    }

    // =========================================================================
    // Identity & Epoch Access
    // =========================================================================

    /// The class whose method table governs `value` right now.
    pub fn identity_of(&self, value: &Value) -> ClassId {
        match value {
            Value::Nil => ClassId::NIL,
            Value::Bool(true) => ClassId::TRUE,
            Value::Bool(false) => ClassId::FALSE,
            Value::Int(_) => ClassId::INTEGER,
            Value::Float(_) => ClassId::FLOAT,
            Value::Symbol(sym) => {
                if self.symbols_pristine() {
                    ClassId::SYMBOL
                } else {
                    self.symbol_overrides
                        .read()
                        .get(sym)
                        .copied()
                        .unwrap_or(ClassId::SYMBOL)
                }
            }
            Value::Object(cell) => cell.class(),
            Value::Missing => {
                debug_assert!(false, "missing sentinel used as a receiver");
                ClassId::OBJECT
            }
        }
    }

    #[inline]
    pub fn epochs(&self) -> &EpochRegistry {
        &self.epochs
    }

    /// The global symbol epoch cell, shared by every symbol fast path.
    #[inline]
    pub fn symbol_epoch(&self) -> &Arc<EpochCell> {
        &self.symbol_epoch
    }

    /// True until the first symbol identity override ever happens.
    #[inline]
    pub fn symbols_pristine(&self) -> bool {
        self.symbols_pristine.load(Ordering::SeqCst)
    }

    /// The interned name of the missing-method fallback.
    #[inline]
    pub fn method_missing_name(&self) -> SymbolId {
        self.method_missing
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
