//! Global symbol interning.
//!
//! Method names and symbol literals are interned once into a process-wide
//! table and referred to by `SymbolId` afterwards. Ids are dense `u32`s, so
//! they are cheap to copy, compare, and use as hash keys in method tables
//! and dispatch caches.
//!
//! Interned strings are leaked into `'static` storage; the table only ever
//! grows. This matches the lifetime of method names in a running interpreter,
//! which are never reclaimed.

use std::fmt;
use std::sync::OnceLock;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Identity of an interned string.
///
/// Two `SymbolId`s are equal iff they were interned from equal strings.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    /// The interned string this id stands for.
    #[inline]
    pub fn name(self) -> &'static str {
        interner().read().names[self.0 as usize]
    }

    /// Raw index, for dense side tables.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({:?})", self.name())
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Interner
// =============================================================================

struct Interner {
    by_name: FxHashMap<&'static str, SymbolId>,
    names: Vec<&'static str>,
}

impl Interner {
    fn new() -> Self {
        Self {
            by_name: FxHashMap::default(),
            names: Vec::new(),
        }
    }
}

fn interner() -> &'static RwLock<Interner> {
    static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| RwLock::new(Interner::new()))
}

/// Intern `name`, returning its stable id.
///
/// Idempotent: interning the same string twice yields the same id.
pub fn intern(name: &str) -> SymbolId {
    {
        let table = interner().read();
        if let Some(&id) = table.by_name.get(name) {
            return id;
        }
    }

    let mut table = interner().write();
    // Double-check under the write lock; another thread may have won.
    if let Some(&id) = table.by_name.get(name) {
        return id;
    }
    let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
    let id = SymbolId(table.names.len() as u32);
    table.names.push(leaked);
    table.by_name.insert(leaked, id);
    id
}

// =============================================================================
// Tests
// =============================================================================
