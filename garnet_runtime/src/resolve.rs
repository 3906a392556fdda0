//! Method resolution.
//!
//! Resolution walks the superclass chain from a type identity to the first
//! class whose own table defines the name, then applies visibility rules
//! from the calling site's fixed context. The dispatch core calls this once
//! per specialization and once per generic-table miss; everything else is
//! served from caches guarded by epochs.

use std::sync::Arc;

use garnet_core::{ClassId, SymbolId};

use crate::method::{Method, Visibility};
use crate::runtime::Runtime;

/// The visibility-relevant facts about a call site, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    /// Lexical class of the sending site, when known.
    pub caller_class: Option<ClassId>,
    /// Self-sends bypass visibility entirely.
    pub ignore_visibility: bool,
}

impl CallerContext {
    /// A visibility-checking context with no lexical class.
    pub const fn checking() -> Self {
        Self {
            caller_class: None,
            ignore_visibility: false,
        }
    }

    /// A self-send context: visibility is not enforced.
    pub const fn bypassing() -> Self {
        Self {
            caller_class: None,
            ignore_visibility: true,
        }
    }

    /// A visibility-checking context lexically inside `class`.
    pub const fn from_class(class: ClassId) -> Self {
        Self {
            caller_class: Some(class),
            ignore_visibility: false,
        }
    }
}

impl Default for CallerContext {
    fn default() -> Self {
        Self::checking()
    }
}

/// Outcome of resolving a name against a type.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Method found and callable from the context.
    Found(Arc<Method>),
    /// Method found but visibility forbids the call.
    FoundInvisible(Arc<Method>),
    /// No entry anywhere on the ancestor chain.
    NotFound,
}

/// Walk the ancestor chain for `name`, ignoring visibility.
pub fn lookup(rt: &Runtime, class: ClassId, name: SymbolId) -> Option<Arc<Method>> {
    let mut current = Some(class);
    while let Some(id) = current {
        let cls = match rt.class(id) {
            Some(cls) => cls,
            None => return None,
        };
        if let Some(method) = cls.own_method(name) {
            return Some(method);
        }
        current = cls.superclass();
    }
    None
}

/// Is `method` callable from `ctx`?
pub fn is_visible(rt: &Runtime, ctx: &CallerContext, method: &Method) -> bool {
    if ctx.ignore_visibility {
        return true;
    }
    match method.visibility() {
        Visibility::Public => true,
        Visibility::Private => false,
        Visibility::Protected => match ctx.caller_class {
            Some(caller) => rt.is_kind_of(caller, method.owner()),
            None => false,
        },
    }
}

/// Resolve `name` against `class` and apply `ctx`'s visibility rules.
pub fn resolve(rt: &Runtime, class: ClassId, name: SymbolId, ctx: &CallerContext) -> Resolution {
    match lookup(rt, class, name) {
        Some(method) if is_visible(rt, ctx, &method) => Resolution::Found(method),
        Some(method) => Resolution::FoundInvisible(method),
        None => Resolution::NotFound,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_core::{intern, Value};

    fn define(rt: &Runtime, class: ClassId, name: &str, visibility: Visibility) {
        rt.define_method(class, intern(name), visibility, |_, _| Ok(Value::nil()))
            .unwrap();
    }

    #[test]
    fn test_lookup_walks_ancestors() {
        let rt = Runtime::new();
        let base = rt.define_class("Base", ClassId::OBJECT);
        let derived = rt.define_class("Derived", base);
        define(&rt, base, "inherited", Visibility::Public);

        let found = lookup(&rt, derived, intern("inherited")).unwrap();
        assert_eq!(found.owner(), base);
        assert!(lookup(&rt, derived, intern("absent")).is_none());
    }

    #[test]
    fn test_subclass_override_shadows_base() {
        let rt = Runtime::new();
        let base = rt.define_class("Base", ClassId::OBJECT);
        let derived = rt.define_class("Derived", base);
        define(&rt, base, "report", Visibility::Public);
        define(&rt, derived, "report", Visibility::Public);

        let found = lookup(&rt, derived, intern("report")).unwrap();
        assert_eq!(found.owner(), derived);
    }

    #[test]
    fn test_private_invisible_at_checking_sites() {
        let rt = Runtime::new();
        let class = rt.define_class("Vault", ClassId::OBJECT);
        define(&rt, class, "combination", Visibility::Private);

        let checking = resolve(&rt, class, intern("combination"), &CallerContext::checking());
        assert!(matches!(checking, Resolution::FoundInvisible(_)));

        let bypassing = resolve(&rt, class, intern("combination"), &CallerContext::bypassing());
        assert!(matches!(bypassing, Resolution::Found(_)));
    }

    #[test]
    fn test_protected_requires_related_caller() {
        let rt = Runtime::new();
        let base = rt.define_class("Account", ClassId::OBJECT);
        let derived = rt.define_class("Savings", base);
        let outsider = rt.define_class("Outsider", ClassId::OBJECT);
        define(&rt, base, "balance", Visibility::Protected);

        let related = resolve(&rt, derived, intern("balance"), &CallerContext::from_class(derived));
        assert!(matches!(related, Resolution::Found(_)));

        let unrelated = resolve(&rt, base, intern("balance"), &CallerContext::from_class(outsider));
        assert!(matches!(unrelated, Resolution::FoundInvisible(_)));

        let anonymous = resolve(&rt, base, intern("balance"), &CallerContext::checking());
        assert!(matches!(anonymous, Resolution::FoundInvisible(_)));
    }

    #[test]
    fn test_not_found_on_empty_chain() {
        let rt = Runtime::new();
        let class = rt.define_class("Empty", ClassId::OBJECT);
        let resolution = resolve(&rt, class, intern("anything"), &CallerContext::checking());
        assert!(matches!(resolution, Resolution::NotFound));
    }
}
