//! Callable methods and the invocation ABI.
//!
//! A `Method` is a resolved, invocable entry of some class's method table:
//! name, defining class, visibility, flags, and a native body. Methods are
//! immutable once built; visibility changes produce a replacement entry so
//! that dispatch caches holding the old `Arc` stay internally consistent
//! (their staleness is signalled by the epoch, not by mutation).

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use garnet_core::{ClassId, GarnetResult, SymbolId, Value};
use smallvec::SmallVec;

use crate::runtime::Runtime;

/// Argument vector passed to callables.
///
/// Four inline slots cover the overwhelming majority of sends without
/// touching the heap.
pub type ArgVec = SmallVec<[Value; 4]>;

/// Native method body.
pub type NativeFn = Arc<dyn Fn(&Runtime, &CallEnv) -> GarnetResult<Value> + Send + Sync>;

// =============================================================================
// Visibility
// =============================================================================

/// Method visibility levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

impl Visibility {
    pub const fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
        }
    }
}

// =============================================================================
// Method Flags
// =============================================================================

bitflags! {
    /// Behavioral flags carried by a method.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodFlags: u8 {
        /// The body wants the originating call site's name and caller
        /// context delivered in `CallEnv::site`.
        const CALLER_SENSITIVE = 1 << 0;
    }
}

// =============================================================================
// Method
// =============================================================================

/// An invocable method table entry.
pub struct Method {
    name: SymbolId,
    owner: ClassId,
    visibility: Visibility,
    flags: MethodFlags,
    body: NativeFn,
}

impl Method {
    pub fn new(
        name: SymbolId,
        owner: ClassId,
        visibility: Visibility,
        flags: MethodFlags,
        body: NativeFn,
    ) -> Self {
        Self {
            name,
            owner,
            visibility,
            flags,
            body,
        }
    }

    #[inline]
    pub fn name(&self) -> SymbolId {
        self.name
    }

    /// Class whose table defines this entry.
    #[inline]
    pub fn owner(&self) -> ClassId {
        self.owner
    }

    #[inline]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    #[inline]
    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    #[inline]
    pub fn is_caller_sensitive(&self) -> bool {
        self.flags.contains(MethodFlags::CALLER_SENSITIVE)
    }

    /// Copy of this method with a different visibility.
    pub fn with_visibility(&self, visibility: Visibility) -> Self {
        Self {
            name: self.name,
            owner: self.owner,
            visibility,
            flags: self.flags,
            body: Arc::clone(&self.body),
        }
    }

    /// Copy of this method registered under a different name and owner.
    pub fn aliased(&self, name: SymbolId, owner: ClassId) -> Self {
        Self {
            name,
            owner,
            visibility: self.visibility,
            flags: self.flags,
            body: Arc::clone(&self.body),
        }
    }

    #[inline]
    pub fn body(&self) -> &NativeFn {
        &self.body
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("visibility", &self.visibility)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Invocation ABI
// =============================================================================

/// Where a send came from, for caller-sensitive methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteInfo {
    /// Name the site dispatched (the requested name, not an alias target).
    pub name: SymbolId,
    /// Lexical class of the sending site, when known.
    pub caller: Option<ClassId>,
}

/// Everything a native body receives for one invocation.
#[derive(Debug, Clone)]
pub struct CallEnv {
    pub receiver: Value,
    pub args: ArgVec,
    pub block: Option<Value>,
    /// Populated only for `CALLER_SENSITIVE` methods.
    pub site: Option<SiteInfo>,
}

impl CallEnv {
    /// Argument at `index`, or an argument error naming the shortfall.
    pub fn arg(&self, index: usize) -> GarnetResult<&Value> {
        self.args.get(index).ok_or_else(|| {
            garnet_core::GarnetError::argument(format!(
                "expected at least {} arguments, got {}",
                index + 1,
                self.args.len()
            ))
        })
    }
}

/// Invoke `method` with the fully-built argument vector.
///
/// Errors from the body propagate unmodified; dispatch adds nothing.
pub fn invoke(
    rt: &Runtime,
    method: &Method,
    receiver: Value,
    args: ArgVec,
    block: Option<Value>,
    site: SiteInfo,
) -> GarnetResult<Value> {
    let env = CallEnv {
        receiver,
        args,
        block,
        site: method.is_caller_sensitive().then_some(site),
    };
    (method.body)(rt, &env)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_core::{intern, ClassId};

    fn noop_body() -> NativeFn {
        Arc::new(|_, _| Ok(Value::nil()))
    }

    #[test]
    fn test_visibility_labels() {
        assert_eq!(Visibility::Public.as_str(), "public");
        assert_eq!(Visibility::Private.as_str(), "private");
        assert_eq!(Visibility::Protected.as_str(), "protected");
    }

    #[test]
    fn test_with_visibility_keeps_identity_fields() {
        let m = Method::new(
            intern("report"),
            ClassId::OBJECT,
            Visibility::Public,
            MethodFlags::empty(),
            noop_body(),
        );
        let hidden = m.with_visibility(Visibility::Private);
        assert_eq!(hidden.name(), m.name());
        assert_eq!(hidden.owner(), m.owner());
        assert_eq!(hidden.visibility(), Visibility::Private);
    }

    #[test]
    fn test_aliased_retargets_name_and_owner() {
        let m = Method::new(
            intern("original"),
            ClassId::OBJECT,
            Visibility::Protected,
            MethodFlags::CALLER_SENSITIVE,
            noop_body(),
        );
        let alias = m.aliased(intern("renamed"), ClassId::from_raw(400));
        assert_eq!(alias.name(), intern("renamed"));
        assert_eq!(alias.owner(), ClassId::from_raw(400));
        assert_eq!(alias.visibility(), Visibility::Protected);
        assert!(alias.is_caller_sensitive());
    }

    #[test]
    fn test_call_env_arg_bounds() {
        let env = CallEnv {
            receiver: Value::nil(),
            args: ArgVec::from(&[Value::int(1)][..]),
            block: None,
            site: None,
        };
        assert_eq!(env.arg(0).unwrap(), &Value::int(1));
        assert!(env.arg(1).is_err());
    }
}
