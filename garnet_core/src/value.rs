//! Uniform value representation.
//!
//! A `Value` is either an immediate primitive (nil, boolean, integer, float,
//! symbol), a handle to a heap object, or the internal MISSING sentinel.
//! Primitives stay unwrapped until something forces them into object form;
//! the runtime's boxing adapter produces an `ObjectCell` carrying the
//! primitive as its payload when that happens.
//!
//! # Type identity
//!
//! Every value maps to a `ClassId`, the identity of the method table that
//! governs it. Primitives map to fixed built-in ids; heap objects carry
//! their id in an atomic cell so per-object specialization can retarget a
//! single object without touching its class.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::symbol::SymbolId;

// =============================================================================
// Class Identity
// =============================================================================

/// Identity of a method table.
///
/// Built-in classes occupy the low id space; user classes are allocated from
/// `FIRST_USER` upward by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub const OBJECT: ClassId = ClassId(0);
    pub const NIL: ClassId = ClassId(1);
    pub const TRUE: ClassId = ClassId(2);
    pub const FALSE: ClassId = ClassId(3);
    pub const INTEGER: ClassId = ClassId(4);
    pub const FLOAT: ClassId = ClassId(5);
    pub const SYMBOL: ClassId = ClassId(6);

    /// First id handed out for user-defined classes.
    pub const FIRST_USER: ClassId = ClassId(256);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        ClassId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_USER.0
    }
}

// =============================================================================
// Unboxed Primitive Kinds
// =============================================================================

/// The primitive kinds served by the unboxed dispatch tier.
///
/// Booleans and symbols are deliberately absent: each has a dedicated
/// dispatch node kind with stronger guard requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnboxedKind {
    Nil,
    Int,
    Float,
}

impl UnboxedKind {
    /// The built-in class governing this kind.
    #[inline]
    pub const fn class(self) -> ClassId {
        match self {
            UnboxedKind::Nil => ClassId::NIL,
            UnboxedKind::Int => ClassId::INTEGER,
            UnboxedKind::Float => ClassId::FLOAT,
        }
    }
}

// =============================================================================
// Heap Objects
// =============================================================================

/// Payload carried by a heap object.
///
/// Reified primitives keep their primitive datum here so callables can read
/// it back regardless of which tier boxed the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Plain instance with no primitive datum.
    None,
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Symbol(SymbolId),
}

/// A heap object: a class pointer plus an optional primitive payload.
///
/// The class field is atomic so singleton-class installation can retarget
/// one object while other threads read its identity lock-free.
#[derive(Debug)]
pub struct ObjectCell {
    class: AtomicU32,
    payload: Payload,
}

impl ObjectCell {
    /// Allocate a plain instance of `class`.
    pub fn new(class: ClassId) -> Arc<Self> {
        Self::with_payload(class, Payload::None)
    }

    /// Allocate an instance of `class` carrying `payload`.
    pub fn with_payload(class: ClassId, payload: Payload) -> Arc<Self> {
        Arc::new(Self {
            class: AtomicU32::new(class.raw()),
            payload,
        })
    }

    /// Current class identity of this object.
    #[inline]
    pub fn class(&self) -> ClassId {
        ClassId::from_raw(self.class.load(Ordering::Acquire))
    }

    /// Retarget this object to `class`.
    ///
    /// The new class must already be registered and populated; the release
    /// store pairs with the acquire load in `class`.
    #[inline]
    pub fn set_class(&self, class: ClassId) {
        self.class.store(class.raw(), Ordering::Release);
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

// =============================================================================
// Value
// =============================================================================

/// A Garnet value.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Symbol(SymbolId),
    Object(Arc<ObjectCell>),
    /// Sentinel returned by sentinel-configured call sites when no method
    /// exists. Never a valid receiver and never escapes to language code.
    Missing,
}

impl Value {
    #[inline]
    pub const fn nil() -> Self {
        Value::Nil
    }

    #[inline]
    pub const fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    #[inline]
    pub const fn int(i: i64) -> Self {
        Value::Int(i)
    }

    #[inline]
    pub const fn float(f: f64) -> Self {
        Value::Float(f)
    }

    #[inline]
    pub const fn symbol(id: SymbolId) -> Self {
        Value::Symbol(id)
    }

    #[inline]
    pub fn object(cell: Arc<ObjectCell>) -> Self {
        Value::Object(cell)
    }

    #[inline]
    pub const fn missing() -> Self {
        Value::Missing
    }

    #[inline]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub const fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    #[inline]
    pub const fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    #[inline]
    pub const fn is_symbol(&self) -> bool {
        matches!(self, Value::Symbol(_))
    }

    #[inline]
    pub const fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            Value::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<&Arc<ObjectCell>> {
        match self {
            Value::Object(cell) => Some(cell),
            _ => None,
        }
    }

    /// The unboxed-tier kind of this value, if it has one.
    #[inline]
    pub fn unboxed_kind(&self) -> Option<UnboxedKind> {
        match self {
            Value::Nil => Some(UnboxedKind::Nil),
            Value::Int(_) => Some(UnboxedKind::Int),
            Value::Float(_) => Some(UnboxedKind::Float),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Missing, Value::Missing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Symbol(s) => write!(f, ":{}", s),
            Value::Object(cell) => write!(f, "#<object class={}>", cell.class().raw()),
            Value::Missing => f.write_str("#<missing>"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
