//! Boxing and argument adaptation.
//!
//! Primitives stay unwrapped on the dispatch fast path. Two situations force
//! a primitive into object form: crossing the boxed tier of a dispatch chain,
//! and per-object specialization. `reify` performs that conversion, carrying
//! the primitive datum along as the object's payload so callables can read it
//! back. Argument vectors are built here too, including the name-prepending
//! shape the missing-method protocol requires.

use garnet_core::{GarnetError, GarnetResult, ObjectCell, Payload, SymbolId, Value};

use crate::method::ArgVec;
use crate::runtime::Runtime;

/// Convert `value` into object form.
///
/// Objects pass through untouched. Reified primitives are governed by the
/// same class the unwrapped value maps to, so type identity is preserved
/// across the conversion (including symbol identity overrides).
pub fn reify(rt: &Runtime, value: &Value) -> GarnetResult<Value> {
    let payload = match value {
        Value::Object(_) => return Ok(value.clone()),
        Value::Nil => Payload::Nil,
        Value::Bool(b) => Payload::Bool(*b),
        Value::Int(i) => Payload::Int(*i),
        Value::Float(f) => Payload::Float(*f),
        Value::Symbol(s) => Payload::Symbol(*s),
        Value::Missing => {
            return Err(GarnetError::type_error("cannot reify the missing sentinel"))
        }
    };
    let class = rt.identity_of(value);
    Ok(Value::object(ObjectCell::with_payload(class, payload)))
}

/// Build the argument vector for an ordinary send.
#[inline]
pub fn build_args(args: &[Value]) -> ArgVec {
    ArgVec::from(args)
}

/// Build the argument vector for a missing-method send: the requested name,
/// as a symbol, prepended to the original arguments.
pub fn prepend_name(name: SymbolId, args: &[Value]) -> ArgVec {
    let mut out = ArgVec::with_capacity(args.len() + 1);
    out.push(Value::symbol(name));
    out.extend(args.iter().cloned());
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_core::{intern, ClassId};

    #[test]
    fn test_reify_int_keeps_identity_and_payload() {
        let rt = Runtime::new();
        let boxed = reify(&rt, &Value::int(41)).unwrap();
        let cell = boxed.as_object().unwrap();
        assert_eq!(cell.class(), ClassId::INTEGER);
        assert_eq!(*cell.payload(), Payload::Int(41));
    }

    #[test]
    fn test_reify_bool_maps_to_one_element_classes() {
        let rt = Runtime::new();
        let t = reify(&rt, &Value::bool(true)).unwrap();
        let f = reify(&rt, &Value::bool(false)).unwrap();
        assert_eq!(t.as_object().unwrap().class(), ClassId::TRUE);
        assert_eq!(f.as_object().unwrap().class(), ClassId::FALSE);
    }

    #[test]
    fn test_reify_object_is_passthrough() {
        let rt = Runtime::new();
        let class = rt.define_class("Widget", ClassId::OBJECT);
        let obj = rt.allocate(class).unwrap();
        let reified = reify(&rt, &obj).unwrap();
        assert_eq!(obj, reified);
    }

    #[test]
    fn test_reify_overridden_symbol_uses_override_identity() {
        let rt = Runtime::new();
        let sym = Value::symbol(intern("special"));
        let singleton = rt.singleton_class_of(&sym).unwrap();
        let boxed = reify(&rt, &sym).unwrap();
        assert_eq!(boxed.as_object().unwrap().class(), singleton);
    }

    #[test]
    fn test_reify_missing_is_an_error() {
        let rt = Runtime::new();
        assert!(reify(&rt, &Value::missing()).is_err());
    }

    #[test]
    fn test_prepend_name_shape() {
        let name = intern("frob");
        let out = prepend_name(name, &[Value::int(1), Value::int(2)]);
        assert_eq!(out.as_slice(), &[Value::symbol(name), Value::int(1), Value::int(2)]);
    }

    #[test]
    fn test_prepend_name_empty_args() {
        let name = intern("frob");
        let out = prepend_name(name, &[]);
        assert_eq!(out.as_slice(), &[Value::symbol(name)]);
    }
}
