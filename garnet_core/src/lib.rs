//! Core value representation for the Garnet runtime.
//!
//! This crate provides:
//! - The uniform `Value` type (immediate primitives + heap object handles)
//! - Type identity (`ClassId`) shared by every layer above
//! - Global symbol interning (`SymbolId`)
//! - The runtime error taxonomy (`GarnetError`)

pub mod error;
pub mod symbol;
pub mod value;

pub use error::{GarnetError, GarnetResult};
pub use symbol::{intern, SymbolId};
pub use value::{ClassId, ObjectCell, Payload, UnboxedKind, Value};
