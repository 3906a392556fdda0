//! Object model for the Garnet runtime.
//!
//! This crate provides:
//! - Classes and method tables (`Class`, `Method`, `Visibility`)
//! - Type epochs and the epoch registry (cache invalidation tokens)
//! - Method resolution with visibility rules
//! - The boxing/argument adapter consumed by the dispatch core
//! - `Runtime`: the shared context tying the above together

pub mod boxing;
pub mod class;
pub mod epoch;
pub mod method;
pub mod resolve;
pub mod runtime;

pub use class::{Class, ClassFlags};
pub use epoch::{BumpReason, Epoch, EpochCell, EpochRegistry, EpochStats};
pub use method::{invoke, ArgVec, CallEnv, Method, MethodFlags, NativeFn, SiteInfo, Visibility};
pub use resolve::{is_visible, lookup, resolve, CallerContext, Resolution};
pub use runtime::Runtime;
