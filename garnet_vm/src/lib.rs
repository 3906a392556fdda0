//! Adaptive method dispatch for the Garnet runtime.
//!
//! The interpreter compiles every send into a call site from this crate;
//! sites specialize themselves per receiver shape and fall back to a
//! map-backed generic tier when a site turns out megamorphic. See the
//! `dispatch` module for the chain model.

pub mod dispatch;

pub use dispatch::{
    CallSite, CallSiteStats, DynamicCallSite, GenericStats, MissingBehavior, SiteState,
    DEFAULT_MAX_CHAIN_DEPTH,
};
