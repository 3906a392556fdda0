//! Adaptive method dispatch.
//!
//! Every syntactic send owns a `CallSite`. A site starts empty and
//! specializes itself per receiver shape it actually sees, building a linear
//! chain of guarded cache nodes; past a depth limit it gives up on chains and
//! runs a map-backed generic tier instead.
//!
//! # Chain Layout
//!
//! ```text
//!  ┌───────────────── primitive tier ─────────────────┐
//!  │ Unboxed(int) → Boolean → Symbol                   │  receiver unwrapped
//!  └──────────────────────┬───────────────────────────┘
//!                   BoxingTransition                      reify primitives
//!  ┌──────────────────────┴───────────────────────────┐
//!  │ Boxed(Widget) → MethodMissing(Gear) → …           │  receiver reified
//!  └──────────────────────┬───────────────────────────┘
//!                   Uninitialized                         specialize / fail
//! ```
//!
//! New primitive-tier nodes are prepended ahead of the boxing transition;
//! boxed-tier nodes are appended just before the tail. The tail performs
//! full resolution, asks the site's missing policy what to do on failure,
//! and hands the site a node to splice in.
//!
//! # Site State Machine
//!
//! ```text
//!   Empty ──first receiver──▶ Monomorphic ──new shape──▶ Polymorphic
//!     ▲                            │                          │
//!     └──────── stale epoch ───────┴──── (whole-chain reset) ─┤
//!                                                             │
//!                                        depth > MAX ─────────▼
//!                                                        Megamorphic
//!                                                     (generic, final)
//! ```
//!
//! A stale guard discards the entire chain; the megamorphic tier is never
//! left once entered (staleness there is a wholesale table flush driven by
//! the global mutation counter).
//!
//! # Thread Safety
//!
//! Chains are immutable snapshots behind an `Arc` that is swapped under a
//! short write lock; walks run against their snapshot with no lock held, so
//! callables are free to re-enter dispatch. Guards are single atomic loads.

mod call_site;
mod chain;
mod dynamic;
mod generic;
mod node;

pub use call_site::{CallSite, CallSiteStats, SiteState};
pub use dynamic::DynamicCallSite;
pub use generic::GenericStats;

use std::sync::Arc;

use garnet_core::{ClassId, GarnetError, GarnetResult, SymbolId, Value};
use garnet_runtime::{lookup, resolve, CallerContext, Method, Resolution, Runtime};

/// Default maximum number of cached nodes before a site goes megamorphic.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 8;

/// Generic-table population past which a diagnostic is logged once.
pub const GENERIC_TABLE_WARN_THRESHOLD: usize = 64;

/// Dynamic-site name population past which a diagnostic is logged once.
pub const DYNAMIC_SITE_WARN_THRESHOLD: usize = 64;

/// What a call site does when resolution finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingBehavior {
    /// Invoke the receiver's `method_missing`, or raise when it has none.
    RaiseOnMissing,
    /// Return the `MISSING` sentinel without invoking anything.
    ReturnMissingSentinel,
}

/// What the walk is being asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchAction {
    Call,
    RespondTo,
}

/// One send, as seen by every tier.
pub(crate) struct SendArgs<'a> {
    pub action: DispatchAction,
    pub name: SymbolId,
    pub args: &'a [Value],
    pub block: Option<&'a Value>,
    pub caller: Option<ClassId>,
}

/// Outcome of resolving a name for a concrete receiver type, with the
/// site's missing policy already applied.
#[derive(Debug, Clone)]
pub(crate) enum ResolvedTarget {
    /// An ordinary method.
    Method(Arc<Method>),
    /// The type's missing-method fallback.
    Fallback(Arc<Method>),
    /// Nothing to invoke; the site signals absence.
    ReturnMissing,
}

/// Full resolution with the missing policy applied. Shared by the chain
/// specializer and the generic tier so both hand out identical targets.
///
/// A visible method wins. An invisible one is fatal right here: it is never
/// cached and never handed to the fallback. Only a true absence consults the
/// policy, and the fallback lookup ignores visibility (the runtime invokes
/// `method_missing` on one's behalf, which is not an explicit-receiver send).
pub(crate) fn resolve_target(
    rt: &Runtime,
    class: ClassId,
    name: SymbolId,
    caller: &CallerContext,
    missing: MissingBehavior,
) -> GarnetResult<ResolvedTarget> {
    match resolve(rt, class, name, caller) {
        Resolution::Found(method) => Ok(ResolvedTarget::Method(method)),
        Resolution::FoundInvisible(method) => Err(GarnetError::visibility(
            name,
            rt.class_name(class),
            method.visibility().as_str(),
        )),
        Resolution::NotFound => match missing {
            MissingBehavior::RaiseOnMissing => {
                match lookup(rt, class, rt.method_missing_name()) {
                    Some(fallback) => Ok(ResolvedTarget::Fallback(fallback)),
                    None => Err(GarnetError::no_method(name, rt.class_name(class))),
                }
            }
            MissingBehavior::ReturnMissingSentinel => Ok(ResolvedTarget::ReturnMissing),
        },
    }
}
