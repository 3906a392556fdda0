//! Fixed-name call sites.
//!
//! A `CallSite` owns the adaptive cache for one syntactic send of one name.
//! Configuration is fixed at construction (name, missing policy, caller
//! context for visibility, depth limit); everything else adapts to the
//! receivers the site actually sees.
//!
//! The site reacts to walk outcomes. A handled walk is the fast path. A
//! stale walk discards the whole chain and replays. An unhandled walk runs
//! full resolution for the receiver, splices in a fresh node, and replays;
//! once the chain would outgrow the depth limit the site installs the
//! generic tier instead and never leaves it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use garnet_core::{ClassId, GarnetResult, SymbolId, UnboxedKind, Value};
use garnet_runtime::{resolve, CallerContext, Resolution, Runtime};

use super::chain::{DispatchChain, Walked};
use super::generic::GenericTable;
use super::node::{
    BooleanNode, BoxedNode, BranchArm, DispatchNode, EpochGuard, MissingNode, ReturnMissingNode,
    SymbolNode, UnboxedNode,
};
use super::{
    resolve_target, DispatchAction, MissingBehavior, ResolvedTarget, SendArgs,
    DEFAULT_MAX_CHAIN_DEPTH,
};

/// How the site currently dispatches. Swapped wholesale under the lock;
/// clones are cheap snapshots.
#[derive(Clone)]
enum Strategy {
    Chain(Arc<DispatchChain>),
    Generic(Arc<GenericTable>),
}

/// Coarse cache shape, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteState {
    Empty,
    Monomorphic,
    Polymorphic,
    Megamorphic,
}

/// Counter snapshot for one site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallSiteStats {
    /// Full method resolutions performed (cache misses).
    pub resolutions: u64,
    /// Whole-chain resets taken after a stale guard.
    pub resets: u64,
    /// Transitions to the generic tier (0 or 1 over a site's life).
    pub generic_promotions: u64,
}

pub struct CallSite {
    name: SymbolId,
    missing: MissingBehavior,
    caller: CallerContext,
    max_depth: usize,
    strategy: RwLock<Strategy>,
    resolutions: AtomicU64,
    resets: AtomicU64,
    generic_promotions: AtomicU64,
}

impl CallSite {
    /// A fresh site for `name`, visibility-checking, with the default depth
    /// limit.
    pub fn new(name: SymbolId, missing: MissingBehavior) -> Self {
        Self {
            name,
            missing,
            caller: CallerContext::checking(),
            max_depth: DEFAULT_MAX_CHAIN_DEPTH,
            strategy: RwLock::new(Strategy::Chain(Arc::new(DispatchChain::empty()))),
            resolutions: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            generic_promotions: AtomicU64::new(0),
        }
    }

    /// Fix the caller context used for visibility. Self-sends pass
    /// `CallerContext::bypassing()`.
    pub fn with_caller(mut self, caller: CallerContext) -> Self {
        self.caller = caller;
        self
    }

    /// Override the depth limit (tests mostly).
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn name(&self) -> SymbolId {
        self.name
    }

    pub fn missing_behavior(&self) -> MissingBehavior {
        self.missing
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Dispatch one send through the cache.
    pub fn dispatch(
        &self,
        rt: &Runtime,
        receiver: &Value,
        args: &[Value],
        block: Option<&Value>,
    ) -> GarnetResult<Value> {
        let send = SendArgs {
            action: DispatchAction::Call,
            name: self.name,
            args,
            block,
            caller: self.caller.caller_class,
        };
        self.send(rt, &send, receiver)
    }

    /// Would `dispatch` produce a result for this receiver (method, or a
    /// fallback the site's policy invokes), rather than raise or signal
    /// absence? Warms the same cache dispatch uses and answers from it.
    pub fn responds_to(&self, rt: &Runtime, receiver: &Value) -> bool {
        let send = SendArgs {
            action: DispatchAction::RespondTo,
            name: self.name,
            args: &[],
            block: None,
            caller: self.caller.caller_class,
        };
        matches!(self.send(rt, &send, receiver), Ok(answer) if answer == Value::bool(true))
    }

    fn send(&self, rt: &Runtime, send: &SendArgs<'_>, receiver: &Value) -> GarnetResult<Value> {
        loop {
            let strategy = self.strategy.read().clone();
            match strategy {
                Strategy::Generic(table) => {
                    return table.dispatch(rt, send, receiver, self.missing, &self.caller)
                }
                Strategy::Chain(chain) => match chain.walk(rt, send, receiver)? {
                    Walked::Handled(value) => return Ok(value),
                    Walked::Stale => self.reset("stale guard"),
                    Walked::Unhandled => self.specialize(rt, receiver)?,
                },
            }
        }
    }

    // =========================================================================
    // Specialization
    // =========================================================================

    /// Resolve for the receiver's current identity, build the matching node,
    /// and publish an extended chain. Fatal resolution outcomes propagate
    /// without touching the cache.
    fn specialize(&self, rt: &Runtime, receiver: &Value) -> GarnetResult<()> {
        self.resolutions.fetch_add(1, Ordering::Relaxed);

        let class = rt.identity_of(receiver);
        let target = resolve_target(rt, class, self.name, &self.caller, self.missing)?;
        let node = self.build_node(rt, receiver, class, target);

        let mut strategy = self.strategy.write();
        let chain = match &*strategy {
            // Promoted while we resolved; the replay dispatches generically.
            Strategy::Generic(_) => return Ok(()),
            Strategy::Chain(chain) => Arc::clone(chain),
        };
        // A concurrent specialization may have covered this shape already.
        if chain.covers(rt, receiver) {
            return Ok(());
        }

        let rebuilt = if matches!(node, DispatchNode::Boolean(_)) {
            chain.with_boolean_refreshed(node)
        } else if node.is_primitive_tier() {
            chain.with_primitive_prepended(node)
        } else {
            chain.with_boxed_appended(node)
        };

        if rebuilt.cached_len() > self.max_depth {
            self.generic_promotions.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "call site '{}' megamorphic after {} receiver shapes",
                self.name,
                rebuilt.cached_len()
            );
            *strategy = Strategy::Generic(Arc::new(GenericTable::new(rt)));
        } else {
            *strategy = Strategy::Chain(Arc::new(rebuilt));
        }
        Ok(())
    }

    fn build_node(
        &self,
        rt: &Runtime,
        receiver: &Value,
        class: ClassId,
        target: ResolvedTarget,
    ) -> DispatchNode {
        match target {
            ResolvedTarget::Method(method) => match receiver {
                Value::Nil => DispatchNode::Unboxed(UnboxedNode {
                    kind: UnboxedKind::Nil,
                    guard: EpochGuard::observe(rt, ClassId::NIL),
                    method,
                }),
                Value::Int(_) => DispatchNode::Unboxed(UnboxedNode {
                    kind: UnboxedKind::Int,
                    guard: EpochGuard::observe(rt, ClassId::INTEGER),
                    method,
                }),
                Value::Float(_) => DispatchNode::Unboxed(UnboxedNode {
                    kind: UnboxedKind::Float,
                    guard: EpochGuard::observe(rt, ClassId::FLOAT),
                    method,
                }),
                Value::Bool(_) => self.build_boolean_node(rt),
                Value::Symbol(_) => {
                    // Observe the epoch before reading the flag. An override
                    // clears the flag before bumping, so a pristine read here
                    // proves the observation predates any bump that matters.
                    let symbol_guard = EpochGuard::new(
                        Arc::clone(rt.symbol_epoch()),
                        rt.symbol_epoch().current(),
                    );
                    if rt.symbols_pristine() {
                        DispatchNode::Symbol(SymbolNode {
                            symbol_guard,
                            class_guard: EpochGuard::observe(rt, ClassId::SYMBOL),
                            method,
                        })
                    } else {
                        DispatchNode::Boxed(BoxedNode {
                            expected: class,
                            guard: EpochGuard::observe(rt, class),
                            method,
                        })
                    }
                }
                _ => DispatchNode::Boxed(BoxedNode {
                    expected: class,
                    guard: EpochGuard::observe(rt, class),
                    method,
                }),
            },
            ResolvedTarget::Fallback(fallback) => DispatchNode::MethodMissing(MissingNode {
                expected: class,
                guard: EpochGuard::observe(rt, class),
                fallback,
            }),
            ResolvedTarget::ReturnMissing => DispatchNode::ReturnMissing(ReturnMissingNode {
                expected: class,
                guard: EpochGuard::observe(rt, class),
            }),
        }
    }

    /// Resolve both boolean branches fresh. Branches that do not resolve to
    /// a visible method stay unpopulated; a walk for that value then misses
    /// through to the tail and the boxed tier handles the policy.
    fn build_boolean_node(&self, rt: &Runtime) -> DispatchNode {
        DispatchNode::Boolean(BooleanNode {
            truthy: self.boolean_arm(rt, ClassId::TRUE),
            falsy: self.boolean_arm(rt, ClassId::FALSE),
        })
    }

    fn boolean_arm(&self, rt: &Runtime, class: ClassId) -> Option<BranchArm> {
        // Observation precedes the table read, so a racing mutation can only
        // leave the arm stale, never wrong.
        let guard = EpochGuard::observe(rt, class);
        match resolve(rt, class, self.name, &self.caller) {
            Resolution::Found(method) => Some(BranchArm { guard, method }),
            _ => None,
        }
    }

    // =========================================================================
    // Reset & Introspection
    // =========================================================================

    /// Discard every cached speculation; the next dispatch rebuilds from
    /// scratch. Megamorphic sites ignore this (the generic tier flushes
    /// itself off the global mutation counter instead).
    pub fn reset(&self, reason: &'static str) {
        let mut strategy = self.strategy.write();
        if let Strategy::Chain(_) = &*strategy {
            self.resets.fetch_add(1, Ordering::Relaxed);
            log::trace!("call site '{}' reset: {}", self.name, reason);
            *strategy = Strategy::Chain(Arc::new(DispatchChain::empty()));
        }
    }

    pub fn state(&self) -> SiteState {
        match &*self.strategy.read() {
            Strategy::Generic(_) => SiteState::Megamorphic,
            Strategy::Chain(chain) => match chain.cached_len() {
                0 => SiteState::Empty,
                1 => SiteState::Monomorphic,
                _ => SiteState::Polymorphic,
            },
        }
    }

    /// Cached-node count, or `None` once megamorphic.
    pub fn chain_len(&self) -> Option<usize> {
        match &*self.strategy.read() {
            Strategy::Chain(chain) => Some(chain.cached_len()),
            Strategy::Generic(_) => None,
        }
    }

    /// Generic-tier counters, once promoted.
    pub fn generic_stats(&self) -> Option<super::GenericStats> {
        match &*self.strategy.read() {
            Strategy::Generic(table) => Some(table.stats()),
            Strategy::Chain(_) => None,
        }
    }

    pub fn stats(&self) -> CallSiteStats {
        CallSiteStats {
            resolutions: self.resolutions.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            generic_promotions: self.generic_promotions.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSite")
            .field("name", &self.name)
            .field("missing", &self.missing)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
