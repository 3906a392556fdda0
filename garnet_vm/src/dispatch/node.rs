//! Dispatch chain nodes.
//!
//! A node is one frozen speculation: "receivers shaped like this are
//! governed by that method table, and here is the method resolution found
//! there". Guards re-check the speculation in two steps, shape first, epoch
//! second, and the distinction matters: a shape mismatch just means the node
//! is for somebody else (`Miss`), while a stale epoch means the node's
//! cached resolution can no longer be trusted (`Stale`) and the owning site
//! must rebuild.
//!
//! Nodes never invoke resolution, never mutate, and never see each other;
//! they answer for exactly one attempt and the call site reacts.

use std::sync::Arc;

use garnet_core::{ClassId, GarnetResult, UnboxedKind, Value};
use garnet_runtime::{boxing, invoke, Epoch, EpochCell, Method, Runtime, SiteInfo};

use super::{DispatchAction, SendArgs};

/// One node's answer for one receiver.
#[derive(Debug)]
pub(crate) enum Attempt {
    /// Guard matched; here is the dispatch result.
    Handled(Value),
    /// Receiver is not the shape this node speculates on.
    Miss,
    /// Shape matched but the cached resolution is no longer trustworthy.
    Stale,
}

/// An observed epoch together with the cell to re-check it against.
#[derive(Debug, Clone)]
pub(crate) struct EpochGuard {
    cell: Arc<EpochCell>,
    observed: Epoch,
}

impl EpochGuard {
    pub fn new(cell: Arc<EpochCell>, observed: Epoch) -> Self {
        Self { cell, observed }
    }

    /// Observe `class`'s current epoch through the runtime's registry.
    pub fn observe(rt: &Runtime, class: ClassId) -> Self {
        let (cell, observed) = rt.epochs().observe(class);
        Self { cell, observed }
    }

    #[inline]
    pub fn holds(&self) -> bool {
        self.cell.is_current(self.observed)
    }
}

// =============================================================================
// Node Kinds
// =============================================================================

/// Primitive-tier node: unwrapped nil/int/float receivers.
#[derive(Debug, Clone)]
pub(crate) struct UnboxedNode {
    pub kind: UnboxedKind,
    pub guard: EpochGuard,
    pub method: Arc<Method>,
}

/// One populated branch of a boolean node.
#[derive(Debug, Clone)]
pub(crate) struct BranchArm {
    pub guard: EpochGuard,
    pub method: Arc<Method>,
}

/// Primitive-tier node for booleans: two independent cache slots, because
/// true and false are distinct one-element types that must never alias.
#[derive(Debug, Clone)]
pub(crate) struct BooleanNode {
    pub truthy: Option<BranchArm>,
    pub falsy: Option<BranchArm>,
}

/// Primitive-tier node for symbols. Valid only while both the symbol class
/// epoch and the global symbol epoch are unmoved; the global epoch retires
/// every node of this kind the first time any symbol gains a per-value
/// identity.
#[derive(Debug, Clone)]
pub(crate) struct SymbolNode {
    pub symbol_guard: EpochGuard,
    pub class_guard: EpochGuard,
    pub method: Arc<Method>,
}

/// Boxed-tier node: exact class identity of a reified receiver.
#[derive(Debug, Clone)]
pub(crate) struct BoxedNode {
    pub expected: ClassId,
    pub guard: EpochGuard,
    pub method: Arc<Method>,
}

/// Boxed-tier terminal caching a missing-method fallback. Invokes it with
/// the requested name prepended to the arguments.
#[derive(Debug, Clone)]
pub(crate) struct MissingNode {
    pub expected: ClassId,
    pub guard: EpochGuard,
    pub fallback: Arc<Method>,
}

/// Boxed-tier terminal for sentinel-configured sites: answers MISSING
/// without invoking anything.
#[derive(Debug, Clone)]
pub(crate) struct ReturnMissingNode {
    pub expected: ClassId,
    pub guard: EpochGuard,
}

/// The closed union of chain nodes.
#[derive(Debug, Clone)]
pub(crate) enum DispatchNode {
    Unboxed(UnboxedNode),
    Boolean(BooleanNode),
    Symbol(SymbolNode),
    Boxed(BoxedNode),
    MethodMissing(MissingNode),
    ReturnMissing(ReturnMissingNode),
    /// Structural marker: reify the receiver and continue in the boxed tier.
    Boxing,
    /// Structural tail: walking past every cache means the site must
    /// specialize (or fail) for this receiver.
    Uninitialized,
}

impl DispatchNode {
    /// Does this node occupy a cache slot (as opposed to being a structural
    /// marker)?
    #[inline]
    pub fn is_cached(&self) -> bool {
        !matches!(self, DispatchNode::Boxing | DispatchNode::Uninitialized)
    }

    /// Does this node belong ahead of the boxing transition?
    #[inline]
    pub fn is_primitive_tier(&self) -> bool {
        matches!(
            self,
            DispatchNode::Unboxed(_) | DispatchNode::Boolean(_) | DispatchNode::Symbol(_)
        )
    }

    /// Try this node against `receiver` (already reified iff the node sits
    /// in the boxed tier).
    pub fn attempt(
        &self,
        rt: &Runtime,
        send: &SendArgs<'_>,
        receiver: &Value,
    ) -> GarnetResult<Attempt> {
        match self {
            DispatchNode::Unboxed(node) => {
                if receiver.unboxed_kind() != Some(node.kind) {
                    return Ok(Attempt::Miss);
                }
                if !node.guard.holds() {
                    return Ok(Attempt::Stale);
                }
                hit(rt, send, receiver, &node.method)
            }
            DispatchNode::Boolean(node) => {
                let arm = match receiver {
                    Value::Bool(true) => &node.truthy,
                    Value::Bool(false) => &node.falsy,
                    _ => return Ok(Attempt::Miss),
                };
                match arm {
                    Some(arm) if !arm.guard.holds() => Ok(Attempt::Stale),
                    Some(arm) => hit(rt, send, receiver, &arm.method),
                    None => Ok(Attempt::Miss),
                }
            }
            DispatchNode::Symbol(node) => {
                if !receiver.is_symbol() {
                    return Ok(Attempt::Miss);
                }
                if !node.symbol_guard.holds() || !node.class_guard.holds() {
                    return Ok(Attempt::Stale);
                }
                hit(rt, send, receiver, &node.method)
            }
            DispatchNode::Boxed(node) => match boxed_class(receiver) {
                Some(class) if class != node.expected => Ok(Attempt::Miss),
                Some(_) if !node.guard.holds() => Ok(Attempt::Stale),
                Some(_) => hit(rt, send, receiver, &node.method),
                None => Ok(Attempt::Miss),
            },
            DispatchNode::MethodMissing(node) => match boxed_class(receiver) {
                Some(class) if class != node.expected => Ok(Attempt::Miss),
                Some(_) if !node.guard.holds() => Ok(Attempt::Stale),
                Some(_) => match send.action {
                    DispatchAction::Call => invoke(
                        rt,
                        &node.fallback,
                        receiver.clone(),
                        boxing::prepend_name(send.name, send.args),
                        send.block.cloned(),
                        site_info(send),
                    )
                    .map(Attempt::Handled),
                    // Dispatch would invoke the fallback rather than raise.
                    DispatchAction::RespondTo => Ok(Attempt::Handled(Value::bool(true))),
                },
                None => Ok(Attempt::Miss),
            },
            DispatchNode::ReturnMissing(node) => match boxed_class(receiver) {
                Some(class) if class != node.expected => Ok(Attempt::Miss),
                Some(_) if !node.guard.holds() => Ok(Attempt::Stale),
                Some(_) => match send.action {
                    DispatchAction::Call => Ok(Attempt::Handled(Value::missing())),
                    DispatchAction::RespondTo => Ok(Attempt::Handled(Value::bool(false))),
                },
                None => Ok(Attempt::Miss),
            },
            DispatchNode::Boxing | DispatchNode::Uninitialized => Ok(Attempt::Miss),
        }
    }
}

#[inline]
fn boxed_class(receiver: &Value) -> Option<ClassId> {
    receiver.as_object().map(|cell| cell.class())
}

#[inline]
fn site_info(send: &SendArgs<'_>) -> SiteInfo {
    SiteInfo {
        name: send.name,
        caller: send.caller,
    }
}

/// Serve a guard hit: invoke for calls, answer affirmatively for responds.
fn hit(
    rt: &Runtime,
    send: &SendArgs<'_>,
    receiver: &Value,
    method: &Arc<Method>,
) -> GarnetResult<Attempt> {
    match send.action {
        DispatchAction::Call => invoke(
            rt,
            method,
            receiver.clone(),
            boxing::build_args(send.args),
            send.block.cloned(),
            site_info(send),
        )
        .map(Attempt::Handled),
        DispatchAction::RespondTo => Ok(Attempt::Handled(Value::bool(true))),
    }
}

// =============================================================================
// Tests
// =============================================================================
