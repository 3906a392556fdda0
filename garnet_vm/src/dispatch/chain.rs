//! The dispatch chain: a flat arena of nodes walked in order.
//!
//! Chains are immutable. Specialization builds a replacement vector from the
//! old one and the call site publishes it with a single pointer swap, so a
//! walk always runs against one consistent snapshot.
//!
//! Layout invariant: zero or more primitive-tier nodes, then the boxing
//! transition, then zero or more boxed-tier nodes, then the uninitialized
//! tail. The empty chain is just the tail; the transition appears with the
//! first cached node and stays for the chain's lifetime.

use garnet_core::{GarnetResult, Value};
use garnet_runtime::{boxing, Runtime};

use super::node::{Attempt, DispatchNode};
use super::SendArgs;

/// Result of walking a whole chain.
#[derive(Debug)]
pub(crate) enum Walked {
    /// Some node handled the send.
    Handled(Value),
    /// A guard found its epoch stale; the chain must be discarded.
    Stale,
    /// Every cached node missed; the tail was reached.
    Unhandled,
}

#[derive(Debug, Clone)]
pub(crate) struct DispatchChain {
    nodes: Vec<DispatchNode>,
}

impl DispatchChain {
    /// The fresh chain: nothing but the uninitialized tail.
    pub fn empty() -> Self {
        Self {
            nodes: vec![DispatchNode::Uninitialized],
        }
    }

    /// Number of cache-occupying nodes (structural markers excluded).
    pub fn cached_len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_cached()).count()
    }

    /// Walk the chain for one send.
    ///
    /// The receiver cursor starts unwrapped and is reified exactly when the
    /// walk crosses the boxing transition; boxed-tier nodes therefore never
    /// see an unwrapped primitive.
    pub fn walk(
        &self,
        rt: &Runtime,
        send: &SendArgs<'_>,
        receiver: &Value,
    ) -> GarnetResult<Walked> {
        let mut cursor = receiver.clone();
        for node in &self.nodes {
            match node {
                DispatchNode::Boxing => {
                    cursor = boxing::reify(rt, &cursor)?;
                }
                DispatchNode::Uninitialized => return Ok(Walked::Unhandled),
                cached => match cached.attempt(rt, send, &cursor)? {
                    Attempt::Handled(value) => return Ok(Walked::Handled(value)),
                    Attempt::Stale => return Ok(Walked::Stale),
                    Attempt::Miss => {}
                },
            }
        }
        Ok(Walked::Unhandled)
    }

    /// Would a fresh walk for `receiver` find a live cached node? Used to
    /// detect that a concurrent specialization already did our work.
    pub fn covers(&self, rt: &Runtime, receiver: &Value) -> bool {
        let identity = rt.identity_of(receiver);
        self.nodes.iter().any(|node| match node {
            DispatchNode::Unboxed(n) => {
                receiver.unboxed_kind() == Some(n.kind) && n.guard.holds()
            }
            DispatchNode::Boolean(n) => {
                let arm = match receiver {
                    Value::Bool(true) => &n.truthy,
                    Value::Bool(false) => &n.falsy,
                    _ => return false,
                };
                arm.as_ref().is_some_and(|a| a.guard.holds())
            }
            DispatchNode::Symbol(n) => {
                receiver.is_symbol() && n.symbol_guard.holds() && n.class_guard.holds()
            }
            DispatchNode::Boxed(n) => n.expected == identity && n.guard.holds(),
            DispatchNode::MethodMissing(n) => n.expected == identity && n.guard.holds(),
            DispatchNode::ReturnMissing(n) => n.expected == identity && n.guard.holds(),
            DispatchNode::Boxing | DispatchNode::Uninitialized => false,
        })
    }

    fn tiers(&self) -> (Vec<DispatchNode>, Vec<DispatchNode>) {
        let mut primitive = Vec::new();
        let mut boxed = Vec::new();
        let mut past_transition = false;
        for node in &self.nodes {
            match node {
                DispatchNode::Boxing => past_transition = true,
                DispatchNode::Uninitialized => {}
                cached if past_transition => boxed.push(cached.clone()),
                cached => primitive.push(cached.clone()),
            }
        }
        (primitive, boxed)
    }

    fn assemble(primitive: Vec<DispatchNode>, boxed: Vec<DispatchNode>) -> Self {
        let mut nodes = Vec::with_capacity(primitive.len() + boxed.len() + 2);
        nodes.extend(primitive);
        nodes.push(DispatchNode::Boxing);
        nodes.extend(boxed);
        nodes.push(DispatchNode::Uninitialized);
        Self { nodes }
    }

    /// Replacement chain with `node` at the head of the primitive tier.
    pub fn with_primitive_prepended(&self, node: DispatchNode) -> Self {
        debug_assert!(node.is_primitive_tier());
        let (mut primitive, boxed) = self.tiers();
        primitive.insert(0, node);
        Self::assemble(primitive, boxed)
    }

    /// Replacement chain with `node` appended to the boxed tier.
    pub fn with_boxed_appended(&self, node: DispatchNode) -> Self {
        debug_assert!(node.is_cached() && !node.is_primitive_tier());
        let (primitive, mut boxed) = self.tiers();
        boxed.push(node);
        Self::assemble(primitive, boxed)
    }

    /// Replacement chain where `node` takes over boolean duty: it replaces
    /// the existing boolean node in place, or joins the primitive tier head.
    pub fn with_boolean_refreshed(&self, node: DispatchNode) -> Self {
        debug_assert!(matches!(node, DispatchNode::Boolean(_)));
        let (mut primitive, boxed) = self.tiers();
        match primitive
            .iter()
            .position(|n| matches!(n, DispatchNode::Boolean(_)))
        {
            Some(index) => primitive[index] = node,
            None => primitive.insert(0, node),
        }
        Self::assemble(primitive, boxed)
    }

    #[cfg(test)]
    pub fn nodes(&self) -> &[DispatchNode] {
        &self.nodes
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::node::{BoxedNode, EpochGuard, UnboxedNode};
    use super::super::DispatchAction;
    use super::*;
    use garnet_core::{intern, ClassId, UnboxedKind};
    use garnet_runtime::Visibility;

    fn send(name: &str) -> SendArgs<'static> {
        SendArgs {
            action: DispatchAction::Call,
            name: intern(name),
            args: &[],
            block: None,
            caller: None,
        }
    }

    fn unboxed_int_node(rt: &Runtime, name: &str, answer: i64) -> DispatchNode {
        rt.define_method(ClassId::INTEGER, intern(name), Visibility::Public, move |_, _| {
            Ok(Value::int(answer))
        })
        .unwrap();
        let method = garnet_runtime::lookup(rt, ClassId::INTEGER, intern(name)).unwrap();
        DispatchNode::Unboxed(UnboxedNode {
            kind: UnboxedKind::Int,
            guard: EpochGuard::observe(rt, ClassId::INTEGER),
            method,
        })
    }

    fn boxed_node(rt: &Runtime, class: ClassId, name: &str, answer: i64) -> DispatchNode {
        rt.define_method(class, intern(name), Visibility::Public, move |_, _| {
            Ok(Value::int(answer))
        })
        .unwrap();
        let method = garnet_runtime::lookup(rt, class, intern(name)).unwrap();
        DispatchNode::Boxed(BoxedNode {
            expected: class,
            guard: EpochGuard::observe(rt, class),
            method,
        })
    }

    #[test]
    fn test_empty_chain_is_bare_tail() {
        let chain = DispatchChain::empty();
        assert_eq!(chain.cached_len(), 0);
        assert!(matches!(chain.nodes(), [DispatchNode::Uninitialized]));
    }

    #[test]
    fn test_rebuild_preserves_layout_invariant() {
        let rt = Runtime::new();
        let widget = rt.define_class("Widget", ClassId::OBJECT);

        let chain = DispatchChain::empty()
            .with_boxed_appended(boxed_node(&rt, widget, "spin", 1))
            .with_primitive_prepended(unboxed_int_node(&rt, "spin", 2));

        let nodes = chain.nodes();
        assert_eq!(chain.cached_len(), 2);
        assert!(matches!(
            nodes,
            [
                DispatchNode::Unboxed(_),
                DispatchNode::Boxing,
                DispatchNode::Boxed(_),
                DispatchNode::Uninitialized
            ]
        ));
    }

    #[test]
    fn test_boxed_append_keeps_order() {
        let rt = Runtime::new();
        let a = rt.define_class("A", ClassId::OBJECT);
        let b = rt.define_class("B", ClassId::OBJECT);

        let chain = DispatchChain::empty()
            .with_boxed_appended(boxed_node(&rt, a, "spin", 1))
            .with_boxed_appended(boxed_node(&rt, b, "spin", 2));

        let expected: Vec<ClassId> = chain
            .nodes()
            .iter()
            .filter_map(|n| match n {
                DispatchNode::Boxed(node) => Some(node.expected),
                _ => None,
            })
            .collect();
        assert_eq!(expected, vec![a, b]);
    }

    #[test]
    fn test_walk_reifies_for_boxed_tier() {
        let rt = Runtime::new();
        // Payload-reading method proves the receiver was reified.
        rt.define_method(ClassId::INTEGER, intern("unwrap"), Visibility::Public, |_, env| {
            let cell = env
                .receiver
                .as_object()
                .ok_or_else(|| garnet_core::GarnetError::type_error("expected reified receiver"))?;
            match cell.payload() {
                garnet_core::Payload::Int(i) => Ok(Value::int(*i)),
                _ => Err(garnet_core::GarnetError::type_error("expected int payload")),
            }
        })
        .unwrap();
        let method = garnet_runtime::lookup(&rt, ClassId::INTEGER, intern("unwrap")).unwrap();
        let chain = DispatchChain::empty().with_boxed_appended(DispatchNode::Boxed(BoxedNode {
            expected: ClassId::INTEGER,
            guard: EpochGuard::observe(&rt, ClassId::INTEGER),
            method,
        }));

        let walked = chain.walk(&rt, &send("unwrap"), &Value::int(77)).unwrap();
        assert!(matches!(walked, Walked::Handled(v) if v == Value::int(77)));
    }

    #[test]
    fn test_walk_reports_unhandled_at_tail() {
        let rt = Runtime::new();
        let chain = DispatchChain::empty();
        let walked = chain.walk(&rt, &send("anything"), &Value::int(1)).unwrap();
        assert!(matches!(walked, Walked::Unhandled));
    }

    #[test]
    fn test_walk_reports_stale_for_retired_guard() {
        let rt = Runtime::new();
        let chain = DispatchChain::empty()
            .with_primitive_prepended(unboxed_int_node(&rt, "probe", 1));

        // Retire the observation.
        rt.define_method(ClassId::INTEGER, intern("later"), Visibility::Public, |_, _| {
            Ok(Value::nil())
        })
        .unwrap();

        let walked = chain.walk(&rt, &send("probe"), &Value::int(1)).unwrap();
        assert!(matches!(walked, Walked::Stale));
    }

    #[test]
    fn test_covers_matches_walkable_receivers() {
        let rt = Runtime::new();
        let widget = rt.define_class("Widget", ClassId::OBJECT);
        let chain = DispatchChain::empty()
            .with_boxed_appended(boxed_node(&rt, widget, "spin", 1))
            .with_primitive_prepended(unboxed_int_node(&rt, "spin", 2));

        assert!(chain.covers(&rt, &Value::int(0)));
        assert!(chain.covers(&rt, &rt.allocate(widget).unwrap()));
        assert!(!chain.covers(&rt, &Value::float(0.0)));
        assert!(!chain.covers(&rt, &rt.allocate(ClassId::OBJECT).unwrap()));
    }
}
