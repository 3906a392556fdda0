//! The generic tier: map-backed dispatch for megamorphic sites.
//!
//! Once a site outgrows its chain it stops speculating per shape and keeps a
//! table keyed by exact type identity, unbounded and resolution-backed. No
//! per-entry epoch is tracked; instead the table remembers the global
//! mutation counter it was built against and flushes itself wholesale the
//! first dispatch after any method table anywhere mutates. Flushes are rare
//! in steady state and a full re-resolve per type is the acceptable cost of
//! keeping entries word-sized.
//!
//! Entries keyed to identities that disappear through per-object
//! specialization are protected by the identity change itself: the new
//! singleton class simply never matches the old key.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use garnet_core::{ClassId, GarnetResult, SymbolId, Value};
use garnet_runtime::{boxing, invoke, CallerContext, Runtime, SiteInfo};

use super::{
    resolve_target, DispatchAction, MissingBehavior, ResolvedTarget, SendArgs,
    GENERIC_TABLE_WARN_THRESHOLD,
};

/// Counter snapshot for one generic table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenericStats {
    /// Live entries.
    pub entries: usize,
    /// Dispatches served from an existing entry.
    pub hits: u64,
    /// Resolutions inserted.
    pub insertions: u64,
    /// Wholesale flushes taken after a global mutation.
    pub flushes: u64,
    /// Whether a missing-fallback entry was ever inserted (one-way).
    pub saw_missing: bool,
}

pub(crate) struct GenericTable {
    entries: RwLock<FxHashMap<ClassId, ResolvedTarget>>,
    /// Global mutation counter value the entries are valid against.
    world: AtomicU64,
    saw_missing: AtomicBool,
    warned: AtomicBool,
    hits: AtomicU64,
    insertions: AtomicU64,
    flushes: AtomicU64,
}

impl GenericTable {
    pub fn new(rt: &Runtime) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            world: AtomicU64::new(rt.epochs().global_epoch().raw()),
            saw_missing: AtomicBool::new(false),
            warned: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    /// Dispatch through the table. The receiver stays in whatever
    /// representation it arrived in; identity alone keys the entry.
    pub fn dispatch(
        &self,
        rt: &Runtime,
        send: &SendArgs<'_>,
        receiver: &Value,
        missing: MissingBehavior,
        caller: &CallerContext,
    ) -> GarnetResult<Value> {
        let world = rt.epochs().global_epoch().raw();
        self.flush_if_world_moved(world);

        let class = rt.identity_of(receiver);
        let cached = self.entries.read().get(&class).cloned();
        if let Some(target) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return self.serve(rt, send, receiver, target);
        }

        let target = resolve_target(rt, class, send.name, caller, missing)?;
        self.insert(world, class, send.name, &target);
        self.serve(rt, send, receiver, target)
    }

    fn flush_if_world_moved(&self, world: u64) {
        if self.world.load(Ordering::Acquire) == world {
            return;
        }
        let mut entries = self.entries.write();
        if self.world.load(Ordering::Acquire) == world {
            return;
        }
        if !entries.is_empty() {
            self.flushes.fetch_add(1, Ordering::Relaxed);
            log::trace!("generic table flushed {} entries", entries.len());
            entries.clear();
        }
        self.world.store(world, Ordering::Release);
    }

    /// Insert a freshly resolved target, unless the world moved while we
    /// resolved; a target from a superseded world may serve its own dispatch
    /// but must not outlive it.
    fn insert(&self, world: u64, class: ClassId, name: SymbolId, target: &ResolvedTarget) {
        let mut entries = self.entries.write();
        if self.world.load(Ordering::Acquire) != world {
            return;
        }
        if matches!(target, ResolvedTarget::Fallback(_)) {
            self.saw_missing.store(true, Ordering::Release);
        }
        entries.insert(class, target.clone());
        self.insertions.fetch_add(1, Ordering::Relaxed);

        let population = entries.len();
        if population > GENERIC_TABLE_WARN_THRESHOLD && !self.warned.swap(true, Ordering::Relaxed)
        {
            log::warn!(
                "generic dispatch table for '{}' reached {} receiver types",
                name,
                population
            );
        }
    }

    fn serve(
        &self,
        rt: &Runtime,
        send: &SendArgs<'_>,
        receiver: &Value,
        target: ResolvedTarget,
    ) -> GarnetResult<Value> {
        let site = SiteInfo {
            name: send.name,
            caller: send.caller,
        };
        match (send.action, target) {
            (DispatchAction::Call, ResolvedTarget::Method(method)) => invoke(
                rt,
                &method,
                receiver.clone(),
                boxing::build_args(send.args),
                send.block.cloned(),
                site,
            ),
            (DispatchAction::Call, ResolvedTarget::Fallback(fallback)) => invoke(
                rt,
                &fallback,
                receiver.clone(),
                boxing::prepend_name(send.name, send.args),
                send.block.cloned(),
                site,
            ),
            (DispatchAction::Call, ResolvedTarget::ReturnMissing) => Ok(Value::missing()),
            (DispatchAction::RespondTo, ResolvedTarget::Method(_))
            | (DispatchAction::RespondTo, ResolvedTarget::Fallback(_)) => Ok(Value::bool(true)),
            (DispatchAction::RespondTo, ResolvedTarget::ReturnMissing) => Ok(Value::bool(false)),
        }
    }

    /// One-way: has a missing-fallback entry ever been inserted?
    pub fn has_seen_missing(&self) -> bool {
        self.saw_missing.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn stats(&self) -> GenericStats {
        GenericStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            saw_missing: self.has_seen_missing(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
