//! Dynamic-name call sites.
//!
//! Some sends only learn their method name at runtime (`send`-style calls,
//! reflective invocation). A `DynamicCallSite` keeps one fixed-name
//! `CallSite` per distinct name it has seen, found by linear scan; names at
//! one syntactic site are far less diverse than receiver types, so a scan
//! beats a hash until well past any realistic population and no generic
//! tier is needed. Each embedded site carries the dynamic site's own
//! configuration and adapts independently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use garnet_core::{GarnetResult, SymbolId, Value};
use garnet_runtime::{CallerContext, Runtime};

use super::call_site::CallSite;
use super::{MissingBehavior, DEFAULT_MAX_CHAIN_DEPTH, DYNAMIC_SITE_WARN_THRESHOLD};

struct NameEntry {
    name: SymbolId,
    site: Arc<CallSite>,
}

pub struct DynamicCallSite {
    missing: MissingBehavior,
    caller: CallerContext,
    max_depth: usize,
    names: RwLock<Vec<NameEntry>>,
    warned: AtomicBool,
}

impl DynamicCallSite {
    pub fn new(missing: MissingBehavior) -> Self {
        Self {
            missing,
            caller: CallerContext::checking(),
            max_depth: DEFAULT_MAX_CHAIN_DEPTH,
            names: RwLock::new(Vec::new()),
            warned: AtomicBool::new(false),
        }
    }

    /// Fix the caller context handed to every embedded site.
    pub fn with_caller(mut self, caller: CallerContext) -> Self {
        self.caller = caller;
        self
    }

    /// Override the depth limit handed to every embedded site.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Dispatch `name` through the per-name cache.
    pub fn dispatch(
        &self,
        rt: &Runtime,
        receiver: &Value,
        name: SymbolId,
        args: &[Value],
        block: Option<&Value>,
    ) -> GarnetResult<Value> {
        self.site_for(name).dispatch(rt, receiver, args, block)
    }

    /// `responds_to` with a runtime name; consults (and warms) the same
    /// per-name cache.
    pub fn responds_to(&self, rt: &Runtime, receiver: &Value, name: SymbolId) -> bool {
        self.site_for(name).responds_to(rt, receiver)
    }

    /// The embedded fixed-name site for `name`, created on first use.
    fn site_for(&self, name: SymbolId) -> Arc<CallSite> {
        {
            let names = self.names.read();
            if let Some(entry) = names.iter().find(|e| e.name == name) {
                return Arc::clone(&entry.site);
            }
        }

        let mut names = self.names.write();
        // Recheck: another thread may have appended this name already.
        if let Some(entry) = names.iter().find(|e| e.name == name) {
            return Arc::clone(&entry.site);
        }
        let site = Arc::new(
            CallSite::new(name, self.missing)
                .with_caller(self.caller)
                .with_max_depth(self.max_depth),
        );
        names.push(NameEntry {
            name,
            site: Arc::clone(&site),
        });
        let population = names.len();
        if population > DYNAMIC_SITE_WARN_THRESHOLD && !self.warned.swap(true, Ordering::Relaxed)
        {
            log::warn!("dynamic call site reached {} distinct names", population);
        }
        site
    }

    /// Fixed-name site for `name`, if one has been created.
    pub fn site(&self, name: SymbolId) -> Option<Arc<CallSite>> {
        self.names
            .read()
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.site))
    }

    /// Distinct names seen so far.
    pub fn cached_names(&self) -> usize {
        self.names.read().len()
    }
}

impl std::fmt::Debug for DynamicCallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicCallSite")
            .field("missing", &self.missing)
            .field("cached_names", &self.cached_names())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
