//! Type epochs and the epoch registry.
//!
//! Every method table has an associated epoch: a monotonic counter that is
//! bumped whenever the table mutates. Dispatch caches record the epoch they
//! observed at specialization time and treat any later value as proof that
//! the cached method may be wrong. Comparing two `u64`s is the entire guard
//! cost, and bumping one counter invalidates every cache built against it
//! without enumerating them.
//!
//! # Invariants
//!
//! - An observed epoch never becomes current again once the counter moves.
//! - Bumps happen after the table mutation they describe, under the table's
//!   write lock, so a fresh observation sees the new table.
//!
//! # Thread Safety
//!
//! Cells are plain atomics. The registry hands out `Arc<EpochCell>` handles
//! so guards never touch the registry map on the fast path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use garnet_core::ClassId;

// =============================================================================
// Epoch Token
// =============================================================================

/// An observed epoch value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Epoch(u64);

impl Epoch {
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// =============================================================================
// Epoch Cell
// =============================================================================

/// The shared counter behind one type's epoch.
#[derive(Debug, Default)]
pub struct EpochCell {
    counter: AtomicU64,
}

impl EpochCell {
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Current epoch.
    #[inline]
    pub fn current(&self) -> Epoch {
        Epoch(self.counter.load(Ordering::Acquire))
    }

    /// Advance the epoch, returning `(old, new)`.
    #[inline]
    pub fn bump(&self) -> (Epoch, Epoch) {
        let old = self.counter.fetch_add(1, Ordering::SeqCst);
        (Epoch(old), Epoch(old + 1))
    }

    /// Is `observed` still the current epoch?
    #[inline]
    pub fn is_current(&self, observed: Epoch) -> bool {
        self.counter.load(Ordering::Acquire) == observed.0
    }
}

// =============================================================================
// Bump Reasons
// =============================================================================

/// Why a type's epoch moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BumpReason {
    MethodDefined,
    MethodRemoved,
    MethodAliased,
    VisibilityChanged,
    SymbolSpecialized,
}

impl BumpReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BumpReason::MethodDefined => "method-defined",
            BumpReason::MethodRemoved => "method-removed",
            BumpReason::MethodAliased => "method-aliased",
            BumpReason::VisibilityChanged => "visibility-changed",
            BumpReason::SymbolSpecialized => "symbol-specialized",
        }
    }
}

// =============================================================================
// Epoch Registry
// =============================================================================

/// Snapshot of registry activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochStats {
    pub classes_tracked: usize,
    pub total_bumps: u64,
}

/// Per-type epoch cells plus the global mutation counter.
///
/// The global counter moves on every per-type bump; the generic dispatch
/// tier snapshots it to detect that the world changed without tracking
/// individual types.
#[derive(Debug, Default)]
pub struct EpochRegistry {
    cells: DashMap<ClassId, Arc<EpochCell>>,
    global: EpochCell,
    total_bumps: AtomicU64,
}

impl EpochRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to `class`'s epoch cell, creating it on first use.
    pub fn cell(&self, class: ClassId) -> Arc<EpochCell> {
        self.cells
            .entry(class)
            .or_insert_with(|| Arc::new(EpochCell::new()))
            .clone()
    }

    /// Observe `class`'s epoch: the cell handle plus its current value.
    pub fn observe(&self, class: ClassId) -> (Arc<EpochCell>, Epoch) {
        let cell = self.cell(class);
        let epoch = cell.current();
        (cell, epoch)
    }

    /// Current epoch of `class` without retaining the cell.
    pub fn current(&self, class: ClassId) -> Epoch {
        self.cell(class).current()
    }

    /// Invalidate every cache built against `class`.
    pub fn bump(&self, class: ClassId, reason: BumpReason) -> Epoch {
        let cell = self.cell(class);
        let (old, new) = cell.bump();
        self.global.bump();
        self.total_bumps.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "epoch bump: class={} reason={} {}->{}",
            class.raw(),
            reason.as_str(),
            old.raw(),
            new.raw()
        );
        new
    }

    /// The global mutation counter's current value.
    #[inline]
    pub fn global_epoch(&self) -> Epoch {
        self.global.current()
    }

    pub fn stats(&self) -> EpochStats {
        EpochStats {
            classes_tracked: self.cells.len(),
            total_bumps: self.total_bumps.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // EpochCell
    // =========================================================================

    #[test]
    fn test_fresh_cell_is_current() {
        let cell = EpochCell::new();
        let seen = cell.current();
        assert!(cell.is_current(seen));
    }

    #[test]
    fn test_bump_invalidates_observation() {
        let cell = EpochCell::new();
        let seen = cell.current();
        let (old, new) = cell.bump();
        assert_eq!(old, seen);
        assert_ne!(new, seen);
        assert!(!cell.is_current(seen));
        assert!(cell.is_current(new));
    }

    #[test]
    fn test_old_epoch_never_valid_again() {
        let cell = EpochCell::new();
        let seen = cell.current();
        for _ in 0..10 {
            cell.bump();
        }
        assert!(!cell.is_current(seen));
    }

    // =========================================================================
    // EpochRegistry
    // =========================================================================

    #[test]
    fn test_registry_cell_is_stable() {
        let registry = EpochRegistry::new();
        let class = ClassId::from_raw(300);
        let a = registry.cell(class);
        let b = registry.cell(class);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_bump_moves_class_and_global() {
        let registry = EpochRegistry::new();
        let class = ClassId::from_raw(301);
        let (cell, seen) = registry.observe(class);
        let global_before = registry.global_epoch();

        registry.bump(class, BumpReason::MethodDefined);

        assert!(!cell.is_current(seen));
        assert_ne!(registry.global_epoch(), global_before);
    }

    #[test]
    fn test_bump_is_per_class() {
        let registry = EpochRegistry::new();
        let a = ClassId::from_raw(310);
        let b = ClassId::from_raw(311);
        let (cell_a, seen_a) = registry.observe(a);
        let (cell_b, seen_b) = registry.observe(b);

        registry.bump(a, BumpReason::MethodRemoved);

        assert!(!cell_a.is_current(seen_a));
        assert!(cell_b.is_current(seen_b));
    }

    #[test]
    fn test_stats_count_bumps() {
        let registry = EpochRegistry::new();
        let class = ClassId::from_raw(320);
        registry.bump(class, BumpReason::MethodDefined);
        registry.bump(class, BumpReason::VisibilityChanged);
        let stats = registry.stats();
        assert_eq!(stats.total_bumps, 2);
        assert_eq!(stats.classes_tracked, 1);
    }

    #[test]
    fn test_concurrent_bumps_all_counted() {
        let registry = Arc::new(EpochRegistry::new());
        let class = ClassId::from_raw(330);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.bump(class, BumpReason::MethodDefined);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.current(class).raw(), 400);
        assert_eq!(registry.stats().total_bumps, 400);
    }
}
