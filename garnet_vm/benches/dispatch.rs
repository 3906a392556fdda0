//! Dispatch Performance Benchmarks
//!
//! Measures the adaptive cache tiers end to end: warm hits per chain shape,
//! walk cost by chain position, the generic tier, and the cost of an
//! invalidation-triggered rebuild.
//!
//! # Benchmark Categories
//!
//! 1. **Monomorphic Hits**: one-node chains, unboxed and boxed receivers
//! 2. **Polymorphic Walks**: hit cost by position in a deeper chain
//! 3. **Megamorphic Dispatch**: generic-table hits past the depth limit
//! 4. **Invalidation**: whole-chain reset plus re-specialization
//! 5. **Dynamic Names**: per-name routing overhead over a fixed-name site
//!
//! # Performance Targets
//!
//! - Monomorphic hit: tens of nanoseconds (guard loads plus the invoke)
//! - Chain walk: linear in position, small constant per node
//! - Generic hit: one map probe over the monomorphic cost

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use garnet_core::{intern, ClassId, Value};
use garnet_runtime::{Runtime, Visibility};
use garnet_vm::{CallSite, DynamicCallSite, MissingBehavior};

// =============================================================================
// Benchmark Helpers
// =============================================================================

/// Define `answer` as the constant body of `name` on `class`.
fn define_const(rt: &Runtime, class: ClassId, name: &str, answer: i64) {
    rt.define_method(class, intern(name), Visibility::Public, move |_, _| {
        Ok(Value::int(answer))
    })
    .unwrap();
}

/// N user classes each answering "probe", plus one instance of each.
fn shape_instances(rt: &Runtime, n: i64) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let class = rt.define_class(&format!("Bench{}", i), ClassId::OBJECT);
            define_const(rt, class, "probe", i);
            rt.allocate(class).unwrap()
        })
        .collect()
}

// =============================================================================
// Monomorphic Hits
// =============================================================================

fn bench_monomorphic(c: &mut Criterion) {
    let mut group = c.benchmark_group("monomorphic");

    group.bench_function("unboxed_int_hit", |b| {
        let rt = Runtime::new();
        define_const(&rt, ClassId::INTEGER, "probe", 1);
        let site = CallSite::new(intern("probe"), MissingBehavior::RaiseOnMissing);
        let receiver = Value::int(5);
        site.dispatch(&rt, &receiver, &[], None).unwrap();

        b.iter(|| black_box(site.dispatch(&rt, &receiver, &[], None)))
    });

    group.bench_function("boxed_object_hit", |b| {
        let rt = Runtime::new();
        let receivers = shape_instances(&rt, 1);
        let site = CallSite::new(intern("probe"), MissingBehavior::RaiseOnMissing);
        site.dispatch(&rt, &receivers[0], &[], None).unwrap();

        b.iter(|| black_box(site.dispatch(&rt, &receivers[0], &[], None)))
    });

    group.bench_function("responds_to_hit", |b| {
        let rt = Runtime::new();
        let receivers = shape_instances(&rt, 1);
        let site = CallSite::new(intern("probe"), MissingBehavior::RaiseOnMissing);
        site.dispatch(&rt, &receivers[0], &[], None).unwrap();

        b.iter(|| black_box(site.responds_to(&rt, &receivers[0])))
    });

    group.bench_function("missing_fallback_hit", |b| {
        let rt = Runtime::new();
        let class = rt.define_class("Proxy", ClassId::OBJECT);
        rt.define_method(class, rt.method_missing_name(), Visibility::Public, |_, env| {
            Ok(env.args[0].clone())
        })
        .unwrap();
        let obj = rt.allocate(class).unwrap();
        let site = CallSite::new(intern("ghost"), MissingBehavior::RaiseOnMissing);
        site.dispatch(&rt, &obj, &[], None).unwrap();

        b.iter(|| black_box(site.dispatch(&rt, &obj, &[], None)))
    });

    group.finish();
}

// =============================================================================
// Polymorphic Walks
// =============================================================================

fn bench_polymorphic(c: &mut Criterion) {
    let mut group = c.benchmark_group("polymorphic");

    // Hit cost by position: the receiver whose node sits deepest pays for
    // every miss ahead of it.
    for depth in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("last_node_hit", depth), &depth, |b, &depth| {
            let rt = Runtime::new();
            let receivers = shape_instances(&rt, depth as i64);
            let site = CallSite::new(intern("probe"), MissingBehavior::RaiseOnMissing);
            for receiver in &receivers {
                site.dispatch(&rt, receiver, &[], None).unwrap();
            }
            let last = receivers.last().unwrap();

            b.iter(|| black_box(site.dispatch(&rt, last, &[], None)))
        });
    }

    group.bench_function("round_robin_4_shapes", |b| {
        let rt = Runtime::new();
        let receivers = shape_instances(&rt, 4);
        let site = CallSite::new(intern("probe"), MissingBehavior::RaiseOnMissing);
        for receiver in &receivers {
            site.dispatch(&rt, receiver, &[], None).unwrap();
        }
        let mut cursor = 0usize;

        b.iter(|| {
            cursor = (cursor + 1) % receivers.len();
            black_box(site.dispatch(&rt, &receivers[cursor], &[], None))
        })
    });

    group.finish();
}

// =============================================================================
// Megamorphic Dispatch
// =============================================================================

fn bench_megamorphic(c: &mut Criterion) {
    let mut group = c.benchmark_group("megamorphic");

    group.bench_function("generic_table_hit", |b| {
        let rt = Runtime::new();
        let receivers = shape_instances(&rt, 32);
        let site =
            CallSite::new(intern("probe"), MissingBehavior::RaiseOnMissing).with_max_depth(4);
        // Two passes: promote, then populate the table for every shape.
        for _ in 0..2 {
            for receiver in &receivers {
                site.dispatch(&rt, receiver, &[], None).unwrap();
            }
        }
        let mut cursor = 0usize;

        b.iter(|| {
            cursor = (cursor + 1) % receivers.len();
            black_box(site.dispatch(&rt, &receivers[cursor], &[], None))
        })
    });

    group.finish();
}

// =============================================================================
// Invalidation
// =============================================================================

fn bench_invalidation(c: &mut Criterion) {
    let mut group = c.benchmark_group("invalidation");

    // One redefinition plus the stale walk, reset, and re-specialization it
    // forces on the next dispatch.
    group.bench_function("redefine_and_rewarm", |b| {
        let rt = Runtime::new();
        let receivers = shape_instances(&rt, 1);
        let site = CallSite::new(intern("probe"), MissingBehavior::RaiseOnMissing);
        site.dispatch(&rt, &receivers[0], &[], None).unwrap();
        let class = rt.identity_of(&receivers[0]);

        b.iter(|| {
            define_const(&rt, class, "probe", 9);
            black_box(site.dispatch(&rt, &receivers[0], &[], None))
        })
    });

    group.bench_function("epoch_guard_check_only", |b| {
        let rt = Runtime::new();
        let (cell, seen) = rt.epochs().observe(ClassId::INTEGER);
        b.iter(|| black_box(cell.is_current(seen)))
    });

    group.finish();
}

// =============================================================================
// Dynamic Names
// =============================================================================

fn bench_dynamic(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_names");

    group.bench_function("single_name_hit", |b| {
        let rt = Runtime::new();
        let receivers = shape_instances(&rt, 1);
        let site = DynamicCallSite::new(MissingBehavior::RaiseOnMissing);
        let name = intern("probe");
        site.dispatch(&rt, &receivers[0], name, &[], None).unwrap();

        b.iter(|| black_box(site.dispatch(&rt, &receivers[0], name, &[], None)))
    });

    for names in [4usize, 16] {
        group.bench_with_input(BenchmarkId::new("scan_depth", names), &names, |b, &names| {
            let rt = Runtime::new();
            let class = rt.define_class("Poly", ClassId::OBJECT);
            let symbols: Vec<_> = (0..names)
                .map(|i| {
                    let name = format!("method{}", i);
                    define_const(&rt, class, &name, i as i64);
                    intern(&name)
                })
                .collect();
            let obj = rt.allocate(class).unwrap();
            let site = DynamicCallSite::new(MissingBehavior::RaiseOnMissing);
            for &sym in &symbols {
                site.dispatch(&rt, &obj, sym, &[], None).unwrap();
            }
            let last = *symbols.last().unwrap();

            b.iter(|| black_box(site.dispatch(&rt, &obj, last, &[], None)))
        });
    }

    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    dispatch_benches,
    bench_monomorphic,
    bench_polymorphic,
    bench_megamorphic,
    bench_invalidation,
    bench_dynamic,
);

criterion_main!(dispatch_benches);
