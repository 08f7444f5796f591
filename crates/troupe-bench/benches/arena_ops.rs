//! Criterion micro-benchmarks for arena claim, traversal, and bench/join.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use troupe_arena::{ArenaConfig, Depth, Tree, Unlink};
use troupe_bench::{balanced_tree, grow_balanced};
use troupe_core::ThreadTag;

/// Grow a 4-ary tree of depth 6 (1365 nodes) from an empty, growable arena.
fn bench_grow_1365(c: &mut Criterion) {
    c.bench_function("grow_1365", |b| {
        b.iter(|| {
            let tree: Tree<u64> = Tree::new(ArenaConfig::new(16)).unwrap();
            let ids = grow_balanced(4, 6, |parent| tree.add_reference(0, parent, ThreadTag(0)))
                .unwrap();
            black_box(ids.len());
        });
    });
}

/// Pre-order walk of every node, read locks only.
fn bench_walk_1365(c: &mut Criterion) {
    let (tree, ids) = balanced_tree(4, 6).unwrap();
    c.bench_function("walk_1365", |b| {
        b.iter(|| {
            let mut count = 0usize;
            tree.map_subtree(ids[0], Depth::Recursive, |_, _| count += 1)
                .unwrap();
            black_box(count);
        });
    });
}

/// Pre-order walk taking payload locks and summing payloads.
fn bench_walk_mut_1365(c: &mut Criterion) {
    let (tree, ids) = balanced_tree(4, 6).unwrap();
    c.bench_function("walk_mut_1365", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            tree.map_subtree_mut(ids[0], Depth::Recursive, |_, _, v| sum += *v)
                .unwrap();
            black_box(sum);
        });
    });
}

/// Bench and re-join a 341-node subtree.
fn bench_bench_join_341(c: &mut Criterion) {
    let (tree, ids) = balanced_tree(4, 6).unwrap();
    let subtree = ids[1];
    c.bench_function("bench_join_341", |b| {
        b.iter(|| {
            tree.unlink_reference(subtree, Unlink::Bench).unwrap();
            tree.link_reference(subtree, None).unwrap();
        });
    });
}

/// Delete a 341-node subtree from a freshly built tree.
fn bench_delete_341(c: &mut Criterion) {
    c.bench_function("delete_341", |b| {
        b.iter_batched(
            || balanced_tree(4, 6).unwrap(),
            |(tree, ids)| {
                let released = tree.unlink_reference(ids[1], Unlink::Delete).unwrap();
                black_box(released.len());
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_grow_1365,
    bench_walk_1365,
    bench_walk_mut_1365,
    bench_bench_join_341,
    bench_delete_341
);
criterion_main!(benches);
