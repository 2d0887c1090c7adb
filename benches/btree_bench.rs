//! B-tree benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pagetree::{BTree, BTreeConfig, DiskBTree, PageCache};
use std::io::Cursor;

fn disk_tree(config: &BTreeConfig) -> DiskBTree<u64, Cursor<Vec<u8>>> {
    BTree::from_stream(Cursor::new(Vec::new()), config).unwrap()
}

fn memory_insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_insert_10000");
    for order in [2usize, 20, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(order), &order, |b, &order| {
            b.iter(|| {
                let mut tree = BTree::new(order).unwrap();
                for i in 0..10_000u64 {
                    tree.insert(i.wrapping_mul(2_654_435_761) % 10_007).unwrap();
                }
                black_box(tree.order())
            })
        });
    }
    group.finish();
}

fn memory_contains_benchmark(c: &mut Criterion) {
    let mut tree = BTree::new(20).unwrap();
    for i in 0..10_000u64 {
        tree.insert(i).unwrap();
    }

    c.bench_function("memory_contains_10000", |b| {
        b.iter(|| {
            for i in 0..10_000u64 {
                black_box(tree.contains(&i).unwrap());
            }
        })
    });
}

fn disk_insert_benchmark(c: &mut Criterion) {
    let uncached = BTreeConfig::with_order(20);
    let cached = BTreeConfig::with_order(20).with_memory_budget(1 << 20);

    c.bench_function("disk_insert_2000", |b| {
        b.iter(|| {
            let mut tree = disk_tree(&uncached);
            for i in 0..2000u64 {
                tree.insert(i).unwrap();
            }
            black_box(tree.store().header())
        })
    });

    c.bench_function("cached_disk_insert_2000", |b| {
        b.iter(|| {
            let mut tree = disk_tree(&cached);
            for i in 0..2000u64 {
                tree.insert(i).unwrap();
            }
            black_box(tree.store().header())
        })
    });
}

fn disk_scan_benchmark(c: &mut Criterion) {
    let mut tree = disk_tree(&BTreeConfig::with_order(20).with_memory_budget(1 << 20));
    for i in 0..5000u64 {
        tree.insert(i).unwrap();
    }

    c.bench_function("cached_disk_scan_from_2500", |b| {
        b.iter(|| {
            let sum: u64 = tree
                .iter_from(&2500, false)
                .unwrap()
                .map(|r| r.unwrap())
                .sum();
            black_box(sum)
        })
    });
}

fn page_cache_benchmark(c: &mut Criterion) {
    let page = vec![7u8; 512];
    c.bench_function("page_cache_set_get_1000", |b| {
        b.iter(|| {
            let mut cache = PageCache::new(64 * 1024);
            let mut buf = vec![0u8; 512];
            for offset in 0..1000u64 {
                cache.set(offset * 512, &page);
                black_box(cache.try_get((offset / 2) * 512, &mut buf));
            }
            black_box(cache.len())
        })
    });
}

criterion_group!(
    benches,
    memory_insert_benchmark,
    memory_contains_benchmark,
    disk_insert_benchmark,
    disk_scan_benchmark,
    page_cache_benchmark
);
criterion_main!(benches);
