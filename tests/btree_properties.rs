//! Randomized and persistence tests across every store
//!
//! The same operation sequences run against the in-memory tree, a disk tree
//! over a `Cursor`, a disk tree behind a tiny page cache and a file-backed
//! tree; each is checked against a `BTreeMap` multiset model.

use pagetree::{BTree, BTreeConfig, DiskBTree, NodeStore, StorageError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::io::Cursor;
use tempfile::TempDir;

type Model = BTreeMap<i32, usize>;

fn model_items(model: &Model) -> Vec<i32> {
    model
        .iter()
        .flat_map(|(&k, &n)| std::iter::repeat(k).take(n))
        .collect()
}

fn items<S: NodeStore<i32>>(tree: &mut BTree<i32, S>, reverse: bool) -> Vec<i32> {
    tree.iter(reverse)
        .unwrap()
        .collect::<pagetree::Result<Vec<_>>>()
        .unwrap()
}

/// Random inserts and removes over a small key space so duplicates pile up
fn run_model<S: NodeStore<i32>>(tree: &mut BTree<i32, S>, seed: u64, ops: usize) -> Model {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model = Model::new();

    for step in 0..ops {
        let key = rng.gen_range(0..200);
        if rng.gen_bool(0.6) {
            tree.insert(key).unwrap();
            *model.entry(key).or_insert(0) += 1;
        } else {
            let expected = match model.get_mut(&key) {
                Some(n) => {
                    *n -= 1;
                    if *n == 0 {
                        model.remove(&key);
                    }
                    true
                }
                None => false,
            };
            assert_eq!(tree.remove(&key).unwrap(), expected, "remove {} at step {}", key, step);
        }

        if step % 97 == 0 {
            tree.validate().unwrap();
        }
    }

    tree.validate().unwrap();
    model
}

fn check_against_model<S: NodeStore<i32>>(tree: &mut BTree<i32, S>, model: &Model) {
    let expected = model_items(model);
    assert_eq!(items(tree, false), expected);

    let mut reversed = expected.clone();
    reversed.reverse();
    assert_eq!(items(tree, true), reversed);

    for key in [-1, 0, 57, 100, 199, 250] {
        assert_eq!(tree.contains(&key).unwrap(), model.contains_key(&key));

        let up: Vec<i32> = expected.iter().copied().filter(|&v| v >= key).collect();
        let from: Vec<i32> = tree.iter_from(&key, false).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(from, up, "ascending from {}", key);

        let down: Vec<i32> = reversed.iter().copied().filter(|&v| v <= key).collect();
        let from: Vec<i32> = tree.iter_from(&key, true).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(from, down, "descending from {}", key);
    }
}

/// Shrink a sparse tree mostly through removes of absent keys
///
/// Only even keys are stored, so every odd key misses. Runs of misses with
/// nothing else in between keep restructuring the same thin spine.
fn drain_with_absent_removes<S: NodeStore<i32>>(tree: &mut BTree<i32, S>, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut model = Model::new();
    for _ in 0..120 {
        let key = rng.gen_range(0..100) * 2;
        tree.insert(key).unwrap();
        *model.entry(key).or_insert(0) += 1;
    }

    let mut step = 0;
    while !model.is_empty() {
        for _ in 0..rng.gen_range(1..6) {
            let absent = rng.gen_range(-10..210) | 1;
            assert!(!tree.remove(&absent).unwrap(), "absent {} at step {}", absent, step);
            tree.validate().unwrap();
        }

        let key = *model.keys().nth(rng.gen_range(0..model.len())).unwrap();
        assert!(tree.remove(&key).unwrap(), "present {} at step {}", key, step);
        tree.validate().unwrap();
        let n = model.get_mut(&key).unwrap();
        *n -= 1;
        if *n == 0 {
            model.remove(&key);
        }
        step += 1;
    }

    assert!(items(tree, false).is_empty());
    assert!(!tree.remove(&0).unwrap());
    tree.validate().unwrap();
}

fn disk_tree(config: &BTreeConfig) -> DiskBTree<i32, Cursor<Vec<u8>>> {
    BTree::from_stream(Cursor::new(Vec::new()), config).unwrap()
}

#[test]
fn test_memory_tree_matches_model() {
    for (order, seed) in [(2, 1), (3, 2), (5, 3), (20, 4)] {
        let mut tree = BTree::new(order).unwrap();
        let model = run_model(&mut tree, seed, 3000);
        check_against_model(&mut tree, &model);
    }
}

#[test]
fn test_disk_tree_matches_model() {
    for (order, seed) in [(2, 11), (4, 12)] {
        let mut tree = disk_tree(&BTreeConfig::with_order(order).with_growth_pages(16));
        let model = run_model(&mut tree, seed, 2000);
        check_against_model(&mut tree, &model);
        assert_eq!(tree.store().loaded_nodes(), 0);
    }
}

#[test]
fn test_cached_disk_tree_matches_model() {
    // Budget for a handful of pages so eviction is constant.
    let config = BTreeConfig::with_order(3).with_memory_budget(1024);
    let mut tree = disk_tree(&config);
    let model = run_model(&mut tree, 21, 2000);
    check_against_model(&mut tree, &model);

    let stats = tree.store().cache_stats().unwrap();
    assert!(stats.hits > 0);
    assert!(stats.evictions > 0);
    assert!(tree.store().cache().unwrap().memory_used() <= 1024);
}

#[test]
fn test_memory_and_disk_agree() {
    let mut memory = BTree::new(3).unwrap();
    let mut disk = disk_tree(&BTreeConfig::with_order(3));
    let memory_model = run_model(&mut memory, 7, 1500);
    let disk_model = run_model(&mut disk, 7, 1500);
    assert_eq!(memory_model, disk_model);
    assert_eq!(items(&mut memory, false), items(&mut disk, false));
}

#[test]
fn test_absent_removes_keep_memory_tree_valid() {
    for (order, seed) in [(2, 41), (2, 42), (3, 43)] {
        let mut tree = BTree::new(order).unwrap();
        drain_with_absent_removes(&mut tree, seed);
        assert_eq!(tree.store().node_count(), 1);
    }
}

#[test]
fn test_absent_removes_keep_disk_tree_valid() {
    for (order, seed) in [(2, 51), (3, 52)] {
        let mut tree = disk_tree(&BTreeConfig::with_order(order));
        drain_with_absent_removes(&mut tree, seed);
        assert_eq!(tree.store().loaded_nodes(), 0);
    }

    let mut tree = disk_tree(&BTreeConfig::with_order(2).with_memory_budget(1024));
    drain_with_absent_removes(&mut tree, 53);
}

#[test]
fn test_ascending_inserts_on_disk() {
    let mut tree = disk_tree(&BTreeConfig::with_order(2));
    for i in 1..=10_000 {
        tree.insert(i).unwrap();
    }
    assert!(tree.contains(&5000).unwrap());
    assert!(tree.remove(&5000).unwrap());
    assert!(!tree.contains(&5000).unwrap());
    assert!(tree.contains(&4999).unwrap());
    assert!(tree.contains(&5001).unwrap());
    tree.validate().unwrap();
}

#[test]
fn test_file_tree_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("items.db");
    let config = BTreeConfig::with_order(4);

    let model = {
        let mut tree: DiskBTree<i32, std::fs::File> = BTree::open_path(&path, &config).unwrap();
        let model = run_model(&mut tree, 31, 1500);
        tree.close().unwrap();
        model
    };

    let mut tree: DiskBTree<i32, std::fs::File> = BTree::open_path(&path, &config).unwrap();
    check_against_model(&mut tree, &model);

    // Keep mutating after reopen; freed pages are reused.
    let high_water = tree.store().header().high_water;
    for key in model.keys() {
        while tree.remove(key).unwrap() {}
    }
    assert!(items(&mut tree, false).is_empty());
    for i in 0..40 {
        tree.insert(i).unwrap();
    }
    assert_eq!(tree.store().header().high_water, high_water);
}

#[test]
fn test_borrowed_stream_stays_usable() {
    let mut stream = Cursor::new(Vec::new());
    {
        let mut tree: DiskBTree<i32, &mut Cursor<Vec<u8>>> =
            BTree::from_stream(&mut stream, &BTreeConfig::with_order(2)).unwrap();
        for i in 0..50 {
            tree.insert(i).unwrap();
        }
    }
    assert!(stream.get_ref().len() > 24);

    let mut tree: DiskBTree<i32, _> = BTree::from_stream(stream, &BTreeConfig::with_order(2)).unwrap();
    assert_eq!(items(&mut tree, false), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_abandoned_iteration_releases_nodes() {
    let mut tree = disk_tree(&BTreeConfig::with_order(2));
    for i in 0..200 {
        tree.insert(i).unwrap();
    }

    {
        let mut iter = tree.iter_from(&50, false).unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), 50);
        assert_eq!(iter.next().unwrap().unwrap(), 51);
    }
    assert_eq!(tree.store().loaded_nodes(), 0);

    tree.insert(-1).unwrap();
    assert_eq!(tree.iter(false).unwrap().next().unwrap().unwrap(), -1);
}

#[test]
fn test_update_relocates_on_disk() {
    let mut tree = disk_tree(&BTreeConfig::with_order(2));
    for i in 0..100 {
        tree.insert(i * 2).unwrap();
    }
    assert!(tree.update(&10, |v| v + 1).unwrap());
    assert!(!tree.contains(&10).unwrap());
    assert!(tree.contains(&11).unwrap());
    assert!(!tree.update(&11111, |v| *v).unwrap());

    let all = items(&mut tree, false);
    assert_eq!(all.len(), 100);
    assert!(all.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_corruption_surfaces_through_the_tree() {
    let mut stream = Cursor::new(Vec::new());
    {
        let mut tree: DiskBTree<i32, &mut Cursor<Vec<u8>>> =
            BTree::from_stream(&mut stream, &BTreeConfig::with_order(2)).unwrap();
        for i in 0..20 {
            tree.insert(i).unwrap();
        }
    }

    let root = i64::from_le_bytes(stream.get_ref()[0..8].try_into().unwrap());
    let page_size = 1 + 4 + 3 * 4 + 4 * 8;
    let offset = 24 + root as usize * page_size;
    stream.get_mut()[offset] = 0xEE;

    let mut tree: DiskBTree<i32, _> = BTree::from_stream(stream, &BTreeConfig::with_order(2)).unwrap();
    let err = tree.contains(&3).unwrap_err();
    assert!(matches!(err, StorageError::CorruptedNode { page_id } if page_id == root as u64));

    let mut iter = tree.iter(false).unwrap();
    assert!(iter.next().unwrap().is_err());
    assert!(iter.next().is_none());
}

#[test]
fn test_unsupported_item_type() {
    let result = DiskBTree::<String, Cursor<Vec<u8>>>::from_stream(Cursor::new(Vec::new()), &BTreeConfig::default());
    assert!(matches!(result, Err(StorageError::UnsupportedType(_))));
}
