//! # Identity Index Tests
//!
//! Public-API behaviour of the generational sparse set:
//!
//! 1. **Recycling**: removed ids come back with a new generation
//! 2. **Explicit ids**: `ensure` registers and revives arbitrary indices
//! 3. **Configuration**: sets and pools sized from TOML
//!
//! Run with: cargo test -p tally_core --test identity

use tally_core::{BlockAllocator, Id, KernelConfig, SparseSet, PAGE_SIZE};

#[test]
fn removed_id_is_recycled_with_new_generation() {
    let mut set: SparseSet<()> = SparseSet::with_capacity(0);

    let a = set.new_id();
    assert_eq!(a, Id::new(1, 0));

    assert!(set.remove(a).is_some());
    let b = set.new_id();
    assert_eq!(b.index(), 1);
    assert_eq!(b.generation(), 1);
    assert_ne!(a, b);
    assert!(!set.is_alive(a));
    assert!(set.is_alive(b));
    assert_eq!(set.current(a), Some(b));
}

#[test]
fn stale_handles_never_reach_new_payloads() {
    let mut set: SparseSet<String> = SparseSet::new();
    let (old, name) = set.add();
    *name = "first".to_owned();
    set.remove(old);

    let (new, name) = set.add();
    *name = "second".to_owned();

    assert_eq!(set.try_get(old), None);
    assert_eq!(set.try_get(new).map(String::as_str), Some("second"));
    assert_eq!(set.get_any(old).map(String::as_str), Some("second"));
}

#[test]
fn ensure_spans_pages() {
    let mut set: SparseSet<u32> = SparseSet::new();
    let far = Id::new(3 * PAGE_SIZE as u32 + 5, 0);

    let (value, is_new) = set.ensure(far);
    *value = 11;
    assert!(is_new);
    assert_eq!(set.max_id(), far.index());
    assert_eq!(set.get(far), Some(&11));

    let next = set.new_id();
    assert_eq!(next.index(), far.index() + 1);
    assert_eq!(set.count(), 2);
}

#[test]
fn churn_keeps_counts_consistent() {
    let mut set: SparseSet<u64> = SparseSet::new();
    let ids: Vec<Id> = set.new_ids(1_000).to_vec();

    for id in ids.iter().step_by(3) {
        set.remove(*id);
    }
    let alive = set.count();
    assert_eq!(alive + set.not_alive_count(), set.size());

    for _ in 0..set.not_alive_count() {
        let id = set.new_id();
        assert!(id.generation() >= 1);
    }
    assert_eq!(set.count(), 1_000);
    assert_eq!(set.not_alive_count(), 0);
    assert_eq!(set.max_id(), 1_000);
}

#[test]
fn config_sizes_sets_and_pools() {
    let config = KernelConfig::from_toml_str(
        r#"
        [sparse]
        dense_capacity = 64

        [monitors]
        blocks_per_chunk = 4
        "#,
    )
    .unwrap();

    let set: SparseSet<u8> = SparseSet::from_config(&config.sparse);
    assert!(set.is_empty());

    let mut pool: BlockAllocator<u32> = BlockAllocator::from_config(3, &config.monitors);
    let handles: Vec<_> = (0..5).map(|_| pool.alloc()).collect();
    assert_eq!(pool.allocated_count(), 5);
    assert_eq!(pool.capacity(), 8);
    assert!(handles.iter().all(|h| pool.block(*h).len() == 3));
}
