//! Property-based tests using proptest

use proptest::prelude::*;
use segpool::{
    AllocHandle, AllocPolicy, GrowthPolicy, PoolConfig, PoolError, PoolRegistry, Snapshot,
};

const POOL_SIZE: usize = 2048;

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    /// Frees the live allocation at this position (modulo the live count).
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..=300).prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

fn policy() -> impl Strategy<Value = AllocPolicy> {
    prop_oneof![Just(AllocPolicy::FirstFit), Just(AllocPolicy::BestFit)]
}

/// Small initial capacities so every run exercises array growth.
fn config() -> PoolConfig {
    PoolConfig {
        registry: GrowthPolicy::new(1),
        node_heap: GrowthPolicy::new(2),
        gap_index: GrowthPolicy::new(1),
    }
}

/// Offset the policy must choose for `size`, computed from a snapshot.
fn expected_offset(snap: &Snapshot, policy: AllocPolicy, size: usize) -> Option<usize> {
    let mut gaps = snap
        .segments()
        .iter()
        .filter(|s| !s.allocated && s.size >= size);
    match policy {
        AllocPolicy::FirstFit => gaps.next().map(|s| s.offset),
        AllocPolicy::BestFit => gaps.min_by_key(|s| (s.size, s.offset)).map(|s| s.offset),
    }
}

fn check_partition(snap: &Snapshot, total: usize) {
    let mut offset = 0;
    for seg in snap.segments() {
        assert_eq!(seg.offset, offset, "segments overlap or leave a hole");
        offset += seg.size;
    }
    assert_eq!(offset, total, "segments do not cover the pool");
}

proptest! {
    #[test]
    fn bookkeeping_matches_model(
        policy in policy(),
        ops in prop::collection::vec(op(), 1..200),
    ) {
        let mut registry = PoolRegistry::new(config());
        registry.init().unwrap();
        let pool = registry.open(POOL_SIZE, policy).unwrap();
        let mut live: Vec<(AllocHandle, usize)> = Vec::new();

        for op in ops {
            let before = registry.inspect(pool).unwrap();
            match op {
                Op::Alloc(size) => {
                    let expected = expected_offset(&before, policy, size);
                    match registry.allocate(pool, size) {
                        Ok(handle) => {
                            let (offset, got) = registry.pool(pool).unwrap().extent(handle).unwrap();
                            prop_assert_eq!(got, size);
                            prop_assert_eq!(Some(offset), expected);
                            live.push((handle, size));
                        }
                        Err(PoolError::NoFit { .. }) => {
                            prop_assert_eq!(expected, None);
                            prop_assert_eq!(registry.inspect(pool).unwrap(), before);
                        }
                        Err(other) => {
                            prop_assert!(false, "unexpected error {}", other);
                        }
                    }
                }
                Op::Free(pick) => {
                    if live.is_empty() {
                        continue;
                    }
                    let (handle, _) = live.swap_remove(pick % live.len());
                    registry.deallocate(pool, handle).unwrap();
                    prop_assert_eq!(registry.deallocate(pool, handle), Err(PoolError::NotFound));
                }
            }

            let p = registry.pool(pool).unwrap();
            p.check_invariants();
            let snap = p.inspect();
            check_partition(&snap, POOL_SIZE);

            let stats = p.stats();
            prop_assert_eq!(stats.num_allocs, live.len());
            prop_assert_eq!(stats.alloc_size, live.iter().map(|(_, s)| s).sum::<usize>());
            prop_assert_eq!(
                stats.num_gaps,
                snap.segments().iter().filter(|s| !s.allocated).count()
            );
            prop_assert_eq!(snap.len(), stats.node_count);
            for pair in snap.segments().windows(2) {
                prop_assert!(pair[0].allocated || pair[1].allocated, "adjacent gaps");
            }
        }

        for (handle, _) in live.drain(..) {
            registry.deallocate(pool, handle).unwrap();
        }
        prop_assert_eq!(registry.inspect(pool).unwrap().layout(), vec![(POOL_SIZE, false)]);
        registry.close(pool).unwrap();
        registry.teardown().unwrap();
    }

    #[test]
    fn free_then_same_size_first_fit_round_trips(
        sizes in prop::collection::vec(1usize..100, 1..20),
        pick in any::<usize>(),
    ) {
        let mut registry = PoolRegistry::new(config());
        registry.init().unwrap();
        let pool = registry.open(POOL_SIZE, AllocPolicy::FirstFit).unwrap();
        let handles: Vec<_> = sizes
            .iter()
            .map(|&s| registry.allocate(pool, s).unwrap())
            .collect();

        let victim = pick % handles.len();
        let stats = registry.pool(pool).unwrap().stats();
        let snap = registry.inspect(pool).unwrap();

        registry.deallocate(pool, handles[victim]).unwrap();
        let again = registry.allocate(pool, sizes[victim]).unwrap();

        let p = registry.pool(pool).unwrap();
        prop_assert_eq!(p.extent(again).unwrap().1, sizes[victim]);
        prop_assert_eq!(p.alloc_size(), stats.alloc_size);
        prop_assert_eq!(p.num_allocs(), stats.num_allocs);
        prop_assert_eq!(p.inspect().layout(), snap.layout());
    }
}
