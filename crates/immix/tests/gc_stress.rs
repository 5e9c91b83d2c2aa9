//! GC Stress Tests - Randomized object graphs over many cycles
//!
//! Each round mutates a random graph of region and young objects, runs a
//! full cycle and checks the region against an independent reachability
//! walk: exactly the reachable objects survive, all of them in the region,
//! and the sweep's byte count matches their sizes.
//!
//! The long variant is `#[ignore]`d; run it explicitly with
//! `cargo test --test gc_stress -- --ignored`

mod common;

use common::{assert_all_addresses_unique, ImmixFixture};
use immix::{Address, ImmixConfig, ObjectPosition};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;

fn reachable(fixture: &ImmixFixture) -> FxHashSet<Address> {
    let mut seen = FxHashSet::default();
    let mut work: Vec<Address> = fixture
        .runtime
        .roots
        .iter()
        .copied()
        .filter(|a| !a.is_null())
        .collect();

    while let Some(addr) = work.pop() {
        if !seen.insert(addr) {
            continue;
        }
        let fields = fixture
            .memory
            .fields(addr)
            .unwrap_or_else(|e| panic!("reachable object {} missing: {}", addr, e));
        work.extend(fields.into_iter().filter(|a| !a.is_null()));
    }
    seen
}

#[track_caller]
fn verify_region(fixture: &ImmixFixture, round: usize) {
    let live = reachable(fixture);

    let mut live_bytes = 0;
    for &addr in &live {
        assert_eq!(
            fixture.gc.validate_object(addr),
            ObjectPosition::InRegion,
            "round {}: reachable object {} is not in the region",
            round,
            addr
        );
        live_bytes += fixture
            .memory
            .with_object(addr, |o| o.size_in_bytes())
            .unwrap_or(0);
    }

    let region_objects = fixture
        .memory
        .objects()
        .iter()
        .filter(|(_, o)| o.header.in_region_p())
        .count();
    assert_eq!(
        region_objects,
        live.len(),
        "round {}: region holds unreachable objects",
        round
    );
    assert_eq!(
        fixture.gc.diagnostic().bytes,
        live_bytes,
        "round {}: sweep byte count disagrees with survivors",
        round
    );
}

fn run_rounds(seed: u64, rounds: usize, per_round: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut fixture = ImmixFixture::with_config(ImmixConfig {
        blocks_per_chunk: 4,
        ..Default::default()
    });
    let mut pool: Vec<Address> = Vec::new();

    for round in 0..rounds {
        let mut fresh = Vec::with_capacity(per_round);
        for _ in 0..per_round {
            let size = rng.gen_range(8..2048);
            let addr = if rng.gen_bool(0.3) {
                fixture.young(size)
            } else {
                fixture.allocate(size)
            };
            fresh.push(addr);
        }
        assert_all_addresses_unique(&fresh, "fresh allocations");
        pool.extend(fresh.iter().copied());

        for &holder in &fresh {
            for _ in 0..rng.gen_range(0..3) {
                let target = pool[rng.gen_range(0..pool.len())];
                fixture.link(holder, target);
            }
        }

        for _ in 0..per_round / 8 {
            let candidate = pool[rng.gen_range(0..pool.len())];
            fixture.root(candidate);
        }
        let slots = fixture.runtime.roots.len();
        for _ in 0..slots / 4 {
            let slot = rng.gen_range(0..slots);
            fixture.runtime.roots.set(slot, Address::null());
        }

        fixture.collect();
        verify_region(&fixture, round);

        // Only survivors may be linked to from now on.
        pool = reachable(&fixture).into_iter().collect();
        pool.sort();
        if pool.is_empty() {
            let anchor = fixture.allocate(64);
            fixture.root(anchor);
            pool.push(anchor);
        }
    }
}

#[test]
fn test_random_graphs_match_reachability() {
    run_rounds(0x5eed, 12, 200);
}

#[test]
#[ignore = "Stress test - run explicitly"]
fn test_stress_many_cycles() {
    for seed in 0..8 {
        run_rounds(seed, 40, 1_000);
    }
}
