//! Inflated Header Tests - Lifecycle through full collections
//!
//! Header records live exactly as long as their owner stays reachable,
//! follow their owner across promotion, and are reused lowest index first.

mod common;

use common::ImmixFixture;
use immix::stats::MemoryMetrics;
use immix::ImmixConfig;

#[test]
fn test_freed_header_slots_reused_lowest_first() {
    let mut fixture = ImmixFixture::with_defaults();

    let owners: Vec<_> = (0..10).map(|_| fixture.allocate(32)).collect();
    let indices: Vec<_> = owners
        .iter()
        .map(|&owner| fixture.memory.inflate_header(owner).unwrap())
        .collect();
    assert_eq!(indices, (0..10).collect::<Vec<_>>());

    for &survivor in &[owners[1], owners[4], owners[7]] {
        fixture.root(survivor);
    }
    fixture.collect();

    assert_eq!(fixture.memory.inflated_headers().in_use(), 3);
    assert_eq!(fixture.gc.header_diagnostic().objects, 3);

    let fresh: Vec<_> = (0..7)
        .map(|_| {
            let owner = fixture.allocate(32);
            fixture.memory.inflate_header(owner).unwrap()
        })
        .collect();
    assert_eq!(fresh, vec![0, 2, 3, 5, 6, 8, 9]);
}

#[test]
fn test_identity_hash_survives_collection_and_promotion() {
    let mut fixture = ImmixFixture::with_defaults();

    let young = fixture.young(24);
    let slot = fixture.root(young);
    let hash = fixture.memory.identity_hash(young).unwrap();

    fixture.collect();

    let promoted = fixture.root_at(slot);
    assert_ne!(promoted, young);
    assert_eq!(fixture.memory.identity_hash(promoted).unwrap(), hash);

    let index = fixture
        .memory
        .with_object(promoted, |o| o.header.inflated_index())
        .flatten()
        .expect("promoted copy keeps its header");
    let headers = fixture.memory.inflated_headers();
    assert_eq!(headers.header(index).map(|h| h.owner()), Some(promoted));
}

#[test]
fn test_header_inflated_mid_cycle_on_marked_object_survives() {
    let mut fixture = ImmixFixture::with_defaults();

    let owner = fixture.allocate(32);
    fixture.root(owner);

    fixture
        .gc
        .collect_start(&mut fixture.runtime.gc_data())
        .unwrap();
    fixture.gc.process_mark_stack();

    // Owner is already marked; its new header must not be swept.
    let index = fixture.memory.inflate_header(owner).unwrap();

    fixture
        .gc
        .collect_finish(&mut fixture.runtime.gc_data())
        .unwrap();
    fixture.gc.sweep().unwrap();

    assert!(fixture.memory.inflated_headers().header(index).is_some());
}

#[test]
fn test_table_growth_schedules_collection() {
    let mut fixture = ImmixFixture::with_config(ImmixConfig {
        inflated_header_chunk_size: 4,
        ..Default::default()
    });

    for _ in 0..5 {
        let owner = fixture.allocate(16);
        fixture.memory.inflate_header(owner).unwrap();
    }

    assert_eq!(MemoryMetrics::read(&fixture.memory.metrics().headers_set), 2);
    let reasons = fixture.memory.take_collection_requests();
    assert_eq!(
        reasons
            .iter()
            .filter(|r| r.as_str() == "Inflated headers")
            .count(),
        2
    );
    assert_eq!(fixture.memory.inflated_headers().chunk_count(), 2);
}

#[test]
fn test_empty_trailing_chunks_released() {
    let mut fixture = ImmixFixture::with_config(ImmixConfig {
        inflated_header_chunk_size: 4,
        ..Default::default()
    });

    let owners: Vec<_> = (0..12).map(|_| fixture.allocate(16)).collect();
    for &owner in &owners {
        fixture.memory.inflate_header(owner).unwrap();
    }
    assert_eq!(fixture.memory.inflated_headers().chunk_count(), 3);

    fixture.root(owners[0]);
    fixture.collect();

    let headers = fixture.memory.inflated_headers();
    assert_eq!(headers.chunk_count(), 1);
    assert_eq!(headers.in_use(), 1);
    assert_eq!(headers.free_slots(), 3);
}

#[test]
#[should_panic(expected = "inflated headers active at the same time")]
fn test_header_index_exhaustion_is_fatal() {
    let mut fixture = ImmixFixture::with_config(ImmixConfig {
        inflated_header_chunk_size: 4,
        inflated_header_limit: 4,
        ..Default::default()
    });

    for _ in 0..5 {
        let owner = fixture.allocate(16);
        let _ = fixture.memory.inflate_header(owner);
    }
}
