use crate::{
    CustomSpaceConfig, DetailLevel, DisallowGcScope, Heap, HeapConfig, NoGcScope, PreFinalizer,
};

fn generational_config() -> HeapConfig {
    HeapConfig {
        generational: true,
        ..HeapConfig::default()
    }
}

#[test]
fn payload_size_of_empty_heap_is_zero() {
    let heap = Heap::new(HeapConfig::default());

    assert_eq!(heap.object_payload_size(), 0);
}

#[test]
fn payload_size_sums_live_objects() {
    let heap = Heap::new(HeapConfig::default());
    let allocator = heap.allocator();

    allocator.allocate(24);
    allocator.allocate(100);
    allocator.allocate(700);

    assert_eq!(heap.object_payload_size(), 824);
    // Stable across repeated calls absent intervening allocation.
    assert_eq!(heap.object_payload_size(), 824);
}

#[test]
fn payload_size_covers_custom_spaces() {
    let config = HeapConfig {
        custom_spaces: vec![CustomSpaceConfig {
            supports_compaction: false,
        }],
        ..HeapConfig::default()
    };
    let heap = Heap::new(config);
    let allocator = heap.allocator();

    allocator.allocate(64);
    allocator.allocate_in_custom_space(0, 256);

    assert_eq!(heap.object_payload_size(), 320);
}

#[test]
fn brief_statistics_do_not_see_open_labs() {
    let heap = Heap::new(HeapConfig::default());

    heap.allocator().allocate(100);

    let brief = heap.collect_statistics(DetailLevel::Brief);
    assert_eq!(brief.used_size_bytes, 0);
    assert!(brief.allocated_size_bytes > 0);
    assert!(brief.space_stats.is_empty());
}

#[test]
fn detailed_statistics_flush_labs_first() {
    let config = HeapConfig {
        custom_spaces: vec![CustomSpaceConfig {
            supports_compaction: true,
        }],
        ..HeapConfig::default()
    };
    let heap = Heap::new(config);
    let allocator = heap.allocator();

    allocator.allocate(24);
    allocator.allocate(300);
    allocator.allocate_in_custom_space(0, 128);

    let detailed = heap.collect_statistics(DetailLevel::Detailed);
    assert_eq!(detailed.detail_level, DetailLevel::Detailed);
    assert_eq!(detailed.used_size_bytes, 452);
    // Four size-class spaces plus the embedder space.
    assert_eq!(detailed.space_stats.len(), 5);
    assert_eq!(detailed.space_stats[0].name, "normal-0");
    assert_eq!(detailed.space_stats[0].used_size_bytes, 24);
    assert_eq!(detailed.space_stats[2].used_size_bytes, 300);
    assert_eq!(detailed.space_stats[4].name, "custom-0");
    assert_eq!(detailed.space_stats[4].used_size_bytes, 128);

    let per_space: usize = detailed
        .space_stats
        .iter()
        .map(|space| space.used_size_bytes)
        .sum();
    assert_eq!(per_space, detailed.used_size_bytes);
}

#[test]
fn prefinalizer_allocation_volume_is_reported() {
    let config = HeapConfig {
        allow_allocations_in_prefinalizers: true,
        ..HeapConfig::default()
    };
    let heap = Heap::new(config);
    let allocator = heap.allocator();

    let registry = heap.prefinalizers();
    registry.register(PreFinalizer::new("allocates-a-handle", move || {
        allocator.allocate(48);
    }));

    let bytes = heap.execute_prefinalizers();
    assert_eq!(bytes, 48);
    assert_eq!(registry.bytes_allocated_in_last_invocation(), 48);
}

#[test]
fn prefinalizers_run_with_collections_forbidden() {
    let heap = Heap::new(HeapConfig::default());
    assert!(heap.collection_allowed());

    // The registry is empty; the scope discipline still applies around the
    // (trivial) invocation and unwinds cleanly.
    heap.execute_prefinalizers();
    assert!(heap.collection_allowed());
}

#[test]
fn gc_forbidding_scopes_nest() {
    let heap = Heap::new(HeapConfig::default());

    {
        let _outer = NoGcScope::new(&heap);
        assert!(!heap.collection_allowed());
        {
            let _inner = DisallowGcScope::new(&heap);
            assert!(!heap.collection_allowed());
        }
        assert!(!heap.collection_allowed());
    }
    assert!(heap.collection_allowed());
}

#[test]
fn termination_reclaims_everything() {
    let heap = Heap::new(HeapConfig::default());
    let allocator = heap.allocator();

    for _ in 0..100 {
        allocator.allocate(64);
    }
    let object = allocator.allocate(16);
    heap.strong_persistents().register(object);
    heap.weak_persistents().register(object);

    heap.terminate();

    assert!(heap.is_terminated());
    assert!(!heap.collection_allowed());
    assert_eq!(heap.object_payload_size(), 0);
    assert_eq!(heap.page_backend().committed_bytes(), 0);
    assert_eq!(heap.stats().allocated_object_size(), 0);
    assert_eq!(heap.stats().forced_major_collections(), 1);
}

#[test]
#[should_panic(expected = "heap terminated twice")]
fn second_termination_is_fatal() {
    let heap = Heap::new(HeapConfig::default());

    heap.terminate();
    heap.terminate();
}

#[test]
fn remembered_set_reset_resets_the_age_table() {
    let heap = Heap::new(generational_config());
    let object = heap.allocator().allocate(32);

    {
        let mut remembered_set = heap.remembered_set().unwrap();
        remembered_set.record(object);
        remembered_set
            .age_table_mut()
            .set_age(5, crate::Age::Young);
    }

    heap.allocator().reset_linear_allocation_buffers();
    heap.reset_remembered_set();

    let remembered_set = heap.remembered_set().unwrap();
    assert!(remembered_set.is_empty());
    assert_eq!(remembered_set.age_table().age(5), crate::Age::Old);
}

#[test]
#[should_panic(expected = "open linear allocation buffer")]
fn remembered_set_reset_requires_empty_labs() {
    let heap = Heap::new(generational_config());

    heap.allocator().allocate(32);
    heap.reset_remembered_set();
}

#[test]
#[should_panic(expected = "remembered set requires a generational heap")]
fn remembered_set_reset_requires_generational_heap() {
    let heap = Heap::new(HeapConfig::default());

    heap.reset_remembered_set();
}
