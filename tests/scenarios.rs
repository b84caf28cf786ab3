//! Literal end-to-end scenarios against a two-bucket configuration:
//! `{(128 B, 4 KiB), (1 KiB, 16 KiB)}`, with statistics tracking enabled.

use segslab::page::TestPageMapper;
use segslab::{AllocatorConfig, BucketSpec, LargeAllocPolicy, SlabAllocator};

fn two_bucket_tracked() -> AllocatorConfig {
    AllocatorConfig::new([BucketSpec::new(128, 4096), BucketSpec::new(1024, 16384)]).with_statistics_tracking(true)
}

#[test]
fn small_allocation_maps_one_slab_and_carves_the_remainder() {
    let mapper = TestPageMapper::new();
    let mut allocator = SlabAllocator::new_or_panic(two_bucket_tracked(), mapper);

    let p1 = allocator.alloc(6, 1).expect("alloc(6, 1)");
    assert_eq!(p1.as_ptr() as usize % 128, 0);

    let stats = allocator.stats().unwrap();
    assert_eq!(stats.buckets[0].live_blocks.current, 1);
    assert_eq!(stats.buckets[0].live_slabs.current, 1);
}

#[test]
fn second_allocation_bumps_within_the_same_slab() {
    let mut allocator = SlabAllocator::new_or_panic(two_bucket_tracked(), TestPageMapper::new());

    let p1 = allocator.alloc(6, 1).unwrap();
    let p2 = allocator.alloc(7, 1).unwrap();

    assert_eq!(p2.as_ptr() as usize, p1.as_ptr() as usize + 128);
    let stats = allocator.stats().unwrap();
    assert_eq!(stats.buckets[0].live_slabs.current, 1, "no second slab should have been mapped");
}

#[test]
fn free_then_alloc_reuses_the_freed_block() {
    let mut allocator = SlabAllocator::new_or_panic(two_bucket_tracked(), TestPageMapper::new());

    let p1 = allocator.alloc(6, 1).unwrap();
    unsafe { allocator.free(p1, 6, 1) };
    let p3 = allocator.alloc(5, 1).unwrap();

    assert_eq!(p3, p1, "the recycled list is LIFO, so the very next alloc reuses p1");
}

#[test]
fn request_just_over_one_bucket_routes_to_the_next() {
    let mut allocator = SlabAllocator::new_or_panic(two_bucket_tracked(), TestPageMapper::new());

    let p = allocator.alloc(129, 1).expect("alloc(129, 1)");
    assert_eq!(p.as_ptr() as usize % 1024, 0);
}

#[test]
fn resize_and_remap_are_pure_class_tests() {
    let mut allocator = SlabAllocator::new_or_panic(two_bucket_tracked(), TestPageMapper::new());

    let p1 = allocator.alloc(6, 1).unwrap();
    unsafe { allocator.free(p1, 6, 1) };
    let p3 = allocator.alloc(5, 1).unwrap();

    assert!(unsafe { allocator.resize(p3, 5, 1, 128) }, "128 stays in the 128-byte bucket");
    assert!(!unsafe { allocator.resize(p3, 5, 1, 129) }, "129 crosses into the 1 KiB bucket");
    assert!(unsafe { allocator.remap(p3, 5, 1, 129) }.is_none(), "remap across buckets always fails");
}

#[test]
fn oversize_request_under_panic_policy_names_both_size_classes() {
    let config = two_bucket_tracked().with_large_allocation_behavior(LargeAllocPolicy::Panic);
    let mut allocator = SlabAllocator::new_or_panic(config, TestPageMapper::new());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| allocator.alloc(2048, 1)));
    let payload = result.expect_err("oversize request must panic under the Panic policy");
    let message = payload.downcast_ref::<String>().cloned().unwrap_or_default();
    assert!(message.contains("2 kilobytes"), "panic message was: {message}");
}

#[test]
fn oversize_request_under_use_page_allocator_delegates_directly() {
    let mut allocator = SlabAllocator::new_or_panic(two_bucket_tracked(), TestPageMapper::new());

    let ptr = allocator.alloc(2048, 1).expect("large alloc should delegate to the page mapper");
    let stats = allocator.stats().unwrap();
    assert_eq!(stats.large.count.current, 1);
    assert_eq!(stats.large.bytes.current, 2048);

    unsafe { allocator.free(ptr, 2048, 1) };
    let stats = allocator.stats().unwrap();
    assert_eq!(stats.large.count.current, 0);
}
