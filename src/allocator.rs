//! The allocator state machine: per-bucket dual free lists and the four
//! vtable operations (§4.5-4.8).

use core::ptr::NonNull;

use crate::config::AllocatorConfig;
use crate::error::{ConfigError, LargeAllocError};
use crate::hints::{cold_path, Likelihood};
use crate::large::LargeAllocPolicy;
use crate::page::PageMapper;
use crate::size::Log2Size;
use crate::stats::Tracking;
use crate::tables::DerivedTables;

/// Free-list state for one bucket. A freshly built allocator starts every
/// bucket zeroed (§3 Lifecycle).
#[derive(Debug, Default)]
struct BucketState {
    recycled_head: *mut u8,
    recycled_count: usize,
    brand_new_head: *mut u8,
    brand_new_count: usize,
}

/// A segregated-fit slab allocator compiled from an [`AllocatorConfig`].
///
/// `SlabAllocator` is deliberately not `Send`/`Sync`: its free-list state is
/// plain (non-atomic) and its hot paths assume no concurrent caller (§5).
/// Every field that matters for that property is a raw pointer, which makes
/// the auto-traits fall out without any explicit opt-out.
pub struct SlabAllocator<P: PageMapper> {
    tables: DerivedTables,
    buckets: Vec<BucketState>,
    large_allocation_behavior: LargeAllocPolicy,
    hint_large_allocation: Likelihood,
    hint_recycled_nonempty: Likelihood,
    hint_brand_new_nonempty: Likelihood,
    hint_log_usage_statistics: Likelihood,
    tracking: Tracking,
    page_mapper: P,
}

impl<P: PageMapper> SlabAllocator<P> {
    /// Validates `config` and compiles it into a ready-to-use allocator
    /// backed by `page_mapper`. See `SPEC_FULL.md` §4.2 for the validation
    /// rules; on success this is the only place tables are built.
    pub fn new(config: AllocatorConfig, page_mapper: P) -> Result<Self, ConfigError> {
        let tables = DerivedTables::build(&config.buckets, crate::page::PAGE_SIZE)?;
        let bucket_count = tables.bucket_count();
        Ok(Self {
            tables,
            buckets: (0..bucket_count).map(|_| BucketState::default()).collect(),
            large_allocation_behavior: config.large_allocation_behavior,
            hint_large_allocation: config.hint_large_allocation,
            hint_recycled_nonempty: config.hint_buckets_have_free_blocks_that_were_used_in_the_past,
            hint_brand_new_nonempty: config.hint_buckets_have_free_blocks_that_have_never_been_used,
            hint_log_usage_statistics: config.hint_log_usage_statistics,
            tracking: Tracking::new(config.track_allocation_statistics, bucket_count),
            page_mapper,
        })
    }

    /// Convenience wrapper around [`Self::new`] for call sites where an
    /// invalid configuration is unconditionally fatal anyway (tests, and the
    /// [`crate::global`] installer): per `SPEC_FULL.md` §7 a construction-time
    /// misconfiguration is always a fatal diagnostic rather than a runtime
    /// failure class, so this just unwraps `ConfigError` into a descriptive
    /// panic instead of making every such call site match on it itself.
    pub fn new_or_panic(config: AllocatorConfig, page_mapper: P) -> Self {
        match Self::new(config, page_mapper) {
            Ok(allocator) => allocator,
            Err(err) => panic!("invalid segslab configuration: {err}"),
        }
    }

    /// The compiled lookup tables, exposed for report rendering and tests.
    pub fn tables(&self) -> &DerivedTables {
        &self.tables
    }

    /// The current statistics snapshot, if tracking is enabled.
    pub fn stats(&self) -> Option<&crate::stats::Stats> {
        self.tracking.stats()
    }

    /// Allocates a block of at least `len` bytes aligned to at least `align`.
    ///
    /// Returns `None` on page-mapper exhaustion. Never panics unless the
    /// configured [`LargeAllocPolicy::Panic`] fires for an oversize request.
    pub fn alloc(&mut self, len: usize, align: usize) -> Option<NonNull<u8>> {
        let k = self.tables.classify(len, align);
        if self.tables.is_large(k) {
            if self.hint_large_allocation.is_cold() {
                cold_path();
            }
            return self.alloc_large(len, align, k);
        }
        let bucket = self.tables.bucket_for(k);
        self.alloc_from_bucket(bucket, len)
    }

    fn alloc_from_bucket(&mut self, bucket: usize, len: usize) -> Option<NonNull<u8>> {
        let block_bytes = self.tables.block_bytes[bucket];
        let state = &mut self.buckets[bucket];

        if state.recycled_count > 0 {
            // Fast path 1: unlink the recycled head (§4.5 step 1).
            let head = state.recycled_head;
            let next = unsafe { *(head as *mut *mut u8) };
            state.recycled_head = next;
            state.recycled_count -= 1;
            if let Some(s) = self.tracking.as_mut() {
                s.on_bucket_alloc(bucket, len, block_bytes, false);
            }
            return NonNull::new(head);
        }

        if !self.hint_recycled_nonempty.is_cold() {
            // Hint says recycled lists are usually non-empty; reaching here
            // without one is itself the colder case.
            cold_path();
        }

        if state.brand_new_count > 0 {
            // Fast path 2: bump pointer within the current slab (§4.5 step 2).
            let ptr = state.brand_new_head;
            state.brand_new_head = unsafe { state.brand_new_head.add(block_bytes) };
            state.brand_new_count -= 1;
            if let Some(s) = self.tracking.as_mut() {
                s.on_bucket_alloc(bucket, len, block_bytes, false);
            }
            return NonNull::new(ptr);
        }

        if !self.hint_brand_new_nonempty.is_cold() {
            cold_path();
        }

        // Slow path: map a fresh slab (§4.5 step 3).
        self.carve_new_slab(bucket, len)
    }

    fn carve_new_slab(&mut self, bucket: usize, len: usize) -> Option<NonNull<u8>> {
        cold_path();
        let slab_bytes = self.tables.slab_bytes[bucket];
        let block_bytes = self.tables.block_bytes[bucket];
        let extra = self.tables.extra_blocks_per_slab[bucket];

        let slab = self.page_mapper.map(slab_bytes, block_bytes)?;
        let state = &mut self.buckets[bucket];
        state.brand_new_head = unsafe { slab.as_ptr().add(block_bytes) };
        state.brand_new_count = extra;

        if let Some(s) = self.tracking.as_mut() {
            s.on_bucket_alloc(bucket, len, block_bytes, true);
        }
        Some(slab)
    }

    fn alloc_large(&mut self, len: usize, align: usize, k: Log2Size) -> Option<NonNull<u8>> {
        match self.large_allocation_behavior {
            LargeAllocPolicy::UsePageAllocator => {
                let ptr = self.page_mapper.map(len, align)?;
                if let Some(s) = self.tracking.as_mut() {
                    s.on_large_alloc(len);
                }
                Some(ptr)
            }
            LargeAllocPolicy::Panic => panic!(
                "{}",
                LargeAllocError { requested: k, largest: Log2Size::new(self.tables.largest_block_log2) }
            ),
            LargeAllocPolicy::Unreachable => unreachable!(
                "large allocation request under LargeAllocPolicy::Unreachable: caller guaranteed this would never happen"
            ),
        }
    }

    /// Returns a block to its bucket's recycled free list.
    ///
    /// # Safety
    /// `ptr` must have been returned by a prior call to `alloc` (or `remap`)
    /// on `self` with the same `len` and `align`, and must not already have
    /// been freed.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>, len: usize, align: usize) {
        let k = self.tables.classify(len, align);
        if self.tables.is_large(k) {
            return self.free_large(ptr, len, k);
        }
        let bucket = self.tables.bucket_for(k);
        let block_bytes = self.tables.block_bytes[bucket];
        let state = &mut self.buckets[bucket];

        // §4.6: thread ptr onto the recycled list, overwriting client data.
        *(ptr.as_ptr() as *mut *mut u8) = state.recycled_head;
        state.recycled_head = ptr.as_ptr();
        state.recycled_count += 1;

        if let Some(s) = self.tracking.as_mut() {
            s.on_bucket_free(bucket, block_bytes);
        }
    }

    unsafe fn free_large(&mut self, ptr: NonNull<u8>, len: usize, k: Log2Size) {
        match self.large_allocation_behavior {
            LargeAllocPolicy::UsePageAllocator => {
                self.page_mapper.unmap(ptr, len);
                if let Some(s) = self.tracking.as_mut() {
                    s.on_large_free(len);
                }
            }
            LargeAllocPolicy::Panic => panic!(
                "{}",
                LargeAllocError { requested: k, largest: Log2Size::new(self.tables.largest_block_log2) }
            ),
            LargeAllocPolicy::Unreachable => {
                unreachable!("large free request under LargeAllocPolicy::Unreachable")
            }
        }
    }

    /// Attempts to resize an allocation in place. Returns `true` iff
    /// `(new_len, align)` classifies into the same bucket as
    /// `(old_len, align)`; no data is ever copied (§4.7).
    ///
    /// # Safety
    /// `ptr` must have been returned by a prior `alloc`/`remap` on `self`
    /// with `(old_len, align)`.
    pub unsafe fn resize(&mut self, ptr: NonNull<u8>, old_len: usize, align: usize, new_len: usize) -> bool {
        let k_old = self.tables.classify(old_len, align);
        let k_new = self.tables.classify(new_len, align);
        let old_large = self.tables.is_large(k_old);
        let new_large = self.tables.is_large(k_new);

        if !old_large && !new_large {
            let same = self.tables.bucket_for(k_old) == self.tables.bucket_for(k_new);
            if !same {
                if let Some(s) = self.tracking.as_mut() {
                    s.on_rejected_grow(self.tables.bucket_for(k_old));
                }
            }
            return same;
        }

        match self.large_allocation_behavior {
            LargeAllocPolicy::UsePageAllocator => {
                if old_large && new_large {
                    if let Some(s) = self.tracking.as_mut() {
                        s.on_large_resize_attempt(old_len, new_len);
                    }
                    self.page_mapper.realloc(ptr, old_len, new_len, false).is_some()
                } else {
                    false
                }
            }
            LargeAllocPolicy::Panic => panic!(
                "{}",
                LargeAllocError {
                    requested: if new_large { k_new } else { k_old },
                    largest: Log2Size::new(self.tables.largest_block_log2)
                }
            ),
            LargeAllocPolicy::Unreachable => unreachable!("large resize under LargeAllocPolicy::Unreachable"),
        }
    }

    /// Attempts to resize an allocation, permitting the page mapper to move
    /// it when both endpoints are large. Returns `ptr` unchanged if the
    /// bucketed class test passes; `None` otherwise (§4.8). The allocator
    /// never itself allocates a replacement block for a bucketed mismatch —
    /// that is the caller's responsibility.
    ///
    /// # Safety
    /// `ptr` must have been returned by a prior `alloc`/`remap` on `self`
    /// with `(old_len, align)`.
    pub unsafe fn remap(
        &mut self,
        ptr: NonNull<u8>,
        old_len: usize,
        align: usize,
        new_len: usize,
    ) -> Option<NonNull<u8>> {
        let k_old = self.tables.classify(old_len, align);
        let k_new = self.tables.classify(new_len, align);
        let old_large = self.tables.is_large(k_old);
        let new_large = self.tables.is_large(k_new);

        if !old_large && !new_large {
            return if self.tables.bucket_for(k_old) == self.tables.bucket_for(k_new) {
                Some(ptr)
            } else {
                if let Some(s) = self.tracking.as_mut() {
                    s.on_rejected_grow(self.tables.bucket_for(k_old));
                }
                None
            };
        }

        match self.large_allocation_behavior {
            LargeAllocPolicy::UsePageAllocator => {
                if old_large && new_large {
                    if let Some(s) = self.tracking.as_mut() {
                        s.on_large_resize_attempt(old_len, new_len);
                    }
                    self.page_mapper.realloc(ptr, old_len, new_len, true)
                } else {
                    None
                }
            }
            LargeAllocPolicy::Panic => panic!(
                "{}",
                LargeAllocError {
                    requested: if new_large { k_new } else { k_old },
                    largest: Log2Size::new(self.tables.largest_block_log2)
                }
            ),
            LargeAllocPolicy::Unreachable => unreachable!("large remap under LargeAllocPolicy::Unreachable"),
        }
    }

    /// The bucket's free-block counts, used by [`crate::report`].
    pub(crate) fn bucket_free_counts(&self, bucket: usize) -> (usize, usize) {
        let b = &self.buckets[bucket];
        (b.recycled_count, b.brand_new_count)
    }

    /// Whether `hint_log_usage_statistics` marks report generation as a cold
    /// operation, consulted by [`crate::report::write_report`] (§4.13).
    pub(crate) fn report_is_cold(&self) -> bool {
        self.hint_log_usage_statistics.is_cold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketSpec;
    use crate::page::TestPageMapper;

    fn two_bucket_config() -> AllocatorConfig {
        AllocatorConfig::new([BucketSpec::new(128, 4096), BucketSpec::new(1024, 16384)])
    }

    fn allocator() -> SlabAllocator<TestPageMapper> {
        SlabAllocator::new_or_panic(two_bucket_config().with_statistics_tracking(true), TestPageMapper::new())
    }

    #[test]
    fn scenario_from_spec() {
        let mut a = allocator();

        // 1. alloc(6, 1)
        let p1 = a.alloc(6, 1).unwrap();
        assert_eq!(a.tables().block_bytes[0], 128);
        assert_eq!(p1.as_ptr() as usize % 128, 0);
        let (recycled, brand_new) = a.bucket_free_counts(0);
        assert_eq!(recycled, 0);
        assert_eq!(brand_new, 31);

        // 2. alloc(7, 1)
        let p2 = a.alloc(7, 1).unwrap();
        assert_eq!(p2.as_ptr() as usize, p1.as_ptr() as usize + 128);
        let (_, brand_new) = a.bucket_free_counts(0);
        assert_eq!(brand_new, 30);

        // 3. free(p1, 6, 1)
        unsafe { a.free(p1, 6, 1) };
        let (recycled, _) = a.bucket_free_counts(0);
        assert_eq!(recycled, 1);

        // 4. alloc(5, 1) reuses p1 (P6)
        let p3 = a.alloc(5, 1).unwrap();
        assert_eq!(p3, p1);
        let (recycled, _) = a.bucket_free_counts(0);
        assert_eq!(recycled, 0);

        // 5. alloc(129, 1) routes to bucket 1
        let p4 = a.alloc(129, 1).unwrap();
        assert_eq!(p4.as_ptr() as usize % 1024, 0);

        // 6. resize / remap class tests
        assert!(unsafe { a.resize(p3, 5, 1, 128) });
        assert!(!unsafe { a.resize(p3, 5, 1, 129) });
        assert!(unsafe { a.remap(p3, 5, 1, 129) }.is_none());
        let _ = p2;
    }

    #[test]
    fn panic_policy_names_size_classes() {
        let config = two_bucket_config().with_large_allocation_behavior(LargeAllocPolicy::Panic);
        let mut a = SlabAllocator::new_or_panic(config, TestPageMapper::new());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| a.alloc(2048, 1)));
        let err = result.unwrap_err();
        let message = err.downcast_ref::<String>().cloned().unwrap_or_default();
        assert!(message.contains("2 kilobytes"), "message was: {message}");
    }

    #[test]
    fn oom_returns_none() {
        let config = two_bucket_config();
        let mut a = SlabAllocator::new_or_panic(config, TestPageMapper::fail_after(0));
        assert!(a.alloc(6, 1).is_none());
    }

    #[test]
    fn p7_slab_carving_amortizes_mapper_calls() {
        let mapper = TestPageMapper::new();
        let mut a = SlabAllocator::new_or_panic(two_bucket_config(), mapper);
        let blocks_per_slab = a.tables().blocks_per_slab[0];
        for _ in 0..blocks_per_slab {
            assert!(a.alloc(6, 1).is_some());
        }
        // blocks_per_slab allocations consumed exactly one slab's worth.
        let (recycled, brand_new) = a.bucket_free_counts(0);
        assert_eq!(recycled, 0);
        assert_eq!(brand_new, 0);
    }
}
