//! The type-level parameter set that produces a concrete allocator (§6).

use crate::bucket::BucketSpec;
use crate::hints::Likelihood;
use crate::large::LargeAllocPolicy;

/// Everything [`crate::allocator::SlabAllocator::new`] needs to compile an
/// allocator instance: the bucket list, the large-allocation policy, whether
/// to track statistics, and the four advisory branch-likelihood hints.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Ordered `(block_size, slab_size)` pairs; validated in [`crate::tables`].
    pub buckets: Vec<BucketSpec>,
    /// How oversize requests are handled.
    pub large_allocation_behavior: LargeAllocPolicy,
    /// Whether to accumulate [`crate::stats::Stats`].
    pub track_allocation_statistics: bool,
    /// Hint for the large-vs-bucketed branch in `alloc`/`free`.
    pub hint_large_allocation: Likelihood,
    /// Hint for whether a bucket's recycled free list is usually non-empty.
    pub hint_buckets_have_free_blocks_that_were_used_in_the_past: Likelihood,
    /// Hint for whether a bucket's brand-new free list is usually non-empty.
    pub hint_buckets_have_free_blocks_that_have_never_been_used: Likelihood,
    /// Hint for how often a caller is expected to request a usage report.
    /// Consulted by [`crate::report::write_report`], which routes its body
    /// through the same `#[cold]` helper as the other hints when this marks
    /// reporting as unlikely/rare.
    pub hint_log_usage_statistics: Likelihood,
}

impl AllocatorConfig {
    /// A config with no buckets and every policy/hint at its default. Callers
    /// are expected to set `buckets` before passing this to
    /// [`crate::allocator::SlabAllocator::new`].
    pub fn new(buckets: impl IntoIterator<Item = BucketSpec>) -> Self {
        Self {
            buckets: buckets.into_iter().collect(),
            large_allocation_behavior: LargeAllocPolicy::default(),
            track_allocation_statistics: false,
            hint_large_allocation: Likelihood::default(),
            hint_buckets_have_free_blocks_that_were_used_in_the_past: Likelihood::default(),
            hint_buckets_have_free_blocks_that_have_never_been_used: Likelihood::default(),
            hint_log_usage_statistics: Likelihood::default(),
        }
    }

    /// Builder-style setter for [`Self::large_allocation_behavior`].
    pub fn with_large_allocation_behavior(mut self, policy: LargeAllocPolicy) -> Self {
        self.large_allocation_behavior = policy;
        self
    }

    /// Builder-style setter for [`Self::track_allocation_statistics`].
    pub fn with_statistics_tracking(mut self, enabled: bool) -> Self {
        self.track_allocation_statistics = enabled;
        self
    }
}
