//! Structured, fatal diagnostics for construction-time and large-allocation failures.
//!
//! Out-of-memory from the page mapper is never modeled as an `Err` here — it
//! is represented by `None`/null per the allocator's runtime contract. These
//! types cover only the two failure classes that are always fatal: an invalid
//! bucket configuration, and (under [`crate::large::LargeAllocPolicy::Panic`])
//! an oversize request.

use crate::size::Log2Size;
use thiserror::Error;

/// Why [`crate::allocator::SlabAllocator::new`] rejected a configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The bucket list supplied to the allocator was empty.
    #[error("bucket list is empty: at least one (block_size, slab_size) pair is required")]
    NoBuckets,

    /// Two adjacent buckets did not have strictly increasing block sizes.
    #[error(
        "bucket block sizes must be strictly increasing: bucket {index} has block_size {block_size}, \
         which is not greater than the preceding bucket's {previous_block_size}"
    )]
    BlockSizesNotIncreasing {
        /// Index of the offending bucket.
        index: usize,
        /// Its `block_size`.
        block_size: usize,
        /// The immediately preceding bucket's `block_size`.
        previous_block_size: usize,
    },

    /// A `block_size` or `slab_size` was not a power of two.
    #[error("bucket {index} has a {field} of {value} bytes, which is not a power of two")]
    NotPowerOfTwo {
        /// Index of the offending bucket.
        index: usize,
        /// Which field failed: `"block_size"` or `"slab_size"`.
        field: &'static str,
        /// The offending value.
        value: usize,
    },

    /// A bucket's `block_size` was smaller than a machine word.
    #[error(
        "bucket {index} has block_size {block_size}, smaller than the machine word size of {word_size} bytes"
    )]
    BlockTooSmall {
        /// Index of the offending bucket.
        index: usize,
        /// Its `block_size`.
        block_size: usize,
        /// `size_of::<usize>()` on this target.
        word_size: usize,
    },

    /// A bucket's `block_size` exceeded its own `slab_size`.
    #[error(
        "bucket {index} has block_size {block_size} larger than its own slab_size {slab_size}"
    )]
    BlockExceedsSlab {
        /// Index of the offending bucket.
        index: usize,
        /// Its `block_size`.
        block_size: usize,
        /// Its `slab_size`.
        slab_size: usize,
    },

    /// A bucket's `slab_size` was smaller than the OS minimum page size.
    #[error(
        "bucket {index} has slab_size {slab_size}, smaller than the minimum page size of {page_size} bytes"
    )]
    SlabBelowPageSize {
        /// Index of the offending bucket.
        index: usize,
        /// Its `slab_size`.
        slab_size: usize,
        /// The configured minimum OS page size.
        page_size: usize,
    },
}

/// Formats the fatal message used by [`crate::large::LargeAllocPolicy::Panic`]
/// when a request exceeds the largest configured bucket.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "oversize allocation request: {requested} exceeds the largest supported class of {largest}"
)]
pub struct LargeAllocError {
    /// The size class the request was classified into.
    pub requested: Log2Size,
    /// The largest bucket's size class.
    pub largest: Log2Size,
}
