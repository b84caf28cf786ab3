//! The user-supplied bucket list: one entry per size class, before validation.

/// One size class as supplied by the caller of [`crate::config::AllocatorConfig`].
///
/// Buckets are validated and compiled into [`crate::tables::DerivedTables`] by
/// [`crate::allocator::SlabAllocator::new`]; this type carries no invariants of
/// its own beyond being plain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpec {
    /// Size of each block carved from this bucket's slabs, in bytes. Must be a
    /// power of two at least as large as a machine word.
    pub block_size: usize,
    /// Size of each slab mapped for this bucket, in bytes. Must be a power of
    /// two at least as large as `block_size` and the OS page size.
    pub slab_size: usize,
}

impl BucketSpec {
    /// Convenience constructor for a `(block_size, slab_size)` pair.
    pub const fn new(block_size: usize, slab_size: usize) -> Self {
        Self { block_size, slab_size }
    }
}

impl From<(usize, usize)> for BucketSpec {
    fn from((block_size, slab_size): (usize, usize)) -> Self {
        Self::new(block_size, slab_size)
    }
}
