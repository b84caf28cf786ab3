//! The large-allocation dispatcher policy (§4.9).

/// How the allocator handles a request whose classified size exceeds the
/// largest configured bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LargeAllocPolicy {
    /// Delegate to the page mapper directly: `map`/`unmap`/`realloc`.
    #[default]
    UsePageAllocator,
    /// Treat an oversize request as a fatal error: `panic!` with a message
    /// naming the request's size class and the largest supported class.
    Panic,
    /// Treat an oversize request as unreachable. Callers that choose this
    /// policy are asserting, at their own risk, that no large request will
    /// ever be made; violating that assumption is undefined behaviour.
    Unreachable,
}
