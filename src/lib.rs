//! # `segslab` - a segregated-fit slab allocator
//!
//! A single-threaded slab allocator built around a fixed, caller-supplied
//! list of size classes ("buckets"). Each bucket carves fixed-size blocks out
//! of slabs obtained from an external [`page::PageMapper`]; freed blocks are
//! threaded onto an intrusive recycled free list, and slabs that have never
//! been touched are served by a bump pointer.
//!
//! ## Key properties
//!
//! - **No data movement.** `resize` and `remap` are pure size-class tests:
//!   if the new request classifies into the same bucket as the old one, the
//!   block is reused in place. A cross-bucket request always fails and is
//!   the caller's responsibility to satisfy with a fresh `alloc`/`free` pair.
//! - **Single-threaded by construction.** [`allocator::SlabAllocator`] holds
//!   raw, non-atomic free-list pointers and is therefore `!Send`/`!Sync`;
//!   there is no locking anywhere on the hot path.
//! - **Oversize requests are policy-driven.** Anything larger than the
//!   largest configured bucket is handled per [`large::LargeAllocPolicy`]:
//!   delegated straight to the page mapper, treated as a fatal error, or
//!   asserted unreachable.
//!
//! ## Example
//!
//! ```rust
//! use segslab::{AllocatorConfig, BucketSpec, SlabAllocator};
//! use segslab::page::SystemPageMapper;
//!
//! let config = AllocatorConfig::new([
//!     BucketSpec::new(64, 4096),
//!     BucketSpec::new(512, 8192),
//! ]);
//! let mut allocator = SlabAllocator::new(config, SystemPageMapper).unwrap();
//!
//! let block = allocator.alloc(40, 8).unwrap();
//! unsafe { allocator.free(block, 40, 8) };
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod allocator;
pub mod bucket;
pub mod config;
pub mod error;
pub mod global;
pub mod hints;
pub mod large;
pub mod page;
pub mod report;
pub mod size;
pub mod stats;
pub mod tables;

pub use allocator::SlabAllocator;
pub use bucket::BucketSpec;
pub use config::AllocatorConfig;
pub use error::{ConfigError, LargeAllocError};
pub use hints::Likelihood;
pub use large::LargeAllocPolicy;
pub use page::PageMapper;
pub use report::write_report;
pub use size::Log2Size;
pub use stats::Stats;
