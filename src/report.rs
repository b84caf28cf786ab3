//! Human-readable usage reports (§4.11).

use core::fmt::{self, Write};

use crate::allocator::SlabAllocator;
use crate::hints::cold_path;
use crate::page::PageMapper;
use crate::size::name as size_name;

/// Writes a usage report for `allocator` to `out`, labelled `label`.
///
/// Always includes a per-bucket table of size-class name, estimated free
/// slab count, free block count, and free bytes. If statistics tracking is
/// enabled, appends the accumulated [`crate::stats::Stats`] as well.
///
/// The free-block count (`recycled_count + brand_new_count`) is exact; the
/// *free slabs* figure derived from it, `free_blocks / blocks_per_slab`, is
/// an estimate, since a partially-bumped slab and a freshly recycled slab
/// are indistinguishable from the free counts alone (SPEC_FULL.md §4.11,
/// §9 open question (b)).
pub fn write_report<P: PageMapper>(
    out: &mut impl Write,
    label: &str,
    allocator: &SlabAllocator<P>,
) -> fmt::Result {
    if allocator.report_is_cold() {
        cold_path();
    }

    writeln!(out, "=== {label} ===")?;
    writeln!(out, "{:>12}  {:>11}  {:>12}  {:>12}", "size", "free slabs", "free blocks", "free bytes")?;

    let tables = allocator.tables();
    for b in 0..tables.bucket_count() {
        let (recycled, brand_new) = allocator.bucket_free_counts(b);
        let free_blocks = recycled + brand_new;
        let free_slabs_estimate = free_blocks / tables.blocks_per_slab[b];
        let free_bytes = free_blocks * tables.block_bytes[b];
        writeln!(
            out,
            "{:>12}  {:>11}  {:>12}  {:>12}",
            size_name(tables.block_log2[b]),
            free_slabs_estimate,
            free_blocks,
            free_bytes,
        )?;
    }

    if let Some(stats) = allocator.stats() {
        write_stats(out, tables, stats)?;
    }

    Ok(())
}

fn write_stats(
    out: &mut impl Write,
    tables: &crate::tables::DerivedTables,
    stats: &crate::stats::Stats,
) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "--- statistics ---")?;
    writeln!(
        out,
        "requests: {}..{} bytes",
        stats.request_size.smallest.unwrap_or(0),
        stats.request_size.largest.unwrap_or(0)
    )?;
    writeln!(out, "bytes outstanding: {} (peak {})", stats.bytes.current, stats.bytes.peak)?;

    for (b, bucket_stats) in stats.buckets.iter().enumerate() {
        let block_bytes = tables.block_bytes[b];
        writeln!(
            out,
            "bucket {block_bytes}: live blocks {} (peak {}), live slabs (est.) {} (peak {}), rejected grows {}",
            bucket_stats.live_blocks.current,
            bucket_stats.live_blocks.peak,
            bucket_stats.live_slabs.current,
            bucket_stats.live_slabs.peak,
            bucket_stats.rejected_grows,
        )?;
    }

    writeln!(
        out,
        "large allocations: live {} (peak {}), bytes {} (peak {}), largest grow {}, largest shrink {}",
        stats.large.count.current,
        stats.large.count.peak,
        stats.large.bytes.current,
        stats.large.bytes.peak,
        stats.large.largest_grow,
        stats.large.largest_shrink,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketSpec;
    use crate::config::AllocatorConfig;
    use crate::page::TestPageMapper;

    #[test]
    fn report_without_stats_has_no_statistics_section() {
        let config = AllocatorConfig::new([BucketSpec::new(128, 4096)]);
        let allocator = SlabAllocator::new_or_panic(config, TestPageMapper::new());
        let mut out = String::new();
        write_report(&mut out, "test", &allocator).unwrap();
        assert!(out.contains("free blocks"));
        assert!(out.contains("free bytes"));
        assert!(!out.contains("statistics"));
    }

    #[test]
    fn free_slab_estimate_and_bytes_reflect_carved_blocks() {
        // 4 KiB slab of 128-byte blocks: 32 blocks per slab.
        let config = AllocatorConfig::new([BucketSpec::new(128, 4096)]);
        let mut allocator = SlabAllocator::new_or_panic(config, TestPageMapper::new());
        let p = allocator.alloc(6, 1).unwrap();
        unsafe { allocator.free(p, 6, 1) };
        // One slab carved: 1 recycled + 30 brand-new remain free = 31 blocks,
        // short of a full 32-block slab, so the estimate rounds down to 0.
        let mut out = String::new();
        write_report(&mut out, "test", &allocator).unwrap();
        assert!(out.contains("128 bytes"), "expected size-class name in report: {out}");
        assert!(out.contains("31"), "expected 31 free blocks in report: {out}");
        assert!(out.contains(&(31 * 128).to_string()), "expected free bytes in report: {out}");
    }

    #[test]
    fn report_with_stats_includes_live_blocks() {
        let config = AllocatorConfig::new([BucketSpec::new(128, 4096)]).with_statistics_tracking(true);
        let mut allocator = SlabAllocator::new_or_panic(config, TestPageMapper::new());
        allocator.alloc(6, 1).unwrap();
        let mut out = String::new();
        write_report(&mut out, "test", &allocator).unwrap();
        assert!(out.contains("statistics"));
        assert!(out.contains("live blocks 1"));
    }
}
