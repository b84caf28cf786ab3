//! The page mapper: the allocator's only external collaborator (§4.12).

use core::ptr::NonNull;

/// The system page size assumed by [`SystemPageMapper`]. Used as the default
/// `min_page_size` floor in [`crate::config::AllocatorConfig`].
pub const PAGE_SIZE: usize = 4096;

/// Rounds `value` up to the next multiple of `multiple`, which must be a
/// power of two.
fn round_up(value: usize, multiple: usize) -> usize {
    (value + multiple - 1) & !(multiple - 1)
}

/// External collaborator providing OS virtual memory to the allocator.
///
/// `SlabAllocator` never returns memory obtained through this trait; slabs
/// are leaked by design (§3 Lifecycle).
pub trait PageMapper {
    /// Maps a fresh region of at least `len` bytes aligned to `align`.
    /// Returns `None` on failure (out of memory / OS refusal).
    fn map(&self, len: usize, align: usize) -> Option<NonNull<u8>>;

    /// Unmaps a region previously returned by `map` with the same `len`.
    ///
    /// # Safety
    /// `ptr` must have been returned by `map(len, _)` on `self` and not
    /// already unmapped.
    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize);

    /// Grows or shrinks a mapped region in place if possible, or relocates it
    /// if `move_permitted` and in-place resize is not. Returns `None` on
    /// failure, in which case the original mapping is left untouched.
    ///
    /// # Safety
    /// `ptr` must have been returned by `map`/`realloc` on `self` with size
    /// `old_len`.
    unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        old_len: usize,
        new_len: usize,
        move_permitted: bool,
    ) -> Option<NonNull<u8>>;
}

/// The OS-backed [`PageMapper`]: `mmap`/`munmap` on Unix, `VirtualAlloc`/
/// `VirtualFree` on Windows, mirroring the teacher's `syscall::unix`/
/// `syscall::windows` split.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPageMapper;

impl PageMapper for SystemPageMapper {
    fn map(&self, len: usize, align: usize) -> Option<NonNull<u8>> {
        sys::map(len, align)
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize) {
        sys::unmap(ptr, len);
    }

    unsafe fn realloc(
        &self,
        ptr: NonNull<u8>,
        old_len: usize,
        new_len: usize,
        move_permitted: bool,
    ) -> Option<NonNull<u8>> {
        if new_len <= old_len {
            return Some(ptr);
        }
        if !move_permitted {
            return None;
        }
        let new_ptr = sys::map(new_len, core::mem::align_of::<usize>())?;
        core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_len);
        sys::unmap(ptr, old_len);
        Some(new_ptr)
    }
}

#[cfg(unix)]
mod sys {
    use super::*;
    use libc::{c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};

    unsafe fn mmap_anon(len: usize) -> *mut c_void {
        mmap(core::ptr::null_mut(), len, PROT_READ | PROT_WRITE, MAP_PRIVATE | MAP_ANONYMOUS, -1, 0)
    }

    pub(super) fn map(len: usize, align: usize) -> Option<NonNull<u8>> {
        if align <= PAGE_SIZE {
            // mmap always returns page-aligned memory, which satisfies every
            // alignment at or below one page.
            let ptr = unsafe { mmap_anon(len) };
            return if ptr == MAP_FAILED { None } else { NonNull::new(ptr as *mut u8) };
        }

        // `align` exceeds a page: over-map by `align` extra bytes, then trim
        // the unaligned head and the rounded-up tail back to the OS so only
        // the aligned, exactly-`used`-byte region stays mapped. Both trim
        // boundaries land on page boundaries (`align` is a power of two no
        // smaller than `PAGE_SIZE`), so the trims never clip into the kept
        // region.
        let used = round_up(len, PAGE_SIZE);
        let over_len = used + align;
        let base = unsafe { mmap_anon(over_len) };
        if base == MAP_FAILED {
            return None;
        }
        let base_addr = base as usize;
        let aligned_addr = round_up(base_addr, align);
        let head_slack = aligned_addr - base_addr;
        let tail_start = aligned_addr + used;
        let tail_slack = (base_addr + over_len) - tail_start;

        unsafe {
            if head_slack > 0 {
                munmap(base_addr as *mut c_void, head_slack);
            }
            if tail_slack > 0 {
                munmap(tail_start as *mut c_void, tail_slack);
            }
        }
        NonNull::new(aligned_addr as *mut u8)
    }

    pub(super) unsafe fn unmap(ptr: NonNull<u8>, len: usize) {
        munmap(ptr.as_ptr() as *mut c_void, len);
    }
}

#[cfg(windows)]
mod sys {
    use super::*;
    use windows_sys::Win32::System::Memory::{
        VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
    };

    pub(super) fn map(len: usize, align: usize) -> Option<NonNull<u8>> {
        if align <= PAGE_SIZE {
            let ptr =
                unsafe { VirtualAlloc(core::ptr::null_mut(), len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
            return NonNull::new(ptr as *mut u8);
        }

        // VirtualFree only accepts the exact base address VirtualAlloc
        // returned, so the Unix over-map-and-trim trick does not apply:
        // reserve a region large enough to guarantee an aligned sub-address
        // exists, release the reservation, then commit directly at that
        // address. This leaves a brief window in which another allocation on
        // this process could claim the address first; acceptable here since
        // nothing else in this crate calls into the OS allocator concurrently.
        let over_len = round_up(len, PAGE_SIZE) + align;
        let probe = unsafe { VirtualAlloc(core::ptr::null_mut(), over_len, MEM_RESERVE, PAGE_READWRITE) };
        if probe.is_null() {
            return None;
        }
        let aligned_addr = round_up(probe as usize, align);
        unsafe { VirtualFree(probe, 0, MEM_RELEASE) };
        let ptr =
            unsafe { VirtualAlloc(aligned_addr as *mut _, len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) };
        NonNull::new(ptr as *mut u8)
    }

    pub(super) unsafe fn unmap(ptr: NonNull<u8>, _len: usize) {
        // MEM_RELEASE frees the entire region reserved by VirtualAlloc; size must be 0.
        VirtualFree(ptr.as_ptr() as *mut _, 0, MEM_RELEASE);
    }
}

pub use test_double::TestPageMapper;

/// A heap-backed [`PageMapper`] used by the test suite, so tests never depend
/// on real OS page mapping and can simulate OOM deterministically.
/// Kept in the main build (not `#[cfg(test)]`) so integration tests under
/// `tests/` can use it as an ordinary dependency of this crate.
mod test_double {
    use super::*;
    use core::cell::RefCell;
    use std::alloc::{alloc, dealloc, Layout};

    struct Region {
        ptr: NonNull<u8>,
        layout: Layout,
    }

    /// See the module-level doc comment.
    pub struct TestPageMapper {
        inner: RefCell<Inner>,
    }

    struct Inner {
        regions: Vec<Region>,
        maps_remaining: Option<usize>,
    }

    impl TestPageMapper {
        /// A mapper with unlimited capacity.
        pub fn new() -> Self {
            Self { inner: RefCell::new(Inner { regions: Vec::new(), maps_remaining: None }) }
        }

        /// Makes the next `n` calls to `map` succeed and every call after
        /// that fail, simulating page-mapper exhaustion.
        pub fn fail_after(n: usize) -> Self {
            Self { inner: RefCell::new(Inner { regions: Vec::new(), maps_remaining: Some(n) }) }
        }

        /// Number of regions currently considered mapped.
        pub fn live_regions(&self) -> usize {
            self.inner.borrow().regions.len()
        }
    }

    impl Default for TestPageMapper {
        fn default() -> Self {
            Self::new()
        }
    }

    impl PageMapper for TestPageMapper {
        fn map(&self, len: usize, align: usize) -> Option<NonNull<u8>> {
            let mut inner = self.inner.borrow_mut();
            if let Some(remaining) = inner.maps_remaining {
                if remaining == 0 {
                    return None;
                }
                inner.maps_remaining = Some(remaining - 1);
            }
            let align = align.max(1).next_power_of_two();
            let layout = Layout::from_size_align(len.max(1), align).ok()?;
            let ptr = NonNull::new(unsafe { alloc(layout) })?;
            inner.regions.push(Region { ptr, layout });
            Some(ptr)
        }

        unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize) {
            let mut inner = self.inner.borrow_mut();
            if let Some(pos) = inner.regions.iter().position(|r| r.ptr == ptr && r.layout.size() == len.max(1)) {
                let region = inner.regions.remove(pos);
                dealloc(region.ptr.as_ptr(), region.layout);
            }
        }

        unsafe fn realloc(
            &self,
            ptr: NonNull<u8>,
            old_len: usize,
            new_len: usize,
            move_permitted: bool,
        ) -> Option<NonNull<u8>> {
            if new_len <= old_len {
                return Some(ptr);
            }
            if !move_permitted {
                return None;
            }
            let new_ptr = self.map(new_len, 1)?;
            core::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), old_len);
            self.unmap(ptr, old_len);
            Some(new_ptr)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn map_and_unmap_roundtrip() {
            let m = TestPageMapper::new();
            let p = m.map(4096, 4096).unwrap();
            assert_eq!(m.live_regions(), 1);
            unsafe { m.unmap(p, 4096) };
            assert_eq!(m.live_regions(), 0);
        }

        #[test]
        fn fail_after_exhausts() {
            let m = TestPageMapper::fail_after(1);
            assert!(m.map(4096, 4096).is_some());
            assert!(m.map(4096, 4096).is_none());
        }

        #[test]
        fn honors_alignment_beyond_one_page() {
            let m = TestPageMapper::new();
            let p = m.map(256, 8192).unwrap();
            assert_eq!(p.as_ptr() as usize % 8192, 0);
            unsafe { m.unmap(p, 256) };
            assert_eq!(m.live_regions(), 0);
        }
    }
}
