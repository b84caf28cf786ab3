//! Optional `GlobalAlloc` adapter built on a thread-local dispatch pattern.
//!
//! This is an opt-in enrichment, not the default way to use the crate: a
//! [`crate::allocator::SlabAllocator`] is `!Sync`, so it cannot itself be a
//! `#[global_allocator]` static. Instead each thread gets its own instance in
//! thread-local storage, installed explicitly via [`install`]. Until a thread
//! calls `install`, every allocation on that thread passes straight through
//! to [`std::alloc::System`].

use core::alloc::{GlobalAlloc, Layout};
use core::cell::{Cell, RefCell};
use core::ptr::NonNull;
use std::alloc::System;

use crate::allocator::SlabAllocator;
use crate::config::AllocatorConfig;
use crate::page::SystemPageMapper;

thread_local! {
    static ALLOCATOR: RefCell<Option<SlabAllocator<SystemPageMapper>>> = const { RefCell::new(None) };
    static IN_ALLOCATOR: Cell<bool> = const { Cell::new(false) };
}

/// Builds a [`SlabAllocator`] from `config` and installs it as this thread's
/// allocator for [`DispatchGlobalAlloc`]. Replaces any allocator previously
/// installed on this thread.
///
/// Uses [`SlabAllocator::new_or_panic`]: a global allocator either comes up
/// with a valid configuration or the program cannot usefully continue, so
/// there is no embedding code left to hand a `Result` to (§7).
pub fn install(config: AllocatorConfig) {
    let allocator = SlabAllocator::new_or_panic(config, SystemPageMapper);
    ALLOCATOR.with(|cell| *cell.borrow_mut() = Some(allocator));
}

/// Removes this thread's installed allocator, reverting it to
/// [`std::alloc::System`].
pub fn uninstall() {
    ALLOCATOR.with(|cell| *cell.borrow_mut() = None);
}

/// A `#[global_allocator]` candidate that dispatches to whichever
/// [`SlabAllocator`] is [`install`]-ed on the current thread, falling back to
/// [`std::alloc::System`] on threads with none installed.
///
/// ```rust,ignore
/// #[global_allocator]
/// static GLOBAL: segslab::global::DispatchGlobalAlloc = segslab::global::DispatchGlobalAlloc;
/// ```
pub struct DispatchGlobalAlloc;

struct RecursionGuard;

impl RecursionGuard {
    fn enter() -> Option<Self> {
        if IN_ALLOCATOR.get() {
            None
        } else {
            IN_ALLOCATOR.set(true);
            Some(Self)
        }
    }
}

impl Drop for RecursionGuard {
    fn drop(&mut self) {
        IN_ALLOCATOR.set(false);
    }
}

unsafe impl GlobalAlloc for DispatchGlobalAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let Some(_guard) = RecursionGuard::enter() else {
            return System.alloc(layout);
        };
        ALLOCATOR.with(|cell| match cell.borrow_mut().as_mut() {
            Some(allocator) => allocator
                .alloc(layout.size(), layout.align())
                .map_or(core::ptr::null_mut(), NonNull::as_ptr),
            None => System.alloc(layout),
        })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let Some(nn) = NonNull::new(ptr) else { return };
        let Some(_guard) = RecursionGuard::enter() else {
            return System.dealloc(ptr, layout);
        };
        ALLOCATOR.with(|cell| match cell.borrow_mut().as_mut() {
            Some(allocator) => allocator.free(nn, layout.size(), layout.align()),
            None => System.dealloc(ptr, layout),
        });
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Some(nn) = NonNull::new(ptr) else { return core::ptr::null_mut() };
        let Some(_guard) = RecursionGuard::enter() else {
            return System.realloc(ptr, layout, new_size);
        };
        ALLOCATOR.with(|cell| match cell.borrow_mut().as_mut() {
            Some(allocator) => {
                match allocator.remap(nn, layout.size(), layout.align(), new_size) {
                    Some(remapped) => remapped.as_ptr(),
                    None => core::ptr::null_mut(),
                }
            }
            None => System.realloc(ptr, layout, new_size),
        })
    }
}
