//! Allocates and frees a coroutine's stack buffer.
//!
//! Deliberately thin: this is the ambient plumbing the component overview
//! budgets at roughly 5% of the crate, not a pluggable allocator
//! abstraction — every coroutine's stack and record come from the same
//! global allocator, matching how `context_switch_regular`'s own callers
//! (the reference workspace's task spawn path) allocate a `Task`'s stack.
//!
//! Named `stack` rather than `alloc` so it doesn't shadow the sysroot
//! `alloc` crate the rest of this crate names directly (`alloc::boxed::Box`
//! et al.) for its `no_std` build.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::error::ErrorKind;

/// A stack buffer owned exclusively by one coroutine record.
///
/// The underlying allocation is `usable_size + headroom` bytes: `headroom`
/// extra bytes sit above the caller-requested region so that `prepare`'s
/// initial register image has somewhere to live that isn't carved out of
/// the stack the caller actually asked for. Everything this type exposes to
/// the rest of the crate except [`Self::true_top`] is phrased in terms of
/// `usable_size` alone — callers of [`Self::size`] see exactly what they
/// requested.
pub(crate) struct Stack {
    base: NonNull<u8>,
    usable_size: usize,
    headroom: usize,
    layout: Layout,
}

impl Stack {
    pub(crate) fn allocate(usable_size: usize, headroom: usize) -> Result<Self, ErrorKind> {
        if usable_size == 0 {
            return Err(ErrorKind::InvalidArgument);
        }
        let total = usable_size.checked_add(headroom).ok_or(ErrorKind::InvalidArgument)?;
        // 16-byte alignment covers every arch port's saved-area alignment
        // requirement (the x86_64 combined FPU/SSE block needs at least
        // that much).
        let layout = Layout::from_size_align(total, 16).map_err(|_| ErrorKind::InvalidArgument)?;
        // SAFETY: `layout` has non-zero size, checked above.
        let ptr = unsafe { std_alloc::alloc(layout) };
        let base = NonNull::new(ptr).ok_or(ErrorKind::NoMemory)?;
        Ok(Stack { base, usable_size, headroom, layout })
    }

    pub(crate) fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// The caller-requested size, exactly as passed to [`Self::allocate`] —
    /// never includes the reserved-register headroom.
    pub(crate) fn size(&self) -> usize {
        self.usable_size
    }

    /// One-past-the-end of the caller-visible region, i.e. the boundary
    /// [`crate::introspect::stack_usage`] measures against.
    pub(crate) fn top(&self) -> *mut u8 {
        // SAFETY: `usable_size` bytes starting at `base` are part of this
        // allocation; a pointer one-past-the-end is always valid to form.
        unsafe { self.base.as_ptr().add(self.usable_size) }
    }

    /// One-past-the-end of the *true* allocation, headroom included. This is
    /// the `stack_top` [`coro_arch::prepare`] writes the initial register
    /// image downward from, so that image lands in the headroom rather than
    /// the caller's usable region.
    pub(crate) fn true_top(&self) -> *mut u8 {
        // SAFETY: `usable_size + headroom` bytes were allocated starting at
        // `base` (see `allocate`); a pointer one-past-the-end is always
        // valid to form.
        unsafe { self.base.as_ptr().add(self.usable_size + self.headroom) }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // SAFETY: `base`/`layout` match the allocation made in `allocate`.
        unsafe { std_alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

/// Indirection over `std`/bare `alloc` so the rest of this module reads the
/// same regardless of which one backs it, matching the `std` Cargo feature
/// documented at the crate root.
#[cfg(feature = "std")]
mod std_alloc {
    pub(crate) use std::alloc::{alloc, dealloc};
}

#[cfg(not(feature = "std"))]
mod std_alloc {
    extern crate alloc;
    pub(crate) use alloc::alloc::{alloc, dealloc};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_is_rejected() {
        assert_eq!(Stack::allocate(0, 64).unwrap_err(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn top_is_usable_size_bytes_past_base() {
        let stack = Stack::allocate(4096, 128).unwrap();
        assert_eq!(stack.top() as usize - stack.base() as usize, 4096);
        assert_eq!(stack.size(), 4096);
    }

    #[test]
    fn true_top_includes_headroom() {
        let stack = Stack::allocate(4096, 128).unwrap();
        assert_eq!(stack.true_top() as usize - stack.base() as usize, 4096 + 128);
        assert_eq!(stack.true_top() as usize - stack.top() as usize, 128);
    }

    #[test]
    fn zero_headroom_collapses_top_and_true_top() {
        let stack = Stack::allocate(4096, 0).unwrap();
        assert_eq!(stack.top(), stack.true_top());
    }
}
