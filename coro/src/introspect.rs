//! Read-only accessors over a coroutine's state, stack sizing, and return
//! value. None of these participate in a context switch — they only ever
//! read fields the lifecycle core and await protocol already maintain.

use crate::error::{self, ErrorKind};
use crate::lifecycle;
use crate::record::{Coroutine, State};

/// The coroutine's current lifecycle state, or [`State::None`] (with error
/// set to [`ErrorKind::InvalidArgument`]) for a null handle.
pub fn state(coroutine: Option<Coroutine>) -> State {
    let Some(coroutine) = coroutine else {
        error::set(ErrorKind::InvalidArgument);
        return State::None;
    };
    error::set(ErrorKind::Ok);
    coroutine.as_record().state.get()
}

/// The configured size of the coroutine's stack, in bytes. `0` (with error
/// set to [`ErrorKind::InvalidContext`]) for the thread's main sentinel,
/// which owns no stack of its own.
pub fn stack_size(coroutine: Option<Coroutine>) -> usize {
    let Some(coroutine) = coroutine else {
        error::set(ErrorKind::InvalidArgument);
        return 0;
    };
    let rec = coroutine.as_record();
    match &rec.stack {
        Some(stack) => {
            error::set(ErrorKind::Ok);
            stack.size()
        }
        None => {
            error::set(ErrorKind::InvalidContext);
            0
        }
    }
}

/// How many bytes of the coroutine's stack are currently in use, under the
/// assumption of a downward-growing stack:
///
/// - if `coroutine` is the currently running record, reads the live stack
///   pointer via [`coro_arch::stack_pointer_probe`];
/// - if suspended, reads the stack pointer saved at the last switch out;
/// - if unscheduled, `0` (no frame is live).
///
/// `0` (with error set to [`ErrorKind::InvalidContext`]) for the main
/// sentinel.
pub fn stack_usage(coroutine: Option<Coroutine>) -> usize {
    let Some(coroutine) = coroutine else {
        error::set(ErrorKind::InvalidArgument);
        return 0;
    };
    let rec = coroutine.as_record();
    let Some(stack) = &rec.stack else {
        error::set(ErrorKind::InvalidContext);
        return 0;
    };
    let top = stack.top() as usize;
    let sp = match rec.state.get() {
        State::Unscheduled => {
            error::set(ErrorKind::Ok);
            return 0;
        }
        State::Running if lifecycle::current() == coroutine.0 => coro_arch::stack_pointer_probe(),
        _ => rec.saved_sp.get(),
    };
    error::set(ErrorKind::Ok);
    // `sp` can sit above `top` (inside the reserved headroom, never counted
    // as usable-stack consumption) right after `prepare` and before the
    // coroutine's own frames push past the caller-visible boundary.
    top.saturating_sub(sp)
}

/// The value stored by the coroutine's last `yield` or `return`. `null`
/// (with error set to [`ErrorKind::InvalidContext`]) for the main sentinel.
pub fn return_value(coroutine: Option<Coroutine>) -> *mut u8 {
    let Some(coroutine) = coroutine else {
        error::set(ErrorKind::InvalidArgument);
        return core::ptr::null_mut();
    };
    let rec = coroutine.as_record();
    if rec.is_main_sentinel {
        error::set(ErrorKind::InvalidContext);
        return core::ptr::null_mut();
    }
    error::set(ErrorKind::Ok);
    rec.return_slot.get()
}
