//! The await protocol: a ready/on-suspend loop that lets an external
//! scheduler (a timer, an I/O reactor, a synchronization primitive) drive
//! the suspended side of a wait without this crate knowing anything about
//! what is being waited for.
//!
//! This is the "double-chance" pattern familiar from language-level async
//! runtimes (poll, then park): [`await_with`] first asks the `ready`
//! callback whether the operation has already completed, and only suspends
//! if not, at which point `on_suspend` is given the chance to take
//! responsibility for resuming the coroutine later. Neither callback knows
//! or cares whether it is backing a timer, a socket, or a mutex — that
//! knowledge lives entirely above this crate, in the scheduler that
//! registers the callbacks.

use crate::error::{self, ErrorKind};
use crate::lifecycle;
use crate::record::{AwaitCallback, Coroutine, State};

/// Always reports the awaited operation as already complete. Registering
/// this as a coroutine's `ready` callback (or passing it to [`await_with`])
/// makes every wait on it synchronous: the loop never suspends.
pub const AWAIT_ALWAYS_READY: AwaitCallback = always_ready;

/// Always reports the awaited operation as not yet complete. Registering
/// this as a coroutine's `ready` callback makes every wait on it suspend at
/// least once, relying entirely on `on_suspend` to arrange a later resume.
/// This is also the default every freshly `start`ed coroutine is reset to.
pub const AWAIT_NEVER_READY: AwaitCallback = never_ready;

unsafe extern "C" fn always_ready(_coroutine: Coroutine, _arg: *mut u8) -> bool {
    true
}

pub(crate) unsafe extern "C" fn never_ready(_coroutine: Coroutine, _arg: *mut u8) -> bool {
    false
}

/// Replaces the current coroutine's default `ready`/`on_suspend` callbacks,
/// used by [`await_value`]'s no-argument form. A `None` `ready` behaves as
/// "never short-circuits" (equivalent to [`AWAIT_NEVER_READY`]); a `None`
/// `on_suspend` behaves as "always takes responsibility immediately" —
/// matching the behavior [`await_with`] already gives a `None` of either.
///
/// Invalid from the thread's main context.
pub fn register_awaitable(ready: Option<AwaitCallback>, on_suspend: Option<AwaitCallback>) {
    let current = lifecycle::current();
    // SAFETY: `current` is always a live record (the sentinel, if nothing
    // else has been started on this thread).
    let rec = unsafe { current.as_ref() };
    if rec.is_main_sentinel {
        log::debug!("register_awaitable: rejected, called from the main sentinel");
        error::set(ErrorKind::InvalidContext);
        return;
    }
    rec.await_ready.set(ready);
    rec.await_on_suspend.set(on_suspend);
    error::set(ErrorKind::Ok);
}

/// Runs the await loop using the current coroutine's registered default
/// callbacks (see [`register_awaitable`]). Invalid from the thread's main
/// context.
pub fn await_value(arg: *mut u8) {
    let current = lifecycle::current();
    // SAFETY: see `register_awaitable`.
    let rec = unsafe { current.as_ref() };
    if rec.is_main_sentinel {
        log::debug!("await: rejected, called from the main sentinel");
        error::set(ErrorKind::InvalidContext);
        return;
    }
    let ready = rec.await_ready.get().unwrap_or(never_ready);
    let on_suspend = rec.await_on_suspend.get();
    run_loop(current, ready, on_suspend, arg);
}

/// Runs the await loop with a one-shot override of the `ready`/`on_suspend`
/// callbacks, ignoring whatever is currently registered on the coroutine.
/// At least one of `ready`/`on_suspend` must be non-`None`. Invalid from the
/// thread's main context.
pub fn await_with(ready: Option<AwaitCallback>, on_suspend: Option<AwaitCallback>, arg: *mut u8) {
    if ready.is_none() && on_suspend.is_none() {
        log::debug!("await_with: rejected, both callbacks are null");
        error::set(ErrorKind::InvalidArgument);
        return;
    }
    let current = lifecycle::current();
    // SAFETY: see `register_awaitable`.
    let rec = unsafe { current.as_ref() };
    if rec.is_main_sentinel {
        log::debug!("await_with: rejected, called from the main sentinel");
        error::set(ErrorKind::InvalidContext);
        return;
    }
    let ready = ready.unwrap_or(never_ready);
    run_loop(current, ready, on_suspend, arg);
}

/// The ready/on-suspend loop shared by [`await_value`] and [`await_with`].
///
/// `ready` is queried first; if it reports completion the loop returns
/// without ever suspending (P10). Otherwise the coroutine is marked
/// `Suspended` *before* `on_suspend` runs, so a scheduler invoked from
/// `on_suspend` may legitimately resume this coroutine as soon as it takes
/// responsibility for it (§4.5's ordering rule) — and only then does this
/// loop perform the actual switch out. If `on_suspend` declines (`false`),
/// the coroutine is marked `Running` again and the loop re-queries `ready`
/// (P11); a missing `on_suspend` is treated as always accepting.
fn run_loop(
    current: core::ptr::NonNull<crate::record::Record>,
    ready: AwaitCallback,
    on_suspend: Option<AwaitCallback>,
    arg: *mut u8,
) {
    let handle = Coroutine(current);
    loop {
        // SAFETY: `ready` is a valid callback supplied by the caller (either
        // registered via `register_awaitable` or passed to `await_with`);
        // `handle` outlives this call.
        if unsafe { ready(handle, arg) } {
            error::set(ErrorKind::Ok);
            return;
        }

        // SAFETY: `current` is the running record.
        unsafe { current.as_ref() }.state.set(State::Suspended);

        let accepted = match on_suspend {
            // SAFETY: same as the `ready` call above.
            Some(cb) => unsafe { cb(handle, arg) },
            None => true,
        };

        if accepted {
            log::trace!("await: suspending {:p}", current.as_ptr());
            // SAFETY: `current`'s state was just set to `Suspended` above,
            // satisfying `switch_out_suspended`'s precondition.
            unsafe { lifecycle::switch_out_suspended(current) };
            error::set(ErrorKind::Ok);
            return;
        }

        // `on_suspend` declined: undo the state change and retry `ready`.
        // SAFETY: same as above.
        unsafe { current.as_ref() }.state.set(State::Running);
    }
}
