//! The lifecycle core: create/destroy/start/suspend/yield/return/resume and
//! the per-thread current-coroutine bookkeeping that backs them.

use alloc::boxed::Box;
use core::cell::Cell;
use core::ptr::NonNull;

use coro_arch::{ExtraState, Settings};

use crate::stack::Stack;
use crate::error::{self, ErrorKind};
use crate::record::{Callback, Coroutine, Record, State};

#[cfg(feature = "std")]
std::thread_local! {
    static CURRENT: Cell<Option<NonNull<Record>>> = Cell::new(None);
}

#[cfg(not(feature = "std"))]
#[thread_local]
static CURRENT: Cell<Option<NonNull<Record>>> = Cell::new(None);

fn get_current_slot() -> Option<NonNull<Record>> {
    #[cfg(feature = "std")]
    return CURRENT.with(|c| c.get());
    #[cfg(not(feature = "std"))]
    return CURRENT.get();
}

pub(crate) fn set_current_slot(value: NonNull<Record>) {
    #[cfg(feature = "std")]
    CURRENT.with(|c| c.set(Some(value)));
    #[cfg(not(feature = "std"))]
    CURRENT.set(Some(value));
}

/// The record currently executing on this thread, creating this thread's
/// main-context sentinel on first use. Never returns a dangling pointer:
/// the sentinel is leaked for the lifetime of the thread (it is never
/// destroyed, per invariant I6), and every other record outlives every
/// `Coroutine` handle that can reach it (handles only become dangling after
/// `destroy`, which is a documented caller contract, not a soundness hole
/// this crate can close for a C-shaped API).
pub(crate) fn current() -> NonNull<Record> {
    if let Some(ptr) = get_current_slot() {
        return ptr;
    }
    let settings = coro_arch::default_settings();
    let sentinel = Box::new(Record {
        stack: None,
        arch_settings: settings,
        resolved_settings: coro_arch::resolve(settings),
        extra_state: Cell::new(ExtraState::zeroed()),
        saved_sp: Cell::new(0),
        caller: Cell::new(None),
        callback: Cell::new(None),
        arg: Cell::new(core::ptr::null_mut()),
        return_slot: Cell::new(core::ptr::null_mut()),
        state: Cell::new(State::Running),
        await_ready: Cell::new(None),
        await_on_suspend: Cell::new(None),
        is_main_sentinel: true,
    });
    let ptr = NonNull::from(Box::leak(sentinel));
    set_current_slot(ptr);
    ptr
}

/// Saves `prev`'s register groups (per its settings) and loads `next`'s,
/// transferring control to `next`. Returns only once some later switch
/// brings control back to `prev`.
///
/// # Safety
/// `prev` must be the record currently executing on this thread; `next`
/// must hold a saved context produced by [`coro_arch::prepare`] or a
/// previous call to this function.
pub(crate) unsafe fn perform_switch(prev: NonNull<Record>, next: NonNull<Record>) {
    let prev_ref = prev.as_ref();
    let next_ref = next.as_ref();

    let mut prev_extra = prev_ref.extra_state.get();
    coro_arch::save_extra(prev_ref.arch_settings, &mut prev_extra);
    prev_ref.extra_state.set(prev_extra);

    let mut sp_slot = prev_ref.saved_sp.get();
    let next_sp = next_ref.saved_sp.get();
    coro_arch::switch(&mut sp_slot, next_sp, prev_ref.resolved_settings, next_ref.resolved_settings);
    prev_ref.saved_sp.set(sp_slot);

    let next_extra = next_ref.extra_state.get();
    coro_arch::restore_extra(next_ref.arch_settings, &next_extra);
}

/// Reached via the `ret` at the tail of [`coro_arch::switch`], never via an
/// ordinary `call` — so it takes no arguments; the record pointer [`prepare`]
/// stashed in the arch port's "first register" is recovered explicitly with
/// [`coro_arch::read_first_register`] instead.
unsafe extern "C" fn trampoline() -> ! {
    let record_ptr = coro_arch::read_first_register() as *mut Record;
    let record = NonNull::new_unchecked(record_ptr);
    record.as_ref().state.set(State::Running);
    log::trace!("entry: {:p}", record_ptr);
    if let Some(callback) = record.as_ref().callback.get() {
        callback(record.as_ref().arg.get());
    }
    return_value(core::ptr::null_mut());
    unreachable!("a coroutine's stack frame is never re-entered after it returns")
}

/// Creates a new coroutine with its own stack, in the `Unscheduled` state.
/// `settings` of `None` selects this architecture's default register
/// groups.
pub fn create(stack_size: usize, settings: Option<Settings>) -> Option<Coroutine> {
    if stack_size == 0 {
        log::debug!("create: rejected, stack_size == 0");
        error::set(ErrorKind::InvalidArgument);
        return None;
    }
    let settings = settings.unwrap_or_else(coro_arch::default_settings);
    let headroom = coro_arch::saved_area_size(settings);
    let stack = match Stack::allocate(stack_size, headroom) {
        Ok(stack) => stack,
        Err(kind) => {
            log::debug!("create: allocation failed: {kind}");
            error::set(kind);
            return None;
        }
    };
    let record = Box::new(Record {
        stack: Some(stack),
        arch_settings: settings,
        resolved_settings: coro_arch::resolve(settings),
        extra_state: Cell::new(ExtraState::zeroed()),
        saved_sp: Cell::new(0),
        caller: Cell::new(None),
        callback: Cell::new(None),
        arg: Cell::new(core::ptr::null_mut()),
        return_slot: Cell::new(core::ptr::null_mut()),
        state: Cell::new(State::Unscheduled),
        await_ready: Cell::new(None),
        await_on_suspend: Cell::new(None),
        is_main_sentinel: false,
    });
    let ptr = NonNull::from(Box::leak(record));
    log::trace!("create: {:p} ({} bytes)", ptr.as_ptr(), stack_size);
    error::set(ErrorKind::Ok);
    Some(Coroutine(ptr))
}

/// Frees a coroutine's stack and record. The coroutine must be
/// `Unscheduled` or `Suspended`, and must not be the currently running
/// record.
pub fn destroy(coroutine: Option<Coroutine>) {
    let Some(coroutine) = coroutine else {
        log::debug!("destroy: rejected, null coroutine");
        error::set(ErrorKind::InvalidArgument);
        return;
    };
    let record = coroutine.0;
    // SAFETY: `record` is a live `Record` as long as the caller has not
    // already destroyed it; see `Coroutine`'s documented handle contract.
    let rec = unsafe { record.as_ref() };
    if rec.is_main_sentinel {
        log::debug!("destroy: rejected, {:p} is the main sentinel", record.as_ptr());
        error::set(ErrorKind::InvalidArgument);
        return;
    }
    if record == current() {
        log::debug!("destroy: rejected, {:p} is the current record", record.as_ptr());
        error::set(ErrorKind::InvalidContext);
        return;
    }
    log::trace!("destroy: {:p}", record.as_ptr());
    // SAFETY: `record` was produced by `Box::leak` in `create` and has not
    // been freed yet (the checks above reject the only live-reference case
    // this crate can observe).
    unsafe { drop(Box::from_raw(record.as_ptr())) };
    error::set(ErrorKind::Ok);
}

/// Runs `callback(arg)` as `coroutine`, returning once it suspends, yields,
/// or returns. `coroutine` must be `Unscheduled`.
pub fn start(coroutine: Option<Coroutine>, callback: Callback, arg: *mut u8) -> bool {
    let Some(coroutine) = coroutine else {
        log::debug!("start: rejected, null coroutine");
        error::set(ErrorKind::InvalidArgument);
        return false;
    };
    let record = coroutine.0;
    let rec = unsafe { record.as_ref() };
    if rec.is_main_sentinel {
        log::debug!("start: rejected, {:p} is the main sentinel", record.as_ptr());
        error::set(ErrorKind::InvalidArgument);
        return false;
    }
    if rec.state.get() != State::Unscheduled {
        log::debug!("start: rejected, {:p} is {:?}", record.as_ptr(), rec.state.get());
        error::set(ErrorKind::Scheduled);
        return false;
    }

    rec.callback.set(Some(callback));
    rec.arg.set(arg);
    rec.return_slot.set(core::ptr::null_mut());
    rec.await_ready.set(Some(crate::await_proto::never_ready));
    rec.await_on_suspend.set(None);

    let caller = current();
    rec.caller.set(Some(caller));

    let stack_top = rec.stack.as_ref().expect("non-sentinel coroutine owns a stack").true_top();
    // SAFETY: `stack_top` is the one-past-the-end address of the true
    // allocation backing a freshly allocated, unused stack, which reserves
    // at least `coro_arch::saved_area_size(rec.arch_settings)` bytes of
    // headroom above the caller-visible region for exactly this write.
    let sp = unsafe { coro_arch::prepare(stack_top, trampoline, record.as_ptr() as *mut u8, rec.arch_settings) };
    rec.saved_sp.set(sp);

    set_current_slot(record);
    log::trace!("start: {:p}", record.as_ptr());
    // SAFETY: `caller` is the currently running record; `record` was just
    // prepared above.
    unsafe { perform_switch(caller, record) };
    set_current_slot(caller);

    error::set(ErrorKind::Ok);
    true
}

/// Returns the coroutine currently executing on this thread, or `None` if
/// called from the thread's main context.
pub fn this_coroutine() -> Option<Coroutine> {
    let current = current();
    error::set(ErrorKind::Ok);
    if unsafe { current.as_ref() }.is_main_sentinel {
        None
    } else {
        Some(Coroutine(current))
    }
}

/// Suspends the currently running coroutine, switching back to its caller.
/// Leaves the return slot untouched (unlike [`yield_value`]). Invalid from
/// the thread's main context.
pub fn suspend() {
    suspend_with(None)
}

/// Suspends the currently running coroutine after storing `value` as its
/// return value, switching back to its caller.
pub fn yield_value(value: *mut u8) {
    suspend_with(Some(value))
}

fn suspend_with(value: Option<*mut u8>) {
    let current = current();
    let rec = unsafe { current.as_ref() };
    if rec.is_main_sentinel {
        log::debug!("suspend: rejected, called from the main sentinel");
        error::set(ErrorKind::InvalidContext);
        return;
    }
    if let Some(value) = value {
        rec.return_slot.set(value);
    }
    rec.state.set(State::Suspended);
    let caller = rec.caller.get().expect("a running coroutine always has a caller");
    set_current_slot(caller);
    log::trace!("suspend: {:p}", current.as_ptr());
    // SAFETY: `current` is the running record; `caller` was the record that
    // switched into it.
    unsafe { perform_switch(current, caller) };
    error::set(ErrorKind::Ok);
}

/// Switches out of `current` back to its caller, assuming `current.state`
/// has already been set to `Suspended` by the caller of this function. Used
/// only by the await protocol, whose ordering rule (§4.5) requires the state
/// transition to be observable *before* the on-suspend callback runs, unlike
/// the plain [`suspend`]/[`yield_value`] path above where the two happen
/// back-to-back with nothing in between.
pub(crate) unsafe fn switch_out_suspended(current: NonNull<Record>) {
    let rec = current.as_ref();
    debug_assert_eq!(rec.state.get(), State::Suspended);
    let caller = rec.caller.get().expect("a running coroutine always has a caller");
    set_current_slot(caller);
    log::trace!("suspend (await): {:p}", current.as_ptr());
    perform_switch(current, caller);
}

/// Terminates the currently running coroutine, storing `value` as its
/// return value and switching back to its caller. The coroutine becomes
/// `Unscheduled` and may be started again. Invalid from the thread's main
/// context.
pub fn return_value(value: *mut u8) {
    let current = current();
    let rec = unsafe { current.as_ref() };
    if rec.is_main_sentinel {
        log::debug!("return: rejected, called from the main sentinel");
        error::set(ErrorKind::InvalidContext);
        return;
    }
    rec.return_slot.set(value);
    rec.state.set(State::Unscheduled);
    let caller = rec.caller.get().expect("a running coroutine always has a caller");
    set_current_slot(caller);
    log::trace!("return: {:p}", current.as_ptr());
    // SAFETY: same as `suspend_with`.
    unsafe { perform_switch(current, caller) };
    error::set(ErrorKind::Ok);
}

/// Resumes a suspended coroutine, switching into it and returning once it
/// next suspends, yields, or returns.
pub fn resume(coroutine: Option<Coroutine>) {
    let Some(coroutine) = coroutine else {
        log::debug!("resume: rejected, null coroutine");
        error::set(ErrorKind::InvalidArgument);
        return;
    };
    let record = coroutine.0;
    let rec = unsafe { record.as_ref() };
    // Resolved per this crate's explicit reading of the reference design:
    // the main-context sentinel is rejected as an invalid execution
    // context, not merely as "not suspended" — it can never be suspended
    // in the first place, but the two failure kinds are distinguishable and
    // callers benefit from the more specific one.
    if rec.is_main_sentinel {
        log::debug!("resume: rejected, {:p} is the main sentinel", record.as_ptr());
        error::set(ErrorKind::InvalidContext);
        return;
    }
    if rec.state.get() != State::Suspended {
        log::debug!("resume: rejected, {:p} is {:?}", record.as_ptr(), rec.state.get());
        error::set(ErrorKind::NotSuspended);
        return;
    }

    let caller = current();
    rec.caller.set(Some(caller));
    rec.state.set(State::Running);
    set_current_slot(record);
    log::trace!("resume: {:p}", record.as_ptr());
    // SAFETY: `record` is suspended with a saved context from a previous
    // `start`/`suspend`/`yield`/`resume`; `caller` is the running record.
    unsafe { perform_switch(caller, record) };
    set_current_slot(caller);

    error::set(ErrorKind::Ok);
}
