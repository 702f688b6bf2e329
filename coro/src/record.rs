//! The coroutine record: the data container linking a stack, a saved
//! register image, and the bookkeeping fields the lifecycle core and await
//! protocol mutate at every control transfer.

use core::cell::Cell;
use core::ptr::NonNull;

use coro_arch::{ExtraState, ResolvedSettings, Settings};

use crate::stack::Stack;

/// Where a coroutine is in its lifecycle. See the state machine in
/// `lifecycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Not a valid coroutine — returned for null/corrupted handles.
    None,
    /// Created, never started (or ran to completion and can be re-started).
    Unscheduled,
    /// Suspended mid-execution; holds a consistent saved register image.
    Suspended,
    /// Currently the thread's executing context.
    Running,
}

/// Entry-point callback supplied to [`crate::lifecycle::start`]. Matches the
/// reference library's `cco_coroutine_callback` (`void (*)(void* argument)`).
pub type Callback = unsafe extern "C" fn(arg: *mut u8);

/// Await callback supplied to the await protocol. Matches the reference
/// library's `cco_await_callback` (`bool (*)(cco_coroutine*, void*)`).
pub type AwaitCallback = unsafe extern "C" fn(coroutine: Coroutine, arg: *mut u8) -> bool;

pub(crate) struct Record {
    /// `None` only for the main-context sentinel, which runs on the
    /// thread's original stack rather than an allocated one.
    pub(crate) stack: Option<Stack>,
    pub(crate) arch_settings: Settings,
    pub(crate) resolved_settings: ResolvedSettings,
    pub(crate) extra_state: Cell<ExtraState>,
    /// The saved stack pointer — this crate's `saved_context` field. On
    /// x86_64/aarch64 the rest of the saved register image lives on the
    /// stack itself at the address this points to, exactly as in
    /// `context_switch_regular`; there is no separately allocated buffer.
    pub(crate) saved_sp: Cell<usize>,
    pub(crate) caller: Cell<Option<NonNull<Record>>>,
    pub(crate) callback: Cell<Option<Callback>>,
    pub(crate) arg: Cell<*mut u8>,
    pub(crate) return_slot: Cell<*mut u8>,
    pub(crate) state: Cell<State>,
    pub(crate) await_ready: Cell<Option<AwaitCallback>>,
    pub(crate) await_on_suspend: Cell<Option<AwaitCallback>>,
    pub(crate) is_main_sentinel: bool,
}

/// A handle to a coroutine record.
///
/// This is a thin, `Copy` wrapper around a raw pointer, deliberately — the
/// external interface (§6) is a set of free operations over handles, the
/// same shape as the reference C library's `cco_coroutine*`. Destroying a
/// coroutine invalidates every outstanding handle to it; the type system
/// cannot express that for a C-shaped API any more than the reference
/// library's pointers could, so callers are expected to stop using a handle
/// once they have passed it to [`crate::lifecycle::destroy`].
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Coroutine(pub(crate) NonNull<Record>);

impl Coroutine {
    pub(crate) fn as_record(&self) -> &Record {
        // SAFETY: callers only ever construct a `Coroutine` from a
        // `NonNull<Record>` that outlives the handle (see the type's doc
        // comment on the lifetime contract this crate asks of its callers).
        unsafe { self.0.as_ref() }
    }
}

impl core::fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Coroutine({:p})", self.0.as_ptr())
    }
}
