//! Per-thread last-error channel.
//!
//! Every public operation in this crate reports failure through its return
//! value (a `None`, `false`, `0`, or [`State::None`]) and, alongside it,
//! writes this thread's last-error slot — mirroring the reference C
//! coroutine library's `cco_errno_ptr()`/`cco_strerror()` pair rather than
//! Rust's usual `Result`. Mixing the two conventions in one API would be
//! worse than committing to the one the reference library actually
//! specifies, so none of the functions in [`crate::lifecycle`] or
//! [`crate::await_proto`] return `Result`.

use core::cell::Cell;
use core::fmt;

/// The kinds of failure a coroutine operation can report.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("no error")]
    Ok,
    #[error("out of memory")]
    NoMemory,
    #[error("operation is not valid from the current execution context")]
    InvalidContext,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("coroutine is already scheduled")]
    Scheduled,
    #[error("coroutine is not scheduled")]
    Unscheduled,
    #[error("coroutine is not suspended")]
    NotSuspended,
    #[error("coroutine is not running")]
    NotRunning,
}

impl Default for ErrorKind {
    fn default() -> Self {
        ErrorKind::Ok
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.strerror())
    }
}

impl ErrorKind {
    /// Human-readable description, independent of the `Display`/`Error`
    /// derive above, matching the reference library's `cco_strerror`
    /// free function — kept callable on a bare `ErrorKind` with no
    /// allocator or formatter required.
    pub fn strerror(self) -> &'static str {
        match self {
            ErrorKind::Ok => "no error",
            ErrorKind::NoMemory => "out of memory",
            ErrorKind::InvalidContext => "operation is not valid from the current execution context",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Scheduled => "coroutine is already scheduled",
            ErrorKind::Unscheduled => "coroutine is not scheduled",
            ErrorKind::NotSuspended => "coroutine is not suspended",
            ErrorKind::NotRunning => "coroutine is not running",
        }
    }
}

#[cfg(feature = "std")]
std::thread_local! {
    static LAST_ERROR: Cell<ErrorKind> = Cell::new(ErrorKind::Ok);
}

#[cfg(not(feature = "std"))]
#[thread_local]
static LAST_ERROR: Cell<ErrorKind> = Cell::new(ErrorKind::Ok);

/// Sets this thread's last-error value. Called by every public operation in
/// `lifecycle`/`await_proto`/`introspect` before returning, including on
/// success (where it is set to [`ErrorKind::Ok`]).
pub(crate) fn set(kind: ErrorKind) {
    #[cfg(feature = "std")]
    LAST_ERROR.with(|slot| slot.set(kind));
    #[cfg(not(feature = "std"))]
    LAST_ERROR.set(kind);
}

/// Returns this thread's last-error value, as left by the most recently
/// completed public operation.
pub fn last_error() -> ErrorKind {
    #[cfg(feature = "std")]
    return LAST_ERROR.with(|slot| slot.get());
    #[cfg(not(feature = "std"))]
    return LAST_ERROR.get();
}

/// Returns a pointer to this thread's last-error slot itself, mirroring the
/// reference library's `cco_errno_ptr() -> const cco_error*` rather than
/// copying the value out as [`last_error`] does. The pointee is valid to
/// dereference only on the thread that obtained it; the slot it points at
/// is thread-local, not `'static` in the cross-thread sense.
pub fn last_error_ptr() -> *const ErrorKind {
    #[cfg(feature = "std")]
    return LAST_ERROR.with(|slot| slot.as_ptr()).cast_const();
    #[cfg(not(feature = "std"))]
    return LAST_ERROR.as_ptr().cast_const();
}

/// Human-readable description of an error kind. Free function mirroring the
/// reference library's `cco_strerror`, for callers who prefer it over the
/// `Display` impl.
pub fn strerror(kind: ErrorKind) -> &'static str {
    kind.strerror()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ok() {
        assert_eq!(last_error(), ErrorKind::Ok);
    }

    #[test]
    fn set_then_read() {
        set(ErrorKind::NotSuspended);
        assert_eq!(last_error(), ErrorKind::NotSuspended);
        set(ErrorKind::Ok);
    }

    #[test]
    fn strerror_is_stable() {
        assert_eq!(strerror(ErrorKind::NoMemory), "out of memory");
    }

    #[test]
    fn last_error_ptr_reads_back_the_same_value_as_last_error() {
        set(ErrorKind::NoMemory);
        assert_eq!(unsafe { *last_error_ptr() }, ErrorKind::NoMemory);
        set(ErrorKind::Ok);
        assert_eq!(unsafe { *last_error_ptr() }, ErrorKind::Ok);
    }
}
