//! User-space stackful coroutines: symmetric context switching within a
//! single operating-system thread.
//!
//! A [`Coroutine`] owns a private stack and a saved register image and can
//! be entered, suspended, resumed, and finalized by cooperative control
//! transfers. There is no scheduler, I/O reactor, or timer wheel here — just
//! the context-switch primitive and the [`await_proto`] hook that lets one
//! be layered on top without this crate knowing anything about what it is
//! waiting for.
//!
//! The hard, per-architecture register plumbing lives in the sibling
//! `coro_arch` crate (see that crate's docs); this crate is the facade that
//! builds the coroutine record, lifecycle state machine, await protocol,
//! error channel, and introspection accessors on top of it, the same way
//! the reference kernel workspace this crate is descended from splits
//! `context_switch_regular`/`_sse`/`_avx` out from everything that uses them.
//!
//! Every public operation reports failure through its return value (a
//! `None`, `false`, `0`, or [`State::None`]) plus the thread-local
//! [`error::last_error`] slot, mirroring the reference C coroutine library
//! this design is modeled on rather than Rust's usual `Result` — see
//! [`error`] for why.
//!
//! `create`/`destroy`/`start`/`this_coroutine`/`suspend`/`yield_value`/
//! `return_value`/`resume` live at the crate root; the read-only
//! accessors over a coroutine's state, stack sizing, and last returned
//! value live in [`introspect`] under their own names (`introspect::state`,
//! `introspect::return_value`, ...) since `return_value` would otherwise
//! collide with the root-level control transfer of the same name.

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(not(feature = "std"), feature(thread_local))]

extern crate alloc;

mod await_proto;
pub mod error;
pub mod introspect;
mod lifecycle;
mod record;
mod stack;
pub mod version;

pub use await_proto::{
    await_value, await_with, register_awaitable, AWAIT_ALWAYS_READY, AWAIT_NEVER_READY,
};
pub use coro_arch::Settings;
pub use lifecycle::{
    create, destroy, resume, return_value, start, suspend, this_coroutine, yield_value,
};
pub use record::{AwaitCallback, Callback, Coroutine, State};
