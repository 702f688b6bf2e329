//! End-to-end coverage of the ready/on-suspend await loop (§4.5),
//! corresponding to scenario S7 and properties P10/P11.

use coro::{
    self, error::ErrorKind, introspect, Coroutine, State, AWAIT_ALWAYS_READY, AWAIT_NEVER_READY,
};

struct CallRecord {
    list: Vec<Coroutine>,
    done: bool,
}

unsafe extern "C" fn record_current(coroutine: Coroutine, arg: *mut u8) -> bool {
    let rec = &mut *(arg as *mut CallRecord);
    rec.list.push(coroutine);
    true
}

unsafe extern "C" fn await_always_ready_then_finish(arg: *mut u8) {
    coro::await_with(Some(AWAIT_ALWAYS_READY), Some(record_current), arg);
    (*(arg as *mut CallRecord)).done = true;
}

#[test]
fn s7_synchronous_completion_never_suspends() {
    let co = coro::create(4096, None).unwrap();
    let mut rec = CallRecord { list: Vec::new(), done: false };
    let ran = coro::start(
        Some(co),
        await_always_ready_then_finish,
        &mut rec as *mut CallRecord as *mut u8,
    );
    assert!(ran);
    assert!(rec.list.is_empty(), "on_suspend must never run when ready is always-true");
    assert!(rec.done);
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
    coro::destroy(Some(co));
}

unsafe extern "C" fn await_never_ready_then_finish(arg: *mut u8) {
    coro::await_with(Some(AWAIT_NEVER_READY), Some(record_current), arg);
    (*(arg as *mut CallRecord)).done = true;
}

#[test]
fn s7_asynchronous_wait_suspends_then_completes_on_resume() {
    let co = coro::create(4096, None).unwrap();
    let mut rec = CallRecord { list: Vec::new(), done: false };
    coro::start(
        Some(co),
        await_never_ready_then_finish,
        &mut rec as *mut CallRecord as *mut u8,
    );
    assert_eq!(rec.list.len(), 1);
    assert_eq!(rec.list[0], co);
    assert!(!rec.done);
    assert_eq!(introspect::state(Some(co)), State::Suspended);

    coro::resume(Some(co));
    assert!(rec.done);
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
    coro::destroy(Some(co));
}

struct Counter {
    ready_calls: u32,
    finished: bool,
}

unsafe extern "C" fn ready_after_one_try(_coroutine: Coroutine, arg: *mut u8) -> bool {
    let c = &mut *(arg as *mut Counter);
    let was_ready = c.ready_calls > 0;
    c.ready_calls += 1;
    was_ready
}

unsafe extern "C" fn never_accept(_coroutine: Coroutine, _arg: *mut u8) -> bool {
    false
}

unsafe extern "C" fn awaits_with_declining_on_suspend(arg: *mut u8) {
    coro::await_with(Some(ready_after_one_try), Some(never_accept), arg);
    (*(arg as *mut Counter)).finished = true;
}

#[test]
fn p11_declining_on_suspend_retries_ready_without_switching() {
    let co = coro::create(4096, None).unwrap();
    let mut counter = Counter { ready_calls: 0, finished: false };
    let ran = coro::start(
        Some(co),
        awaits_with_declining_on_suspend,
        &mut counter as *mut Counter as *mut u8,
    );
    assert!(ran, "the coroutine never suspends, so start completes it outright");
    assert_eq!(counter.ready_calls, 2, "ready is re-queried exactly once after declining");
    assert!(counter.finished);
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
    coro::destroy(Some(co));
}

unsafe extern "C" fn registers_then_awaits(arg: *mut u8) {
    coro::register_awaitable(Some(AWAIT_NEVER_READY), Some(record_current));
    coro::await_value(arg);
    (*(arg as *mut CallRecord)).done = true;
}

#[test]
fn register_awaitable_feeds_the_no_argument_await() {
    let co = coro::create(4096, None).unwrap();
    let mut rec = CallRecord { list: Vec::new(), done: false };
    coro::start(
        Some(co),
        registers_then_awaits,
        &mut rec as *mut CallRecord as *mut u8,
    );
    assert_eq!(rec.list.len(), 1);
    assert!(!rec.done);

    coro::resume(Some(co));
    assert!(rec.done);
    coro::destroy(Some(co));
}

#[test]
fn await_with_requires_at_least_one_callback() {
    coro::await_with(None, None, core::ptr::null_mut());
    assert_eq!(coro::error::last_error(), ErrorKind::InvalidArgument);
}

#[test]
fn await_from_the_main_sentinel_is_invalid_context() {
    coro::await_value(core::ptr::null_mut());
    assert_eq!(coro::error::last_error(), ErrorKind::InvalidContext);

    coro::register_awaitable(None, None);
    assert_eq!(coro::error::last_error(), ErrorKind::InvalidContext);
}
