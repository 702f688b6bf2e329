//! End-to-end coverage of create/destroy/start/suspend/yield/return/resume
//! (§4.3-§4.4 of the design this crate implements), corresponding to
//! scenarios S1-S6.

use coro::{self, error::ErrorKind, introspect, State};

#[test]
fn s1_create_destroy_round_trip() {
    let co = coro::create(4096, None).expect("create should succeed");
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
    coro::destroy(Some(co));
    assert_eq!(coro::error::last_error(), ErrorKind::Ok);
}

#[test]
fn create_rejects_zero_stack() {
    assert!(coro::create(0, None).is_none());
    assert_eq!(coro::error::last_error(), ErrorKind::InvalidArgument);
}

unsafe extern "C" fn set_to_three(arg: *mut u8) {
    let x = arg as *mut i32;
    *x = 3;
}

#[test]
fn s2_start_runs_to_completion() {
    let co = coro::create(4096, None).unwrap();
    let mut x: i32 = 0;
    let ran = coro::start(Some(co), set_to_three, &mut x as *mut i32 as *mut u8);
    assert!(ran);
    assert_eq!(x, 3);
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
    coro::destroy(Some(co));
}

unsafe extern "C" fn suspend_once(_arg: *mut u8) {
    coro::suspend();
}

#[test]
fn s3_suspend_leaves_destroyable_coroutine() {
    let co = coro::create(4096, None).unwrap();
    let ran = coro::start(Some(co), suspend_once, core::ptr::null_mut());
    assert!(ran);
    assert_eq!(introspect::state(Some(co)), State::Suspended);
    coro::destroy(Some(co));
    assert_eq!(coro::error::last_error(), ErrorKind::Ok);
}

unsafe extern "C" fn two_suspends(arg: *mut u8) {
    let v = arg as *mut i32;
    coro::suspend();
    *v = 1;
    coro::suspend();
    *v = 2;
}

#[test]
fn s4_suspend_resume_sequence() {
    let co = coro::create(4096, None).unwrap();
    let mut v: i32 = 0;
    coro::start(Some(co), two_suspends, &mut v as *mut i32 as *mut u8);
    assert_eq!(v, 0);

    coro::resume(Some(co));
    assert_eq!(v, 1);
    assert_eq!(introspect::state(Some(co)), State::Suspended);

    coro::resume(Some(co));
    assert_eq!(v, 2);
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
}

unsafe extern "C" fn yields_twice(arg: *mut u8) {
    let a = arg as *mut i32;
    let mut x: i32 = 10 + *a;
    coro::yield_value(&mut x as *mut i32 as *mut u8);
    let mut y: f64 = 3.14 + (*a as f64) * 2.0;
    coro::yield_value(&mut y as *mut f64 as *mut u8);
}

#[test]
fn s5_yield_round_trips_values() {
    let co = coro::create(4096, None).unwrap();
    let mut a: i32 = 4;
    coro::start(Some(co), yields_twice, &mut a as *mut i32 as *mut u8);

    let first = introspect::return_value(Some(co)) as *const i32;
    assert_eq!(unsafe { *first }, 14);

    a = 5;
    coro::resume(Some(co));
    let second = introspect::return_value(Some(co)) as *const f64;
    assert_eq!(unsafe { *second }, 13.14);

    coro::resume(Some(co));
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
    assert!(introspect::return_value(Some(co)).is_null());
}

#[test]
fn s6_resume_of_null_is_invalid_argument() {
    coro::resume(None);
    assert_eq!(coro::error::last_error(), ErrorKind::InvalidArgument);
}

#[test]
fn s6_resume_of_unstarted_coroutine_is_not_suspended() {
    let co = coro::create(4096, None).unwrap();
    coro::resume(Some(co));
    assert_eq!(coro::error::last_error(), ErrorKind::NotSuspended);
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
    coro::destroy(Some(co));
}

static mut SELF_RESUME_ERROR: Option<ErrorKind> = None;

unsafe extern "C" fn resume_self(_arg: *mut u8) {
    let me = coro::this_coroutine();
    coro::resume(me);
    SELF_RESUME_ERROR = Some(coro::error::last_error());
}

#[test]
fn s6_resuming_the_currently_running_coroutine_is_not_suspended() {
    let co = coro::create(4096, None).unwrap();
    coro::start(Some(co), resume_self, core::ptr::null_mut());
    assert_eq!(unsafe { SELF_RESUME_ERROR }, Some(ErrorKind::NotSuspended));
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
    coro::destroy(Some(co));
}

#[test]
fn this_coroutine_is_none_on_the_main_thread() {
    assert!(coro::this_coroutine().is_none());
}

#[test]
fn a_terminated_coroutine_can_be_restarted() {
    let co = coro::create(4096, None).unwrap();
    let mut x: i32 = 0;
    coro::start(Some(co), set_to_three, &mut x as *mut i32 as *mut u8);
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);

    let mut y: i32 = 0;
    let ran = coro::start(Some(co), set_to_three, &mut y as *mut i32 as *mut u8);
    assert!(ran);
    assert_eq!(y, 3);
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
    coro::destroy(Some(co));
}

#[test]
fn destroying_the_current_record_is_rejected() {
    unsafe extern "C" fn try_destroy_self(_arg: *mut u8) {
        let me = coro::this_coroutine();
        coro::destroy(me);
    }
    let co = coro::create(4096, None).unwrap();
    coro::start(Some(co), try_destroy_self, core::ptr::null_mut());
    assert_eq!(coro::error::last_error(), ErrorKind::InvalidContext);
    // The coroutine ran to completion (its attempted self-destroy was a
    // no-op), so it is unscheduled, not leaked as still-running.
    assert_eq!(introspect::state(Some(co)), State::Unscheduled);
    coro::destroy(Some(co));
}
