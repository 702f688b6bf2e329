//! Per-architecture register save/restore routines for stackful coroutine
//! context switches.
//!
//! This crate is deliberately tiny and holds nothing but the arch port: the
//! handful of functions a coroutine's lifecycle core needs in order to
//! prepare a fresh register image and to switch between two of them. It is
//! selected at compile time by `target_arch`, the same way
//! `context_switch_regular` selects its `x86_64`/`aarch64` module.

#![cfg_attr(not(feature = "std"), no_std)]
#![feature(naked_functions)]

#[cfg(target_arch = "x86_64")]
#[path = "x86_64.rs"]
mod arch;

#[cfg(target_arch = "aarch64")]
#[path = "aarch64.rs"]
mod arch;

pub use arch::{
    default_settings, prepare, read_first_register, resolve, restore_extra, save_extra,
    saved_area_size, stack_pointer_probe, switch, ExtraState, ResolvedSettings, Settings,
};

