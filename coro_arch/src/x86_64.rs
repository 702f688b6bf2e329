//! x86_64 arch port: register save/restore routines for context switching
//! between a stackful coroutine and its caller.
//!
//! The general-purpose callee-saved registers are always exchanged; the
//! remaining groups (flags, FPU/MMX, SSE, segment, debug, control) are
//! exchanged only when the coroutine's [`Settings`] selects them. Unlike
//! [`context_switch_regular`]/[`context_switch_sse`]/[`context_switch_avx`],
//! which pick one fixed register set per crate at compile time, this port
//! tests the settings bits at every switch so one binary can run coroutines
//! created with different settings side by side — the same technique the
//! reference C coroutine library this crate is modeled on uses in its own
//! `cswitch` routine (`test`/`jz` around each optional block).
//!
//! [`context_switch_regular`]: https://crates.io/ (sibling crate in the
//! reference workspace; see this crate's own repository history)

use core::arch::asm;
#[cfg(feature = "extended-float-save")]
use core::sync::atomic::{AtomicU8, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Which optional register groups participate in a context switch.
    pub struct Settings: u32 {
        /// `rflags`.
        const FLAGS    = 1 << 0;
        /// Legacy x87 FPU and MMX registers.
        const FPU_MMX  = 1 << 1;
        /// SSE (`xmm0`-`xmm15`) registers.
        const SSE      = 1 << 2;
        /// Segment selectors (`fs`, `gs`).
        const SEGMENT  = 1 << 3;
        /// Debug registers (`dr0`-`dr3`, `dr6`, `dr7`).
        const DEBUG    = 1 << 4;
        /// Control registers relevant to userspace (`cr0` bits, MXCSR-adjacent
        /// state not already covered by the FPU/SSE save area).
        const CONTROL  = 1 << 5;
    }
}

/// Bit used only in a [`ResolvedSettings`] value, never in a user-supplied
/// [`Settings`]: both [`Settings::FPU_MMX`] and [`Settings::SSE`] were
/// requested and this CPU supports the combined `fxsave`/`fxrstor` area, so
/// the switch routine saves/restores both groups with a single instruction
/// instead of the individually-pushed fallback.
const COMBINED_FLOAT: u32 = 1 << 6;

pub const DEFAULT_SETTINGS: Settings = Settings::FLAGS;

pub fn default_settings() -> Settings {
    DEFAULT_SETTINGS
}

/// A coroutine's settings after the one-time `fxsr` CPU feature probe has
/// been folded in. Never constructed directly outside this module; produced
/// by [`resolve`] and consumed by [`switch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct ResolvedSettings(u32);

#[cfg(feature = "extended-float-save")]
const FXSR_UNKNOWN: u8 = 0;
#[cfg(feature = "extended-float-save")]
const FXSR_YES: u8 = 1;
#[cfg(feature = "extended-float-save")]
const FXSR_NO: u8 = 2;

/// Cached result of probing for `fxsave`/`fxrstor` support, populated on
/// first use. Mirrors `cco_x86_has_fxsr` in the reference C implementation,
/// but is computed from an explicit feature probe rather than relying on a
/// constructor function running before `main`.
#[cfg(feature = "extended-float-save")]
static FXSR_CACHE: AtomicU8 = AtomicU8::new(FXSR_UNKNOWN);

#[cfg(feature = "extended-float-save")]
fn has_fxsr() -> bool {
    match FXSR_CACHE.load(Ordering::Relaxed) {
        FXSR_YES => return true,
        FXSR_NO => return false,
        _ => {}
    }
    let supported = probe_fxsr();
    FXSR_CACHE.store(if supported { FXSR_YES } else { FXSR_NO }, Ordering::Relaxed);
    supported
}

/// Under `std`, `is_x86_64_feature_detected!` is the ecosystem-standard way
/// to query a CPU feature (it also caches internally, on top of this
/// module's own cache). Under `no_std` there is no such macro, so this reads
/// the `cpuid` leaf directly.
#[cfg(all(feature = "extended-float-save", feature = "std"))]
fn probe_fxsr() -> bool {
    std::is_x86_64_feature_detected!("fxsr")
}

#[cfg(all(feature = "extended-float-save", not(feature = "std")))]
fn probe_fxsr() -> bool {
    // SAFETY: CPUID leaf 1 is available on every x86_64 CPU.
    let edx = unsafe { core::arch::x86_64::__cpuid(1).edx };
    edx & (1 << 24) != 0
}

/// Resolves a coroutine's requested [`Settings`] into the form the switch
/// routine consumes, folding in the `fxsr` probe. Idempotent and cheap to
/// call more than once; the lifecycle core calls it once per coroutine, in
/// `create()`, and stores the result alongside the record.
pub fn resolve(settings: Settings) -> ResolvedSettings {
    let mut bits = settings.bits();
    #[cfg(feature = "extended-float-save")]
    if settings.contains(Settings::FPU_MMX | Settings::SSE) && has_fxsr() {
        bits &= !(Settings::FPU_MMX.bits() | Settings::SSE.bits());
        bits |= COMBINED_FLOAT;
    }
    ResolvedSettings(bits)
}

/// Upper bound on the bytes a saved register image occupies for the given
/// settings, including worst-case alignment padding for the extended
/// floating-point save block. Used by the context allocator to size the
/// headroom it reserves below a coroutine's usable stack.
pub fn saved_area_size(settings: Settings) -> usize {
    let resolved = resolve(settings);
    // rbx, rbp, r12, r13, r14, r15, return address.
    let mut bytes = 7 * core::mem::size_of::<usize>();
    if settings.contains(Settings::FLAGS) {
        bytes += core::mem::size_of::<usize>();
    }
    if resolved.0 & COMBINED_FLOAT != 0 {
        bytes += 16 + 512; // alignment padding + the fxsave area itself.
    } else {
        if settings.contains(Settings::FPU_MMX) {
            bytes += 108; // legacy `fsave` image size.
        }
        if settings.contains(Settings::SSE) {
            bytes += 16 * 16; // xmm0..xmm15, individually pushed.
        }
    }
    bytes
}

/// Segment, debug, and control register state that does not interact with
/// the stack pointer and so is saved/restored by ordinary (non-naked)
/// helpers bracketing the naked stack-switch routine, rather than inside it.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct ExtraState {
    fs_base: u64,
    gs_base: u64,
    dr0: usize,
    dr1: usize,
    dr2: usize,
    dr3: usize,
    dr7: usize,
    cr0_user_bits: usize,
}

impl ExtraState {
    pub const fn zeroed() -> Self {
        ExtraState { fs_base: 0, gs_base: 0, dr0: 0, dr1: 0, dr2: 0, dr3: 0, dr7: 0, cr0_user_bits: 0 }
    }
}

#[inline(never)]
pub unsafe fn save_extra(settings: Settings, out: &mut ExtraState) {
    if settings.contains(Settings::SEGMENT) {
        let fs: u64;
        let gs: u64;
        asm!("rdfsbase {0}", out(reg) fs, options(nomem, nostack));
        asm!("rdgsbase {0}", out(reg) gs, options(nomem, nostack));
        out.fs_base = fs;
        out.gs_base = gs;
    }
    if settings.contains(Settings::DEBUG) {
        let (dr0, dr1, dr2, dr3, dr7): (usize, usize, usize, usize, usize);
        asm!("mov {0}, dr0", out(reg) dr0, options(nomem, nostack));
        asm!("mov {0}, dr1", out(reg) dr1, options(nomem, nostack));
        asm!("mov {0}, dr2", out(reg) dr2, options(nomem, nostack));
        asm!("mov {0}, dr3", out(reg) dr3, options(nomem, nostack));
        asm!("mov {0}, dr7", out(reg) dr7, options(nomem, nostack));
        out.dr0 = dr0;
        out.dr1 = dr1;
        out.dr2 = dr2;
        out.dr3 = dr3;
        out.dr7 = dr7;
    }
    if settings.contains(Settings::CONTROL) {
        let cr0: usize;
        asm!("mov {0}, cr0", out(reg) cr0, options(nomem, nostack));
        out.cr0_user_bits = cr0;
    }
}

#[inline(never)]
pub unsafe fn restore_extra(settings: Settings, state: &ExtraState) {
    if settings.contains(Settings::SEGMENT) {
        asm!("wrfsbase {0}", in(reg) state.fs_base, options(nomem, nostack));
        asm!("wrgsbase {0}", in(reg) state.gs_base, options(nomem, nostack));
    }
    if settings.contains(Settings::DEBUG) {
        asm!("mov dr0, {0}", in(reg) state.dr0, options(nomem, nostack));
        asm!("mov dr1, {0}", in(reg) state.dr1, options(nomem, nostack));
        asm!("mov dr2, {0}", in(reg) state.dr2, options(nomem, nostack));
        asm!("mov dr3, {0}", in(reg) state.dr3, options(nomem, nostack));
        asm!("mov dr7, {0}", in(reg) state.dr7, options(nomem, nostack));
    }
    if settings.contains(Settings::CONTROL) {
        asm!("mov cr0, {0}", in(reg) state.cr0_user_bits, options(nomem, nostack));
    }
}

/// Reads the value of the "first register" from the actual CPU register
/// hardware. Intended to be called once, as the very first thing the entry
/// trampoline does after a coroutine's first-ever switch-in: `prepare` below
/// stashes the record pointer in `r15` rather than an ordinary argument
/// register, because the trampoline is reached via the `ret` at the tail of
/// [`switch`], not a `call` — no argument registers are populated by that
/// transfer. On x86_64 this reads `r15`.
#[naked]
pub unsafe extern "C" fn read_first_register() -> usize {
    asm!("mov rax, r15", "ret", options(noreturn));
}

/// Writes the initial register image for a coroutine that has never run,
/// at the top of its stack, and returns the stack pointer value to store as
/// that coroutine's saved context.
///
/// `stack_top` must be the address just past the end of the coroutine's
/// stack buffer (i.e. `stack_base + stack_size`). `record_ptr` is delivered
/// to the entry trampoline on first entry via `r15`; the trampoline recovers
/// it with [`read_first_register`], the same two-step handoff the reference
/// implementation uses (`set_first_register` at prepare time,
/// `read_first_register` as the first thing the new context runs).
///
/// # Safety
/// `stack_top` must point just past a live, writable allocation of at least
/// [`saved_area_size`] bytes for `settings`.
pub unsafe fn prepare(
    stack_top: *mut u8,
    entry: unsafe extern "C" fn() -> !,
    record_ptr: *mut u8,
    settings: Settings,
) -> usize {
    let mut sp = stack_top as usize;

    // Synthesized return address: the first `ret` executed by the restore
    // sequence lands here.
    sp -= core::mem::size_of::<usize>();
    *(sp as *mut usize) = entry as usize;

    // rbx, rbp, r12, r13, r14, r15 in push order (rbx pushed first ends up
    // at the highest address of this block; r15 pushed last ends up lowest,
    // closest to the current stack pointer).
    let gp_regs: [usize; 6] = [0, 0, 0, 0, 0, record_ptr as usize];
    for value in gp_regs {
        sp -= core::mem::size_of::<usize>();
        *(sp as *mut usize) = value;
    }

    if settings.contains(Settings::FLAGS) {
        sp -= core::mem::size_of::<usize>();
        // Interrupts enabled; no other flag bits meaningful to userspace.
        *(sp as *mut usize) = 1 << 9;
    }

    // The restore half of `switch` expects to find a floating-point save
    // area on the stack whenever the resolved settings call for one; a
    // freshly prepared coroutine has never run, so that area is simply
    // zeroed rather than holding a real captured FP state.
    let resolved = resolve(settings).0;
    if resolved & COMBINED_FLOAT != 0 {
        sp -= 512;
        core::ptr::write_bytes(sp as *mut u8, 0, 512);
    } else {
        if settings.contains(Settings::FPU_MMX) {
            sp -= 108;
            core::ptr::write_bytes(sp as *mut u8, 0, 108);
        }
        if settings.contains(Settings::SSE) {
            sp -= 256;
            core::ptr::write_bytes(sp as *mut u8, 0, 256);
        }
    }

    sp
}

/// Returns the current stack pointer of the caller. Used only by stack-usage
/// introspection.
#[inline(always)]
pub fn stack_pointer_probe() -> usize {
    let sp: usize;
    unsafe {
        asm!("mov {0}, rsp", out(reg) sp, options(nomem, nostack));
    }
    sp
}

/// Switches from the currently running context to another.
///
/// Stores the outgoing stack pointer (after pushing the outgoing context's
/// registers per `prev_settings`) into `*prev_sp_slot`, then loads `next_sp`
/// and pops the incoming context's registers per `next_settings`, finally
/// transferring control to the instruction address left on top of the
/// incoming stack.
///
/// `prev_extra`/`next_extra` carry the segment/debug/control groups, saved
/// and restored by ordinary helpers immediately around the naked stack
/// switch since their ordering relative to the stack pointer exchange does
/// not matter.
///
/// # Safety
/// `prev_sp_slot` must be valid to write; `next_sp` must be a stack pointer
/// previously produced by [`prepare`] or by a prior call to [`switch`] with
/// matching settings.
#[naked]
pub unsafe extern "C" fn switch(
    prev_sp_slot: *mut usize,
    next_sp: usize,
    prev_settings: ResolvedSettings,
    next_settings: ResolvedSettings,
) {
    // Arguments arrive per the System V AMD64 ABI: rdi, rsi, edx, ecx.
    // `rbx` is used as scratch for the settings bits of whichever side is
    // currently being processed; its real value is part of the always-saved
    // GP group and is restored from the incoming stack below, exactly as in
    // `context_switch_regular`.
    asm!(
        "push rbx",
        "push rbp",
        "push r12",
        "push r13",
        "push r14",
        "push r15",

        "mov ebx, edx", // prev_settings
        "test ebx, 0b1",
        "jz 2f",
        "pushfq",
        "2:",

        "test ebx, 0b1000000", // COMBINED_FLOAT
        "jz 3f",
        "sub rsp, 512",
        "fxsave [rsp]",
        "jmp 4f",
        "3:",
        "test ebx, 0b10",
        "jz 5f",
        "sub rsp, 108",
        "fnsave [rsp]",
        "5:",
        "test ebx, 0b100",
        "jz 4f",
        "lea rsp, [rsp - 256]",
        "movdqu [rsp + 240], xmm15",
        "movdqu [rsp + 224], xmm14",
        "movdqu [rsp + 208], xmm13",
        "movdqu [rsp + 192], xmm12",
        "movdqu [rsp + 176], xmm11",
        "movdqu [rsp + 160], xmm10",
        "movdqu [rsp + 144], xmm9",
        "movdqu [rsp + 128], xmm8",
        "movdqu [rsp + 112], xmm7",
        "movdqu [rsp + 96], xmm6",
        "movdqu [rsp + 80], xmm5",
        "movdqu [rsp + 64], xmm4",
        "movdqu [rsp + 48], xmm3",
        "movdqu [rsp + 32], xmm2",
        "movdqu [rsp + 16], xmm1",
        "movdqu [rsp], xmm0",
        "4:",

        "mov [rdi], rsp",
        "mov rsp, rsi",

        "mov ebx, ecx", // next_settings
        "test ebx, 0b100",
        "jz 7f",
        "movdqu xmm0, [rsp]",
        "movdqu xmm1, [rsp + 16]",
        "movdqu xmm2, [rsp + 32]",
        "movdqu xmm3, [rsp + 48]",
        "movdqu xmm4, [rsp + 64]",
        "movdqu xmm5, [rsp + 80]",
        "movdqu xmm6, [rsp + 96]",
        "movdqu xmm7, [rsp + 112]",
        "movdqu xmm8, [rsp + 128]",
        "movdqu xmm9, [rsp + 144]",
        "movdqu xmm10, [rsp + 160]",
        "movdqu xmm11, [rsp + 176]",
        "movdqu xmm12, [rsp + 192]",
        "movdqu xmm13, [rsp + 208]",
        "movdqu xmm14, [rsp + 224]",
        "movdqu xmm15, [rsp + 240]",
        "lea rsp, [rsp + 256]",
        "7:",
        "test ebx, 0b10",
        "jz 8f",
        "frstor [rsp]",
        "add rsp, 108",
        "8:",
        "test ebx, 0b1000000", // COMBINED_FLOAT
        "jz 9f",
        "fxrstor [rsp]",
        "add rsp, 512",
        "9:",

        "test ebx, 0b1",
        "jz 6f",
        "popfq",
        "6:",

        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbp",
        "pop rbx",
        "ret",
        options(noreturn)
    );
}
