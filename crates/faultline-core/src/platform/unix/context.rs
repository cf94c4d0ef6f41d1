//! # Signal Context Capture
//!
//! Turns the `siginfo_t` and `ucontext_t` a `SA_SIGINFO` handler receives into
//! a [`FaultContext`]. This is the only code in the crate that knows the
//! layout of a signal frame.
//!
//! | target               | registers                     | access direction             |
//! |----------------------|-------------------------------|------------------------------|
//! | Linux x86-64         | `uc_mcontext.gregs[REG_*]`    | page-fault error code        |
//! | Linux AArch64        | `uc_mcontext.regs/sp/pc`      | `ESR_EL1` from `__reserved`  |
//! | macOS x86-64         | `(*uc_mcontext).__ss`         | `__es.__err`                 |
//! | macOS AArch64        | `(*uc_mcontext).__ss`         | `__es.__esr`                 |
//!
//! Fields a target does not provide stay unavailable.

use std::ffi::c_void;

use libc::{c_int, siginfo_t};

use crate::snapshot::{AccessKind, Architecture, FaultCode, FaultContext, MachineContext};
use crate::types::Address;

/// Raw arguments of one `SA_SIGINFO` handler invocation
#[derive(Debug, Clone, Copy)]
pub struct SignalContext
{
    signal: c_int,
    info: *const siginfo_t,
    context: *const c_void,
}

impl SignalContext
{
    /// Wrap the handler's arguments.
    ///
    /// ## Safety
    ///
    /// `info` and `context` must be null or the pointers the kernel passed to
    /// the current signal handler, valid for the duration of the handler.
    pub unsafe fn new(signal: c_int, info: *const siginfo_t, context: *const c_void) -> Self
    {
        Self { signal, info, context }
    }

    pub fn signal(&self) -> c_int
    {
        self.signal
    }
}

impl MachineContext for SignalContext
{
    fn capture(&self) -> FaultContext
    {
        // SAFETY: `new` requires kernel-provided (or null) pointers.
        let detail = unsafe { self.info.as_ref() }.map_or(0, |info| info.si_code);
        let code = FaultCode::new(self.signal, detail);
        let mut fault = FaultContext::new(code, Address::ZERO, Architecture::current());

        let mut kind = AccessKind::Unknown;
        if !self.context.is_null() {
            // SAFETY: non-null context pointers come from the kernel.
            kind = unsafe { capture_registers(&mut fault, self.context) };
        }

        // A signal sent with `kill`, `raise` or `tgkill` has the sender's pid
        // and uid where `si_addr` would be.
        if code.is_memory_access() && !sent_from_user_space(detail) {
            if let Some(address) = self.access_address() {
                fault = fault.with_access(address, kind);
            }
        }

        fault
    }
}

impl SignalContext
{
    fn access_address(&self) -> Option<Address>
    {
        // SAFETY: see `new`.
        let info = unsafe { self.info.as_ref() }?;

        #[cfg(any(target_os = "linux", target_os = "android"))]
        // SAFETY: `si_addr` is valid for the fault signals this is called for.
        let address = unsafe { info.si_addr() };

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let address = info.si_addr;

        Some(Address::new(address as u64))
    }
}

/// Whether `si_code` marks a signal sent from user space rather than raised by a fault.
#[cfg(not(target_vendor = "apple"))]
fn sent_from_user_space(si_code: c_int) -> bool
{
    si_code <= 0
}

#[cfg(target_vendor = "apple")]
fn sent_from_user_space(si_code: c_int) -> bool
{
    si_code <= 0 || si_code >= libc::SI_USER
}

/// Access direction from an x86 page-fault error code.
///
/// Only meaningful when the trap number is 14 (`#PF`).
pub fn x86_access_kind(trap_number: u64, error_code: u64) -> AccessKind
{
    const PAGE_FAULT: u64 = 14;
    const WRITE: u64 = 1 << 1;
    const INSTRUCTION_FETCH: u64 = 1 << 4;

    if trap_number != PAGE_FAULT {
        AccessKind::Unknown
    } else if error_code & INSTRUCTION_FETCH != 0 {
        AccessKind::Execute
    } else if error_code & WRITE != 0 {
        AccessKind::Write
    } else {
        AccessKind::Read
    }
}

/// Access direction from an AArch64 exception syndrome register.
pub fn arm64_access_kind(esr: u64) -> AccessKind
{
    const INSTRUCTION_ABORT_LOWER: u64 = 0x20;
    const INSTRUCTION_ABORT_SAME: u64 = 0x21;
    const DATA_ABORT_LOWER: u64 = 0x24;
    const DATA_ABORT_SAME: u64 = 0x25;
    const WRITE_NOT_READ: u64 = 1 << 6;

    match esr >> 26 {
        INSTRUCTION_ABORT_LOWER | INSTRUCTION_ABORT_SAME => AccessKind::Execute,
        DATA_ABORT_LOWER | DATA_ABORT_SAME if esr & WRITE_NOT_READ != 0 => AccessKind::Write,
        DATA_ABORT_LOWER | DATA_ABORT_SAME => AccessKind::Read,
        _ => AccessKind::Unknown,
    }
}

fn set_pointers(fault: &mut FaultContext)
{
    let arch = fault.registers.architecture();
    if let Some(ip) = arch.instruction_pointer().and_then(|name| fault.registers.get(name)) {
        fault.fault_address = Address::new(ip);
    }
    if let Some(sp) = arch.stack_pointer().and_then(|name| fault.registers.get(name)) {
        fault.stack_pointer = Address::new(sp);
    }
}

#[cfg(all(any(target_os = "linux", target_os = "android"), target_arch = "x86_64"))]
unsafe fn capture_registers(fault: &mut FaultContext, context: *const c_void) -> AccessKind
{
    use libc::{
        REG_CSGSFS, REG_EFL, REG_ERR, REG_R10, REG_R11, REG_R12, REG_R13, REG_R14, REG_R15, REG_R8, REG_R9, REG_RAX,
        REG_RBP, REG_RBX, REG_RCX, REG_RDI, REG_RDX, REG_RIP, REG_RSI, REG_RSP, REG_TRAPNO,
    };

    let ucontext = &*(context as *const libc::ucontext_t);
    let gregs = &ucontext.uc_mcontext.gregs;
    let reg = |index: c_int| gregs[index as usize] as u64;

    let table = [
        ("RDI", REG_RDI),
        ("RSI", REG_RSI),
        ("RAX", REG_RAX),
        ("RBX", REG_RBX),
        ("RCX", REG_RCX),
        ("RDX", REG_RDX),
        ("RIP", REG_RIP),
        ("RBP", REG_RBP),
        ("RFLAGS", REG_EFL),
        ("RSP", REG_RSP),
        ("R8", REG_R8),
        ("R9", REG_R9),
        ("R10", REG_R10),
        ("R11", REG_R11),
        ("R12", REG_R12),
        ("R13", REG_R13),
        ("R14", REG_R14),
        ("R15", REG_R15),
    ];
    for (name, index) in table {
        fault.registers.set(name, reg(index));
    }
    // CS shares a slot with GS and FS; SS is not saved at all.
    fault.registers.set("CS", reg(REG_CSGSFS) & 0xffff);

    set_pointers(fault);
    x86_access_kind(reg(REG_TRAPNO), reg(REG_ERR))
}

#[cfg(all(any(target_os = "linux", target_os = "android"), target_arch = "aarch64"))]
unsafe fn capture_registers(fault: &mut FaultContext, context: *const c_void) -> AccessKind
{
    let ucontext = &*(context as *const libc::ucontext_t);
    let mcontext = &ucontext.uc_mcontext;
    let names = Architecture::Arm64.register_names();

    for (name, value) in names.iter().zip(mcontext.regs.iter()) {
        fault.registers.set(name, *value);
    }
    fault.registers.set("SP", mcontext.sp);
    fault.registers.set("PC", mcontext.pc);
    fault.registers.set("PSTATE", mcontext.pstate);

    set_pointers(fault);
    linux_arm64_esr(mcontext).map_or(AccessKind::Unknown, arm64_access_kind)
}

/// `ESR_EL1` from the `esr_context` record in `mcontext.__reserved`, if the
/// kernel saved one.
#[cfg(all(any(target_os = "linux", target_os = "android"), target_arch = "aarch64"))]
unsafe fn linux_arm64_esr(mcontext: &libc::mcontext_t) -> Option<u64>
{
    const ESR_MAGIC: u32 = 0x4553_5201;
    const RESERVED_SIZE: usize = 4096;
    const HEADER_SIZE: usize = 8;

    // `__reserved` is private in libc; it starts 16-byte aligned right after `pstate`.
    let pstate_end = std::ptr::addr_of!(mcontext.pstate) as usize + std::mem::size_of::<u64>();
    let reserved = (pstate_end + 15) & !15;

    let mut offset = 0;
    while offset + HEADER_SIZE <= RESERVED_SIZE {
        let header = (reserved + offset) as *const u32;
        let magic = header.read_unaligned();
        let size = header.add(1).read_unaligned() as usize;
        if magic == 0 || size < HEADER_SIZE {
            return None;
        }
        if magic == ESR_MAGIC {
            return Some(((reserved + offset + HEADER_SIZE) as *const u64).read_unaligned());
        }
        offset += size;
    }
    None
}

#[cfg(all(target_vendor = "apple", target_arch = "x86_64"))]
unsafe fn capture_registers(fault: &mut FaultContext, context: *const c_void) -> AccessKind
{
    let ucontext = &*(context as *const libc::ucontext_t);
    if ucontext.uc_mcontext.is_null() {
        return AccessKind::Unknown;
    }
    let mcontext = &*ucontext.uc_mcontext;
    let ss = &mcontext.__ss;

    let table = [
        ("RDI", ss.__rdi),
        ("RSI", ss.__rsi),
        ("RAX", ss.__rax),
        ("RBX", ss.__rbx),
        ("RCX", ss.__rcx),
        ("RDX", ss.__rdx),
        ("RIP", ss.__rip),
        ("RBP", ss.__rbp),
        ("CS", ss.__cs),
        ("RFLAGS", ss.__rflags),
        ("RSP", ss.__rsp),
        ("R8", ss.__r8),
        ("R9", ss.__r9),
        ("R10", ss.__r10),
        ("R11", ss.__r11),
        ("R12", ss.__r12),
        ("R13", ss.__r13),
        ("R14", ss.__r14),
        ("R15", ss.__r15),
    ];
    for (name, value) in table {
        fault.registers.set(name, value);
    }

    set_pointers(fault);
    let es = &mcontext.__es;
    x86_access_kind(u64::from(es.__trapno), u64::from(es.__err))
}

#[cfg(all(target_vendor = "apple", target_arch = "aarch64"))]
unsafe fn capture_registers(fault: &mut FaultContext, context: *const c_void) -> AccessKind
{
    let ucontext = &*(context as *const libc::ucontext_t);
    if ucontext.uc_mcontext.is_null() {
        return AccessKind::Unknown;
    }
    let mcontext = &*ucontext.uc_mcontext;
    let ss = &mcontext.__ss;
    let names = Architecture::Arm64.register_names();

    for (name, value) in names.iter().zip(ss.__x.iter()) {
        fault.registers.set(name, *value);
    }
    fault.registers.set("FP", ss.__fp);
    fault.registers.set("LR", ss.__lr);
    fault.registers.set("SP", ss.__sp);
    fault.registers.set("PC", ss.__pc);
    fault.registers.set("PSTATE", u64::from(ss.__cpsr));

    set_pointers(fault);
    arm64_access_kind(u64::from(mcontext.__es.__esr))
}

#[cfg(not(any(
    all(any(target_os = "linux", target_os = "android"), any(target_arch = "x86_64", target_arch = "aarch64")),
    all(target_vendor = "apple", any(target_arch = "x86_64", target_arch = "aarch64")),
)))]
unsafe fn capture_registers(_fault: &mut FaultContext, _context: *const c_void) -> AccessKind
{
    AccessKind::Unknown
}
