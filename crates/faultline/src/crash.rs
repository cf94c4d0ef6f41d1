//! Deliberate faults for exercising the installed reporter.

use std::hint::black_box;

use clap::ValueEnum;

/// Unmapped on every supported platform: inside the null guard page.
const BAD_ADDRESS: usize = 0x10;

/// Which fault to raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CrashKind
{
    /// Read from an unmapped address (SIGSEGV)
    Read,
    /// Write to an unmapped address (SIGSEGV)
    Write,
    /// Jump to an unmapped address (SIGSEGV)
    Exec,
    /// Execute an undefined instruction (SIGILL)
    Illegal,
    /// Call `abort` (SIGABRT)
    Abort,
    /// Recurse until the stack runs out (SIGSEGV on the guard page)
    Overflow,
}

impl CrashKind
{
    /// Signal the fault is expected to raise.
    pub fn signal(self) -> i32
    {
        match self {
            Self::Read | Self::Write | Self::Exec | Self::Overflow => libc::SIGSEGV,
            Self::Illegal => libc::SIGILL,
            Self::Abort => libc::SIGABRT,
        }
    }
}

/// Raise the fault. Returns only if the process somehow survived it.
pub fn trigger(kind: CrashKind)
{
    match kind {
        CrashKind::Read => {
            let ptr = black_box(BAD_ADDRESS) as *const u8;
            // SAFETY: none; this read faults on purpose.
            let value = unsafe { ptr.read_volatile() };
            black_box(value);
        }
        CrashKind::Write => {
            let ptr = black_box(BAD_ADDRESS) as *mut u8;
            // SAFETY: none; this write faults on purpose.
            unsafe { ptr.write_volatile(0x2a) };
        }
        CrashKind::Exec => {
            // SAFETY: none; the call faults on purpose at the instruction fetch.
            let target: extern "C" fn() = unsafe { std::mem::transmute(black_box(BAD_ADDRESS)) };
            target();
        }
        CrashKind::Illegal => illegal_instruction(),
        CrashKind::Abort => std::process::abort(),
        CrashKind::Overflow => {
            black_box(recurse(0));
        }
    }
}

#[cfg(target_arch = "x86_64")]
fn illegal_instruction()
{
    // SAFETY: none; `ud2` raises SIGILL on purpose.
    unsafe { std::arch::asm!("ud2") };
}

#[cfg(target_arch = "aarch64")]
fn illegal_instruction()
{
    // SAFETY: none; `udf` raises SIGILL on purpose.
    unsafe { std::arch::asm!("udf #0") };
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn illegal_instruction()
{
    // SAFETY: `raise` has no memory preconditions.
    unsafe { libc::raise(libc::SIGILL) };
}

#[allow(unconditional_recursion)]
#[inline(never)]
fn recurse(depth: u64) -> u64
{
    let frame = black_box([depth; 64]);
    recurse(depth + 1).wrapping_add(frame[0])
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_expected_signals()
    {
        assert_eq!(CrashKind::Read.signal(), libc::SIGSEGV);
        assert_eq!(CrashKind::Overflow.signal(), libc::SIGSEGV);
        assert_eq!(CrashKind::Illegal.signal(), libc::SIGILL);
        assert_eq!(CrashKind::Abort.signal(), libc::SIGABRT);
    }
}
