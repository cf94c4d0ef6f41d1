//! Fault classification.
//!
//! Maps a platform fault code to the phrase used in the report header
//! ("... caused an Access Violation Exception ..."). The mapping is a static
//! table: supporting a new code means adding a row, never a branch.
//!
//! A stack overflow has no code of its own on POSIX systems; it arrives as an
//! ordinary `SIGSEGV`. [`is_stack_overflow`] recognises it from where the bad
//! access landed relative to the stack pointer.

use std::fmt;

use crate::types::Address;

/// Phrase used when a fault code has no row in the table.
pub const UNKNOWN_PHRASE: &str = "an Unknown";

/// Phrase for a memory fault in the guard region next to the stack pointer.
pub const STACK_OVERFLOW_PHRASE: &str = "a Stack Overflow";

/// How far from the stack pointer a bad access still counts as running off the stack.
pub const STACK_GUARD_SPAN: u64 = 4096;

/// Opaque platform fault code
///
/// On POSIX systems this is the delivered signal number plus the `si_code`
/// that refines it (e.g. `SIGFPE` + `FPE_INTDIV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaultCode
{
    /// Signal number.
    pub signal: i32,
    /// Signal-specific detail code (`si_code`).
    pub detail: i32,
}

impl FaultCode
{
    /// Build a fault code.
    pub const fn new(signal: i32, detail: i32) -> Self
    {
        Self { signal, detail }
    }

    /// Header phrase for this code from [`FAULT_PHRASES`].
    pub fn phrase(self) -> &'static str
    {
        phrase_in(FAULT_PHRASES, self)
    }

    /// Symbolic signal name, or `"SIG?"` for unlisted signals.
    pub fn signal_name(self) -> &'static str
    {
        SIGNAL_NAMES
            .iter()
            .find(|(signal, _)| *signal == self.signal)
            .map_or("SIG?", |&(_, name)| name)
    }

    /// Whether this code describes a bad memory access (and so may carry an access address).
    pub fn is_memory_access(self) -> bool
    {
        self.signal == libc::SIGSEGV || self.signal == libc::SIGBUS
    }
}

impl fmt::Display for FaultCode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "signal {} ({}), code {}", self.signal, self.signal_name(), self.detail)
    }
}

/// One row of a classification table
///
/// `detail: None` matches any detail code for the signal and is only used
/// when no row with an exact detail matches.
#[derive(Debug, Clone, Copy)]
pub struct FaultPhrase
{
    /// Signal number.
    pub signal: i32,
    /// Exact `si_code`, or `None` for the signal-wide fallback.
    pub detail: Option<i32>,
    /// Article plus category, e.g. `"an Illegal Instruction"`.
    pub phrase: &'static str,
}

const fn row(signal: i32, detail: Option<i32>, phrase: &'static str) -> FaultPhrase
{
    FaultPhrase { signal, detail, phrase }
}

/// `si_code` values. These differ between Linux and Darwin for `SIGILL` and `SIGFPE`.
mod si_code
{
    pub const SEGV_MAPERR: i32 = 1;
    pub const SEGV_ACCERR: i32 = 2;
    pub const BUS_ADRALN: i32 = 1;
    pub const BUS_ADRERR: i32 = 2;
    pub const BUS_OBJERR: i32 = 3;
    pub const TRAP_BRKPT: i32 = 1;
    pub const ILL_ILLOPC: i32 = 1;
    pub const ILL_PRVREG: i32 = 6;
    pub const ILL_BADSTK: i32 = 8;

    #[cfg(not(target_vendor = "apple"))]
    mod os
    {
        pub const ILL_PRVOPC: i32 = 5;
        pub const FPE_INTDIV: i32 = 1;
        pub const FPE_INTOVF: i32 = 2;
        pub const FPE_FLTDIV: i32 = 3;
        pub const FPE_FLTOVF: i32 = 4;
        pub const FPE_FLTUND: i32 = 5;
        pub const FPE_FLTRES: i32 = 6;
        pub const FPE_FLTINV: i32 = 7;
        pub const FPE_FLTSUB: i32 = 8;
    }

    #[cfg(target_vendor = "apple")]
    mod os
    {
        pub const ILL_PRVOPC: i32 = 3;
        pub const FPE_FLTDIV: i32 = 1;
        pub const FPE_FLTOVF: i32 = 2;
        pub const FPE_FLTUND: i32 = 3;
        pub const FPE_FLTRES: i32 = 4;
        pub const FPE_FLTINV: i32 = 5;
        pub const FPE_FLTSUB: i32 = 6;
        pub const FPE_INTDIV: i32 = 7;
        pub const FPE_INTOVF: i32 = 8;
    }

    pub use os::*;
}

/// Phrase table for POSIX fault signals.
pub static FAULT_PHRASES: &[FaultPhrase] = &[
    row(libc::SIGSEGV, Some(si_code::SEGV_MAPERR), "an Access Violation"),
    row(libc::SIGSEGV, Some(si_code::SEGV_ACCERR), "an Access Violation"),
    row(libc::SIGSEGV, None, "an Access Violation"),
    row(libc::SIGBUS, Some(si_code::BUS_ADRALN), "a Data Type Misalignment"),
    row(libc::SIGBUS, Some(si_code::BUS_ADRERR), "an In-Page Error"),
    row(libc::SIGBUS, Some(si_code::BUS_OBJERR), "an In-Page Error"),
    row(libc::SIGBUS, None, "a Bus Error"),
    row(libc::SIGILL, Some(si_code::ILL_ILLOPC), "an Illegal Instruction"),
    row(libc::SIGILL, Some(si_code::ILL_PRVOPC), "a Privileged Instruction"),
    row(libc::SIGILL, Some(si_code::ILL_PRVREG), "a Privileged Instruction"),
    row(libc::SIGILL, Some(si_code::ILL_BADSTK), "an Internal Stack Error"),
    row(libc::SIGILL, None, "an Illegal Instruction"),
    row(libc::SIGFPE, Some(si_code::FPE_INTDIV), "an Integer Divide by Zero"),
    row(libc::SIGFPE, Some(si_code::FPE_INTOVF), "an Integer Overflow"),
    row(libc::SIGFPE, Some(si_code::FPE_FLTDIV), "a Float Divide by Zero"),
    row(libc::SIGFPE, Some(si_code::FPE_FLTOVF), "a Float Overflow"),
    row(libc::SIGFPE, Some(si_code::FPE_FLTUND), "a Float Underflow"),
    row(libc::SIGFPE, Some(si_code::FPE_FLTRES), "a Float Inexact Result"),
    row(libc::SIGFPE, Some(si_code::FPE_FLTINV), "a Float Invalid Operation"),
    row(libc::SIGFPE, Some(si_code::FPE_FLTSUB), "an Array Bounds Exceeded"),
    row(libc::SIGFPE, None, "a Floating-Point Exception"),
    row(libc::SIGTRAP, Some(si_code::TRAP_BRKPT), "a Breakpoint"),
    row(libc::SIGTRAP, None, "a Trace Trap"),
    row(libc::SIGABRT, None, "an Abort"),
    row(libc::SIGSYS, None, "a Bad System Call"),
];

static SIGNAL_NAMES: &[(i32, &str)] = &[
    (libc::SIGSEGV, "SIGSEGV"),
    (libc::SIGBUS, "SIGBUS"),
    (libc::SIGILL, "SIGILL"),
    (libc::SIGFPE, "SIGFPE"),
    (libc::SIGTRAP, "SIGTRAP"),
    (libc::SIGABRT, "SIGABRT"),
    (libc::SIGSYS, "SIGSYS"),
];

/// Whether a memory fault at `access` with the stack pointer at
/// `stack_pointer` ran off the end of the stack.
///
/// Pushes, calls and stack probes fault at or just below the stack pointer;
/// stores into a fresh frame fault just above it.
pub fn is_stack_overflow(code: FaultCode, access: Address, stack_pointer: Address) -> bool
{
    code.is_memory_access()
        && !stack_pointer.is_null()
        && access.value().abs_diff(stack_pointer.value()) <= STACK_GUARD_SPAN
}

/// Look `code` up in `table`
///
/// An exact `(signal, detail)` row wins over the signal-wide `None` row.
/// Codes with no row at all yield [`UNKNOWN_PHRASE`], never an empty string.
pub fn phrase_in(table: &[FaultPhrase], code: FaultCode) -> &'static str
{
    let exact = table
        .iter()
        .find(|entry| entry.signal == code.signal && entry.detail == Some(code.detail));
    let fallback = || {
        table
            .iter()
            .find(|entry| entry.signal == code.signal && entry.detail.is_none())
    };

    exact.or_else(fallback).map_or(UNKNOWN_PHRASE, |entry| entry.phrase)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_exact_detail_wins()
    {
        let code = FaultCode::new(libc::SIGFPE, si_code::FPE_INTDIV);
        assert_eq!(code.phrase(), "an Integer Divide by Zero");
    }

    #[test]
    fn test_unlisted_detail_falls_back_to_signal_row()
    {
        let code = FaultCode::new(libc::SIGBUS, 99);
        assert_eq!(code.phrase(), "a Bus Error");
    }

    #[test]
    fn test_unlisted_signals_are_unknown()
    {
        for signal in [0, libc::SIGUSR1, libc::SIGHUP, 200] {
            let phrase = FaultCode::new(signal, 0).phrase();
            assert_eq!(phrase, UNKNOWN_PHRASE);
            assert!(!phrase.is_empty());
        }
    }

    #[test]
    fn test_custom_table()
    {
        let table = [row(42, Some(7), "a Custom Fault")];
        assert_eq!(phrase_in(&table, FaultCode::new(42, 7)), "a Custom Fault");
        assert_eq!(phrase_in(&table, FaultCode::new(42, 8)), UNKNOWN_PHRASE);
    }

    #[test]
    fn test_stack_overflow_needs_access_near_stack_pointer()
    {
        let segv = FaultCode::new(libc::SIGSEGV, si_code::SEGV_ACCERR);
        let sp = Address::new(0x7fff_0000_1000);

        assert!(is_stack_overflow(segv, Address::new(0x7fff_0000_0ff8), sp));
        assert!(is_stack_overflow(segv, Address::new(0x7fff_0000_1100), sp));
        assert!(is_stack_overflow(segv, Address::new(0x7fff_0000_0000), sp));
        assert!(!is_stack_overflow(segv, Address::new(0x7fff_0000_0000 - 8), sp));
        assert!(!is_stack_overflow(segv, Address::new(0x10), sp));
        assert!(!is_stack_overflow(segv, Address::new(0x10), Address::ZERO));

        let ill = FaultCode::new(libc::SIGILL, si_code::ILL_ILLOPC);
        assert!(!is_stack_overflow(ill, sp, sp));
    }

    #[test]
    fn test_display_names_signal()
    {
        let code = FaultCode::new(libc::SIGSEGV, si_code::SEGV_ACCERR);
        assert_eq!(code.to_string(), format!("signal {} (SIGSEGV), code 2", libc::SIGSEGV));
    }
}
