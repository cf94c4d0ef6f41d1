//! # Machine Snapshot
//!
//! The immutable record of what the CPU looked like when the fault hit.
//!
//! A [`FaultContext`] is built exactly once per fault, inside the trap, from
//! whatever the OS handed to the handler. The platform-specific capture routine
//! (see [`crate::platform`]) is the only code that knows the real layout of a
//! signal frame; everything downstream only sees named registers and typed
//! addresses.
//!
//! Capture never fails. A field the platform cannot supply is left as the
//! "unavailable" sentinel (`None`) and printed as a placeholder.

pub mod classify;
pub mod registers;

pub use classify::{
    is_stack_overflow, phrase_in, FaultCode, FaultPhrase, FAULT_PHRASES, STACK_GUARD_SPAN, STACK_OVERFLOW_PHRASE,
    UNKNOWN_PHRASE,
};
pub use registers::{Architecture, Register, RegisterSet, MAX_REGISTERS};

use crate::types::Address;

/// Kind of memory operation that faulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind
{
    /// A load from memory.
    Read,
    /// A store to memory.
    Write,
    /// An instruction fetch.
    Execute,
    /// The hardware state did not say.
    Unknown,
}

impl AccessKind
{
    /// Past participle used in "The memory could not be ...".
    pub const fn participle(self) -> &'static str
    {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "written",
            AccessKind::Execute => "executed",
            AccessKind::Unknown => "accessed",
        }
    }
}

/// Address and direction of a faulting memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAccess
{
    /// Address the instruction tried to touch.
    pub address: Address,
    /// What it tried to do there.
    pub kind: AccessKind,
}

/// Snapshot of the faulting thread
///
/// ## Lifecycle
///
/// Built once inside [`FaultTrap::handle`](crate::trap::FaultTrap::handle),
/// read-only afterwards, and dropped when the handler returns.
///
/// ## Example
///
/// A simulated write fault, as the tests build them:
///
/// ```rust
/// use faultline_core::snapshot::{AccessKind, Architecture, FaultCode, FaultContext};
/// use faultline_core::types::Address;
///
/// let fault = FaultContext::new(FaultCode::new(libc::SIGSEGV, 1), Address::new(0x1000), Architecture::X86_64)
///     .with_access(Address::new(0x2000), AccessKind::Write)
///     .with_register("RIP", 0x1000);
///
/// assert_eq!(fault.phrase(), "an Access Violation");
/// assert_eq!(fault.registers.get("RIP"), Some(0x1000));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FaultContext
{
    /// Platform fault code.
    pub code: FaultCode,
    /// Instruction pointer at fault time.
    pub fault_address: Address,
    /// Populated only for memory-access faults.
    pub access: Option<MemoryAccess>,
    /// Architecture registers in report order.
    pub registers: RegisterSet,
    /// Stack pointer at fault time.
    pub stack_pointer: Address,
    /// Highest address of the faulting thread's stack, if known.
    ///
    /// The stack dump never reads at or beyond this address.
    pub stack_base: Option<Address>,
}

impl FaultContext
{
    /// A context with no registers, no access detail, and an unknown stack.
    pub fn new(code: FaultCode, fault_address: Address, arch: Architecture) -> Self
    {
        Self {
            code,
            fault_address,
            access: None,
            registers: RegisterSet::new(arch),
            stack_pointer: Address::ZERO,
            stack_base: None,
        }
    }

    /// Attach the accessed address and direction of a memory fault.
    pub fn with_access(mut self, address: Address, kind: AccessKind) -> Self
    {
        self.access = Some(MemoryAccess { address, kind });
        self
    }

    /// Record one register value by name.
    pub fn with_register(mut self, name: &str, value: u64) -> Self
    {
        self.registers.set(name, value);
        self
    }

    /// Set the stack bounds used by the stack dump.
    pub fn with_stack(mut self, stack_pointer: Address, stack_base: Option<Address>) -> Self
    {
        self.stack_pointer = stack_pointer;
        self.stack_base = stack_base;
        self
    }

    /// Header phrase: a stack overflow, or whatever the code's table row says.
    pub fn phrase(&self) -> &'static str
    {
        match self.access {
            Some(access) if is_stack_overflow(self.code, access.address, self.stack_pointer) => STACK_OVERFLOW_PHRASE,
            _ => self.code.phrase(),
        }
    }
}

/// Source of a [`FaultContext`]
///
/// Implemented by the platform's raw signal context. `FaultContext` itself
/// implements it too, so an already-built snapshot can be fed to the trap
/// when simulating a fault.
pub trait MachineContext
{
    /// Pure transformation from the raw context: no I/O, no allocation.
    fn capture(&self) -> FaultContext;
}

impl MachineContext for FaultContext
{
    fn capture(&self) -> FaultContext
    {
        *self
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_access_kind_participles()
    {
        assert_eq!(AccessKind::Read.participle(), "read");
        assert_eq!(AccessKind::Write.participle(), "written");
        assert_eq!(AccessKind::Execute.participle(), "executed");
        assert_eq!(AccessKind::Unknown.participle(), "accessed");
    }

    #[test]
    fn test_access_at_stack_pointer_is_stack_overflow()
    {
        let sp = Address::new(0x7ffd_1c00_0000);
        let fault = FaultContext::new(FaultCode::new(libc::SIGSEGV, 2), Address::new(0x40_1000), Architecture::X86_64)
            .with_stack(sp, None);

        assert_eq!(fault.phrase(), "an Access Violation");
        let overflow = fault.with_access(Address::new(sp.value() - 8), AccessKind::Write);
        assert_eq!(overflow.phrase(), STACK_OVERFLOW_PHRASE);
        let wild = fault.with_access(Address::new(0x10), AccessKind::Write);
        assert_eq!(wild.phrase(), "an Access Violation");
    }

    #[test]
    fn test_capture_of_simulated_context_is_identity()
    {
        let fault = FaultContext::new(FaultCode::new(libc::SIGILL, 1), Address::new(0x40), Architecture::Arm64)
            .with_register("PC", 0x40)
            .with_stack(Address::new(0x7000), Some(Address::new(0x8000)));
        let captured = fault.capture();

        assert_eq!(captured.fault_address, Address::new(0x40));
        assert_eq!(captured.registers.get("PC"), Some(0x40));
        assert_eq!(captured.stack_base, Some(Address::new(0x8000)));
        assert!(captured.access.is_none());
    }
}
