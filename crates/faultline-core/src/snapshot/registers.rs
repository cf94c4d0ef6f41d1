//! Architecture register tables and the captured register set.

use std::fmt;

/// Largest register table of any supported architecture.
pub const MAX_REGISTERS: usize = 34;

/// Report order for x86-64.
///
/// `SS` has no slot in the Linux or macOS signal frame and is always reported
/// as unavailable there; it stays in the table so reports from every platform
/// share one layout.
const X86_64_REGISTERS: [&str; 20] = [
    "RDI", "RSI", "RAX", "RBX", "RCX", "RDX", "RIP", "RBP", "CS", "RFLAGS", "RSP", "SS", "R8", "R9", "R10", "R11",
    "R12", "R13", "R14", "R15",
];

/// Report order for AArch64.
const ARM64_REGISTERS: [&str; 34] = [
    "X0", "X1", "X2", "X3", "X4", "X5", "X6", "X7", "X8", "X9", "X10", "X11", "X12", "X13", "X14", "X15", "X16", "X17",
    "X18", "X19", "X20", "X21", "X22", "X23", "X24", "X25", "X26", "X27", "X28", "FP", "LR", "SP", "PC", "PSTATE",
];

/// CPU architecture of the faulting process
///
/// Owns the ordered register-name table the register section prints. The
/// platform capture routine is the only code that knows how those names map
/// onto the real signal-frame layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture
{
    /// 64-bit x86 (Intel/AMD)
    X86_64,
    /// 64-bit ARM
    Arm64,
    /// Any other architecture; no registers are captured.
    Unknown(&'static str),
}

impl Architecture
{
    /// Architecture this binary was compiled for.
    pub const fn current() -> Self
    {
        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Arm64
        }

        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }

        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
        {
            Architecture::Unknown(std::env::consts::ARCH)
        }
    }

    /// Register names in report order.
    pub const fn register_names(self) -> &'static [&'static str]
    {
        match self {
            Architecture::X86_64 => &X86_64_REGISTERS,
            Architecture::Arm64 => &ARM64_REGISTERS,
            Architecture::Unknown(_) => &[],
        }
    }

    /// Name of the instruction pointer in [`Architecture::register_names`].
    pub const fn instruction_pointer(self) -> Option<&'static str>
    {
        match self {
            Architecture::X86_64 => Some("RIP"),
            Architecture::Arm64 => Some("PC"),
            Architecture::Unknown(_) => None,
        }
    }

    /// Name of the stack pointer in [`Architecture::register_names`].
    pub const fn stack_pointer(self) -> Option<&'static str>
    {
        match self {
            Architecture::X86_64 => Some("RSP"),
            Architecture::Arm64 => Some("SP"),
            Architecture::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Architecture::X86_64 => f.write_str("x86_64"),
            Architecture::Arm64 => f.write_str("aarch64"),
            Architecture::Unknown(name) => f.write_str(name),
        }
    }
}

/// One named machine register
///
/// `value` is `None` when the platform's context did not carry this register;
/// the report prints a placeholder for it instead of a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register
{
    /// Upper-case register name, e.g. `RIP`.
    pub name: &'static str,
    /// Captured value, if available.
    pub value: Option<u64>,
}

impl Register
{
    const EMPTY: Register = Register { name: "", value: None };
}

/// Ordered, fixed-capacity set of registers for one architecture
///
/// Every name from [`Architecture::register_names`] is always present, in
/// order; capture only fills in values. This keeps the register section's
/// layout identical no matter how much of the context was available.
#[derive(Debug, Clone, Copy)]
pub struct RegisterSet
{
    arch: Architecture,
    slots: [Register; MAX_REGISTERS],
    len: usize,
}

impl RegisterSet
{
    /// All registers of `arch`, every value unavailable.
    pub fn new(arch: Architecture) -> Self
    {
        let names = arch.register_names();
        let mut slots = [Register::EMPTY; MAX_REGISTERS];
        for (slot, name) in slots.iter_mut().zip(names) {
            slot.name = *name;
        }

        Self {
            arch,
            slots,
            len: names.len().min(MAX_REGISTERS),
        }
    }

    /// Architecture the names belong to.
    pub const fn architecture(&self) -> Architecture
    {
        self.arch
    }

    /// Record a value for `name`. Returns `false` if the architecture has no such register.
    pub fn set(&mut self, name: &str, value: u64) -> bool
    {
        match self.slots[..self.len].iter_mut().find(|slot| slot.name == name) {
            Some(slot) => {
                slot.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Captured value of `name`; `None` if unknown or unavailable.
    pub fn get(&self, name: &str) -> Option<u64>
    {
        self.as_slice().iter().find(|slot| slot.name == name).and_then(|slot| slot.value)
    }

    /// Registers in report order.
    pub fn as_slice(&self) -> &[Register]
    {
        &self.slots[..self.len]
    }

    /// Iterate registers in report order.
    pub fn iter(&self) -> impl Iterator<Item = &Register>
    {
        self.as_slice().iter()
    }

    /// Number of registers in the architecture's table.
    pub const fn len(&self) -> usize
    {
        self.len
    }

    /// `true` only for [`Architecture::Unknown`].
    pub const fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// Number of registers with a captured value.
    pub fn available(&self) -> usize
    {
        self.iter().filter(|slot| slot.value.is_some()).count()
    }
}
