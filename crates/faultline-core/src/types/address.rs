//! Memory address type.

use std::fmt;
use std::ops::Add;

/// Strongly typed address inside the faulting process
///
/// Every address the reporter handles (instruction pointer, stack pointer,
/// accessed address, probe targets) comes out of a machine context as a raw
/// machine word. Wrapping it keeps addresses from being mixed up with byte
/// counts and register values while a report is assembled.
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::Address;
///
/// let ip = Address::new(0x1000);
/// assert_eq!((ip + 0x10).value(), 0x1010);
/// assert_eq!(ip.to_string(), "0x0000000000001000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address.
    pub const ZERO: Self = Address(0);

    /// Create an address from a raw machine word.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Raw `u64` value, for handing to platform APIs.
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address.
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset, returning `None` on overflow.
    ///
    /// Walks that step through memory (code bytes, stack words) use this so a
    /// context with a bogus pointer near `u64::MAX` ends the walk instead of
    /// wrapping around to low memory.
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Add an offset, saturating at `u64::MAX`.
    pub fn saturating_add(self, offset: u64) -> Self
    {
        Address(self.0.saturating_add(offset))
    }

    /// Distance in bytes from `self` up to `end`, or zero if `end` is below.
    pub fn distance_to(self, end: Address) -> u64
    {
        end.0.saturating_sub(self.0)
    }

    /// Address as a pointer-sized integer for libc calls.
    pub fn as_usize(self) -> usize
    {
        self.0 as usize
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<usize> for Address
{
    fn from(value: usize) -> Self
    {
        Address(value as u64)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}
