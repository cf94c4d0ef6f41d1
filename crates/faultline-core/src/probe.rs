//! # Safe Memory Probe
//!
//! Reads of arbitrary, possibly invalid addresses that fail with `None`
//! instead of faulting.
//!
//! Every byte the report prints from process memory (the code bytes at the
//! instruction pointer and the stack words) goes through a [`MemoryProbe`].
//! A single unguarded dereference on the fault path would fault inside the
//! fault handler, so nothing in [`crate::sections`] ever reads memory any other
//! way.
//!
//! The platform implementation lives in [`crate::platform`]: on Linux the
//! kernel performs the copy (`process_vm_readv`, or a pipe as fallback) and
//! reports `EFAULT` for a bad address; on macOS `mach_vm_read_overwrite` does
//! the same through the task port. Either way the bad access never happens in
//! user space, so there is no secondary fault to catch.

use crate::types::Address;

/// Size in bytes of one machine word as dumped by the stack section.
pub const WORD_SIZE: usize = std::mem::size_of::<u64>();

/// Fault-free reads of the current process's memory
///
/// `None` is the "not readable" outcome. Implementations must never raise a
/// signal, block, or allocate.
pub trait MemoryProbe
{
    /// Copy `out.len()` bytes starting at `address` into `out`.
    ///
    /// Returns `false` if any byte of the range could not be read; the
    /// contents of `out` are then unspecified.
    fn read_into(&self, address: Address, out: &mut [u8]) -> bool;

    /// Read one byte.
    fn read_byte(&self, address: Address) -> Option<u8>
    {
        let mut byte = [0u8; 1];
        self.read_into(address, &mut byte).then_some(byte[0])
    }

    /// Read one native-endian machine word.
    ///
    /// The whole word must be readable; a word straddling the end of a
    /// mapping is `None`.
    fn read_word(&self, address: Address) -> Option<u64>
    {
        let mut word = [0u8; WORD_SIZE];
        self.read_into(address, &mut word).then(|| u64::from_ne_bytes(word))
    }
}

impl<P: MemoryProbe + ?Sized> MemoryProbe for &P
{
    fn read_into(&self, address: Address, out: &mut [u8]) -> bool
    {
        (**self).read_into(address, out)
    }
}
