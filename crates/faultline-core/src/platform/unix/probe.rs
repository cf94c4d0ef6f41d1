//! # Kernel-Mediated Memory Probe
//!
//! [`UnixProbe`] implements [`MemoryProbe`] by asking the kernel to copy
//! memory on our behalf. A bad address makes the copy fail with an error
//! code; it is never dereferenced in user space, so probing cannot fault.
//!
//! ## Methods
//!
//! - **Linux**: `process_vm_readv(2)` on our own pid. If the syscall is
//!   unavailable (`ENOSYS` on ancient kernels, `EPERM` under some seccomp
//!   profiles) the probe switches, once and for good, to writing the range
//!   into a non-blocking pipe and reading it back. `write(2)` from a bad
//!   buffer fails with `EFAULT` the same way.
//! - **macOS**: `mach_vm_read_overwrite` on `mach_task_self()`.
//!
//! Both are plain syscalls: no allocation, no locks, safe in a signal handler.

#[cfg(any(target_os = "linux", target_os = "android"))]
use std::io;
#[cfg(any(target_os = "linux", target_os = "android"))]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(target_vendor = "apple")]
use mach2::kern_return::KERN_SUCCESS;
#[cfg(target_vendor = "apple")]
use mach2::traps::mach_task_self;
#[cfg(target_vendor = "apple")]
use mach2::vm::mach_vm_read_overwrite;
#[cfg(target_vendor = "apple")]
use mach2::vm_types::{mach_vm_address_t, mach_vm_size_t};

use crate::error::FaultlineResult;
use crate::probe::MemoryProbe;
use crate::types::Address;

/// Memory probe for the current process
#[derive(Debug)]
pub struct UnixProbe
{
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pid: libc::pid_t,
    /// `[read end, write end]` of the fallback pipe.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pipe: [libc::c_int; 2],
    /// Set once `process_vm_readv` is known not to work here.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    use_pipe: AtomicBool,
}

impl UnixProbe
{
    /// Create the probe, including the fallback pipe where one is used.
    ///
    /// ## Errors
    ///
    /// [`FaultlineError::Io`](crate::FaultlineError::Io) if the pipe cannot
    /// be created.
    pub fn new() -> FaultlineResult<Self>
    {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            let mut pipe = [-1; 2];
            // SAFETY: `pipe` is a valid two-element out array.
            if unsafe { libc::pipe2(pipe.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) } != 0 {
                return Err(io::Error::last_os_error().into());
            }

            Ok(Self {
                // SAFETY: getpid cannot fail.
                pid: unsafe { libc::getpid() },
                pipe,
                use_pipe: AtomicBool::new(false),
            })
        }

        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        {
            Ok(Self {})
        }
    }

    /// Whether reads go through the pipe instead of `process_vm_readv`.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn uses_pipe(&self) -> bool
    {
        self.use_pipe.load(Ordering::Relaxed)
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub fn uses_pipe(&self) -> bool
    {
        false
    }

    /// Copy with `process_vm_readv`. `Err` carries the errno when the syscall
    /// itself is unusable rather than the address being bad.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn read_vm(&self, address: Address, out: &mut [u8]) -> Result<bool, i32>
    {
        let local = libc::iovec {
            iov_base: out.as_mut_ptr().cast(),
            iov_len: out.len(),
        };
        let remote = libc::iovec {
            iov_base: address.as_usize() as *mut libc::c_void,
            iov_len: out.len(),
        };

        // SAFETY: `local` covers exactly `out`; the kernel validates `remote`.
        let copied = unsafe { libc::process_vm_readv(self.pid, &local, 1, &remote, 1, 0) };
        if copied >= 0 {
            return Ok(copied as usize == out.len());
        }

        match io::Error::last_os_error().raw_os_error() {
            Some(errno @ (libc::ENOSYS | libc::EPERM)) => Err(errno),
            _ => Ok(false),
        }
    }

    /// Copy through the pipe: the kernel reads `address` during `write(2)`.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn read_pipe(&self, address: Address, out: &mut [u8]) -> bool
    {
        let [read_end, write_end] = self.pipe;

        // SAFETY: the kernel validates the source range and reports EFAULT.
        let written = unsafe { libc::write(write_end, address.as_usize() as *const libc::c_void, out.len()) };
        if written <= 0 {
            return false;
        }

        let written = written as usize;
        let mut received = 0;
        while received < written {
            // SAFETY: reads at most the bytes remaining in `out`.
            let chunk = unsafe {
                libc::read(
                    read_end,
                    out[received..].as_mut_ptr().cast(),
                    (written - received).min(out.len() - received),
                )
            };
            if chunk <= 0 {
                return false;
            }
            received += chunk as usize;
        }

        written == out.len()
    }
}

impl MemoryProbe for UnixProbe
{
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn read_into(&self, address: Address, out: &mut [u8]) -> bool
    {
        if out.is_empty() {
            return true;
        }

        if !self.uses_pipe() {
            match self.read_vm(address, out) {
                Ok(done) => return done,
                Err(_) => self.use_pipe.store(true, Ordering::Relaxed),
            }
        }
        self.read_pipe(address, out)
    }

    #[cfg(target_vendor = "apple")]
    fn read_into(&self, address: Address, out: &mut [u8]) -> bool
    {
        if out.is_empty() {
            return true;
        }

        let mut copied: mach_vm_size_t = 0;
        // SAFETY: the destination is `out`; the kernel validates the source.
        let result = unsafe {
            mach_vm_read_overwrite(
                mach_task_self(),
                address.value() as mach_vm_address_t,
                out.len() as mach_vm_size_t,
                out.as_mut_ptr() as mach_vm_address_t,
                &mut copied,
            )
        };

        result == KERN_SUCCESS && copied as usize == out.len()
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
    fn read_into(&self, _address: Address, _out: &mut [u8]) -> bool
    {
        false
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl Drop for UnixProbe
{
    fn drop(&mut self)
    {
        for fd in self.pipe {
            // SAFETY: both fds were opened by `new` and are owned by us.
            unsafe { libc::close(fd) };
        }
    }
}
