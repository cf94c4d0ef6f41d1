//! Report file opened with raw `open(2)` and written with `write(2)`.

use std::ffi::CStr;

use crate::buffer::ReportSink;

/// Owned file descriptor for one report
///
/// Closed when dropped.
#[derive(Debug)]
pub struct FdSink
{
    fd: libc::c_int,
}

impl FdSink
{
    /// Create or truncate `path` for appending. `None` if the open fails.
    pub fn create(path: &CStr) -> Option<Self>
    {
        let flags = libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_APPEND | libc::O_CLOEXEC;
        // SAFETY: `path` is NUL-terminated.
        let fd = unsafe { libc::open(path.as_ptr(), flags, 0o644 as libc::c_uint) };
        (fd >= 0).then_some(Self { fd })
    }
}

impl ReportSink for FdSink
{
    fn write_all(&mut self, mut bytes: &[u8]) -> bool
    {
        while !bytes.is_empty() {
            // SAFETY: `bytes` is a valid readable slice.
            let written = unsafe { libc::write(self.fd, bytes.as_ptr().cast(), bytes.len()) };
            if written < 0 {
                if std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return false;
            }
            if written == 0 {
                return false;
            }
            bytes = &bytes[written as usize..];
        }
        true
    }
}

impl Drop for FdSink
{
    fn drop(&mut self)
    {
        // SAFETY: `fd` was opened by `create` and is closed only here.
        unsafe { libc::close(self.fd) };
    }
}
