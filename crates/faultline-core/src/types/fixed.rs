//! Fixed-capacity strings for the fault path.

use std::ffi::CStr;
use std::fmt;
use std::ops::Deref;

/// Capacity used for file-system paths gathered during a report.
pub const PATH_CAPACITY: usize = 1024;

/// Capacity used for short names (user, module, OS fields).
pub const NAME_CAPACITY: usize = 256;

/// A path-sized [`FixedString`].
pub type PathString = FixedString<PATH_CAPACITY>;

/// A name-sized [`FixedString`].
pub type NameString = FixedString<NAME_CAPACITY>;

/// UTF-8 string stored inline in a `[u8; N]`
///
/// The reporter cannot touch the heap once a fault is in flight, so every
/// string it gathers from the OS (executable path, user name, module name) is
/// copied into one of these on the stack. Text that does not fit is cut at the
/// last whole character rather than growing the storage.
///
/// One byte of the array is reserved for a trailing NUL, so the contents can
/// be handed to libc with [`FixedString::as_c_str`] without copying.
///
/// ## Example
///
/// ```rust
/// use std::fmt::Write;
///
/// use faultline_core::types::FixedString;
///
/// let mut name = FixedString::<8>::new();
/// write!(name, "{}-{}", "core", 42).unwrap();
/// assert_eq!(name.as_str(), "core-42");
///
/// let cut = FixedString::<4>::from_str_truncating("abcdef");
/// assert_eq!(cut.as_str(), "abc");
/// assert!(cut.is_truncated());
/// ```
#[derive(Clone, Copy)]
pub struct FixedString<const N: usize>
{
    bytes: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> FixedString<N>
{
    /// Empty string.
    pub const fn new() -> Self
    {
        Self {
            bytes: [0; N],
            len: 0,
            truncated: false,
        }
    }

    /// Copy `text`, truncating if it does not fit.
    pub fn from_str_truncating(text: &str) -> Self
    {
        let mut out = Self::new();
        out.push_str(text);
        out
    }

    /// Copy raw OS bytes, replacing invalid UTF-8 sequences with `?`.
    pub fn from_bytes_lossy(bytes: &[u8]) -> Self
    {
        let mut out = Self::new();
        out.push_lossy(bytes);
        out
    }

    /// Maximum number of text bytes this string can hold.
    pub const fn capacity() -> usize
    {
        N.saturating_sub(1)
    }

    /// Append as much of `text` as fits. Returns `false` if anything was cut.
    pub fn push_str(&mut self, text: &str) -> bool
    {
        let room = Self::capacity() - self.len;
        let mut take = text.len().min(room);
        while !text.is_char_boundary(take) {
            take -= 1;
        }

        self.bytes[self.len..self.len + take].copy_from_slice(&text.as_bytes()[..take]);
        self.len += take;
        if N > 0 {
            self.bytes[self.len] = 0;
        }

        if take < text.len() {
            self.truncated = true;
            return false;
        }
        true
    }

    /// Append raw bytes, replacing each invalid UTF-8 sequence with `?`.
    pub fn push_lossy(&mut self, mut bytes: &[u8])
    {
        while !bytes.is_empty() {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = bytes.split_at(err.valid_up_to());
                    self.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    self.push_str("?");
                    let skip = err.error_len().unwrap_or(rest.len());
                    bytes = &rest[skip..];
                }
            }
        }
    }

    /// Reset to the empty string.
    pub fn clear(&mut self)
    {
        self.len = 0;
        self.truncated = false;
        if N > 0 {
            self.bytes[0] = 0;
        }
    }

    /// Contents as a string slice.
    pub fn as_str(&self) -> &str
    {
        std::str::from_utf8(&self.bytes[..self.len]).unwrap_or_default()
    }

    /// Contents as a NUL-terminated C string.
    ///
    /// Returns `None` if the text itself contains a NUL byte.
    pub fn as_c_str(&self) -> Option<&CStr>
    {
        if N == 0 {
            return None;
        }
        CStr::from_bytes_with_nul(&self.bytes[..=self.len]).ok()
    }

    /// Whether some text was dropped because the capacity ran out.
    pub const fn is_truncated(&self) -> bool
    {
        self.truncated
    }
}

impl<const N: usize> Default for FixedString<N>
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl<const N: usize> Deref for FixedString<N>
{
    type Target = str;

    fn deref(&self) -> &str
    {
        self.as_str()
    }
}

impl<const N: usize> fmt::Write for FixedString<N>
{
    fn write_str(&mut self, s: &str) -> fmt::Result
    {
        // Truncation is not an error: a shortened path is still useful in a crash report.
        self.push_str(s);
        Ok(())
    }
}

impl<const N: usize> fmt::Display for FixedString<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> fmt::Debug for FixedString<N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> PartialEq for FixedString<N>
{
    fn eq(&self, other: &Self) -> bool
    {
        self.as_str() == other.as_str()
    }
}

impl<const N: usize> Eq for FixedString<N> {}

#[cfg(test)]
mod tests
{
    use std::fmt::Write;

    use super::*;

    #[test]
    fn test_truncates_on_char_boundary()
    {
        // "é" is two bytes; only one byte of room remains after "ab".
        let s = FixedString::<4>::from_str_truncating("abé");
        assert_eq!(s.as_str(), "ab");
        assert!(s.is_truncated());
    }

    #[test]
    fn test_write_macro_never_fails()
    {
        let mut s = FixedString::<6>::new();
        assert!(write!(s, "{}", 1234567).is_ok());
        assert_eq!(s.as_str(), "12345");
    }

    #[test]
    fn test_lossy_replaces_invalid_utf8()
    {
        let s = FixedString::<16>::from_bytes_lossy(b"us\xffer");
        assert_eq!(s.as_str(), "us?er");
    }

    #[test]
    fn test_c_str_is_nul_terminated()
    {
        let mut s = FixedString::<16>::from_str_truncating("/tmp/longer");
        s.clear();
        s.push_str("/tmp");
        assert_eq!(s.as_c_str().unwrap().to_bytes(), b"/tmp");
    }
}
