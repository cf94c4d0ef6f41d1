//! # Report Buffer
//!
//! Fixed-capacity text accumulator between the section generators and the
//! report file.
//!
//! The buffer is a plain byte array plus a cursor. It lives inside the
//! process-wide [`FaultTrap`](crate::trap::FaultTrap) and is reused for the
//! whole report, so writing a report costs no allocation and one `write(2)`
//! per buffer-full.
//!
//! ## Flush contract
//!
//! - A write that does not fit in the remaining space flushes first, then
//!   copies. Nothing is dropped.
//! - A flush is exactly one [`ReportSink::write_all`] call carrying the bytes
//!   currently buffered, after which the cursor is zero. Flushing an empty
//!   buffer does nothing.
//! - Text longer than the whole buffer is copied in buffer-sized pieces, each
//!   piece flushed as it fills.

use std::fmt;

/// Capacity of the process-wide report buffer.
pub const REPORT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Destination for flushed report bytes
///
/// Owned by a single report; closing happens on drop.
pub trait ReportSink
{
    /// Write every byte of `bytes`. Returns `false` if the sink failed.
    fn write_all(&mut self, bytes: &[u8]) -> bool;
}

impl<S: ReportSink + ?Sized> ReportSink for &mut S
{
    fn write_all(&mut self, bytes: &[u8]) -> bool
    {
        (**self).write_all(bytes)
    }
}

/// Fixed-size byte array with a write cursor
///
/// The cursor never exceeds `N`.
pub struct ReportBuffer<const N: usize = REPORT_BUFFER_CAPACITY>
{
    bytes: [u8; N],
    cursor: usize,
}

impl<const N: usize> ReportBuffer<N>
{
    /// Empty buffer; usable in a `static`.
    pub const fn new() -> Self
    {
        Self {
            bytes: [0; N],
            cursor: 0,
        }
    }

    /// Total capacity in bytes.
    pub const fn capacity(&self) -> usize
    {
        N
    }

    /// Bytes currently buffered.
    pub const fn len(&self) -> usize
    {
        self.cursor
    }

    pub const fn is_empty(&self) -> bool
    {
        self.cursor == 0
    }

    /// Space left before the next flush.
    pub const fn remaining(&self) -> usize
    {
        N - self.cursor
    }

    /// Buffered bytes.
    pub fn as_bytes(&self) -> &[u8]
    {
        &self.bytes[..self.cursor]
    }

    /// Drop buffered bytes without writing them.
    pub fn clear(&mut self)
    {
        self.cursor = 0;
    }

    /// Borrow the buffer together with the sink its flushes go to.
    pub fn writer<'a, S: ReportSink>(&'a mut self, sink: &'a mut S) -> ReportWriter<'a, S, N>
    {
        ReportWriter {
            buffer: self,
            sink,
            flushes: 0,
            sink_failed: false,
        }
    }

    /// Copy as much of `bytes` as fits; returns the number copied.
    fn fill(&mut self, bytes: &[u8]) -> usize
    {
        let take = bytes.len().min(self.remaining());
        self.bytes[self.cursor..self.cursor + take].copy_from_slice(&bytes[..take]);
        self.cursor += take;
        take
    }
}

impl<const N: usize> Default for ReportBuffer<N>
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// A [`ReportBuffer`] bound to its [`ReportSink`]
///
/// Implements [`fmt::Write`], so sections format straight into the buffer
/// with `write!`. Sink failures are remembered, not returned: the report is
/// best effort and keeps going.
pub struct ReportWriter<'a, S: ReportSink, const N: usize = REPORT_BUFFER_CAPACITY>
{
    buffer: &'a mut ReportBuffer<N>,
    sink: &'a mut S,
    flushes: usize,
    sink_failed: bool,
}

impl<S: ReportSink, const N: usize> ReportWriter<'_, S, N>
{
    /// Append `text`, flushing first if it does not fit.
    pub fn write(&mut self, text: &str)
    {
        let mut bytes = text.as_bytes();
        if bytes.len() > self.buffer.remaining() {
            self.flush();
        }

        while !bytes.is_empty() {
            let copied = self.buffer.fill(bytes);
            bytes = &bytes[copied..];
            if !bytes.is_empty() {
                self.flush();
            }
        }
    }

    /// Hand the buffered bytes to the sink in one call and reset the cursor.
    pub fn flush(&mut self)
    {
        if self.buffer.is_empty() {
            return;
        }

        if !self.sink.write_all(self.buffer.as_bytes()) {
            self.sink_failed = true;
        }
        self.flushes += 1;
        self.buffer.clear();
    }

    /// Number of flushes performed so far.
    pub fn flushes(&self) -> usize
    {
        self.flushes
    }

    /// Whether any flush failed to reach the sink.
    pub fn sink_failed(&self) -> bool
    {
        self.sink_failed
    }
}

impl<S: ReportSink, const N: usize> fmt::Write for ReportWriter<'_, S, N>
{
    fn write_str(&mut self, s: &str) -> fmt::Result
    {
        self.write(s);
        Ok(())
    }
}
