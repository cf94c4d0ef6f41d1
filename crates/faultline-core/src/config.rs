//! # Reporter Configuration
//!
//! Settings fixed at [`install`](crate::install) time. Everything here is
//! validated before any signal handler is registered, so the fault path can
//! trust it without checks.

use std::path::{Path, PathBuf};

use crate::error::{FaultlineError, FaultlineResult};
use crate::probe::WORD_SIZE;
use crate::types::NAME_CAPACITY;

/// Default suffix appended to the executable stem to name the report.
pub const DEFAULT_FILE_SUFFIX: &str = "-crashlog.txt";

/// Default number of bytes dumped at the instruction pointer.
pub const DEFAULT_CODE_BYTES: usize = 16;

/// Largest accepted `code_bytes`.
pub const MAX_CODE_BYTES: usize = 256;

/// Default bound on the stack dump, in bytes.
pub const DEFAULT_STACK_BYTES: usize = 3072;

/// Default alternate signal stack size.
pub const DEFAULT_ALT_STACK_SIZE: usize = 64 * 1024;

/// Smallest accepted alternate signal stack.
pub const MIN_ALT_STACK_SIZE: usize = 16 * 1024;

/// Signals intercepted by default.
pub const FATAL_SIGNALS: [i32; 7] = [
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGILL,
    libc::SIGFPE,
    libc::SIGABRT,
    libc::SIGTRAP,
    libc::SIGSYS,
];

/// Configuration for the crash reporter
///
/// ## Example
///
/// ```rust
/// use faultline_core::ReporterConfig;
///
/// let config = ReporterConfig::default()
///     .with_output_dir("/var/crash")
///     .with_stack_bytes(1024)
///     .with_signals([libc::SIGSEGV, libc::SIGBUS]);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.code_bytes(), 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig
{
    output_dir: Option<PathBuf>,
    file_suffix: String,
    code_bytes: usize,
    stack_bytes: usize,
    signals: Vec<i32>,
    alt_stack_size: usize,
}

impl Default for ReporterConfig
{
    fn default() -> Self
    {
        Self {
            output_dir: None,
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
            code_bytes: DEFAULT_CODE_BYTES,
            stack_bytes: DEFAULT_STACK_BYTES,
            signals: FATAL_SIGNALS.to_vec(),
            alt_stack_size: DEFAULT_ALT_STACK_SIZE,
        }
    }
}

impl ReporterConfig
{
    /// Write reports into `dir` instead of next to the executable.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self
    {
        self.output_dir = Some(dir.into());
        self
    }

    /// Suffix appended to the executable stem.
    pub fn with_file_suffix(mut self, suffix: impl Into<String>) -> Self
    {
        self.file_suffix = suffix.into();
        self
    }

    /// Number of bytes dumped at the instruction pointer.
    pub fn with_code_bytes(mut self, count: usize) -> Self
    {
        self.code_bytes = count;
        self
    }

    /// Upper bound on the stack dump, in bytes.
    pub fn with_stack_bytes(mut self, count: usize) -> Self
    {
        self.stack_bytes = count;
        self
    }

    /// Signals to intercept.
    pub fn with_signals(mut self, signals: impl IntoIterator<Item = i32>) -> Self
    {
        self.signals = signals.into_iter().collect();
        self
    }

    /// Size of the alternate signal stack.
    pub fn with_alt_stack_size(mut self, size: usize) -> Self
    {
        self.alt_stack_size = size;
        self
    }

    pub fn output_dir(&self) -> Option<&Path>
    {
        self.output_dir.as_deref()
    }

    pub fn file_suffix(&self) -> &str
    {
        &self.file_suffix
    }

    pub fn code_bytes(&self) -> usize
    {
        self.code_bytes
    }

    pub fn stack_bytes(&self) -> usize
    {
        self.stack_bytes
    }

    pub fn signals(&self) -> &[i32]
    {
        &self.signals
    }

    pub fn alt_stack_size(&self) -> usize
    {
        self.alt_stack_size
    }

    /// Check every field.
    ///
    /// ## Errors
    ///
    /// [`FaultlineError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> FaultlineResult<()>
    {
        if self.file_suffix.is_empty() {
            return Err(invalid("file suffix must not be empty"));
        }
        if self.file_suffix.contains('/') || self.file_suffix.contains('\0') {
            return Err(invalid(format!("file suffix {:?} must be a plain file name part", self.file_suffix)));
        }
        if self.file_suffix.len() >= NAME_CAPACITY {
            return Err(invalid(format!("file suffix is longer than {} bytes", NAME_CAPACITY - 1)));
        }
        if !(1..=MAX_CODE_BYTES).contains(&self.code_bytes) {
            return Err(invalid(format!(
                "code bytes must be between 1 and {MAX_CODE_BYTES}, got {}",
                self.code_bytes
            )));
        }
        if self.stack_bytes == 0 || self.stack_bytes % WORD_SIZE != 0 {
            return Err(invalid(format!(
                "stack bytes must be a positive multiple of {WORD_SIZE}, got {}",
                self.stack_bytes
            )));
        }
        if self.alt_stack_size < MIN_ALT_STACK_SIZE {
            return Err(invalid(format!(
                "alternate stack must be at least {MIN_ALT_STACK_SIZE} bytes, got {}",
                self.alt_stack_size
            )));
        }
        if self.signals.is_empty() {
            return Err(invalid("no signals selected"));
        }
        if let Some(signal) = self.signals.iter().find(|signal| !FATAL_SIGNALS.contains(signal)) {
            return Err(invalid(format!("signal {signal} is not a fault signal")));
        }
        if let Some(dir) = &self.output_dir {
            if dir.to_str().is_none() {
                return Err(invalid(format!("output directory {} is not valid UTF-8", dir.display())));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> FaultlineError
{
    FaultlineError::InvalidConfig(message.into())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_default_is_valid()
    {
        let config = ReporterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.file_suffix(), "-crashlog.txt");
        assert_eq!(config.stack_bytes(), 3072);
        assert_eq!(config.signals().len(), FATAL_SIGNALS.len());
        assert!(config.output_dir().is_none());
    }

    #[test]
    fn test_rejects_bad_fields()
    {
        let cases = [
            ReporterConfig::default().with_file_suffix(""),
            ReporterConfig::default().with_file_suffix("/crash.txt"),
            ReporterConfig::default().with_code_bytes(0),
            ReporterConfig::default().with_code_bytes(MAX_CODE_BYTES + 1),
            ReporterConfig::default().with_stack_bytes(0),
            ReporterConfig::default().with_stack_bytes(3071),
            ReporterConfig::default().with_alt_stack_size(4096),
            ReporterConfig::default().with_signals([]),
            ReporterConfig::default().with_signals([libc::SIGINT]),
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(FaultlineError::InvalidConfig(_))),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn test_builder_sets_fields()
    {
        let config = ReporterConfig::default()
            .with_output_dir("/tmp/reports")
            .with_file_suffix(".crash")
            .with_code_bytes(32)
            .with_alt_stack_size(MIN_ALT_STACK_SIZE);

        assert!(config.validate().is_ok());
        assert_eq!(config.output_dir(), Some(Path::new("/tmp/reports")));
        assert_eq!(config.file_suffix(), ".crash");
        assert_eq!(config.code_bytes(), 32);
    }
}
