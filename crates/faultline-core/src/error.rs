//! # Error Types
//!
//! Errors for the install-time surface of the reporter.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Nothing on the fault path returns these. Once a fault is being reported the
//! process is already dying, so every failure there is absorbed locally
//! (placeholder text, skipped section, or a deferral to the next handler).

use thiserror::Error;

/// Main error type for installing and configuring the reporter
///
/// ## Error Categories
///
/// 1. **Configuration errors**: InvalidConfig
/// 2. **Lifecycle errors**: AlreadyInstalled, NotInstalled
/// 3. **Platform errors**: InstallFailed, Unsupported
/// 4. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum FaultlineError
{
    /// A [`ReporterConfig`](crate::config::ReporterConfig) value failed validation
    ///
    /// The string names the offending field and the accepted range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `install()` was called while a reporter is already installed
    ///
    /// The handler is meant to be registered once at process start and kept
    /// for the lifetime of the process.
    #[error("Crash reporter is already installed")]
    AlreadyInstalled,

    /// `uninstall()` was called without a prior successful `install()`
    #[error("Crash reporter is not installed")]
    NotInstalled,

    /// The OS refused to register the handler for a signal
    ///
    /// Any handlers registered before the failing one are rolled back.
    #[error("Failed to install handler for signal {signal}: {source}")]
    InstallFailed
    {
        /// Signal number that could not be registered
        signal: i32,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The current platform has no fault-capture backend
    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    /// I/O error (alternate stack allocation, probe pipe creation, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, FaultlineError>`
///
/// ```rust
/// use faultline_core::error::FaultlineResult;
/// fn foo() -> FaultlineResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type FaultlineResult<T> = std::result::Result<T, FaultlineError>;
