//! # Faultline Utilities
//!
//! Shared logging setup for the Faultline workspace.
//!
//! Logging here is for normal operation only: installing the reporter, CLI
//! commands, diagnostics. The fault handler itself never logs through
//! `tracing`, since a subscriber may allocate or lock.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
