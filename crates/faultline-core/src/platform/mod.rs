//! # Platform Backends
//!
//! The code that knows how the OS delivers faults and how to query it.
//!
//! Each backend provides the real implementations of the collaborator traits
//! ([`Environment`](crate::environment::Environment),
//! [`MemoryProbe`](crate::probe::MemoryProbe),
//! [`ModuleResolver`](crate::module::ModuleResolver),
//! [`ReportSink`](crate::buffer::ReportSink)) plus the install/uninstall
//! lifecycle:
//!
//! - **Unix** (Linux, macOS): POSIX signals with `SA_SIGINFO`
//!   - See: [sigaction(2)](https://man7.org/linux/man-pages/man2/sigaction.2.html)
//!   - See: [sigaltstack(2)](https://man7.org/linux/man-pages/man2/sigaltstack.2.html)
//!
//! Windows structured exception handling has no backend; on such targets
//! `install` returns [`FaultlineError::Unsupported`](crate::FaultlineError::Unsupported).

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::{install, is_installed, trap_state, uninstall};

#[cfg(not(unix))]
mod unsupported
{
    use crate::config::ReporterConfig;
    use crate::error::{FaultlineError, FaultlineResult};
    use crate::trap::TrapState;

    pub fn install(config: ReporterConfig) -> FaultlineResult<()>
    {
        config.validate()?;
        Err(FaultlineError::Unsupported(std::env::consts::OS.to_string()))
    }

    pub fn uninstall() -> FaultlineResult<()>
    {
        Err(FaultlineError::NotInstalled)
    }

    pub fn is_installed() -> bool
    {
        false
    }

    pub fn trap_state() -> TrapState
    {
        TrapState::Armed
    }
}

#[cfg(not(unix))]
pub use unsupported::{install, is_installed, trap_state, uninstall};
