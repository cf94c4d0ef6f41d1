//! # faultline-core
//!
//! In-process crash reporter: catches fatal faults, captures the machine state
//! and writes a plain-text diagnostic report next to the executable.
//!
//! The reporter runs inside the fault handler, where the heap, stdio and
//! locks of the crashing process cannot be trusted. Everything on that path
//! therefore works out of fixed buffers:
//!
//! - [`snapshot`]: the captured registers and fault classification
//! - [`probe`]: memory reads that fail instead of faulting
//! - [`module`]: the loaded image owning the faulting address
//! - [`buffer`]: the fixed report buffer and its flush contract
//! - [`sections`]: the report text, section by section
//! - [`trap`]: the re-entrancy latch and the handler orchestration
//!
//! ## Platform Support
//!
//! - **Linux** and **macOS** on x86-64 and AArch64: POSIX signals
//! - **Windows**: not supported
//!
//! ## Usage
//!
//! ```rust,no_run
//! use faultline_core::ReporterConfig;
//!
//! fn main() -> Result<(), faultline_core::FaultlineError>
//! {
//!     faultline_core::install(ReporterConfig::default())?;
//!     // ... run the application; a fatal fault now leaves
//!     // `<exe>-crashlog.txt` next to the executable.
//!     Ok(())
//! }
//! ```
//!
//! ## Why unsafe code is needed
//!
//! Signal registration, reading the signal frame, and the raw libc queries
//! are FFI calls with no safe wrapper that avoids allocation. Each unsafe
//! block states the invariant it relies on.

#![allow(unsafe_code)] // Required for signal handling and raw libc queries

pub mod buffer;
pub mod config;
pub mod environment;
pub mod error;
pub mod module;
pub mod platform;
pub mod probe;
pub mod sections;
pub mod snapshot;
pub mod trap;
pub mod types;

// Re-export commonly used types
pub use config::ReporterConfig;
pub use error::{FaultlineError, FaultlineResult};
pub use platform::{install, is_installed, trap_state, uninstall};
pub use snapshot::{AccessKind, Architecture, FaultCode, FaultContext, MachineContext};
pub use trap::{Disposition, FaultTrap, GuardLatch, ReportHost, TrapState};
pub use types::Address;
