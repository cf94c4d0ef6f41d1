//! # Fault Trap
//!
//! The single entry point the platform calls when a fatal fault is delivered.
//!
//! [`FaultTrap`] owns the two pieces of process-wide state the reporter has:
//! the [`GuardLatch`] and the report buffer. Everything else it needs for one
//! report comes from a [`ReportHost`]: the platform backend supplies the real
//! environment, probe, module resolver and output file; tests supply fakes.
//!
//! ## Flow
//!
//! ```text
//! fault ─► latch already set? ──yes──► ContinueSearch
//!                │ no (latch now set)
//!                ▼
//!          capture context ─► report path ─► open file ──fail──► ContinueSearch
//!                                                │
//!                                                ▼
//!          resolve module ─► sections ─► flush ─► close ─► ExecuteHandler
//! ```
//!
//! ## State machine
//!
//! `Armed` (latch clear) to `Fired` (latch set). `Fired` is terminal: nothing
//! re-arms the trap within a process.

use std::cell::UnsafeCell;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::buffer::{ReportBuffer, ReportSink, REPORT_BUFFER_CAPACITY};
use crate::config::ReporterConfig;
use crate::environment::Environment;
use crate::module::{base_name, dir_name, file_stem, ModuleResolver};
use crate::probe::MemoryProbe;
use crate::sections::{self, Report};
use crate::snapshot::MachineContext;
use crate::types::PathString;

/// Stem used when the executable path cannot be determined.
const FALLBACK_STEM: &str = "unknown";

/// What the handler tells the OS to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition
{
    /// The fault was handled; terminate the process.
    ExecuteHandler,
    /// Not handled here; pass the fault on to the next handler in the chain.
    ContinueSearch,
}

/// State of a [`GuardLatch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapState
{
    /// No fault observed yet.
    Armed,
    /// A fault has been observed. Terminal.
    Fired,
}

/// Process-wide single-fire flag
///
/// Clear until the first fault, then set forever. The transition is one
/// atomic swap, so of any number of threads faulting at once exactly one
/// gets to write the report.
#[derive(Debug, Default)]
pub struct GuardLatch
{
    fired: AtomicBool,
}

impl GuardLatch
{
    pub const fn new() -> Self
    {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Set the latch. Returns `true` only for the caller that set it first.
    pub fn try_fire(&self) -> bool
    {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    pub fn state(&self) -> TrapState
    {
        if self.fired.load(Ordering::Acquire) {
            TrapState::Fired
        } else {
            TrapState::Armed
        }
    }
}

/// Collaborators for one [`FaultTrap::handle`] call
///
/// Implemented by the Unix backend with the real platform pieces and by tests
/// with in-memory fakes.
pub trait ReportHost
{
    type Env: Environment;
    type Probe: MemoryProbe;
    type Resolver: ModuleResolver;
    type Sink: ReportSink;

    fn config(&self) -> &ReporterConfig;

    fn environment(&self) -> &Self::Env;

    fn probe(&self) -> &Self::Probe;

    fn resolver(&self) -> &Self::Resolver;

    /// Create or truncate the report file at `path`. `None` if that fails.
    fn open_report(&self, path: &PathString) -> Option<Self::Sink>;
}

/// Report file path for an executable
///
/// `<dir>/<stem><suffix>`, where `dir` is the configured output directory or
/// else the executable's own directory (`.` when neither is known), and
/// `stem` is the executable's file name without its extension. `None` if
/// the result does not fit in a [`PathString`].
pub fn report_path(config: &ReporterConfig, executable: Option<&str>) -> Option<PathString>
{
    let executable = executable.filter(|path| !path.is_empty());
    let dir = config
        .output_dir()
        .and_then(|dir| dir.to_str())
        .or_else(|| executable.and_then(dir_name))
        .unwrap_or(".");
    let stem = executable.map(file_stem).filter(|stem| !stem.is_empty()).unwrap_or(FALLBACK_STEM);

    let mut path = PathString::new();
    let _ = write!(path, "{}/{}{}", dir.trim_end_matches('/'), stem, config.file_suffix());
    (!path.is_truncated()).then_some(path)
}

/// The fault handler's state: guard latch plus the report buffer
///
/// Meant to live in a `static` for the whole process; [`FaultTrap::new`] is
/// `const` for that reason. The buffer is only ever touched by the one
/// invocation that won the latch.
pub struct FaultTrap<const N: usize = REPORT_BUFFER_CAPACITY>
{
    latch: GuardLatch,
    buffer: UnsafeCell<ReportBuffer<N>>,
}

// SAFETY: the buffer is reached only through `handle`, and only by the caller
// for which `GuardLatch::try_fire` returned true. That happens at most once.
unsafe impl<const N: usize> Sync for FaultTrap<N> {}

impl<const N: usize> FaultTrap<N>
{
    pub const fn new() -> Self
    {
        Self {
            latch: GuardLatch::new(),
            buffer: UnsafeCell::new(ReportBuffer::new()),
        }
    }

    pub fn state(&self) -> TrapState
    {
        self.latch.state()
    }

    /// Handle one fault delivery
    ///
    /// Returns [`Disposition::ContinueSearch`] without doing anything if the
    /// latch was already set, and after setting it if the report file cannot be
    /// opened. Otherwise writes the full report and returns
    /// [`Disposition::ExecuteHandler`].
    pub fn handle<C, H>(&self, raw: &C, host: &H) -> Disposition
    where
        C: MachineContext + ?Sized,
        H: ReportHost,
    {
        if !self.latch.try_fire() {
            return Disposition::ContinueSearch;
        }

        let env = host.environment();
        let mut fault = raw.capture();
        if fault.stack_base.is_none() {
            fault.stack_base = env.stack_base(fault.stack_pointer);
        }

        let executable = env.executable_path();
        let Some(path) = report_path(host.config(), executable.as_deref()) else {
            return Disposition::ContinueSearch;
        };
        let Some(mut sink) = host.open_report(&path) else {
            return Disposition::ContinueSearch;
        };

        let module = host.resolver().resolve(fault.fault_address);
        let report = Report {
            fault: &fault,
            module: &module,
            env,
            probe: host.probe(),
            code_bytes: host.config().code_bytes(),
            stack_bytes: host.config().stack_bytes(),
            report_name: base_name(&path),
        };

        // SAFETY: the latch was set by this call, so no other reference to the
        // buffer exists now or later.
        let buffer = unsafe { &mut *self.buffer.get() };
        buffer.clear();
        let mut out = buffer.writer(&mut sink);
        let _ = sections::write_report(&mut out, &report);
        out.flush();
        drop(out);
        drop(sink);

        Disposition::ExecuteHandler
    }
}

impl<const N: usize> Default for FaultTrap<N>
{
    fn default() -> Self
    {
        Self::new()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_latch_fires_once()
    {
        let latch = GuardLatch::new();
        assert_eq!(latch.state(), TrapState::Armed);
        assert!(latch.try_fire());
        assert!(!latch.try_fire());
        assert_eq!(latch.state(), TrapState::Fired);
    }

    #[test]
    fn test_latch_single_winner_across_threads()
    {
        let latch = GuardLatch::new();
        let winners = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| latch.try_fire())).collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|won| *won)
                .count()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_report_path_next_to_executable()
    {
        let config = ReporterConfig::default();
        let path = report_path(&config, Some("/opt/game/bin/game.x86_64")).unwrap();
        assert_eq!(path.as_str(), "/opt/game/bin/game-crashlog.txt");
    }

    #[test]
    fn test_report_path_output_dir_override()
    {
        let config = ReporterConfig::default().with_output_dir("/var/crash/").with_file_suffix(".log");
        let path = report_path(&config, Some("/usr/bin/server")).unwrap();
        assert_eq!(path.as_str(), "/var/crash/server.log");
    }

    #[test]
    fn test_report_path_without_executable()
    {
        let config = ReporterConfig::default();
        let path = report_path(&config, None).unwrap();
        assert_eq!(path.as_str(), "./unknown-crashlog.txt");
    }

    #[test]
    fn test_report_path_too_long()
    {
        let long = format!("/{}", "d".repeat(2000));
        let config = ReporterConfig::default().with_output_dir(long);
        assert!(report_path(&config, Some("/bin/app")).is_none());
    }
}
