//! # Unix Signal Backend
//!
//! Registers the reporter for the fault signals and connects the signal
//! handler to the process-wide [`FaultTrap`].
//!
//! ## Handler flow
//!
//! 1. The kernel delivers a fault signal on the alternate signal stack.
//! 2. [`SignalContext`] wraps `siginfo_t`/`ucontext_t` for capture.
//! 3. [`FaultTrap::handle`] writes the report through [`UnixHost`].
//! 4. The disposition is carried out:
//!    - `ExecuteHandler`: restore the default action and re-raise, so the
//!      process dies of the original signal (exit status and core dump intact).
//!    - `ContinueSearch`: call whatever handler was installed before ours.
//!
//! ## Installed state
//!
//! The settings, probe and previous handlers live in one heap block
//! published through an atomic pointer before the first `sigaction`, so the
//! handler reads them without locks. `uninstall` restores the previous
//! handlers before retiring the block.
//!
//! The alternate signal stack is registered for the installing thread only.
//! Faults on other threads run the handler on that thread's normal stack,
//! which is enough for everything except stack overflow.

pub mod context;
pub mod file;
pub mod module;
pub mod probe;
pub mod system;

use std::ffi::c_void;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Mutex;

use libc::{c_int, siginfo_t};
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

pub use context::SignalContext;
pub use file::FdSink;
pub use module::DlAddrResolver;
pub use probe::UnixProbe;
pub use system::UnixEnvironment;

use crate::config::ReporterConfig;
use crate::error::{FaultlineError, FaultlineResult};
use crate::trap::{Disposition, FaultTrap, ReportHost, TrapState};
use crate::types::PathString;

/// The process-wide trap: guard latch and report buffer.
static FAULT_TRAP: FaultTrap = FaultTrap::new();

/// Installed state, or null.
static INSTALLED: AtomicPtr<Installed> = AtomicPtr::new(ptr::null_mut());

/// Serialises `install` and `uninstall`.
static LIFECYCLE: Mutex<()> = Mutex::new(());

static PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 { 4096 } else { size as usize }
});

/// Everything the handler needs, fixed at install time
struct Installed
{
    config: ReporterConfig,
    env: UnixEnvironment,
    probe: UnixProbe,
    resolver: DlAddrResolver,
    previous: Vec<(c_int, libc::sigaction)>,
    alt_stack: Option<AltStack>,
}

impl Installed
{
    fn previous_action(&self, signal: c_int) -> Option<&libc::sigaction>
    {
        self.previous
            .iter()
            .find(|(installed, _)| *installed == signal)
            .map(|(_, action)| action)
    }
}

/// [`ReportHost`] over the installed state
struct UnixHost<'a>
{
    state: &'a Installed,
}

impl ReportHost for UnixHost<'_>
{
    type Env = UnixEnvironment;
    type Probe = UnixProbe;
    type Resolver = DlAddrResolver;
    type Sink = FdSink;

    fn config(&self) -> &ReporterConfig
    {
        &self.state.config
    }

    fn environment(&self) -> &UnixEnvironment
    {
        &self.state.env
    }

    fn probe(&self) -> &UnixProbe
    {
        &self.state.probe
    }

    fn resolver(&self) -> &DlAddrResolver
    {
        &self.state.resolver
    }

    fn open_report(&self, path: &PathString) -> Option<FdSink>
    {
        FdSink::create(path.as_c_str()?)
    }
}

/// `mmap`ed alternate signal stack
struct AltStack
{
    base: *mut c_void,
    size: usize,
    /// Whatever was registered before, restored on drop.
    previous: libc::stack_t,
}

// SAFETY: the mapping is only touched by the kernel and by `Drop`.
unsafe impl Send for AltStack {}
unsafe impl Sync for AltStack {}

impl AltStack
{
    /// Map `size` bytes (rounded up to whole pages) and register them for
    /// the calling thread.
    fn install(size: usize) -> io::Result<Self>
    {
        let page = *PAGE_SIZE;
        let size = size.div_ceil(page) * page;

        // SAFETY: anonymous private mapping, checked for MAP_FAILED.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let ss = libc::stack_t {
            ss_sp: base,
            ss_flags: 0,
            ss_size: size,
        };
        // SAFETY: `ss` describes the mapping created above; `previous` is
        // plain old data the kernel fills in.
        let mut previous: libc::stack_t = unsafe { std::mem::zeroed() };
        if unsafe { libc::sigaltstack(&ss, &mut previous) } != 0 {
            let error = io::Error::last_os_error();
            // SAFETY: the mapping was never registered.
            unsafe { libc::munmap(base, size) };
            return Err(error);
        }
        Ok(AltStack { base, size, previous })
    }
}

impl Drop for AltStack
{
    fn drop(&mut self)
    {
        // SAFETY: the swap applies to the calling thread, and only if it is
        // still using this mapping. The mapping is unmapped only once no
        // thread is known to use it.
        unsafe {
            let mut current: libc::stack_t = std::mem::zeroed();
            if libc::sigaltstack(ptr::null(), &mut current) != 0 || current.ss_sp != self.base {
                // Another thread may still run on it; leak it.
                return;
            }
            let mut restore = self.previous;
            // The kernel reports SS_ONSTACK, which it rejects on input.
            restore.ss_flags &= libc::SS_DISABLE;
            libc::sigaltstack(&restore, ptr::null_mut());
            libc::munmap(self.base, self.size);
        }
    }
}

/// Register the crash reporter for the configured fault signals
///
/// ## Steps
///
/// 1. Validate `config`.
/// 2. Create the memory probe and prime libc's time zone cache.
/// 3. Map the alternate signal stack for the calling thread.
/// 4. Install the handler, remembering each previous action.
///
/// If any `sigaction` fails, the handlers already installed are rolled back.
///
/// ## Errors
///
/// - [`FaultlineError::InvalidConfig`] if validation fails
/// - [`FaultlineError::AlreadyInstalled`] on a second call
/// - [`FaultlineError::Io`] if the probe or the alternate stack cannot be set up
/// - [`FaultlineError::InstallFailed`] if the OS rejects a handler
///
/// ## Example
///
/// ```rust,no_run
/// use faultline_core::ReporterConfig;
///
/// faultline_core::install(ReporterConfig::default())?;
/// assert!(faultline_core::is_installed());
/// # Ok::<(), faultline_core::FaultlineError>(())
/// ```
pub fn install(config: ReporterConfig) -> FaultlineResult<()>
{
    config.validate()?;

    let _lifecycle = LIFECYCLE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if !INSTALLED.load(Ordering::Acquire).is_null() {
        return Err(FaultlineError::AlreadyInstalled);
    }
    if FAULT_TRAP.state() == TrapState::Fired {
        warn!("Fault trap already fired in this process; reports will not be written");
    }

    let env = UnixEnvironment::new();
    env.prime_time_zone();
    let probe = UnixProbe::new()?;
    let previous = config
        .signals()
        .iter()
        .map(|&signal| current_action(signal).map(|action| (signal, action)))
        .collect::<io::Result<Vec<_>>>()?;
    let alt_stack = AltStack::install(config.alt_stack_size())?;
    debug!(size = alt_stack.size, "Alternate signal stack installed");

    // Published before the first handler is registered and never mutated afterwards.
    let state = Box::into_raw(Box::new(Installed {
        config,
        env,
        probe,
        resolver: DlAddrResolver,
        previous,
        alt_stack: Some(alt_stack),
    }));
    INSTALLED.store(state, Ordering::Release);
    // SAFETY: `state` stays valid until `uninstall` retires it.
    let installed = unsafe { &*state };

    for (index, &(signal, _)) in installed.previous.iter().enumerate() {
        if let Err(source) = register(signal) {
            restore_previous(&installed.previous[..index]);
            INSTALLED.store(ptr::null_mut(), Ordering::Release);
            // SAFETY: unpublished, and no handler of ours is registered any more.
            drop(unsafe { Box::from_raw(state) });
            return Err(FaultlineError::InstallFailed { signal, source });
        }
    }

    info!(
        signals = ?installed.config.signals(),
        output_dir = ?installed.config.output_dir(),
        "Crash reporter installed"
    );
    Ok(())
}

/// Restore the handlers that were in place before [`install`]
///
/// Meant for controlled shutdown. The fault trap's latch is not reset. Call
/// it from the thread that called `install`; from any other thread the
/// alternate signal stack stays registered and its memory is not freed.
///
/// ## Errors
///
/// [`FaultlineError::NotInstalled`] without a prior successful `install`.
pub fn uninstall() -> FaultlineResult<()>
{
    let _lifecycle = LIFECYCLE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let state = INSTALLED.swap(ptr::null_mut(), Ordering::AcqRel);
    if state.is_null() {
        return Err(FaultlineError::NotInstalled);
    }

    // SAFETY: `state` came from `Box::into_raw` in `install` and is no
    // longer published.
    let mut state = unsafe { Box::from_raw(state) };
    restore_previous(&state.previous);
    drop(state.alt_stack.take());
    info!(signals = state.previous.len(), "Crash reporter uninstalled");
    Ok(())
}

/// Whether [`install`] has succeeded and [`uninstall`] has not been called since.
pub fn is_installed() -> bool
{
    !INSTALLED.load(Ordering::Acquire).is_null()
}

/// State of the process-wide fault trap.
pub fn trap_state() -> TrapState
{
    FAULT_TRAP.state()
}

/// The action currently registered for `signal`.
fn current_action(signal: c_int) -> io::Result<libc::sigaction>
{
    // SAFETY: `sigaction` is plain old data; a null new action only queries.
    unsafe {
        let mut current: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(signal, ptr::null(), &mut current) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(current)
    }
}

fn register(signal: c_int) -> io::Result<()>
{
    // SAFETY: `sigaction` is plain old data; `handle_fault` has the
    // signature SA_SIGINFO requires.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_fault as extern "C" fn(c_int, *mut siginfo_t, *mut c_void) as usize;
        // NODEFER lets a fault inside the handler reach the latch instead of
        // being force-killed by the kernel.
        action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK | libc::SA_NODEFER;
        libc::sigemptyset(&mut action.sa_mask);

        if libc::sigaction(signal, &action, ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn restore_previous(previous: &[(c_int, libc::sigaction)])
{
    for (signal, action) in previous {
        // SAFETY: `action` was returned by `sigaction` for this signal.
        if unsafe { libc::sigaction(*signal, action, ptr::null_mut()) } != 0 {
            warn!(signal, "Failed to restore previous signal handler");
        }
    }
}

extern "C" fn handle_fault(signal: c_int, info: *mut siginfo_t, context: *mut c_void)
{
    let state = INSTALLED.load(Ordering::Acquire);
    if state.is_null() {
        terminate(signal);
        return;
    }
    // SAFETY: published states stay alive until `uninstall`.
    let state = unsafe { &*state };

    // SAFETY: the pointers are the ones the kernel passed to this handler.
    let raw = unsafe { SignalContext::new(signal, info, context) };
    match FAULT_TRAP.handle(&raw, &UnixHost { state }) {
        Disposition::ExecuteHandler => terminate(signal),
        Disposition::ContinueSearch => chain(state, signal, info, context),
    }
}

/// Restore the default action and re-raise.
///
/// For a hardware fault the faulting instruction re-executes on return and
/// the default action then applies.
fn terminate(signal: c_int)
{
    // SAFETY: plain libc calls with a zeroed, valid sigaction.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = libc::SIG_DFL;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(signal, &action, ptr::null_mut());
        libc::raise(signal);
    }
}

/// Pass the signal to the handler that was installed before ours.
fn chain(state: &Installed, signal: c_int, info: *mut siginfo_t, context: *mut c_void)
{
    let Some(previous) = state.previous_action(signal) else {
        terminate(signal);
        return;
    };

    let handler = previous.sa_sigaction;
    // An ignored fault would re-fault forever; treat it like the default.
    if handler == libc::SIG_DFL || handler == libc::SIG_IGN {
        terminate(signal);
        return;
    }

    // SAFETY: `handler` is the function pointer the previous owner registered,
    // with the signature its SA_SIGINFO flag implies.
    unsafe {
        if previous.sa_flags & libc::SA_SIGINFO != 0 {
            let action: extern "C" fn(c_int, *mut siginfo_t, *mut c_void) = std::mem::transmute(handler);
            action(signal, info, context);
        } else {
            let action: extern "C" fn(c_int) = std::mem::transmute(handler);
            action(signal);
        }
    }
}
