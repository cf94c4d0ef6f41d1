//! # Report Sections
//!
//! The generators that turn a [`FaultContext`] into report text, in the order
//! they appear in the file:
//!
//! 1. [`header`]: crashing process, fault phrase, owning module
//! 2. [`time`]: wall-clock time of the fault
//! 3. [`identity`]: executable path and user
//! 4. [`os`], [`cpu`], [`memory`]: coarse host facts
//! 5. [`fault_detail`]: accessed address and direction (memory faults only)
//! 6. [`registers`]: every architecture register, fixed order
//! 7. [`code_bytes`]: bytes at the instruction pointer
//! 8. [`stack`]: words from the stack pointer toward the stack base
//! 9. [`footer`]
//!
//! Each generator writes into any [`fmt::Write`]. On the fault path that is a
//! [`ReportWriter`](crate::buffer::ReportWriter), whose `write_str` never
//! fails; the `fmt::Result` plumbing only matters for other writers. Memory
//! is read exclusively through the [`MemoryProbe`], one guarded read per
//! byte or word, and a failed read becomes placeholder text.

use std::fmt::{self, Write};

use crate::environment::{megabytes, AddressSpace, Environment};
use crate::module::{base_name, ModuleInfo, UNKNOWN};
use crate::probe::{MemoryProbe, WORD_SIZE};
use crate::snapshot::FaultContext;
use crate::types::Address;

/// Rendering of a byte the probe could not read.
pub const UNREADABLE_BYTE: &str = "??";

/// Rendering of a register the platform did not supply.
pub const UNAVAILABLE_REGISTER: &str = "0x????????????????";

const REGISTERS_PER_LINE: usize = 3;
const CODE_BYTES_PER_LINE: usize = 16;
const WORDS_PER_ROW: usize = 4;

/// Everything one report is generated from
pub struct Report<'a>
{
    pub fault: &'a FaultContext,
    pub module: &'a ModuleInfo,
    pub env: &'a dyn Environment,
    pub probe: &'a dyn MemoryProbe,
    /// Bytes dumped at the instruction pointer.
    pub code_bytes: usize,
    /// Upper bound on the stack dump in bytes.
    pub stack_bytes: usize,
    /// File name of the report, echoed by the footer.
    pub report_name: &'a str,
}

/// Write the whole report, every section in order.
pub fn write_report<W: Write>(out: &mut W, report: &Report<'_>) -> fmt::Result
{
    let exe = report.env.executable_path();
    let exe = exe.as_deref();

    header(out, report.fault, report.module, exe)?;
    out.write_char('\n')?;
    time(out, report.env)?;
    identity(out, report.env, exe)?;
    os(out, report.env)?;
    cpu(out, report.env, report.fault)?;
    memory(out, report.env)?;
    fault_detail(out, report.fault)?;
    out.write_char('\n')?;
    registers(out, report.fault)?;
    out.write_char('\n')?;
    code_bytes(out, report.probe, report.fault.fault_address, report.code_bytes)?;
    out.write_char('\n')?;
    stack(out, report.probe, report.fault, report.stack_bytes)?;
    footer(out, report.report_name)
}

/// Crashing process, fault phrase and faulting address, then the owning module.
pub fn header<W: Write>(out: &mut W, fault: &FaultContext, module: &ModuleInfo, exe: Option<&str>) -> fmt::Result
{
    let process = exe.map(base_name).filter(|name| !name.is_empty()).unwrap_or(UNKNOWN);

    writeln!(out, "{} caused {} Exception at {}", process, fault.phrase(), fault.fault_address)?;
    write!(out, "in module {} at {}", module.name, fault.fault_address)?;
    if let Some(base) = module.base {
        write!(out, " (base {base})")?;
    }
    out.write_char('\n')?;
    writeln!(out, "Fault code: {}.", fault.code)
}

pub fn time<W: Write>(out: &mut W, env: &dyn Environment) -> fmt::Result
{
    match env.local_time() {
        Some(now) => writeln!(out, "Error occurred at {now}."),
        None => writeln!(out, "Error occurred at {UNKNOWN} time."),
    }
}

pub fn identity<W: Write>(out: &mut W, env: &dyn Environment, exe: Option<&str>) -> fmt::Result
{
    let user = env.user_name();
    let user = user.as_deref().filter(|name| !name.is_empty()).unwrap_or(UNKNOWN);
    let exe = exe.filter(|path| !path.is_empty()).unwrap_or(UNKNOWN);

    writeln!(out, "{exe}, run by {user}.")
}

pub fn os<W: Write>(out: &mut W, env: &dyn Environment) -> fmt::Result
{
    match env.os_version() {
        Some(version) => writeln!(
            out,
            "Operating system: {} {} ({})",
            version.name, version.release, version.machine
        ),
        None => writeln!(out, "Operating system unknown"),
    }
}

/// Processor count and the architecture of the captured registers.
pub fn cpu<W: Write>(out: &mut W, env: &dyn Environment, fault: &FaultContext) -> fmt::Result
{
    let arch = fault.registers.architecture();
    match env.processor_count() {
        Some(count) => writeln!(out, "{count} processor(s), type {arch}."),
        None => writeln!(out, "{UNKNOWN} processor(s), type {arch}."),
    }
}

/// Memory figures in megabytes, rounded up.
pub fn memory<W: Write>(out: &mut W, env: &dyn Environment) -> fmt::Result
{
    let stats = env.memory_stats();

    match stats.load_percent() {
        Some(percent) => writeln!(out, "{percent}% memory in use.")?,
        None => writeln!(out, "{UNKNOWN}% memory in use.")?,
    }
    megabyte_line(out, stats.physical_total, "physical memory")?;
    megabyte_line(out, stats.physical_free, "physical memory free")?;
    megabyte_line(out, stats.swap_total, "swap space")?;
    megabyte_line(out, stats.swap_free, "swap space free")?;
    address_space_line(out, stats.address_space, "user address space")?;
    address_space_line(out, stats.address_space_free(), "user address space free")
}

fn address_space_line<W: Write>(out: &mut W, space: Option<AddressSpace>, what: &str) -> fmt::Result
{
    match space {
        Some(AddressSpace::Limited(bytes)) => megabyte_line(out, Some(bytes), what),
        Some(AddressSpace::Unlimited) => writeln!(out, "unlimited {what}."),
        None => megabyte_line(out, None, what),
    }
}

fn megabyte_line<W: Write>(out: &mut W, bytes: Option<u64>, what: &str) -> fmt::Result
{
    match bytes {
        Some(bytes) => writeln!(out, "{} MB {}.", megabytes(bytes), what),
        None => writeln!(out, "{UNKNOWN} MB {what}."),
    }
}

/// Accessed address and direction; writes nothing for non-access faults.
pub fn fault_detail<W: Write>(out: &mut W, fault: &FaultContext) -> fmt::Result
{
    match fault.access {
        Some(access) => writeln!(
            out,
            "Access violation at {}. The memory could not be {}.",
            access.address,
            access.kind.participle()
        ),
        None => Ok(()),
    }
}

/// Every register of the architecture, three per line.
pub fn registers<W: Write>(out: &mut W, fault: &FaultContext) -> fmt::Result
{
    writeln!(out, "Context:")?;
    for (index, register) in fault.registers.iter().enumerate() {
        if index % REGISTERS_PER_LINE != 0 {
            out.write_str("  ")?;
        }
        match register.value {
            Some(value) => write!(out, "{}: 0x{:016x}", register.name, value)?,
            None => write!(out, "{}: {}", register.name, UNAVAILABLE_REGISTER)?,
        }
        if index % REGISTERS_PER_LINE == REGISTERS_PER_LINE - 1 {
            out.write_char('\n')?;
        }
    }
    if fault.registers.len() % REGISTERS_PER_LINE != 0 {
        out.write_char('\n')?;
    }
    Ok(())
}

/// `count` bytes starting at `start`, each read on its own.
///
/// An unreadable byte prints as [`UNREADABLE_BYTE`] and the dump carries on
/// with the next address.
pub fn code_bytes<W: Write>(out: &mut W, probe: &dyn MemoryProbe, start: Address, count: usize) -> fmt::Result
{
    writeln!(out, "Bytes at instruction pointer:")?;
    for offset in 0..count {
        if offset > 0 {
            let separator = if offset % CODE_BYTES_PER_LINE == 0 { '\n' } else { ' ' };
            out.write_char(separator)?;
        }
        match start.checked_add(offset as u64).and_then(|address| probe.read_byte(address)) {
            Some(byte) => write!(out, "{byte:02x}")?,
            None => out.write_str(UNREADABLE_BYTE)?,
        }
    }
    out.write_char('\n')
}

/// Stack words from the stack pointer upward
///
/// Stops at whichever comes first: `max_bytes`, the stack base, or the first
/// word the probe cannot read (reported with a final "Could not access" line).
/// Without a known base only `max_bytes` bounds the walk.
pub fn stack<W: Write>(out: &mut W, probe: &dyn MemoryProbe, fault: &FaultContext, max_bytes: usize) -> fmt::Result
{
    writeln!(out, "Stack:")?;

    let start = fault.stack_pointer;
    let mut span = max_bytes as u64;
    if let Some(base) = fault.stack_base {
        span = span.min(start.distance_to(base));
    }
    let words = (span / WORD_SIZE as u64) as usize;

    let mut row = [0u64; WORDS_PER_ROW];
    let mut filled = 0;
    for index in 0..words {
        let address = start.checked_add((index * WORD_SIZE) as u64);
        let word = address.and_then(|address| probe.read_word(address));
        let Some(word) = word else {
            let row_start = start.saturating_add(((index - filled) * WORD_SIZE) as u64);
            stack_row(out, row_start, &row[..filled])?;
            let failed = start.saturating_add((index * WORD_SIZE) as u64);
            return writeln!(out, "Could not access stack at {failed}.");
        };

        row[filled] = word;
        filled += 1;
        if filled == WORDS_PER_ROW {
            let row_start = start.saturating_add(((index + 1 - WORDS_PER_ROW) * WORD_SIZE) as u64);
            stack_row(out, row_start, &row)?;
            filled = 0;
        }
    }

    let row_start = start.saturating_add(((words - filled) * WORD_SIZE) as u64);
    stack_row(out, row_start, &row[..filled])
}

/// One stack row: address, hex words, and their bytes as ASCII.
fn stack_row<W: Write>(out: &mut W, address: Address, words: &[u64]) -> fmt::Result
{
    if words.is_empty() {
        return Ok(());
    }

    write!(out, "{address}:")?;
    for word in words {
        write!(out, " {word:016x}")?;
    }
    for _ in words.len()..WORDS_PER_ROW {
        out.write_str("                 ")?;
    }
    out.write_char(' ')?;
    for word in words {
        for byte in word.to_ne_bytes() {
            let shown = if byte.is_ascii_graphic() || byte == b' ' { byte as char } else { '.' };
            out.write_char(shown)?;
        }
    }
    out.write_char('\n')
}

pub fn footer<W: Write>(out: &mut W, report_name: &str) -> fmt::Result
{
    writeln!(out, "===== [end of {report_name}] =====")
}
