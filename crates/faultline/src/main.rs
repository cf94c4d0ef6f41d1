mod crash;

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use crash::CrashKind;
use faultline_core::config::{DEFAULT_CODE_BYTES, DEFAULT_STACK_BYTES};
use faultline_core::types::Address;
use faultline_core::ReporterConfig;
use faultline_utils::{info, init_logging, warn};

/// In-process crash reporter: writes a plain-text diagnostic report when the program faults.
#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(version)]
#[command(about = "In-process crash reporter for Linux and macOS", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Install the reporter, then crash on purpose
    Crash
    {
        /// Kind of fault to raise
        #[arg(value_enum)]
        kind: CrashKind,
        /// Directory for the report (default: next to the executable)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Bytes of stack to dump
        #[arg(long, default_value_t = DEFAULT_STACK_BYTES)]
        stack_bytes: usize,
        /// Bytes to dump at the instruction pointer
        #[arg(long, default_value_t = DEFAULT_CODE_BYTES)]
        code_bytes: usize,
    },
    /// Read this process's memory through the fault-safe probe
    Probe
    {
        /// Address to read from (hex format: 0x1000 or decimal)
        #[arg(value_parser = parse_address)]
        address: Address,
        /// Number of bytes to read (default: 16)
        #[arg(short, long, default_value_t = 16)]
        length: usize,
    },
    /// Show what a report written now would say about the environment
    Info
    {
        /// Directory for the report (default: next to the executable)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn main()
{
    // Reads RUST_LOG, FAULTLINE_LOG_FORMAT and FAULTLINE_LOG_FILE
    let _guard = match init_logging() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    let cli = Cli::parse();

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>>
{
    match cli.command {
        Commands::Crash {
            kind,
            output_dir,
            stack_bytes,
            code_bytes,
        } => {
            let mut config = ReporterConfig::default()
                .with_stack_bytes(stack_bytes)
                .with_code_bytes(code_bytes);
            if let Some(dir) = output_dir {
                config = config.with_output_dir(dir);
            }
            let destination = report_destination(&config);

            faultline_core::install(config)?;
            info!(?kind, signal = kind.signal(), "Raising fault");
            match destination {
                Some(path) => eprintln!("Crashing with {:?}; report goes to {}", kind, path),
                None => eprintln!("Crashing with {:?}; report path unavailable", kind),
            }

            crash::trigger(kind);
            warn!(?kind, "Process survived the fault");
            Err(format!("{kind:?} fault did not terminate the process").into())
        }
        Commands::Probe { address, length } => probe(address, length),
        Commands::Info { output_dir } => {
            let mut config = ReporterConfig::default();
            if let Some(dir) = output_dir {
                config = config.with_output_dir(dir);
            }
            config.validate()?;
            print_environment(&config);
            Ok(())
        }
    }
}

/// Parse `0x`-prefixed hex or decimal.
fn parse_address(text: &str) -> Result<Address, String>
{
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map(Address::new).map_err(|e| format!("invalid address '{text}': {e}"))
}

/// Formats probed bytes into a hex + ASCII view; unreadable bytes print as `??`.
fn format_hexdump(base: Address, bytes: &[Option<u8>], width: usize) -> String
{
    let width = width.clamp(8, 32);
    let mut out = String::new();
    for (offset, chunk) in bytes.chunks(width).enumerate() {
        let addr = base.saturating_add((offset * width) as u64);
        let _ = write!(out, "{addr}: ");

        for i in 0..width {
            match chunk.get(i) {
                Some(Some(byte)) => {
                    let _ = write!(out, "{byte:02x} ");
                }
                Some(None) => out.push_str("?? "),
                None => out.push_str("   "),
            }
        }

        out.push(' ');
        for byte in chunk {
            let ch = match byte {
                Some(b) if b.is_ascii_graphic() || *b == b' ' => *b as char,
                _ => '.',
            };
            out.push(ch);
        }
        out.push('\n');
    }
    out
}

#[cfg(unix)]
fn report_destination(config: &ReporterConfig) -> Option<String>
{
    use faultline_core::environment::Environment;
    use faultline_core::platform::unix::UnixEnvironment;

    let exe = UnixEnvironment::new().executable_path();
    faultline_core::trap::report_path(config, exe.as_deref()).map(|path| path.to_string())
}

#[cfg(not(unix))]
fn report_destination(_config: &ReporterConfig) -> Option<String>
{
    None
}

#[cfg(unix)]
fn probe(address: Address, length: usize) -> Result<(), Box<dyn std::error::Error>>
{
    use faultline_core::platform::unix::UnixProbe;
    use faultline_core::probe::MemoryProbe;

    let probe = UnixProbe::new()?;
    info!(%address, length, pipe = probe.uses_pipe(), "Probing memory");

    let bytes: Vec<Option<u8>> = (0..length as u64)
        .map(|offset| address.checked_add(offset).and_then(|addr| probe.read_byte(addr)))
        .collect();
    let readable = bytes.iter().filter(|byte| byte.is_some()).count();

    print!("{}", format_hexdump(address, &bytes, 16));
    println!("{} of {} bytes readable", readable, length);
    Ok(())
}

#[cfg(not(unix))]
fn probe(_address: Address, _length: usize) -> Result<(), Box<dyn std::error::Error>>
{
    Err(faultline_core::FaultlineError::Unsupported(std::env::consts::OS.to_string()).into())
}

#[cfg(unix)]
fn print_environment(config: &ReporterConfig)
{
    use faultline_core::environment::{megabytes, AddressSpace, Environment};
    use faultline_core::module::ModuleResolver;
    use faultline_core::platform::unix::{DlAddrResolver, UnixEnvironment};
    use faultline_core::Architecture;

    const UNKNOWN: &str = "Unknown";

    let env = UnixEnvironment::new();
    env.prime_time_zone();
    let exe = env.executable_path();
    let here = Address::new(print_environment as fn(&ReporterConfig) as usize as u64);
    let module = DlAddrResolver.resolve(here);

    println!("\nEnvironment Information:");
    println!("  Executable: {}", exe.as_deref().unwrap_or(UNKNOWN));
    println!("  User: {}", env.user_name().as_deref().unwrap_or(UNKNOWN));
    match env.os_version() {
        Some(os) => println!("  Operating System: {} {} ({})", &*os.name, &*os.release, &*os.machine),
        None => println!("  Operating System: {}", UNKNOWN),
    }
    match env.processor_count() {
        Some(count) => println!("  Processors: {} ({})", count, Architecture::current()),
        None => println!("  Processors: {} ({})", UNKNOWN, Architecture::current()),
    }

    let memory = env.memory_stats();
    let mb = |bytes: Option<u64>| bytes.map_or_else(|| UNKNOWN.to_string(), |b| format!("{} MB", megabytes(b)));
    match memory.load_percent() {
        Some(load) => println!("  Memory Load: {}%", load),
        None => println!("  Memory Load: {}", UNKNOWN),
    }
    println!("  Physical Memory: {} free of {}", mb(memory.physical_free), mb(memory.physical_total));
    println!("  Swap: {} free of {}", mb(memory.swap_free), mb(memory.swap_total));
    match memory.address_space {
        Some(AddressSpace::Limited(bytes)) => println!("  Address Space: {} MB", megabytes(bytes)),
        Some(AddressSpace::Unlimited) => println!("  Address Space: unlimited"),
        None => println!("  Address Space: {}", UNKNOWN),
    }
    match memory.address_space_free() {
        Some(AddressSpace::Limited(bytes)) => println!("  Address Space Free: {} MB", megabytes(bytes)),
        Some(AddressSpace::Unlimited) => println!("  Address Space Free: unlimited"),
        None => println!("  Address Space Free: {}", UNKNOWN),
    }

    match env.local_time() {
        Some(time) => println!("  Local Time: {}", time),
        None => println!("  Local Time: {}", UNKNOWN),
    }
    let probe_sp = Address::new(&here as *const Address as u64);
    match env.stack_base(probe_sp) {
        Some(base) => println!("  Stack Base: {}", base),
        None => println!("  Stack Base: {}", UNKNOWN),
    }
    println!("  Module: {} (base {:?})", &*module.name, module.base.map(|base| base.to_string()));

    match faultline_core::trap::report_path(config, exe.as_deref()) {
        Some(path) => println!("  Report File: {}", path),
        None => println!("  Report File: path too long"),
    }
}

#[cfg(not(unix))]
fn print_environment(_config: &ReporterConfig)
{
    println!("No fault backend for {}", std::env::consts::OS);
}
