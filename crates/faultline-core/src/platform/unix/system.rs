//! # Host Queries
//!
//! [`UnixEnvironment`] answers the [`Environment`] queries with direct libc
//! calls into stack buffers. Nothing here allocates or takes a lock, so it
//! can run inside the fault handler.
//!
//! Local time is the one fact libc cannot give safely: `localtime_r` takes the
//! time zone lock. [`UnixEnvironment::prime_time_zone`] records the UTC offset
//! at install, and the fault path adds it to `clock_gettime` itself.

use std::ffi::CStr;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};

use libc::c_char;

use crate::environment::{AddressSpace, Environment, LocalTime, MemoryStats, OsVersion};
use crate::types::{Address, NameString, PathString, PATH_CAPACITY};

/// Seconds east of UTC, as of the last [`UnixEnvironment::prime_time_zone`].
static UTC_OFFSET_SECONDS: AtomicI64 = AtomicI64::new(0);

/// The running process's host
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixEnvironment;

impl UnixEnvironment
{
    pub const fn new() -> Self
    {
        Self
    }

    /// Record the local UTC offset for [`Environment::local_time`].
    ///
    /// Call outside the fault path. Until it is called, reports use UTC; a
    /// daylight-saving change after the call is not picked up.
    pub fn prime_time_zone(&self)
    {
        // SAFETY: `time` accepts a null out pointer; `tm` is plain old data
        // filled in by `localtime_r`.
        let now = unsafe { libc::time(std::ptr::null_mut()) };
        let mut tm: libc::tm = unsafe { std::mem::zeroed() };
        if unsafe { libc::localtime_r(&now, &mut tm) }.is_null() {
            return;
        }
        UTC_OFFSET_SECONDS.store(i64::from(tm.tm_gmtoff), Ordering::Relaxed);
    }

    /// Recorded UTC offset in seconds.
    pub fn utc_offset(&self) -> i64
    {
        UTC_OFFSET_SECONDS.load(Ordering::Relaxed)
    }
}

impl Environment for UnixEnvironment
{
    fn executable_path(&self) -> Option<PathString>
    {
        let mut buffer = [0u8; PATH_CAPACITY];

        #[cfg(any(target_os = "linux", target_os = "android"))]
        // SAFETY: `buffer` is writable for its full length.
        let len = unsafe {
            libc::readlink(
                c"/proc/self/exe".as_ptr(),
                buffer.as_mut_ptr().cast(),
                buffer.len() - 1,
            )
        };

        #[cfg(target_vendor = "apple")]
        // SAFETY: `buffer` is writable for its full length.
        let len = unsafe { libc::proc_pidpath(libc::getpid(), buffer.as_mut_ptr().cast(), buffer.len() as u32) } as isize;

        #[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
        let len: isize = -1;

        (len > 0).then(|| PathString::from_bytes_lossy(&buffer[..len as usize]))
    }

    /// `$USER` or `$LOGNAME`, else the effective uid as `uid <n>`.
    fn user_name(&self) -> Option<NameString>
    {
        let from_env = [c"USER", c"LOGNAME"].into_iter().find_map(|key| {
            // SAFETY: `key` is NUL-terminated; the result is checked for null.
            let value = unsafe { libc::getenv(key.as_ptr()) };
            if value.is_null() {
                return None;
            }
            // SAFETY: non-null `getenv` results are NUL-terminated strings.
            let bytes = unsafe { CStr::from_ptr(value) }.to_bytes();
            (!bytes.is_empty()).then(|| NameString::from_bytes_lossy(bytes))
        });

        from_env.or_else(|| {
            // SAFETY: `geteuid` always succeeds.
            let uid = unsafe { libc::geteuid() };
            let mut name = NameString::new();
            write!(name, "uid {uid}").ok()?;
            Some(name)
        })
    }

    fn os_version(&self) -> Option<OsVersion>
    {
        // SAFETY: `utsname` is plain old data; `uname` fills it in.
        let mut name: libc::utsname = unsafe { std::mem::zeroed() };
        if unsafe { libc::uname(&mut name) } != 0 {
            return None;
        }

        Some(OsVersion {
            name: c_chars(&name.sysname),
            release: c_chars(&name.release),
            machine: c_chars(&name.machine),
        })
    }

    fn processor_count(&self) -> Option<u32>
    {
        // SAFETY: sysconf has no memory-safety preconditions.
        let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        (count > 0).then_some(count as u32)
    }

    fn memory_stats(&self) -> MemoryStats
    {
        let mut stats = host_memory();
        stats.address_space = address_space_limit();
        stats.address_space_used = address_space_used();
        stats
    }

    fn local_time(&self) -> Option<LocalTime>
    {
        // SAFETY: `timespec` is plain old data that `clock_gettime` fills in.
        let mut now: libc::timespec = unsafe { std::mem::zeroed() };
        if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
            return None;
        }

        let local = i64::from(now.tv_sec).saturating_add(self.utc_offset());
        Some(LocalTime::from_unix_seconds(local))
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn stack_base(&self, stack_pointer: Address) -> Option<Address>
    {
        read_proc_file(c"/proc/self/maps", |read| scan_maps(read, stack_pointer.value())).map(Address::new)
    }

    #[cfg(target_vendor = "apple")]
    fn stack_base(&self, stack_pointer: Address) -> Option<Address>
    {
        // SAFETY: queries the calling thread's own stack.
        let top = unsafe { libc::pthread_get_stackaddr_np(libc::pthread_self()) } as u64;
        (top > stack_pointer.value()).then_some(Address::new(top))
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
    fn stack_base(&self, _stack_pointer: Address) -> Option<Address>
    {
        None
    }
}

/// Copy a NUL-terminated `c_char` array.
fn c_chars(field: &[c_char]) -> NameString
{
    let len = field.iter().position(|&c| c == 0).unwrap_or(field.len());
    // SAFETY: c_char and u8 have the same size and alignment.
    let bytes = unsafe { std::slice::from_raw_parts(field.as_ptr().cast::<u8>(), len) };
    NameString::from_bytes_lossy(bytes)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn host_memory() -> MemoryStats
{
    // SAFETY: `sysinfo` is plain old data that the call fills in.
    let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
    if unsafe { libc::sysinfo(&mut info) } != 0 {
        return MemoryStats::default();
    }

    let unit = u64::from(info.mem_unit.max(1));
    let bytes = |count: libc::c_ulong| Some(u64::from(count).saturating_mul(unit));
    MemoryStats {
        physical_total: bytes(info.totalram),
        physical_free: bytes(info.freeram),
        swap_total: bytes(info.totalswap),
        swap_free: bytes(info.freeswap),
        ..MemoryStats::default()
    }
}

#[cfg(target_vendor = "apple")]
fn host_memory() -> MemoryStats
{
    let mut stats = MemoryStats::default();

    let mut total: u64 = 0;
    if sysctl_value(c"hw.memsize", &mut total) {
        stats.physical_total = Some(total);
    }

    // SAFETY: `xsw_usage` is plain old data.
    let mut swap: libc::xsw_usage = unsafe { std::mem::zeroed() };
    if sysctl_value(c"vm.swapusage", &mut swap) {
        stats.swap_total = Some(swap.xsu_total);
        stats.swap_free = Some(swap.xsu_avail);
    }

    stats
}

/// Read a fixed-size `sysctl` value into `out`.
#[cfg(target_vendor = "apple")]
fn sysctl_value<T>(name: &CStr, out: &mut T) -> bool
{
    let mut size = std::mem::size_of::<T>();
    // SAFETY: `out` is writable for `size` bytes.
    let result = unsafe {
        libc::sysctlbyname(
            name.as_ptr(),
            (out as *mut T).cast(),
            &mut size,
            std::ptr::null_mut(),
            0,
        )
    };
    result == 0 && size == std::mem::size_of::<T>()
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
fn host_memory() -> MemoryStats
{
    MemoryStats::default()
}

/// Virtual memory mapped by this process right now.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn address_space_used() -> Option<u64>
{
    read_proc_file(c"/proc/self/status", |read| scan_vm_size(read))
}

#[cfg(target_vendor = "apple")]
fn address_space_used() -> Option<u64>
{
    // SAFETY: `proc_taskinfo` is plain old data that `proc_pidinfo` fills in.
    let mut info: libc::proc_taskinfo = unsafe { std::mem::zeroed() };
    let size = std::mem::size_of::<libc::proc_taskinfo>() as libc::c_int;
    let written = unsafe {
        libc::proc_pidinfo(
            libc::getpid(),
            libc::PROC_PIDTASKINFO,
            0,
            (&mut info as *mut libc::proc_taskinfo).cast(),
            size,
        )
    };
    (written == size).then_some(info.pti_virtual_size)
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_vendor = "apple")))]
fn address_space_used() -> Option<u64>
{
    None
}

fn address_space_limit() -> Option<AddressSpace>
{
    // SAFETY: `rlimit` is plain old data that the call fills in.
    let mut limit: libc::rlimit = unsafe { std::mem::zeroed() };
    if unsafe { libc::getrlimit(libc::RLIMIT_AS, &mut limit) } != 0 {
        return None;
    }

    Some(if limit.rlim_cur == libc::RLIM_INFINITY {
        AddressSpace::Unlimited
    } else {
        AddressSpace::Limited(limit.rlim_cur as u64)
    })
}

/// Longest `/proc` line prefix kept; the fields read here are at the start.
const PROC_LINE_CAPACITY: usize = 128;

/// Open a `/proc` file and hand its reader to `scan`.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn read_proc_file<T>(path: &CStr, scan: impl FnOnce(&mut dyn FnMut(&mut [u8]) -> usize) -> Option<T>) -> Option<T>
{
    // SAFETY: the path is NUL-terminated; the fd is closed below.
    let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC) };
    if fd < 0 {
        return None;
    }

    let found = scan(&mut |chunk: &mut [u8]| {
        // SAFETY: `chunk` is writable for its full length.
        let n = unsafe { libc::read(fd, chunk.as_mut_ptr().cast(), chunk.len()) };
        n.max(0) as usize
    });

    // SAFETY: `fd` was opened above.
    unsafe { libc::close(fd) };
    found
}

/// Run `visit` on each line of a stream until it returns `Some`
///
/// `read` fills the slice it is given and returns the byte count, `0` at end
/// of input. Lines are cut at [`PROC_LINE_CAPACITY`] bytes. Works on fixed
/// stack buffers so it can run in a signal handler.
fn scan_lines<T>(mut read: impl FnMut(&mut [u8]) -> usize, mut visit: impl FnMut(&[u8]) -> Option<T>) -> Option<T>
{
    let mut chunk = [0u8; 4096];
    let mut line = [0u8; PROC_LINE_CAPACITY];
    let mut line_len = 0;

    loop {
        let n = read(&mut chunk).min(chunk.len());
        if n == 0 {
            // A final line without a newline.
            return visit(&line[..line_len]);
        }

        for &byte in &chunk[..n] {
            if byte == b'\n' {
                if let Some(found) = visit(&line[..line_len]) {
                    return Some(found);
                }
                line_len = 0;
            } else if line_len < line.len() {
                line[line_len] = byte;
                line_len += 1;
            }
        }
    }
}

/// End address of the mapping in a `/proc/<pid>/maps` stream that contains
/// `address`.
pub fn scan_maps(read: impl FnMut(&mut [u8]) -> usize, address: u64) -> Option<u64>
{
    scan_lines(read, |line| range_containing(line, address))
}

/// `VmSize` in bytes from a `/proc/<pid>/status` stream.
pub fn scan_vm_size(read: impl FnMut(&mut [u8]) -> usize) -> Option<u64>
{
    scan_lines(read, |line| {
        let value = line.strip_prefix(b"VmSize:")?;
        let mut digits = value.iter().skip_while(|b| b.is_ascii_whitespace()).take_while(|b| b.is_ascii_digit());
        let first = digits.next()?;
        let kilobytes = digits.try_fold(u64::from(first - b'0'), |value, &digit| {
            value.checked_mul(10)?.checked_add(u64::from(digit - b'0'))
        })?;
        kilobytes.checked_mul(1024)
    })
}

/// `Some(end)` if `line` starts with `start-end` and `start <= address < end`.
fn range_containing(line: &[u8], address: u64) -> Option<u64>
{
    let range = line.split(|&b| b == b' ').next()?;
    let dash = range.iter().position(|&b| b == b'-')?;
    let start = parse_hex(&range[..dash])?;
    let end = parse_hex(&range[dash + 1..])?;
    (start <= address && address < end).then_some(end)
}

fn parse_hex(digits: &[u8]) -> Option<u64>
{
    if digits.is_empty() || digits.len() > 16 {
        return None;
    }
    digits.iter().try_fold(0u64, |value, &digit| {
        let nibble = (digit as char).to_digit(16)?;
        Some(value << 4 | u64::from(nibble))
    })
}

#[cfg(test)]
mod tests
{
    use super::*;

    const MAPS: &str = "\
55d0c0a00000-55d0c0a21000 r--p 00000000 08:01 1234 /usr/bin/game
7ffd1c000000-7ffd1c021000 rw-p 00000000 00:00 0                          [stack]
7ffd1c1f0000-7ffd1c1f4000 r--p 00000000 00:00 0                          [vvar]";

    /// Reader that hands out `text` a few bytes at a time to exercise line reassembly.
    fn chunks(text: &str, step: usize) -> impl FnMut(&mut [u8]) -> usize + '_
    {
        let mut rest = text.as_bytes();
        move |chunk| {
            let n = rest.len().min(step).min(chunk.len());
            chunk[..n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            n
        }
    }

    fn scan(text: &str, address: u64, step: usize) -> Option<u64>
    {
        scan_maps(chunks(text, step), address)
    }

    #[test]
    fn test_finds_containing_mapping()
    {
        assert_eq!(scan(MAPS, 0x7ffd_1c01_0000, 7), Some(0x7ffd_1c02_1000));
        assert_eq!(scan(MAPS, 0x7ffd_1c1f_0000, 4096), Some(0x7ffd_1c1f_4000));
    }

    #[test]
    fn test_end_is_exclusive()
    {
        assert_eq!(scan(MAPS, 0x7ffd_1c02_1000, 13), None);
        assert_eq!(scan(MAPS, 0x1000, 13), None);
    }

    #[test]
    fn test_vm_size_from_status()
    {
        let status = "Name:\tfaultline\nUmask:\t0022\nVmPeak:\t   20000 kB\nVmSize:\t   16400 kB\nVmLck:\t       0 kB\n";
        assert_eq!(scan_vm_size(chunks(status, 5)), Some(16400 * 1024));
        assert_eq!(scan_vm_size(chunks("Name:\tx\nVmSize:\t kB\n", 64)), None);
        assert_eq!(scan_vm_size(chunks("Name:\tx\n", 64)), None);
    }

    #[test]
    fn test_user_name_is_never_empty()
    {
        let name = UnixEnvironment::new().user_name().unwrap();
        assert!(!name.is_empty());
    }

    #[test]
    fn test_real_stack_is_found()
    {
        let local = 0u64;
        let sp = Address::new(&local as *const u64 as u64);
        let base = UnixEnvironment::new().stack_base(sp).unwrap();
        assert!(base > sp);
    }

    #[test]
    fn test_environment_queries()
    {
        let env = UnixEnvironment::new();
        env.prime_time_zone();

        assert!(env.processor_count().unwrap() >= 1);
        assert!(!env.os_version().unwrap().name.is_empty());
        assert!(env.executable_path().unwrap().starts_with('/'));

        let now = env.local_time().unwrap();
        assert!((1..=12).contains(&now.month));
        assert!(now.year >= 2020);
        // Real offsets run from UTC-12 to UTC+14.
        assert!(env.utc_offset().abs() <= 14 * 3600);
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_linux_memory_totals()
    {
        let stats = UnixEnvironment::new().memory_stats();
        let total = stats.physical_total.unwrap();
        assert!(total > 0);
        assert!(stats.physical_free.unwrap() <= total);
        assert!(stats.address_space.is_some());
        assert!(stats.address_space_used.unwrap() > 0);
    }
}
