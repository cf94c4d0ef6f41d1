//! # Environment Queries
//!
//! The coarse facts about the host that the report prints: executable path,
//! user, OS version, processors, memory, wall-clock time, and the bounds of
//! the faulting thread's stack.
//!
//! Every query is fallible and returns `None` (or a `None` field) instead of
//! an error; the report prints `Unknown` in its place. Implementations must
//! not allocate, since they run inside the fault handler.

use std::fmt;

use crate::types::{Address, NameString, PathString};

const MEGABYTE: u64 = 1024 * 1024;

/// Operating system identification (`uname(2)`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsVersion
{
    /// Kernel name, e.g. `Linux` or `Darwin`.
    pub name: NameString,
    /// Kernel release.
    pub release: NameString,
    /// Hardware identifier, e.g. `x86_64`.
    pub machine: NameString,
}

/// Limit on the process's virtual address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace
{
    /// Limited to this many bytes.
    Limited(u64),
    /// No limit set.
    Unlimited,
}

/// Memory totals in bytes
///
/// Each figure is independent; a platform that cannot report one leaves it
/// `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats
{
    /// Installed physical memory.
    pub physical_total: Option<u64>,
    /// Physical memory currently free.
    pub physical_free: Option<u64>,
    /// Total swap space.
    pub swap_total: Option<u64>,
    /// Swap space currently free.
    pub swap_free: Option<u64>,
    /// Address-space limit of this process.
    pub address_space: Option<AddressSpace>,
    /// Virtual memory this process has mapped.
    pub address_space_used: Option<u64>,
}

impl MemoryStats
{
    /// Percentage of physical memory in use, rounded to the nearest percent.
    pub fn load_percent(&self) -> Option<u64>
    {
        let total = self.physical_total.filter(|total| *total > 0)?;
        let free = self.physical_free?.min(total);
        let used = total - free;
        Some(((used as u128 * 100 + total as u128 / 2) / total as u128) as u64)
    }

    /// Room left under the address-space limit.
    ///
    /// Unlimited stays unlimited; a limited space needs the mapped size too.
    pub fn address_space_free(&self) -> Option<AddressSpace>
    {
        match self.address_space? {
            AddressSpace::Limited(limit) => Some(AddressSpace::Limited(limit.saturating_sub(self.address_space_used?))),
            AddressSpace::Unlimited => Some(AddressSpace::Unlimited),
        }
    }
}

/// Bytes to whole megabytes, rounding up.
pub fn megabytes(bytes: u64) -> u64
{
    bytes.div_ceil(MEGABYTE)
}

/// Broken-down local wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime
{
    pub year: i32,
    /// 1 to 12.
    pub month: u32,
    /// 1 to 31.
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl LocalTime
{
    /// Break down seconds since the Unix epoch, already shifted to local time.
    ///
    /// Integer arithmetic only (proleptic Gregorian calendar), so it is safe
    /// to call while another thread or the faulting frame holds libc's time
    /// zone lock.
    pub fn from_unix_seconds(seconds: i64) -> Self
    {
        const SECONDS_PER_DAY: i64 = 86_400;
        const DAYS_PER_ERA: i64 = 146_097;
        // Days from 0000-03-01 to 1970-01-01.
        const EPOCH_SHIFT: i64 = 719_468;

        let days = seconds.div_euclid(SECONDS_PER_DAY);
        let clock = seconds.rem_euclid(SECONDS_PER_DAY);

        // Eras of 400 years starting on March 1st put the leap day last.
        let shifted = days + EPOCH_SHIFT;
        let era = shifted.div_euclid(DAYS_PER_ERA);
        let day_of_era = shifted.rem_euclid(DAYS_PER_ERA);
        let year_of_era = (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
        let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
        let month_index = (5 * day_of_year + 2) / 153;
        let day = day_of_year - (153 * month_index + 2) / 5 + 1;
        let month = if month_index < 10 { month_index + 3 } else { month_index - 9 };
        let year = year_of_era + era * 400 + i64::from(month <= 2);

        Self {
            year: year as i32,
            month: month as u32,
            day: day as u32,
            hour: (clock / 3600) as u32,
            minute: (clock / 60 % 60) as u32,
            second: (clock % 60) as u32,
        }
    }
}

impl fmt::Display for LocalTime
{
    /// `M/D/YYYY HH:MM:SS`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "{}/{}/{:04} {:02}:{:02}:{:02}",
            self.month, self.day, self.year, self.hour, self.minute, self.second
        )
    }
}

/// Host facts used by the report
pub trait Environment
{
    /// Absolute path of the running executable.
    fn executable_path(&self) -> Option<PathString>;

    /// Name of the account running the process.
    fn user_name(&self) -> Option<NameString>;

    /// Kernel identification.
    fn os_version(&self) -> Option<OsVersion>;

    /// Number of online logical processors.
    fn processor_count(&self) -> Option<u32>;

    /// Memory totals and the address-space limit.
    fn memory_stats(&self) -> MemoryStats;

    /// Current local time.
    fn local_time(&self) -> Option<LocalTime>;

    /// Highest address of the stack that contains `stack_pointer`.
    fn stack_base(&self, stack_pointer: Address) -> Option<Address>;
}

impl<E: Environment + ?Sized> Environment for &E
{
    fn executable_path(&self) -> Option<PathString>
    {
        (**self).executable_path()
    }

    fn user_name(&self) -> Option<NameString>
    {
        (**self).user_name()
    }

    fn os_version(&self) -> Option<OsVersion>
    {
        (**self).os_version()
    }

    fn processor_count(&self) -> Option<u32>
    {
        (**self).processor_count()
    }

    fn memory_stats(&self) -> MemoryStats
    {
        (**self).memory_stats()
    }

    fn local_time(&self) -> Option<LocalTime>
    {
        (**self).local_time()
    }

    fn stack_base(&self, stack_pointer: Address) -> Option<Address>
    {
        (**self).stack_base(stack_pointer)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_megabytes_round_up()
    {
        assert_eq!(megabytes(0), 0);
        assert_eq!(megabytes(1), 1);
        assert_eq!(megabytes(MEGABYTE), 1);
        assert_eq!(megabytes(MEGABYTE + 1), 2);
        assert_eq!(megabytes(u64::MAX), u64::MAX / MEGABYTE + 1);
    }

    #[test]
    fn test_load_percent()
    {
        let stats = MemoryStats {
            physical_total: Some(8 * MEGABYTE),
            physical_free: Some(2 * MEGABYTE),
            ..MemoryStats::default()
        };
        assert_eq!(stats.load_percent(), Some(75));

        let empty = MemoryStats {
            physical_total: Some(0),
            physical_free: Some(0),
            ..MemoryStats::default()
        };
        assert_eq!(empty.load_percent(), None);
        assert_eq!(MemoryStats::default().load_percent(), None);
    }

    #[test]
    fn test_address_space_free()
    {
        let mut stats = MemoryStats {
            address_space: Some(AddressSpace::Limited(4096 * MEGABYTE)),
            address_space_used: Some(1000 * MEGABYTE),
            ..MemoryStats::default()
        };
        assert_eq!(stats.address_space_free(), Some(AddressSpace::Limited(3096 * MEGABYTE)));

        stats.address_space_used = Some(5000 * MEGABYTE);
        assert_eq!(stats.address_space_free(), Some(AddressSpace::Limited(0)));

        stats.address_space_used = None;
        assert_eq!(stats.address_space_free(), None);

        stats.address_space = Some(AddressSpace::Unlimited);
        assert_eq!(stats.address_space_free(), Some(AddressSpace::Unlimited));
    }

    #[test]
    fn test_local_time_format()
    {
        let time = LocalTime {
            year: 2024,
            month: 3,
            day: 7,
            hour: 9,
            minute: 5,
            second: 0,
        };
        assert_eq!(time.to_string(), "3/7/2024 09:05:00");
    }

    #[test]
    fn test_local_time_from_known_epochs()
    {
        assert_eq!(LocalTime::from_unix_seconds(0).to_string(), "1/1/1970 00:00:00");
        assert_eq!(LocalTime::from_unix_seconds(-1).to_string(), "12/31/1969 23:59:59");
        assert_eq!(LocalTime::from_unix_seconds(951_782_400).to_string(), "2/29/2000 00:00:00");
        assert_eq!(LocalTime::from_unix_seconds(1_709_802_302).to_string(), "3/7/2024 09:05:02");
        assert_eq!(LocalTime::from_unix_seconds(4_102_444_799).to_string(), "12/31/2099 23:59:59");
        // Five hours east of UTC.
        assert_eq!(LocalTime::from_unix_seconds(1_709_802_302 + 5 * 3600).to_string(), "3/7/2024 14:05:02");
    }
}
