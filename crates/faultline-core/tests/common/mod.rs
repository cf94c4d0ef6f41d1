//! In-memory collaborators for driving the fault trap without a real fault

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use faultline_core::buffer::ReportSink;
use faultline_core::environment::{AddressSpace, Environment, LocalTime, MemoryStats, OsVersion};
use faultline_core::module::{ModuleInfo, ModuleResolver};
use faultline_core::probe::MemoryProbe;
use faultline_core::trap::ReportHost;
use faultline_core::types::{Address, NameString, PathString};
use faultline_core::ReporterConfig;

pub const MEGABYTE: u64 = 1024 * 1024;

/// Fixed host facts
#[derive(Debug, Clone)]
pub struct FakeEnvironment
{
    pub executable: Option<&'static str>,
    pub user: Option<&'static str>,
    pub stack_base: Option<Address>,
}

impl Default for FakeEnvironment
{
    fn default() -> Self
    {
        Self {
            executable: Some("/opt/app/bin/app"),
            user: Some("tester"),
            stack_base: None,
        }
    }
}

impl Environment for FakeEnvironment
{
    fn executable_path(&self) -> Option<PathString>
    {
        self.executable.map(PathString::from_str_truncating)
    }

    fn user_name(&self) -> Option<NameString>
    {
        self.user.map(NameString::from_str_truncating)
    }

    fn os_version(&self) -> Option<OsVersion>
    {
        Some(OsVersion {
            name: NameString::from_str_truncating("Linux"),
            release: NameString::from_str_truncating("6.1.0"),
            machine: NameString::from_str_truncating("x86_64"),
        })
    }

    fn processor_count(&self) -> Option<u32>
    {
        Some(4)
    }

    fn memory_stats(&self) -> MemoryStats
    {
        MemoryStats {
            physical_total: Some(8192 * MEGABYTE),
            physical_free: Some(2048 * MEGABYTE),
            swap_total: Some(1024 * MEGABYTE),
            swap_free: None,
            address_space: Some(AddressSpace::Unlimited),
            address_space_used: Some(512 * MEGABYTE),
        }
    }

    fn local_time(&self) -> Option<LocalTime>
    {
        Some(LocalTime {
            year: 2024,
            month: 3,
            day: 7,
            hour: 9,
            minute: 5,
            second: 2,
        })
    }

    fn stack_base(&self, _stack_pointer: Address) -> Option<Address>
    {
        self.stack_base
    }
}

/// Readable memory made of explicit regions; everything else is unmapped
#[derive(Debug, Clone, Default)]
pub struct MappedMemory
{
    regions: Vec<(u64, Vec<u8>)>,
}

impl MappedMemory
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn with_bytes(mut self, start: u64, bytes: &[u8]) -> Self
    {
        self.regions.push((start, bytes.to_vec()));
        self
    }

    /// Native-endian words starting at `start`.
    pub fn with_words(self, start: u64, words: &[u64]) -> Self
    {
        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_ne_bytes()).collect();
        self.with_bytes(start, &bytes)
    }
}

impl MemoryProbe for MappedMemory
{
    fn read_into(&self, address: Address, out: &mut [u8]) -> bool
    {
        let start = address.value();
        self.regions.iter().any(|(base, bytes)| {
            let Some(offset) = start.checked_sub(*base) else {
                return false;
            };
            let offset = offset as usize;
            match bytes.get(offset..offset + out.len()) {
                Some(src) => {
                    out.copy_from_slice(src);
                    true
                }
                None => false,
            }
        })
    }
}

/// Resolves every address to one module
#[derive(Debug, Clone, Copy)]
pub struct OneModule
{
    pub path: &'static str,
    pub base: u64,
}

impl ModuleResolver for OneModule
{
    fn resolve(&self, _address: Address) -> ModuleInfo
    {
        ModuleInfo::from_path(self.path.as_bytes(), Some(Address::new(self.base)))
    }
}

/// Sink recording each `write_all` call
#[derive(Debug, Clone, Default)]
pub struct MemorySink
{
    pub writes: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl MemorySink
{
    pub fn write_count(&self) -> usize
    {
        self.writes.borrow().len()
    }

    pub fn text(&self) -> String
    {
        let bytes: Vec<u8> = self.writes.borrow().iter().flatten().copied().collect();
        String::from_utf8(bytes).unwrap()
    }
}

impl ReportSink for MemorySink
{
    fn write_all(&mut self, bytes: &[u8]) -> bool
    {
        self.writes.borrow_mut().push(bytes.to_vec());
        true
    }
}

/// Host wiring the fakes together
pub struct TestHost
{
    pub config: ReporterConfig,
    pub env: FakeEnvironment,
    pub memory: MappedMemory,
    pub resolver: OneModule,
    pub sink: MemorySink,
    pub open_fails: bool,
    pub opened: RefCell<Vec<String>>,
}

impl TestHost
{
    pub fn new(memory: MappedMemory) -> Self
    {
        Self {
            config: ReporterConfig::default(),
            env: FakeEnvironment::default(),
            memory,
            resolver: OneModule {
                path: "/opt/app/bin/app",
                base: 0x40_0000,
            },
            sink: MemorySink::default(),
            open_fails: false,
            opened: RefCell::new(Vec::new()),
        }
    }
}

impl ReportHost for TestHost
{
    type Env = FakeEnvironment;
    type Probe = MappedMemory;
    type Resolver = OneModule;
    type Sink = MemorySink;

    fn config(&self) -> &ReporterConfig
    {
        &self.config
    }

    fn environment(&self) -> &FakeEnvironment
    {
        &self.env
    }

    fn probe(&self) -> &MappedMemory
    {
        &self.memory
    }

    fn resolver(&self) -> &OneModule
    {
        &self.resolver
    }

    fn open_report(&self, path: &PathString) -> Option<MemorySink>
    {
        self.opened.borrow_mut().push(path.to_string());
        (!self.open_fails).then(|| self.sink.clone())
    }
}
