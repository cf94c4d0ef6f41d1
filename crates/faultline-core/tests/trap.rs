//! Fault trap driven end to end with in-memory collaborators

mod common;

use common::{MappedMemory, TestHost};
use faultline_core::snapshot::{AccessKind, Architecture, FaultCode, FaultContext};
use faultline_core::types::Address;
use faultline_core::{Disposition, FaultTrap, TrapState};

const IP: u64 = 0x1000;
const SP: u64 = 0x7000;

fn write_fault() -> FaultContext
{
    let arch = Architecture::X86_64;
    let mut fault = FaultContext::new(FaultCode::new(libc::SIGSEGV, 1), Address::new(IP), arch)
        .with_access(Address::new(0x2000), AccessKind::Write)
        .with_stack(Address::new(SP), Some(Address::new(SP + 64)));
    for (index, name) in arch.register_names().iter().enumerate() {
        fault = fault.with_register(name, index as u64);
    }
    fault.with_register("RIP", IP).with_register("RSP", SP)
}

fn memory() -> MappedMemory
{
    MappedMemory::new()
        .with_bytes(IP, &[0xc6, 0x04, 0x25, 0x00, 0x20, 0x00, 0x00, 0x2a])
        .with_words(SP, &[1, 2, 3, 4, 5, 6, 7, 8])
}

#[test]
fn test_write_fault_produces_full_report()
{
    let trap = FaultTrap::<8192>::new();
    let host = TestHost::new(memory());

    let disposition = trap.handle(&write_fault(), &host);

    assert_eq!(disposition, Disposition::ExecuteHandler);
    assert_eq!(trap.state(), TrapState::Fired);
    assert_eq!(host.opened.borrow().as_slice(), ["/opt/app/bin/app-crashlog.txt"]);
    // Everything fits in one buffer, so the file sees exactly one write.
    assert_eq!(host.sink.write_count(), 1);

    let text = host.sink.text();
    assert!(text.starts_with("app caused an Access Violation Exception at 0x0000000000001000\n"));
    assert!(text.contains("in module app at 0x0000000000001000 (base 0x0000000000400000)\n"));
    assert!(text.contains("Fault code: signal 11 (SIGSEGV)"));
    assert!(text.contains("Error occurred at 3/7/2024 09:05:02.\n"));
    assert!(text.contains("/opt/app/bin/app, run by tester.\n"));
    assert!(text.contains("Operating system: Linux 6.1.0 (x86_64)\n"));
    assert!(text.contains("4 processor(s), type x86_64."));
    assert!(text.contains("75% memory in use.\n"));
    assert!(text.contains("Unknown MB swap space free.\n"));
    assert!(text.contains("unlimited user address space.\nunlimited user address space free.\n"));
    assert!(text.contains("Access violation at 0x0000000000002000. The memory could not be written.\n"));
    for name in Architecture::X86_64.register_names() {
        assert!(text.contains(&format!("{name}: 0x")), "missing register {name}");
    }
    assert!(text.contains("RIP: 0x0000000000001000"));
    assert!(text.contains("Bytes at instruction pointer:\nc6 04 25 00 20 00 00 2a ?? ?? ?? ?? ?? ?? ?? ??\n"));
    assert!(text.contains("0x0000000000007000: 0000000000000001"));
    assert!(text.contains("0x0000000000007020: 0000000000000005"));
    assert!(!text.contains("Could not access stack"));
    assert!(text.ends_with("===== [end of app-crashlog.txt] =====\n"));
}

#[test]
fn test_sections_appear_in_order()
{
    let trap = FaultTrap::<8192>::new();
    let host = TestHost::new(memory());
    trap.handle(&write_fault(), &host);
    let text = host.sink.text();

    let markers = [
        "caused",
        "Error occurred at",
        "run by",
        "Operating system",
        "processor(s)",
        "memory in use",
        "Access violation",
        "Context:",
        "Bytes at instruction pointer:",
        "Stack:",
        "===== [end of",
    ];
    let positions: Vec<usize> = markers.iter().map(|marker| text.find(marker).unwrap()).collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{positions:?}");
}

#[test]
fn test_second_delivery_continues_search()
{
    let trap = FaultTrap::<8192>::new();
    let host = TestHost::new(memory());

    assert_eq!(trap.handle(&write_fault(), &host), Disposition::ExecuteHandler);
    let writes = host.sink.write_count();

    assert_eq!(trap.handle(&write_fault(), &host), Disposition::ContinueSearch);
    assert_eq!(host.sink.write_count(), writes);
    assert_eq!(host.opened.borrow().len(), 1);
}

#[test]
fn test_open_failure_continues_search_and_stays_fired()
{
    let trap = FaultTrap::<8192>::new();
    let mut host = TestHost::new(memory());
    host.open_fails = true;

    assert_eq!(trap.handle(&write_fault(), &host), Disposition::ContinueSearch);
    assert_eq!(trap.state(), TrapState::Fired);
    assert_eq!(host.sink.write_count(), 0);

    host.open_fails = false;
    assert_eq!(trap.handle(&write_fault(), &host), Disposition::ContinueSearch);
    assert_eq!(host.sink.write_count(), 0);
}

#[test]
fn test_unknown_code_still_reports()
{
    let trap = FaultTrap::<8192>::new();
    let host = TestHost::new(MappedMemory::new());
    let fault = FaultContext::new(FaultCode::new(77, 0), Address::new(IP), Architecture::X86_64);

    assert_eq!(trap.handle(&fault, &host), Disposition::ExecuteHandler);
    let text = host.sink.text();
    assert!(text.starts_with("app caused an Unknown Exception at 0x0000000000001000\n"));
    assert!(!text.contains("Access violation"));
    assert!(text.contains("RIP: 0x????????????????"));
}

#[test]
fn test_missing_stack_base_comes_from_environment()
{
    let trap = FaultTrap::<8192>::new();
    let mut host = TestHost::new(memory());
    host.env.stack_base = Some(Address::new(SP + 16));
    let fault = write_fault().with_stack(Address::new(SP), None);

    trap.handle(&fault, &host);
    let text = host.sink.text();
    let stack = &text[text.find("Stack:").unwrap()..];
    assert!(stack.contains("0x0000000000007000: 0000000000000001 0000000000000002"));
    assert!(!stack.contains("0000000000000003"));
}

#[test]
fn test_small_buffer_flushes_in_pieces_without_loss()
{
    let large = FaultTrap::<8192>::new();
    let small = FaultTrap::<256>::new();
    let whole = TestHost::new(memory());
    let pieces = TestHost::new(memory());

    large.handle(&write_fault(), &whole);
    small.handle(&write_fault(), &pieces);

    assert!(pieces.sink.write_count() > 1);
    assert!(pieces.sink.writes.borrow().iter().all(|write| write.len() <= 256));
    assert_eq!(pieces.sink.text(), whole.sink.text());
}

#[test]
fn test_unknown_executable_uses_fallback_name()
{
    let trap = FaultTrap::<8192>::new();
    let mut host = TestHost::new(memory());
    host.env.executable = None;

    assert_eq!(trap.handle(&write_fault(), &host), Disposition::ExecuteHandler);
    assert_eq!(host.opened.borrow().as_slice(), ["./unknown-crashlog.txt"]);
    let text = host.sink.text();
    assert!(text.starts_with("Unknown caused an Access Violation Exception"));
    assert!(text.contains("Unknown, run by tester.\n"));
}
