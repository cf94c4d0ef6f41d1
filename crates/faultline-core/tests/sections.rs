//! Report sections rendered against fake memory

mod common;

use common::MappedMemory;
use faultline_core::sections::{code_bytes, registers, stack};
use faultline_core::snapshot::{Architecture, FaultCode, FaultContext};
use faultline_core::types::Address;

const SP: u64 = 0x10_0000;

fn fault_with_stack(base: Option<u64>) -> FaultContext
{
    FaultContext::new(FaultCode::new(libc::SIGSEGV, 1), Address::new(0x1000), Architecture::X86_64)
        .with_stack(Address::new(SP), base.map(Address::new))
}

fn stack_words(text: &str) -> usize
{
    text.lines()
        .filter(|line| line.starts_with("0x"))
        .map(|line| {
            line.split_whitespace()
                .skip(1)
                .filter(|field| field.len() == 16 && field.chars().all(|c| c.is_ascii_hexdigit()))
                .count()
        })
        .sum()
}

#[test]
fn test_code_bytes_keep_position_of_unreadable_bytes()
{
    let memory = MappedMemory::new().with_bytes(0x1000, &[0xaa, 0xbb]).with_bytes(0x1003, &[0xcc]);
    let mut out = String::new();
    code_bytes(&mut out, &memory, Address::new(0x1000), 5).unwrap();

    assert_eq!(out, "Bytes at instruction pointer:\naa bb ?? cc ??\n");
}

#[test]
fn test_code_bytes_wrap_every_sixteen()
{
    let memory = MappedMemory::new().with_bytes(0x1000, &[0x90; 20]);
    let mut out = String::new();
    code_bytes(&mut out, &memory, Address::new(0x1000), 20).unwrap();

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1].split(' ').count(), 16);
    assert_eq!(lines[2], "90 90 90 90");
}

#[test]
fn test_stack_dump_bounded_by_byte_limit()
{
    let words: Vec<u64> = (0..600).collect();
    let memory = MappedMemory::new().with_words(SP, &words);
    let mut out = String::new();
    stack(&mut out, &memory, &fault_with_stack(None), 3072 + 40).unwrap();

    // 3112 bytes is 389 whole words.
    assert_eq!(stack_words(&out), 389);

    let mut out = String::new();
    stack(&mut out, &memory, &fault_with_stack(None), 3072).unwrap();
    assert_eq!(stack_words(&out), 384);
    assert_eq!(out.lines().filter(|line| line.starts_with("0x")).count(), 96);
    assert!(!out.contains("Could not access"));
}

#[test]
fn test_stack_dump_bounded_by_byte_limit_below_known_base()
{
    let words: Vec<u64> = (0..600).collect();
    let memory = MappedMemory::new().with_words(SP, &words);

    for extra in [1, 7, 8, 9, 800] {
        let mut out = String::new();
        stack(&mut out, &memory, &fault_with_stack(Some(SP + 3072 + extra)), 3072).unwrap();

        assert_eq!(stack_words(&out), 384, "base {extra} bytes past the limit");
        assert!(!out.contains("Could not access"));
    }
}

#[test]
fn test_stack_dump_stops_at_base()
{
    let words: Vec<u64> = (0..64).collect();
    let memory = MappedMemory::new().with_words(SP, &words);
    let mut out = String::new();
    stack(&mut out, &memory, &fault_with_stack(Some(SP + 6 * 8)), 3072).unwrap();

    assert_eq!(stack_words(&out), 6);
    let rows: Vec<&str> = out.lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].starts_with("0x0000000000100020: 0000000000000004 0000000000000005"));
    assert!(!out.contains("Could not access"));
}

#[test]
fn test_stack_dump_stops_at_first_unreadable_word()
{
    let memory = MappedMemory::new().with_words(SP, &[0x41, 0x42, 0x43, 0x44, 0x45]);
    let mut out = String::new();
    stack(&mut out, &memory, &fault_with_stack(None), 3072).unwrap();

    assert_eq!(stack_words(&out), 5);
    assert!(out.ends_with("Could not access stack at 0x0000000000100028.\n"));
}

#[test]
fn test_stack_dump_with_unreadable_stack_pointer()
{
    let mut out = String::new();
    stack(&mut out, &MappedMemory::new(), &fault_with_stack(None), 3072).unwrap();

    assert_eq!(out, "Stack:\nCould not access stack at 0x0000000000100000.\n");
}

#[test]
fn test_stack_ascii_column()
{
    let word = u64::from_ne_bytes(*b"faultln!");
    let memory = MappedMemory::new().with_words(SP, &[word]);
    let mut out = String::new();
    stack(&mut out, &memory, &fault_with_stack(Some(SP + 8)), 3072).unwrap();

    assert!(out.lines().nth(1).unwrap().ends_with(" faultln!"));
}

#[test]
fn test_arm64_context_lists_every_register()
{
    let fault = FaultContext::new(FaultCode::new(libc::SIGILL, 1), Address::new(0x4000), Architecture::Arm64)
        .with_register("PC", 0x4000)
        .with_register("X0", 7);
    let mut out = String::new();
    registers(&mut out, &fault).unwrap();

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "Context:");
    // 34 registers, three per line.
    assert_eq!(lines.len(), 1 + 12);
    assert!(lines[1].starts_with("X0: 0x0000000000000007  X1: 0x????????????????"));
    assert!(out.contains("PC: 0x0000000000004000"));
}
