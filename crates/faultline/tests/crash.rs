//! Crash the CLI for real and read back the report it leaves behind

#![cfg(any(target_os = "linux", target_os = "macos"))]

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Command;

fn crash(kind: &str) -> (Option<i32>, String)
{
    let dir = std::env::temp_dir().join(format!("faultline-cli-{}-{kind}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let report: PathBuf = dir.join("faultline-crashlog.txt");
    let _ = std::fs::remove_file(&report);

    let status = Command::new(env!("CARGO_BIN_EXE_faultline"))
        .args(["crash", kind, "--output-dir"])
        .arg(&dir)
        .env("RUST_LOG", "off")
        .status()
        .unwrap();

    let text = std::fs::read_to_string(&report).unwrap_or_default();
    std::fs::remove_dir_all(&dir).unwrap();
    (status.signal(), text)
}

#[test]
fn test_write_fault_report()
{
    let (signal, text) = crash("write");

    assert_eq!(signal, Some(libc::SIGSEGV));
    assert!(text.starts_with("faultline caused an Access Violation Exception at 0x"), "{text}");
    assert!(text.contains("The memory could not be written."));
    assert!(text.contains("Context:"));
    assert!(text.contains("Stack:"));
    assert!(text.ends_with("===== [end of faultline-crashlog.txt] =====\n"));
}

#[test]
fn test_read_fault_report()
{
    let (signal, text) = crash("read");

    assert_eq!(signal, Some(libc::SIGSEGV));
    assert!(text.contains("Access violation at 0x0000000000000010. The memory could not be read."));
}

#[test]
fn test_abort_report()
{
    let (signal, text) = crash("abort");

    assert_eq!(signal, Some(libc::SIGABRT));
    assert!(text.starts_with("faultline caused an Abort Exception"), "{text}");
    assert!(!text.contains("Access violation"));
}

#[test]
fn test_illegal_instruction_report()
{
    let (signal, text) = crash("illegal");

    assert_eq!(signal, Some(libc::SIGILL));
    assert!(text.starts_with("faultline caused an Illegal Instruction Exception"), "{text}");
}

#[test]
fn test_stack_overflow_report()
{
    let (signal, text) = crash("overflow");

    assert_eq!(signal, Some(libc::SIGSEGV));
    assert!(text.starts_with("faultline caused a Stack Overflow Exception"), "{text}");
    assert!(text.contains("===== [end of faultline-crashlog.txt] ====="));
}
