//! Build script for faultline-core
//!
//! This script checks build requirements before compilation:
//! - Minimum Rust version (C string literals need Rust 1.77.0+)
//! - Target support for the signal backend
//!
//! ## Requirements
//!
//! - **Rust**: 1.77.0 or newer
//! - **Linux / macOS**: x86_64 or aarch64 for full register capture
//! - **Windows**: not supported; `install` returns an error

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match rustc_version::version() {
        Ok(found) => {
            let required = rustc_version::Version::new(1, 77, 0);
            if found < required {
                panic!("faultline-core requires Rust {required} or newer, found {found}");
            }
        }
        // Some build environments hide rustc; don't fail the build over it.
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    check_target();
}

fn check_target()
{
    // Cargo describes the target, not the host, through these variables.
    let os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let arch = std::env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let family = std::env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();

    if !family.split(',').any(|f| f == "unix") {
        println!("cargo:warning=faultline-core has no fault backend for target os `{os}`; install() will fail");
        return;
    }

    let captured_os = matches!(os.as_str(), "linux" | "android" | "macos" | "ios");
    let captured_arch = matches!(arch.as_str(), "x86_64" | "aarch64");
    if !(captured_os && captured_arch) {
        println!("cargo:warning=registers are not captured on {os}/{arch}; reports will show them as unavailable");
    }
}
