//! # Types
//!
//! Small value types shared by every component of the reporter.
//!
//! None of these allocate: they are built and passed around by value while a
//! fault is being handled.

pub mod address;
pub mod fixed;

// Re-export all public types
pub use address::Address;
pub use fixed::{FixedString, NameString, PathString, NAME_CAPACITY, PATH_CAPACITY};
