//! # Module Resolution
//!
//! Attributes an instruction address to the loaded image (executable or
//! shared library) that contains it.
//!
//! Resolution is best effort: a failed lookup yields [`ModuleInfo::unknown`]
//! and the report carries on. Results are not cached beyond one report.

use crate::types::{Address, NameString, PathString};

/// Placeholder used for any fact the reporter could not obtain.
pub const UNKNOWN: &str = "Unknown";

/// Identity of the module owning an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInfo
{
    /// Base file name, e.g. `libc.so.6`.
    pub name: NameString,
    /// Full file path as the loader recorded it; empty when unknown.
    pub path: PathString,
    /// Load address of the image, if known.
    pub base: Option<Address>,
}

impl ModuleInfo
{
    /// Placeholder for a failed lookup.
    pub fn unknown() -> Self
    {
        Self {
            name: NameString::from_str_truncating(UNKNOWN),
            path: PathString::new(),
            base: None,
        }
    }

    /// Build from the loader's path for the image.
    pub fn from_path(path: &[u8], base: Option<Address>) -> Self
    {
        let path = PathString::from_bytes_lossy(path);
        let name = base_name(&path);
        if name.is_empty() {
            return Self { base, ..Self::unknown() };
        }

        Self {
            name: NameString::from_str_truncating(name),
            path,
            base,
        }
    }

    /// Whether this is the placeholder from a failed lookup.
    pub fn is_unknown(&self) -> bool
    {
        self.path.is_empty()
    }
}

/// Maps an address to the module that contains it
pub trait ModuleResolver
{
    /// Never fails: returns [`ModuleInfo::unknown`] when the lookup does.
    fn resolve(&self, address: Address) -> ModuleInfo;
}

impl<R: ModuleResolver + ?Sized> ModuleResolver for &R
{
    fn resolve(&self, address: Address) -> ModuleInfo
    {
        (**self).resolve(address)
    }
}

/// Final path component of `path`.
pub fn base_name(path: &str) -> &str
{
    path.rsplit('/').next().unwrap_or(path)
}

/// Directory part of `path`, without the trailing separator.
///
/// `None` for a bare file name.
pub fn dir_name(path: &str) -> Option<&str>
{
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(index) => Some(&path[..index]),
        None => None,
    }
}

/// [`base_name`] with its last extension removed.
///
/// A leading dot does not start an extension, so `.hidden` stays whole.
pub fn file_stem(path: &str) -> &str
{
    let name = base_name(path);
    match name.rfind('.') {
        Some(index) if index > 0 => &name[..index],
        _ => name,
    }
}
