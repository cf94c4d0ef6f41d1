//! Module lookup with `dladdr(3)`.

use std::ffi::CStr;

use crate::module::{ModuleInfo, ModuleResolver};
use crate::types::Address;

/// Resolves addresses through the dynamic loader's own bookkeeping
///
/// `dladdr` walks the loader's in-memory list of loaded images and returns
/// pointers into it; it does not allocate or open files.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlAddrResolver;

impl ModuleResolver for DlAddrResolver
{
    fn resolve(&self, address: Address) -> ModuleInfo
    {
        if address.is_null() {
            return ModuleInfo::unknown();
        }

        // SAFETY: `Dl_info` is plain old data that `dladdr` fills in.
        let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
        let found = unsafe { libc::dladdr(address.as_usize() as *const libc::c_void, &mut info) };
        if found == 0 || info.dli_fname.is_null() {
            return ModuleInfo::unknown();
        }

        // SAFETY: a non-null `dli_fname` points at the loader's NUL-terminated path.
        let path = unsafe { CStr::from_ptr(info.dli_fname) };
        let base = (!info.dli_fbase.is_null()).then(|| Address::new(info.dli_fbase as u64));
        ModuleInfo::from_path(path.to_bytes(), base)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_resolves_own_code()
    {
        let here = test_resolves_own_code as fn() as usize as u64;
        let module = DlAddrResolver.resolve(Address::new(here));

        assert!(!module.is_unknown());
        assert!(module.base.unwrap() <= Address::new(here));
    }

    #[test]
    fn test_unmapped_address_is_unknown()
    {
        assert!(DlAddrResolver.resolve(Address::new(0x10)).is_unknown());
        assert!(DlAddrResolver.resolve(Address::ZERO).is_unknown());
    }
}
