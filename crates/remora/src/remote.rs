//! Memory committed inside another process's address space.

use std::ffi::c_void;

use windows_sys::Win32::System::Diagnostics::Debug::WriteProcessMemory;
use windows_sys::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE, VirtualAllocEx, VirtualFreeEx,
};

use crate::{
    error::{OsError, codes},
    handle::Handle,
    hex::Hex,
};

/// A block of memory committed in a target process.
///
/// Ordinary deallocation does not apply across address spaces: release must
/// go through the process the block lives in. The wrapper keeps the owning
/// process handle borrowed for exactly that reason and frees the region
/// remotely when dropped, on every exit path of an injection.
pub struct RemoteAllocation<'p> {
    process: &'p Handle,
    base: usize,
    size: usize,
}

impl<'p> RemoteAllocation<'p> {
    /// Commits `size` bytes of executable, writable memory in the target.
    pub fn executable(process: &'p Handle, size: usize) -> Result<Self, OsError> {
        let base = unsafe {
            VirtualAllocEx(
                process.as_raw(),
                std::ptr::null(),
                size,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_EXECUTE_READWRITE,
            )
        };

        if base.is_null() {
            return Err(OsError::last("VirtualAllocEx"));
        }

        let base = base as usize;
        tracing::debug!(base = %Hex(base), size, "remote region committed");

        Ok(Self {
            process,
            base,
            size,
        })
    }

    /// Base address of the region, in the target's address space.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Writes `data` into the region at `offset`.
    ///
    /// Fails unless the platform reports exactly `data.len()` bytes written.
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<(), OsError> {
        if offset + data.len() > self.size {
            return Err(OsError::new("WriteProcessMemory", codes::INVALID_PARAMETER));
        }

        let mut written = 0usize;
        let ok = unsafe {
            WriteProcessMemory(
                self.process.as_raw(),
                (self.base + offset) as *const c_void,
                data.as_ptr().cast(),
                data.len(),
                &mut written,
            )
        };

        if ok == 0 {
            return Err(OsError::last("WriteProcessMemory"));
        }
        if written != data.len() {
            return Err(OsError::new("WriteProcessMemory", codes::PARTIAL_COPY));
        }

        Ok(())
    }
}

impl Drop for RemoteAllocation<'_> {
    fn drop(&mut self) {
        let freed = unsafe {
            VirtualFreeEx(
                self.process.as_raw(),
                self.base as *mut c_void,
                0,
                MEM_RELEASE,
            )
        };

        if freed == 0 {
            // Nothing to propagate from a destructor; the target may already
            // be gone.
            tracing::warn!(base = %Hex(self.base), "VirtualFreeEx failed");
        }
    }
}
