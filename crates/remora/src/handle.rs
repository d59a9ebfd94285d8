//! Scoped ownership of kernel object handles.

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};

/// Owner of one kernel object handle, closed on drop.
///
/// A `Handle` may hold the null or invalid pseudo-value; closing such a
/// wrapper is a no-op. A wrapper that never received a real handle, or one
/// closed early, can be dropped safely on any exit path.
#[derive(Debug)]
pub struct Handle(HANDLE);

impl Handle {
    /// Takes ownership of a raw handle.
    ///
    /// # Safety
    ///
    /// `raw` must be either a pseudo-value or a handle this wrapper may
    /// close; nothing else may close it afterwards.
    pub unsafe fn from_raw(raw: HANDLE) -> Self {
        Self(raw)
    }

    /// A wrapper holding no handle.
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    /// The raw handle value.
    pub fn as_raw(&self) -> HANDLE {
        self.0
    }

    /// Whether the wrapper holds a real kernel handle.
    pub fn is_valid(&self) -> bool {
        !self.0.is_null() && self.0 != INVALID_HANDLE_VALUE
    }

    /// Closes the handle now. Further calls, and the drop, are no-ops.
    pub fn close(&mut self) {
        if self.is_valid() {
            unsafe { CloseHandle(self.0) };
        }
        self.0 = std::ptr::null_mut();
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}

// Process and thread handles are freely usable from any thread; callers are
// expected to drive the blocking operations from worker threads they own.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

#[cfg(test)]
mod tests {
    use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;

    use super::Handle;

    #[test]
    fn never_valid_wrappers_close_as_no_ops() {
        let mut handle = Handle::null();
        assert!(!handle.is_valid());

        handle.close();
        handle.close();
        assert!(!handle.is_valid());
    }

    #[test]
    fn invalid_pseudo_value_is_not_released() {
        let mut handle = unsafe { Handle::from_raw(INVALID_HANDLE_VALUE) };
        assert!(!handle.is_valid());

        // Dropping after an explicit close must not reach the OS again.
        handle.close();
    }
}
