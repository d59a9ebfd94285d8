use std::{error, fmt};

use crate::hex::Hex;

/// Well-known platform error codes the engine produces itself.
///
/// These mirror the Windows `winerror.h` values so that engine-level checks
/// report through the same channel as real API failures.
pub mod codes {
    /// The operation completed successfully (`ERROR_SUCCESS`).
    pub const SUCCESS: u32 = 0;

    /// A fixed-size field cannot hold the value (`ERROR_NOT_ENOUGH_MEMORY`).
    pub const NOT_ENOUGH_MEMORY: u32 = 8;

    /// An object that should be present is missing (`ERROR_INVALID_HANDLE`).
    pub const INVALID_HANDLE: u32 = 6;

    /// A snapshot raced a changing module list (`ERROR_BAD_LENGTH`).
    pub const BAD_LENGTH: u32 = 24;

    /// An unclassified failure (`ERROR_GEN_FAILURE`).
    pub const GEN_FAILURE: u32 = 31;

    /// A value was rejected before reaching the OS (`ERROR_INVALID_PARAMETER`).
    pub const INVALID_PARAMETER: u32 = 87;

    /// A bounded wait elapsed before the object was signaled (`WAIT_TIMEOUT`).
    pub const TIMEOUT: u32 = 258;

    /// Exit-code sentinel of a process that has not exited (`STILL_ACTIVE`).
    pub const STILL_ACTIVE: u32 = 259;

    /// A cross-process read or write completed partially (`ERROR_PARTIAL_COPY`).
    pub const PARTIAL_COPY: u32 = 299;

    /// A shared system library is not mapped where it was expected
    /// (`ERROR_INVALID_ADDRESS`).
    pub const INVALID_ADDRESS: u32 = 487;

    /// The operation does not apply to the object's current state
    /// (`ERROR_INVALID_OPERATION`).
    pub const INVALID_OPERATION: u32 = 4317;
}

/// An error produced by an engine operation.
///
/// Every failure is the same shape: a short tag naming the failing call site
/// and the platform error code it produced. Code [`codes::SUCCESS`] means
/// "no error"; whether an operation succeeded is decided by the code alone,
/// never by the rendered message.
///
/// The message is resolved from the OS on every [`Display`] call and never
/// cached: the same code can format differently per locale, and codes the
/// platform cannot resolve (application-defined sentinels travelling through
/// the unified channel) fall back to a raw hexadecimal rendering.
///
/// [`Display`]: fmt::Display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsError {
    operation: &'static str,
    code: u32,
}

impl OsError {
    /// Creates an error for `operation` with the given platform code.
    pub const fn new(operation: &'static str, code: u32) -> Self {
        Self { operation, code }
    }

    /// Captures the calling thread's last error code under `operation`.
    #[cfg(windows)]
    pub fn last(operation: &'static str) -> Self {
        Self::new(operation, unsafe {
            windows_sys::Win32::Foundation::GetLastError()
        })
    }

    /// Captures the OS code carried by an I/O error under `operation`.
    pub fn from_io(operation: &'static str, error: &std::io::Error) -> Self {
        let code = error
            .raw_os_error()
            .map(|code| code as u32)
            .unwrap_or(codes::GEN_FAILURE);

        Self::new(operation, code)
    }

    /// The tag naming the failing call site.
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// The platform error code; `0` means success.
    pub const fn code(&self) -> u32 {
        self.code
    }

    /// Whether this value represents a failure.
    pub const fn is_error(&self) -> bool {
        self.code != codes::SUCCESS
    }

    /// Whether this value represents an elapsed bounded wait.
    pub const fn is_timeout(&self) -> bool {
        self.code == codes::TIMEOUT
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == codes::SUCCESS {
            return f.write_str("No error.");
        }

        match system_message(self.code) {
            Some(message) => write!(f, "{}: {}", self.operation, message),
            None => write!(f, "{}: unresolved error {}", self.operation, Hex(self.code)),
        }
    }
}

impl error::Error for OsError {}

/// Asks the OS for the human-readable message behind `code`.
#[cfg(windows)]
fn system_message(code: u32) -> Option<String> {
    use widestring::U16Str;
    use windows_sys::Win32::System::Diagnostics::Debug::{
        FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS, FormatMessageW,
    };

    let mut buffer = [0u16; 512];
    let len = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            std::ptr::null(),
            code,
            0, // default language
            buffer.as_mut_ptr(),
            buffer.len() as u32,
            std::ptr::null(),
        )
    };

    if len == 0 {
        return None;
    }

    let message = U16Str::from_slice(&buffer[..len as usize]).to_string_lossy();
    let message = message.trim_end();

    if message.is_empty() {
        None
    } else {
        Some(message.to_string())
    }
}

#[cfg(not(windows))]
fn system_message(_code: u32) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::{OsError, codes};

    #[test]
    fn success_is_not_an_error() {
        let error = OsError::new("CreateProcessW", codes::SUCCESS);
        assert!(!error.is_error());
        assert_eq!(error.to_string(), "No error.");
    }

    #[test]
    fn nonzero_code_is_an_error() {
        let error = OsError::new("VirtualAllocEx", codes::NOT_ENOUGH_MEMORY);
        assert!(error.is_error());
        assert!(!error.is_timeout());
        assert_eq!(error.code(), 8);
        assert_eq!(error.operation(), "VirtualAllocEx");
    }

    #[test]
    fn timeout_code_is_a_timeout() {
        let error = OsError::new("WaitForSingleObject", codes::TIMEOUT);
        assert!(error.is_error());
        assert!(error.is_timeout());
    }

    #[test]
    fn unresolvable_code_renders_as_hex() {
        // An application-defined sentinel no platform message table knows.
        let error = OsError::new("remote entry point", 0xE000_F00D);
        let rendered = error.to_string();
        assert!(rendered.starts_with("remote entry point: "));
        assert!(rendered.ends_with("0xe000f00d"));
    }

    #[test]
    fn errors_compare_by_value() {
        let a = OsError::new("ResumeThread", codes::INVALID_OPERATION);
        let b = OsError::new("ResumeThread", codes::INVALID_OPERATION);
        assert_eq!(a, b);
    }
}
