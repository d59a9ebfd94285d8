//! Handles and control operations for a target process.

use std::time::Duration;

use windows_sys::Win32::Foundation::{WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, INFINITE, OpenProcess, PROCESS_ALL_ACCESS, ResumeThread,
    TerminateProcess, WaitForSingleObject,
};

use crate::{
    error::{OsError, codes},
    handle::Handle,
    launch::{LaunchOptions, spawn},
};

/// A launched or attached target process.
///
/// A failed launch still yields a `Process`: the creation error is stored
/// and every subsequent operation short-circuits with it instead of
/// touching the OS. [`Process::error`] tells the two states apart.
pub struct Process {
    inner: Result<Inner, OsError>,
}

struct Inner {
    process: Handle,

    /// Primary thread of a launched child; never valid for attached targets.
    thread: Handle,

    process_id: u32,
}

impl Process {
    /// Launches a new target process according to `options`.
    ///
    /// On failure no child exists; the returned value stores the error and
    /// holds no handles.
    pub fn launch(options: &LaunchOptions) -> Self {
        match spawn(options) {
            Ok(spawned) => Self {
                inner: Ok(Inner {
                    process: spawned.process,
                    thread: spawned.thread,
                    process_id: spawned.process_id,
                }),
            },
            Err(error) => {
                tracing::debug!(%error, "launch failed");
                Self { inner: Err(error) }
            }
        }
    }

    /// Attaches to a running process by identifier.
    ///
    /// Attached targets carry no primary-thread handle, so [`resume`] is
    /// not available for them.
    ///
    /// [`resume`]: Self::resume
    pub fn attach(process_id: u32) -> Self {
        let raw = unsafe { OpenProcess(PROCESS_ALL_ACCESS, 0, process_id) };
        if raw.is_null() {
            return Self {
                inner: Err(OsError::last("OpenProcess")),
            };
        }

        Self {
            inner: Ok(Inner {
                process: unsafe { Handle::from_raw(raw) },
                thread: Handle::null(),
                process_id,
            }),
        }
    }

    /// The stored creation error, if creation failed.
    pub fn error(&self) -> Option<OsError> {
        self.inner.as_ref().err().copied()
    }

    /// Whether this value represents a failed creation.
    pub fn is_error(&self) -> bool {
        self.inner.is_err()
    }

    /// The target's process identifier.
    pub fn id(&self) -> Result<u32, OsError> {
        Ok(self.inner()?.process_id)
    }

    /// Resumes the suspended primary thread.
    ///
    /// Fails with `ERROR_INVALID_OPERATION` when the thread was not
    /// suspended and with `ERROR_INVALID_HANDLE` for attached targets.
    pub fn resume(&self) -> Result<(), OsError> {
        let inner = self.inner()?;
        if !inner.thread.is_valid() {
            return Err(OsError::new("ResumeThread", codes::INVALID_HANDLE));
        }

        let previous = unsafe { ResumeThread(inner.thread.as_raw()) };
        if previous == u32::MAX {
            return Err(OsError::last("ResumeThread"));
        }
        if previous == 0 {
            return Err(OsError::new("ResumeThread", codes::INVALID_OPERATION));
        }

        tracing::debug!(pid = inner.process_id, "primary thread resumed");
        Ok(())
    }

    /// Forcibly terminates the target immediately.
    ///
    /// No cleanup runs inside the target; available regardless of
    /// suspension state.
    pub fn terminate(&self, exit_code: u32) -> Result<(), OsError> {
        let inner = self.inner()?;

        if unsafe { TerminateProcess(inner.process.as_raw(), exit_code) } == 0 {
            return Err(OsError::last("TerminateProcess"));
        }

        tracing::debug!(pid = inner.process_id, exit_code, "process terminated");
        Ok(())
    }

    /// Blocks until the target exits or `timeout` elapses.
    ///
    /// `None` waits without bound. An elapsed timeout surfaces as an error
    /// whose code is `WAIT_TIMEOUT`; see [`OsError::is_timeout`].
    pub fn wait_for_exit(&self, timeout: Option<Duration>) -> Result<(), OsError> {
        let inner = self.inner()?;

        let millis = match timeout {
            Some(timeout) => timeout.as_millis().min(u128::from(INFINITE - 1)) as u32,
            None => INFINITE,
        };

        match unsafe { WaitForSingleObject(inner.process.as_raw(), millis) } {
            WAIT_OBJECT_0 => Ok(()),
            WAIT_TIMEOUT => Err(OsError::new("WaitForSingleObject", codes::TIMEOUT)),
            _ => Err(OsError::last("WaitForSingleObject")),
        }
    }

    /// Exit code of a target that has exited.
    ///
    /// Meaningful only after [`wait_for_exit`] has observed the exit:
    /// before that, the platform reports the `STILL_ACTIVE` sentinel (259),
    /// which must not be mistaken for a final code.
    ///
    /// [`wait_for_exit`]: Self::wait_for_exit
    pub fn exit_code(&self) -> Result<u32, OsError> {
        let inner = self.inner()?;

        let mut code = 0u32;
        if unsafe { GetExitCodeProcess(inner.process.as_raw(), &mut code) } == 0 {
            return Err(OsError::last("GetExitCodeProcess"));
        }

        Ok(code)
    }

    /// The target's process handle, or the stored creation error.
    pub(crate) fn os_handle(&self) -> Result<&Handle, OsError> {
        Ok(&self.inner()?.process)
    }

    fn inner(&self) -> Result<&Inner, OsError> {
        self.inner.as_ref().map_err(|error| *error)
    }
}
