//! Process creation with environment and argument control.

use std::{
    ffi::OsString,
    mem,
    path::{Path, PathBuf},
    ptr,
};

use widestring::{U16CString, U16String};
use windows_sys::Win32::System::Threading::{
    CREATE_SUSPENDED, CREATE_UNICODE_ENVIRONMENT, CreateProcessW, PROCESS_INFORMATION,
    STARTUPINFOW,
};

use crate::{
    env,
    error::{OsError, codes},
    handle::Handle,
};

/// Options for launching a target process.
///
/// # Examples
///
/// ```no_run
/// # #[cfg(windows)]
/// # fn demo() {
/// use remora::{LaunchOptions, Process};
///
/// let target = Process::launch(
///     &LaunchOptions::new("C:\\Windows\\System32\\notepad.exe")
///         .suspended(true)
///         .env("FOO", "BAR"),
/// );
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub(crate) executable: PathBuf,
    pub(crate) arguments: OsString,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) suspended: bool,
    pub(crate) environment: Vec<(OsString, OsString)>,
}

impl LaunchOptions {
    /// Options for launching `executable` with no arguments, the inherited
    /// working directory and the inherited environment.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            arguments: OsString::new(),
            working_dir: None,
            suspended: false,
            environment: Vec::new(),
        }
    }

    /// The command line handed to the new process, verbatim.
    ///
    /// Include the program name as the first token when the target parses
    /// its own command line conventionally; nothing is prepended here.
    pub fn arguments(mut self, arguments: impl Into<OsString>) -> Self {
        self.arguments = arguments.into();
        self
    }

    /// The working directory of the new process.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Creates the process with its primary thread suspended, before any
    /// target code has run. Required for injecting ahead of the target's
    /// own startup.
    pub fn suspended(mut self, suspended: bool) -> Self {
        self.suspended = suspended;
        self
    }

    /// Appends `key=value` to the inherited environment.
    ///
    /// Entries are appended, never merged: a key that also exists in the
    /// inherited environment ends up in the block twice, and the platform's
    /// parser honors the first (inherited) occurrence.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }
}

pub(crate) struct Spawned {
    pub process: Handle,
    pub thread: Handle,
    pub process_id: u32,
}

/// Creates the child described by `options`.
///
/// Either the child fully exists afterwards or no child exists at all; a
/// failure in environment retrieval happens before anything is created and
/// a `CreateProcessW` failure creates nothing.
pub(crate) fn spawn(options: &LaunchOptions) -> Result<Spawned, OsError> {
    let executable = wide_path("executable path", &options.executable)?;

    // The command line must live in a writable buffer: CreateProcessW is
    // documented to rewrite it in place.
    let mut command_line: Vec<u16> = if options.arguments.is_empty() {
        Vec::new()
    } else {
        let mut buffer = U16String::from_os_str(&options.arguments).into_vec();
        buffer.push(0);
        buffer
    };
    let command_line_ptr = if command_line.is_empty() {
        ptr::null_mut()
    } else {
        command_line.as_mut_ptr()
    };

    let working_dir = match &options.working_dir {
        Some(dir) => Some(wide_path("working directory", dir)?),
        None => None,
    };
    let working_dir_ptr = working_dir
        .as_ref()
        .map_or(ptr::null(), |dir| dir.as_ptr());

    let inherited = env::inherited_block()?;
    let block = env::merge_block(&inherited, &options.environment);

    let mut flags = CREATE_UNICODE_ENVIRONMENT;
    if options.suspended {
        flags |= CREATE_SUSPENDED;
    }

    let mut startup_info: STARTUPINFOW = unsafe { mem::zeroed() };
    startup_info.cb = mem::size_of::<STARTUPINFOW>() as u32;
    let mut process_info: PROCESS_INFORMATION = unsafe { mem::zeroed() };

    let created = unsafe {
        CreateProcessW(
            executable.as_ptr(),
            command_line_ptr,
            ptr::null(), // process security
            ptr::null(), // thread security
            0,           // no handle inheritance
            flags,
            block.as_ptr().cast(),
            working_dir_ptr,
            &startup_info,
            &mut process_info,
        )
    };

    if created == 0 {
        return Err(OsError::last("CreateProcessW"));
    }

    tracing::debug!(
        pid = process_info.dwProcessId,
        suspended = options.suspended,
        "process created"
    );

    Ok(Spawned {
        process: unsafe { Handle::from_raw(process_info.hProcess) },
        thread: unsafe { Handle::from_raw(process_info.hThread) },
        process_id: process_info.dwProcessId,
    })
}

fn wide_path(operation: &'static str, path: &Path) -> Result<U16CString, OsError> {
    U16CString::from_os_str(path.as_os_str())
        .map_err(|_| OsError::new(operation, codes::INVALID_PARAMETER))
}
