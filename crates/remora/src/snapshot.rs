//! Toolhelp snapshots of running processes and their modules.

use std::mem;

use widestring::U16Str;
use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
use windows_sys::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
    Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};

use crate::{
    error::{OsError, codes},
    handle::Handle,
};

/// How often a module snapshot is retried when the target's module list
/// changes mid-copy.
const SNAPSHOT_ATTEMPTS: usize = 16;

/// One loaded module of a foreign process.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// File name of the module, e.g. `kernel32.dll`.
    pub name: String,

    /// Base address of the mapping in the foreign process.
    pub base: usize,

    /// Size of the mapping in bytes.
    pub size: usize,
}

/// Enumerates the modules loaded in the process identified by `pid`.
///
/// The platform documents `ERROR_BAD_LENGTH` as a transient race with the
/// target's loader; the snapshot is retried a bounded number of times
/// before that error is surfaced. A target whose loader has not run yet
/// (a freshly suspended launch) has no module list at all and reports
/// `ERROR_PARTIAL_COPY` or `ERROR_BAD_LENGTH` persistently.
pub fn modules(pid: u32) -> Result<Vec<ModuleInfo>, OsError> {
    let mut snapshot = None;
    let mut last_error = OsError::new("CreateToolhelp32Snapshot", codes::BAD_LENGTH);

    for _ in 0..SNAPSHOT_ATTEMPTS {
        let raw =
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) };
        if raw != INVALID_HANDLE_VALUE {
            snapshot = Some(unsafe { Handle::from_raw(raw) });
            break;
        }

        last_error = OsError::last("CreateToolhelp32Snapshot");
        if last_error.code() != codes::BAD_LENGTH {
            return Err(last_error);
        }
    }

    let snapshot = match snapshot {
        Some(snapshot) => snapshot,
        None => return Err(last_error),
    };

    let mut entry: MODULEENTRY32W = unsafe { mem::zeroed() };
    entry.dwSize = mem::size_of::<MODULEENTRY32W>() as u32;

    if unsafe { Module32FirstW(snapshot.as_raw(), &mut entry) } == 0 {
        return Err(OsError::last("Module32FirstW"));
    }

    let mut modules = Vec::new();
    loop {
        modules.push(ModuleInfo {
            name: wide_name(&entry.szModule),
            base: entry.modBaseAddr as usize,
            size: entry.modBaseSize as usize,
        });

        if unsafe { Module32NextW(snapshot.as_raw(), &mut entry) } == 0 {
            break;
        }
    }

    Ok(modules)
}

/// Finds a running process by executable name, case-insensitively.
///
/// Returns the identifier of the first match in snapshot order.
pub fn find_process(name: &str) -> Result<Option<u32>, OsError> {
    let raw = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
    if raw == INVALID_HANDLE_VALUE {
        return Err(OsError::last("CreateToolhelp32Snapshot"));
    }
    let snapshot = unsafe { Handle::from_raw(raw) };

    let mut entry: PROCESSENTRY32W = unsafe { mem::zeroed() };
    entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;

    if unsafe { Process32FirstW(snapshot.as_raw(), &mut entry) } == 0 {
        return Err(OsError::last("Process32FirstW"));
    }

    loop {
        if wide_name(&entry.szExeFile).eq_ignore_ascii_case(name) {
            return Ok(Some(entry.th32ProcessID));
        }

        if unsafe { Process32NextW(snapshot.as_raw(), &mut entry) } == 0 {
            return Ok(None);
        }
    }
}

fn wide_name(raw: &[u16]) -> String {
    let len = raw.iter().position(|&unit| unit == 0).unwrap_or(raw.len());
    U16Str::from_slice(&raw[..len]).to_string_lossy()
}
