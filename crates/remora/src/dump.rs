//! Crash-dump capture for postmortem analysis of a hung injection.

use std::{fs::File, os::windows::io::AsRawHandle, path::Path, ptr};

use windows_sys::Win32::System::Diagnostics::Debug::{
    MiniDumpWithFullMemory, MiniDumpWriteDump,
};

use crate::{error::OsError, handle::Handle, process::Process};

/// Writes a full memory dump of `target` to `path`.
///
/// The injector runs this automatically when a remote thread misses its
/// deadline; it is also usable standalone against any live target.
pub fn write_full_dump(target: &Process, path: &Path) -> Result<(), OsError> {
    write_dump(target.os_handle()?, target.id()?, path)
}

pub(crate) fn write_dump(process: &Handle, process_id: u32, path: &Path) -> Result<(), OsError> {
    let file = File::create(path).map_err(|error| OsError::from_io("create dump file", &error))?;

    let written = unsafe {
        MiniDumpWriteDump(
            process.as_raw(),
            process_id,
            file.as_raw_handle(),
            MiniDumpWithFullMemory,
            ptr::null(), // exception information
            ptr::null(), // user streams
            ptr::null(), // callbacks
        )
    };

    if written == 0 {
        return Err(OsError::last("MiniDumpWriteDump"));
    }

    tracing::info!(pid = process_id, path = %path.display(), "process dump written");
    Ok(())
}
