//! The code-injection engine.
//!
//! Injection writes a [`LoaderParams`] record and the [`TRAMPOLINE`] into a
//! single executable region of the target, starts a remote thread at the
//! trampoline with the record's address as its argument and waits for it to
//! finish. The remote thread's exit code is the injected routine's result:
//! `0` reports success, anything else is the target-side `GetLastError`
//! value and travels back through the unified error channel.
//!
//! # Limitations
//!
//! Only Windows on AMD64 is supported. The engine exploits the fact that
//! the core system libraries are mapped at one base per session, so
//! addresses resolved in the calling process are valid inside the target;
//! that assumption is checked against the target's module list and
//! injection fails fast with `ERROR_INVALID_ADDRESS` when it does not hold.

use std::{ffi::c_void, mem, path::Path, ptr, time::Duration};

use once_cell::sync::OnceCell;
use windows_sys::Win32::Foundation::{WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows_sys::Win32::System::Threading::{
    CreateRemoteThread, GetExitCodeThread, WaitForSingleObject,
};
use zerocopy::IntoBytes;

use crate::{
    abi::{LoaderParams, LoaderPrimitives, PARAMS_SIZE, TRAMPOLINE},
    dump,
    error::{OsError, codes},
    handle::Handle,
    hex::Hex,
    process::Process,
    remote::RemoteAllocation,
    snapshot,
};

#[cfg(not(target_arch = "x86_64"))]
compile_error!("the injection engine only supports AMD64 targets");

/// Upper bound on how long an injection waits for the remote thread.
pub const INJECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Loads `module` into `target` and invokes `entry` inside it.
///
/// On timeout a full-memory dump of the target is written to `dump_path`
/// for postmortem inspection; a failure of the dump itself supersedes the
/// timeout in the returned error, since a failed diagnostic is the more
/// urgent fact to report.
///
/// The remote region is released on every exit path. The remote thread is
/// not cancellable: an elapsed timeout stops the wait, not the thread.
pub fn inject(
    target: &Process,
    module: &Path,
    entry: &str,
    dump_path: &Path,
) -> Result<(), OsError> {
    let handle = target.os_handle()?;
    let process_id = target.id()?;

    let (kernel32_base, primitives) = loader_primitives()?;
    let params = LoaderParams::new(module, entry, &primitives)?;
    verify_shared_mapping(process_id, kernel32_base)?;

    let region = RemoteAllocation::executable(handle, PARAMS_SIZE + TRAMPOLINE.len())?;
    region.write(0, params.as_bytes())?;
    region.write(PARAMS_SIZE, &TRAMPOLINE)?;

    let thread = start_remote_thread(handle, region.base() + PARAMS_SIZE, region.base())?;
    tracing::debug!(
        pid = process_id,
        start = %Hex(region.base() + PARAMS_SIZE),
        "remote thread started"
    );

    match unsafe { WaitForSingleObject(thread.as_raw(), INJECTION_TIMEOUT.as_millis() as u32) } {
        WAIT_OBJECT_0 => {}
        WAIT_TIMEOUT => {
            tracing::warn!(pid = process_id, "remote thread did not finish, capturing dump");
            dump::write_dump(handle, process_id, dump_path)?;
            return Err(OsError::new("WaitForSingleObject", codes::TIMEOUT));
        }
        _ => return Err(OsError::last("WaitForSingleObject")),
    }

    let mut exit_code = 0u32;
    if unsafe { GetExitCodeThread(thread.as_raw(), &mut exit_code) } == 0 {
        return Err(OsError::last("GetExitCodeThread"));
    }

    if exit_code != codes::SUCCESS {
        tracing::debug!(code = %Hex(exit_code), "remote entry point failed");
        return Err(OsError::new("remote entry point", exit_code));
    }

    tracing::debug!(pid = process_id, "injection complete");
    Ok(())
}

/// Resolves the loader primitives in the calling process, once.
fn loader_primitives() -> Result<(usize, LoaderPrimitives), OsError> {
    static PRIMITIVES: OnceCell<(usize, LoaderPrimitives)> = OnceCell::new();

    PRIMITIVES
        .get_or_try_init(|| {
            let kernel32 =
                unsafe { GetModuleHandleW(widestring::u16cstr!("kernel32.dll").as_ptr()) };
            if kernel32.is_null() {
                return Err(OsError::last("GetModuleHandleW"));
            }

            let resolve = |name: &'static [u8]| -> Result<u64, OsError> {
                match unsafe { GetProcAddress(kernel32, name.as_ptr()) } {
                    Some(address) => Ok(address as usize as u64),
                    None => Err(OsError::last("GetProcAddress")),
                }
            };

            Ok((
                kernel32 as usize,
                LoaderPrimitives {
                    load_library: resolve(b"LoadLibraryW\0")?,
                    resolve_symbol: resolve(b"GetProcAddress\0")?,
                    last_error: resolve(b"GetLastError\0")?,
                },
            ))
        })
        .copied()
}

/// Confirms kernel32 occupies the same base in the target as it does here.
///
/// A freshly suspended target has no module list yet; the check is skipped
/// when the snapshot cannot be taken for that reason.
fn verify_shared_mapping(process_id: u32, local_base: usize) -> Result<(), OsError> {
    let modules = match snapshot::modules(process_id) {
        Ok(modules) => modules,
        Err(error)
            if error.code() == codes::PARTIAL_COPY || error.code() == codes::BAD_LENGTH =>
        {
            tracing::debug!(pid = process_id, "module list unavailable, base check skipped");
            return Ok(());
        }
        Err(error) => return Err(error),
    };

    match modules
        .iter()
        .find(|module| module.name.eq_ignore_ascii_case("kernel32.dll"))
    {
        Some(module) if module.base != local_base => {
            tracing::error!(
                local = %Hex(local_base),
                remote = %Hex(module.base),
                "kernel32 mapped at divergent bases"
            );
            Err(OsError::new("kernel32 base check", codes::INVALID_ADDRESS))
        }
        _ => Ok(()),
    }
}

fn start_remote_thread(
    process: &Handle,
    start: usize,
    parameter: usize,
) -> Result<Handle, OsError> {
    let raw = unsafe {
        CreateRemoteThread(
            process.as_raw(),
            ptr::null(),
            0,
            Some(mem::transmute::<
                usize,
                unsafe extern "system" fn(*mut c_void) -> u32,
            >(start)),
            parameter as *const c_void,
            0,
            ptr::null_mut(),
        )
    };

    if raw.is_null() {
        return Err(OsError::last("CreateRemoteThread"));
    }

    Ok(unsafe { Handle::from_raw(raw) })
}
