//! Launch Windows processes under controlled conditions and inject a
//! cooperating module into their address space.
//!
//! The engine is built from small, scoped pieces: a unified
//! (location, code) error value ([`OsError`]), RAII owners for kernel
//! handles and for memory committed in a *foreign* process
//! ([`RemoteAllocation`]), a launcher with environment and argument control
//! ([`LaunchOptions`], [`Process::launch`]), the injector itself
//! ([`inject`]) and process control ([`Process::resume`],
//! [`Process::terminate`], [`Process::wait_for_exit`],
//! [`Process::exit_code`]).
//!
//! Injection places a fixed-layout parameter block and a hand-assembled
//! trampoline into one executable region of the target, runs the trampoline
//! on a remote thread and reads the result back through the thread's exit
//! code. When a remote thread misses its deadline, a full memory dump of
//! the target is captured for postmortem analysis.
//!
//! All operations are synchronous and block the calling thread for up to a
//! bounded duration; callers needing asynchrony run them on a worker thread
//! of their own.
//!
//! # Limitations
//!
//! The engine targets Windows on AMD64 exclusively. The pure pieces (error
//! rendering, the trampoline contract, environment-block assembly) build
//! and test on any host.
//!
//! # Examples
//!
//! Launch a target suspended, attach a module to it before any of its own
//! code runs, then let it start:
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn demo() -> Result<(), remora::OsError> {
//! use std::path::Path;
//!
//! use remora::{LaunchOptions, Process};
//!
//! let target = Process::launch(
//!     &LaunchOptions::new("C:\\Games\\client.exe")
//!         .suspended(true)
//!         .env("HOOK_PROFILE", "default"),
//! );
//!
//! remora::inject(
//!     &target,
//!     Path::new("C:\\Games\\hook.dll"),
//!     "module_init",
//!     Path::new("C:\\Games\\inject-hang.dmp"),
//! )?;
//!
//! target.resume()?;
//! target.wait_for_exit(None)?;
//! # Ok(())
//! # }
//! ```

mod abi;
mod env;
mod error;
mod hex;

#[cfg(windows)]
mod dump;
#[cfg(windows)]
mod handle;
#[cfg(windows)]
mod inject;
#[cfg(windows)]
mod launch;
#[cfg(windows)]
mod process;
#[cfg(windows)]
mod remote;
#[cfg(windows)]
mod snapshot;

pub use self::{
    abi::{
        ENTRY_NAME_CAPACITY, LoaderParams, LoaderPrimitives, MODULE_PATH_CAPACITY, PARAMS_SIZE,
        TRAMPOLINE,
    },
    error::{OsError, codes},
    hex::Hex,
};

#[cfg(windows)]
pub use self::{
    dump::write_full_dump,
    handle::Handle,
    inject::{INJECTION_TIMEOUT, inject},
    launch::LaunchOptions,
    process::Process,
    remote::RemoteAllocation,
    snapshot::{ModuleInfo, find_process, modules},
};
