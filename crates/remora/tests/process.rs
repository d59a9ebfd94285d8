//! End-to-end tests driving real child processes.

#![cfg(windows)]

use std::{env, path::PathBuf, time::Duration};

use remora::{LaunchOptions, Process, codes};

fn cmd_exe() -> PathBuf {
    PathBuf::from(env::var_os("ComSpec").unwrap_or_else(|| "C:\\Windows\\System32\\cmd.exe".into()))
}

#[test]
fn failed_launch_stores_the_error_and_short_circuits() {
    let target = Process::launch(&LaunchOptions::new("C:\\does\\not\\exist.exe"));

    assert!(target.is_error());
    let stored = target.error().expect("stored error");
    assert!(stored.is_error());
    assert_eq!(stored.operation(), "CreateProcessW");

    // Control operations must return the stored error without reaching the OS.
    assert_eq!(target.resume().unwrap_err(), stored);
    assert_eq!(target.terminate(0).unwrap_err(), stored);
    assert_eq!(target.wait_for_exit(None).unwrap_err(), stored);
    assert_eq!(target.exit_code().unwrap_err(), stored);
}

#[test]
fn exit_code_round_trips_through_wait() {
    let target = Process::launch(
        &LaunchOptions::new(cmd_exe()).arguments("cmd.exe /c exit 42"),
    );

    assert!(!target.is_error());
    target.wait_for_exit(Some(Duration::from_secs(30))).unwrap();
    assert_eq!(target.exit_code().unwrap(), 42);
}

#[test]
fn suspended_launch_resumes_exactly_once() {
    let target = Process::launch(
        &LaunchOptions::new(cmd_exe())
            .suspended(true)
            .working_dir(".")
            .env("FOO", "BAR"),
    );

    assert!(!target.is_error());
    assert!(target.id().unwrap() != 0);

    target.resume().unwrap();

    // The thread is running now; a second resume is a state error.
    let again = target.resume().unwrap_err();
    assert_eq!(again.code(), codes::INVALID_OPERATION);

    target.terminate(7).unwrap();
    target.wait_for_exit(Some(Duration::from_secs(30))).unwrap();
    assert_eq!(target.exit_code().unwrap(), 7);
}

#[test]
fn wait_reports_timeout_while_the_target_lives() {
    let target = Process::launch(&LaunchOptions::new(cmd_exe()).suspended(true));
    assert!(!target.is_error());

    let error = target
        .wait_for_exit(Some(Duration::from_millis(100)))
        .unwrap_err();
    assert!(error.is_timeout());

    // Still running: the exit code must be the platform's sentinel.
    assert_eq!(target.exit_code().unwrap(), codes::STILL_ACTIVE);

    target.terminate(0).unwrap();
}

#[test]
fn injecting_a_missing_module_reports_the_target_side_error() {
    // Keep the target alive for a few seconds without console interaction.
    let target = Process::launch(
        &LaunchOptions::new(cmd_exe()).arguments("cmd.exe /c ping -n 4 127.0.0.1 >nul"),
    );
    assert!(!target.is_error());

    let dump = std::env::temp_dir().join("remora-unused.dmp");
    let error = remora::inject(
        &target,
        std::path::Path::new("C:\\definitely\\missing\\payload.dll"),
        "module_init",
        &dump,
    )
    .unwrap_err();

    // The trampoline ran inside the target: LoadLibraryW failed there and
    // its last-error value travelled back through the thread exit code.
    assert_eq!(error.operation(), "remote entry point");
    assert!(
        matches!(error.code(), 2 | 3 | 126),
        "unexpected code {}",
        error.code()
    );

    target.terminate(0).unwrap();
}

#[test]
fn full_dump_lands_at_the_requested_path() {
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("target.dmp");

    let target = Process::launch(&LaunchOptions::new(cmd_exe()).suspended(true));
    assert!(!target.is_error());

    remora::write_full_dump(&target, &path).unwrap();

    let metadata = std::fs::metadata(&path).unwrap();
    assert!(metadata.len() > 0);

    target.terminate(0).unwrap();
}

#[test]
fn find_process_sees_the_launched_child() {
    let target = Process::launch(&LaunchOptions::new(cmd_exe()).suspended(true));
    assert!(!target.is_error());

    let found = remora::find_process("cmd.exe").unwrap();
    assert!(found.is_some());

    target.terminate(0).unwrap();
}
