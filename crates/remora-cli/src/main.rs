//! Command-line front end for the injection engine.

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "remora", about = "Launch processes and inject modules into them", version)]
struct Cli {
    /// Print debug-level progress information.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch a target process, optionally suspended.
    Launch {
        /// Path of the executable to launch.
        executable: PathBuf,

        /// Command line handed to the target, verbatim.
        #[arg(long)]
        args: Option<String>,

        /// Working directory of the target.
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Create the process with its primary thread suspended.
        #[arg(long)]
        suspended: bool,

        /// Extra KEY=VALUE environment entries, appended to the inherited
        /// environment.
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
        env: Vec<(String, String)>,

        /// Block until the target exits and report its exit code.
        #[arg(long)]
        wait: bool,
    },

    /// Inject a module into a running process.
    Inject {
        /// Path of the module to load into the target.
        dll: PathBuf,

        /// Target process identifier.
        #[arg(long, conflicts_with = "name")]
        pid: Option<u32>,

        /// Target executable name, e.g. `notepad.exe`.
        #[arg(long)]
        name: Option<String>,

        /// Entry point to resolve and call inside the loaded module.
        #[arg(long)]
        entry: String,

        /// Where to write the crash dump if the injection hangs.
        #[arg(long, default_value = "remora-hang.dmp")]
        dump: PathBuf,
    },

    /// Launch suspended, inject, then resume: the usual flow.
    Run {
        /// Path of the executable to launch.
        executable: PathBuf,

        /// Path of the module to load into the target.
        #[arg(long)]
        dll: PathBuf,

        /// Entry point to resolve and call inside the loaded module.
        #[arg(long)]
        entry: String,

        /// Command line handed to the target, verbatim.
        #[arg(long)]
        args: Option<String>,

        /// Working directory of the target.
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Extra KEY=VALUE environment entries.
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
        env: Vec<(String, String)>,

        /// Where to write the crash dump if the injection hangs.
        #[arg(long, default_value = "remora-hang.dmp")]
        dump: PathBuf,

        /// Block until the target exits and report its exit code.
        #[arg(long)]
        wait: bool,
    },

    /// Write a full memory dump of a running process.
    Dump {
        /// Where to write the dump file.
        output: PathBuf,

        /// Target process identifier.
        #[arg(long, conflicts_with = "name")]
        pid: Option<u32>,

        /// Target executable name.
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Os(#[from] remora::OsError),

    #[error("process '{0}' not found")]
    ProcessNotFound(String),

    #[error("either --pid or --name is required")]
    MissingTarget,

    #[cfg(not(windows))]
    #[error("this tool only runs on Windows")]
    Unsupported,
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(windows)]
fn run(cli: Cli) -> Result<(), CliError> {
    use remora::{LaunchOptions, Process};

    match cli.command {
        Command::Launch {
            executable,
            args,
            cwd,
            suspended,
            env,
            wait,
        } => {
            let target = Process::launch(&options(executable, args, cwd, suspended, env));
            let target = checked(target)?;

            tracing::info!(pid = target.id()?, "launched");
            if wait {
                wait_and_report(&target)?;
            }
        }

        Command::Inject {
            dll,
            pid,
            name,
            entry,
            dump,
        } => {
            let target = checked(resolve_target(pid, name)?)?;
            remora::inject(&target, &dll, &entry, &dump)?;
            tracing::info!(pid = target.id()?, "injection complete");
        }

        Command::Run {
            executable,
            dll,
            entry,
            args,
            cwd,
            env,
            dump,
            wait,
        } => {
            let target = Process::launch(&options(executable, args, cwd, true, env));
            let target = checked(target)?;
            tracing::info!(pid = target.id()?, "launched suspended");

            if let Err(error) = remora::inject(&target, &dll, &entry, &dump) {
                // Do not leave a half-initialized, suspended child behind.
                let _ = target.terminate(1);
                return Err(error.into());
            }

            target.resume()?;
            tracing::info!("target resumed");
            if wait {
                wait_and_report(&target)?;
            }
        }

        Command::Dump { output, pid, name } => {
            let target = checked(resolve_target(pid, name)?)?;
            remora::write_full_dump(&target, &output)?;
        }
    }

    Ok(())
}

#[cfg(windows)]
fn options(
    executable: PathBuf,
    args: Option<String>,
    cwd: Option<PathBuf>,
    suspended: bool,
    env: Vec<(String, String)>,
) -> remora::LaunchOptions {
    let mut options = remora::LaunchOptions::new(executable).suspended(suspended);
    if let Some(args) = args {
        options = options.arguments(args);
    }
    if let Some(cwd) = cwd {
        options = options.working_dir(cwd);
    }
    for (key, value) in env {
        options = options.env(key, value);
    }
    options
}

#[cfg(windows)]
fn resolve_target(pid: Option<u32>, name: Option<String>) -> Result<remora::Process, CliError> {
    let pid = match (pid, name) {
        (Some(pid), _) => pid,
        (None, Some(name)) => remora::find_process(&name)?
            .ok_or_else(|| CliError::ProcessNotFound(name))?,
        (None, None) => return Err(CliError::MissingTarget),
    };

    Ok(remora::Process::attach(pid))
}

#[cfg(windows)]
fn checked(target: remora::Process) -> Result<remora::Process, CliError> {
    match target.error() {
        Some(error) => Err(error.into()),
        None => Ok(target),
    }
}

#[cfg(windows)]
fn wait_and_report(target: &remora::Process) -> Result<(), CliError> {
    target.wait_for_exit(None)?;
    tracing::info!(exit_code = target.exit_code()?, "target exited");
    Ok(())
}

#[cfg(not(windows))]
fn run(_cli: Cli) -> Result<(), CliError> {
    Err(CliError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::parse_env;

    #[test]
    fn env_pairs_split_on_the_first_equals() {
        assert_eq!(
            parse_env("PATH=C:\\a=b").unwrap(),
            ("PATH".to_string(), "C:\\a=b".to_string())
        );
        assert!(parse_env("NOVALUE").is_err());
    }
}
