//! Running a command inside a prepared environment

use std::path::Path;
use std::process::{Child, Command};

use super::env::RuntimeEnvironment;
use super::launcher::LauncherService;
use crate::error::Result;
use crate::logging::{log_info, log_warning};

/// What to run
#[derive(Debug, Clone, PartialEq)]
pub enum CommandSpec {
    /// Program and arguments, run directly
    Argv(Vec<String>),
    /// A line passed to `sh -c`
    Shell(String),
}

impl CommandSpec {
    fn to_command(&self) -> Option<Command> {
        match self {
            CommandSpec::Argv(argv) => {
                let (program, args) = argv.split_first()?;
                let mut command = Command::new(program);
                command.args(args);
                Some(command)
            }
            CommandSpec::Shell(line) => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(line);
                Some(command)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSettings<'a> {
    pub cwd: Option<&'a Path>,
    /// Keep a wineserver running for the duration of the command
    pub background_wineserver: bool,
}

fn start_background_wineserver(env: &RuntimeEnvironment) -> Option<Child> {
    let wineserver = env.get("WINESERVER")?;
    let mut command = Command::new(wineserver);
    command.args(["-f", "-p"]);
    env.apply(&mut command);

    match command.spawn() {
        Ok(child) => {
            log_info("Started background wineserver");
            Some(child)
        }
        Err(e) => {
            log_warning(&format!("Could not start background wineserver: {e}"));
            None
        }
    }
}

/// Run `spec` with the environment overlay applied and return its exit code.
///
/// Signals map to `128 + signal` like a shell would report them.
pub fn run_command(env: &RuntimeEnvironment, spec: &CommandSpec, settings: &RunSettings) -> Result<i32> {
    let Some(mut command) = spec.to_command() else {
        return Ok(0);
    };
    env.apply(&mut command);
    if let Some(cwd) = settings.cwd {
        command.current_dir(cwd);
    }

    let mut launcher = match env.launcher_path() {
        Some(path) => {
            let mut launcher_command = Command::new(path);
            env.apply(&mut launcher_command);
            Some(LauncherService::start(launcher_command)?)
        }
        None => None,
    };

    let mut wineserver = if settings.background_wineserver {
        start_background_wineserver(env)
    } else {
        None
    };

    log_info(&format!("Attempting to run command {spec:?}"));
    let status = command.status();

    if let Some(mut child) = wineserver.take() {
        let _ = child.kill();
        let _ = child.wait();
    }
    let launcher_state = launcher.as_mut().map_or(Ok(()), LauncherService::check_alive);
    if let Some(launcher) = launcher {
        launcher.stop();
    }

    let status = status?;
    launcher_state?;

    Ok(status.code().unwrap_or_else(|| {
        use std::os::unix::process::ExitStatusExt;
        status.signal().map_or(1, |signal| 128 + signal)
    }))
}
