//! protonkit-launch - run a Windows executable in a Steam app's Wine prefix

use std::path::PathBuf;

use clap::Parser;

use protonkit::cache_path;
use protonkit::command::{default_selector, install_panic_hook, report_error, Action, Session, SessionOptions};
use protonkit::logging::{delete_log_file, init_logger, log_info};
use protonkit::utils::Environ;
use protonkit::wine::SystemHost;

#[derive(Parser, Debug)]
#[command(name = "protonkit-launch", version)]
#[command(about = "Utility for launching Windows executables using protonkit")]
#[command(after_help = "\
Usage:
  Launch EXECUTABLE and pick the Steam app using a dialog.
  $ protonkit-launch EXECUTABLE [ARGS]

  Launch EXECUTABLE for Steam app APPID
  $ protonkit-launch --appid APPID EXECUTABLE [ARGS]")]
struct Cli {
    /// Launched from the desktop; errors are shown in a dialog
    #[arg(long)]
    no_term: bool,

    /// Increase log verbosity. Can be supplied twice for maximum verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable Steam Runtime
    #[arg(long)]
    no_runtime: bool,

    /// Disable bwrap containerization when using Steam Runtime
    #[arg(long)]
    no_bwrap: bool,

    /// Launch a background wineserver process to improve Wine command startup
    /// time
    #[arg(long, overrides_with = "no_background_wineserver")]
    background_wineserver: bool,

    /// Do not launch a background wineserver process
    #[arg(long)]
    no_background_wineserver: bool,

    /// Steam app whose prefix is used; asked for when missing
    #[arg(long)]
    appid: Option<u32>,

    /// Set the working directory of the launched executable to the Steam
    /// app's installation directory
    #[arg(long)]
    cwd_app: bool,

    executable: PathBuf,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    exec_args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let environ = Environ::capture();
    init_logger(cli.verbose, cli.no_term);
    install_panic_hook(cli.no_term, environ.clone());
    log_info(&format!(
        "Launching {} with protonkit {}",
        cli.executable.display(),
        env!("CARGO_PKG_VERSION")
    ));

    let options = SessionOptions {
        no_runtime: cli.no_runtime,
        no_bwrap: cli.no_bwrap,
        background_wineserver: if cli.no_background_wineserver {
            Some(false)
        } else {
            cli.background_wineserver.then_some(true)
        },
        cwd_app: cli.cwd_app,
        no_term: cli.no_term,
        cache_dir: cache_path!().to_path_buf(),
    };
    let action = Action::Launch {
        appid: cli.appid,
        executable: cli.executable,
        args: cli.exec_args,
    };

    let result = default_selector(&environ, cli.no_term).and_then(|selector| {
        let host = SystemHost;
        let mut session = Session::new(&environ, selector.as_ref(), &host, options);
        session.run(&action, &mut std::io::stdout().lock())
    });

    match result {
        Ok(code) => {
            delete_log_file();
            std::process::exit(code);
        }
        Err(e) => {
            report_error(&e.to_string(), cli.no_term, &environ);
            std::process::exit(1);
        }
    }
}
