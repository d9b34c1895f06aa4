//! protonkit - run winetricks for Steam Play games

use clap::{ArgGroup, CommandFactory, Parser};

use protonkit::cache_path;
use protonkit::command::{default_selector, install_panic_hook, report_error, Action, Session, SessionOptions};
use protonkit::logging::{delete_log_file, init_logger, log_info};
use protonkit::utils::Environ;
use protonkit::wine::SystemHost;

#[derive(Parser, Debug)]
#[command(name = "protonkit", version)]
#[command(about = "Wrapper for running Winetricks commands for Steam Play/Proton games")]
#[command(after_help = "\
Usage:
  Run winetricks for game with APPID. Options for protonkit go before APPID.
  $ protonkit APPID COMMAND

  Search installed games to find the APPID
  $ protonkit -s GAME_NAME

  List all installed games
  $ protonkit -l

  Use the protonkit GUI to select the game
  $ protonkit --gui

Environment variables:
  PROTON_VERSION: name of the preferred Proton installation
  STEAM_DIR: path to custom Steam installation
  WINETRICKS: path to a custom 'winetricks' executable
  WINE: path to a custom 'wine' executable
  WINESERVER: path to a custom 'wineserver' executable
  STEAM_RUNTIME: 1 = enable Steam Runtime, 0 = disable Steam Runtime,
                 valid path = custom Steam Runtime path,
                 empty = enable automatically (default)
  PROTONKIT_GUI: GUI provider to use, either 'yad' or 'zenity'")]
#[command(group(ArgGroup::new("action").args(["search", "list", "command", "gui"])))]
struct Cli {
    /// Increase log verbosity. Can be supplied twice for maximum verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Launched from the desktop; errors are shown in a dialog
    #[arg(long)]
    no_term: bool,

    /// Search for game(s) with the given name
    #[arg(short, long, num_args = 1..)]
    search: Option<Vec<String>>,

    /// List all apps
    #[arg(short, long)]
    list: bool,

    /// Run a command with Wine-related environment variables set. The command
    /// is passed to the shell as-is without being escaped.
    #[arg(short, long, requires = "appid")]
    command: Option<String>,

    /// Launch the protonkit GUI
    #[arg(long, conflicts_with = "appid")]
    gui: bool,

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

    /// Set the working directory of the launched command to the Steam app's
    /// installation directory
    #[arg(long)]
    cwd_app: bool,

    appid: Option<u32>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    winetricks_args: Vec<String>,
}

impl Cli {
    fn action(&self) -> Option<Action> {
        if let Some(search) = &self.search {
            return Some(Action::Search(search.join(" ")));
        }
        if self.list {
            return Some(Action::List);
        }
        if self.gui {
            return Some(Action::Gui);
        }
        match (self.appid, &self.command) {
            (Some(appid), Some(command)) if self.winetricks_args.is_empty() => Some(Action::Command {
                appid,
                command: command.clone(),
            }),
            (Some(appid), None) if !self.winetricks_args.is_empty() => Some(Action::Winetricks {
                appid,
                args: self.winetricks_args.clone(),
            }),
            _ => None,
        }
    }

    fn background_wineserver(&self) -> Option<bool> {
        if self.no_background_wineserver {
            Some(false)
        } else if self.background_wineserver {
            Some(true)
        } else {
            None
        }
    }
}

fn main() {
    let mut args: Vec<String> = std::env::args().collect();
    // No arguments opens the GUI
    if args.len() == 1 {
        args.push("--gui".to_string());
    }
    let cli = Cli::parse_from(args);

    // Nothing to do, e.g. only -v or an APPID without a command
    let Some(action) = cli.action() else {
        let _ = Cli::command().print_help();
        return;
    };

    let environ = Environ::capture();
    init_logger(cli.verbose, cli.no_term);
    install_panic_hook(cli.no_term, environ.clone());
    log_info(&format!("protonkit {} starting", env!("CARGO_PKG_VERSION")));

    let options = SessionOptions {
        no_runtime: cli.no_runtime,
        no_bwrap: cli.no_bwrap,
        background_wineserver: cli.background_wineserver(),
        cwd_app: cli.cwd_app,
        no_term: cli.no_term,
        cache_dir: cache_path!().to_path_buf(),
    };

    let result = default_selector(&environ, action == Action::Gui).and_then(|selector| {
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
