//! Actions of the command line tools
//!
//! Every action declares the facts it needs ([`Requirement`]). The session
//! resolves them in dependency order before the action runs, so a listing
//! never looks for winetricks and a failed lookup stops before anything is
//! started.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::flatpak::get_inaccessible_paths;
use crate::gui::{show_text_dialog, DialogSelector, GuiProvider, Selector, TerminalSelector};
use crate::logging::{log_debug, log_error, log_info, log_warning, read_log_file};
use crate::steam::{
    find_legacy_steam_runtime_path, find_proton_app, find_steam_installations,
    find_windows_apps, get_library_folders, get_steam_apps, search_apps,
    select_steam_installation, ProtonQuery, SteamApp, SteamInstallation,
};
use crate::utils::Environ;
use crate::wine::{run_command, CommandSpec, EnvironmentBuilder, HostProbe, RunOptions, RunSettings};
use crate::winetricks::get_winetricks_path;

const FLATPAK_APP_ID: &str = "com.github.protonkit.ProtonKit";

// ============================================================================
// Requirements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Steam,
    SteamRuntime,
    Winetricks,
    SteamApps,
    SteamApp,
    ProtonApp,
}

impl Requirement {
    pub fn dependencies(self) -> &'static [Requirement] {
        match self {
            Requirement::Steam | Requirement::Winetricks => &[],
            Requirement::SteamRuntime | Requirement::SteamApps => &[Requirement::Steam],
            Requirement::SteamApp => &[Requirement::SteamApps],
            Requirement::ProtonApp => &[Requirement::SteamApps, Requirement::SteamApp],
        }
    }
}

/// `wanted` plus everything it depends on, dependencies first
pub fn resolution_order(wanted: &[Requirement]) -> Vec<Requirement> {
    fn visit(requirement: Requirement, order: &mut Vec<Requirement>) {
        if order.contains(&requirement) {
            return;
        }
        for &dependency in requirement.dependencies() {
            visit(dependency, order);
        }
        order.push(requirement);
    }

    let mut order = Vec::new();
    for &requirement in wanted {
        visit(requirement, &mut order);
    }
    order
}

// ============================================================================
// Actions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// List every Windows app
    List,
    /// List Windows apps whose name matches
    Search(String),
    /// Pick an app with a dialog and open the winetricks GUI for it
    Gui,
    /// Run winetricks with the given arguments
    Winetricks { appid: u32, args: Vec<String> },
    /// Run a shell command
    Command { appid: u32, command: String },
    /// Run a Windows executable with Wine, asking for the app if not given
    Launch {
        appid: Option<u32>,
        executable: PathBuf,
        args: Vec<String>,
    },
}

impl Action {
    pub fn requirements(&self) -> &'static [Requirement] {
        match self {
            Action::List | Action::Search(_) => &[Requirement::SteamApps],
            Action::Gui | Action::Winetricks { .. } => &[
                Requirement::SteamRuntime,
                Requirement::Winetricks,
                Requirement::ProtonApp,
            ],
            Action::Command { .. } | Action::Launch { .. } => {
                &[Requirement::SteamRuntime, Requirement::ProtonApp]
            }
        }
    }

    fn appid(&self) -> Option<u32> {
        match self {
            Action::Winetricks { appid, .. } | Action::Command { appid, .. } => Some(*appid),
            Action::Launch { appid, .. } => *appid,
            _ => None,
        }
    }
}

/// Switches shared by both binaries
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub no_runtime: bool,
    pub no_bwrap: bool,
    /// `None` falls back to `$PROTONKIT_BACKGROUND_WINESERVER`
    pub background_wineserver: Option<bool>,
    pub cwd_app: bool,
    /// No terminal is visible; problems are reported with dialogs
    pub no_term: bool,
    /// Root of the helper script cache
    pub cache_dir: PathBuf,
}

// ============================================================================
// Session
// ============================================================================

/// One invocation of a command line tool
pub struct Session<'a> {
    environ: &'a Environ,
    selector: &'a dyn Selector,
    host: &'a dyn HostProbe,
    options: SessionOptions,

    installation: Option<SteamInstallation>,
    library_folders: Vec<PathBuf>,
    use_steam_runtime: bool,
    legacy_steam_runtime_path: Option<PathBuf>,
    winetricks_path: Option<PathBuf>,
    apps: Vec<SteamApp>,
    app: Option<SteamApp>,
    proton: Option<SteamApp>,
}

impl<'a> Session<'a> {
    pub fn new(
        environ: &'a Environ,
        selector: &'a dyn Selector,
        host: &'a dyn HostProbe,
        options: SessionOptions,
    ) -> Self {
        Self {
            environ,
            selector,
            host,
            options,
            installation: None,
            library_folders: Vec::new(),
            use_steam_runtime: false,
            legacy_steam_runtime_path: None,
            winetricks_path: None,
            apps: Vec::new(),
            app: None,
            proton: None,
        }
    }

    /// Run `action`, writing listings to `out`. Returns the exit code.
    pub fn run(&mut self, action: &Action, out: &mut dyn Write) -> Result<i32> {
        let order = resolution_order(action.requirements());
        log_debug(&format!("Resolving {:?}", order));
        for requirement in order {
            self.resolve(requirement, action)?;
        }

        match action {
            Action::List => self.print_apps(find_windows_apps(&self.apps), out),
            Action::Search(query) => self.print_apps(search_apps(&self.apps, query), out),
            Action::Gui => {
                let winetricks = self.winetricks_display();
                self.run_in_app(CommandSpec::Argv(vec![winetricks, "--gui".to_string()]))
            }
            Action::Winetricks { args, .. } => {
                let mut argv = vec![self.winetricks_display()];
                argv.extend(args.iter().cloned());
                self.run_in_app(CommandSpec::Argv(argv))
            }
            Action::Command { command, .. } => self.run_in_app(CommandSpec::Shell(command.clone())),
            Action::Launch {
                executable, args, ..
            } => {
                let line = wine_command_line(executable, args)?;
                self.run_in_app(CommandSpec::Shell(line))
            }
        }
    }

    fn resolve(&mut self, requirement: Requirement, action: &Action) -> Result<()> {
        match requirement {
            Requirement::Steam => {
                let installations = find_steam_installations(self.environ);
                self.installation = Some(select_steam_installation(installations, self.selector)?);
            }
            Requirement::SteamRuntime => self.resolve_steam_runtime()?,
            Requirement::Winetricks => {
                self.winetricks_path = Some(get_winetricks_path(self.environ)?);
            }
            Requirement::SteamApps => {
                let installation = self.installation()?.clone();
                self.library_folders = get_library_folders(&installation.steam_path);

                let mut paths = vec![
                    installation.steam_path.clone(),
                    installation.steam_root.clone(),
                ];
                paths.extend(self.library_folders.iter().cloned());
                prompt_filesystem_access(&paths, self.options.no_term, self.environ);

                self.apps = get_steam_apps(&installation, &self.library_folders, self.environ);
            }
            Requirement::SteamApp => {
                self.app = Some(self.resolve_app(action)?);
            }
            Requirement::ProtonApp => {
                let installation = self.installation()?;
                let app = self.app.as_ref().ok_or(Error::NoApps)?;
                let proton = find_proton_app(&ProtonQuery {
                    steam_path: &installation.steam_path,
                    steam_apps: &self.apps,
                    appid: app.appid,
                    proton_version: self.environ.get("PROTON_VERSION"),
                })?;
                self.proton = Some(proton);
            }
        }
        Ok(())
    }

    fn installation(&self) -> Result<&SteamInstallation> {
        self.installation.as_ref().ok_or(Error::InstallationNotFound)
    }

    fn resolve_steam_runtime(&mut self) -> Result<()> {
        if self.options.no_runtime {
            log_info("Steam Runtime disabled.");
            return Ok(());
        }
        let steam_root = self.installation()?.steam_root.clone();
        match find_legacy_steam_runtime_path(&steam_root, self.environ)? {
            Some(path) => {
                self.use_steam_runtime = true;
                self.legacy_steam_runtime_path = Some(path);
            }
            None => log_info("Steam Runtime disabled."),
        }
        Ok(())
    }

    fn resolve_app(&self, action: &Action) -> Result<SteamApp> {
        let windows_apps = find_windows_apps(&self.apps);
        if windows_apps.is_empty() {
            return Err(Error::NoApps);
        }

        if let Some(appid) = action.appid() {
            return windows_apps
                .into_iter()
                .find(|app| app.appid == Some(appid))
                .cloned()
                .ok_or(Error::AppNotFound(appid));
        }

        let title = match action {
            Action::Launch { executable, .. } => format!(
                "Choose Wine prefix to run {}",
                executable
                    .file_name()
                    .map_or_else(|| executable.display().to_string(), |n| n.to_string_lossy().into_owned())
            ),
            _ => "Select Steam app".to_string(),
        };
        let labels: Vec<String> = windows_apps.iter().map(|app| app.label()).collect();
        let index = self
            .selector
            .select_one(&title, &labels)?
            .ok_or_else(|| Error::Dialog("No Steam app was selected.".to_string()))?;

        windows_apps
            .get(index)
            .map(|app| (*app).clone())
            .ok_or_else(|| Error::Dialog("No Steam app was selected.".to_string()))
    }

    fn winetricks_display(&self) -> String {
        self.winetricks_path
            .as_deref()
            .map_or_else(|| "winetricks".to_string(), |p| p.display().to_string())
    }

    fn print_apps(&self, apps: Vec<&SteamApp>, out: &mut dyn Write) -> Result<i32> {
        if apps.is_empty() {
            writeln!(out, "Found no games.")?;
        } else {
            writeln!(out, "Found the following games:")?;
            for app in &apps {
                writeln!(out, "{}", app.label())?;
            }
            writeln!(out)?;
            writeln!(out, "To run protonkit for the chosen game, run:")?;
            writeln!(out, "$ protonkit APPID COMMAND")?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "NOTE: A game must be launched at least once before protonkit can find the game."
        )?;
        Ok(0)
    }

    fn run_in_app(&mut self, spec: CommandSpec) -> Result<i32> {
        let app = self.app.as_ref().ok_or(Error::NoApps)?;
        let proton = self.proton.as_ref().ok_or(Error::ToolNotFound)?;

        // Optional for plain commands, still exported when installed
        if self.winetricks_path.is_none() {
            self.winetricks_path = get_winetricks_path(self.environ).ok();
        }

        let use_bwrap = if self.options.no_bwrap || self.environ.flag("PROTONKIT_NO_BWRAP") {
            Some(false)
        } else {
            None
        };
        let run_options = RunOptions {
            use_steam_runtime: self.use_steam_runtime,
            legacy_steam_runtime_path: self.legacy_steam_runtime_path.clone(),
            use_bwrap,
            winetricks_path: self.winetricks_path.clone(),
            cache_dir: self.options.cache_dir.clone(),
            library_paths: self.library_folders.clone(),
        };
        let env = EnvironmentBuilder::new(self.environ, self.host).build(app, proton, &run_options)?;

        let settings = RunSettings {
            cwd: self.options.cwd_app.then_some(app.install_path.as_path()),
            background_wineserver: self
                .options
                .background_wineserver
                .unwrap_or_else(|| self.environ.flag("PROTONKIT_BACKGROUND_WINESERVER")),
        };
        let code = run_command(&env, &spec, &settings)?;
        log_info(&format!("Command returned {code}"));
        Ok(code)
    }
}

/// `wine <executable> <args>` quoted for `sh -c`
pub fn wine_command_line(executable: &Path, args: &[String]) -> Result<String> {
    let executable = executable.canonicalize()?;
    let mut words = vec!["wine".to_string(), quote(&executable.to_string_lossy())];
    words.extend(args.iter().map(|arg| quote(arg)));
    Ok(words.join(" "))
}

fn quote(s: &str) -> String {
    shlex::try_quote(s).map_or_else(|_| s.to_string(), |q| q.into_owned())
}

// ============================================================================
// Flatpak Filesystem Access
// ============================================================================

/// `~/`-relative form used in `flatpak override`
fn override_path(path: &Path, home: &Path) -> String {
    match path.strip_prefix(home) {
        Ok(rest) if !rest.as_os_str().is_empty() => format!("~/{}", rest.display()),
        _ => path.display().to_string(),
    }
}

/// Explanation with the `flatpak override` command granting `paths`
pub fn filesystem_access_message(paths: &[&PathBuf], home: &Path) -> String {
    let listed: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    let filesystems: Vec<String> = paths
        .iter()
        .map(|p| format!("--filesystem={}", quote(&override_path(p, home))))
        .collect();

    format!(
        "protonkit does not appear to have access to the following directories:\n \
         {}\n\n\
         To fix this problem, grant access to the required directories by copying the \
         following command and running it in a terminal:\n\n\
         flatpak override --user {} {FLATPAK_APP_ID}\n\n\
         You will need to restart protonkit for the settings to take effect.",
        listed.join(" "),
        filesystems.join(" "),
    )
}

/// Warn about `inaccessible` paths the user hasn't dismissed. `ask` shows the
/// message and returns true if the user wants to be left alone; those paths
/// are then added to `config`. Returns true if `config` changed.
pub fn warn_inaccessible_paths(
    inaccessible: &[PathBuf],
    config: &mut AppConfig,
    home: &Path,
    ask: Option<&dyn Fn(&str) -> Result<bool>>,
) -> bool {
    let remaining = config.undismissed(inaccessible);
    log_debug(&format!("Inaccessible paths not dismissed: {:?}", remaining));
    if remaining.is_empty() {
        return false;
    }

    let message = filesystem_access_message(&remaining, home);
    let mut changed = false;
    if let Some(ask) = ask {
        match ask(&message) {
            Ok(true) => {
                config.dismiss(inaccessible.iter().cloned());
                changed = true;
            }
            Ok(false) => {}
            Err(e) => log_warning(&format!("Could not show dialog: {e}")),
        }
    }

    log_warning(&message);
    changed
}

/// Tell the user how to grant the Flatpak sandbox access to `paths`
pub fn prompt_filesystem_access(paths: &[PathBuf], show_dialog: bool, environ: &Environ) {
    let home = environ.home();
    let inaccessible = get_inaccessible_paths(paths, &home);
    if inaccessible.is_empty() {
        return;
    }

    let mut config = AppConfig::load();
    let provider = if show_dialog {
        GuiProvider::find(environ).ok()
    } else {
        None
    };
    let ask = provider.map(|provider| {
        move |message: &str| {
            show_text_dialog(
                provider,
                "protonkit",
                message,
                "Ignore, don't ask again",
                Some("Close"),
            )
        }
    });

    let ask_ref = ask.as_ref().map(|f| f as &dyn Fn(&str) -> Result<bool>);
    if warn_inaccessible_paths(&inaccessible, &mut config, &home, ask_ref) {
        config.save();
    }
}

// ============================================================================
// Presentation
// ============================================================================

/// Dialog selector when yad or zenity is installed. Otherwise a terminal
/// prompt, unless a dialog is required.
pub fn default_selector(environ: &Environ, require_dialog: bool) -> Result<Box<dyn Selector>> {
    match GuiProvider::find(environ) {
        Ok(provider) => Ok(Box::new(DialogSelector::new(provider))),
        Err(e) if require_dialog => Err(e),
        Err(_) => Ok(Box::new(TerminalSelector::stdio())),
    }
}

/// Error text, followed by the recorded log when there is one
pub fn error_report(message: &str, log: Option<&str>) -> String {
    match log {
        Some(log) if !log.trim().is_empty() => format!(
            "protonkit was closed due to the following error:\n\n{message}\n\n=============\n\n{log}"
        ),
        _ => format!("protonkit was closed due to the following error:\n\n{message}"),
    }
}

/// Print the error, or show it in a dialog when there is no terminal
pub fn report_error(message: &str, no_term: bool, environ: &Environ) {
    log_error(message);
    if !no_term {
        return;
    }

    let report = error_report(message, read_log_file().as_deref());
    let shown = GuiProvider::find(environ)
        .and_then(|provider| show_text_dialog(provider, "protonkit", &report, "OK", None));
    if let Err(e) = shown {
        eprintln!("{report}\n\nCould not show error dialog: {e}");
    }
}

/// Report panics the same way as errors
pub fn install_panic_hook(no_term: bool, environ: Environ) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        report_error(&info.to_string(), no_term, &environ);
    }));
}
