//! Process environment for running Wine tools against a Steam app
//!
//! The builder never touches the process environment. It reads the
//! `Environ` snapshot and produces an overlay (variables to set and to
//! remove) that is applied to the child `Command` only.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::bin_dir::{create_wine_bin_dir, ScriptMode, LAUNCHER_SCRIPT};
use super::locale::{available_locales, is_steam_deck, locale_fixes, log_locale_fixes};
use super::runtime::{
    detect_extra_mounts, host_library_paths, is_supported_runtime, legacy_runtime_library_paths,
    proton_library_prefix, runtime_library_paths, writable_filesystems,
};
use crate::error::{Error, Result};
use crate::flatpak::{get_running_flatpak_version, is_bwrap_compatible};
use crate::logging::{console_level, log_info, log_warning};
use crate::steam::SteamApp;
use crate::utils::{prepend_path_list, Environ};

/// Facts about the host the environment depends on
pub trait HostProbe {
    /// `ldconfig -XNv` library directories, colon separated
    fn host_library_paths(&self) -> Result<String>;
    /// `run.sh --print-steam-runtime-library-paths` of the legacy runtime
    fn legacy_runtime_library_paths(&self, runtime_path: &Path) -> Result<String>;
    fn flatpak_version(&self) -> Option<Vec<u32>>;
    fn is_steam_deck(&self) -> bool;
    fn available_locales(&self) -> Vec<String>;
    /// Top-level host directories the container doesn't mount on its own
    fn extra_root_mounts(&self) -> Vec<String>;
}

/// The real system
pub struct SystemHost;

impl HostProbe for SystemHost {
    fn host_library_paths(&self) -> Result<String> {
        host_library_paths()
    }

    fn legacy_runtime_library_paths(&self, runtime_path: &Path) -> Result<String> {
        legacy_runtime_library_paths(runtime_path)
    }

    fn flatpak_version(&self) -> Option<Vec<u32>> {
        get_running_flatpak_version()
    }

    fn is_steam_deck(&self) -> bool {
        is_steam_deck()
    }

    fn available_locales(&self) -> Vec<String> {
        available_locales()
    }

    fn extra_root_mounts(&self) -> Vec<String> {
        detect_extra_mounts(Path::new("/"))
    }
}

/// How to run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub use_steam_runtime: bool,
    /// Bundled or custom legacy runtime, see `find_legacy_steam_runtime_path`
    pub legacy_steam_runtime_path: Option<PathBuf>,
    /// `None` picks bwrap whenever the tool uses a containerized runtime
    pub use_bwrap: Option<bool>,
    pub winetricks_path: Option<PathBuf>,
    /// Root of the helper script cache
    pub cache_dir: PathBuf,
    /// Library folders, made writable inside the container
    pub library_paths: Vec<PathBuf>,
}

/// Environment changes for the child process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeEnvironment {
    vars: BTreeMap<String, String>,
    removed: BTreeSet<String>,
    pub use_bwrap: bool,
    /// Helper script directory, when the Steam Runtime is used
    pub bin_dir: Option<PathBuf>,
}

impl RuntimeEnvironment {
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.removed.remove(name);
        self.vars.insert(name.to_string(), value.into());
    }

    pub fn remove(&mut self, name: &str) {
        self.vars.remove(name);
        self.removed.insert(name.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn is_removed(&self, name: &str) -> bool {
        self.removed.contains(name)
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn apply(&self, command: &mut Command) {
        for name in &self.removed {
            command.env_remove(name);
        }
        command.envs(&self.vars);
    }

    /// Script starting the container service, in bwrap mode
    pub fn launcher_path(&self) -> Option<PathBuf> {
        match (&self.bin_dir, self.use_bwrap) {
            (Some(bin_dir), true) => Some(bin_dir.join(LAUNCHER_SCRIPT)),
            _ => None,
        }
    }
}

/// Decide whether to run the containerized runtime with bwrap.
///
/// Flatpak older than 1.12.1 can't create sub-sandboxes, so bwrap is
/// turned off there regardless of what was requested.
pub fn resolve_use_bwrap(
    requested: Option<bool>,
    proton: &SteamApp,
    flatpak_version: Option<&[u32]>,
) -> bool {
    let containerized = proton.required_tool_app.is_some();
    let wanted = requested.unwrap_or(containerized) && containerized;

    match flatpak_version {
        Some(version) if wanted && !is_bwrap_compatible(version) => {
            log_warning(&format!(
                "Flatpak {} is too old for bwrap containerization, disabling it. \
                 Update Flatpak to 1.12.1 or newer to use bwrap.",
                version
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(".")
            ));
            false
        }
        _ => wanted,
    }
}

fn bus_name() -> String {
    format!("com.github.protonkit.pid{}", std::process::id())
}

pub struct EnvironmentBuilder<'a> {
    environ: &'a Environ,
    host: &'a dyn HostProbe,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(environ: &'a Environ, host: &'a dyn HostProbe) -> Self {
        Self { environ, host }
    }

    /// Environment for running a command in `app`'s prefix with `proton`
    pub fn build(&self, app: &SteamApp, proton: &SteamApp, options: &RunOptions) -> Result<RuntimeEnvironment> {
        let dist = proton
            .proton_dist_path()
            .ok_or_else(|| Error::ToolIncomplete(proton.name.clone()))?;
        let dist_bin = dist.join("bin");
        let prefix = app
            .prefix_path
            .clone()
            .ok_or(Error::AppNotFound(app.appid.unwrap_or_default()))?;

        let mut env = RuntimeEnvironment::default();

        let user_wine = self.environ.get_non_empty("WINE");
        let user_wineserver = self.environ.get_non_empty("WINESERVER");
        if user_wine.is_none() {
            log_info("WINE environment variable is not available. Setting WINE environment variable to Proton bundled version");
        }
        if user_wineserver.is_none() {
            log_info("WINESERVER environment variable is not available. Setting WINESERVER environment variable to Proton bundled version");
        }
        let wine = user_wine.map_or_else(|| dist_bin.join("wine").display().to_string(), str::to_string);
        let wineserver = user_wineserver
            .map_or_else(|| dist_bin.join("wineserver").display().to_string(), str::to_string);

        env.set("WINE", wine.clone());
        env.set("WINELOADER", wine);
        env.set("WINESERVER", wineserver);
        if let Some(winetricks) = &options.winetricks_path {
            env.set("WINETRICKS", winetricks.display().to_string());
        }
        env.set("WINEPREFIX", prefix.display().to_string());
        env.set(
            "WINEDLLPATH",
            format!(
                "{}:{}",
                dist.join("lib64/wine").display(),
                dist.join("lib/wine").display()
            ),
        );
        env.set(
            "PATH",
            prepend_path_list(&dist_bin.display().to_string(), self.environ.get("PATH")),
        );
        env.set("PROTON_PATH", proton.install_path.display().to_string());
        env.set("PROTON_DIST_PATH", dist.display().to_string());
        env.set("STEAM_APP_PATH", app.install_path.display().to_string());
        if let Some(appid) = app.appid {
            env.set("STEAM_APPID", appid.to_string());
        }
        let compat_data = prefix.parent().map(Path::to_path_buf);
        if let Some(compat_data) = &compat_data {
            env.set("STEAM_COMPAT_DATA_PATH", compat_data.display().to_string());
        }
        env.set("PROTONKIT_LOG_LEVEL", console_level().name());
        // Might be left over from another Wine installation
        env.remove("WINEARCH");

        if options.use_steam_runtime {
            self.add_steam_runtime(&mut env, proton, &dist, compat_data.as_deref(), options)?;
            if let Some(bin_dir) = &env.bin_dir {
                let bin_dir = bin_dir.display().to_string();
                let path = prepend_path_list(&bin_dir, env.get("PATH"));
                env.set("PATH", path);
                if user_wine.is_none() {
                    env.set("WINE", format!("{bin_dir}/wine"));
                    env.set("WINELOADER", format!("{bin_dir}/wine"));
                }
                if user_wineserver.is_none() {
                    env.set("WINESERVER", format!("{bin_dir}/wineserver"));
                }
            }
        }

        if self.host.is_steam_deck() {
            let fixes = locale_fixes(self.environ, &self.host.available_locales());
            log_locale_fixes(&fixes);
            for (name, _, new) in fixes {
                env.set(&name, new);
            }
        }

        Ok(env)
    }

    fn add_steam_runtime(
        &self,
        env: &mut RuntimeEnvironment,
        proton: &SteamApp,
        dist: &Path,
        compat_data: Option<&Path>,
        options: &RunOptions,
    ) -> Result<()> {
        if let Some(required_appid) = proton.required_tool_appid {
            if proton.required_tool_app.is_none() {
                return Err(Error::RuntimeMissing {
                    tool: proton.name.clone(),
                    companion: format!("app {required_appid}"),
                });
            }
        }

        let mode = match &proton.required_tool_app {
            Some(runtime) => {
                let flatpak_version = self.host.flatpak_version();
                let use_bwrap =
                    resolve_use_bwrap(options.use_bwrap, proton, flatpak_version.as_deref());
                env.use_bwrap = use_bwrap;

                env.set("STEAM_RUNTIME_PATH", runtime.install_path.display().to_string());
                let library_paths =
                    runtime_library_paths(dist, runtime, use_bwrap, || self.host.host_library_paths())?;
                env.set("PROTON_LD_LIBRARY_PATH", library_paths);

                log_info(&format!("Using separately installed Steam Runtime: {}", runtime.name));
                if !is_supported_runtime(runtime) {
                    log_warning(&format!(
                        "Steam Runtime '{}' is not recognized. Running commands may not work.",
                        runtime.name
                    ));
                }

                if use_bwrap {
                    log_info(
                        "Running Steam Runtime using bwrap containerization.\n\
                         If any problems arise, please try running the command again using \
                         the `--no-bwrap` flag.",
                    );
                    env.set("PROTONKIT_STEAM_RUNTIME_BUS_NAME", bus_name());
                    env.set(
                        "PRESSURE_VESSEL_FILESYSTEMS_RW",
                        writable_filesystems(
                            compat_data,
                            &options.library_paths,
                            &self.host.extra_root_mounts(),
                        ),
                    );
                    ScriptMode::Bwrap
                } else {
                    ScriptMode::Legacy
                }
            }
            None => {
                let legacy = options
                    .legacy_steam_runtime_path
                    .as_deref()
                    .ok_or(Error::SteamRuntimeNotFound)?;
                let paths = self.host.legacy_runtime_library_paths(legacy)?;
                env.set(
                    "PROTON_LD_LIBRARY_PATH",
                    format!("{}{}", proton_library_prefix(dist), paths),
                );
                ScriptMode::Legacy
            }
        };

        if let Some(legacy) = &options.legacy_steam_runtime_path {
            env.set("LEGACY_STEAM_RUNTIME_PATH", legacy.display().to_string());
        }
        env.bin_dir = Some(create_wine_bin_dir(&options.cache_dir, proton, mode)?);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::cell::Cell;

    /// Host with canned answers
    #[derive(Default)]
    pub struct FakeHost {
        pub flatpak_version: Option<Vec<u32>>,
        pub steam_deck: bool,
        pub locales: Vec<String>,
        pub host_library_calls: Cell<usize>,
    }

    impl HostProbe for FakeHost {
        fn host_library_paths(&self) -> Result<String> {
            self.host_library_calls.set(self.host_library_calls.get() + 1);
            Ok("/usr/lib:/usr/lib32".to_string())
        }

        fn legacy_runtime_library_paths(&self, runtime_path: &Path) -> Result<String> {
            Ok(format!("{}/pinned_libs_64", runtime_path.display()))
        }

        fn flatpak_version(&self) -> Option<Vec<u32>> {
            self.flatpak_version.clone()
        }

        fn is_steam_deck(&self) -> bool {
            self.steam_deck
        }

        fn available_locales(&self) -> Vec<String> {
            self.locales.clone()
        }

        fn extra_root_mounts(&self) -> Vec<String> {
            vec!["/mnt".to_string()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeHost;
    use super::*;
    use crate::steam::{find_app, test_support::FakeSteam};

    struct Setup {
        steam: FakeSteam,
        cache: tempfile::TempDir,
    }

    impl Setup {
        fn new() -> Self {
            let steam = FakeSteam::new();
            steam.add_app(10, "Fake game 1");
            steam.add_proton(1113280, "Proton 4.20", None);
            steam.add_runtime(1391110, "Steam Linux Runtime - Soldier");
            steam.add_proton(1420170, "Proton 5.13", Some(1391110));
            Self {
                steam,
                cache: tempfile::tempdir().unwrap(),
            }
        }

        fn options(&self, use_steam_runtime: bool) -> RunOptions {
            RunOptions {
                use_steam_runtime,
                legacy_steam_runtime_path: Some(PathBuf::from("/steam/ubuntu12_32/steam-runtime")),
                use_bwrap: None,
                winetricks_path: Some(PathBuf::from("/usr/bin/winetricks")),
                cache_dir: self.cache.path().to_path_buf(),
                library_paths: self.steam.libraries(),
            }
        }

        fn build(
            &self,
            environ: &Environ,
            host: &FakeHost,
            proton_appid: u32,
            options: &RunOptions,
        ) -> Result<RuntimeEnvironment> {
            let apps = self.steam.apps();
            let app = find_app(&apps, 10).unwrap();
            let proton = find_app(&apps, proton_appid).unwrap();
            EnvironmentBuilder::new(environ, host).build(app, proton, options)
        }
    }

    #[test]
    fn test_plain_environment() {
        let setup = Setup::new();
        let mut environ = setup.steam.environ();
        environ.set("PATH", "/usr/bin");
        environ.set("WINEARCH", "win32");

        let env = setup
            .build(&environ, &FakeHost::default(), 1113280, &setup.options(false))
            .unwrap();
        let proton = setup.steam.steam_path.join("steamapps/common/Proton 4.20");
        let dist = proton.join("dist");
        let compat_data = setup.steam.steam_path.join("steamapps/compatdata/10");

        assert_eq!(env.get("WINE"), Some(dist.join("bin/wine").to_str().unwrap()));
        assert_eq!(env.get("WINELOADER"), env.get("WINE"));
        assert_eq!(env.get("WINESERVER"), Some(dist.join("bin/wineserver").to_str().unwrap()));
        assert_eq!(env.get("WINETRICKS"), Some("/usr/bin/winetricks"));
        assert_eq!(env.get("WINEPREFIX"), Some(compat_data.join("pfx").to_str().unwrap()));
        assert_eq!(
            env.get("WINEDLLPATH").unwrap(),
            format!("{}:{}", dist.join("lib64/wine").display(), dist.join("lib/wine").display())
        );
        assert_eq!(env.get("PATH").unwrap(), format!("{}:/usr/bin", dist.join("bin").display()));
        assert_eq!(env.get("PROTON_PATH"), Some(proton.to_str().unwrap()));
        assert_eq!(env.get("PROTON_DIST_PATH"), Some(dist.to_str().unwrap()));
        assert_eq!(env.get("STEAM_APPID"), Some("10"));
        assert_eq!(env.get("STEAM_COMPAT_DATA_PATH"), Some(compat_data.to_str().unwrap()));
        assert!(env.is_removed("WINEARCH"));
        assert!(env.get("PROTON_LD_LIBRARY_PATH").is_none());
        assert!(env.bin_dir.is_none());
        assert!(!env.use_bwrap);
    }

    #[test]
    fn test_user_wine_kept() {
        let setup = Setup::new();
        let mut environ = setup.steam.environ();
        environ.set("WINE", "/opt/wine/bin/wine");
        environ.set("WINESERVER", "/opt/wine/bin/wineserver");

        let env = setup
            .build(&environ, &FakeHost::default(), 1113280, &setup.options(true))
            .unwrap();
        assert_eq!(env.get("WINE"), Some("/opt/wine/bin/wine"));
        assert_eq!(env.get("WINELOADER"), Some("/opt/wine/bin/wine"));
        assert_eq!(env.get("WINESERVER"), Some("/opt/wine/bin/wineserver"));
    }

    #[test]
    fn test_legacy_runtime() {
        let setup = Setup::new();
        let env = setup
            .build(&setup.steam.environ(), &FakeHost::default(), 1113280, &setup.options(true))
            .unwrap();

        let dist = setup.steam.steam_path.join("steamapps/common/Proton 4.20/dist");
        assert_eq!(
            env.get("PROTON_LD_LIBRARY_PATH").unwrap(),
            format!(
                "{}:{}:/steam/ubuntu12_32/steam-runtime/pinned_libs_64",
                dist.join("lib").display(),
                dist.join("lib64").display()
            )
        );
        let bin_dir = env.bin_dir.clone().unwrap();
        assert_eq!(bin_dir, setup.cache.path().join("proton/Proton 4.20/bin"));
        assert_eq!(env.get("WINE"), Some(bin_dir.join("wine").to_str().unwrap()));
        assert!(env.get("PATH").unwrap().starts_with(&format!("{}:", bin_dir.display())));
        assert_eq!(
            env.get("LEGACY_STEAM_RUNTIME_PATH"),
            Some("/steam/ubuntu12_32/steam-runtime")
        );
        assert!(env.launcher_path().is_none());

        let mut options = setup.options(true);
        options.legacy_steam_runtime_path = None;
        assert!(matches!(
            setup.build(&setup.steam.environ(), &FakeHost::default(), 1113280, &options),
            Err(Error::SteamRuntimeNotFound)
        ));
    }

    #[test]
    fn test_containerized_runtime_with_bwrap() {
        let setup = Setup::new();
        let host = FakeHost::default();
        let env = setup
            .build(&setup.steam.environ(), &host, 1420170, &setup.options(true))
            .unwrap();

        let runtime = setup
            .steam
            .steam_path
            .join("steamapps/common/Steam Linux Runtime - Soldier");
        assert!(env.use_bwrap);
        assert_eq!(env.get("STEAM_RUNTIME_PATH"), Some(runtime.to_str().unwrap()));
        assert!(env.get("PROTON_LD_LIBRARY_PATH").unwrap().ends_with("/dist/lib64:"));
        assert_eq!(host.host_library_calls.get(), 0);
        assert!(env
            .get("PROTONKIT_STEAM_RUNTIME_BUS_NAME")
            .unwrap()
            .starts_with("com.github.protonkit.pid"));

        let rw = env.get("PRESSURE_VESSEL_FILESYSTEMS_RW").unwrap();
        let compat_data = setup.steam.steam_path.join("steamapps/compatdata/10");
        assert!(rw.starts_with(compat_data.to_str().unwrap()));
        assert!(rw.ends_with(":/mnt"));

        let launcher = env.launcher_path().unwrap();
        assert!(launcher.is_file());
    }

    #[test]
    fn test_containerized_runtime_without_bwrap() {
        let setup = Setup::new();
        let host = FakeHost::default();
        let mut options = setup.options(true);
        options.use_bwrap = Some(false);

        let env = setup.build(&setup.steam.environ(), &host, 1420170, &options).unwrap();
        assert!(!env.use_bwrap);
        let paths = env.get("PROTON_LD_LIBRARY_PATH").unwrap();
        assert!(paths.contains(":/usr/lib:/usr/lib32:"));
        assert!(paths.ends_with("soldier_platform_0.20210309.0/files/lib/x86_64-linux-gnu"));
        assert_eq!(host.host_library_calls.get(), 1);
        assert!(env.get("PRESSURE_VESSEL_FILESYSTEMS_RW").is_none());
    }

    #[test]
    fn test_runtime_missing() {
        let setup = Setup::new();
        setup.steam.add_proton(1580130, "Proton 6.3", Some(1628350));

        assert!(matches!(
            setup.build(&setup.steam.environ(), &FakeHost::default(), 1580130, &setup.options(true)),
            Err(Error::RuntimeMissing { .. })
        ));
    }

    #[test]
    fn test_bwrap_resolution() {
        let plain = SteamApp::default();
        let containerized = SteamApp {
            required_tool_appid: Some(1391110),
            required_tool_app: Some(Box::new(SteamApp::default())),
            ..Default::default()
        };

        assert!(resolve_use_bwrap(None, &containerized, None));
        assert!(!resolve_use_bwrap(Some(false), &containerized, None));
        assert!(!resolve_use_bwrap(None, &plain, None));
        assert!(!resolve_use_bwrap(Some(true), &plain, None));

        // Old Flatpak narrows the request, never widens it
        assert!(!resolve_use_bwrap(Some(true), &containerized, Some(&[1, 10, 0])));
        assert!(resolve_use_bwrap(Some(true), &containerized, Some(&[1, 12, 1])));
        assert!(!resolve_use_bwrap(Some(false), &containerized, Some(&[1, 14, 0])));
    }

    #[test]
    fn test_steam_deck_locale() {
        let setup = Setup::new();
        let mut environ = setup.steam.environ();
        environ.set("LANG", "fi_FI.UTF-8");
        let host = FakeHost {
            steam_deck: true,
            locales: vec!["C.utf8".to_string(), "en_US.utf8".to_string()],
            ..Default::default()
        };

        let env = setup.build(&environ, &host, 1113280, &setup.options(false)).unwrap();
        assert_eq!(env.get("LANG"), Some("en_US.UTF-8"));

        let env = setup
            .build(&environ, &FakeHost::default(), 1113280, &setup.options(false))
            .unwrap();
        assert_eq!(env.get("LANG"), None);
    }

    #[test]
    fn test_apply_to_command() {
        let mut env = RuntimeEnvironment::default();
        env.set("WINEPREFIX", "/pfx");
        env.remove("WINEARCH");
        let mut command = Command::new("true");
        env.apply(&mut command);

        let envs: Vec<_> = command.get_envs().collect();
        assert!(envs.contains(&(std::ffi::OsStr::new("WINEPREFIX"), Some(std::ffi::OsStr::new("/pfx")))));
        assert!(envs.contains(&(std::ffi::OsStr::new("WINEARCH"), None)));
    }
}
