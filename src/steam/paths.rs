//! Steam installation detection
//!
//! Finds native, Flatpak and Snap Steam installations and picks the one to
//! use, asking the user when more than one exists.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::gui::Selector;
use crate::logging::{log_error, log_info};
use crate::utils::{resolve_path, Environ};

/// Native Steam installations, relative to home
const COMMON_STEAM_DIRS: &[&str] = &[".steam/steam", ".local/share/Steam"];

/// Flatpak Steam installations, relative to home
const FLATPAK_STEAM_DIRS: &[&str] = &[
    ".var/app/com.valvesoftware.Steam/.local/share/Steam",
    ".var/app/com.valvesoftware.Steam/data/Steam",
];

/// Snap Steam installations, relative to home
const SNAP_STEAM_DIRS: &[&str] = &[
    "snap/steam/common/.local/share/Steam",
    "snap/steam/common/.steam/steam",
];

/// Directory of the 32-bit Steam client and the legacy Steam Runtime
const STEAM_RUNTIME_DIR: &str = "ubuntu12_32";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallKind {
    Native,
    Flatpak,
    Snap,
}

impl InstallKind {
    fn from_path(path: &Path) -> Self {
        let path = path.to_string_lossy();
        if path.contains("com.valvesoftware.Steam") {
            InstallKind::Flatpak
        } else if path.contains("snap/steam") {
            InstallKind::Snap
        } else {
            InstallKind::Native
        }
    }
}

impl fmt::Display for InstallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallKind::Native => "Native",
            InstallKind::Flatpak => "Flatpak",
            InstallKind::Snap => "Snap",
        };
        f.write_str(name)
    }
}

/// A Steam installation
#[derive(Debug, Clone, PartialEq)]
pub struct SteamInstallation {
    /// Directory containing `steamapps`, `config` and `appcache`
    pub steam_path: PathBuf,
    /// Directory containing `ubuntu12_32` and `compatibilitytools.d`
    pub steam_root: PathBuf,
    pub kind: InstallKind,
}

impl SteamInstallation {
    pub fn new(steam_path: PathBuf, steam_root: PathBuf) -> Self {
        let kind = InstallKind::from_path(&steam_path);
        Self {
            steam_path,
            steam_root,
            kind,
        }
    }

    /// Label shown when asking the user to pick an installation
    pub fn label(&self) -> String {
        format!("{} - {}", self.kind, self.steam_path.display())
    }

    pub fn is_flatpak(&self) -> bool {
        self.kind == InstallKind::Flatpak
    }
}

/// `steamapps`, or `SteamApps` on old installations
pub fn steamapps_dir(path: &Path) -> Option<PathBuf> {
    ["steamapps", "SteamApps"]
        .iter()
        .map(|name| path.join(name))
        .find(|p| p.is_dir())
}

fn is_valid_installation(path: &Path) -> bool {
    steamapps_dir(path).is_some() && path.join("appcache").is_dir()
}

fn has_runtime_dir(path: &Path) -> bool {
    path.join(STEAM_RUNTIME_DIR).is_dir()
}

/// Find all Steam installations.
///
/// `$STEAM_DIR` short-circuits the search: it is used if valid and nothing
/// else is considered.
pub fn find_steam_installations(environ: &Environ) -> Vec<SteamInstallation> {
    if let Some(steam_dir) = environ.get_non_empty("STEAM_DIR") {
        let path = PathBuf::from(steam_dir);
        if steamapps_dir(&path).is_some() && has_runtime_dir(&path) {
            log_info(&format!("Using Steam directory specified in $STEAM_DIR: {steam_dir}"));
            return vec![SteamInstallation::new(path.clone(), path)];
        }
        log_error(&format!(
            "Path in $STEAM_DIR ({steam_dir}) does not contain a valid Steam installation. \
             Make sure it contains 'steamapps' and '{STEAM_RUNTIME_DIR}' directories."
        ));
        return Vec::new();
    }

    let home = environ.home();
    let mut installations: Vec<SteamInstallation> = Vec::new();
    let mut seen = Vec::new();

    let native_root = home.join(".steam/root");
    let candidates = COMMON_STEAM_DIRS
        .iter()
        .chain(FLATPAK_STEAM_DIRS)
        .chain(SNAP_STEAM_DIRS)
        .map(|relative| home.join(relative));

    for path in candidates {
        if !is_valid_installation(&path) {
            continue;
        }

        // Symlinks can make the same installation appear twice
        let resolved = resolve_path(&path);
        if seen.contains(&resolved) {
            continue;
        }
        seen.push(resolved);

        let mut installation = SteamInstallation::new(path.clone(), path.clone());
        if installation.kind == InstallKind::Native && has_runtime_dir(&native_root) {
            installation.steam_root = native_root.clone();
        }
        log_info(&format!(
            "Found Steam installation: {} (root: {}, {})",
            installation.steam_path.display(),
            installation.steam_root.display(),
            installation.kind
        ));
        installations.push(installation);
    }

    installations
}

/// Pick one installation, asking the user if there is more than one
pub fn select_steam_installation(
    mut installations: Vec<SteamInstallation>,
    selector: &dyn Selector,
) -> Result<SteamInstallation> {
    installations.sort_by_key(|i| i.kind);

    match installations.len() {
        0 => Err(Error::InstallationNotFound),
        1 => Ok(installations.remove(0)),
        _ => {
            let labels: Vec<String> = installations.iter().map(SteamInstallation::label).collect();
            let choice = selector.select_one("Select Steam installation", &labels)?;
            match choice {
                Some(index) if index < installations.len() => Ok(installations.swap_remove(index)),
                _ => Err(Error::NoInstallationSelected),
            }
        }
    }
}

/// Path to the legacy Steam Runtime according to `$STEAM_RUNTIME`.
///
/// `0` disables it, an existing directory selects a custom runtime, `1` or
/// unset selects the one bundled with Steam, whether it is installed or not.
pub fn find_legacy_steam_runtime_path(
    steam_root: &Path,
    environ: &Environ,
) -> Result<Option<PathBuf>> {
    let env_value = environ.get("STEAM_RUNTIME").unwrap_or_default();

    if env_value == "0" {
        log_info("Steam Runtime disabled by $STEAM_RUNTIME");
        return Ok(None);
    }

    if !env_value.is_empty() && env_value != "1" {
        let custom = PathBuf::from(env_value);
        if custom.is_dir() {
            log_info(&format!("Using custom Steam Runtime at {env_value}"));
            return Ok(Some(custom));
        }
        log_error(&format!(
            "$STEAM_RUNTIME ({env_value}) is neither 0, 1 nor a directory"
        ));
        return Err(Error::SteamRuntimeNotFound);
    }

    // Not checked here: containerized tools never use it
    let bundled = steam_root.join(STEAM_RUNTIME_DIR).join("steam-runtime");
    log_info(&format!("Using bundled legacy Steam Runtime at {}", bundled.display()));
    Ok(Some(bundled))
}
