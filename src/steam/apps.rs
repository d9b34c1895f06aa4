//! Installed Steam apps
//!
//! Builds one `SteamApp` per appmanifest_*.acf, plus custom compatibility
//! tools and non-Steam shortcuts, into a sorted catalog.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::compat_tools::get_custom_compat_tool_installations;
use super::paths::{steamapps_dir, SteamInstallation};
use super::shortcuts::get_custom_windows_shortcuts;
use crate::error::{Error, Result, VdfError};
use crate::logging::{log_info, log_warning};
use crate::utils::Environ;
use crate::vdf::{decode_text, VdfMapExt, VdfValue};

/// An installed app: a game, a Proton build, a runtime or a shortcut
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SteamApp {
    /// `None` for compatibility tools installed outside Steam
    pub appid: Option<u32>,
    pub name: String,
    pub install_path: PathBuf,
    pub prefix_path: Option<PathBuf>,
    /// App ID of a runtime this app needs, from toolmanifest.vdf
    pub required_tool_appid: Option<u32>,
    /// The app `required_tool_appid` refers to, once the catalog is complete
    pub required_tool_app: Option<Box<SteamApp>>,
}

impl SteamApp {
    /// Prefix exists and has been initialized by Steam (`pfx.lock` next to it)
    pub fn prefix_path_exists(&self) -> bool {
        let Some(prefix) = &self.prefix_path else {
            return false;
        };
        prefix.is_dir()
            && prefix
                .parent()
                .is_some_and(|compat_data| compat_data.join("pfx.lock").is_file())
    }

    /// Proton installations ship a `proton` script
    pub fn is_proton(&self) -> bool {
        self.install_path.join("proton").is_file()
    }

    /// Steam Play tools (runtimes, Proton) ship a toolmanifest.vdf
    pub fn is_tool(&self) -> bool {
        self.install_path.join("toolmanifest.vdf").is_file()
    }

    pub fn is_windows_app(&self) -> bool {
        !self.is_proton() && !self.is_tool() && self.prefix_path_exists()
    }

    /// Install directory exists
    pub fn is_accessible(&self) -> bool {
        self.install_path.is_dir()
    }

    /// Directory with Proton's `bin`, `lib` and `lib64`.
    /// Newer releases use `files`, older ones `dist`.
    pub fn proton_dist_path(&self) -> Option<PathBuf> {
        ["files", "dist"]
            .iter()
            .map(|name| self.install_path.join(name))
            .find(|p| p.is_dir())
    }

    /// Fuzzy match: ignores case, whitespace and punctuation
    pub fn name_contains(&self, query: &str) -> bool {
        let query = normalize_name(query);
        !query.is_empty() && normalize_name(&self.name).contains(&query)
    }

    /// `Name (appid)` as used in listings
    pub fn label(&self) -> String {
        match self.appid {
            Some(appid) => format!("{} ({})", self.name, appid),
            None => self.name.clone(),
        }
    }

    /// Build an app from an appmanifest_*.acf file.
    ///
    /// `library_paths` are searched for the app's prefix, which can live in
    /// a different library than the app itself.
    pub fn from_appmanifest(path: &Path, library_paths: &[PathBuf]) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let malformed = |source: VdfError| Error::MalformedConfig {
            path: path.to_path_buf(),
            source,
        };

        let root = decode_text(&content).map_err(malformed)?;
        let Some(app_state) = root.get_ci("AppState") else {
            return Err(Error::NoData(path.to_path_buf()));
        };

        let appid = app_state
            .get("appid")
            .and_then(VdfValue::as_u32)
            .ok_or_else(|| malformed(VdfError::MissingField("appid")))?;
        let name = app_state
            .get_str("name")
            .or_else(|| app_state.get("UserConfig")?.get_str("name"))
            .ok_or_else(|| malformed(VdfError::MissingField("name")))?;
        let install_dir = app_state
            .get_str("installdir")
            .ok_or_else(|| malformed(VdfError::MissingField("installdir")))?;

        let manifest_dir = path.parent().unwrap_or(Path::new("."));
        let install_path = manifest_dir.join("common").join(install_dir);
        let required_tool_appid = read_required_tool_appid(&install_path)?;

        Ok(Self {
            appid: Some(appid),
            name: name.to_string(),
            install_path,
            prefix_path: find_app_prefix(appid, library_paths),
            required_tool_appid,
            required_tool_app: None,
        })
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `manifest.require_tool_appid` from the tool's toolmanifest.vdf.
///
/// A present but empty or unreadable manifest is an error: the tool is
/// probably mid-update and can't be used.
pub(super) fn read_required_tool_appid(install_path: &Path) -> Result<Option<u32>> {
    let manifest_path = install_path.join("toolmanifest.vdf");
    if !manifest_path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(&manifest_path)?;
    let root = decode_text(&content).map_err(|source| Error::MalformedConfig {
        path: manifest_path.clone(),
        source,
    })?;
    let Some(manifest) = root.get_ci("manifest") else {
        return Err(Error::MalformedConfig {
            path: manifest_path,
            source: VdfError::MissingField("manifest"),
        });
    };

    Ok(manifest.get("require_tool_appid").and_then(VdfValue::as_u32))
}

/// Find the prefix of `appid` in any library.
///
/// If several libraries have one (e.g. after moving a game), the one used
/// most recently, judging by `pfx.lock`, wins.
pub fn find_app_prefix(appid: u32, library_paths: &[PathBuf]) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = library_paths
        .iter()
        .flat_map(|library| {
            ["steamapps", "SteamApps"].map(|dir| {
                library
                    .join(dir)
                    .join("compatdata")
                    .join(appid.to_string())
                    .join("pfx")
            })
        })
        .filter(|p| p.is_dir())
        .collect();
    candidates.dedup();

    if candidates.len() > 1 {
        log_info(&format!(
            "Found multiple prefixes for app {appid}: {candidates:?}, using the most recent one"
        ));
    }

    candidates.into_iter().max_by_key(|prefix| {
        prefix
            .parent()
            .and_then(|p| fs::metadata(p.join("pfx.lock")).ok())
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    })
}

// ============================================================================
// Catalog
// ============================================================================

fn appmanifest_paths(steamapps: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(steamapps) else {
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("appmanifest_") && n.ends_with(".acf"))
        })
        .collect();
    paths.sort();
    paths
}

/// Every app of the installation, sorted by name.
///
/// Broken manifests are logged and skipped; they never hide other apps.
pub fn get_steam_apps(
    installation: &SteamInstallation,
    library_paths: &[PathBuf],
    environ: &Environ,
) -> Vec<SteamApp> {
    let mut apps = Vec::new();

    for library in library_paths {
        let Some(steamapps) = steamapps_dir(library) else {
            log_warning(&format!(
                "Steam library folder {} has no steamapps directory",
                library.display()
            ));
            continue;
        };

        for manifest_path in appmanifest_paths(&steamapps) {
            match SteamApp::from_appmanifest(&manifest_path, library_paths) {
                Ok(app) => apps.push(app),
                Err(Error::NoData(path)) => {
                    log_info(&format!("Skipping empty appmanifest {}", path.display()));
                }
                Err(e) => {
                    log_warning(&format!(
                        "Skipping appmanifest {}: {}",
                        manifest_path.display(),
                        e
                    ));
                }
            }
        }
    }

    apps.extend(get_custom_compat_tool_installations(
        &installation.steam_root,
        environ,
    ));
    apps.extend(get_custom_windows_shortcuts(&installation.steam_path));

    link_required_tools(&mut apps);
    apps.sort_by(|a, b| a.name.cmp(&b.name).then(a.appid.cmp(&b.appid)));

    for app in apps.iter().filter(|a| !a.is_accessible()) {
        log_info(&format!(
            "Install directory of {} does not exist: {}",
            app.label(),
            app.install_path.display()
        ));
    }

    apps
}

/// Fill in `required_tool_app` now that every app is known
fn link_required_tools(apps: &mut [SteamApp]) {
    let by_appid: HashMap<u32, SteamApp> = apps
        .iter()
        .filter_map(|app| app.appid.map(|id| (id, app.clone())))
        .collect();

    for app in apps.iter_mut() {
        if let Some(required) = app.required_tool_appid {
            app.required_tool_app = by_appid.get(&required).cloned().map(Box::new);
        }
    }
}

pub fn find_app(apps: &[SteamApp], appid: u32) -> Option<&SteamApp> {
    apps.iter().find(|app| app.appid == Some(appid))
}

/// Apps that winetricks can be run for
pub fn find_windows_apps(apps: &[SteamApp]) -> Vec<&SteamApp> {
    apps.iter().filter(|app| app.is_windows_app()).collect()
}

/// Windows apps whose name matches `query`
pub fn search_apps<'a>(apps: &'a [SteamApp], query: &str) -> Vec<&'a SteamApp> {
    apps.iter()
        .filter(|app| app.is_windows_app() && app.name_contains(query))
        .collect()
}
