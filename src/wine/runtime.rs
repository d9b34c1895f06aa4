//! Steam Runtime library paths and container mounts
//!
//! Proton releases from 5.13 on run inside a separately installed Steam
//! Runtime ("Soldier", "Sniper"); older ones use the legacy runtime bundled
//! with the Steam client.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};
use crate::steam::SteamApp;

/// Runtimes known to work with the helper scripts
pub const SUPPORTED_STEAM_RUNTIMES: &[&str] = &[
    "Steam Linux Runtime - Soldier",
    "Steam Linux Runtime - Sniper",
];

/// Directories pressure-vessel already exposes inside the container
const ALREADY_EXPOSED: &[&str] = &[
    "bin", "etc", "home", "lib", "lib32", "lib64",
    "overrides", "run", "sbin", "tmp", "usr", "var",
];

/// System directories that shouldn't be mounted
const SYSTEM_DIRS: &[&str] = &[
    "proc", "sys", "dev", "boot", "root", "lost+found", "snap",
];

pub fn is_supported_runtime(runtime: &SteamApp) -> bool {
    SUPPORTED_STEAM_RUNTIMES.contains(&runtime.name.as_str())
}

/// `<proton dist>/lib:<proton dist>/lib64:`
///
/// Proton's own libraries go first so `libwine.so.1` resolves to the right build.
pub fn proton_library_prefix(dist_path: &Path) -> String {
    format!(
        "{}:{}:",
        dist_path.join("lib").display(),
        dist_path.join("lib64").display()
    )
}

/// The root filesystem of a containerized runtime: `var/*/files` or `*/files`
pub fn find_runtime_root(runtime: &SteamApp) -> Option<PathBuf> {
    let subdirs = |dir: &Path| -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        dirs
    };

    let install = &runtime.install_path;
    subdirs(&install.join("var"))
        .into_iter()
        .chain(subdirs(install))
        .map(|dir| dir.join("files"))
        .find(|files| files.is_dir())
}

/// Library directories listed by `ldconfig -XNv`
pub fn parse_ldconfig_output(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.starts_with('/') && line.contains(':'))
        .filter_map(|line| line.split(':').next())
        .map(str::to_string)
        .collect()
}

/// Host library directories, as the legacy runtime would compute them
pub fn host_library_paths() -> Result<String> {
    let output = Command::new("/sbin/ldconfig").arg("-XNv").output()?;
    Ok(parse_ldconfig_output(&String::from_utf8_lossy(&output.stdout)).join(":"))
}

/// Library paths reported by the legacy runtime's `run.sh`
pub fn legacy_runtime_library_paths(legacy_runtime_path: &Path) -> Result<String> {
    let output = match Command::new(legacy_runtime_path.join("run.sh"))
        .arg("--print-steam-runtime-library-paths")
        .output()
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Error::SteamRuntimeNotFound),
        Err(e) => return Err(e.into()),
    };
    if !output.status.success() {
        return Err(Error::SteamRuntimeNotFound);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// `PROTON_LD_LIBRARY_PATH` for a containerized runtime.
///
/// With bwrap the container provides everything except Proton's own
/// libraries. Without it, host libraries and the runtime's are added.
pub fn runtime_library_paths(
    dist_path: &Path,
    runtime: &SteamApp,
    use_bwrap: bool,
    host_paths: impl FnOnce() -> Result<String>,
) -> Result<String> {
    let prefix = proton_library_prefix(dist_path);
    if use_bwrap {
        return Ok(prefix);
    }

    let root = find_runtime_root(runtime).ok_or_else(|| Error::RuntimeMissing {
        tool: runtime.name.clone(),
        companion: format!("{} (runtime root)", runtime.name),
    })?;
    Ok(format!(
        "{prefix}{}:{}:{}",
        host_paths()?,
        root.join("lib/i386-linux-gnu").display(),
        root.join("lib/x86_64-linux-gnu").display()
    ))
}

/// Top-level directories of `root` that the container doesn't expose by
/// default (`/mnt`, `/media`, `/opt`, ...)
pub fn detect_extra_mounts(root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut mounts: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| {
            !ALREADY_EXPOSED.contains(&name.as_str())
                && !SYSTEM_DIRS.contains(&name.as_str())
                && !name.starts_with('.')
        })
        .map(|name| format!("/{name}"))
        .collect();
    mounts.sort();
    mounts
}

/// `PRESSURE_VESSEL_FILESYSTEMS_RW`: paths the container needs write access to
pub fn writable_filesystems(
    compat_data: Option<&Path>,
    library_paths: &[PathBuf],
    extra_mounts: &[String],
) -> String {
    let mut paths: Vec<String> = Vec::new();
    let candidates = compat_data
        .map(|p| p.display().to_string())
        .into_iter()
        .chain(library_paths.iter().map(|p| p.display().to_string()))
        .chain(extra_mounts.iter().cloned());

    for path in candidates {
        if !path.is_empty() && !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths.join(":")
}
