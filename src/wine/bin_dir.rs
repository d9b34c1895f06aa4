//! Wine helper scripts
//!
//! With the Steam Runtime enabled, `wine`, `wineserver` and friends are
//! replaced by small scripts that load Proton's binaries with the runtime's
//! libraries, or run them inside the runtime container. Scripts are cached
//! per Proton build under `<cache>/proton/<name>/bin` and only rewritten
//! when the build changes.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::logging::{log_debug, log_info};
use crate::steam::{crc32, SteamApp};

const FINGERPRINT_FILE: &str = "fingerprint.json";

/// Starts the container service that bwrap-mode scripts connect to
pub const LAUNCHER_SCRIPT: &str = "bwrap-launcher";

const LEGACY_TEMPLATE: &str = r#"#!/bin/bash
# Helper script created by protonkit to run Wine binaries using Steam Runtime
export LD_LIBRARY_PATH="$PROTON_LD_LIBRARY_PATH"
exec "$PROTON_DIST_PATH"/bin/@@name@@ "$@"
"#;

const BWRAP_TEMPLATE: &str = r#"#!/bin/bash
# Helper script created by protonkit to run Wine binaries inside the Steam Runtime container
if [[ -n "$PROTONKIT_INSIDE_STEAM_RUNTIME" ]]; then
    export LD_LIBRARY_PATH="$PROTON_LD_LIBRARY_PATH${LD_LIBRARY_PATH:+:$LD_LIBRARY_PATH}"
    exec "$PROTON_DIST_PATH"/bin/@@name@@ "$@"
fi

exec "$STEAM_RUNTIME_PATH"/pressure-vessel/bin/steam-runtime-launch-client \
    --bus-name="$PROTONKIT_STEAM_RUNTIME_BUS_NAME" \
    --pass-env-matching="*" \
    --env=PROTONKIT_INSIDE_STEAM_RUNTIME=1 \
    --directory="$PWD" \
    -- @@script_path@@ "$@"
"#;

const LAUNCHER_TEMPLATE: &str = r#"#!/bin/bash
# Start the Steam Runtime container with a launcher service. The service
# prints its connection details on stdout once it accepts commands.
exec "$STEAM_RUNTIME_PATH"/run --share-pid --batch --launcher -- \
    --bus-name="$PROTONKIT_STEAM_RUNTIME_BUS_NAME" \
    --info-fd=1
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptMode {
    Legacy,
    Bwrap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BinaryStamp {
    name: String,
    size: u64,
    mtime: u64,
}

/// What the cached scripts were generated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Fingerprint {
    install_path: PathBuf,
    mode: ScriptMode,
    /// CRC-32 of the templates the scripts were written from
    template_crc: u32,
    binaries: Vec<BinaryStamp>,
}

fn template_crc(mode: ScriptMode) -> u32 {
    let templates = match mode {
        ScriptMode::Legacy => LEGACY_TEMPLATE.to_string(),
        ScriptMode::Bwrap => format!("{BWRAP_TEMPLATE}{LAUNCHER_TEMPLATE}"),
    };
    crc32(templates.as_bytes())
}

impl Fingerprint {
    fn compute(proton: &SteamApp, dist_bin: &Path, mode: ScriptMode) -> Self {
        let mut binaries: Vec<BinaryStamp> = WalkDir::new(dist_bin)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let metadata = entry.metadata().ok()?;
                let mtime = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_secs());
                Some(BinaryStamp {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size: metadata.len(),
                    mtime,
                })
            })
            .collect();
        binaries.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            install_path: proton.install_path.clone(),
            mode,
            template_crc: template_crc(mode),
            binaries,
        }
    }

    fn read(bin_dir: &Path) -> Option<Self> {
        let content = fs::read_to_string(bin_dir.join(FINGERPRINT_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

fn quote(s: &str) -> String {
    shlex::try_quote(s).map_or_else(|_| s.to_string(), |q| q.into_owned())
}

fn write_script(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content)?;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)?;
    Ok(())
}

fn write_scripts(dir: &Path, final_dir: &Path, fingerprint: &Fingerprint) -> Result<()> {
    let template = match fingerprint.mode {
        ScriptMode::Legacy => LEGACY_TEMPLATE,
        ScriptMode::Bwrap => BWRAP_TEMPLATE,
    };

    for binary in &fingerprint.binaries {
        let script_path = final_dir.join(&binary.name);
        let content = template
            .replace("@@name@@", &quote(&binary.name))
            .replace("@@script_path@@", &quote(&script_path.to_string_lossy()));
        write_script(&dir.join(&binary.name), &content)?;
    }

    if fingerprint.mode == ScriptMode::Bwrap {
        write_script(&dir.join(LAUNCHER_SCRIPT), LAUNCHER_TEMPLATE)?;
    }

    let json = serde_json::to_string_pretty(fingerprint)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    fs::write(dir.join(FINGERPRINT_FILE), json)?;
    Ok(())
}

/// Create (or reuse) the helper script directory for a Proton build
pub fn create_wine_bin_dir(cache_root: &Path, proton: &SteamApp, mode: ScriptMode) -> Result<PathBuf> {
    let dist = proton
        .proton_dist_path()
        .ok_or_else(|| Error::ToolIncomplete(proton.name.clone()))?;
    let base = cache_root.join("proton").join(&proton.name);
    let bin_dir = base.join("bin");

    let fingerprint = Fingerprint::compute(proton, &dist.join("bin"), mode);
    if Fingerprint::read(&bin_dir).as_ref() == Some(&fingerprint) {
        log_debug(&format!("Reusing Wine helper scripts at {}", bin_dir.display()));
        return Ok(bin_dir);
    }

    fs::create_dir_all(&base)?;
    let unique = format!(
        "{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos())
    );
    let tmp_dir = base.join(format!(".bin-{unique}"));
    fs::create_dir_all(&tmp_dir)?;

    if let Err(e) = write_scripts(&tmp_dir, &bin_dir, &fingerprint) {
        let _ = fs::remove_dir_all(&tmp_dir);
        return Err(e);
    }

    // Move any stale directory out of the way, then swap the new one in.
    // If another process won the race, its scripts are identical to ours.
    if bin_dir.exists() {
        let old_dir = base.join(format!(".old-{unique}"));
        if fs::rename(&bin_dir, &old_dir).is_ok() {
            let _ = fs::remove_dir_all(&old_dir);
        }
    }
    if fs::rename(&tmp_dir, &bin_dir).is_err() {
        let _ = fs::remove_dir_all(&tmp_dir);
        if !bin_dir.is_dir() {
            return Err(Error::Io(std::io::Error::other(format!(
                "could not create {}",
                bin_dir.display()
            ))));
        }
    }

    log_info(&format!(
        "Created Steam Runtime Wine binary directory at {}",
        bin_dir.display()
    ));
    Ok(bin_dir)
}
