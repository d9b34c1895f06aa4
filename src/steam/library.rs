//! Steam library folders

use std::fs;
use std::path::{Path, PathBuf};

use super::paths::steamapps_dir;
use crate::logging::{log_info, log_warning};
use crate::vdf::{decode_text, VdfMapExt, VdfValue};

/// All library folders of an installation, the installation itself first.
///
/// A missing `libraryfolders.vdf` means the installation is the only
/// library; a broken one is reported and treated the same way.
pub fn get_library_folders(steam_path: &Path) -> Vec<PathBuf> {
    let mut folders = vec![steam_path.to_path_buf()];

    let Some(vdf_path) = steamapps_dir(steam_path).map(|d| d.join("libraryfolders.vdf")) else {
        return folders;
    };
    let Ok(content) = fs::read_to_string(&vdf_path) else {
        log_info("Steam library folders config not found, using the installation only");
        return folders;
    };

    let root = match decode_text(&content) {
        Ok(root) => root,
        Err(e) => {
            log_warning(&format!(
                "Could not parse {}: {}. Additional library folders are ignored.",
                vdf_path.display(),
                e
            ));
            return folders;
        }
    };

    let Some(entries) = root.get_ci("libraryfolders").and_then(VdfValue::as_map) else {
        return folders;
    };

    // Library folders are keyed by index: "0", "1", "2", etc. Other keys
    // such as "contentstatsid" are metadata.
    for (key, value) in entries {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let path = match value {
            VdfValue::Map(_) => value.get_str("path"),
            // Older Steam versions store the path directly
            VdfValue::String(s) => Some(s.as_str()),
            _ => None,
        };
        let Some(path) = path.filter(|p| !p.is_empty()) else {
            continue;
        };
        let path = PathBuf::from(path);
        if !folders.contains(&path) {
            folders.push(path);
        }
    }

    log_info(&format!(
        "Found {} Steam library folders: {:?}",
        folders.len(),
        folders
    ));
    folders
}
