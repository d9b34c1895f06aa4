//! Steam integration
//!
//! Installation discovery, library folders, installed apps, non-Steam
//! shortcuts, compatibility tools and the Proton resolution built on them.

mod apps;
mod compat_tools;
mod config;
mod library;
mod paths;
mod proton;
mod shortcuts;

#[cfg(test)]
pub(crate) mod test_support;

pub use apps::{find_app, find_app_prefix, find_windows_apps, get_steam_apps, search_apps, SteamApp};
pub use compat_tools::{get_compat_tool_dirs, get_custom_compat_tool_installations};
pub use config::{read_compat_tool_mapping, CompatToolMappings};
pub use library::get_library_folders;
pub use paths::{
    find_legacy_steam_runtime_path, find_steam_installations, select_steam_installation,
    steamapps_dir, InstallKind, SteamInstallation,
};
pub use proton::{find_proton_app, find_tool_appid, ProtonQuery};
pub(crate) use shortcuts::crc32;
pub use shortcuts::{find_current_steamid3, get_custom_windows_shortcuts, shortcut_appid, Shortcut};
