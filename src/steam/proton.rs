//! Active compatibility tool resolution
//!
//! Decides which Proton build runs an app: `$PROTON_VERSION`, then the
//! app's own mapping in config.vdf, then the global default. Built-in Proton
//! releases are mapped by internal name (`proton_7`), which only appinfo.vdf
//! can translate into an app ID.

use std::path::Path;

use super::apps::{find_app, SteamApp};
use super::config::read_compat_tool_mapping;
use crate::error::{Error, Result};
use crate::logging::{log_error, log_info, log_warning};
use crate::vdf::{AppInfo, VdfMapExt, VdfValue};

/// Inputs for `find_proton_app`
#[derive(Debug, Clone, Copy)]
pub struct ProtonQuery<'a> {
    pub steam_path: &'a Path,
    pub steam_apps: &'a [SteamApp],
    /// App whose per-app mapping should be honored
    pub appid: Option<u32>,
    /// Value of `$PROTON_VERSION`
    pub proton_version: Option<&'a str>,
}

/// App ID of a built-in tool, looked up by name or alias in appinfo.vdf
pub fn find_tool_appid(appinfo: &AppInfo, tool_name: &str) -> Option<u32> {
    for entry in &appinfo.entries {
        let Some(compat_tools) = entry
            .data
            .lookup(&["appinfo", "extended", "compat_tools"])
            .and_then(VdfValue::as_map)
        else {
            continue;
        };

        for (default_name, tool) in compat_tools {
            // A tool can have extra names, e.g. "proton_316" and "proton_316_beta"
            let aliases = tool.get_str("aliases").unwrap_or_default();
            let matches = default_name == tool_name
                || aliases.split(',').map(str::trim).any(|alias| alias == tool_name);
            if matches {
                return tool.get("appid").and_then(VdfValue::as_u32);
            }
        }
    }
    None
}

fn known_proton_names(apps: &[SteamApp]) -> Vec<String> {
    let mut names: Vec<String> = apps
        .iter()
        .filter(|app| app.is_proton())
        .map(|app| app.name.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Name of the tool Steam would use for the app
fn configured_tool_name(query: &ProtonQuery) -> Result<String> {
    let mappings = read_compat_tool_mapping(query.steam_path);

    if let Some(name) = query.appid.and_then(|appid| mappings.app_tool(appid)) {
        log_info(&format!("Found app-specific compatibility tool: {name}"));
        return Ok(name.to_string());
    }

    match mappings.default_tool() {
        Some(name) => {
            log_info(&format!("Found default compatibility tool: {name}"));
            Ok(name.to_string())
        }
        None => {
            log_error(
                "No compatibility tool found in config.vdf. \
                 Have you enabled Steam Play for all titles under Steam settings?",
            );
            Err(Error::ToolNotFound)
        }
    }
}

/// The catalog app for a tool name, going through appinfo.vdf for built-in tools
fn find_tool_app(query: &ProtonQuery, tool_name: &str) -> Result<SteamApp> {
    if let Some(app) = query.steam_apps.iter().find(|app| app.name == tool_name) {
        log_info(&format!("Found active custom compatibility tool: {}", app.name));
        return Ok(app.clone());
    }

    let appinfo_path = query.steam_path.join("appcache/appinfo.vdf");
    let appinfo = match AppInfo::load(&appinfo_path) {
        Ok(appinfo) => appinfo,
        Err(e) => {
            log_warning(&format!("Could not read {}: {}", appinfo_path.display(), e));
            return Err(Error::ToolNotFound);
        }
    };

    let Some(tool_appid) = find_tool_appid(&appinfo, tool_name) else {
        log_error(&format!(
            "Could not find the App ID of compatibility tool '{tool_name}' in appinfo.vdf"
        ));
        return Err(Error::ToolNotFound);
    };

    match find_app(query.steam_apps, tool_appid) {
        Some(app) => {
            log_info(&format!("Found active compatibility tool: {}", app.label()));
            Ok(app.clone())
        }
        None => {
            log_error(&format!(
                "Compatibility tool '{tool_name}' ({tool_appid}) is not installed"
            ));
            Err(Error::ToolNotFound)
        }
    }
}

/// A tool can only be used if it is a complete Proton installation whose
/// Steam Runtime, if any, is installed
fn check_tool(tool: SteamApp) -> Result<SteamApp> {
    if !tool.is_proton() {
        log_error(&format!(
            "Active compatibility tool '{}' was found, but it's not a Proton installation",
            tool.name
        ));
        return Err(Error::ToolNotProton(tool.name));
    }

    if let Some(required_appid) = tool.required_tool_appid {
        let installed = tool
            .required_tool_app
            .as_deref()
            .filter(|runtime| runtime.is_accessible());
        if installed.is_none() {
            let companion = tool
                .required_tool_app
                .as_ref()
                .map_or_else(|| format!("app {required_appid}"), |runtime| runtime.label());
            return Err(Error::RuntimeMissing {
                tool: tool.name,
                companion,
            });
        }
    }

    if tool.proton_dist_path().is_none() {
        return Err(Error::ToolIncomplete(tool.name));
    }

    Ok(tool)
}

/// Find the Proton installation to use
pub fn find_proton_app(query: &ProtonQuery) -> Result<SteamApp> {
    let tool = match query.proton_version.filter(|v| !v.is_empty()) {
        Some(requested) => {
            let Some(app) = query.steam_apps.iter().find(|app| app.name == requested) else {
                log_error("$PROTON_VERSION was set but matching Proton installation could not be found.");
                return Err(Error::RequestedToolNotFound {
                    requested: requested.to_string(),
                    known: known_proton_names(query.steam_apps),
                });
            };
            log_info(&format!("Found requested Proton version: {}", app.name));
            app.clone()
        }
        None => {
            let tool_name = configured_tool_name(query)?;
            find_tool_app(query, &tool_name)?
        }
    };

    let tool = check_tool(tool)?;
    log_info("Active compatibility tool is a Proton installation");
    Ok(tool)
}
