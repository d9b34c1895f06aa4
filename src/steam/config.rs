//! Steam config.vdf: compatibility tool mappings
//!
//! Steam stores the tool chosen for each app under
//! `InstallConfigStore.Software.Valve.Steam.CompatToolMapping`, with the
//! global default under the key `"0"`. Older beta releases used `ToolMapping`.

use std::fs;
use std::path::Path;

use crate::error::VdfError;
use crate::logging::{log_info, log_warning};
use crate::vdf::{decode_text, VdfMap, VdfMapExt, VdfValue};

const STEAM_CONFIG_PATH: &[&str] = &["InstallConfigStore", "Software", "Valve", "Steam"];

/// Both mapping sections of config.vdf
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompatToolMappings {
    compat_tool_mapping: VdfMap,
    tool_mapping: VdfMap,
}

impl CompatToolMappings {
    pub fn parse(content: &str) -> Result<Self, VdfError> {
        let root = decode_text(content)?;
        let section = |name: &str| {
            let mut path = STEAM_CONFIG_PATH.to_vec();
            path.push(name);
            root.lookup(&path)
                .and_then(VdfValue::as_map)
                .cloned()
                .unwrap_or_default()
        };

        Ok(Self {
            compat_tool_mapping: section("CompatToolMapping"),
            tool_mapping: section("ToolMapping"),
        })
    }

    fn name_for(&self, key: &str) -> Option<&str> {
        [&self.compat_tool_mapping, &self.tool_mapping]
            .into_iter()
            .filter_map(|mapping| mapping.get_ci(key)?.get_str("name"))
            .find(|name| !name.is_empty())
    }

    /// Tool configured for this app specifically
    pub fn app_tool(&self, appid: u32) -> Option<&str> {
        self.name_for(&appid.to_string())
    }

    /// Tool used for every app without its own mapping
    pub fn default_tool(&self) -> Option<&str> {
        self.name_for("0")
    }

    pub fn is_empty(&self) -> bool {
        self.compat_tool_mapping.is_empty() && self.tool_mapping.is_empty()
    }
}

/// Mappings from `<steam_path>/config/config.vdf`; empty if unreadable
pub fn read_compat_tool_mapping(steam_path: &Path) -> CompatToolMappings {
    let path = steam_path.join("config/config.vdf");
    let Ok(content) = fs::read_to_string(&path) else {
        log_info(&format!("Steam config not found at {}", path.display()));
        return CompatToolMappings::default();
    };

    match CompatToolMappings::parse(&content) {
        Ok(mappings) => mappings,
        Err(e) => {
            log_warning(&format!("Could not parse {}: {}", path.display(), e));
            CompatToolMappings::default()
        }
    }
}
