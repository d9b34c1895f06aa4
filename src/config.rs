use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::log_warning;

// ============================================================================
// Main App Config
// ============================================================================

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Library folders the user chose not to be warned about again
    pub dismissed_paths: Vec<PathBuf>,
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        config_path!("config.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => log_warning(&format!(
                        "Ignoring unreadable config {}: {}",
                        path.display(),
                        e
                    )),
                }
            }
        }
        Self::default()
    }

    pub fn save(&self) {
        self.save_to(&Self::default_path());
    }

    pub fn save_to(&self, path: &Path) {
        // Ensure parent dir exists
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(self) {
            let _ = fs::write(path, json);
        }
    }

    /// Paths from `paths` the user has not dismissed yet
    pub fn undismissed<'a>(&self, paths: &'a [PathBuf]) -> Vec<&'a PathBuf> {
        paths
            .iter()
            .filter(|p| !self.dismissed_paths.contains(p))
            .collect()
    }

    pub fn dismiss(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            if !self.dismissed_paths.contains(&path) {
                self.dismissed_paths.push(path);
            }
        }
        self.dismissed_paths.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dismissed_paths_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protonkit/config.json");

        let mut config = AppConfig::load_from(&path);
        assert!(config.dismissed_paths.is_empty());

        config.dismiss([PathBuf::from("/mnt/SSD_C"), PathBuf::from("/mnt/SSD_B")]);
        config.dismiss([PathBuf::from("/mnt/SSD_C")]);
        config.save_to(&path);

        let loaded = AppConfig::load_from(&path);
        assert_eq!(
            loaded.dismissed_paths,
            vec![PathBuf::from("/mnt/SSD_B"), PathBuf::from("/mnt/SSD_C")]
        );

        let candidates = vec![PathBuf::from("/mnt/SSD_C"), PathBuf::from("/mnt/SSD_D")];
        assert_eq!(loaded.undismissed(&candidates), vec![&candidates[1]]);
    }

    #[test]
    fn test_corrupt_config_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }
}
