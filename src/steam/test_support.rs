//! Fake Steam installation for tests
//!
//! Lays out `~/.steam/steam` and `~/.steam/root` in a temporary home and
//! writes manifests, prefixes and Proton trees on request.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::apps::{get_steam_apps, SteamApp};
use super::library::get_library_folders;
use super::paths::SteamInstallation;
use crate::utils::Environ;
use crate::vdf::appinfo_test_support::{appinfo_v27, compat_tools_payload};
use crate::vdf::{encode_text, VdfMap, VdfValue};

pub struct FakeSteam {
    _home: TempDir,
    pub home: PathBuf,
    pub steam_path: PathBuf,
    pub steam_root: PathBuf,
    extra_libraries: RefCell<Vec<PathBuf>>,
    tool_mapping: RefCell<Vec<(String, String)>>,
}

fn map<const N: usize>(entries: [(&str, VdfValue); N]) -> VdfValue {
    VdfValue::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

fn string(s: &str) -> VdfValue {
    VdfValue::String(s.to_string())
}

fn write_manifest(library: &Path, appid: u32, name: &str) -> PathBuf {
    let steamapps = library.join("steamapps");
    let root: VdfMap = [(
        "AppState".to_string(),
        map([
            ("appid", string(&appid.to_string())),
            ("name", string(name)),
            ("installdir", string(name)),
        ]),
    )]
    .into_iter()
    .collect();
    fs::write(
        steamapps.join(format!("appmanifest_{appid}.acf")),
        encode_text(&root),
    )
    .unwrap();

    let install_path = steamapps.join("common").join(name);
    fs::create_dir_all(&install_path).unwrap();
    install_path
}

fn write_proton_tree(install_path: &Path, required_tool: Option<u32>) {
    fs::write(install_path.join("proton"), "#!/bin/sh\n").unwrap();
    let dist = install_path.join("dist");
    for dir in ["bin", "lib/wine", "lib64/wine"] {
        fs::create_dir_all(dist.join(dir)).unwrap();
    }
    for bin in ["wine", "wine64", "wineserver"] {
        fs::write(dist.join("bin").join(bin), "#!/bin/sh\n").unwrap();
    }
    if let Some(appid) = required_tool {
        write_tool_manifest(install_path, Some(appid));
    }
}

fn write_tool_manifest(install_path: &Path, required_tool: Option<u32>) {
    let mut manifest = vec![("commandline", string("/proton %verb%"))];
    if let Some(appid) = required_tool {
        manifest.push(("require_tool_appid", string(&appid.to_string())));
    }
    let root: VdfMap = [(
        "manifest".to_string(),
        VdfValue::Map(
            manifest
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        ),
    )]
    .into_iter()
    .collect();
    fs::write(install_path.join("toolmanifest.vdf"), encode_text(&root)).unwrap();
}

impl FakeSteam {
    pub fn new() -> Self {
        let home_dir = tempfile::tempdir().unwrap();
        let home = home_dir.path().to_path_buf();
        let steam_path = home.join(".steam/steam");
        let steam_root = home.join(".steam/root");

        for dir in ["steamapps/common", "appcache", "config"] {
            fs::create_dir_all(steam_path.join(dir)).unwrap();
        }
        for dir in ["ubuntu12_32", "compatibilitytools.d"] {
            fs::create_dir_all(steam_root.join(dir)).unwrap();
        }

        Self {
            _home: home_dir,
            home,
            steam_path,
            steam_root,
            extra_libraries: RefCell::new(Vec::new()),
            tool_mapping: RefCell::new(Vec::new()),
        }
    }

    pub fn environ(&self) -> Environ {
        Environ::from_pairs([
            ("HOME", self.home.to_string_lossy().into_owned()),
            ("PATH", String::new()),
        ])
    }

    pub fn installation(&self) -> SteamInstallation {
        SteamInstallation::new(self.steam_path.clone(), self.steam_root.clone())
    }

    pub fn libraries(&self) -> Vec<PathBuf> {
        get_library_folders(&self.steam_path)
    }

    pub fn apps(&self) -> Vec<SteamApp> {
        get_steam_apps(&self.installation(), &self.libraries(), &self.environ())
    }

    /// Add a second library folder and register it in libraryfolders.vdf
    pub fn add_library(&self) -> PathBuf {
        let mut libraries = self.extra_libraries.borrow_mut();
        let library = self.home.join(format!("library{}", libraries.len() + 1));
        fs::create_dir_all(library.join("steamapps/common")).unwrap();
        libraries.push(library.clone());

        let mut folders = VdfMap::new();
        folders.insert(
            "0".to_string(),
            map([("path", string(&self.steam_path.to_string_lossy()))]),
        );
        for (i, path) in libraries.iter().enumerate() {
            folders.insert(
                (i + 1).to_string(),
                map([("path", string(&path.to_string_lossy()))]),
            );
        }
        let root: VdfMap = [("libraryfolders".to_string(), VdfValue::Map(folders))]
            .into_iter()
            .collect();
        fs::write(
            self.steam_path.join("steamapps/libraryfolders.vdf"),
            encode_text(&root),
        )
        .unwrap();

        library
    }

    /// A Windows game that has been launched once
    pub fn add_app(&self, appid: u32, name: &str) -> PathBuf {
        let install_path = write_manifest(&self.steam_path, appid, name);
        let compat_data = self
            .steam_path
            .join("steamapps/compatdata")
            .join(appid.to_string());
        fs::create_dir_all(compat_data.join("pfx")).unwrap();
        fs::write(compat_data.join("pfx.lock"), "").unwrap();
        install_path
    }

    /// A Proton release installed as a Steam app
    pub fn add_proton(&self, appid: u32, name: &str, required_tool: Option<u32>) -> PathBuf {
        let install_path = write_manifest(&self.steam_path, appid, name);
        write_proton_tree(&install_path, required_tool);
        install_path
    }

    /// A containerized Steam Runtime installed as a Steam app
    pub fn add_runtime(&self, appid: u32, name: &str) -> PathBuf {
        let install_path = write_manifest(&self.steam_path, appid, name);
        write_tool_manifest(&install_path, None);
        fs::write(install_path.join("run"), "#!/bin/sh\n").unwrap();
        let files = install_path.join("soldier_platform_0.20210309.0/files");
        for dir in ["lib/i386-linux-gnu", "lib/x86_64-linux-gnu"] {
            fs::create_dir_all(files.join(dir)).unwrap();
        }
        install_path
    }

    /// A Proton build in `compatibilitytools.d`
    pub fn add_custom_proton(&self, name: &str) -> PathBuf {
        let install_path = self.steam_root.join("compatibilitytools.d").join(name);
        fs::create_dir_all(&install_path).unwrap();
        let root: VdfMap = [(
            "compatibilitytools".to_string(),
            map([(
                "compat_tools",
                map([(
                    name,
                    map([
                        ("install_path", string(".")),
                        ("display_name", string(name)),
                        ("from_oslist", string("windows")),
                        ("to_oslist", string("linux")),
                    ]),
                )]),
            )]),
        )]
        .into_iter()
        .collect();
        fs::write(install_path.join("compatibilitytool.vdf"), encode_text(&root)).unwrap();
        write_proton_tree(&install_path, None);
        install_path
    }

    fn write_config(&self) {
        let entries: VdfMap = self
            .tool_mapping
            .borrow()
            .iter()
            .map(|(key, name)| (key.clone(), map([("name", string(name))])))
            .collect();
        let root: VdfMap = [(
            "InstallConfigStore".to_string(),
            map([(
                "Software",
                map([(
                    "Valve",
                    map([("Steam", map([("CompatToolMapping", VdfValue::Map(entries))]))]),
                )]),
            )]),
        )]
        .into_iter()
        .collect();
        fs::write(self.steam_path.join("config/config.vdf"), encode_text(&root)).unwrap();
    }

    fn set_mapping(&self, key: String, name: &str) {
        {
            let mut mapping = self.tool_mapping.borrow_mut();
            mapping.retain(|(k, _)| *k != key);
            mapping.push((key, name.to_string()));
        }
        self.write_config();
    }

    pub fn set_default_tool(&self, name: &str) {
        self.set_mapping("0".to_string(), name);
    }

    pub fn set_app_tool(&self, appid: u32, name: &str) {
        self.set_mapping(appid.to_string(), name);
    }

    /// Write appcache/appinfo.vdf with Steam's built-in tool names
    pub fn write_appinfo(&self, tools: &[(&str, u32, Option<&str>)]) {
        let data = appinfo_v27(&[(891390, compat_tools_payload(tools))]);
        fs::write(self.steam_path.join("appcache/appinfo.vdf"), data).unwrap();
    }
}
