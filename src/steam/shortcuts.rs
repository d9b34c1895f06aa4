//! Non-Steam game shortcuts
//!
//! Reads the binary shortcuts.vdf of the most recently logged in user and
//! turns every shortcut that already has a Proton prefix into a `SteamApp`.

use std::fs;
use std::path::{Path, PathBuf};

use super::apps::SteamApp;
use crate::logging::{log_info, log_warning};
use crate::vdf::{decode_binary, decode_text, VdfMap, VdfMapExt, VdfValue};

/// Marks IDs Steam generates for non-Steam games
const SHORTCUT_ID_BIT: u32 = 0x8000_0000;

const CRC32_TABLE: [u32; 256] = build_crc32_table();

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

pub(crate) fn crc32(data: &[u8]) -> u32 {
    !data.iter().fold(!0u32, |crc, &byte| {
        CRC32_TABLE[((crc ^ u32::from(byte)) & 0xff) as usize] ^ (crc >> 8)
    })
}

/// ID Steam gives a shortcut that has no stored `appid`
pub fn shortcut_appid(exe: &str, app_name: &str) -> u32 {
    crc32(format!("{exe}{app_name}").as_bytes()) | SHORTCUT_ID_BIT
}

/// A non-Steam game shortcut
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shortcut {
    pub appid: u32,
    pub app_name: String,
    pub exe: String,
    pub start_dir: String,
}

impl Shortcut {
    fn from_entry(entry: &VdfValue) -> Option<Self> {
        let app_name = entry.get_str("AppName")?.to_string();
        let exe = entry.get_str("Exe").unwrap_or_default().to_string();
        let start_dir = entry.get_str("StartDir").unwrap_or_default().to_string();

        // Older shortcuts.vdf files don't store the ID
        let appid = match entry.get("appid").and_then(VdfValue::as_i64) {
            Some(id) => (id & 0xffff_ffff) as u32,
            None => shortcut_appid(&exe, &app_name),
        };

        Some(Self {
            appid,
            app_name,
            exe,
            start_dir,
        })
    }

    /// All shortcuts in a decoded shortcuts.vdf
    pub fn parse_all(root: &VdfMap) -> Vec<Self> {
        root.get_ci("shortcuts")
            .and_then(VdfValue::as_map)
            .map(|entries| entries.values().filter_map(Self::from_entry).collect())
            .unwrap_or_default()
    }

    fn into_app(self, steam_path: &Path) -> SteamApp {
        let install_path = PathBuf::from(self.start_dir.trim_matches('"'));
        let prefix_path = steam_path
            .join("steamapps/compatdata")
            .join(self.appid.to_string())
            .join("pfx");

        SteamApp {
            appid: Some(self.appid),
            name: format!("Non-Steam shortcut: {}", self.app_name),
            install_path,
            prefix_path: Some(prefix_path),
            ..Default::default()
        }
    }
}

/// SteamID3 of the user who logged in most recently, from loginusers.vdf
pub fn find_current_steamid3(steam_path: &Path) -> Option<u32> {
    let path = steam_path.join("config/loginusers.vdf");
    let content = fs::read_to_string(&path).ok()?;
    let root = match decode_text(&content) {
        Ok(root) => root,
        Err(e) => {
            log_warning(&format!("Could not parse {}: {}", path.display(), e));
            return None;
        }
    };

    let users = root.get_ci("users")?.as_map()?;
    let (steamid64, _) = users
        .iter()
        .filter_map(|(steamid, user)| {
            let steamid: u64 = steamid.parse().ok()?;
            let timestamp = user.get("Timestamp").and_then(VdfValue::as_i64).unwrap_or(0);
            Some((steamid, timestamp))
        })
        .max_by_key(|(_, timestamp)| *timestamp)?;

    Some((steamid64 & 0xffff_ffff) as u32)
}

/// Shortcuts that have been launched with Proton at least once
pub fn get_custom_windows_shortcuts(steam_path: &Path) -> Vec<SteamApp> {
    let Some(steamid3) = find_current_steamid3(steam_path) else {
        log_info("Could not determine the current Steam user, skipping non-Steam shortcuts");
        return Vec::new();
    };

    let path = steam_path
        .join("userdata")
        .join(steamid3.to_string())
        .join("config/shortcuts.vdf");
    let Ok(data) = fs::read(&path) else {
        log_info(&format!("No shortcuts file found at {}", path.display()));
        return Vec::new();
    };

    let root = match decode_binary(&data) {
        Ok(root) => root,
        Err(e) => {
            log_warning(&format!(
                "Could not parse {}: {}. Non-Steam shortcuts are ignored.",
                path.display(),
                e
            ));
            return Vec::new();
        }
    };

    Shortcut::parse_all(&root)
        .into_iter()
        .map(|shortcut| shortcut.into_app(steam_path))
        .filter(|app| app.prefix_path.as_deref().is_some_and(Path::is_dir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdf::test_support::BinaryWriter;

    fn write_login_users(steam_path: &Path) {
        fs::create_dir_all(steam_path.join("config")).unwrap();
        fs::write(
            steam_path.join("config/loginusers.vdf"),
            r#"
"users"
{
    "76561198000000001"
    {
        "AccountName"   "old"
        "Timestamp"     "1500000000"
    }
    "76561198000000002"
    {
        "AccountName"   "current"
        "Timestamp"     "1600000000"
    }
}
"#,
        )
        .unwrap();
    }

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_shortcut_appid_sets_top_bit() {
        let id = shortcut_appid("\"/opt/game/game.exe\"", "Game");
        assert!(id & SHORTCUT_ID_BIT != 0);
        assert_eq!(id, shortcut_appid("\"/opt/game/game.exe\"", "Game"));
        assert_ne!(id, shortcut_appid("\"/opt/game/game.exe\"", "Other game"));
    }

    #[test]
    fn test_current_user_is_most_recent() {
        let steam = tempfile::tempdir().unwrap();
        write_login_users(steam.path());
        // 76561198000000002 & 0xffffffff
        assert_eq!(find_current_steamid3(steam.path()), Some(39_734_274));
    }

    #[test]
    fn test_shortcuts_with_prefix_become_apps() {
        let steam = tempfile::tempdir().unwrap();
        let steam_path = steam.path();
        write_login_users(steam_path);

        let mut w = BinaryWriter::new();
        w.begin("shortcuts")
            .begin("0")
            .int("appid", 0x8000_1234)
            .string("AppName", "Test program")
            .string("Exe", "\"/opt/test/test.exe\"")
            .string("StartDir", "\"/opt/test\"")
            .end()
            .begin("1")
            .string("AppName", "Legacy shortcut")
            .string("Exe", "\"/opt/legacy/legacy.exe\"")
            .string("StartDir", "\"/opt/legacy\"")
            .end()
            .begin("2")
            .string("AppName", "Never launched")
            .string("Exe", "\"/opt/new/new.exe\"")
            .end()
            .end()
            .end();
        let config = steam_path.join("userdata/39734274/config");
        fs::create_dir_all(&config).unwrap();
        fs::write(config.join("shortcuts.vdf"), &w.data).unwrap();

        let legacy_id = shortcut_appid("\"/opt/legacy/legacy.exe\"", "Legacy shortcut");
        for id in [0x8000_1234, legacy_id] {
            fs::create_dir_all(steam_path.join(format!("steamapps/compatdata/{id}/pfx"))).unwrap();
        }

        let apps = get_custom_windows_shortcuts(steam_path);
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].appid, Some(0x8000_1234));
        assert_eq!(apps[0].name, "Non-Steam shortcut: Test program");
        assert_eq!(apps[0].install_path, PathBuf::from("/opt/test"));
        assert_eq!(apps[1].appid, Some(legacy_id));
    }

    #[test]
    fn test_corrupt_shortcuts_file() {
        let steam = tempfile::tempdir().unwrap();
        write_login_users(steam.path());
        let config = steam.path().join("userdata/39734274/config");
        fs::create_dir_all(&config).unwrap();
        fs::write(config.join("shortcuts.vdf"), [0x00, b's', 0x00, 0x42]).unwrap();

        assert!(get_custom_windows_shortcuts(steam.path()).is_empty());
    }
}
