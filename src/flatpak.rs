//! Flatpak sandbox detection
//!
//! When running inside Flatpak, `/.flatpak-info` describes the sandbox: the
//! Flatpak version (needed to decide whether bwrap can be nested) and the
//! filesystem permissions, which decide which Steam library folders are
//! reachable at all.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::logging::{log_debug, log_warning};
use crate::utils::{expand_user, resolve_path};

pub const FLATPAK_INFO_PATH: &str = "/.flatpak-info";

/// First Flatpak release that allows bwrap inside the sandbox
pub const FLATPAK_BWRAP_COMPATIBLE_VERSION: [u32; 3] = [1, 12, 1];

/// `xdg-*` permission tokens resolved with `xdg-user-dir`
const XDG_USER_DIRS: &[(&str, &str)] = &[
    ("xdg-desktop", "DESKTOP"),
    ("xdg-documents", "DOCUMENTS"),
    ("xdg-download", "DOWNLOAD"),
    ("xdg-music", "MUSIC"),
    ("xdg-pictures", "PICTURES"),
    ("xdg-public-share", "PUBLICSHARE"),
    ("xdg-videos", "VIDEOS"),
    ("xdg-templates", "TEMPLATES"),
];

pub fn is_flatpak() -> bool {
    Path::new(FLATPAK_INFO_PATH).exists()
}

// ============================================================================
// Instance Descriptor
// ============================================================================

/// Parsed `/.flatpak-info` (an ini file)
#[derive(Debug, Clone, Default)]
pub struct FlatpakInfo {
    sections: HashMap<String, HashMap<String, String>>,
}

impl FlatpakInfo {
    /// `None` when the file doesn't exist, i.e. not running in a sandbox
    pub fn load(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        Some(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = name.to_string();
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                sections
                    .entry(current.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Self { sections }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    /// `[Instance] flatpak-version` as numbers, e.g. `[1, 12, 1]`
    pub fn version(&self) -> Option<Vec<u32>> {
        let raw = self.get("Instance", "flatpak-version")?;
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        cleaned
            .split('.')
            .filter(|part| !part.is_empty())
            .map(|part| part.parse().ok())
            .collect::<Option<Vec<u32>>>()
            .filter(|parts| !parts.is_empty())
    }

    /// Permission tokens of `[Context] filesystems`
    pub fn filesystems(&self) -> Option<Vec<String>> {
        self.get("Context", "filesystems").map(split_filesystems)
    }
}

/// Split on `;` except where escaped as `\;`
fn split_filesystems(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&';') => {
                current.push(';');
                chars.next();
            }
            ';' => tokens.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    tokens.push(current);
    tokens
}

/// Running Flatpak version, `None` outside a sandbox
pub fn get_running_flatpak_version() -> Option<Vec<u32>> {
    FlatpakInfo::load(Path::new(FLATPAK_INFO_PATH))?.version()
}

/// Whether bwrap can be used with the given Flatpak version
pub fn is_bwrap_compatible(version: &[u32]) -> bool {
    version >= &FLATPAK_BWRAP_COMPATIBLE_VERSION[..]
}

// ============================================================================
// Filesystem Permissions
// ============================================================================

/// Lookup for user directories such as `DOWNLOAD`
pub trait XdgUserDirs {
    fn user_dir(&self, name: &str) -> Option<PathBuf>;
}

/// Asks the `xdg-user-dir` helper
pub struct XdgUserDirCommand;

impl XdgUserDirs for XdgUserDirCommand {
    fn user_dir(&self, name: &str) -> Option<PathBuf> {
        let output = Command::new("xdg-user-dir").arg(name).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Grant {
    Everything,
    Path(PathBuf),
}

fn grant_for_token(token: &str, home: &Path, xdg: &dyn XdgUserDirs) -> Option<Grant> {
    // Access mode suffixes don't change what is visible
    let token = ["ro", "rw", "create"]
        .iter()
        .find_map(|mode| token.strip_suffix(&format!(":{mode}")))
        .unwrap_or(token);

    if token.is_empty() {
        return None;
    }
    if token == "host" {
        return Some(Grant::Everything);
    }
    if token == "home" {
        return Some(Grant::Path(home.to_path_buf()));
    }

    for (prefix, base) in [
        ("xdg-data", ".local/share"),
        ("xdg-config", ".config"),
        ("xdg-cache", ".cache"),
    ] {
        if token == prefix {
            return Some(Grant::Path(home.join(base)));
        }
        if let Some(rest) = token.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
            return Some(Grant::Path(home.join(base).join(rest)));
        }
    }

    for (prefix, name) in XDG_USER_DIRS {
        let rest = match token.strip_prefix(prefix) {
            Some("") => "",
            Some(rest) if rest.starts_with('/') => &rest[1..],
            _ => continue,
        };
        let Some(dir) = xdg.user_dir(name) else {
            log_warning(&format!("Could not resolve Flatpak permission '{token}'"));
            return None;
        };
        return Some(Grant::Path(dir.join(rest)));
    }

    if token.starts_with('/') {
        return Some(Grant::Path(PathBuf::from(token)));
    }
    if token.starts_with('~') {
        return Some(Grant::Path(expand_user(token, home)));
    }

    log_warning(&format!("Unknown Flatpak file system permission '{token}', ignoring."));
    None
}

/// Paths granted by the descriptor; `None` means there is nothing to check
fn granted_paths(info: &FlatpakInfo, home: &Path, xdg: &dyn XdgUserDirs) -> Option<Vec<PathBuf>> {
    let Some(tokens) = info.filesystems() else {
        log_warning("Flatpak info file has no file system permissions listed, skipping the access check");
        return None;
    };

    let mut paths = Vec::new();
    for token in tokens {
        match grant_for_token(&token, home, xdg) {
            Some(Grant::Everything) => return None,
            Some(Grant::Path(path)) => paths.push(resolve_path(&path)),
            None => {}
        }
    }
    Some(paths)
}

/// Candidates not under any path granted by `info`
pub fn inaccessible_paths(
    info: &FlatpakInfo,
    candidates: &[PathBuf],
    home: &Path,
    xdg: &dyn XdgUserDirs,
) -> Vec<PathBuf> {
    let Some(granted) = granted_paths(info, home, xdg) else {
        return Vec::new();
    };
    log_debug(&format!("Flatpak grants access to {:?}", granted));

    candidates
        .iter()
        .filter(|candidate| {
            let resolved = resolve_path(candidate);
            !granted.iter().any(|g| resolved.starts_with(g))
        })
        .cloned()
        .collect()
}

/// Which of `candidates` the running Flatpak sandbox can't see. Empty when
/// not sandboxed.
pub fn get_inaccessible_paths(candidates: &[PathBuf], home: &Path) -> Vec<PathBuf> {
    let Some(info) = FlatpakInfo::load(Path::new(FLATPAK_INFO_PATH)) else {
        return Vec::new();
    };
    inaccessible_paths(&info, candidates, home, &XdgUserDirCommand)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeXdg;

    impl XdgUserDirs for FakeXdg {
        fn user_dir(&self, name: &str) -> Option<PathBuf> {
            match name {
                "DOWNLOAD" => Some(PathBuf::from("/home/user/Downloads")),
                _ => None,
            }
        }
    }

    fn info(filesystems: &str) -> FlatpakInfo {
        FlatpakInfo::parse(&format!(
            "[Application]\nname=com.github.protonkit\n\n[Instance]\nflatpak-version=1.12.1\n\n[Context]\nshared=network;ipc;\nfilesystems={filesystems}\n"
        ))
    }

    #[test]
    fn test_version() {
        assert_eq!(info("").version(), Some(vec![1, 12, 1]));
        let info = FlatpakInfo::parse("[Instance]\nflatpak-version=1.14.4-rc1\n");
        assert_eq!(info.version(), Some(vec![1, 14, 41]));
        assert_eq!(FlatpakInfo::parse("[Instance]\n").version(), None);
    }

    #[test]
    fn test_bwrap_compatible() {
        assert!(is_bwrap_compatible(&[1, 12, 1]));
        assert!(is_bwrap_compatible(&[1, 14]));
        assert!(!is_bwrap_compatible(&[1, 12]));
        assert!(!is_bwrap_compatible(&[1, 10, 7]));
    }

    #[test]
    fn test_split_escaped_semicolon() {
        assert_eq!(
            split_filesystems(r"/mnt/a\;b;/mnt/c;"),
            vec!["/mnt/a;b", "/mnt/c", ""]
        );
    }

    #[test]
    fn test_inaccessible_paths() {
        let home = tempfile::tempdir().unwrap();
        let home = home.path();
        let info = info("/mnt/SSD_A;/mnt/SSD_B;xdg-data/Steam;");

        let candidates = vec![
            PathBuf::from("/mnt/SSD_A"),
            PathBuf::from("/mnt/SSD_C"),
            home.join(".local/share/Steam/steamapps"),
            home.join(".local/share/SteamOld"),
        ];
        assert_eq!(
            inaccessible_paths(&info, &candidates, home, &FakeXdg),
            vec![
                PathBuf::from("/mnt/SSD_C"),
                home.join(".local/share/SteamOld")
            ]
        );
    }

    #[test]
    fn test_host_grants_everything() {
        let info = info("/mnt/SSD_A;host;unknown-token;");
        let candidates = vec![PathBuf::from("/mnt/SSD_C")];
        assert!(inaccessible_paths(&info, &candidates, Path::new("/home/user"), &FakeXdg).is_empty());
    }

    #[test]
    fn test_tokens() {
        let home = Path::new("/home/user");
        assert_eq!(
            grant_for_token("home", home, &FakeXdg),
            Some(Grant::Path(home.to_path_buf()))
        );
        assert_eq!(
            grant_for_token("xdg-download/Games:ro", home, &FakeXdg),
            Some(Grant::Path(PathBuf::from("/home/user/Downloads/Games")))
        );
        assert_eq!(
            grant_for_token("~/Games:create", home, &FakeXdg),
            Some(Grant::Path(PathBuf::from("/home/user/Games")))
        );
        assert_eq!(grant_for_token("xdg-music", home, &FakeXdg), None);
        assert_eq!(grant_for_token("", home, &FakeXdg), None);
        assert_eq!(grant_for_token("xdg-run/foo", home, &FakeXdg), None);
    }

    #[test]
    fn test_missing_filesystems_skips_check() {
        let info = FlatpakInfo::parse("[Instance]\nflatpak-version=1.12.1\n");
        let candidates = vec![PathBuf::from("/mnt/SSD_A")];
        assert!(inaccessible_paths(&info, &candidates, Path::new("/home/user"), &FakeXdg).is_empty());
    }
}
