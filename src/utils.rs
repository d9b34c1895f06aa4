//! Shared utility functions used across the application

use std::collections::BTreeMap;
use std::env;
use std::path::{Component, Path, PathBuf};

// ============================================================================
// Environment Snapshot
// ============================================================================

/// Immutable copy of the process environment.
///
/// Everything that reads environment variables takes one of these, so the
/// real process environment is only read once at startup and never written.
#[derive(Debug, Clone, Default)]
pub struct Environ {
    vars: BTreeMap<String, String>,
}

impl Environ {
    /// Snapshot the current process environment
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Value of a variable that is set and not empty
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    /// `1`, `true`, `yes` and `on` (any case) are true
    pub fn flag(&self, name: &str) -> bool {
        matches!(
            self.get(name)
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
                .as_str(),
            "1" | "true" | "yes" | "on"
        )
    }

    /// Set a variable in the snapshot (tests and launch wrappers)
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn home(&self) -> PathBuf {
        self.get_non_empty("HOME")
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ============================================================================
// Path Helpers
// ============================================================================

/// Find an executable in `$PATH`
pub fn find_in_path(environ: &Environ, binary: &str) -> Option<PathBuf> {
    let path = environ.get("PATH")?;
    env::split_paths(path)
        .map(|entry| entry.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Resolve symlinks when the path exists, otherwise clean it up lexically
pub fn resolve_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| normalize_path(path))
}

/// Lexically remove `.` and `..` components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Expand a leading `~` to the home directory
pub fn expand_user(path: &str, home: &Path) -> PathBuf {
    if path == "~" {
        return home.to_path_buf();
    }
    match path.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Prepend entries to a colon-separated search path
pub fn prepend_path_list(first: &str, rest: Option<&str>) -> String {
    match rest {
        Some(rest) if !rest.is_empty() => format!("{first}:{rest}"),
        _ => first.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environ_flags() {
        let environ = Environ::from_pairs([("A", "1"), ("B", " Yes "), ("C", "0"), ("D", "")]);
        assert!(environ.flag("A"));
        assert!(environ.flag("B"));
        assert!(!environ.flag("C"));
        assert!(!environ.flag("D"));
        assert!(!environ.flag("MISSING"));
        assert_eq!(environ.get_non_empty("D"), None);
        assert_eq!(environ.get("D"), Some(""));
    }

    #[test]
    fn test_normalize_and_expand() {
        assert_eq!(
            normalize_path(Path::new("/mnt/./games/../SSD_A/")),
            PathBuf::from("/mnt/SSD_A")
        );
        let home = Path::new("/home/user");
        assert_eq!(expand_user("~/Games", home), PathBuf::from("/home/user/Games"));
        assert_eq!(expand_user("~", home), PathBuf::from("/home/user"));
        assert_eq!(expand_user("/opt/x", home), PathBuf::from("/opt/x"));
    }

    #[test]
    fn test_find_in_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("winetricks"), "#!/bin/sh\n").unwrap();
        let environ = Environ::from_pairs([(
            "PATH".to_string(),
            format!("/nonexistent:{}", dir.path().display()),
        )]);
        assert_eq!(
            find_in_path(&environ, "winetricks"),
            Some(dir.path().join("winetricks"))
        );
        assert_eq!(find_in_path(&environ, "yad"), None);
    }

    #[test]
    fn test_prepend_path_list() {
        assert_eq!(prepend_path_list("/a", Some("/b:/c")), "/a:/b:/c");
        assert_eq!(prepend_path_list("/a", Some("")), "/a");
        assert_eq!(prepend_path_list("/a", None), "/a");
    }
}
