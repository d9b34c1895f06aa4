//! Compatibility tools installed outside of Steam (GE-Proton and friends)

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use super::apps::{read_required_tool_appid, SteamApp};
use crate::logging::{log_info, log_warning};
use crate::utils::Environ;
use crate::vdf::{decode_text, VdfMapExt, VdfValue};

/// System-wide tool directories, lowest precedence first
const SYSTEM_COMPAT_TOOL_DIRS: &[&str] = &[
    "/usr/share/steam/compatibilitytools.d",
    "/usr/local/share/steam/compatibilitytools.d",
];

/// Directories searched for tools, lowest precedence first
pub fn get_compat_tool_dirs(steam_root: &Path, environ: &Environ) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = SYSTEM_COMPAT_TOOL_DIRS.iter().map(PathBuf::from).collect();
    if let Some(extra) = environ.get_non_empty("STEAM_EXTRA_COMPAT_TOOLS_PATHS") {
        dirs.extend(extra.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
    }
    dirs.push(steam_root.join("compatibilitytools.d"));
    dirs
}

fn descriptor_paths(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path().join("compatibilitytool.vdf"))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let top_level = dir.join("compatibilitytool.vdf");
    if top_level.is_file() {
        paths.push(top_level);
    }
    paths
}

/// Parse one compatibilitytool.vdf. `None` for tools that aren't
/// Windows-to-Linux or can't be read.
fn read_descriptor(dir: &Path, vdf_path: &Path) -> Option<SteamApp> {
    let content = fs::read_to_string(vdf_path).ok()?;
    let root = match decode_text(&content) {
        Ok(root) => root,
        Err(e) => {
            log_warning(&format!(
                "Compatibility tool declaration at {} is corrupted ({}). \
                 You may need to reinstall the application.",
                vdf_path.display(),
                e
            ));
            return None;
        }
    };

    let tools = root
        .lookup(&["compatibilitytools", "compat_tools"])
        .and_then(VdfValue::as_map)?;
    let (name, info) = tools.first()?;

    if info.get_str("from_oslist") != Some("windows") || info.get_str("to_oslist") != Some("linux")
    {
        return None;
    }

    // "." when the descriptor sits inside the tool's own directory
    let install_path = match info.get_str("install_path").unwrap_or(".") {
        "." => vdf_path.parent().unwrap_or(dir).to_path_buf(),
        relative => dir.join(relative),
    };

    let required_tool_appid = match read_required_tool_appid(&install_path) {
        Ok(appid) => appid,
        Err(e) => {
            log_warning(&format!(
                "Tool manifest for {name} is empty or corrupted ({e}). \
                 You may need to reinstall the application."
            ));
            return None;
        }
    };

    Some(SteamApp {
        appid: None,
        name: name.clone(),
        install_path,
        required_tool_appid,
        ..Default::default()
    })
}

/// Tools found in `dirs`; a later directory replaces an earlier tool of the same name
pub fn find_compat_tools_in_dirs(dirs: &[PathBuf]) -> Vec<SteamApp> {
    let mut tools: IndexMap<String, SteamApp> = IndexMap::new();

    for dir in dirs.iter().filter(|d| d.is_dir()) {
        for vdf_path in descriptor_paths(dir) {
            if let Some(tool) = read_descriptor(dir, &vdf_path) {
                if tools.contains_key(&tool.name) {
                    log_info(&format!(
                        "Compatibility tool {} in {} overrides an earlier installation",
                        tool.name,
                        dir.display()
                    ));
                }
                tools.insert(tool.name.clone(), tool);
            }
        }
    }

    tools.into_values().collect()
}

pub fn get_custom_compat_tool_installations(steam_root: &Path, environ: &Environ) -> Vec<SteamApp> {
    find_compat_tools_in_dirs(&get_compat_tool_dirs(steam_root, environ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tool(dir: &Path, folder: &str, name: &str, install_path: &str, to_os: &str) -> PathBuf {
        let tool_dir = dir.join(folder);
        fs::create_dir_all(&tool_dir).unwrap();
        fs::write(
            tool_dir.join("compatibilitytool.vdf"),
            format!(
                r#"
"compatibilitytools"
{{
  "compat_tools"
  {{
    "{name}"
    {{
      "install_path" "{install_path}"
      "display_name" "{name} (custom)"
      "from_oslist"  "windows"
      "to_oslist"    "{to_os}"
    }}
  }}
}}
"#
            ),
        )
        .unwrap();
        tool_dir
    }

    #[test]
    fn test_dirs_precedence() {
        let environ = Environ::from_pairs([("STEAM_EXTRA_COMPAT_TOOLS_PATHS", "/opt/a:/opt/b")]);
        let dirs = get_compat_tool_dirs(Path::new("/steam"), &environ);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/usr/share/steam/compatibilitytools.d"),
                PathBuf::from("/usr/local/share/steam/compatibilitytools.d"),
                PathBuf::from("/opt/a"),
                PathBuf::from("/opt/b"),
                PathBuf::from("/steam/compatibilitytools.d"),
            ]
        );
    }

    #[test]
    fn test_find_tools() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("compatibilitytools.d");
        let ge = write_tool(&dir, "GE-Proton8-1", "GE-Proton8-1", ".", "linux");
        write_tool(&dir, "Boxtron", "Boxtron", ".", "linux-dosbox");

        // Descriptor next to the tool directory
        fs::create_dir_all(dir.join("Other")).unwrap();
        fs::write(
            dir.join("compatibilitytool.vdf"),
            r#""compatibilitytools" { "compat_tools" { "Other Proton" { "install_path" "Other" "from_oslist" "windows" "to_oslist" "linux" } } }"#,
        )
        .unwrap();

        let tools = find_compat_tools_in_dirs(&[dir.clone()]);
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["GE-Proton8-1", "Other Proton"]);
        assert_eq!(tools[0].install_path, ge);
        assert_eq!(tools[0].appid, None);
        assert_eq!(tools[1].install_path, dir.join("Other"));
    }

    #[test]
    fn test_later_dir_overrides() {
        let root = tempfile::tempdir().unwrap();
        let system = root.path().join("system");
        let user = root.path().join("user");
        write_tool(&system, "proton", "Custom Proton", ".", "linux");
        let preferred = write_tool(&user, "proton", "Custom Proton", ".", "linux");

        let tools = find_compat_tools_in_dirs(&[system, user]);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].install_path, preferred);
    }

    #[test]
    fn test_corrupt_descriptor_and_manifest_skipped() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().to_path_buf();
        fs::create_dir_all(dir.join("broken")).unwrap();
        fs::write(dir.join("broken/compatibilitytool.vdf"), "\"compatibilitytools\" {").unwrap();
        let tool = write_tool(&dir, "tool", "Needs runtime", ".", "linux");
        fs::write(tool.join("toolmanifest.vdf"), "").unwrap();

        assert!(find_compat_tools_in_dirs(&[dir]).is_empty());
    }

    #[test]
    fn test_required_tool_appid() {
        let root = tempfile::tempdir().unwrap();
        let tool = write_tool(root.path(), "tool", "Needs runtime", ".", "linux");
        fs::write(
            tool.join("toolmanifest.vdf"),
            "\"manifest\"\n{\n\"commandline\" \"/proton %verb%\"\n\"require_tool_appid\" \"1628350\"\n}\n",
        )
        .unwrap();

        let tools = find_compat_tools_in_dirs(&[root.path().to_path_buf()]);
        assert_eq!(tools[0].required_tool_appid, Some(1628350));
    }
}
