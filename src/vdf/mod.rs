//! Valve KV ("VDF") formats
//!
//! Hand-rolled codecs for the text format (appmanifest_*.acf, config.vdf,
//! libraryfolders.vdf, compatibilitytool.vdf), the binary format
//! (shortcuts.vdf) and the appinfo.vdf record container.

mod appinfo;
mod binary;
mod text;

pub use appinfo::{AppInfo, AppInfoEntry};
pub use binary::decode_binary;
pub use text::{decode_text, encode_text};

#[cfg(test)]
pub(crate) use appinfo::test_support as appinfo_test_support;
#[cfg(test)]
pub(crate) use binary::test_support;

use indexmap::IndexMap;

/// Ordered key/value map; keeps file order so encoding is stable
pub type VdfMap = IndexMap<String, VdfValue>;

/// A KV value. The text format only produces `String` and `Map`.
#[derive(Debug, Clone, PartialEq)]
pub enum VdfValue {
    String(String),
    Int(i64),
    Float(f32),
    Map(VdfMap),
}

impl VdfValue {
    /// Get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VdfValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as map reference
    pub fn as_map(&self) -> Option<&VdfMap> {
        match self {
            VdfValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Integer value, parsing strings since the text format stores numbers as strings
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            VdfValue::Int(i) => Some(*i),
            VdfValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().and_then(|i| u32::try_from(i).ok())
    }

    /// Get a nested value by key, ignoring ASCII case
    pub fn get(&self, key: &str) -> Option<&VdfValue> {
        self.as_map()?.get_ci(key)
    }

    /// Get a string value by key, ignoring ASCII case
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }
}

/// Case-insensitive lookups. Steam is inconsistent about key case
/// (`AppState`/`appstate`, `CompatToolMapping`/`compattoolmapping`).
pub trait VdfMapExt {
    fn get_ci(&self, key: &str) -> Option<&VdfValue>;

    /// Follow a path of keys through nested maps
    fn lookup(&self, path: &[&str]) -> Option<&VdfValue>;
}

impl VdfMapExt for VdfMap {
    fn get_ci(&self, key: &str) -> Option<&VdfValue> {
        self.get(key).or_else(|| {
            self.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    fn lookup(&self, path: &[&str]) -> Option<&VdfValue> {
        let (first, rest) = path.split_first()?;
        let mut value = self.get_ci(first)?;
        for key in rest {
            value = value.get(key)?;
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let root = decode_text(
            r#""InstallConfigStore" { "Software" { "Valve" { "Steam" { "CompatToolMapping" { } } } } }"#,
        )
        .unwrap();
        let mapping = root.lookup(&[
            "installconfigstore",
            "software",
            "valve",
            "steam",
            "compattoolmapping",
        ]);
        assert!(mapping.and_then(VdfValue::as_map).is_some());
        assert!(root.lookup(&["installconfigstore", "missing"]).is_none());
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(VdfValue::String(" 228980 ".into()).as_u32(), Some(228980));
        assert_eq!(VdfValue::Int(-1).as_u32(), None);
        assert_eq!(VdfValue::Int(-1).as_i64(), Some(-1));
        assert_eq!(VdfValue::Map(VdfMap::new()).as_i64(), None);
    }
}
