//! Locale fixes for Steam Deck
//!
//! SteamOS ships very few locales. A `LANG` the system can't provide makes
//! Wine tools crash, so unavailable values are replaced before running.

use std::fs;
use std::process::Command;

use crate::logging::{log_info, os_release_value};
use crate::utils::Environ;

const DMI_PRODUCT_NAME: &str = "/sys/class/dmi/id/product_name";

/// DMI product names of Steam Deck models
const STEAM_DECK_PRODUCTS: &[&str] = &["Jupiter", "Galileo"];

/// POSIX and glibc locale categories; other `LC_*` variables are not locales
const LOCALE_VARIABLES: &[&str] = &[
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "LC_NUMERIC",
    "LC_TIME",
    "LC_COLLATE",
    "LC_MONETARY",
    "LC_MESSAGES",
    "LC_PAPER",
    "LC_NAME",
    "LC_ADDRESS",
    "LC_TELEPHONE",
    "LC_MEASUREMENT",
    "LC_IDENTIFICATION",
];

pub fn is_steam_deck() -> bool {
    let product = fs::read_to_string(DMI_PRODUCT_NAME).unwrap_or_default();
    if STEAM_DECK_PRODUCTS.contains(&product.trim()) {
        return true;
    }
    os_release_value("VARIANT_ID").as_deref() == Some("steamdeck")
}

/// Output of `locale -a`
pub fn available_locales() -> Vec<String> {
    Command::new("locale")
        .arg("-a")
        .output()
        .map(|out| {
            String::from_utf8_lossy(&out.stdout)
                .lines()
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `en_US.UTF-8` and `en_US.utf8` name the same locale
fn normalize_locale(name: &str) -> String {
    match name.split_once('.') {
        Some((language, codeset)) => {
            let codeset: String = codeset
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .flat_map(|c| c.to_lowercase())
                .collect();
            format!("{language}.{codeset}")
        }
        None => name.to_string(),
    }
}

/// Locale variables whose values aren't installed, with their replacement.
///
/// Returns `(variable, old value, new value)` for every change.
pub fn locale_fixes(environ: &Environ, available: &[String]) -> Vec<(String, String, String)> {
    let available: Vec<String> = available.iter().map(|l| normalize_locale(l)).collect();
    let is_available = |name: &str| available.contains(&normalize_locale(name));

    let fallback = if is_available("en_US.UTF-8") {
        "en_US.UTF-8"
    } else {
        "C.UTF-8"
    };

    environ
        .iter()
        .filter(|&(name, _)| LOCALE_VARIABLES.contains(&name))
        .filter(|&(_, value)| !value.is_empty() && !is_available(value))
        .map(|(name, value)| (name.to_string(), value.to_string(), fallback.to_string()))
        .collect()
}

pub fn log_locale_fixes(fixes: &[(String, String, String)]) {
    for (name, old, new) in fixes {
        log_info(&format!(
            "{name}={old} is not available on this system, using {name}={new} instead"
        ));
    }
}
