use std::{path::PathBuf, sync::LazyLock};

/// `$XDG_CACHE_HOME/protonkit`, holding the helper-script cache
pub static DEFAULT_CACHE_PATH: LazyLock<PathBuf> = LazyLock::new(|| {
    let mut path = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .unwrap_or_default();
    path.push("protonkit");
    path
});

/// `$XDG_CONFIG_HOME/protonkit`
pub static DEFAULT_CONFIG_PATH: LazyLock<PathBuf> = LazyLock::new(|| {
    let mut path = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_default();
    path.push("protonkit");
    path
});

/// Computes a path under the protonkit cache directory.
///
/// Returns a `&Path` referencing the cache directory itself if no arguments are passed in, or a
/// `PathBuf` created by joining all of the arguments to the cache directory otherwise.
///
/// # Examples
///
/// ```
/// use protonkit::cache_path;
///
/// assert!(cache_path!().ends_with("protonkit"));
/// assert!(cache_path!("proton", "Proton 8.0").ends_with("protonkit/proton/Proton 8.0"));
/// ```
#[macro_export]
macro_rules! cache_path {
    () => {
        $crate::paths::DEFAULT_CACHE_PATH.as_path()
    };

    ( $( $path:expr ),+ $(,)? ) => {
        [
            $crate::paths::DEFAULT_CACHE_PATH.as_path(),
            $( std::path::Path::new(&$path) ),+
        ].into_iter().collect::<std::path::PathBuf>()
    };
}

/// Same as [`cache_path!`] for the config directory
#[macro_export]
macro_rules! config_path {
    () => {
        $crate::paths::DEFAULT_CONFIG_PATH.as_path()
    };

    ( $( $path:expr ),+ $(,)? ) => {
        [
            $crate::paths::DEFAULT_CONFIG_PATH.as_path(),
            $( std::path::Path::new(&$path) ),+
        ].into_iter().collect::<std::path::PathBuf>()
    };
}
