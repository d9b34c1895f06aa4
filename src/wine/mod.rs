//! Wine/Proton runtime environment
//!
//! Builds the environment overlay for running Wine tools with a Proton
//! build, optionally through the Steam Runtime, and runs commands in it.

mod bin_dir;
mod env;
mod launcher;
mod locale;
mod run;
mod runtime;

pub use bin_dir::{create_wine_bin_dir, ScriptMode, LAUNCHER_SCRIPT};
pub use env::{
    resolve_use_bwrap, EnvironmentBuilder, HostProbe, RunOptions, RuntimeEnvironment, SystemHost,
};
pub use launcher::LauncherService;
pub use locale::{is_steam_deck, locale_fixes};
pub use run::{run_command, CommandSpec, RunSettings};
pub use runtime::{detect_extra_mounts, find_runtime_root, SUPPORTED_STEAM_RUNTIMES};

#[cfg(test)]
pub(crate) use env::test_support;
