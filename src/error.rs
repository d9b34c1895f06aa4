//! Error types
//!
//! `VdfError` covers the KV codecs, `Error` everything a command can fail with.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VdfError {
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("unexpected end of data at offset {0}")]
    Truncated(usize),
    #[error("unknown value type 0x{kind:02x} at offset {offset}")]
    UnknownType { kind: u8, offset: usize },
    #[error("unsupported appinfo.vdf version (magic 0x{0:08x})")]
    UnsupportedVersion(u32),
    #[error("string table index {0} out of range")]
    BadStringIndex(u32),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Steam installation directory could not be found.")]
    InstallationNotFound,

    #[error("No Steam installation was selected.")]
    NoInstallationSelected,

    #[error(
        "Steam app with the given app ID could not be found. \
         Is it installed, Proton compatible and have you launched it at least once? \
         You can search for the app ID using the following command:\n$ protonkit -s <GAME NAME>"
    )]
    AppNotFound(u32),

    #[error(
        "Found no games. You need to launch a game at least once \
         before protonkit can find it."
    )]
    NoApps,

    #[error(
        "Proton installation could not be found! \
         No compatibility tool is configured for this app. \
         Enable Steam Play for all titles in the Steam settings, \
         or set $PROTON_VERSION to the name of an installed Proton version."
    )]
    ToolNotFound,

    #[error(
        "Proton installation could not be found with given $PROTON_VERSION '{requested}'!\n\n\
         Valid values include: {}", known.join(", ")
    )]
    RequestedToolNotFound {
        requested: String,
        known: Vec<String>,
    },

    #[error("'{0}' is not a Proton installation: the 'proton' executable is missing")]
    ToolNotProton(String),

    #[error(
        "{tool} requires the Steam Runtime '{companion}', which could not be found. \
         Install it by launching a Steam app using this Proton version."
    )]
    RuntimeMissing { tool: String, companion: String },

    #[error(
        "Proton installation '{0}' is incomplete. \
         Have you launched a Steam app using this Proton version at least once to finish installation?"
    )]
    ToolIncomplete(String),

    #[error("Steam Runtime was enabled but couldn't be found!")]
    SteamRuntimeNotFound,

    #[error(
        "Winetricks isn't installed, please install winetricks in order to use this script!"
    )]
    WinetricksNotFound,

    #[error("Steam Runtime launcher crashed (exit code {})", code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    LauncherCrashed { code: Option<i32> },

    #[error("malformed config {}: {source}", path.display())]
    MalformedConfig {
        path: PathBuf,
        #[source]
        source: VdfError,
    },

    #[error("no data in {}", .0.display())]
    NoData(PathBuf),

    #[error("dialog error: {0}")]
    Dialog(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that describe the user's setup rather than a bug; shown without a log dump.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Dialog(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
