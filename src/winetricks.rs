//! Locating winetricks

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::logging::{log_error, log_info};
use crate::utils::{find_in_path, Environ};

/// `$WINETRICKS` if set, otherwise `winetricks` from `$PATH`
pub fn get_winetricks_path(environ: &Environ) -> Result<PathBuf> {
    if let Some(path) = environ.get_non_empty("WINETRICKS") {
        log_info(&format!("Winetricks path is set to {path}"));
        let path = PathBuf::from(path);
        if !path.is_file() {
            log_error("The WINETRICKS path is invalid, please make sure Winetricks is installed in that path!");
            return Err(Error::WinetricksNotFound);
        }
        return Ok(path);
    }

    log_info("WINETRICKS environment variable is not available. Searching from $PATH.");
    find_in_path(environ, "winetricks").ok_or_else(|| {
        log_error("'winetricks' executable could not be found automatically.");
        Error::WinetricksNotFound
    })
}
