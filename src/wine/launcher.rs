//! Steam Runtime launcher service
//!
//! In bwrap mode one container is started up front and every Wine helper
//! script joins it through `steam-runtime-launch-client`. The service is
//! ready once it has printed its first line.

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::error::{Error, Result};
use crate::logging::{log_debug, log_info, log_warning};

pub struct LauncherService {
    child: Child,
    // Held so the service never writes to a closed pipe
    _stdout: BufReader<ChildStdout>,
}

impl LauncherService {
    /// Spawn `command` and wait until it reports readiness
    pub fn start(mut command: Command) -> Result<Self> {
        let mut child = command.stdout(Stdio::piped()).spawn()?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(Error::LauncherCrashed { code: None });
        };
        let mut stdout = BufReader::new(stdout);

        let mut line = String::new();
        let read = stdout.read_line(&mut line);
        if !matches!(read, Ok(n) if n > 0) {
            let code = child.wait().ok().and_then(|status| status.code());
            log_warning("Steam Runtime launcher exited before it was ready");
            return Err(Error::LauncherCrashed { code });
        }

        log_debug(&format!("Steam Runtime launcher ready: {}", line.trim()));
        log_info("Started Steam Runtime launcher service");
        Ok(Self {
            child,
            _stdout: stdout,
        })
    }

    /// Fails if the service has exited
    pub fn check_alive(&mut self) -> Result<()> {
        match self.child.try_wait()? {
            Some(status) => Err(Error::LauncherCrashed {
                code: status.code(),
            }),
            None => Ok(()),
        }
    }

    pub fn stop(mut self) {
        self.terminate();
    }

    fn terminate(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

impl Drop for LauncherService {
    fn drop(&mut self) {
        self.terminate();
    }
}
