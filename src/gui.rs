//! User interaction: choosing from lists and showing messages
//!
//! Anything that needs a user's choice goes through the `Selector` trait so
//! resolution code can be driven by dialogs, a terminal prompt or, in
//! tests, a script.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::logging::{log_info, log_warning};
use crate::utils::{find_in_path, Environ};

const DIALOG_TITLE: &str = "protonkit";

/// Picks one entry of a list
pub trait Selector {
    /// Index of the chosen option, `None` if the user cancelled
    fn select_one(&self, title: &str, options: &[String]) -> Result<Option<usize>>;
}

// ============================================================================
// Dialogs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuiProvider {
    Yad,
    Zenity,
}

impl GuiProvider {
    fn command(self) -> &'static str {
        match self {
            GuiProvider::Yad => "yad",
            GuiProvider::Zenity => "zenity",
        }
    }

    /// `yad` or `zenity`, whichever is installed. `$PROTONKIT_GUI` picks
    /// one when both are.
    pub fn find(environ: &Environ) -> Result<Self> {
        let mut candidates = vec![GuiProvider::Yad, GuiProvider::Zenity];
        let preferred = environ
            .get("PROTONKIT_GUI")
            .unwrap_or_default()
            .to_lowercase();
        if preferred == "zenity" {
            candidates.reverse();
        }

        let provider = candidates
            .into_iter()
            .find(|p| find_in_path(environ, p.command()).is_some())
            .ok_or_else(|| {
                Error::Dialog(
                    "'yad' or 'zenity' was not found. Either executable is required for the GUI."
                        .to_string(),
                )
            })?;
        log_info(&format!("Using '{}' as GUI provider", provider.command()));
        Ok(provider)
    }

    fn list_args(self, title: &str) -> Vec<String> {
        let args: &[&str] = match self {
            GuiProvider::Yad => &[
                "--list", "--no-headers", "--center", "--window-icon", "wine",
                "--no-markup", "--width", "600", "--height", "400",
            ],
            GuiProvider::Zenity => &["--list", "--hide-header", "--width", "600", "--height", "400"],
        };
        let mut args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        args.extend(
            ["--text", title, "--title", DIALOG_TITLE, "--column", "Choice"]
                .map(String::from),
        );
        args
    }

    fn text_args(self, title: &str, ok_label: &str, cancel_label: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--text-info".into(),
            "--window-icon".into(),
            "wine".into(),
            "--title".into(),
            title.into(),
            "--width".into(),
            "600".into(),
            "--height".into(),
            "600".into(),
        ];
        match self {
            GuiProvider::Yad => {
                args.extend(["--wrap", "--margins", "2", "--center"].map(String::from));
                args.push(format!("--button={ok_label}:0"));
                if let Some(cancel) = cancel_label {
                    args.push(format!("--button={cancel}:1"));
                }
            }
            GuiProvider::Zenity => {
                args.extend(["--ok-label".to_string(), ok_label.to_string()]);
                if let Some(cancel) = cancel_label {
                    args.extend(["--cancel-label".to_string(), cancel.to_string()]);
                }
            }
        }
        args
    }

    /// Run the dialog with `input` on stdin.
    ///
    /// Returns `None` when the user closed the dialog.
    fn run(self, args: &[String], input: &str) -> Result<Option<String>> {
        let output = self.spawn(args, input)?;

        // A locale that can't represent the text makes the dialog exit with 255
        let output = if output.status.code() == Some(255) {
            log_warning(
                "Your system locale is incapable of displaying all characters. \
                 Some names may not show up correctly. Please use a UTF-8 locale.",
            );
            let ascii = |s: &str| s.chars().filter(char::is_ascii).collect::<String>();
            let args: Vec<String> = args.iter().map(|a| ascii(a)).collect();
            self.spawn(&args, &ascii(input))?
        } else {
            output
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        match output.status.code() {
            Some(0) => Ok(Some(stdout)),
            // Cancel button, or Esc in yad
            Some(1) | Some(252) => Ok(None),
            // Killed by SIGABRT: zenity crashes on long lists but prints the choice first
            None if self == GuiProvider::Zenity && !stdout.trim().is_empty() => {
                log_info("Ignoring zenity crash");
                Ok(Some(stdout))
            }
            _ => Err(Error::Dialog(format!(
                "{} returned an error. Stderr: {}",
                self.command(),
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }

    fn spawn(self, args: &[String], input: &str) -> Result<std::process::Output> {
        let mut child = Command::new(self.command())
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes())?;
        }
        Ok(child.wait_with_output()?)
    }
}

/// Chosen index from a `N: label` line
fn parse_choice(output: &str) -> Option<usize> {
    let line = output.trim();
    let number: String = line
        .split(':')
        .next()?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    number.parse::<usize>().ok()?.checked_sub(1)
}

fn numbered(options: &[String]) -> Vec<String> {
    options
        .iter()
        .enumerate()
        .map(|(i, option)| format!("{}: {}", i + 1, option))
        .collect()
}

/// Selector backed by yad or zenity list dialogs
pub struct DialogSelector {
    provider: GuiProvider,
}

impl DialogSelector {
    pub fn new(provider: GuiProvider) -> Self {
        Self { provider }
    }
}

impl Selector for DialogSelector {
    fn select_one(&self, title: &str, options: &[String]) -> Result<Option<usize>> {
        let input = numbered(options).join("\n");
        let output = self.provider.run(&self.provider.list_args(title), &input)?;
        Ok(output
            .as_deref()
            .and_then(parse_choice)
            .filter(|&i| i < options.len()))
    }
}

/// Show `text` in a scrollable dialog. Returns true if the OK button was used.
pub fn show_text_dialog(
    provider: GuiProvider,
    title: &str,
    text: &str,
    ok_label: &str,
    cancel_label: Option<&str>,
) -> Result<bool> {
    let args = provider.text_args(title, ok_label, cancel_label);
    Ok(provider.run(&args, text)?.is_some())
}

// ============================================================================
// Terminal
// ============================================================================

/// Numbered prompt on a terminal
pub struct TerminalSelector<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
}

impl TerminalSelector<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalSelector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
        }
    }
}

impl<R: BufRead, W: Write> Selector for TerminalSelector<R, W> {
    fn select_one(&self, title: &str, options: &[String]) -> Result<Option<usize>> {
        let mut output = self.output.borrow_mut();
        writeln!(output, "{title}:")?;
        for line in numbered(options) {
            writeln!(output, "  {line}")?;
        }

        loop {
            write!(output, "Enter a number (empty to cancel): ")?;
            output.flush()?;

            let mut line = String::new();
            if self.input.borrow_mut().read_line(&mut line)? == 0 || line.trim().is_empty() {
                return Ok(None);
            }
            match parse_choice(&line).filter(|&i| i < options.len()) {
                Some(index) => return Ok(Some(index)),
                None => writeln!(output, "Invalid choice '{}'", line.trim())?,
            }
        }
    }
}
