//! Command-line argument parsing for chix.
//!
//! This module provides the `Cli` struct which encapsulates all command-line
//! options and methods for parsing them.

use crate::config::{Config, ConfigValue};
use crate::core::runner::MAX_RUN_TIMEOUT;
use std::path::PathBuf;

/// Command-line interface configuration.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Cli {
    /// Files to open, or a directory to open as the project
    pub paths: Vec<PathBuf>,

    /// Run mode override ("compile" or "interpret")
    pub mode: Option<String>,

    /// Color theme override
    pub theme: Option<String>,

    /// Run timeout override in seconds
    pub timeout: Option<u64>,

    /// Batch: run this file once and exit
    pub run: Option<PathBuf>,

    /// Batch: analyze this file and exit
    pub analyze: Option<PathBuf>,

    /// Print usage and exit
    pub help: bool,
}

pub const USAGE: &str = "chix - a C editor with compile and run support

Usage: chix [OPTIONS] [PATH...]

Each PATH is opened as a file, or as the project root if it is a directory.

Options:
  -h, --help            Show this help message
  -m, --mode MODE       Run mode: compile | interpret
  -t, --theme NAME      Theme mode: dark | light | system
      --timeout SECS    Wall-clock limit for one run
  -r, --run FILE        Run FILE once, print the result and exit
  -A, --analyze FILE    Analyze FILE, print findings and exit

Set RUST_LOG (e.g. RUST_LOG=debug) for diagnostics on stderr.";

impl Cli {
    /// Parse the process arguments.
    pub fn parse() -> Result<Self, Box<dyn std::error::Error>> {
        Self::parse_from(std::env::args().skip(1))
    }

    /// Parse an argument list (without the program name).
    ///
    /// Returns an error if a flag is unknown or a value is missing.
    pub fn parse_from<I>(args: I) -> Result<Self, Box<dyn std::error::Error>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut cli = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => cli.help = true,
                "-m" | "--mode" => {
                    if let Some(m) = args.next() {
                        cli.mode = Some(m);
                    } else {
                        return Err("--mode requires a value".into());
                    }
                }
                "-t" | "--theme" => {
                    if let Some(t) = args.next() {
                        cli.theme = Some(t);
                    } else {
                        return Err("--theme requires a value".into());
                    }
                }
                "--timeout" => {
                    if let Some(secs) = args.next() {
                        cli.timeout = Some(parse_timeout(&secs)?);
                    } else {
                        return Err("--timeout requires a value".into());
                    }
                }
                "-r" | "--run" => {
                    if let Some(path) = args.next() {
                        cli.run = Some(PathBuf::from(path));
                    } else {
                        return Err("--run requires a file".into());
                    }
                }
                "-A" | "--analyze" => {
                    if let Some(path) = args.next() {
                        cli.analyze = Some(PathBuf::from(path));
                    } else {
                        return Err("--analyze requires a file".into());
                    }
                }
                arg if arg.starts_with('-') && arg.len() > 1 => {
                    return Err(format!("Unknown flag: {}. Use --help for usage.", arg).into());
                }
                _ => {
                    // Positional arguments are files or a project directory
                    cli.paths.push(PathBuf::from(arg));
                }
            }
        }

        Ok(cli)
    }

    /// Apply CLI overrides to a configuration object.
    ///
    /// `timeout` is already bounded by `parse_from`.
    pub fn apply_to_config(&self, config: &mut Config) {
        if let Some(theme) = &self.theme {
            config.set("theme", ConfigValue::String(theme.clone()));
        }
        if let Some(mode) = &self.mode {
            config.set("mode", ConfigValue::String(mode.clone()));
        }
        if let Some(secs) = self.timeout {
            config.set("run_timeout_secs", ConfigValue::Int(secs as i64));
        }
    }
}

/// Whole seconds in `1..=MAX_RUN_TIMEOUT`
fn parse_timeout(value: &str) -> Result<u64, String> {
    let max = MAX_RUN_TIMEOUT.as_secs();
    match value.parse::<u64>() {
        Ok(secs) if (1..=max).contains(&secs) => Ok(secs),
        Ok(_) => Err(format!("--timeout must be between 1 and {} seconds", max)),
        Err(_) => Err(format!("--timeout expects seconds, got {}", value)),
    }
}
