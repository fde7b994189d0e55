//! Application execution modes for chix.
//!
//! This module contains the front-ends that drive the core:
//! - Shell mode: line-oriented editing session with background runs
//! - Batch mode: run or analyze one file and exit

mod batch;
mod shell;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

pub use batch::{run_batch_analyze, run_batch_run};
pub use shell::{Shell, run_shell_mode};

/// Editor execution mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorMode {
    Shell,
    BatchRun(PathBuf),
    BatchAnalyze(PathBuf),
}

/// How the shell talks to its terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellStyle {
    /// Colour output-pane prefixes
    pub color: bool,
    /// Print a prompt before each command
    pub prompt: bool,
}

/// Pick the mode from the parsed command line.
pub fn mode_for(cli: &Cli) -> EditorMode {
    if let Some(path) = &cli.run {
        EditorMode::BatchRun(path.clone())
    } else if let Some(path) = &cli.analyze {
        EditorMode::BatchAnalyze(path.clone())
    } else {
        EditorMode::Shell
    }
}

/// Validate and canonicalize file paths and block device files.
pub fn validate_file_path(path: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let canonical = match path.canonicalize() {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // File doesn't exist yet - validate the parent directory
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => std::env::current_dir().map_err(|_| "Cannot determine current directory")?,
            };
            let canonical_parent = parent
                .canonicalize()
                .map_err(|_| "Invalid parent directory")?;
            match path.file_name() {
                Some(filename) => canonical_parent.join(filename),
                None => return Err("Invalid file path: missing filename".into()),
            }
        }
        Err(e) => return Err(format!("Invalid path: {}", e).into()),
    };

    // Block special file types that could hang the editor
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if let Ok(metadata) = std::fs::metadata(&canonical) {
            let ft = metadata.file_type();
            if ft.is_char_device() {
                return Err("Cannot open character device files (e.g., /dev/zero)".into());
            }
            if ft.is_block_device() {
                return Err("Cannot open block device files".into());
            }
            if ft.is_fifo() {
                return Err("Cannot open FIFO/named pipe files".into());
            }
            if ft.is_socket() {
                return Err("Cannot open socket files".into());
            }
        }
    }

    Ok(canonical)
}

/// Detect the shell style based on the environment.
pub fn detect_style() -> ShellStyle {
    let stdin_tty = std::io::stdin().is_terminal();
    let stdout_tty = std::io::stdout().is_terminal();
    detect_style_internal(stdin_tty, stdout_tty, |k| std::env::var(k))
}

/// Internal style detection with injectable environment lookup.
pub fn detect_style_internal<F>(stdin_tty: bool, stdout_tty: bool, get_env: F) -> ShellStyle
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let no_color = get_env("NO_COLOR").is_ok_and(|v| !v.is_empty());
    let dumb = get_env("TERM").is_ok_and(|t| t == "dumb");
    ShellStyle {
        color: stdout_tty && !no_color && !dumb,
        prompt: stdin_tty && stdout_tty,
    }
}
