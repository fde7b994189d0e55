//! Locating external compiler and interpreter binaries.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::core::process::run_captured;

/// What a located binary is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Compiler,
    Interpreter,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::Compiler => write!(f, "C compiler"),
            ToolKind::Interpreter => write!(f, "C interpreter"),
        }
    }
}

/// A located external binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolHandle {
    pub kind: ToolKind,
    /// Bare command name (resolved via PATH) or absolute path
    pub program: PathBuf,
    /// Flag that makes the tool print its version and exit 0
    pub version_flag: String,
}

impl ToolHandle {
    pub fn new(kind: ToolKind, program: impl Into<PathBuf>, version_flag: &str) -> Self {
        Self {
            kind,
            program: program.into(),
            version_flag: version_flag.to_string(),
        }
    }

    /// Command pre-loaded with the tool's program
    pub fn command(&self) -> Command {
        Command::new(&self.program)
    }

    /// Short name for messages ("gcc", "tcc.exe", ...)
    pub fn name(&self) -> String {
        match self.program.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => self.program.display().to_string(),
        }
    }

    /// First line of the version query, e.g. "Using gcc (GCC) 13.2.0"
    pub fn describe(&self, timeout: Duration) -> String {
        let mut cmd = self.command();
        cmd.arg(&self.version_flag);
        match run_captured(cmd, timeout, None) {
            Ok(out) if out.success() => {
                let text = if out.stdout.trim().is_empty() {
                    out.stderr
                } else {
                    out.stdout
                };
                match text.lines().map(str::trim).find(|l| !l.is_empty()) {
                    Some(line) => format!("Using {}", line),
                    None => format!("Using {}", self.name()),
                }
            }
            Ok(out) => format!("{} error: {}", self.kind, out.stderr.trim()),
            Err(e) => format!("Error getting {} info: {}", self.kind, e),
        }
    }
}

/// Run `program version_flag` under `timeout`; true when it exits 0.
pub fn probe(program: &Path, version_flag: &str, timeout: Duration) -> bool {
    let mut cmd = Command::new(program);
    cmd.arg(version_flag);
    match run_captured(cmd, timeout, None) {
        Ok(out) => out.success(),
        Err(_) => false,
    }
}

/// First candidate that answers the version query, in priority order.
pub fn detect_first(
    kind: ToolKind,
    candidates: &[String],
    version_flag: &str,
    timeout: Duration,
) -> Option<ToolHandle> {
    for candidate in candidates {
        let program = PathBuf::from(candidate);
        if probe(&program, version_flag, timeout) {
            tracing::info!("detected {}: {}", kind, candidate);
            return Some(ToolHandle::new(kind, program, version_flag));
        }
        tracing::debug!("{} candidate {} did not respond", kind, candidate);
    }
    None
}

/// Fallback for tools installed outside PATH: the first existing file wins.
pub fn find_installed(kind: ToolKind, paths: &[PathBuf], version_flag: &str) -> Option<ToolHandle> {
    paths
        .iter()
        .find(|p| p.is_file())
        .map(|p| ToolHandle::new(kind, p.clone(), version_flag))
}

/// Platform compiler candidates in priority order
pub fn default_compiler_candidates() -> Vec<String> {
    let mut candidates = vec!["gcc".to_string(), "clang".to_string(), "tcc".to_string()];
    if cfg!(windows) {
        candidates.push("mingw32-gcc".to_string());
        candidates.push("x86_64-w64-mingw32-gcc".to_string());
    }
    candidates
}

/// Common interpreter (tcc) install locations checked when `tcc` is not on PATH
pub fn default_interpreter_paths() -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![
            PathBuf::from(r"C:\tcc\tcc.exe"),
            PathBuf::from(r"C:\Program Files\tcc\tcc.exe"),
            PathBuf::from(r"C:\Program Files (x86)\tcc\tcc.exe"),
        ]
    } else {
        vec![
            PathBuf::from("/usr/bin/tcc"),
            PathBuf::from("/usr/local/bin/tcc"),
        ]
    }
}
