//! Error taxonomy for the editor core.
//!
//! Every failure is recovered at the component boundary: run failures travel
//! inside a `RunResult`, file and project failures are returned to the shell
//! which turns them into status messages.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::core::id::DocumentId;
use crate::core::tool::ToolKind;

/// Why a compile, interpret or launch did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunFailure {
    #[error("No {0} detected")]
    ToolNotFound(ToolKind),

    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Process timed out after {} seconds", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("Process exited with {}", describe_exit(.0))]
    NonZeroExit(Option<i32>),

    #[error("Process was stopped")]
    Cancelled,

    #[error("Failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Could not remove previous executable {}: {reason}", .path.display())]
    StaleOutput { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Failed to run executable: {0}")]
    LaunchFailed(String),
}

impl RunFailure {
    /// True when the run hit its wall-clock bound
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunFailure::Timeout(_))
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// Filesystem failures while loading or saving documents
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to back up {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Write to {} failed ({write}) and the backup could not be restored: {restore}", .path.display())]
    Restore {
        path: PathBuf,
        write: std::io::Error,
        restore: std::io::Error,
    },

    #[error("Autosave failed: {0}")]
    Autosave(#[source] std::io::Error),

    #[error("No such tab: {0}")]
    UnknownTab(DocumentId),
}

/// Project open/create/persist failures
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Directory is not empty: {}", .0.display())]
    NotEmpty(PathBuf),

    #[error("No project is open")]
    NoProject,

    #[error("Malformed project config {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Project I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
