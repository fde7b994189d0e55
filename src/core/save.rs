//! Writing files without ever leaving the original half-written.
//!
//! Before an existing file is overwritten it is copied to a transient backup
//! next to it. If the write fails the backup is copied back, so the file on
//! disk is byte-identical to what it was before the save.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use ropey::Rope;
use tempfile::NamedTempFile;

use crate::core::error::FileError;

/// Copy of a file taken before overwriting it. Deleted when dropped.
#[derive(Debug)]
pub struct BackupHandle {
    original: PathBuf,
    copy: NamedTempFile,
}

impl BackupHandle {
    /// Back up `path`. Returns `None` when there is nothing to back up.
    pub fn create(path: &Path) -> Result<Option<Self>, FileError> {
        if !path.is_file() {
            return Ok(None);
        }
        let backup_err = |source| FileError::Backup {
            path: path.to_path_buf(),
            source,
        };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => "file".to_string(),
        };
        let copy = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".bak")
            .tempfile_in(parent)
            .map_err(backup_err)?;
        fs::copy(path, copy.path()).map_err(backup_err)?;
        Ok(Some(Self {
            original: path.to_path_buf(),
            copy,
        }))
    }

    pub fn path(&self) -> &Path {
        self.copy.path()
    }

    /// Put the backed-up bytes back over the original
    pub fn restore(self) -> std::io::Result<()> {
        fs::copy(self.copy.path(), &self.original)?;
        Ok(())
    }
}

/// Write `path` through `write`, restoring the previous content on failure.
pub fn write_guarded<F>(path: &Path, write: F) -> Result<(), FileError>
where
    F: FnOnce(&mut File) -> std::io::Result<()>,
{
    let backup = BackupHandle::create(path)?;

    let attempt = File::create(path).and_then(|mut file| {
        write(&mut file)?;
        file.flush()?;
        file.sync_all()
    });

    match attempt {
        Ok(()) => Ok(()),
        Err(write_err) => {
            tracing::warn!("write to {} failed: {}", path.display(), write_err);
            match backup {
                Some(backup) => match backup.restore() {
                    Ok(()) => {
                        tracing::info!("restored {} from backup", path.display());
                        Err(FileError::Write {
                            path: path.to_path_buf(),
                            source: write_err,
                        })
                    }
                    Err(restore) => Err(FileError::Restore {
                        path: path.to_path_buf(),
                        write: write_err,
                        restore,
                    }),
                },
                None => Err(FileError::Write {
                    path: path.to_path_buf(),
                    source: write_err,
                }),
            }
        }
    }
}

/// Write a rope chunk by chunk
pub fn write_rope(path: &Path, rope: &Rope) -> Result<(), FileError> {
    write_guarded(path, |file| {
        for chunk in rope.chunks() {
            file.write_all(chunk.as_bytes())?;
        }
        Ok(())
    })
}
