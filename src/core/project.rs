//! Projects: a directory bound to persisted editor settings.
//!
//! The sidecar lives at `<root>/.chix/project.json`. It records the editor
//! settings and the files that were open (relative to the root when they live
//! under it), most recent first.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::error::ProjectError;
use crate::core::id::DocumentId;
use crate::core::settings::EditorSettings;
use crate::core::tabs::TabSet;

pub const META_DIR: &str = ".chix";
pub const CONFIG_FILE: &str = "project.json";

const MAIN_C: &str = r#"/**
 * Main entry point for the application
 */
#include <stdio.h>

int main(int argc, char *argv[]) {
    printf("Hello, World!\n");
    return 0;
}
"#;

const MAKEFILE: &str = "# Makefile for C project

CC = gcc
CFLAGS = -Wall -Wextra -g
INCLUDES = -Iinclude
SRC_DIR = src
OBJ_DIR = obj
BIN_DIR = bin

SRCS = $(wildcard $(SRC_DIR)/*.c)
OBJS = $(patsubst $(SRC_DIR)/%.c, $(OBJ_DIR)/%.o, $(SRCS))
TARGET = $(BIN_DIR)/program

all: $(TARGET)

$(OBJ_DIR) $(BIN_DIR):
\tmkdir -p $@

$(OBJ_DIR)/%.o: $(SRC_DIR)/%.c | $(OBJ_DIR)
\t$(CC) $(CFLAGS) $(INCLUDES) -c $< -o $@

$(TARGET): $(OBJS) | $(BIN_DIR)
\t$(CC) $(CFLAGS) $^ -o $@

run: $(TARGET)
\t$(TARGET)

clean:
\trm -rf $(OBJ_DIR) $(BIN_DIR)

.PHONY: all run clean
";

/// Contents of the sidecar file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Unix seconds
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub settings: EditorSettings,
    /// Most recent first; relative to the root when inside it
    #[serde(default)]
    pub recent_files: Vec<PathBuf>,
}

impl ProjectConfig {
    pub fn new(root: &Path, settings: EditorSettings) -> Self {
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            name: project_name(root),
            created,
            settings,
            recent_files: Vec::new(),
        }
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(META_DIR).join(CONFIG_FILE)
}

fn project_name(root: &Path) -> String {
    match root.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => root.display().to_string(),
    }
}

/// Read the sidecar of `root`. `Ok(None)` when there is none.
pub fn load_config(root: &Path) -> Result<Option<ProjectConfig>, ProjectError> {
    let path = config_path(root);
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).map_err(|source| ProjectError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| ProjectError::Malformed { path, source })
}

pub fn write_config(root: &Path, config: &ProjectConfig) -> Result<(), ProjectError> {
    let path = config_path(root);
    let io_err = |source| ProjectError::Io {
        path: path.clone(),
        source,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(config).map_err(|source| ProjectError::Malformed {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(io_err)
}

#[derive(Debug, Default)]
pub struct ProjectManager {
    root: Option<PathBuf>,
    config: Option<ProjectConfig>,
}

impl ProjectManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn current_config(&self) -> Option<&ProjectConfig> {
        self.config.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.config.as_ref().map(|c| c.name.as_str())
    }

    /// Open `path` as the current project.
    ///
    /// A stored config replaces `settings` and its most recent file is opened
    /// in `tabs` if it still exists; the opened tab is returned. Without a
    /// config (or with an unreadable one) a fresh config is created from the
    /// current settings.
    pub fn open_project(
        &mut self,
        path: &Path,
        settings: &mut EditorSettings,
        tabs: &mut TabSet,
    ) -> Result<Option<DocumentId>, ProjectError> {
        if !path.is_dir() {
            return Err(ProjectError::NotADirectory(path.to_path_buf()));
        }
        let root = path.to_path_buf();

        let stored = match load_config(&root) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("{}; starting with defaults", e);
                None
            }
        };

        let mut opened = None;
        let config = match stored {
            Some(config) => {
                *settings = config.settings.clone();
                if let Some(recent) = config.recent_files.first() {
                    let full = root.join(recent);
                    if full.exists() {
                        opened = Some(tabs.open_file(&full));
                    }
                }
                config
            }
            None => {
                let config = ProjectConfig::new(&root, settings.clone());
                if let Err(e) = write_config(&root, &config) {
                    tracing::warn!("could not create project config: {}", e);
                }
                config
            }
        };

        tracing::info!("project opened: {}", config.name);
        self.root = Some(root);
        self.config = Some(config);
        Ok(opened)
    }

    /// Create a project at `path` and make it current.
    ///
    /// `path` must be missing or an empty directory. Without a template the
    /// starter sources are written; with one only the directories and config.
    pub fn create_project(
        &mut self,
        path: &Path,
        template: Option<&str>,
        settings: &EditorSettings,
    ) -> Result<(), ProjectError> {
        let io_err = |source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        };
        if path.exists() {
            if !path.is_dir() {
                return Err(ProjectError::NotADirectory(path.to_path_buf()));
            }
            if fs::read_dir(path).map_err(io_err)?.next().is_some() {
                return Err(ProjectError::NotEmpty(path.to_path_buf()));
            }
        }

        fs::create_dir_all(path.join("src")).map_err(io_err)?;
        fs::create_dir_all(path.join("include")).map_err(io_err)?;
        let config = ProjectConfig::new(path, settings.clone());
        write_config(path, &config)?;

        match template {
            None => {
                fs::write(path.join("src").join("main.c"), MAIN_C).map_err(io_err)?;
                fs::write(path.join("Makefile"), MAKEFILE).map_err(io_err)?;
                fs::write(path.join("README.md"), readme(&config.name)).map_err(io_err)?;
            }
            Some(name) => tracing::debug!("template {} content is left to the caller", name),
        }

        tracing::info!("project created: {}", path.display());
        self.root = Some(path.to_path_buf());
        self.config = Some(config);
        Ok(())
    }

    /// Write settings and open files back to the sidecar.
    /// Failures are logged and reported as `false`, never raised.
    pub fn save_state(&mut self, settings: &EditorSettings, tabs: &TabSet) -> bool {
        match self.try_save_state(settings, tabs) {
            Ok(()) => true,
            Err(ProjectError::NoProject) => false,
            Err(e) => {
                tracing::warn!("project state not saved: {}", e);
                false
            }
        }
    }

    fn try_save_state(&mut self, settings: &EditorSettings, tabs: &TabSet) -> Result<(), ProjectError> {
        let (Some(root), Some(config)) = (self.root.as_ref(), self.config.as_mut()) else {
            return Err(ProjectError::NoProject);
        };
        config.settings = settings.clone();

        // Active tab first so reopening restores what was being edited
        let mut paths = tabs.file_paths();
        if let Some(active) = tabs.active().path.clone() {
            paths.retain(|p| *p != active);
            paths.insert(0, active);
        }
        let recent: Vec<PathBuf> = paths.iter().map(|p| relativize(root, p)).collect();
        if !recent.is_empty() {
            config.recent_files = recent;
        }

        write_config(root, config)
    }

    /// Save state, then forget the project
    pub fn close_project(&mut self, settings: &EditorSettings, tabs: &TabSet) {
        if self.root.is_some() {
            self.save_state(settings, tabs);
        }
        self.root = None;
        self.config = None;
    }
}

fn relativize(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}

fn readme(name: &str) -> String {
    format!(
        "# {}\n\nA C project created with chix.\n\n## Building\n\n```\nmake\n```\n\n## Running\n\n```\nmake run\n```\n",
        name
    )
}
