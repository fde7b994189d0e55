//! This module constitutes the core, headless engine of chix.
//! It manages open documents and their tabs, projects on disk, crash-recovery
//! snapshots, and the compile/interpret/analyze runs of external C tools.

pub mod app;
pub mod autosave;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod id;
pub mod launch;
pub mod process;
pub mod project;
pub mod recent;
pub mod runner;
pub mod save;
pub mod settings;
pub mod tabs;
pub mod tool;
pub mod worker;
