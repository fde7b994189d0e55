//! Editor preferences shared between the shell and project configs.

use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
    System,
}

impl ThemeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dark" => Some(ThemeMode::Dark),
            "light" => Some(ThemeMode::Light),
            "system" => Some(ThemeMode::System),
            _ => None,
        }
    }
}

/// Settings persisted per project. Missing keys fall back to defaults so older
/// sidecar files still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    pub theme_mode: ThemeMode,
    pub tab_size: usize,
    pub word_wrap: bool,
    pub show_minimap: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            theme_mode: ThemeMode::Dark,
            tab_size: 4,
            word_wrap: false,
            show_minimap: true,
        }
    }
}

/// Wider indents than this in `tab_width` are ignored
const MAX_TAB_SIZE: i64 = 16;

impl EditorSettings {
    pub fn from_config(config: &Config) -> Self {
        let mut settings = Self::default();
        if let Some(theme) = config.get_string("theme").and_then(ThemeMode::parse) {
            settings.theme_mode = theme;
        }
        if let Some(width) = config.get_int_in("tab_width", 1, MAX_TAB_SIZE) {
            settings.tab_size = width as usize;
        }
        if let Some(wrap) = config.get_bool("word_wrap") {
            settings.word_wrap = wrap;
        }
        if let Some(minimap) = config.get_bool("show_minimap") {
            settings.show_minimap = minimap;
        }
        settings
    }
}
