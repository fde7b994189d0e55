// Configuration module
// Settings and shell aliases as loaded by user_config and the CLI

use std::collections::HashMap;
use std::time::Duration;

/// Alias chains longer than this are treated as cycles
const MAX_ALIAS_DEPTH: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Short shell command aliases ("r" -> "run")
    pub aliases: HashMap<String, String>,
    pub settings: HashMap<String, ConfigValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl ConfigValue {
    fn kind(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "int",
            ConfigValue::String(_) => "string",
        }
    }
}

impl Config {
    /// Alias a shell command. An alias may name another alias.
    pub fn alias(&mut self, short: &str, command: &str) {
        self.aliases.insert(short.to_string(), command.to_string());
    }

    /// Follow aliases to a command word; unknown words come back unchanged.
    /// A cycle resolves to the word itself.
    pub fn resolve<'a>(&'a self, word: &'a str) -> &'a str {
        let mut current = word;
        for _ in 0..MAX_ALIAS_DEPTH {
            match self.aliases.get(current) {
                Some(next) => current = next.as_str(),
                None => return current,
            }
        }
        tracing::warn!("alias {} does not resolve to a command", word);
        word
    }

    /// Set a configuration value
    pub fn set<V: Into<ConfigValue>>(&mut self, key: &str, value: V) {
        self.settings.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.settings.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            ConfigValue::Bool(b) => Some(*b),
            other => mistyped(key, "bool", other),
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            ConfigValue::Int(i) => Some(*i),
            other => mistyped(key, "int", other),
        }
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            ConfigValue::String(s) => Some(s.as_str()),
            other => mistyped(key, "string", other),
        }
    }

    /// String setting, with "" read as unset
    pub fn get_nonempty(&self, key: &str) -> Option<&str> {
        self.get_string(key).filter(|s| !s.is_empty())
    }

    /// Integer setting inside `min..=max`; anything else reads as unset
    pub fn get_int_in(&self, key: &str, min: i64, max: i64) -> Option<i64> {
        let value = self.get_int(key)?;
        if (min..=max).contains(&value) {
            Some(value)
        } else {
            tracing::warn!("{} = {} is outside {}..={}, ignored", key, value, min, max);
            None
        }
    }

    /// Positive count of `unit`s, capped at `max`. Zero and negative
    /// values read as unset.
    pub fn get_duration(&self, key: &str, unit: Duration, max: Duration) -> Option<Duration> {
        let count = self.get_int(key)?;
        if count <= 0 {
            tracing::warn!("{} = {} must be positive, ignored", key, count);
            return None;
        }
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        Some(unit.saturating_mul(count).min(max))
    }
}

fn mistyped<T>(key: &str, wanted: &str, found: &ConfigValue) -> Option<T> {
    tracing::debug!("{} is a {}, not a {}", key, found.kind(), wanted);
    None
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        ConfigValue::Int(i as i64)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}
