use crate::breakpoints::{BreakpointResolver, parse_overrides_json};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub breakpoints: BreakpointConfig,
    #[serde(default)]
    pub utility: UtilityConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentConfig {
    #[serde(default)]
    pub post_types: Vec<String>,
    /// Only migrate global classes that the scanned content references.
    #[serde(default = "default_restrict_to_referenced")]
    pub restrict_to_referenced: bool,
    /// Globs, relative to the content directory, of the item files to load.
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct BreakpointConfig {
    #[serde(default)]
    pub overrides: Vec<BreakpointOverride>,
    /// JSON file holding an array of overrides, applied before `overrides`.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BreakpointOverride {
    pub key: String,
    pub width: u32,
    #[serde(default)]
    pub base: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct UtilityConfig {
    #[serde(default)]
    pub stylesheet: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConfigError {
    pub message: String,
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|err| ConfigError {
        message: format!("failed to read config {}: {}", path.display(), err),
    })?;
    toml::from_str(&text).map_err(|err| ConfigError {
        message: format!("failed to parse config {}: {}", path.display(), err),
    })
}

/// Builds the breakpoint resolver from the override file and inline
/// overrides. Inline entries come last so they win on key collisions.
pub fn resolve_breakpoints(config: &Config) -> Result<BreakpointResolver, ConfigError> {
    let mut overrides = Vec::new();

    if let Some(path) = &config.breakpoints.file {
        let text = fs::read_to_string(path).map_err(|err| ConfigError {
            message: format!("failed to read breakpoints {}: {}", path.display(), err),
        })?;
        overrides.extend(parse_overrides_json(&text));
    }

    overrides.extend(config.breakpoints.overrides.iter().map(|entry| {
        json!({
            "key": entry.key,
            "width": entry.width,
            "base": entry.base,
        })
    }));

    Ok(BreakpointResolver::with_overrides(overrides))
}

fn default_restrict_to_referenced() -> bool {
    true
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            post_types: Vec::new(),
            restrict_to_referenced: default_restrict_to_referenced(),
            patterns: Vec::new(),
        }
    }
}
