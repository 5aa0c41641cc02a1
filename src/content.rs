use crate::settings::{Settings, Value};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_POST_TYPES: &[&str] = &["post", "page", "bricks_template"];
pub const DEFAULT_CONTENT_PATTERN: &str = "**/*.json";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid glob pattern '{pattern}': {source}")]
    Glob {
        pattern: String,
        source: globset::Error,
    },
    #[error("content directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Element {
    #[serde(default, deserialize_with = "deserialize_identifier")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "crate::settings::deserialize_settings")]
    pub settings: Settings,
}

/// One post, page or template with its builder data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContentItem {
    #[serde(default, deserialize_with = "deserialize_identifier")]
    pub id: String,
    #[serde(default = "default_post_type")]
    pub post_type: String,
    #[serde(default, deserialize_with = "deserialize_elements")]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub wrapper_settings: Value,
    #[serde(default)]
    pub page_settings: Value,
}

impl ContentItem {
    /// Items without elements, wrapper settings or page settings carry no
    /// builder content and are never scanned.
    pub fn has_builder_content(&self) -> bool {
        !self.elements.is_empty() || !self.wrapper_settings.is_empty() || !self.page_settings.is_empty()
    }
}

fn default_post_type() -> String {
    "page".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GlobalClass {
    #[serde(default, deserialize_with = "deserialize_identifier")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_identifier")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_identifier")]
    pub category: String,
    #[serde(default, deserialize_with = "crate::settings::deserialize_settings")]
    pub settings: Settings,
}

pub trait ContentSource {
    /// Builder content items whose post type is in `post_types`.
    fn items(&self, post_types: &[String]) -> Vec<&ContentItem>;
}

pub trait GlobalClassSource {
    fn global_classes(&self) -> Result<Vec<GlobalClass>, ContentError>;
}

impl ContentSource for Vec<ContentItem> {
    fn items(&self, post_types: &[String]) -> Vec<&ContentItem> {
        select_items(self, post_types)
    }
}

impl GlobalClassSource for Vec<GlobalClass> {
    fn global_classes(&self) -> Result<Vec<GlobalClass>, ContentError> {
        Ok(self.clone())
    }
}

/// Content items loaded from JSON files below a directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryContentSource {
    items: Vec<ContentItem>,
    files_loaded: usize,
}

impl DirectoryContentSource {
    /// Walks `root` and loads every file matching `patterns` (relative to
    /// `root`). Unreadable or malformed files are skipped with a warning.
    pub fn load(root: &Path, patterns: &[String]) -> Result<Self, ContentError> {
        if !root.is_dir() {
            return Err(ContentError::MissingDirectory(root.to_path_buf()));
        }
        let default_patterns = [DEFAULT_CONTENT_PATTERN.to_string()];
        let patterns = if patterns.is_empty() {
            &default_patterns[..]
        } else {
            patterns
        };
        let globset = build_globset(patterns)?;

        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(false)
            .git_ignore(true)
            .sort_by_file_name(|left, right| left.cmp(right));

        let mut source = Self::default();
        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable content entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|file_type| file_type.is_file()) {
                continue;
            }
            let path = entry.path();
            let relative_path = path.strip_prefix(root).unwrap_or(path);
            if !globset.is_match(relative_path) {
                continue;
            }
            match load_content_file(path) {
                Ok(items) => {
                    debug!(path = %path.display(), items = items.len(), "loaded content file");
                    source.items.extend(items);
                    source.files_loaded += 1;
                }
                Err(err) => warn!(error = %err, "skipping content file"),
            }
        }
        Ok(source)
    }

    pub fn files_loaded(&self) -> usize {
        self.files_loaded
    }

    pub fn all_items(&self) -> &[ContentItem] {
        &self.items
    }
}

impl ContentSource for DirectoryContentSource {
    fn items(&self, post_types: &[String]) -> Vec<&ContentItem> {
        select_items(&self.items, post_types)
    }
}

/// Global classes stored in a JSON file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalClassFile {
    pub path: PathBuf,
}

impl GlobalClassSource for GlobalClassFile {
    fn global_classes(&self) -> Result<Vec<GlobalClass>, ContentError> {
        let text = fs::read_to_string(&self.path).map_err(|source| ContentError::Read {
            path: self.path.clone(),
            source,
        })?;
        parse_global_classes(&text).map_err(|source| ContentError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

/// Accepts a JSON array, an object of classes, or either one stored as a
/// JSON string. Entries that are not objects are dropped.
pub fn parse_global_classes(text: &str) -> Result<Vec<GlobalClass>, serde_json::Error> {
    let raw = match serde_json::from_str::<serde_json::Value>(text)? {
        serde_json::Value::String(inner) => serde_json::from_str(&inner)?,
        other => other,
    };
    let entries = match raw {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Object(entries) => entries.into_iter().map(|(_, value)| value).collect(),
        _ => Vec::new(),
    };
    Ok(entries
        .into_iter()
        .filter(serde_json::Value::is_object)
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

/// A content file holds either one item or an array of items.
pub fn load_content_file(path: &Path) -> Result<Vec<ContentItem>, ContentError> {
    let text = fs::read_to_string(path).map_err(|source| ContentError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: serde_json::Value = serde_json::from_str(&text).map_err(|source| ContentError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let documents = match raw {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    documents
        .into_iter()
        .map(|document| {
            serde_json::from_value(document).map_err(|source| ContentError::Parse {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

/// Lowercased post types limited to `[a-z0-9_-]`, falling back to the
/// default set when nothing usable remains.
pub fn resolve_post_types(post_types: &[String]) -> Vec<String> {
    let mut resolved: Vec<String> = Vec::new();
    for post_type in post_types {
        let key: String = post_type
            .chars()
            .map(|ch| ch.to_ascii_lowercase())
            .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '-'))
            .collect();
        if !key.is_empty() && !resolved.contains(&key) {
            resolved.push(key);
        }
    }
    if resolved.is_empty() {
        return DEFAULT_POST_TYPES.iter().map(|post_type| post_type.to_string()).collect();
    }
    resolved
}

fn select_items<'a>(items: &'a [ContentItem], post_types: &[String]) -> Vec<&'a ContentItem> {
    let post_types = resolve_post_types(post_types);
    items
        .iter()
        .filter(|item| post_types.contains(&item.post_type) && item.has_builder_content())
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, ContentError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| ContentError::Glob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ContentError::Glob {
        pattern: patterns.join(","),
        source,
    })
}

fn deserialize_identifier<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(match raw {
        serde_json::Value::String(text) => text.trim().to_string(),
        serde_json::Value::Number(number) => number.to_string(),
        _ => String::new(),
    })
}

/// Elements arrive as an array or as a JSON string holding one. Entries
/// that are not element objects are dropped.
fn deserialize_elements<'de, D>(deserializer: D) -> Result<Vec<Element>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let raw = match raw {
        serde_json::Value::String(text) => serde_json::from_str(&text).unwrap_or(serde_json::Value::Null),
        other => other,
    };
    let serde_json::Value::Array(entries) = raw else {
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .filter(serde_json::Value::is_object)
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}
