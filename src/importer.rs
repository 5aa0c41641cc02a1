use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

pub const DEFAULT_COLLECTION: &str = "default";

/// A target style: one selector and its nested CSS body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleEntry {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub selector: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub readonly: bool,
}

impl StyleEntry {
    pub fn class(id: &str, selector: &str, css: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: default_kind(),
            selector: selector.to_string(),
            collection: default_collection(),
            css: css.trim().to_string(),
            readonly: false,
        }
    }
}

fn default_kind() -> String {
    "class".to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

/// Style entries keyed by style id, in insertion order.
pub type StyleSet = IndexMap<String, StyleEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleMapEntry {
    pub id: String,
    pub selector: String,
}

/// Source class id (and name) to target style.
pub type StyleMap = IndexMap<String, StyleMapEntry>;

/// Utility declarations keyed by every lookup form of the class.
pub type InlineStyles = IndexMap<String, String>;

/// Style id for a class selector. Stable across runs so re-imports update
/// the same entry.
pub fn class_style_id(selector: &str) -> String {
    short_hash(selector, 7)
}

/// Style id for an element `#id` selector; `id_name` has no leading `#`.
pub fn element_style_id(id_name: &str) -> String {
    format!("id_{}", short_hash(&format!("#{}", id_name), 8))
}

/// Leading hex digits of the MD5 digest of `text`, independent of
/// platform and toolchain.
fn short_hash(text: &str, len: usize) -> String {
    let digest = format!("{:x}", md5::compute(text.as_bytes()));
    digest[..len].to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildSignal {
    StylesUpdated,
    RebuildCss,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read style store {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write style store {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("invalid style store {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode style store: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("style store rejected the save: {0}")]
    Rejected(String),
}

/// Persistence of the merged styles and their side tables.
///
/// Saves and the version bump are staged; `commit` writes everything staged
/// at once, and a failed commit discards it.
pub trait StyleStore {
    fn load_styles(&self) -> Result<StyleSet, StoreError>;
    fn save_styles(&mut self, styles: &StyleSet) -> Result<(), StoreError>;
    fn save_style_map(&mut self, style_map: &StyleMap) -> Result<(), StoreError>;
    fn save_inline_styles(&mut self, inline_styles: &InlineStyles) -> Result<(), StoreError>;
    fn version(&self) -> u64;
    fn increment_version(&mut self) -> Result<u64, StoreError>;
    fn commit(&mut self) -> Result<(), StoreError>;
    fn invalidate_cache(&mut self);
    fn signal(&mut self, signal: RebuildSignal);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub styles: StyleSet,
    #[serde(default)]
    pub style_map: StyleMap,
    #[serde(default)]
    pub inline_styles: InlineStyles,
}

/// Keeps everything in one pretty-printed JSON document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    document: StoreDocument,
    pending: Option<StoreDocument>,
    signals: Vec<RebuildSignal>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let document = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => StoreDocument::default(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => StoreDocument::default(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        Ok(Self {
            path,
            document,
            pending: None,
            signals: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &StoreDocument {
        &self.document
    }

    pub fn signals(&self) -> &[RebuildSignal] {
        &self.signals
    }

    fn staged(&mut self) -> &mut StoreDocument {
        self.pending.get_or_insert_with(|| self.document.clone())
    }

    fn flush(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let encoded = serde_json::to_string_pretty(document)?;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, encoded).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl StyleStore for JsonFileStore {
    fn load_styles(&self) -> Result<StyleSet, StoreError> {
        Ok(self.document.styles.clone())
    }

    fn save_styles(&mut self, styles: &StyleSet) -> Result<(), StoreError> {
        self.staged().styles = styles.clone();
        Ok(())
    }

    fn save_style_map(&mut self, style_map: &StyleMap) -> Result<(), StoreError> {
        self.staged().style_map = style_map.clone();
        Ok(())
    }

    fn save_inline_styles(&mut self, inline_styles: &InlineStyles) -> Result<(), StoreError> {
        self.staged().inline_styles = inline_styles.clone();
        Ok(())
    }

    fn version(&self) -> u64 {
        self.document.version
    }

    fn increment_version(&mut self) -> Result<u64, StoreError> {
        let staged = self.staged();
        staged.version += 1;
        Ok(staged.version)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        self.flush(&pending)?;
        self.document = pending;
        Ok(())
    }

    fn invalidate_cache(&mut self) {
        debug!(path = %self.path.display(), "style cache invalidated");
    }

    fn signal(&mut self, signal: RebuildSignal) {
        self.signals.push(signal);
    }
}

/// In-memory store for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub document: StoreDocument,
    pending: Option<StoreDocument>,
    pub signals: Vec<RebuildSignal>,
    pub cache_invalidations: usize,
    pub reject_saves: bool,
}

impl MemoryStore {
    pub fn with_styles(styles: StyleSet) -> Self {
        Self {
            document: StoreDocument {
                styles,
                ..StoreDocument::default()
            },
            ..Self::default()
        }
    }

    fn staged(&mut self) -> &mut StoreDocument {
        self.pending.get_or_insert_with(|| self.document.clone())
    }
}

impl StyleStore for MemoryStore {
    fn load_styles(&self) -> Result<StyleSet, StoreError> {
        Ok(self.document.styles.clone())
    }

    fn save_styles(&mut self, styles: &StyleSet) -> Result<(), StoreError> {
        self.staged().styles = styles.clone();
        Ok(())
    }

    fn save_style_map(&mut self, style_map: &StyleMap) -> Result<(), StoreError> {
        self.staged().style_map = style_map.clone();
        Ok(())
    }

    fn save_inline_styles(&mut self, inline_styles: &InlineStyles) -> Result<(), StoreError> {
        self.staged().inline_styles = inline_styles.clone();
        Ok(())
    }

    fn version(&self) -> u64 {
        self.document.version
    }

    fn increment_version(&mut self) -> Result<u64, StoreError> {
        let staged = self.staged();
        staged.version += 1;
        Ok(staged.version)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        if self.reject_saves {
            return Err(StoreError::Rejected("memory store is read-only".to_string()));
        }
        self.document = pending;
        Ok(())
    }

    fn invalidate_cache(&mut self) {
        self.cache_invalidations += 1;
    }

    fn signal(&mut self, signal: RebuildSignal) {
        self.signals.push(signal);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub incoming: usize,
    pub merged: usize,
    pub version: u64,
}

pub struct StyleImporter<S> {
    store: S,
}

impl<S: StyleStore> StyleImporter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Merges `styles` into the stored set and persists it with `style_map`.
    ///
    /// Entries sharing a selector are combined first; stored entries whose
    /// selector is not imported again are kept. Nothing is written unless
    /// the merged set, the style map and the new version commit together.
    pub fn import<I>(&mut self, styles: I, style_map: &StyleMap) -> Result<ImportSummary, StoreError>
    where
        I: IntoIterator<Item = StyleEntry>,
    {
        let incoming = dedupe_by_selector(styles);
        let existing = self.store.load_styles()?;
        debug!(incoming = incoming.len(), existing = existing.len(), "importing styles");

        let mut by_selector: IndexMap<String, StyleEntry> = IndexMap::new();
        for entry in existing.into_values() {
            if !entry.selector.is_empty() {
                by_selector.insert(entry.selector.clone(), entry);
            }
        }
        let incoming_count = incoming.len();
        for (selector, entry) in incoming {
            by_selector.insert(selector, entry);
        }

        let mut merged = StyleSet::new();
        for (selector, mut entry) in by_selector {
            if entry.id.is_empty() {
                entry.id = class_style_id(&selector);
            }
            if !validate_css_syntax(&entry.css) {
                error!(selector = %selector, "style css failed syntax validation");
            }
            merged.insert(entry.id.clone(), entry);
        }

        let previous = self.store.version();
        self.store.save_styles(&merged)?;
        self.store.save_style_map(style_map)?;
        let version = self.store.increment_version()?;
        self.store.commit()?;
        debug!(previous, version, "style version bumped");
        self.store.invalidate_cache();
        self.trigger_rebuild();
        info!(
            merged = merged.len(),
            style_map = style_map.len(),
            version,
            "styles imported"
        );

        Ok(ImportSummary {
            incoming: incoming_count,
            merged: merged.len(),
            version,
        })
    }

    pub fn save_inline_styles(&mut self, inline_styles: &InlineStyles) -> Result<(), StoreError> {
        self.store.save_inline_styles(inline_styles)?;
        self.store.commit()
    }

    fn trigger_rebuild(&mut self) {
        self.store.invalidate_cache();
        self.store.signal(RebuildSignal::StylesUpdated);
        self.store.signal(RebuildSignal::RebuildCss);
    }
}

fn dedupe_by_selector<I>(styles: I) -> IndexMap<String, StyleEntry>
where
    I: IntoIterator<Item = StyleEntry>,
{
    let mut incoming: IndexMap<String, StyleEntry> = IndexMap::new();
    for style in styles {
        if style.selector.is_empty() {
            continue;
        }
        match incoming.get_mut(&style.selector) {
            None => {
                incoming.insert(style.selector.clone(), style);
            }
            Some(current) => {
                let existing_css = current.css.trim();
                let new_css = style.css.trim();
                if !new_css.is_empty() && new_css != existing_css {
                    current.css = if existing_css.is_empty() {
                        new_css.to_string()
                    } else {
                        format!("{}\n  {}", existing_css, new_css)
                    };
                }
            }
        }
    }
    incoming
}

/// Problems found by [`validate_css_syntax`]; empty when the text is balanced.
pub fn css_syntax_errors(css: &str) -> Vec<&'static str> {
    let mut errors = Vec::new();
    if css.matches('{').count() != css.matches('}').count() {
        errors.push("unclosed CSS brackets");
    }
    if css.matches('\'').count() % 2 != 0 {
        errors.push("unclosed single quotes");
    }
    if css.matches('"').count() % 2 != 0 {
        errors.push("unclosed double quotes");
    }
    errors
}

pub fn validate_css_syntax(css: &str) -> bool {
    let errors = css_syntax_errors(css);
    if errors.is_empty() {
        return true;
    }
    error!(errors = ?errors, "css syntax validation failed");
    false
}

pub fn fix_css_issues(css: &str) -> String {
    if css.is_empty() {
        return String::new();
    }
    css.replace("; ;", ";")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
