use crate::content::GlobalClass;
use crate::importer::InlineStyles;
use crate::normalizer::normalize_acss_deprecated_hsl_tokens;
use crate::scanner::UTILITY_IMPORT_PREFIX;
use regex::Regex;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

const UTILITY_CATEGORY: &str = "acss";

#[derive(Debug, Clone, PartialEq, Eq)]
enum StylesheetSource {
    None,
    File(PathBuf),
    Text(String),
}

/// Resolves utility classes to the declarations of the framework stylesheet
/// instead of converting their settings.
#[derive(Debug)]
pub struct UtilityClassHandler {
    source: StylesheetSource,
    stylesheet: OnceCell<String>,
    lookups: HashMap<String, String>,
    inline_styles: InlineStyles,
}

impl UtilityClassHandler {
    pub fn new(stylesheet_path: Option<PathBuf>) -> Self {
        let source = match stylesheet_path {
            Some(path) => StylesheetSource::File(path),
            None => StylesheetSource::None,
        };
        Self::with_source(source)
    }

    pub fn from_stylesheet(text: impl Into<String>) -> Self {
        Self::with_source(StylesheetSource::Text(text.into()))
    }

    fn with_source(source: StylesheetSource) -> Self {
        Self {
            source,
            stylesheet: OnceCell::new(),
            lookups: HashMap::new(),
            inline_styles: InlineStyles::new(),
        }
    }

    /// Forgets the loaded stylesheet, the lookup cache and registered styles.
    pub fn reset(&mut self) {
        self.stylesheet = OnceCell::new();
        self.lookups.clear();
        self.inline_styles.clear();
    }

    pub fn inline_styles(&self) -> &InlineStyles {
        &self.inline_styles
    }

    pub fn is_utility_class(&self, class: &GlobalClass) -> bool {
        class.category.trim().eq_ignore_ascii_case(UTILITY_CATEGORY)
            || class.name.trim().starts_with(UTILITY_IMPORT_PREFIX)
    }

    /// Stores the class's framework declarations under its id, bare name and
    /// original name. Unknown classes register nothing.
    pub fn register_inline_style(&mut self, class: &GlobalClass) {
        let name = class.name.trim();
        if name.is_empty() {
            return;
        }
        let bare = bare_utility_name(name);
        if bare.is_empty() {
            return;
        }

        let declarations = self.declarations_for_class(&bare);
        if declarations.is_empty() {
            debug!(class = %name, "utility class not found in stylesheet");
            return;
        }

        let id = class.id.trim();
        if !id.is_empty() {
            self.inline_styles.insert(id.to_string(), declarations.clone());
        }
        self.inline_styles.insert(bare, declarations.clone());
        self.inline_styles.insert(name.to_string(), declarations);
    }

    /// Body of the first `.name { ... }` rule in the framework stylesheet.
    pub fn declarations_for_class(&mut self, name: &str) -> String {
        if let Some(cached) = self.lookups.get(name) {
            return cached.clone();
        }

        let stylesheet = self.stylesheet.get_or_init(|| load_stylesheet(&self.source));
        let declarations = if stylesheet.is_empty() {
            String::new()
        } else {
            find_rule_body(stylesheet, name)
                .map(|body| normalize_acss_deprecated_hsl_tokens(body.trim()))
                .unwrap_or_default()
        };
        self.lookups.insert(name.to_string(), declarations.clone());
        declarations
    }
}

impl Default for UtilityClassHandler {
    fn default() -> Self {
        Self::new(None)
    }
}

fn bare_utility_name(name: &str) -> String {
    let bare = name.strip_prefix(UTILITY_IMPORT_PREFIX).unwrap_or(name);
    let bare = bare.trim_start_matches('.');
    bare.strip_prefix("fr-").unwrap_or(bare).to_string()
}

fn load_stylesheet(source: &StylesheetSource) -> String {
    match source {
        StylesheetSource::None => String::new(),
        StylesheetSource::Text(text) => text.clone(),
        StylesheetSource::File(path) => match fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), bytes = text.len(), "loaded utility stylesheet");
                text
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "utility stylesheet unavailable");
                String::new()
            }
        },
    }
}

fn find_rule_body<'a>(stylesheet: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!(r"(?:^|[\s,}}])\.{}\s*\{{([^}}]*)\}}", regex::escape(name));
    let Ok(rule) = Regex::new(&pattern) else {
        return None;
    };
    rule.captures(stylesheet)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str())
}

#[cfg(test)]
mod tests {
    use super::UtilityClassHandler;
    use crate::content::GlobalClass;
    use pretty_assertions::assert_eq;
    use std::fs;

    const STYLESHEET: &str = ".text--xl { font-size: var(--text-xl); }\n\
        .bg--primary { background-color: var(--primary-hsl); }\n\
        .lede { font-size: 1.25em; }";

    fn class(id: &str, name: &str, category: &str) -> GlobalClass {
        GlobalClass {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            ..GlobalClass::default()
        }
    }

    #[test]
    fn detects_utility_classes_by_category_or_prefix() {
        let handler = UtilityClassHandler::default();
        assert!(handler.is_utility_class(&class("1", "text--xl", "ACSS")));
        assert!(handler.is_utility_class(&class("1", "acss_import_text--xl", "")));
        assert!(!handler.is_utility_class(&class("1", "card", "layout")));
    }

    #[test]
    fn registers_declarations_under_every_lookup_key() {
        let mut handler = UtilityClassHandler::from_stylesheet(STYLESHEET);
        handler.register_inline_style(&class("u1", "acss_import_bg--primary", "acss"));

        let inline = handler.inline_styles();
        assert_eq!(inline.len(), 3);
        assert_eq!(inline["u1"], "background-color: var(--primary);");
        assert_eq!(inline["bg--primary"], inline["u1"]);
        assert_eq!(inline["acss_import_bg--primary"], inline["u1"]);
    }

    #[test]
    fn strips_framework_prefix_before_lookup() {
        let mut handler = UtilityClassHandler::from_stylesheet(STYLESHEET);
        handler.register_inline_style(&class("", "fr-lede", "acss"));
        assert_eq!(handler.inline_styles()["lede"], "font-size: 1.25em;");
        assert!(!handler.inline_styles().contains_key(""));
    }

    #[test]
    fn lookup_ignores_classes_ending_in_the_name() {
        let mut handler = UtilityClassHandler::from_stylesheet(
            ".x-text--xl { font-size: 9rem; }\n.text--xl { font-size: var(--text-xl); }",
        );
        assert_eq!(handler.declarations_for_class("text--xl"), "font-size: var(--text-xl);");

        let mut handler = UtilityClassHandler::from_stylesheet(".x-text--xl { font-size: 9rem; }");
        assert_eq!(handler.declarations_for_class("text--xl"), "");
    }

    #[test]
    fn missing_stylesheet_or_class_registers_nothing() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let mut handler = UtilityClassHandler::new(Some(dir.path().join("automatic.css")));
        handler.register_inline_style(&class("u1", "text--xl", "acss"));
        assert!(handler.inline_styles().is_empty());

        let mut handler = UtilityClassHandler::from_stylesheet(STYLESHEET);
        handler.register_inline_style(&class("u2", "text--xxl", "acss"));
        assert!(handler.inline_styles().is_empty());
    }

    #[test]
    fn reset_reloads_stylesheet_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("automatic.css");
        fs::write(&path, ".gap--s { gap: 1rem; }").expect("stylesheet should be written");

        let mut handler = UtilityClassHandler::new(Some(path.clone()));
        assert_eq!(handler.declarations_for_class("gap--s"), "gap: 1rem;");

        fs::write(&path, ".gap--s { gap: 2rem; }").expect("stylesheet should be rewritten");
        assert_eq!(handler.declarations_for_class("gap--s"), "gap: 1rem;");

        handler.reset();
        assert_eq!(handler.declarations_for_class("gap--s"), "gap: 2rem;");
    }
}
