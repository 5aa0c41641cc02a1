use crate::content::{ContentError, ContentSource, GlobalClass, GlobalClassSource, resolve_post_types};
use crate::settings::{Settings, Value};
use indexmap::IndexSet;
use tracing::{debug, info};

const MAX_SCAN_DEPTH: usize = 8;
const TEMPLATE_POST_TYPE: &str = "bricks_template";

/// Prefix the utility framework uses when importing its classes.
pub const UTILITY_IMPORT_PREFIX: &str = "acss_import_";

const EXCLUDED_PREFIXES: &[&str] = &[
    "brxe-",
    "bricks-",
    "brx-",
    "wp-",
    "wp-block-",
    "has-",
    "is-",
    "woocommerce-",
    "wc-",
    "product-",
    "cart-",
    "checkout-",
];

const EXCLUDED_CLASSES: &[&str] = &[
    "bg--ultra-light",
    "bg--ultra-dark",
    "fr-lede",
    "fr-intro",
    "fr-note",
    "fr-notes",
    "text--l",
];

/// Class ids and names referenced somewhere in the scanned content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferencedClassIndex {
    identifiers: IndexSet<String>,
}

impl ReferencedClassIndex {
    pub fn insert(&mut self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return false;
        }
        self.identifiers.insert(identifier.to_string());
        true
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.identifiers.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassCounts {
    pub total: usize,
    pub to_migrate: usize,
}

/// Finds which global classes the content actually uses.
///
/// Holds the per-run global-class cache and whether real content was seen;
/// [`reset`](ClassReferenceScanner::reset) clears both.
#[derive(Debug, Default)]
pub struct ClassReferenceScanner {
    global_classes: Option<Vec<GlobalClass>>,
    has_scanned_content: bool,
}

impl ClassReferenceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.global_classes = None;
        self.has_scanned_content = false;
    }

    pub fn has_scanned_content(&self) -> bool {
        self.has_scanned_content
    }

    /// Global classes, loaded from `source` once per run.
    pub fn global_classes(&mut self, source: &dyn GlobalClassSource) -> Result<&[GlobalClass], ContentError> {
        let classes = match self.global_classes.take() {
            Some(classes) => classes,
            None => {
                let classes = source.global_classes()?;
                debug!(count = classes.len(), "loaded global classes");
                classes
            }
        };
        Ok(self.global_classes.insert(classes).as_slice())
    }

    pub fn collect_referenced_identifiers(
        &mut self,
        source: &dyn ContentSource,
        post_types: &[String],
    ) -> ReferencedClassIndex {
        self.has_scanned_content = false;

        let mut post_types = resolve_post_types(post_types);
        if !post_types.iter().any(|post_type| post_type == TEMPLATE_POST_TYPE) {
            post_types.push(TEMPLATE_POST_TYPE.to_string());
        }

        let items = source.items(&post_types);
        if !items.is_empty() {
            self.has_scanned_content = true;
        }

        let mut index = ReferencedClassIndex::default();
        for item in &items {
            for element in &item.elements {
                collect_from_settings(&element.settings, &mut index, 0);
            }
            collect_from_value(&item.wrapper_settings, &mut index, 0);
            collect_from_value(&item.page_settings, &mut index, 0);
        }

        debug!(
            items = items.len(),
            references = index.len(),
            "collected class references"
        );
        index
    }

    /// An empty index means "everything" only when no content was ever
    /// scanned; after a scan it means "nothing".
    pub fn is_referenced(&self, class: &GlobalClass, index: &ReferencedClassIndex) -> bool {
        if index.is_empty() {
            return !self.has_scanned_content;
        }

        let id = class.id.trim();
        if !id.is_empty() && index.contains(id) {
            return true;
        }
        let name = class.name.trim();
        if name.is_empty() {
            return false;
        }
        index.contains(name) || index.contains(&format!("{}{}", UTILITY_IMPORT_PREFIX, name))
    }

    pub fn get_css_class_counts(
        &mut self,
        classes: &dyn GlobalClassSource,
        content: &dyn ContentSource,
        post_types: &[String],
        restrict_to_referenced: bool,
    ) -> Result<ClassCounts, ContentError> {
        let total = self.global_classes(classes)?.len();
        if !restrict_to_referenced {
            return Ok(ClassCounts {
                total,
                to_migrate: total,
            });
        }

        let index = self.collect_referenced_identifiers(content, post_types);
        let all = self.global_classes(classes)?.to_vec();
        let to_migrate = all
            .iter()
            .filter(|class| self.is_referenced(class, &index))
            .count();
        Ok(ClassCounts { total, to_migrate })
    }
}

/// System, CMS and shop classes never migrate, nor do a few content-only
/// utilities. `is-bg*` classes belong to the utility framework and pass.
pub fn should_exclude(class: &GlobalClass) -> bool {
    let name = class.name.as_str();
    if name.is_empty() {
        return true;
    }

    for prefix in EXCLUDED_PREFIXES {
        if !name.starts_with(prefix) {
            continue;
        }
        if *prefix == "is-" && name.starts_with("is-bg") {
            continue;
        }
        info!(class = %name, prefix = %prefix, "excluding class by prefix");
        return true;
    }

    let bare = name.strip_prefix(UTILITY_IMPORT_PREFIX).unwrap_or(name);
    let bare = bare.trim_start_matches('.');
    if EXCLUDED_CLASSES.contains(&bare) {
        info!(class = %name, "excluding content-only utility class");
        return true;
    }
    false
}

fn collect_from_value(value: &Value, index: &mut ReferencedClassIndex, depth: usize) -> bool {
    if depth > MAX_SCAN_DEPTH {
        return false;
    }
    match value {
        Value::Map(entries) => collect_from_settings(entries, index, depth),
        Value::List(items) => items
            .iter()
            .fold(false, |found, item| collect_from_value(item, index, depth + 1) || found),
        _ => false,
    }
}

fn collect_from_settings(settings: &Settings, index: &mut ReferencedClassIndex, depth: usize) -> bool {
    if depth > MAX_SCAN_DEPTH {
        return false;
    }
    let mut found = false;

    match settings.get("_cssGlobalClasses") {
        Some(Value::Scalar(id)) => found |= index.insert(id),
        Some(Value::List(ids)) => {
            for id in ids.iter().filter_map(Value::as_scalar) {
                found |= index.insert(id);
            }
        }
        _ => {}
    }

    match settings.get("_cssClasses") {
        Some(Value::Scalar(names)) => {
            for name in names.split_whitespace() {
                found |= index.insert(name);
            }
        }
        Some(Value::List(lists)) => {
            for name in lists.iter().filter_map(Value::as_scalar).flat_map(str::split_whitespace) {
                found |= index.insert(name);
            }
        }
        _ => {}
    }

    for (key, value) in settings {
        if key == "_cssGlobalClasses" || key == "_cssClasses" {
            continue;
        }
        if collect_from_value(value, index, depth + 1) {
            found = true;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::{ClassCounts, ClassReferenceScanner, ReferencedClassIndex, should_exclude};
    use crate::content::{ContentItem, Element, GlobalClass};
    use crate::settings::{Value, decode_settings};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn class(id: &str, name: &str) -> GlobalClass {
        GlobalClass {
            id: id.to_string(),
            name: name.to_string(),
            ..GlobalClass::default()
        }
    }

    fn page(elements: Vec<serde_json::Value>) -> ContentItem {
        ContentItem {
            id: "1".to_string(),
            post_type: "page".to_string(),
            elements: elements
                .into_iter()
                .map(|settings| Element {
                    id: "el".to_string(),
                    name: "div".to_string(),
                    settings: decode_settings(&settings),
                })
                .collect(),
            ..ContentItem::default()
        }
    }

    #[test]
    fn empty_index_includes_everything_only_before_any_scan() {
        let mut scanner = ClassReferenceScanner::new();
        let empty = ReferencedClassIndex::default();
        assert!(scanner.is_referenced(&class("abc", "btn"), &empty));

        let content = vec![page(vec![json!({"_padding": "1rem"})])];
        let index = scanner.collect_referenced_identifiers(&content, &[]);
        assert!(index.is_empty());
        assert!(scanner.has_scanned_content());
        assert!(!scanner.is_referenced(&class("abc", "btn"), &index));

        scanner.reset();
        assert!(scanner.is_referenced(&class("abc", "btn"), &index));
    }

    #[test]
    fn no_qualifying_content_keeps_safe_default() {
        let mut scanner = ClassReferenceScanner::new();
        let content = vec![ContentItem {
            post_type: "page".to_string(),
            ..ContentItem::default()
        }];
        let index = scanner.collect_referenced_identifiers(&content, &[]);
        assert!(!scanner.has_scanned_content());
        assert!(scanner.is_referenced(&class("abc", "btn"), &index));
    }

    #[test]
    fn collects_ids_names_and_nested_references() {
        let mut scanner = ClassReferenceScanner::new();
        let mut item = page(vec![
            json!({"_cssGlobalClasses": ["abc123", " def456 "]}),
            json!({"_cssClasses": "hero  hero--dark"}),
            json!({"items": [{"nested": {"_cssGlobalClasses": "[\"ghi789\"]"}}]}),
        ]);
        item.wrapper_settings = Value::decode(&json!({"_cssClasses": ["wrapper extra"]}));

        let index = scanner.collect_referenced_identifiers(&vec![item], &["page".to_string()]);
        let ids: Vec<&str> = index.iter().collect();
        assert_eq!(
            ids,
            vec!["abc123", "def456", "hero", "hero--dark", "ghi789", "wrapper", "extra"]
        );

        assert!(scanner.is_referenced(&class("abc123", "unused-name"), &index));
        assert!(scanner.is_referenced(&class("zzz", "hero"), &index));
        assert!(!scanner.is_referenced(&class("zzz", "other"), &index));
    }

    #[test]
    fn utility_import_prefix_matches_bare_names() {
        let scanner = ClassReferenceScanner::new();
        let mut index = ReferencedClassIndex::default();
        index.insert("acss_import_text--xl");
        assert!(scanner.is_referenced(&class("x", "text--xl"), &index));
    }

    #[test]
    fn scan_depth_is_bounded() {
        let mut deep = json!({"_cssClasses": "too-deep"});
        for _ in 0..10 {
            deep = json!({ "child": deep });
        }
        let mut shallow = json!({"_cssClasses": "shallow"});
        for _ in 0..3 {
            shallow = json!({ "child": shallow });
        }

        let mut scanner = ClassReferenceScanner::new();
        let index = scanner.collect_referenced_identifiers(&vec![page(vec![deep, shallow])], &[]);
        assert!(index.contains("shallow"));
        assert!(!index.contains("too-deep"));
    }

    #[test]
    fn exclusion_rules() {
        assert!(should_exclude(&class("1", "")));
        assert!(should_exclude(&class("1", "brxe-heading")));
        assert!(should_exclude(&class("1", "woocommerce-notice")));
        assert!(should_exclude(&class("1", "is-style-outline")));
        assert!(!should_exclude(&class("1", "is-bg-primary")));
        assert!(!should_exclude(&class("1", "is-bg")));
        assert!(should_exclude(&class("1", "acss_import_fr-lede")));
        assert!(should_exclude(&class("1", "text--l")));
        assert!(!should_exclude(&class("1", "text--xl")));
        assert!(!should_exclude(&class("1", "card")));
    }

    #[test]
    fn counts_total_and_referenced_classes() {
        let classes = vec![class("a1", "card"), class("b2", "btn"), class("c3", "hero")];
        let content = vec![page(vec![json!({"_cssGlobalClasses": ["a1"], "_cssClasses": "hero"})])];
        let mut scanner = ClassReferenceScanner::new();

        assert_eq!(
            scanner
                .get_css_class_counts(&classes, &content, &[], false)
                .expect("counts should load"),
            ClassCounts {
                total: 3,
                to_migrate: 3
            }
        );
        assert_eq!(
            scanner
                .get_css_class_counts(&classes, &content, &[], true)
                .expect("counts should load"),
            ClassCounts {
                total: 3,
                to_migrate: 2
            }
        );
    }
}
