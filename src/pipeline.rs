use crate::breakpoints::BreakpointResolver;
use crate::collector::{ElementStyleCollector, move_image_fit_properties_to_nested_img};
use crate::config::{self, Config, ConfigError};
use crate::content::{ContentError, ContentSource, GlobalClass, GlobalClassSource};
use crate::converter::SettingsConverter;
use crate::importer::{InlineStyles, StyleEntry, StyleMap, StyleMapEntry, StyleSet, class_style_id};
use crate::normalizer::{
    clean_custom_css, convert_to_logical_properties, normalize_css_variables, normalize_deprecated_hsl_references,
    normalize_final_css,
};
use crate::scanner::{ClassCounts, ClassReferenceScanner, ReferencedClassIndex, UTILITY_IMPORT_PREFIX, should_exclude};
use crate::settings::Value;
use crate::stylesheet::{parse_class_rules, parse_id_rules};
use crate::utility::UtilityClassHandler;
use indexmap::IndexMap;
use indexmap::map::Entry;
use regex::Regex;
use tracing::{debug, info};

const ROOT_PLACEHOLDER: &str = "%root%";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOptions {
    pub post_types: Vec<String>,
    pub restrict_to_referenced: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            post_types: Vec::new(),
            restrict_to_referenced: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionOutput {
    pub styles: StyleSet,
    pub style_map: StyleMap,
    pub inline_styles: InlineStyles,
    pub converted: usize,
    pub excluded: usize,
}

/// One migration run: owns every memoized cache so a new run starts clean.
#[derive(Debug)]
pub struct ConversionSession {
    breakpoints: BreakpointResolver,
    scanner: ClassReferenceScanner,
    utility: UtilityClassHandler,
    options: ConversionOptions,
}

impl ConversionSession {
    pub fn new(breakpoints: BreakpointResolver, utility: UtilityClassHandler, options: ConversionOptions) -> Self {
        Self {
            breakpoints,
            scanner: ClassReferenceScanner::new(),
            utility,
            options,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let breakpoints = config::resolve_breakpoints(config)?;
        let utility = UtilityClassHandler::new(config.utility.stylesheet.clone());
        let options = ConversionOptions {
            post_types: config.content.post_types.clone(),
            restrict_to_referenced: config.content.restrict_to_referenced,
        };
        Ok(Self::new(breakpoints, utility, options))
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn breakpoints(&self) -> &BreakpointResolver {
        &self.breakpoints
    }

    /// Drops the breakpoint map, the class list, the scan state and the
    /// utility stylesheet with its lookups.
    pub fn new_run(&mut self) {
        self.breakpoints.clear_cache();
        self.scanner.reset();
        self.utility.reset();
    }

    pub fn referenced_identifiers(&mut self, content: &dyn ContentSource) -> ReferencedClassIndex {
        self.scanner
            .collect_referenced_identifiers(content, &self.options.post_types)
    }

    pub fn class_counts(
        &mut self,
        classes: &dyn GlobalClassSource,
        content: &dyn ContentSource,
    ) -> Result<ClassCounts, ContentError> {
        self.new_run();
        self.scanner.get_css_class_counts(
            classes,
            content,
            &self.options.post_types,
            self.options.restrict_to_referenced,
        )
    }

    /// Converts every migratable global class plus element-scoped styles
    /// and custom CSS into one style set and its style map.
    pub fn convert_global_classes(
        &mut self,
        classes: &dyn GlobalClassSource,
        content: &dyn ContentSource,
    ) -> Result<ConversionOutput, ContentError> {
        self.new_run();

        let classes = self.scanner.global_classes(classes)?.to_vec();
        let post_types = self.options.post_types.clone();
        let referenced = self.scanner.collect_referenced_identifiers(content, &post_types);
        info!(
            classes = classes.len(),
            referenced = referenced.len(),
            restrict = self.options.restrict_to_referenced,
            "starting class conversion"
        );

        let mut output = ConversionOutput {
            styles: builtin_element_styles(),
            ..ConversionOutput::default()
        };

        let mut candidates: Vec<&GlobalClass> = Vec::new();
        for class in &classes {
            if class.id.trim().is_empty() && class.name.trim().is_empty() {
                continue;
            }
            if self.options.restrict_to_referenced && !self.scanner.is_referenced(class, &referenced) {
                debug!(class = %class.name, "skipping unreferenced class");
                continue;
            }
            if self.utility.is_utility_class(class) {
                self.utility.register_inline_style(class);
                output.excluded += 1;
                continue;
            }
            if should_exclude(class) {
                output.excluded += 1;
                continue;
            }
            candidates.push(class);
        }

        let mut custom_css = String::new();
        let mut breakpoint_css: IndexMap<String, Vec<String>> = IndexMap::new();
        for class in &candidates {
            self.collect_class_custom_css(class, &mut custom_css, &mut breakpoint_css);
        }

        let converter = SettingsConverter::new(&self.breakpoints);
        for class in &candidates {
            let name = class_name(class);
            let selector = format!(".{}", name);
            let css = convert_class(&converter, class, &name);
            let style_id = class_style_id(&selector);

            output
                .styles
                .insert(style_id.clone(), StyleEntry::class(&style_id, &selector, &css));
            for key in [class.id.trim(), class.name.trim()] {
                if key.is_empty() {
                    continue;
                }
                output.style_map.insert(
                    key.to_string(),
                    StyleMapEntry {
                        id: style_id.clone(),
                        selector: selector.clone(),
                    },
                );
            }
            output.converted += 1;
        }

        let elements = ElementStyleCollector::new(&self.breakpoints).collect(content, &post_types);
        for (style_id, entry) in elements.styles {
            merge_css(&mut output.styles, style_id, entry);
        }
        if !elements.custom_css.is_empty() {
            custom_css.push_str(&format!("\n{}\n", elements.custom_css));
        }

        let custom_css = clean_custom_css(&custom_css);
        if !custom_css.is_empty() {
            let mut parsed = parse_class_rules(&custom_css, &output.style_map);
            parsed.extend(parse_id_rules(&custom_css));
            debug!(count = parsed.len(), "parsed custom css styles");
            for (style_id, mut entry) in parsed {
                entry.css = convert_to_logical_properties(entry.css.trim());
                merge_css(&mut output.styles, style_id, entry);
            }
        }

        for (key, blocks) in &breakpoint_css {
            let Some(mapped) = output.style_map.get(key) else {
                continue;
            };
            let Some(entry) = output.styles.get_mut(&mapped.id) else {
                continue;
            };
            for block in blocks {
                entry.css.push_str("\n\n");
                entry.css.push_str(block);
            }
        }

        for entry in output.styles.values_mut() {
            if !entry.css.is_empty() {
                entry.css = normalize_final_css(&entry.css);
            }
        }
        output.inline_styles = self.utility.inline_styles().clone();

        info!(
            converted = output.converted,
            excluded = output.excluded,
            styles = output.styles.len(),
            style_map = output.style_map.len(),
            "class conversion finished"
        );
        Ok(output)
    }

    /// `_cssCustom` goes to the shared stylesheet. Breakpoint variants keep
    /// only the body of their `.class { ... }` rule, wrapped in the media
    /// query, and are appended to the class style later.
    fn collect_class_custom_css(
        &self,
        class: &GlobalClass,
        custom_css: &mut String,
        breakpoint_css: &mut IndexMap<String, Vec<String>>,
    ) {
        let name = class_name(class);
        let root = format!(".{}", name);

        if let Some(snippet) = class.settings.get("_cssCustom").and_then(Value::text) {
            let snippet = normalize_deprecated_hsl_references(&snippet.replace(ROOT_PLACEHOLDER, &root));
            custom_css.push_str(&format!("\n{}\n", snippet));
        }

        let Ok(class_rule) = Regex::new(&format!(r"\.{}\s*\{{([^}}]*)\}}", regex::escape(&name))) else {
            return;
        };
        let key = class_key(class);
        for (setting, value) in &class.settings {
            let Some(breakpoint) = setting.strip_prefix("_cssCustom:") else {
                continue;
            };
            let Some(snippet) = value.text() else {
                continue;
            };
            let Some(media) = self.breakpoints.get_media_query_for_breakpoint(breakpoint) else {
                continue;
            };
            let snippet = normalize_deprecated_hsl_references(&snippet.replace(ROOT_PLACEHOLDER, &root));
            let Some(body) = class_rule.captures(&snippet).and_then(|caps| caps.get(1)) else {
                continue;
            };
            debug!(class = %name, breakpoint = %breakpoint, "found breakpoint custom css");
            breakpoint_css
                .entry(key.to_string())
                .or_default()
                .push(format!("{} {{\n  {}\n}}", media, body.as_str().trim()));
        }
    }
}

/// Readonly base styles for the target builder's own structural elements.
pub fn builtin_element_styles() -> StyleSet {
    [
        (
            "etch-section-style",
            ":where([data-etch-element=\"section\"])",
            "inline-size: 100%; display: flex; flex-direction: column; align-items: center;",
        ),
        (
            "etch-container-style",
            ":where([data-etch-element=\"container\"])",
            "inline-size: 100%; display: flex; flex-direction: column; max-inline-size: var(--content-width, 1366px); align-self: center;",
        ),
        (
            "etch-iframe-style",
            ":where([data-etch-element=\"iframe\"])",
            "inline-size: 100%; block-size: auto; aspect-ratio: 16/9;",
        ),
    ]
    .into_iter()
    .map(|(id, selector, css)| {
        let mut entry = StyleEntry::class(id, selector, css);
        entry.kind = "element".to_string();
        entry.readonly = true;
        (id.to_string(), entry)
    })
    .collect()
}

/// Base and responsive CSS for one class, before custom CSS is folded in.
fn convert_class(converter: &SettingsConverter<'_>, class: &GlobalClass, name: &str) -> String {
    let mut css = String::new();
    if !class.settings.is_empty() {
        css = converter.convert(&class.settings, Some(name), true);
        let responsive = converter.convert_responsive_variants(&class.settings, Some(name));
        if !responsive.is_empty() {
            css.push(' ');
            css.push_str(&responsive);
        }
    }
    let css = normalize_css_variables(&css);
    move_image_fit_properties_to_nested_img(name, &css)
        .trim()
        .to_string()
}

fn class_name(class: &GlobalClass) -> String {
    let name = if class.name.trim().is_empty() {
        class.id.trim()
    } else {
        class.name.trim()
    };
    name.strip_prefix(UTILITY_IMPORT_PREFIX).unwrap_or(name).to_string()
}

fn class_key(class: &GlobalClass) -> &str {
    let id = class.id.trim();
    if id.is_empty() { class.name.trim() } else { id }
}

fn merge_css(styles: &mut StyleSet, style_id: String, entry: StyleEntry) {
    match styles.entry(style_id) {
        Entry::Vacant(slot) => {
            slot.insert(entry);
        }
        Entry::Occupied(mut slot) => {
            let existing = slot.get_mut();
            let current = existing.css.trim();
            let incoming = entry.css.trim();
            existing.css = match (current.is_empty(), incoming.is_empty()) {
                (_, true) => current.to_string(),
                (true, false) => incoming.to_string(),
                (false, false) => format!("{}\n  {}", current, incoming),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversionOptions, ConversionSession, builtin_element_styles};
    use crate::breakpoints::BreakpointResolver;
    use crate::content::{ContentItem, Element, GlobalClass};
    use crate::importer::{class_style_id, element_style_id};
    use crate::settings::decode_settings;
    use crate::utility::UtilityClassHandler;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const UTILITY_CSS: &str = ".text--xl { font-size: var(--text-xl); }";

    fn class(id: &str, name: &str, category: &str, settings: serde_json::Value) -> GlobalClass {
        GlobalClass {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            settings: decode_settings(&settings),
        }
    }

    fn classes() -> Vec<GlobalClass> {
        vec![
            class(
                "c1",
                "card",
                "",
                json!({
                    "_overflow": "hidden",
                    "_cssCustom": "%root% > .title { color: red; }",
                    "_cssCustom:mobile_portrait": "%root% { overflow: visible; }"
                }),
            ),
            class("u1", "acss_import_text--xl", "acss", json!({})),
            class("x1", "brxe-heading", "", json!({"_display": "block"})),
            class("n1", "unused", "", json!({"_display": "grid"})),
        ]
    }

    fn content() -> Vec<ContentItem> {
        vec![ContentItem {
            id: "7".to_string(),
            post_type: "page".to_string(),
            elements: vec![Element {
                id: "brxe-abc".to_string(),
                name: "section".to_string(),
                settings: decode_settings(&json!({
                    "_cssGlobalClasses": ["c1", "u1", "x1"],
                    "_display": "block",
                    "_cssCustom": "%root% { color: red; }"
                })),
            }],
            ..ContentItem::default()
        }]
    }

    fn session(options: ConversionOptions) -> ConversionSession {
        ConversionSession::new(
            BreakpointResolver::new(),
            UtilityClassHandler::from_stylesheet(UTILITY_CSS),
            options,
        )
    }

    #[test]
    fn converts_referenced_classes_elements_and_custom_css() {
        let mut session = session(ConversionOptions::default());
        let output = session
            .convert_global_classes(&classes(), &content())
            .expect("conversion should succeed");

        assert_eq!(output.converted, 1);
        assert_eq!(output.excluded, 2);

        let card_id = class_style_id(".card");
        assert_eq!(output.style_map["c1"].id, card_id);
        assert_eq!(output.style_map["card"].selector, ".card");
        assert!(!output.style_map.contains_key("n1"));
        assert!(!output.style_map.contains_key("x1"));

        let card = &output.styles[&card_id];
        assert!(card.css.starts_with("overflow: hidden;\n  "), "{}", card.css);
        assert!(card.css.contains("& > .title"), "{}", card.css);
        assert!(card.css.contains("color: red;"), "{}", card.css);
        assert!(
            card.css
                .ends_with("\n\n@media (width <= to-rem(478px)) {\n  overflow: visible;\n}"),
            "{}",
            card.css
        );

        let element = &output.styles[&element_style_id("etch-abc")];
        assert_eq!(element.selector, "#etch-abc");
        assert!(element.css.starts_with("display: block;\n  "), "{}", element.css);
        assert!(element.css.contains("color: red;"), "{}", element.css);

        assert_eq!(output.inline_styles["u1"], "font-size: var(--text-xl);");
        for id in builtin_element_styles().keys() {
            assert!(output.styles[id].readonly);
        }
    }

    #[test]
    fn unrestricted_runs_convert_unreferenced_classes() {
        let mut session = session(ConversionOptions {
            restrict_to_referenced: false,
            ..ConversionOptions::default()
        });
        let output = session
            .convert_global_classes(&classes(), &content())
            .expect("conversion should succeed");

        assert_eq!(output.converted, 2);
        assert_eq!(output.styles[&class_style_id(".unused")].css, "display: grid;");
    }

    #[test]
    fn each_run_starts_from_clean_caches() {
        let mut session = session(ConversionOptions::default());
        let first = session
            .convert_global_classes(&classes(), &content())
            .expect("first run should succeed");
        assert!(!first.inline_styles.is_empty());

        let only_card = vec![class("c1", "card", "", json!({"_overflow": "auto"}))];
        let second = session
            .convert_global_classes(&only_card, &content())
            .expect("second run should succeed");
        assert!(second.inline_styles.is_empty());
        assert_eq!(second.styles[&class_style_id(".card")].css, "overflow: auto;");
    }

    #[test]
    fn scanned_content_without_references_migrates_nothing() {
        let mut session = session(ConversionOptions::default());
        let content = vec![ContentItem {
            post_type: "page".to_string(),
            elements: vec![Element {
                id: "brxe-x".to_string(),
                name: "div".to_string(),
                settings: decode_settings(&json!({"_overflow": "clip"})),
            }],
            ..ContentItem::default()
        }];

        let output = session
            .convert_global_classes(&classes(), &content)
            .expect("conversion should succeed");
        assert_eq!(output.converted, 0);
        assert!(output.style_map.is_empty());

        let counts = session
            .class_counts(&classes(), &content)
            .expect("counts should load");
        assert_eq!(counts.total, 4);
        assert_eq!(counts.to_migrate, 0);
    }

    #[test]
    fn empty_content_keeps_every_class() {
        let mut session = session(ConversionOptions::default());
        let output = session
            .convert_global_classes(&classes(), &Vec::<ContentItem>::new())
            .expect("conversion should succeed");
        assert_eq!(output.converted, 2);
        assert!(output.style_map.contains_key("n1"));
    }
}
