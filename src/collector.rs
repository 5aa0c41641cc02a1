use crate::breakpoints::BreakpointResolver;
use crate::content::{ContentSource, Element};
use crate::converter::SettingsConverter;
use crate::importer::{StyleEntry, StyleSet, element_style_id};
use crate::normalizer::{convert_to_logical_properties, normalize_deprecated_hsl_references};
use crate::settings::{Settings, Value};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

const ROOT_PLACEHOLDER: &str = "%root%";
const CUSTOM_CSS_KEY: &str = "_cssCustom";
const SOURCE_ID_PREFIX: &str = "brxe-";
const TARGET_ID_PREFIX: &str = "etch-";

static NESTED_IMG_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bimg\s*\{").expect("nested img pattern"));
static IMAGE_FIT_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(object-fit|aspect-ratio)\s*:\s*([^;{}]+)\s*;").expect("image fit pattern")
});
static SEMICOLON_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";{2,}").expect("semicolon pattern"));

/// Element-scoped styles gathered from the content corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedElementStyles {
    pub styles: StyleSet,
    /// Per-element custom CSS with `%root%` already substituted.
    pub custom_css: String,
}

/// Converts the settings attached to individual elements into `#id` styles.
#[derive(Debug, Clone, Copy)]
pub struct ElementStyleCollector<'a> {
    converter: SettingsConverter<'a>,
    breakpoints: &'a BreakpointResolver,
}

impl<'a> ElementStyleCollector<'a> {
    pub fn new(breakpoints: &'a BreakpointResolver) -> Self {
        Self {
            converter: SettingsConverter::new(breakpoints),
            breakpoints,
        }
    }

    pub fn collect(&self, source: &dyn ContentSource, post_types: &[String]) -> CollectedElementStyles {
        let mut collected = CollectedElementStyles::default();
        let items = source.items(post_types);

        for item in &items {
            for element in &item.elements {
                if element.settings.is_empty() {
                    continue;
                }
                self.process_element(element, &mut collected);
            }
        }

        debug!(
            items = items.len(),
            styles = collected.styles.len(),
            "collected element styles"
        );
        collected
    }

    fn process_element(&self, element: &Element, collected: &mut CollectedElementStyles) {
        let selector_id = map_element_id(element);
        if !selector_id.is_empty() {
            self.accumulate_id_style(&selector_id, &element.settings, &mut collected.styles);
        }

        let root = root_selector(element);
        self.accumulate_custom_css(&element.settings, &root, &mut collected.custom_css);
    }

    fn accumulate_id_style(&self, selector_id: &str, settings: &Settings, styles: &mut StyleSet) {
        let base = self.converter.convert(settings, None, true);
        let responsive = self.converter.convert_responsive_variants(settings, None);
        let (base, responsive) = (base.trim(), responsive.trim());
        let combined = if responsive.is_empty() {
            base.to_string()
        } else {
            format!("{} {}", base, responsive).trim().to_string()
        };
        if combined.is_empty() {
            return;
        }

        let css = convert_to_logical_properties(&combined);
        let style_id = element_style_id(selector_id);
        match styles.get_mut(&style_id) {
            Some(existing) => {
                existing.css = format!("{}\n  {}", existing.css.trim(), css).trim().to_string();
            }
            None => {
                let selector = format!("#{}", selector_id);
                styles.insert(style_id.clone(), StyleEntry::class(&style_id, &selector, &css));
            }
        }
    }

    fn accumulate_custom_css(&self, settings: &Settings, root: &str, custom_css: &mut String) {
        if let Some(snippet) = settings.get(CUSTOM_CSS_KEY).and_then(Value::text) {
            let snippet = normalize_deprecated_hsl_references(&snippet.replace(ROOT_PLACEHOLDER, root));
            custom_css.push_str(&format!("\n{}\n", snippet));
        }

        for (key, value) in settings {
            let Some(breakpoint) = key.strip_prefix("_cssCustom:") else {
                continue;
            };
            let Some(snippet) = value.as_scalar().filter(|text| !text.trim().is_empty()) else {
                continue;
            };
            let snippet = normalize_deprecated_hsl_references(&snippet.replace(ROOT_PLACEHOLDER, root));
            match self.breakpoints.get_media_query_for_breakpoint(breakpoint) {
                Some(media) => custom_css.push_str(&format!("\n{} {{\n{}\n}}\n", media, snippet)),
                None => custom_css.push_str(&format!("\n{}\n", snippet)),
            }
        }
    }
}

/// Target element id (no `#`) for a source element, or `""` when it has none.
///
/// `brxe-abc` becomes `etch-abc`, `etch-abc` passes through and bare ids are
/// sanitized and prefixed.
pub fn map_element_id(element: &Element) -> String {
    let raw = element.id.trim().trim_start_matches('#');
    if raw.is_empty() {
        return String::new();
    }
    if raw.starts_with(TARGET_ID_PREFIX) {
        return raw.to_string();
    }
    if let Some(rest) = raw.strip_prefix(SOURCE_ID_PREFIX) {
        return format!("{}{}", TARGET_ID_PREFIX, rest);
    }

    let sanitized: String = raw
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-'))
        .collect();
    if sanitized.is_empty() {
        return String::new();
    }
    format!("{}{}", TARGET_ID_PREFIX, sanitized)
}

/// Source-side selector substituted for `%root%` in element custom CSS.
pub fn root_selector(element: &Element) -> String {
    let raw = element.id.trim().trim_start_matches('#');
    if raw.is_empty() {
        return String::new();
    }
    if raw.starts_with(SOURCE_ID_PREFIX) {
        return format!("#{}", raw);
    }
    if let Some(rest) = raw.strip_prefix(TARGET_ID_PREFIX) {
        return format!("#{}{}", SOURCE_ID_PREFIX, rest);
    }
    format!("#{}{}", SOURCE_ID_PREFIX, raw)
}

/// For image classes, moves `object-fit` and `aspect-ratio` from the root
/// block into a nested `img { ... }` block. `cover` also sizes the image to
/// fill its wrapper.
pub fn move_image_fit_properties_to_nested_img(class_name: &str, css: &str) -> String {
    let class_name = class_name.trim().to_ascii_lowercase();
    if class_name.is_empty() || !class_name.contains("image") {
        return css.to_string();
    }

    let (base, media) = match css.find("@media") {
        Some(position) => css.split_at(position),
        None => (css, ""),
    };
    if base.trim().is_empty() || NESTED_IMG_BLOCK.is_match(base) {
        return css.to_string();
    }

    let mut img_declarations: Vec<String> = Vec::new();
    let mut cover = false;
    for caps in IMAGE_FIT_DECLARATION.captures_iter(base) {
        let property = caps[1].trim().to_ascii_lowercase();
        let value = caps[2].trim();
        if value.is_empty() {
            continue;
        }
        if property == "object-fit" && value.eq_ignore_ascii_case("cover") {
            cover = true;
        }
        let declaration = format!("{}: {};", property, value);
        if !img_declarations.contains(&declaration) {
            img_declarations.push(declaration);
        }
    }
    if img_declarations.is_empty() {
        return css.to_string();
    }

    if cover {
        let existing = img_declarations.join(" ");
        if !existing.contains("inline-size") {
            img_declarations.push("inline-size: 100%;".to_string());
        }
        if !existing.contains("block-size") {
            img_declarations.push("block-size: 100%;".to_string());
        }
    }

    let remaining = IMAGE_FIT_DECLARATION.replace_all(base, "");
    let remaining = SEMICOLON_RUN.replace_all(&remaining, ";");
    let mut remaining = remaining.trim().to_string();

    let nested = format!("img {{\n  {}\n}}", img_declarations.join("\n  "));
    let base = if remaining.is_empty() {
        nested
    } else {
        if !remaining.ends_with(';') && !remaining.ends_with('}') {
            remaining.push(';');
        }
        format!("{}\n\n{}", remaining, nested)
    };

    if media.is_empty() {
        base.trim().to_string()
    } else {
        format!("{}\n{}", base, media.trim_start()).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{ElementStyleCollector, map_element_id, move_image_fit_properties_to_nested_img, root_selector};
    use crate::breakpoints::BreakpointResolver;
    use crate::content::{ContentItem, Element};
    use crate::importer::element_style_id;
    use crate::settings::decode_settings;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn element(id: &str, settings: serde_json::Value) -> Element {
        Element {
            id: id.to_string(),
            name: "div".to_string(),
            settings: decode_settings(&settings),
        }
    }

    fn page(post_type: &str, elements: Vec<Element>) -> ContentItem {
        ContentItem {
            id: "10".to_string(),
            post_type: post_type.to_string(),
            elements,
            ..ContentItem::default()
        }
    }

    #[test]
    fn maps_source_ids_to_target_ids() {
        assert_eq!(map_element_id(&element("brxe-abc123", json!({}))), "etch-abc123");
        assert_eq!(map_element_id(&element(" #etch-abc123 ", json!({}))), "etch-abc123");
        assert_eq!(map_element_id(&element("hero!main", json!({}))), "etch-heromain");
        assert_eq!(map_element_id(&element("###", json!({}))), "");
        assert_eq!(map_element_id(&element("", json!({}))), "");
    }

    #[test]
    fn root_selector_keeps_source_prefix() {
        assert_eq!(root_selector(&element("brxe-abc", json!({}))), "#brxe-abc");
        assert_eq!(root_selector(&element("etch-abc", json!({}))), "#brxe-abc");
        assert_eq!(root_selector(&element("abc", json!({}))), "#brxe-abc");
        assert_eq!(root_selector(&element("", json!({}))), "");
    }

    #[test]
    fn collects_base_and_responsive_css_per_element() {
        let resolver = BreakpointResolver::new();
        let collector = ElementStyleCollector::new(&resolver);
        let content = vec![page(
            "page",
            vec![
                element(
                    "brxe-abc123",
                    json!({"_display": "block", "_display:mobile_portrait": "none"}),
                ),
                element("brxe-empty", json!({})),
            ],
        )];

        let collected = collector.collect(&content, &[]);
        assert_eq!(collected.styles.len(), 1);

        let id = element_style_id("etch-abc123");
        let entry = &collected.styles[&id];
        assert_eq!(entry.id, id);
        assert_eq!(entry.selector, "#etch-abc123");
        assert_eq!(
            entry.css,
            "display: block; @media (width <= to-rem(478px)) {\n  display: none;\n}"
        );
        assert!(collected.custom_css.is_empty());
    }

    #[test]
    fn duplicate_element_ids_merge_instead_of_overwriting() {
        let resolver = BreakpointResolver::new();
        let collector = ElementStyleCollector::new(&resolver);
        let content = vec![
            page("page", vec![element("brxe-dup", json!({"_display": "grid"}))]),
            page("post", vec![element("etch-dup", json!({"_overflow": "hidden"}))]),
        ];

        let collected = collector.collect(&content, &["page".to_string(), "post".to_string()]);
        assert_eq!(collected.styles.len(), 1);
        let entry = &collected.styles[&element_style_id("etch-dup")];
        assert_eq!(entry.css, "display: grid;\n  overflow: hidden;");
    }

    #[test]
    fn unselected_post_types_are_skipped() {
        let resolver = BreakpointResolver::new();
        let collector = ElementStyleCollector::new(&resolver);
        let content = vec![page("product", vec![element("brxe-a", json!({"_display": "flex"}))])];
        assert!(collector.collect(&content, &[]).styles.is_empty());
    }

    #[test]
    fn custom_css_substitutes_root_and_wraps_breakpoints() {
        let resolver = BreakpointResolver::new();
        let collector = ElementStyleCollector::new(&resolver);
        let content = vec![page(
            "page",
            vec![element(
                "brxe-abc",
                json!({
                    "_cssCustom": "%root% { color: hsl(var(--primary-hsl)); }",
                    "_cssCustom:mobile_portrait": "%root% { color: red; }",
                    "_cssCustom:watch": "%root% { color: blue; }"
                }),
            )],
        )];

        let collected = collector.collect(&content, &[]);
        assert_eq!(
            collected.custom_css,
            "\n#brxe-abc { color: var(--primary); }\n\
             \n@media (width <= to-rem(478px)) {\n#brxe-abc { color: red; }\n}\n\
             \n#brxe-abc { color: blue; }\n"
        );
    }

    #[test]
    fn image_fit_moves_into_nested_img_block() {
        let css = "object-fit: cover; aspect-ratio: 16/9; border-radius: 4px;\n\
                   @media (width <= to-rem(478px)) {\n  display: none;\n}";
        assert_eq!(
            move_image_fit_properties_to_nested_img("hero-image", css),
            "border-radius: 4px;\n\nimg {\n  object-fit: cover;\n  aspect-ratio: 16/9;\n  inline-size: 100%;\n  block-size: 100%;\n}\n\
             @media (width <= to-rem(478px)) {\n  display: none;\n}"
        );
    }

    #[test]
    fn image_fit_only_applies_to_image_classes() {
        let css = "object-fit: contain;";
        assert_eq!(move_image_fit_properties_to_nested_img("card", css), css);
        assert_eq!(
            move_image_fit_properties_to_nested_img("Image-Wrap", css),
            "img {\n  object-fit: contain;\n}"
        );
        let nested = "object-fit: cover; img { display: block; }";
        assert_eq!(move_image_fit_properties_to_nested_img("image", nested), nested);
    }
}
